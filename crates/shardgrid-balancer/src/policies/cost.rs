//! Cost-based delegate: the default intra-group policy.
//!
//! Evaluates a cluster layout using a weighted combination of:
//! - **Region count**: how far each server's region count is from the average
//! - **Table skew**: how concentrated each table's regions are on one server
//!
//! Balancing greedily applies the single move that lowers the total cost
//! the most, until no move helps or `max_moves` is reached.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, info};

use shardgrid_core::{
    BalancerConfig, ClusterState, CostConfig, Region, RegionPlan, ServerAssignments, ServerName,
    TableName,
};

use crate::delegate::DelegatePolicy;
use crate::error::BalancerResult;
use crate::policies::simple::{find_live, pick_random};

pub const NAME: &str = "cost-based";

/// Improvements smaller than this are treated as noise.
const MIN_IMPROVEMENT: f64 = 1e-9;

/// Weights for the cost components.
#[derive(Debug, Clone, PartialEq)]
pub struct CostWeights {
    pub region_count: f64,
    pub table_skew: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self::from(&CostConfig::default())
    }
}

impl From<&CostConfig> for CostWeights {
    fn from(config: &CostConfig) -> Self {
        Self {
            region_count: config.region_count_weight,
            table_skew: config.table_skew_weight,
        }
    }
}

/// Regions carried by one server, indexed by table.
#[derive(Debug, Clone)]
pub struct ServerLoad {
    pub server: ServerName,
    pub regions: Vec<Region>,
    table_counts: HashMap<TableName, usize>,
}

impl ServerLoad {
    pub fn new(server: ServerName, regions: Vec<Region>) -> Self {
        let mut table_counts = HashMap::new();
        for region in &regions {
            *table_counts.entry(region.table.clone()).or_insert(0) += 1;
        }
        Self {
            server,
            regions,
            table_counts,
        }
    }

    pub fn region_count(&self) -> usize {
        self.regions.len()
    }

    pub fn table_count(&self, table: &TableName) -> usize {
        self.table_counts.get(table).copied().unwrap_or(0)
    }

    fn take(&mut self, table: &TableName) -> Option<Region> {
        let idx = self.regions.iter().rposition(|r| &r.table == table)?;
        let region = self.regions.remove(idx);
        if let Some(count) = self.table_counts.get_mut(table) {
            *count -= 1;
        }
        Some(region)
    }

    fn put(&mut self, region: Region) {
        *self.table_counts.entry(region.table.clone()).or_insert(0) += 1;
        self.regions.push(region);
    }
}

/// Build per-server loads from a cluster state.
pub fn loads_from_state(state: &ClusterState) -> Vec<ServerLoad> {
    state
        .iter()
        .map(|(server, regions)| ServerLoad::new(server.clone(), regions.clone()))
        .collect()
}

/// Total cost of a layout. Zero means perfectly even. Lower is better.
pub fn cluster_cost(loads: &[ServerLoad], weights: &CostWeights) -> f64 {
    let total: usize = loads.iter().map(ServerLoad::region_count).sum();
    if loads.is_empty() || total == 0 {
        return 0.0;
    }
    let n = loads.len() as f64;
    let avg = total as f64 / n;

    // Sum of absolute deviation, normalized by total regions.
    let region_count = loads
        .iter()
        .map(|l| (l.region_count() as f64 - avg).abs())
        .sum::<f64>()
        / total as f64;

    // Per table: how far the most loaded server is above its fair share.
    let mut table_totals: HashMap<&TableName, usize> = HashMap::new();
    for load in loads {
        for (table, count) in &load.table_counts {
            *table_totals.entry(table).or_insert(0) += count;
        }
    }
    let table_skew = table_totals
        .iter()
        .map(|(table, &table_total)| {
            let fair = (table_total as f64 / n).ceil();
            let max = loads.iter().map(|l| l.table_count(table)).max().unwrap_or(0) as f64;
            (max - fair).max(0.0) / table_total as f64
        })
        .sum::<f64>()
        / table_totals.len().max(1) as f64;

    weights.region_count * region_count + weights.table_skew * table_skew
}

/// Index of the server carrying the fewest regions (first on ties).
fn least_loaded(counts: &[usize]) -> Option<usize> {
    counts
        .iter()
        .enumerate()
        .min_by_key(|&(i, &c)| (c, i))
        .map(|(i, _)| i)
}

pub struct CostBasedBalancer {
    weights: CostWeights,
    max_moves: usize,
}

impl CostBasedBalancer {
    pub fn new(config: &CostConfig) -> Self {
        Self {
            weights: CostWeights::from(config),
            max_moves: config.max_moves,
        }
    }

    /// Best single move from `loads`, as (source, destination, table, new cost).
    fn best_move(&self, loads: &mut [ServerLoad]) -> Option<(usize, usize, TableName, f64)> {
        let mut best: Option<(usize, usize, TableName, f64)> = None;
        for src in 0..loads.len() {
            let tables: Vec<TableName> = loads[src]
                .table_counts
                .iter()
                .filter(|&(_, &c)| c > 0)
                .map(|(t, _)| t.clone())
                .collect();
            for table in tables {
                for dst in 0..loads.len() {
                    if dst == src || loads[dst].region_count() + 1 > loads[src].region_count() {
                        continue;
                    }
                    let Some(region) = loads[src].take(&table) else { continue };
                    loads[dst].put(region);
                    let cost = cluster_cost(loads, &self.weights);
                    if let Some(region) = loads[dst].take(&table) {
                        loads[src].put(region);
                    }
                    if best.as_ref().is_none_or(|b| cost < b.3) {
                        best = Some((src, dst, table.clone(), cost));
                    }
                }
            }
        }
        best
    }
}

impl Default for CostBasedBalancer {
    fn default() -> Self {
        Self::new(&CostConfig::default())
    }
}

impl DelegatePolicy for CostBasedBalancer {
    fn name(&self) -> &'static str {
        NAME
    }

    fn balance_cluster(&self, state: &ClusterState) -> BalancerResult<Vec<RegionPlan>> {
        let mut loads = loads_from_state(state);
        let mut cost = cluster_cost(&loads, &self.weights);
        let initial_cost = cost;

        // Region → (original server, current server).
        let mut moved: BTreeMap<Region, (ServerName, ServerName)> = BTreeMap::new();

        for _ in 0..self.max_moves {
            let Some((src, dst, table, new_cost)) = self.best_move(&mut loads) else { break };
            if new_cost > cost - MIN_IMPROVEMENT {
                break;
            }
            let Some(region) = loads[src].take(&table) else { break };
            let from = loads[src].server.clone();
            let to = loads[dst].server.clone();
            moved
                .entry(region.clone())
                .and_modify(|(_, current)| *current = to.clone())
                .or_insert((from, to));
            loads[dst].put(region);
            cost = new_cost;
        }

        let plans: Vec<RegionPlan> = moved
            .into_iter()
            .filter(|(_, (from, to))| from != to)
            .map(|(region, (from, to))| RegionPlan::new(region, Some(from), to))
            .collect();

        if plans.is_empty() {
            debug!(cost = initial_cost, "no cost-reducing moves found");
        } else {
            info!(
                moves = plans.len(),
                initial_cost,
                final_cost = cost,
                "cost balance planned"
            );
        }
        Ok(plans)
    }

    fn round_robin_assignment(
        &self,
        regions: &[Region],
        servers: &[ServerName],
    ) -> BalancerResult<ServerAssignments> {
        let mut counts = vec![0usize; servers.len()];
        let mut assignments = ServerAssignments::new();
        for region in regions {
            let Some(idx) = least_loaded(&counts) else { break };
            counts[idx] += 1;
            assignments
                .entry(servers[idx].clone())
                .or_default()
                .push(region.clone());
        }
        Ok(assignments)
    }

    fn retain_assignment(
        &self,
        regions: &BTreeMap<Region, ServerName>,
        servers: &[ServerName],
    ) -> BalancerResult<ServerAssignments> {
        let mut counts = vec![0usize; servers.len()];
        let mut assignments = ServerAssignments::new();
        let mut homeless = Vec::new();

        for (region, previous) in regions {
            match find_live(previous, servers) {
                Some(live) => {
                    if let Some(idx) = servers.iter().position(|s| s == live) {
                        counts[idx] += 1;
                    }
                    assignments.entry(live.clone()).or_default().push(region.clone());
                }
                None => homeless.push(region.clone()),
            }
        }
        for region in homeless {
            let Some(idx) = least_loaded(&counts) else { break };
            counts[idx] += 1;
            assignments.entry(servers[idx].clone()).or_default().push(region);
        }
        Ok(assignments)
    }

    fn immediate_assignment(
        &self,
        regions: &[Region],
        servers: &[ServerName],
    ) -> BalancerResult<BTreeMap<Region, ServerName>> {
        let assignments = self.round_robin_assignment(regions, servers)?;
        Ok(assignments
            .into_iter()
            .flat_map(|(server, regions)| regions.into_iter().map(move |r| (r, server.clone())))
            .collect())
    }

    fn random_assignment(
        &self,
        _region: &Region,
        servers: &[ServerName],
    ) -> BalancerResult<Option<ServerName>> {
        Ok(pick_random(servers))
    }

    fn on_configuration_change(&mut self, config: &BalancerConfig) {
        self.weights = CostWeights::from(&config.cost);
        self.max_moves = config.cost.max_moves;
        debug!(weights = ?self.weights, max_moves = self.max_moves, "cost balancer reconfigured");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn server(host: &str) -> ServerName {
        ServerName::new(host, 16020, 1)
    }

    fn regions(table: &str, count: usize) -> Vec<Region> {
        (0..count).map(|i| Region::new(table, format!("{table}-r{i}"))).collect()
    }

    fn apply(state: &ClusterState, plans: &[RegionPlan]) -> ClusterState {
        let mut state = state.clone();
        for plan in plans {
            let src = state.get_mut(plan.source.as_ref().unwrap()).unwrap();
            let idx = src.iter().position(|r| r == &plan.region).unwrap();
            let region = src.remove(idx);
            state.get_mut(&plan.destination).unwrap().push(region);
        }
        state
    }

    #[test]
    fn even_layout_costs_nothing() {
        let mut state = ClusterState::new();
        state.insert(server("a"), regions("t1", 2));
        state.insert(server("b"), regions("t2", 2));

        let weights = CostWeights {
            region_count: 1.0,
            table_skew: 0.0,
        };
        assert_eq!(cluster_cost(&loads_from_state(&state), &weights), 0.0);
    }

    #[test]
    fn table_skew_raises_cost() {
        let weights = CostWeights {
            region_count: 0.0,
            table_skew: 1.0,
        };

        let mut stacked = ClusterState::new();
        stacked.insert(server("a"), regions("t1", 2));
        stacked.insert(server("b"), regions("t2", 2));

        let mut spread = ClusterState::new();
        let mut t1 = regions("t1", 2);
        let mut t2 = regions("t2", 2);
        spread.insert(server("a"), vec![t1.remove(0), t2.remove(0)]);
        spread.insert(server("b"), vec![t1.remove(0), t2.remove(0)]);

        let stacked_cost = cluster_cost(&loads_from_state(&stacked), &weights);
        let spread_cost = cluster_cost(&loads_from_state(&spread), &weights);
        assert!(
            stacked_cost > spread_cost,
            "stacked ({stacked_cost}) should cost more than spread ({spread_cost})"
        );
    }

    #[test]
    fn balance_evens_out_region_counts() {
        let balancer = CostBasedBalancer::default();
        let mut state = ClusterState::new();
        state.insert(server("a"), regions("t1", 6));
        state.insert(server("b"), Vec::new());
        state.insert(server("c"), Vec::new());

        let plans = balancer.balance_cluster(&state).unwrap();
        let after = apply(&state, &plans);

        assert!(after.values().all(|r| r.len() == 2), "{after:?}");
        assert!(plans.iter().all(|p| p.source.as_ref() != Some(&p.destination)));
    }

    #[test]
    fn balance_respects_max_moves() {
        let balancer = CostBasedBalancer::new(&CostConfig {
            max_moves: 1,
            ..Default::default()
        });
        let mut state = ClusterState::new();
        state.insert(server("a"), regions("t1", 8));
        state.insert(server("b"), Vec::new());

        assert_eq!(balancer.balance_cluster(&state).unwrap().len(), 1);
    }

    #[test]
    fn balanced_cluster_produces_no_plans() {
        let balancer = CostBasedBalancer::default();
        let mut state = ClusterState::new();
        state.insert(server("a"), regions("t1", 3));
        state.insert(server("b"), regions("t2", 3));

        assert!(balancer.balance_cluster(&state).unwrap().is_empty());
    }

    #[test]
    fn round_robin_fills_least_loaded_first() {
        let balancer = CostBasedBalancer::default();
        let servers = vec![server("a"), server("b")];

        let result = balancer.round_robin_assignment(&regions("t1", 5), &servers).unwrap();
        assert_eq!(result[&server("a")].len(), 3);
        assert_eq!(result[&server("b")].len(), 2);
    }

    #[test]
    fn retain_keeps_live_and_spreads_homeless() {
        let balancer = CostBasedBalancer::default();
        let servers = vec![server("a"), server("b")];
        let mut current = BTreeMap::new();
        current.insert(Region::new("t1", "r0"), server("a"));
        current.insert(Region::new("t1", "r1"), server("a"));
        current.insert(Region::new("t1", "r2"), server("gone"));

        let result = balancer.retain_assignment(&current, &servers).unwrap();
        assert_eq!(result[&server("a")].len(), 2);
        assert_eq!(result[&server("b")], vec![Region::new("t1", "r2")]);
    }

    #[test]
    fn immediate_covers_every_region() {
        let balancer = CostBasedBalancer::default();
        let result = balancer
            .immediate_assignment(&regions("t1", 4), &[server("a"), server("b")])
            .unwrap();
        assert_eq!(result.len(), 4);
    }

    #[test]
    fn configuration_change_reloads_weights() {
        let mut balancer = CostBasedBalancer::default();
        let mut config = BalancerConfig::default();
        config.cost.table_skew_weight = 2.0;
        config.cost.max_moves = 3;

        balancer.on_configuration_change(&config);
        assert_eq!(balancer.weights.table_skew, 2.0);
        assert_eq!(balancer.max_moves, 3);
    }
}
