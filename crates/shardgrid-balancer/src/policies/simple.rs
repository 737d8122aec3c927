//! Simple delegate: region-count balancing with a slop band.
//!
//! Balancing only looks at how many regions each server carries. A
//! cluster whose loads all sit within `avg * (1 ± slop)` is left alone;
//! otherwise regions are pulled off servers above the ceiling and handed
//! to servers below the floor.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use shardgrid_core::{
    BalancerConfig, ClusterState, Region, RegionPlan, ServerAssignments, ServerName, SimpleConfig,
};

use crate::delegate::DelegatePolicy;
use crate::error::BalancerResult;
use crate::policies::cursor::RoundRobinCursor;

pub const NAME: &str = "simple";

pub struct SimpleBalancer {
    slop: f64,
    cursor: RoundRobinCursor,
}

impl SimpleBalancer {
    pub fn new(config: &SimpleConfig) -> Self {
        Self {
            slop: config.slop,
            cursor: RoundRobinCursor::new(),
        }
    }
}

impl Default for SimpleBalancer {
    fn default() -> Self {
        Self::new(&SimpleConfig::default())
    }
}

impl DelegatePolicy for SimpleBalancer {
    fn name(&self) -> &'static str {
        NAME
    }

    fn balance_cluster(&self, state: &ClusterState) -> BalancerResult<Vec<RegionPlan>> {
        Ok(plan_count_balance(state, self.slop))
    }

    fn round_robin_assignment(
        &self,
        regions: &[Region],
        servers: &[ServerName],
    ) -> BalancerResult<ServerAssignments> {
        let mut assignments = ServerAssignments::new();
        let order: Vec<usize> = self.cursor.rotation(servers.len()).collect();
        if order.is_empty() {
            warn!(regions = regions.len(), "no servers to round-robin over");
            return Ok(assignments);
        }
        for (i, region) in regions.iter().enumerate() {
            let server = &servers[order[i % order.len()]];
            assignments
                .entry(server.clone())
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
        let mut assignments = ServerAssignments::new();
        let mut moved = 0usize;
        for (region, previous) in regions {
            let server = match find_live(previous, servers) {
                Some(live) => Some(live.clone()),
                None => {
                    moved += 1;
                    pick_random(servers)
                }
            };
            match server {
                Some(server) => assignments.entry(server).or_default().push(region.clone()),
                None => warn!(%region, "no servers available to retain region on"),
            }
        }
        debug!(retained = regions.len() - moved, moved, "retain assignment done");
        Ok(assignments)
    }

    fn immediate_assignment(
        &self,
        regions: &[Region],
        servers: &[ServerName],
    ) -> BalancerResult<BTreeMap<Region, ServerName>> {
        Ok(regions
            .iter()
            .filter_map(|region| pick_random(servers).map(|server| (region.clone(), server)))
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
        if config.simple.slop != self.slop {
            info!(old = self.slop, new = config.simple.slop, "simple balancer slop changed");
            self.slop = config.simple.slop;
        }
    }
}

/// The live incarnation of `previous` in `servers`, matched by host:port.
pub(crate) fn find_live<'a>(previous: &ServerName, servers: &'a [ServerName]) -> Option<&'a ServerName> {
    let host_port = previous.host_port();
    servers.iter().find(|s| s.is_at(&host_port))
}

pub(crate) fn pick_random(servers: &[ServerName]) -> Option<ServerName> {
    servers.choose(&mut rand::thread_rng()).cloned()
}

/// Even out region counts so every server ends up within `[floor, ceiling]`
/// of the average.
fn plan_count_balance(state: &ClusterState, slop: f64) -> Vec<RegionPlan> {
    let n = state.len();
    let total: usize = state.values().map(Vec::len).sum();
    if n < 2 || total == 0 {
        return Vec::new();
    }

    let avg = total as f64 / n as f64;
    let max_allowed = (avg * (1.0 + slop)).ceil() as usize;
    let min_allowed = (avg * (1.0 - slop)).floor() as usize;
    if state
        .values()
        .all(|r| r.len() <= max_allowed && r.len() >= min_allowed)
    {
        debug!(servers = n, regions = total, avg, "cluster within slop, skipping balance");
        return Vec::new();
    }

    let floor = total / n;
    let ceiling = floor + usize::from(total % n != 0);

    // Pull everything above the ceiling into a pool.
    let mut pool: Vec<(Region, ServerName)> = Vec::new();
    let mut counts: BTreeMap<ServerName, usize> = BTreeMap::new();
    for (server, regions) in state {
        if regions.len() > ceiling {
            pool.extend(regions[ceiling..].iter().map(|r| (r.clone(), server.clone())));
            counts.insert(server.clone(), ceiling);
        } else {
            counts.insert(server.clone(), regions.len());
        }
    }

    // If that does not cover servers below the floor, shave one region off
    // servers sitting at the ceiling.
    let deficit: usize = counts.values().filter(|&&c| c < floor).map(|&c| floor - c).sum();
    if pool.len() < deficit && ceiling > floor {
        for (server, regions) in state {
            if pool.len() >= deficit {
                break;
            }
            if let Some(count) = counts.get_mut(server) {
                if *count == ceiling {
                    pool.push((regions[ceiling - 1].clone(), server.clone()));
                    *count -= 1;
                }
            }
        }
    }

    let mut plans = Vec::with_capacity(pool.len());
    let mut pool = pool.into_iter();
    // Fill up to the floor first, then hand leftovers out one per server.
    for limit in [floor, ceiling] {
        for (server, count) in counts.iter_mut() {
            while *count < limit {
                let Some((region, source)) = pool.next() else { break };
                plans.push(RegionPlan::new(region, Some(source), server.clone()));
                *count += 1;
            }
        }
    }

    info!(servers = n, regions = total, moves = plans.len(), "count balance planned");
    plans
}
