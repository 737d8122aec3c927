//! Group-aware load balancer.
//!
//! `GroupBalancer` wraps a [`DelegatePolicy`] and confines it to one group
//! at a time. Every placement request is partitioned by group, each group's
//! share is handed to the delegate together with only that group's online
//! servers, and the per-group answers are merged back. Regions with no
//! eligible server end up under [`Destination::Unplaceable`].
//!
//! Balancing and fresh placement need group metadata, so they refuse to run
//! while the catalog is offline. Retain assignment is the exception: during
//! startup it bypasses grouping and asks the delegate directly.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use shardgrid_catalog::GroupCatalog;
use shardgrid_core::{
    Assignments, BalancerConfig, ClusterState, Destination, Region, RegionPlan, ServerName,
    merge_assignments, to_assignments,
};

use crate::context::MasterContext;
use crate::correct::MisplacementCorrector;
use crate::delegate::DelegatePolicy;
use crate::error::{BalancerError, BalancerResult};
use crate::partition::{GroupPartitioner, filter_online_servers};
use crate::registry::PolicyRegistry;

/// Keeps every region inside the group that owns its table, handing
/// intra-group placement to a delegate policy.
pub struct GroupBalancer {
    config: BalancerConfig,
    catalog: Arc<dyn GroupCatalog>,
    context: MasterContext,
    delegate: Box<dyn DelegatePolicy>,
    stopped: AtomicBool,
}

impl GroupBalancer {
    /// Start building a balancer over `catalog`.
    pub fn builder(catalog: Arc<dyn GroupCatalog>, context: MasterContext) -> GroupBalancerBuilder {
        GroupBalancerBuilder {
            catalog,
            context,
            config: BalancerConfig::default(),
            registry: PolicyRegistry::builtin(),
            delegate: None,
        }
    }

    /// True once the group catalog has loaded.
    pub fn is_online(&self) -> bool {
        self.catalog.is_online()
    }

    /// Catalog used to resolve table and server groups.
    pub fn group_catalog(&self) -> &Arc<dyn GroupCatalog> {
        &self.catalog
    }

    /// Configuration the balancer was built or last reconfigured with.
    pub fn config(&self) -> &BalancerConfig {
        &self.config
    }

    /// Registry name of the active delegate policy.
    pub fn delegate_name(&self) -> &'static str {
        self.delegate.name()
    }

    /// Compute moves that even out load inside each group.
    ///
    /// Misplaced regions are unassigned first so they re-enter placement
    /// through the normal path; the delegate only ever sees correctly
    /// placed regions. If anything fails after that, the result is an empty
    /// plan: a partial plan could move regions based on half the groups.
    pub fn balance_cluster(&self, state: &ClusterState) -> BalancerResult<Vec<RegionPlan>> {
        self.require_online("balance")?;

        let correction = match MisplacementCorrector::new(self.catalog.as_ref()).correct_cluster(state) {
            Ok(correction) => correction,
            Err(e) => {
                warn!(error = %e, "failed to correct misplaced regions, skipping balance");
                return Ok(Vec::new());
            }
        };

        for misplaced in &correction.misplaced {
            self.context.assignment.unassign(&misplaced.region);
        }

        match self.plan_groups(state, &correction.corrected) {
            Ok(plans) => {
                info!(
                    plans = plans.len(),
                    unassigned = correction.misplaced.len(),
                    "cluster balance planned"
                );
                Ok(plans)
            }
            Err(e) => {
                warn!(error = %e, "exception while balancing cluster");
                Ok(Vec::new())
            }
        }
    }

    fn plan_groups(&self, original: &ClusterState, corrected: &ClusterState) -> BalancerResult<Vec<RegionPlan>> {
        let mut plans = Vec::new();
        for group in self.catalog.list_groups()? {
            // Group membership is checked against the servers the caller
            // reported, so emptied servers still count as balance targets.
            let sub_state: ClusterState = original
                .keys()
                .filter(|server| group.contains_server(&server.host_port()))
                .map(|server| {
                    let regions = corrected.get(server).cloned().unwrap_or_default();
                    (server.clone(), regions)
                })
                .collect();
            if sub_state.is_empty() {
                debug!(group = %group.name, "no live servers in group, nothing to balance");
                continue;
            }

            let group_plans = self.delegate.balance_cluster(&sub_state)?;
            debug!(group = %group.name, servers = sub_state.len(), plans = group_plans.len(), "group balanced");
            plans.extend(group_plans);
        }
        Ok(plans)
    }

    /// Spread `regions` over `servers`, group by group.
    pub fn round_robin_assignment(&self, regions: &[Region], servers: &[ServerName]) -> BalancerResult<Assignments> {
        self.require_online("round robin assignment")?;

        let maps = GroupPartitioner::new(self.catalog.as_ref()).partition(regions, servers)?;
        let mut assignments = Assignments::new();
        for (group, bucket) in maps {
            if bucket.regions.is_empty() {
                continue;
            }
            if bucket.is_unplaceable() {
                warn!(group = ?group, regions = bucket.regions.len(), "no online servers for group");
                merge_assignments(&mut assignments, unplaceable(bucket.regions));
                continue;
            }
            let result = self
                .delegate
                .round_robin_assignment(&bucket.regions, &bucket.servers())?;
            merge_assignments(&mut assignments, to_assignments(result));
        }
        Ok(assignments)
    }

    /// Place each region right away on some server of its group.
    pub fn immediate_assignment(
        &self,
        regions: &[Region],
        servers: &[ServerName],
    ) -> BalancerResult<BTreeMap<Region, Destination>> {
        self.require_online("immediate assignment")?;

        let maps = GroupPartitioner::new(self.catalog.as_ref()).partition(regions, servers)?;
        let mut assignments = BTreeMap::new();
        for (group, bucket) in maps {
            if bucket.is_unplaceable() {
                warn!(group = ?group, regions = bucket.regions.len(), "no online servers for group");
                assignments.extend(
                    bucket
                        .regions
                        .into_iter()
                        .map(|r| (r, Destination::Unplaceable)),
                );
                continue;
            }
            let result = self
                .delegate
                .immediate_assignment(&bucket.regions, &bucket.servers())?;
            assignments.extend(
                result
                    .into_iter()
                    .map(|(region, server)| (region, Destination::Server(server))),
            );
        }
        Ok(assignments)
    }

    /// Pick one server of `region`'s group.
    pub fn random_assignment(&self, region: &Region, servers: &[ServerName]) -> BalancerResult<Destination> {
        self.require_online("random assignment")?;

        let maps = GroupPartitioner::new(self.catalog.as_ref())
            .partition(std::slice::from_ref(region), servers)?;
        let Some(bucket) = maps.into_values().next() else {
            return Ok(Destination::Unplaceable);
        };
        if bucket.is_unplaceable() {
            return Ok(Destination::Unplaceable);
        }
        Ok(self
            .delegate
            .random_assignment(region, &bucket.servers())?
            .into())
    }

    /// Keep regions where they are when that is still legal, place the
    /// rest.
    ///
    /// While the catalog is offline no group lookups happen at all; the
    /// delegate decides over the whole cluster.
    pub fn retain_assignment(
        &self,
        regions: &BTreeMap<Region, ServerName>,
        servers: &[ServerName],
    ) -> BalancerResult<Assignments> {
        if !self.is_online() {
            info!(regions = regions.len(), "group catalog offline, retaining without groups");
            let result = self.delegate.retain_assignment(regions, servers)?;
            return Ok(to_assignments(result));
        }

        let split = MisplacementCorrector::new(self.catalog.as_ref())
            .split_assignments(regions)
            .map_err(BalancerError::RetainAssignment)?;

        let mut assignments = Assignments::new();
        for (name, placement) in split.valid {
            let candidates = filter_online_servers(Some(&placement.group), servers);
            if candidates.is_empty() {
                warn!(group = %name, regions = placement.assignments.len(), "no online servers for group");
                merge_assignments(
                    &mut assignments,
                    unplaceable(placement.assignments.into_keys().collect()),
                );
                continue;
            }
            let result = self
                .delegate
                .retain_assignment(&placement.assignments, &candidates)?;
            merge_assignments(&mut assignments, to_assignments(result));
        }

        // Misplaced regions get a fresh server inside their own group.
        for misplaced in split.misplaced {
            let candidates = filter_online_servers(misplaced.group.as_ref(), servers);
            let destination = if candidates.is_empty() {
                Destination::Unplaceable
            } else {
                self.delegate
                    .random_assignment(&misplaced.region, &candidates)?
                    .into()
            };
            assignments
                .entry(destination)
                .or_default()
                .push(misplaced.region);
        }
        Ok(assignments)
    }

    /// Pass new configuration on to the delegate.
    pub fn on_configuration_change(&mut self, config: &BalancerConfig) {
        if config.delegate != self.config.delegate {
            warn!(
                current = %self.config.delegate,
                requested = %config.delegate,
                "delegate policy cannot change at runtime, keeping current"
            );
        }
        self.delegate.on_configuration_change(config);
        self.config = BalancerConfig {
            delegate: self.config.delegate.clone(),
            ..config.clone()
        };
    }

    /// Region opened on `server`. Only logged.
    pub fn region_online(&self, region: &Region, server: &ServerName) {
        debug!(%region, %server, "region online");
    }

    /// Region closed. Only logged.
    pub fn region_offline(&self, region: &Region) {
        debug!(%region, "region offline");
    }

    /// Stop the balancer and its delegate. Later calls are no-ops.
    pub fn stop(&self, why: &str) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(why, "stopping group balancer");
        self.delegate.stop(why);
    }

    /// True after [`GroupBalancer::stop`].
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    fn require_online(&self, operation: &'static str) -> BalancerResult<()> {
        if self.is_online() {
            Ok(())
        } else {
            Err(BalancerError::NotOnline { operation })
        }
    }
}

impl fmt::Debug for GroupBalancer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupBalancer")
            .field("delegate", &self.delegate.name())
            .field("stopped", &self.is_stopped())
            .finish()
    }
}

fn unplaceable(regions: Vec<Region>) -> Assignments {
    let mut assignments = Assignments::new();
    assignments.insert(Destination::Unplaceable, regions);
    assignments
}

/// Collects what a [`GroupBalancer`] needs; nothing exists half-initialized.
pub struct GroupBalancerBuilder {
    catalog: Arc<dyn GroupCatalog>,
    context: MasterContext,
    config: BalancerConfig,
    registry: PolicyRegistry,
    delegate: Option<Box<dyn DelegatePolicy>>,
}

impl GroupBalancerBuilder {
    pub fn config(mut self, config: BalancerConfig) -> Self {
        self.config = config;
        self
    }

    /// Registry used to resolve `config.delegate`.
    pub fn registry(mut self, registry: PolicyRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Use this delegate instead of looking one up by name.
    pub fn delegate(mut self, delegate: Box<dyn DelegatePolicy>) -> Self {
        self.delegate = Some(delegate);
        self
    }

    /// Construct and initialize the delegate, then the balancer.
    pub fn build(self) -> BalancerResult<GroupBalancer> {
        let mut delegate = match self.delegate {
            Some(delegate) => delegate,
            None => self.registry.create(&self.config)?,
        };
        delegate.initialize(&self.context)?;

        info!(
            delegate = delegate.name(),
            online = self.catalog.is_online(),
            "group balancer initialized"
        );
        Ok(GroupBalancer {
            config: self.config,
            catalog: self.catalog,
            context: self.context,
            delegate,
            stopped: AtomicBool::new(false),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::UnassignLog;
    use crate::policies::{SimpleBalancer, simple};
    use crate::test_support::*;
    use shardgrid_catalog::CatalogStore;

    fn balancer(store: CatalogStore) -> (GroupBalancer, Arc<UnassignLog>) {
        let log = Arc::new(UnassignLog::new());
        let balancer = GroupBalancer::builder(Arc::new(store), MasterContext::new(log.clone()))
            .build()
            .unwrap();
        (balancer, log)
    }

    #[test]
    fn builder_resolves_configured_delegate() {
        let log = Arc::new(UnassignLog::new());
        let mut config = BalancerConfig::default();
        config.delegate = simple::NAME.to_string();

        let balancer = GroupBalancer::builder(Arc::new(two_group_catalog()), MasterContext::new(log))
            .config(config)
            .build()
            .unwrap();
        assert_eq!(balancer.delegate_name(), simple::NAME);
    }

    #[test]
    fn builder_rejects_unknown_delegate() {
        let log = Arc::new(UnassignLog::new());
        let mut config = BalancerConfig::default();
        config.delegate = "nope".to_string();

        let err = GroupBalancer::builder(Arc::new(two_group_catalog()), MasterContext::new(log))
            .config(config)
            .build()
            .unwrap_err();
        assert!(matches!(err, BalancerError::UnknownPolicy(_)));
    }

    #[test]
    fn explicit_delegate_overrides_registry() {
        let log = Arc::new(UnassignLog::new());
        let balancer = GroupBalancer::builder(Arc::new(two_group_catalog()), MasterContext::new(log))
            .delegate(Box::new(SimpleBalancer::default()))
            .build()
            .unwrap();
        assert_eq!(balancer.delegate_name(), simple::NAME);
    }

    #[test]
    fn round_robin_stays_inside_groups() {
        let (balancer, _) = balancer(two_group_catalog());
        let mut input = regions("table1", 4);
        input.extend(regions("table2", 2));

        let result = balancer
            .round_robin_assignment(&input, &[server("s1"), server("s2"), server("s3")])
            .unwrap();

        for (dest, placed) in &result {
            let host = dest.server().unwrap().host.clone();
            for region in placed {
                match region.table.as_str() {
                    "table1" => assert!(host == "s1" || host == "s2"),
                    _ => assert_eq!(host, "s3"),
                }
            }
        }
        assert_eq!(result.values().map(Vec::len).sum::<usize>(), 6);
    }

    #[test]
    fn random_assignment_without_group_servers_is_unplaceable() {
        let (balancer, _) = balancer(two_group_catalog());
        let dest = balancer
            .random_assignment(&Region::new("table2", "a"), &[server("s1")])
            .unwrap();
        assert_eq!(dest, Destination::Unplaceable);
    }

    #[test]
    fn balance_requires_online_catalog() {
        let store = two_group_catalog();
        store.set_online(false).unwrap();
        let (balancer, _) = balancer(store);

        let err = balancer.balance_cluster(&ClusterState::new()).unwrap_err();
        assert!(matches!(err, BalancerError::NotOnline { operation: "balance" }));
    }

    #[test]
    fn balance_unassigns_misplaced_regions() {
        let (balancer, log) = balancer(two_group_catalog());
        let mut state = ClusterState::new();
        state.insert(server("s1"), vec![Region::new("table2", "x")]);
        state.insert(server("s3"), Vec::new());

        balancer.balance_cluster(&state).unwrap();
        assert_eq!(log.requests(), vec![Region::new("table2", "x")]);
    }

    #[test]
    fn stop_is_idempotent() {
        let (balancer, _) = balancer(two_group_catalog());
        assert!(!balancer.is_stopped());
        balancer.stop("shutdown");
        balancer.stop("again");
        assert!(balancer.is_stopped());
    }

    #[test]
    fn configuration_change_keeps_delegate_name() {
        let (mut balancer, _) = balancer(two_group_catalog());
        let mut config = BalancerConfig::default();
        config.delegate = simple::NAME.to_string();
        config.cost.max_moves = 3;

        balancer.on_configuration_change(&config);
        assert_eq!(balancer.config().delegate, "cost-based");
        assert_eq!(balancer.config().cost.max_moves, 3);
    }
}
