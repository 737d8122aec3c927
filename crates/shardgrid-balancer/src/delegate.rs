//! The pluggable intra-group placement policy.
//!
//! A `DelegatePolicy` knows nothing about groups. The group balancer hands
//! it one group's regions and that group's online servers at a time, so any
//! policy that is correct on a flat cluster stays correct per group.

use std::collections::BTreeMap;

use shardgrid_core::{BalancerConfig, ClusterState, Region, RegionPlan, ServerAssignments, ServerName};

use crate::context::MasterContext;
use crate::error::BalancerResult;

pub trait DelegatePolicy: Send + Sync {
    /// Registry name of this policy.
    fn name(&self) -> &'static str;

    /// Called once, after construction and before any placement call.
    fn initialize(&mut self, _ctx: &MasterContext) -> BalancerResult<()> {
        Ok(())
    }

    /// Propose moves that even out load across the servers in `state`.
    fn balance_cluster(&self, state: &ClusterState) -> BalancerResult<Vec<RegionPlan>>;

    /// Spread `regions` across `servers`.
    fn round_robin_assignment(
        &self,
        regions: &[Region],
        servers: &[ServerName],
    ) -> BalancerResult<ServerAssignments>;

    /// Keep each region on its previous server when that server is still
    /// in `servers` (by host:port); place the rest anywhere.
    fn retain_assignment(
        &self,
        regions: &BTreeMap<Region, ServerName>,
        servers: &[ServerName],
    ) -> BalancerResult<ServerAssignments>;

    /// Place every region right now, without regard to balance.
    fn immediate_assignment(
        &self,
        regions: &[Region],
        servers: &[ServerName],
    ) -> BalancerResult<BTreeMap<Region, ServerName>>;

    /// Pick a server for one region. `None` when `servers` is empty.
    fn random_assignment(
        &self,
        region: &Region,
        servers: &[ServerName],
    ) -> BalancerResult<Option<ServerName>>;

    fn on_configuration_change(&mut self, _config: &BalancerConfig) {}

    fn stop(&self, _why: &str) {}
}
