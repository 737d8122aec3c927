//! Master-side context handed to the balancer and its delegate.

use std::sync::{Arc, Mutex};

use shardgrid_core::{ClusterStatus, Region};
use tracing::info;

/// The assignment-execution subsystem, seen from the balancer.
///
/// `unassign` is fire-and-forget: the balancer never waits on or retries it.
pub trait AssignmentManager: Send + Sync {
    /// Close `region` so it re-enters placement.
    fn unassign(&self, region: &Region);
}

/// Records unassign requests in memory and logs each one.
///
/// Used by `shardctl` to report what a balance run would unassign, and by
/// tests to observe the side effect.
#[derive(Debug, Default)]
pub struct UnassignLog {
    requests: Mutex<Vec<Region>>,
}

impl UnassignLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Regions requested so far, in request order.
    pub fn requests(&self) -> Vec<Region> {
        self.requests
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl AssignmentManager for UnassignLog {
    fn unassign(&self, region: &Region) {
        info!(%region, "unassign requested");
        match self.requests.lock() {
            Ok(mut r) => r.push(region.clone()),
            Err(poisoned) => poisoned.into_inner().push(region.clone()),
        }
    }
}

/// Everything the master hands a balancer at initialization.
#[derive(Clone)]
pub struct MasterContext {
    pub cluster_status: ClusterStatus,
    pub assignment: Arc<dyn AssignmentManager>,
}

impl MasterContext {
    pub fn new(assignment: Arc<dyn AssignmentManager>) -> Self {
        Self {
            cluster_status: ClusterStatus::default(),
            assignment,
        }
    }

    pub fn with_cluster_status(mut self, status: ClusterStatus) -> Self {
        self.cluster_status = status;
        self
    }
}
