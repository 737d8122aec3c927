//! ShardGrid group-aware balancer.
//!
//! Servers and tables are partitioned into named groups; a region may only
//! live on a server of its table's group. This crate enforces that on top
//! of an ordinary load-balancing policy. It does NOT move regions itself:
//! it returns plans and assignments that the master executes.
//!
//! # Components
//!
//! - **`balancer`**: `GroupBalancer`, the entry point for every placement call
//! - **`partition`**: splits requests into per-group buckets
//! - **`correct`**: finds regions sitting outside their group
//! - **`delegate`**: the intra-group policy trait
//! - **`policies`**: built-in `cost-based` and `simple` delegates
//! - **`registry`**: name → policy lookup used by configuration

pub mod balancer;
pub mod context;
pub mod correct;
pub mod delegate;
pub mod error;
pub mod partition;
pub mod policies;
pub mod registry;

#[cfg(test)]
mod test_support;

pub use balancer::{GroupBalancer, GroupBalancerBuilder};
pub use context::{AssignmentManager, MasterContext, UnassignLog};
pub use correct::{AssignmentSplit, ClusterCorrection, GroupPlacement, Misplaced, MisplacementCorrector};
pub use delegate::DelegatePolicy;
pub use error::{BalancerError, BalancerResult};
pub use partition::{GroupBucket, GroupKey, GroupMaps, GroupPartitioner, filter_online_servers};
pub use registry::{PolicyConstructor, PolicyRegistry};
