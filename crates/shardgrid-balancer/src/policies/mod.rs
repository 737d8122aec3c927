//! Built-in delegate policies.
//!
//! - **`cost`**: weighted region-count / table-skew cost, the default
//! - **`simple`**: region-count balancing within a slop band
//! - **`cursor`**: rotating start offset shared by round-robin placement

pub mod cost;
pub mod cursor;
pub mod simple;

pub use cost::{CostBasedBalancer, CostWeights, ServerLoad, cluster_cost, loads_from_state};
pub use cursor::RoundRobinCursor;
pub use simple::SimpleBalancer;
