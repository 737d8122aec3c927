pub mod config;
pub mod types;

pub use config::{BalancerConfig, CatalogConfig, CostConfig, ShardGridConfig, SimpleConfig};
pub use types::*;
