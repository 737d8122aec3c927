//! shardgrid.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Registry name of the delegate policy used when none is configured.
pub const DEFAULT_DELEGATE: &str = "cost-based";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShardGridConfig {
    #[serde(default)]
    pub balancer: BalancerConfig,
    pub catalog: Option<CatalogConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancerConfig {
    /// Name of the intra-group placement policy to wrap.
    pub delegate: String,
    pub cost: CostConfig,
    pub simple: SimpleConfig,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            delegate: DEFAULT_DELEGATE.to_string(),
            cost: CostConfig::default(),
            simple: SimpleConfig::default(),
        }
    }
}

/// Tuning for the cost-based delegate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostConfig {
    pub region_count_weight: f64,
    pub table_skew_weight: f64,
    /// Upper bound on moves proposed per balance call.
    pub max_moves: usize,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            region_count_weight: 1.0,
            table_skew_weight: 0.5,
            max_moves: 64,
        }
    }
}

/// Tuning for the simple delegate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimpleConfig {
    /// Tolerated deviation from the average load before balancing kicks in.
    pub slop: f64,
}

impl Default for SimpleConfig {
    fn default() -> Self {
        Self { slop: 0.2 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogConfig {
    pub path: PathBuf,
}

impl ShardGridConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        let config: ShardGridConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }
}
