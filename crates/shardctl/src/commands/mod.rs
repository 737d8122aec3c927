pub mod catalog;
pub mod plan;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use shardgrid_catalog::CatalogStore;
use shardgrid_core::ShardGridConfig;
use tracing::debug;

/// Configuration and catalog location shared by every command.
pub struct Env {
    pub config: ShardGridConfig,
    catalog_path: Option<PathBuf>,
}

impl Env {
    /// Read `config` if given (defaults otherwise). `catalog` wins over
    /// `[catalog].path`.
    pub fn load(config: Option<&Path>, catalog: Option<PathBuf>) -> Result<Self> {
        let config = match config {
            Some(path) => ShardGridConfig::from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?,
            None => ShardGridConfig::default(),
        };
        let catalog_path = catalog.or_else(|| config.catalog.as_ref().map(|c| c.path.clone()));
        Ok(Self { config, catalog_path })
    }

    pub fn open_catalog(&self) -> Result<CatalogStore> {
        let Some(path) = &self.catalog_path else {
            bail!("no catalog configured; pass --catalog or set [catalog].path");
        };
        debug!(path = %path.display(), "opening catalog");
        CatalogStore::open(path).with_context(|| format!("failed to open catalog {}", path.display()))
    }
}
