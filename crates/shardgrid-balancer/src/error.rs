//! Balancer error types.

use shardgrid_catalog::CatalogError;
use thiserror::Error;

/// Errors that can occur during group-aware placement.
#[derive(Debug, Error)]
pub enum BalancerError {
    /// An operation that needs readable group metadata ran while the
    /// catalog was offline.
    #[error("group catalog is not online, unable to {operation}")]
    NotOnline { operation: &'static str },

    #[error("failed to generate group maps: {0}")]
    GroupMaps(#[source] CatalogError),

    #[error("failed to do online retain assignment: {0}")]
    RetainAssignment(#[source] CatalogError),

    #[error("catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("delegate policy error: {0}")]
    Delegate(String),

    #[error("unknown delegate policy: {0}")]
    UnknownPolicy(String),
}

pub type BalancerResult<T> = Result<T, BalancerError>;
