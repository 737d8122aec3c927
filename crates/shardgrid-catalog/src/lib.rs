//! shardgrid-catalog: group membership metadata for ShardGrid.
//!
//! Defines the [`GroupCatalog`] boundary the balancer reads through, and
//! [`CatalogStore`], a reference implementation backed by
//! [redb](https://docs.rs/redb).
//!
//! # Architecture
//!
//! Group records are JSON-serialized into redb's `&[u8]` value columns.
//! Table and server ownership live in index tables keyed by table name and
//! `host:port`, so the balancer's hot lookups are single point reads.
//!
//! The `CatalogStore` is `Clone` + `Send` + `Sync` (backed by `Arc<Database>`)
//! and can be shared with the balancer as an `Arc<dyn GroupCatalog>`.

pub mod catalog;
pub mod error;
pub mod store;
pub mod tables;

pub use catalog::GroupCatalog;
pub use error::{CatalogError, CatalogResult};
pub use store::CatalogStore;
