//! redb table definitions for the group catalog.
//!
//! Group records are JSON-serialized into `&[u8]` values. The two index
//! tables map a table name or a `host:port` string to its owning group and
//! are written in the same transaction as the group record.

use redb::TableDefinition;

/// Group records keyed by group name.
pub const GROUPS: TableDefinition<&str, &[u8]> = TableDefinition::new("groups");

/// Owning group name keyed by table name.
pub const TABLE_GROUPS: TableDefinition<&str, &str> = TableDefinition::new("table_groups");

/// Owning group name keyed by `host:port`.
pub const SERVER_GROUPS: TableDefinition<&str, &str> = TableDefinition::new("server_groups");

/// Catalog-level flags (e.g. `online`).
pub const META: TableDefinition<&str, bool> = TableDefinition::new("meta");

/// Key in [`META`] recording whether group metadata is durably readable.
pub const ONLINE_KEY: &str = "online";
