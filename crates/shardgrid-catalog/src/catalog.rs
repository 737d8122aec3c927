//! The read-only view of group membership consumed by the balancer.

use std::sync::Arc;

use shardgrid_core::{GroupInfo, HostPort, TableName};

use crate::error::CatalogResult;

/// Answers "which group owns this table" and "which servers belong to this
/// group".
///
/// Every metadata read may fail; callers decide whether a failure aborts
/// their operation. Implementations must not block forever: timeout and
/// retry policy lives behind this trait.
pub trait GroupCatalog: Send + Sync {
    /// Whether group metadata is durably placed and readable.
    fn is_online(&self) -> bool;

    fn list_groups(&self) -> CatalogResult<Vec<GroupInfo>>;

    fn get_group(&self, name: &str) -> CatalogResult<Option<GroupInfo>>;

    /// Name of the group owning `table`, if any.
    fn group_of_table(&self, table: &TableName) -> CatalogResult<Option<String>>;

    /// Name of the group `server` is a member of, if any.
    fn group_of_server(&self, server: &HostPort) -> CatalogResult<Option<String>>;
}

impl<T: GroupCatalog + ?Sized> GroupCatalog for Arc<T> {
    fn is_online(&self) -> bool {
        (**self).is_online()
    }

    fn list_groups(&self) -> CatalogResult<Vec<GroupInfo>> {
        (**self).list_groups()
    }

    fn get_group(&self, name: &str) -> CatalogResult<Option<GroupInfo>> {
        (**self).get_group(name)
    }

    fn group_of_table(&self, table: &TableName) -> CatalogResult<Option<String>> {
        (**self).group_of_table(table)
    }

    fn group_of_server(&self, server: &HostPort) -> CatalogResult<Option<String>> {
        (**self).group_of_server(server)
    }
}
