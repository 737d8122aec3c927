//! Shared fixtures for unit tests.

use std::collections::BTreeSet;

use shardgrid_catalog::{CatalogError, CatalogResult, CatalogStore, GroupCatalog};
use shardgrid_core::{GroupInfo, HostPort, Region, ServerName, TableName};

pub const PORT: u16 = 16020;

pub fn server(host: &str) -> ServerName {
    ServerName::new(host, PORT, 1)
}

pub fn host(host: &str) -> HostPort {
    HostPort::new(host, PORT)
}

pub fn regions(table: &str, count: usize) -> Vec<Region> {
    (0..count).map(|i| Region::new(table, format!("r{i}"))).collect()
}

/// g1 = {s1, s2} owning table1, g2 = {s3} owning table2. Online.
pub fn two_group_catalog() -> CatalogStore {
    let store = CatalogStore::open_in_memory().unwrap();
    store
        .put_group(
            &GroupInfo::new("g1")
                .with_servers([host("s1"), host("s2")])
                .with_tables([TableName::new("table1")]),
        )
        .unwrap();
    store
        .put_group(
            &GroupInfo::new("g2")
                .with_servers([host("s3")])
                .with_tables([TableName::new("table2")]),
        )
        .unwrap();
    store.set_online(true).unwrap();
    store
}

/// Wraps a catalog and fails lookups for selected tables and groups.
pub struct FlakyCatalog<C> {
    inner: C,
    failing_tables: BTreeSet<TableName>,
    failing_groups: BTreeSet<String>,
}

impl<C: GroupCatalog> FlakyCatalog<C> {
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            failing_tables: BTreeSet::new(),
            failing_groups: BTreeSet::new(),
        }
    }

    pub fn fail_table(mut self, table: TableName) -> Self {
        self.failing_tables.insert(table);
        self
    }

    pub fn fail_group(mut self, name: &str) -> Self {
        self.failing_groups.insert(name.to_string());
        self
    }
}

impl<C: GroupCatalog> GroupCatalog for FlakyCatalog<C> {
    fn is_online(&self) -> bool {
        self.inner.is_online()
    }

    fn list_groups(&self) -> CatalogResult<Vec<GroupInfo>> {
        self.inner.list_groups()
    }

    fn get_group(&self, name: &str) -> CatalogResult<Option<GroupInfo>> {
        if self.failing_groups.contains(name) {
            return Err(CatalogError::Unavailable(format!("group {name}")));
        }
        self.inner.get_group(name)
    }

    fn group_of_table(&self, table: &TableName) -> CatalogResult<Option<String>> {
        if self.failing_tables.contains(table) {
            return Err(CatalogError::Unavailable(format!("table {table}")));
        }
        self.inner.group_of_table(table)
    }

    fn group_of_server(&self, server: &HostPort) -> CatalogResult<Option<String>> {
        self.inner.group_of_server(server)
    }
}
