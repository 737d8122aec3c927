//! CatalogStore: redb-backed group membership for ShardGrid.
//!
//! Holds group records plus two ownership indexes (table → group and
//! `host:port` → group). Every mutation rewrites the affected group records
//! and index entries in one write transaction, so a table or server is
//! never owned by two groups at once. The store supports both on-disk and
//! in-memory backends (the latter for testing).

use std::path::Path;
use std::sync::Arc;

use redb::{Database, ReadableDatabase, ReadableTable};
use tracing::{debug, info, warn};

use shardgrid_core::{GroupInfo, HostPort, TableName};

use crate::catalog::GroupCatalog;
use crate::error::{CatalogError, CatalogResult};
use crate::tables::*;

/// Convert any `Display` error into a `CatalogError` variant via a closure factory.
macro_rules! map_err {
    ($variant:ident) => {
        |e| CatalogError::$variant(e.to_string())
    };
}

type GroupTable<'txn> = redb::Table<'txn, &'static str, &'static [u8]>;

/// Thread-safe group catalog backed by redb.
#[derive(Clone)]
pub struct CatalogStore {
    db: Arc<Database>,
}

impl CatalogStore {
    /// Open (or create) a persistent catalog at the given path.
    pub fn open(path: &Path) -> CatalogResult<Self> {
        let db = Database::create(path).map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!(?path, "group catalog opened");
        Ok(store)
    }

    /// Create an ephemeral in-memory catalog (for testing).
    pub fn open_in_memory() -> CatalogResult<Self> {
        let backend = redb::backends::InMemoryBackend::new();
        let db = Database::builder()
            .create_with_backend(backend)
            .map_err(map_err!(Open))?;
        let store = Self { db: Arc::new(db) };
        store.ensure_tables()?;
        debug!("in-memory group catalog opened");
        Ok(store)
    }

    fn ensure_tables(&self) -> CatalogResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        // Opening a table in a write transaction creates it if absent.
        txn.open_table(GROUPS).map_err(map_err!(Table))?;
        txn.open_table(TABLE_GROUPS).map_err(map_err!(Table))?;
        txn.open_table(SERVER_GROUPS).map_err(map_err!(Table))?;
        txn.open_table(META).map_err(map_err!(Table))?;
        txn.commit().map_err(map_err!(Transaction))?;
        Ok(())
    }

    // ── Groups ─────────────────────────────────────────────────────

    /// Insert or replace a group record.
    ///
    /// Fails with [`CatalogError::Conflict`] if any of its tables or servers
    /// is already owned by another group; use [`move_table`] /
    /// [`move_server`] to transfer ownership.
    ///
    /// [`move_table`]: CatalogStore::move_table
    /// [`move_server`]: CatalogStore::move_server
    pub fn put_group(&self, group: &GroupInfo) -> CatalogResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut groups = txn.open_table(GROUPS).map_err(map_err!(Table))?;
            let mut table_idx = txn.open_table(TABLE_GROUPS).map_err(map_err!(Table))?;
            let mut server_idx = txn.open_table(SERVER_GROUPS).map_err(map_err!(Table))?;

            for table in &group.tables {
                check_owner(&table_idx, table.as_str(), &group.name)?;
            }
            for server in &group.servers {
                check_owner(&server_idx, &server.to_string(), &group.name)?;
            }

            if let Some(old) = read_group(&groups, &group.name)? {
                for table in old.tables.difference(&group.tables) {
                    table_idx.remove(table.as_str()).map_err(map_err!(Write))?;
                }
                for server in old.servers.difference(&group.servers) {
                    server_idx
                        .remove(server.to_string().as_str())
                        .map_err(map_err!(Write))?;
                }
            }
            for table in &group.tables {
                table_idx
                    .insert(table.as_str(), group.name.as_str())
                    .map_err(map_err!(Write))?;
            }
            for server in &group.servers {
                server_idx
                    .insert(server.to_string().as_str(), group.name.as_str())
                    .map_err(map_err!(Write))?;
            }
            write_group(&mut groups, group)?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(group = %group.name, "group stored");
        Ok(())
    }

    /// Get a group by name.
    pub fn get_group(&self, name: &str) -> CatalogResult<Option<GroupInfo>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(GROUPS).map_err(map_err!(Table))?;
        read_group(&table, name)
    }

    /// List all groups, ordered by name.
    pub fn list_groups(&self) -> CatalogResult<Vec<GroupInfo>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let table = txn.open_table(GROUPS).map_err(map_err!(Table))?;
        let mut results = Vec::new();
        for entry in table.iter().map_err(map_err!(Read))? {
            let (_, value) = entry.map_err(map_err!(Read))?;
            let group: GroupInfo =
                serde_json::from_slice(value.value()).map_err(map_err!(Deserialize))?;
            results.push(group);
        }
        Ok(results)
    }

    /// Delete a group and its ownership entries. Returns true if it existed.
    pub fn delete_group(&self, name: &str) -> CatalogResult<bool> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        let existed;
        {
            let mut groups = txn.open_table(GROUPS).map_err(map_err!(Table))?;
            let mut table_idx = txn.open_table(TABLE_GROUPS).map_err(map_err!(Table))?;
            let mut server_idx = txn.open_table(SERVER_GROUPS).map_err(map_err!(Table))?;

            match read_group(&groups, name)? {
                Some(old) => {
                    for table in &old.tables {
                        table_idx.remove(table.as_str()).map_err(map_err!(Write))?;
                    }
                    for server in &old.servers {
                        server_idx
                            .remove(server.to_string().as_str())
                            .map_err(map_err!(Write))?;
                    }
                    groups.remove(name).map_err(map_err!(Write))?;
                    existed = true;
                }
                None => existed = false,
            }
        }
        txn.commit().map_err(map_err!(Transaction))?;
        debug!(group = %name, existed, "group deleted");
        Ok(existed)
    }

    // ── Ownership transfers ────────────────────────────────────────

    /// Make `group` the owner of `table`, removing it from its previous group.
    pub fn move_table(&self, table: &TableName, group: &str) -> CatalogResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut groups = txn.open_table(GROUPS).map_err(map_err!(Table))?;
            let mut table_idx = txn.open_table(TABLE_GROUPS).map_err(map_err!(Table))?;

            let mut target = read_group(&groups, group)?
                .ok_or_else(|| CatalogError::NotFound(format!("group {group}")))?;
            let previous = table_idx
                .get(table.as_str())
                .map_err(map_err!(Read))?
                .map(|owner| owner.value().to_string());

            if let Some(previous) = previous.filter(|p| p != group) {
                if let Some(mut old) = read_group(&groups, &previous)? {
                    old.tables.remove(table);
                    write_group(&mut groups, &old)?;
                }
            }
            target.tables.insert(table.clone());
            write_group(&mut groups, &target)?;
            table_idx
                .insert(table.as_str(), group)
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        info!(%table, %group, "table moved");
        Ok(())
    }

    /// Make `group` the owner of `server`, removing it from its previous group.
    pub fn move_server(&self, server: &HostPort, group: &str) -> CatalogResult<()> {
        let key = server.to_string();
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut groups = txn.open_table(GROUPS).map_err(map_err!(Table))?;
            let mut server_idx = txn.open_table(SERVER_GROUPS).map_err(map_err!(Table))?;

            let mut target = read_group(&groups, group)?
                .ok_or_else(|| CatalogError::NotFound(format!("group {group}")))?;
            let previous = server_idx
                .get(key.as_str())
                .map_err(map_err!(Read))?
                .map(|owner| owner.value().to_string());

            if let Some(previous) = previous.filter(|p| p != group) {
                if let Some(mut old) = read_group(&groups, &previous)? {
                    old.servers.remove(server);
                    write_group(&mut groups, &old)?;
                }
            }
            target.servers.insert(server.clone());
            write_group(&mut groups, &target)?;
            server_idx
                .insert(key.as_str(), group)
                .map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        info!(%server, %group, "server moved");
        Ok(())
    }

    // ── Lookups ────────────────────────────────────────────────────

    pub fn group_of_table(&self, table: &TableName) -> CatalogResult<Option<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let idx = txn.open_table(TABLE_GROUPS).map_err(map_err!(Table))?;
        let owner = idx
            .get(table.as_str())
            .map_err(map_err!(Read))?
            .map(|g| g.value().to_string());
        Ok(owner)
    }

    pub fn group_of_server(&self, server: &HostPort) -> CatalogResult<Option<String>> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let idx = txn.open_table(SERVER_GROUPS).map_err(map_err!(Table))?;
        let owner = idx
            .get(server.to_string().as_str())
            .map_err(map_err!(Read))?
            .map(|g| g.value().to_string());
        Ok(owner)
    }

    // ── Online flag ────────────────────────────────────────────────

    /// Record whether group metadata is durably readable.
    pub fn set_online(&self, online: bool) -> CatalogResult<()> {
        let txn = self.db.begin_write().map_err(map_err!(Transaction))?;
        {
            let mut meta = txn.open_table(META).map_err(map_err!(Table))?;
            meta.insert(ONLINE_KEY, online).map_err(map_err!(Write))?;
        }
        txn.commit().map_err(map_err!(Transaction))?;
        info!(online, "catalog online flag updated");
        Ok(())
    }

    /// Read the online flag. A catalog that never set it is offline.
    pub fn online_flag(&self) -> CatalogResult<bool> {
        let txn = self.db.begin_read().map_err(map_err!(Transaction))?;
        let meta = txn.open_table(META).map_err(map_err!(Table))?;
        let online = meta
            .get(ONLINE_KEY)
            .map_err(map_err!(Read))?
            .is_some_and(|v| v.value());
        Ok(online)
    }
}

impl GroupCatalog for CatalogStore {
    fn is_online(&self) -> bool {
        match self.online_flag() {
            Ok(online) => online,
            Err(e) => {
                warn!(error = %e, "failed to read catalog online flag, treating as offline");
                false
            }
        }
    }

    fn list_groups(&self) -> CatalogResult<Vec<GroupInfo>> {
        CatalogStore::list_groups(self)
    }

    fn get_group(&self, name: &str) -> CatalogResult<Option<GroupInfo>> {
        CatalogStore::get_group(self, name)
    }

    fn group_of_table(&self, table: &TableName) -> CatalogResult<Option<String>> {
        CatalogStore::group_of_table(self, table)
    }

    fn group_of_server(&self, server: &HostPort) -> CatalogResult<Option<String>> {
        CatalogStore::group_of_server(self, server)
    }
}

fn read_group(
    table: &impl ReadableTable<&'static str, &'static [u8]>,
    name: &str,
) -> CatalogResult<Option<GroupInfo>> {
    match table.get(name).map_err(map_err!(Read))? {
        Some(guard) => {
            let group: GroupInfo =
                serde_json::from_slice(guard.value()).map_err(map_err!(Deserialize))?;
            Ok(Some(group))
        }
        None => Ok(None),
    }
}

fn write_group(table: &mut GroupTable<'_>, group: &GroupInfo) -> CatalogResult<()> {
    let value = serde_json::to_vec(group).map_err(map_err!(Serialize))?;
    table
        .insert(group.name.as_str(), value.as_slice())
        .map_err(map_err!(Write))?;
    Ok(())
}

/// Fail if `key` is owned by a group other than `group`.
fn check_owner(
    idx: &impl ReadableTable<&'static str, &'static str>,
    key: &str,
    group: &str,
) -> CatalogResult<()> {
    if let Some(owner) = idx.get(key).map_err(map_err!(Read))? {
        let owner = owner.value();
        if owner != group {
            return Err(CatalogError::Conflict(format!(
                "{key} already belongs to group {owner}"
            )));
        }
    }
    Ok(())
}
