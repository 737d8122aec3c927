//! Group partitioner: splits a cluster-wide request into per-group buckets.
//!
//! Every region lands in exactly one bucket, keyed by the name of the group
//! owning its table. Regions whose group cannot be resolved are kept under
//! the `None` key rather than dropped, so they still show up in the result
//! (as unplaceable).

use std::collections::BTreeMap;

use tracing::{debug, warn};

use shardgrid_catalog::{CatalogResult, GroupCatalog};
use shardgrid_core::{Destination, GroupInfo, Region, ServerName};

use crate::error::{BalancerError, BalancerResult};

/// Group name, or `None` for regions whose table has no resolvable group.
pub type GroupKey = Option<String>;

/// One group's share of a placement request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupBucket {
    pub regions: Vec<Region>,
    /// Online members of the group, or just [`Destination::Unplaceable`]
    /// when none are online. Never empty.
    pub candidates: Vec<Destination>,
}

impl GroupBucket {
    /// Candidate servers, without the fallback entry.
    pub fn servers(&self) -> Vec<ServerName> {
        self.candidates
            .iter()
            .filter_map(|d| d.server().cloned())
            .collect()
    }

    /// True when no real server can take this bucket's regions.
    pub fn is_unplaceable(&self) -> bool {
        self.candidates.iter().all(Destination::is_unplaceable)
    }
}

/// Per-group buckets for one request.
pub type GroupMaps = BTreeMap<GroupKey, GroupBucket>;

/// Keep the `online` servers whose host:port is a member of `group`.
///
/// Output follows the group's member order. A missing group yields nothing.
pub fn filter_online_servers(group: Option<&GroupInfo>, online: &[ServerName]) -> Vec<ServerName> {
    let Some(group) = group else {
        debug!("group information missing, some regions might be unassigned");
        return Vec::new();
    };
    group
        .servers
        .iter()
        .flat_map(|member| online.iter().filter(move |s| s.is_at(member)))
        .cloned()
        .collect()
}

pub struct GroupPartitioner<'a> {
    catalog: &'a dyn GroupCatalog,
}

impl<'a> GroupPartitioner<'a> {
    pub fn new(catalog: &'a dyn GroupCatalog) -> Self {
        Self { catalog }
    }

    /// Bucket `regions` by owning group and attach each group's online servers.
    ///
    /// Any catalog failure aborts the whole call: placing on partial group
    /// information could put a region outside its group.
    pub fn partition(&self, regions: &[Region], servers: &[ServerName]) -> BalancerResult<GroupMaps> {
        self.try_partition(regions, servers)
            .map_err(BalancerError::GroupMaps)
    }

    fn try_partition(&self, regions: &[Region], servers: &[ServerName]) -> CatalogResult<GroupMaps> {
        let mut by_group: BTreeMap<GroupKey, Vec<Region>> = BTreeMap::new();
        for region in regions {
            let group = self.catalog.group_of_table(&region.table)?;
            if group.is_none() {
                warn!(table = %region.table, region = %region, "group for table is not resolvable");
            }
            by_group.entry(group).or_default().push(region.clone());
        }

        let mut maps = GroupMaps::new();
        for (key, regions) in by_group {
            let online = self.candidates_for(&key, servers)?;
            let candidates = if online.is_empty() {
                vec![Destination::Unplaceable]
            } else {
                online.into_iter().map(Destination::Server).collect()
            };
            debug!(group = ?key, regions = regions.len(), candidates = candidates.len(), "group bucket built");
            maps.insert(key, GroupBucket { regions, candidates });
        }
        Ok(maps)
    }

    /// Online members of the group named by `key`.
    pub fn candidates_for(&self, key: &GroupKey, servers: &[ServerName]) -> CatalogResult<Vec<ServerName>> {
        let group = match key {
            Some(name) => self.catalog.get_group(name)?,
            None => None,
        };
        Ok(filter_online_servers(group.as_ref(), servers))
    }
}
