//! Misplacement detection.
//!
//! A region is misplaced when the server hosting it is not a member of the
//! group owning its table, or when that group cannot be resolved at all.
//! The corrector only classifies: it never unassigns anything itself. The
//! caller decides what to do with the misplaced set.

use std::collections::{BTreeMap, HashMap};

use tracing::{debug, warn};

use shardgrid_catalog::{CatalogResult, GroupCatalog};
use shardgrid_core::{ClusterState, GroupInfo, Region, ServerName, TableName};

/// A region found outside its group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Misplaced {
    pub region: Region,
    /// Where the region currently is.
    pub server: ServerName,
    /// The group that should own it, if it could be resolved.
    pub group: Option<GroupInfo>,
}

/// Cluster state with misplaced regions pulled out.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterCorrection {
    /// Every server of the input, including ones left with no regions.
    pub corrected: ClusterState,
    pub misplaced: Vec<Misplaced>,
}

/// Correctly placed regions of one group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPlacement {
    pub group: GroupInfo,
    pub assignments: BTreeMap<Region, ServerName>,
}

/// Region → server map split into correctly placed and misplaced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssignmentSplit {
    /// Correct placements keyed by group name.
    pub valid: BTreeMap<String, GroupPlacement>,
    pub misplaced: Vec<Misplaced>,
}

impl AssignmentSplit {
    pub fn valid_count(&self) -> usize {
        self.valid.values().map(|p| p.assignments.len()).sum()
    }
}

pub struct MisplacementCorrector<'a> {
    catalog: &'a dyn GroupCatalog,
}

impl<'a> MisplacementCorrector<'a> {
    pub fn new(catalog: &'a dyn GroupCatalog) -> Self {
        Self { catalog }
    }

    /// Remove misplaced regions from `state`.
    ///
    /// Catalog errors are returned as-is; a partially corrected view is
    /// never handed out.
    pub fn correct_cluster(&self, state: &ClusterState) -> CatalogResult<ClusterCorrection> {
        let mut groups = GroupLookup::new(self.catalog);
        let mut correction = ClusterCorrection::default();

        for (server, regions) in state {
            let mut kept = Vec::with_capacity(regions.len());
            for region in regions {
                let group = groups.group_for(&region.table)?;
                if self.is_misplaced(group.as_ref(), region, server) {
                    correction.misplaced.push(Misplaced {
                        region: region.clone(),
                        server: server.clone(),
                        group,
                    });
                } else {
                    kept.push(region.clone());
                }
            }
            correction.corrected.insert(server.clone(), kept);
        }

        debug!(
            servers = state.len(),
            misplaced = correction.misplaced.len(),
            "cluster state corrected"
        );
        Ok(correction)
    }

    /// Split a region → server map into per-group valid placements and
    /// misplaced regions.
    pub fn split_assignments(&self, assignments: &BTreeMap<Region, ServerName>) -> CatalogResult<AssignmentSplit> {
        let mut groups = GroupLookup::new(self.catalog);
        let mut split = AssignmentSplit::default();

        for (region, server) in assignments {
            let group = groups.group_for(&region.table)?;
            match group {
                Some(info) if info.contains_server(&server.host_port()) => {
                    split
                        .valid
                        .entry(info.name.clone())
                        .or_insert_with(|| GroupPlacement {
                            group: info,
                            assignments: BTreeMap::new(),
                        })
                        .assignments
                        .insert(region.clone(), server.clone());
                }
                group => {
                    self.log_misplaced(group.as_ref(), region, server);
                    split.misplaced.push(Misplaced {
                        region: region.clone(),
                        server: server.clone(),
                        group,
                    });
                }
            }
        }

        debug!(
            valid = split.valid_count(),
            misplaced = split.misplaced.len(),
            "assignments split"
        );
        Ok(split)
    }

    fn is_misplaced(&self, group: Option<&GroupInfo>, region: &Region, server: &ServerName) -> bool {
        let placed = group.is_some_and(|g| g.contains_server(&server.host_port()));
        if !placed {
            self.log_misplaced(group, region, server);
        }
        !placed
    }

    fn log_misplaced(&self, group: Option<&GroupInfo>, region: &Region, server: &ServerName) {
        // Only for the log line; a lookup failure here is not worth failing over.
        let actual = self
            .catalog
            .group_of_server(&server.host_port())
            .ok()
            .flatten();
        warn!(
            %region,
            %server,
            expected = group.map(|g| g.name.as_str()).unwrap_or("<unknown>"),
            actual = actual.as_deref().unwrap_or("<none>"),
            "found misplaced region"
        );
    }
}

/// Table → group resolution, remembered for the duration of one call.
struct GroupLookup<'a> {
    catalog: &'a dyn GroupCatalog,
    by_table: HashMap<TableName, Option<GroupInfo>>,
}

impl<'a> GroupLookup<'a> {
    fn new(catalog: &'a dyn GroupCatalog) -> Self {
        Self {
            catalog,
            by_table: HashMap::new(),
        }
    }

    fn group_for(&mut self, table: &TableName) -> CatalogResult<Option<GroupInfo>> {
        if let Some(cached) = self.by_table.get(table) {
            return Ok(cached.clone());
        }
        let group = match self.catalog.group_of_table(table)? {
            Some(name) => self.catalog.get_group(&name)?,
            None => None,
        };
        self.by_table.insert(table.clone(), group.clone());
        Ok(group)
    }
}
