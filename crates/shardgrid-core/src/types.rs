//! Shared types used across ShardGrid crates.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when a server or host:port string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseNameError {
    #[error("missing port in {0:?}")]
    MissingPort(String),

    #[error("invalid port in {0:?}")]
    InvalidPort(String),

    #[error("invalid start code in {0:?}")]
    InvalidStartCode(String),

    #[error("empty host in {0:?}")]
    EmptyHost(String),
}

// ── Servers ───────────────────────────────────────────────────────

/// A `host:port` pair, the identity used for group membership.
///
/// Restarts of the same process keep the same `HostPort`, so a group
/// never has to be rewritten when a server bounces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct HostPort {
    pub host: String,
    pub port: u16,
}

impl HostPort {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for HostPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl FromStr for HostPort {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (host, port) = s
            .rsplit_once(':')
            .ok_or_else(|| ParseNameError::MissingPort(s.to_string()))?;
        if host.is_empty() {
            return Err(ParseNameError::EmptyHost(s.to_string()));
        }
        let port = port
            .parse()
            .map_err(|_| ParseNameError::InvalidPort(s.to_string()))?;
        Ok(Self::new(host, port))
    }
}

/// Full identity of a live server process.
///
/// Two `ServerName`s with the same host and port but different start codes
/// are different incarnations of the same server.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ServerName {
    pub host: String,
    pub port: u16,
    /// Start/incarnation marker (typically the process start time in millis).
    pub start_code: u64,
}

impl ServerName {
    pub fn new(host: impl Into<String>, port: u16, start_code: u64) -> Self {
        Self {
            host: host.into(),
            port,
            start_code,
        }
    }

    pub fn host_port(&self) -> HostPort {
        HostPort::new(self.host.clone(), self.port)
    }

    /// Whether this server lives at the given `host:port`, regardless of
    /// incarnation.
    pub fn is_at(&self, host_port: &HostPort) -> bool {
        self.port == host_port.port && self.host == host_port.host
    }
}

impl fmt::Display for ServerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{}", self.host, self.port, self.start_code)
    }
}

impl FromStr for ServerName {
    type Err = ParseNameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ',');
        let host = parts.next().unwrap_or_default();
        if host.is_empty() {
            return Err(ParseNameError::EmptyHost(s.to_string()));
        }
        let port = parts
            .next()
            .ok_or_else(|| ParseNameError::MissingPort(s.to_string()))?
            .parse()
            .map_err(|_| ParseNameError::InvalidPort(s.to_string()))?;
        let start_code = match parts.next() {
            Some(code) => code
                .parse()
                .map_err(|_| ParseNameError::InvalidStartCode(s.to_string()))?,
            None => 0,
        };
        Ok(Self::new(host, port, start_code))
    }
}

// ── Tables & regions ──────────────────────────────────────────────

/// Name of a table. Every table is owned by exactly one group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableName(pub String);

impl TableName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TableName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A contiguous, independently placeable slice of one table's data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Region {
    pub table: TableName,
    /// Displayable region name, unique within its table.
    pub name: String,
}

impl Region {
    pub fn new(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: TableName::new(table),
            name: name.into(),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.table, self.name)
    }
}

// ── Groups ────────────────────────────────────────────────────────

/// A named partition of the cluster's servers and the tables it owns.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct GroupInfo {
    pub name: String,
    pub servers: BTreeSet<HostPort>,
    pub tables: BTreeSet<TableName>,
}

impl GroupInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_servers(mut self, servers: impl IntoIterator<Item = HostPort>) -> Self {
        self.servers.extend(servers);
        self
    }

    pub fn with_tables(mut self, tables: impl IntoIterator<Item = TableName>) -> Self {
        self.tables.extend(tables);
        self
    }

    pub fn contains_server(&self, server: &HostPort) -> bool {
        self.servers.contains(server)
    }

    pub fn contains_table(&self, table: &TableName) -> bool {
        self.tables.contains(table)
    }
}

// ── Placement ─────────────────────────────────────────────────────

/// Where a region should go.
///
/// `Unplaceable` is the fallback bucket: no eligible server was found and
/// the region is left for the assignment subsystem's recovery path.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "kind", content = "server", rename_all = "snake_case")]
pub enum Destination {
    Server(ServerName),
    Unplaceable,
}

impl Destination {
    pub fn server(&self) -> Option<&ServerName> {
        match self {
            Destination::Server(s) => Some(s),
            Destination::Unplaceable => None,
        }
    }

    pub fn is_unplaceable(&self) -> bool {
        matches!(self, Destination::Unplaceable)
    }
}

impl From<ServerName> for Destination {
    fn from(server: ServerName) -> Self {
        Destination::Server(server)
    }
}

impl From<Option<ServerName>> for Destination {
    fn from(server: Option<ServerName>) -> Self {
        server.map_or(Destination::Unplaceable, Destination::Server)
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Server(s) => s.fmt(f),
            Destination::Unplaceable => f.write_str("<unplaceable>"),
        }
    }
}

/// A proposed move of one region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionPlan {
    pub region: Region,
    pub source: Option<ServerName>,
    pub destination: ServerName,
}

impl RegionPlan {
    pub fn new(region: Region, source: Option<ServerName>, destination: ServerName) -> Self {
        Self {
            region,
            source,
            destination,
        }
    }
}

/// Server → regions currently hosted there. Supplied per balancing cycle.
pub type ClusterState = BTreeMap<ServerName, Vec<Region>>;

/// Bulk assignment result as produced by a delegate policy.
pub type ServerAssignments = BTreeMap<ServerName, Vec<Region>>;

/// Bulk assignment result including the fallback bucket.
pub type Assignments = BTreeMap<Destination, Vec<Region>>;

/// Convert a delegate's server-keyed result into destination-keyed form.
pub fn to_assignments(result: ServerAssignments) -> Assignments {
    result
        .into_iter()
        .map(|(server, regions)| (Destination::Server(server), regions))
        .collect()
}

/// Merge `other` into `into`, extending lists that share a destination.
pub fn merge_assignments(into: &mut Assignments, other: Assignments) {
    for (dest, regions) in other {
        into.entry(dest).or_default().extend(regions);
    }
}

/// Snapshot of cluster liveness handed to placement policies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterStatus {
    pub live_servers: Vec<ServerName>,
    pub dead_servers: Vec<ServerName>,
}
