//! Shared fixtures for the balancer integration tests.
//!
//! `FakeCatalog` is an in-memory `GroupCatalog` with switchable failures and
//! a read counter. `RecordingPolicy` is a deterministic delegate that logs
//! every call it receives.

#![allow(dead_code)]

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

use shardgrid_balancer::{BalancerError, BalancerResult, DelegatePolicy, MasterContext};
use shardgrid_catalog::{CatalogError, CatalogResult, GroupCatalog};
use shardgrid_core::{
    Assignments, BalancerConfig, ClusterState, Destination, GroupInfo, HostPort, Region, RegionPlan,
    ServerAssignments, ServerName, TableName,
};

pub const PORT: u16 = 16020;

static TRACING_INIT: Once = Once::new();

/// Route `tracing` output through the test harness. Controlled by `RUST_LOG`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init()
            .ok();
    });
}

pub fn server(host: &str) -> ServerName {
    ServerName::new(host, PORT, 1)
}

pub fn host(host: &str) -> HostPort {
    HostPort::new(host, PORT)
}

pub fn group(name: &str, hosts: &[&str], tables: &[&str]) -> GroupInfo {
    GroupInfo::new(name)
        .with_servers(hosts.iter().map(|h| host(h)))
        .with_tables(tables.iter().map(|t| TableName::new(*t)))
}

/// G1 = {s1, s2} owning table1, G2 = {s3} owning table2.
pub fn two_groups() -> Arc<FakeCatalog> {
    Arc::new(FakeCatalog::new(vec![
        group("g1", &["s1", "s2"], &["table1"]),
        group("g2", &["s3"], &["table2"]),
    ]))
}

// ── Fake catalog ──────────────────────────────────────────────────

pub struct FakeCatalog {
    groups: BTreeMap<String, GroupInfo>,
    online: AtomicBool,
    reads: AtomicUsize,
    fail_list: AtomicBool,
    failing_groups: Mutex<BTreeSet<String>>,
    failing_tables: Mutex<BTreeSet<TableName>>,
}

impl FakeCatalog {
    pub fn new(groups: Vec<GroupInfo>) -> Self {
        Self {
            groups: groups.into_iter().map(|g| (g.name.clone(), g)).collect(),
            online: AtomicBool::new(true),
            reads: AtomicUsize::new(0),
            fail_list: AtomicBool::new(false),
            failing_groups: Mutex::new(BTreeSet::new()),
            failing_tables: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Metadata reads so far. `is_online` is not counted.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn fail_list_groups(&self) {
        self.fail_list.store(true, Ordering::SeqCst);
    }

    pub fn fail_group(&self, name: &str) {
        self.failing_groups.lock().unwrap().insert(name.to_string());
    }

    pub fn fail_table(&self, table: &str) {
        self.failing_tables.lock().unwrap().insert(TableName::new(table));
    }

    fn read(&self) {
        self.reads.fetch_add(1, Ordering::SeqCst);
    }
}

impl GroupCatalog for FakeCatalog {
    fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    fn list_groups(&self) -> CatalogResult<Vec<GroupInfo>> {
        self.read();
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(CatalogError::Unavailable("list groups".into()));
        }
        Ok(self.groups.values().cloned().collect())
    }

    fn get_group(&self, name: &str) -> CatalogResult<Option<GroupInfo>> {
        self.read();
        if self.failing_groups.lock().unwrap().contains(name) {
            return Err(CatalogError::Unavailable(format!("group {name}")));
        }
        Ok(self.groups.get(name).cloned())
    }

    fn group_of_table(&self, table: &TableName) -> CatalogResult<Option<String>> {
        self.read();
        if self.failing_tables.lock().unwrap().contains(table) {
            return Err(CatalogError::Unavailable(format!("table {table}")));
        }
        Ok(self
            .groups
            .values()
            .find(|g| g.contains_table(table))
            .map(|g| g.name.clone()))
    }

    fn group_of_server(&self, server: &HostPort) -> CatalogResult<Option<String>> {
        self.read();
        Ok(self
            .groups
            .values()
            .find(|g| g.contains_server(server))
            .map(|g| g.name.clone()))
    }
}

// ── Recording delegate ────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub op: &'static str,
    pub regions: Vec<Region>,
    pub servers: Vec<ServerName>,
}

/// Handle on a `RecordingPolicy`'s call log, kept by the test after the
/// policy itself is moved into the balancer.
#[derive(Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<Call>>>);

impl CallLog {
    pub fn calls(&self) -> Vec<Call> {
        self.0.lock().unwrap().clone()
    }

    pub fn ops(&self) -> Vec<&'static str> {
        self.calls().iter().map(|c| c.op).collect()
    }

    pub fn of(&self, op: &str) -> Vec<Call> {
        self.calls().into_iter().filter(|c| c.op == op).collect()
    }

    fn push(&self, op: &'static str, regions: Vec<Region>, servers: Vec<ServerName>) {
        self.0.lock().unwrap().push(Call { op, regions, servers });
    }
}

/// Deterministic delegate:
///
/// - round robin: i-th region on `servers[i % n]`
/// - immediate / random: first server
/// - retain: previous server if live by host:port, else first server
/// - balance: moves one region from the fullest to the emptiest server
///   when they differ by two or more
#[derive(Default)]
pub struct RecordingPolicy {
    log: CallLog,
    /// Balance fails when the sub-state contains this host.
    fail_balance_on: Option<String>,
    /// Random assignment answers `None`.
    refuse_random: bool,
}

impl RecordingPolicy {
    pub fn new() -> (Self, CallLog) {
        let policy = Self::default();
        let log = policy.log.clone();
        (policy, log)
    }

    pub fn fail_balance_on(mut self, host: &str) -> Self {
        self.fail_balance_on = Some(host.to_string());
        self
    }

    pub fn refuse_random(mut self) -> Self {
        self.refuse_random = true;
        self
    }
}

impl DelegatePolicy for RecordingPolicy {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn initialize(&mut self, ctx: &MasterContext) -> BalancerResult<()> {
        self.log
            .push("initialize", Vec::new(), ctx.cluster_status.live_servers.clone());
        Ok(())
    }

    fn balance_cluster(&self, state: &ClusterState) -> BalancerResult<Vec<RegionPlan>> {
        self.log.push(
            "balance",
            state.values().flatten().cloned().collect(),
            state.keys().cloned().collect(),
        );
        if let Some(bad) = &self.fail_balance_on {
            if state.keys().any(|s| &s.host == bad) {
                return Err(BalancerError::Delegate(format!("balance failed on {bad}")));
            }
        }

        let fullest = state.iter().max_by_key(|(_, r)| r.len());
        let emptiest = state.iter().min_by_key(|(_, r)| r.len());
        match (fullest, emptiest) {
            (Some((from, regions)), Some((to, target))) if regions.len() >= target.len() + 2 => {
                let region = regions[regions.len() - 1].clone();
                Ok(vec![RegionPlan::new(region, Some(from.clone()), to.clone())])
            }
            _ => Ok(Vec::new()),
        }
    }

    fn round_robin_assignment(
        &self,
        regions: &[Region],
        servers: &[ServerName],
    ) -> BalancerResult<ServerAssignments> {
        self.log.push("round_robin", regions.to_vec(), servers.to_vec());
        let mut out = ServerAssignments::new();
        if servers.is_empty() {
            return Ok(out);
        }
        for (i, region) in regions.iter().enumerate() {
            out.entry(servers[i % servers.len()].clone())
                .or_default()
                .push(region.clone());
        }
        Ok(out)
    }

    fn retain_assignment(
        &self,
        regions: &BTreeMap<Region, ServerName>,
        servers: &[ServerName],
    ) -> BalancerResult<ServerAssignments> {
        self.log
            .push("retain", regions.keys().cloned().collect(), servers.to_vec());
        let mut out = ServerAssignments::new();
        for (region, previous) in regions {
            let live = servers
                .iter()
                .find(|s| s.is_at(&previous.host_port()))
                .or_else(|| servers.first());
            if let Some(server) = live {
                out.entry(server.clone()).or_default().push(region.clone());
            }
        }
        Ok(out)
    }

    fn immediate_assignment(
        &self,
        regions: &[Region],
        servers: &[ServerName],
    ) -> BalancerResult<BTreeMap<Region, ServerName>> {
        self.log.push("immediate", regions.to_vec(), servers.to_vec());
        Ok(match servers.first() {
            Some(first) => regions.iter().map(|r| (r.clone(), first.clone())).collect(),
            None => BTreeMap::new(),
        })
    }

    fn random_assignment(
        &self,
        region: &Region,
        servers: &[ServerName],
    ) -> BalancerResult<Option<ServerName>> {
        self.log.push("random", vec![region.clone()], servers.to_vec());
        if self.refuse_random {
            return Ok(None);
        }
        Ok(servers.first().cloned())
    }

    fn on_configuration_change(&mut self, _config: &BalancerConfig) {
        self.log.push("configuration_change", Vec::new(), Vec::new());
    }

    fn stop(&self, _why: &str) {
        self.log.push("stop", Vec::new(), Vec::new());
    }
}

// ── Assertions ────────────────────────────────────────────────────

/// Every region placed on a real server sits inside its table's group.
pub fn assert_within_groups(catalog: &FakeCatalog, assignments: &Assignments) {
    for (dest, regions) in assignments {
        let Destination::Server(server) = dest else {
            continue;
        };
        for region in regions {
            let name = catalog
                .group_of_table(&region.table)
                .unwrap()
                .unwrap_or_else(|| panic!("{region} has no group but was placed on {server}"));
            let group = catalog.get_group(&name).unwrap().unwrap();
            assert!(
                group.contains_server(&server.host_port()),
                "{region} of group {name} placed on {server}"
            );
        }
    }
}

pub fn sorted(mut regions: Vec<Region>) -> Vec<Region> {
    regions.sort();
    regions
}
