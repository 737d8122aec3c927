//! `shardctl balance` and `shardctl assign`: run the group balancer against
//! JSON snapshots and print what it decides.
//!
//! Nothing is executed. Unassign requests issued during a balance are
//! collected and reported next to the move plans.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use shardgrid_balancer::{GroupBalancer, MasterContext, UnassignLog};
use shardgrid_core::{
    Assignments, ClusterState, ClusterStatus, Destination, Region, RegionPlan, ServerName,
};
use tracing::info;

use super::Env;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AssignMode {
    RoundRobin,
    Immediate,
    Retain,
    Random,
}

/// Regions hosted by one server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    pub server: ServerName,
    #[serde(default)]
    pub regions: Vec<Region>,
}

/// Input of `shardctl balance`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub servers: Vec<ServerEntry>,
}

impl ClusterSnapshot {
    pub fn to_state(&self) -> ClusterState {
        let mut state = ClusterState::new();
        for entry in &self.servers {
            state
                .entry(entry.server.clone())
                .or_default()
                .extend(entry.regions.iter().cloned());
        }
        state
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Placement {
    pub region: Region,
    pub server: ServerName,
}

/// Input of `shardctl assign`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignRequest {
    /// Servers currently online.
    pub servers: Vec<ServerName>,
    /// Regions to place (round-robin, immediate, random).
    #[serde(default)]
    pub regions: Vec<Region>,
    /// Existing placement (retain).
    #[serde(default)]
    pub current: Vec<Placement>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceReport {
    pub plans: Vec<RegionPlan>,
    pub unassigned: Vec<Region>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentEntry {
    pub destination: Destination,
    pub regions: Vec<Region>,
}

pub fn balance(env: &Env, cluster: &Path) -> Result<()> {
    let snapshot: ClusterSnapshot = read_json(cluster)?;
    let report = run_balance(env, &snapshot)?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

pub fn assign(env: &Env, mode: AssignMode, input: &Path) -> Result<()> {
    let request: AssignRequest = read_json(input)?;
    let entries = run_assign(env, mode, &request)?;
    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("invalid JSON in {}", path.display()))
}

fn build_balancer(env: &Env, live_servers: Vec<ServerName>) -> Result<(GroupBalancer, Arc<UnassignLog>)> {
    let catalog = env.open_catalog()?;
    let log = Arc::new(UnassignLog::new());
    let context = MasterContext::new(log.clone()).with_cluster_status(ClusterStatus {
        live_servers,
        dead_servers: Vec::new(),
    });
    let balancer = GroupBalancer::builder(Arc::new(catalog), context)
        .config(env.config.balancer.clone())
        .build()?;
    Ok((balancer, log))
}

pub fn run_balance(env: &Env, snapshot: &ClusterSnapshot) -> Result<BalanceReport> {
    let state = snapshot.to_state();
    let (balancer, log) = build_balancer(env, state.keys().cloned().collect())?;

    let plans = balancer.balance_cluster(&state)?;
    let report = BalanceReport {
        plans,
        unassigned: log.requests(),
    };
    info!(
        delegate = balancer.delegate_name(),
        plans = report.plans.len(),
        unassigned = report.unassigned.len(),
        "balance finished"
    );
    balancer.stop("balance finished");
    Ok(report)
}

pub fn run_assign(env: &Env, mode: AssignMode, request: &AssignRequest) -> Result<Vec<AssignmentEntry>> {
    let (balancer, _) = build_balancer(env, request.servers.clone())?;
    let servers = &request.servers;

    let assignments: Assignments = match mode {
        AssignMode::RoundRobin => balancer.round_robin_assignment(&request.regions, servers)?,
        AssignMode::Immediate => {
            group_by_destination(balancer.immediate_assignment(&request.regions, servers)?)
        }
        AssignMode::Retain => {
            let current: BTreeMap<Region, ServerName> = request
                .current
                .iter()
                .map(|p| (p.region.clone(), p.server.clone()))
                .collect();
            balancer.retain_assignment(&current, servers)?
        }
        AssignMode::Random => {
            let mut placed = BTreeMap::new();
            for region in &request.regions {
                placed.insert(region.clone(), balancer.random_assignment(region, servers)?);
            }
            group_by_destination(placed)
        }
    };
    balancer.stop("assignment finished");

    Ok(assignments
        .into_iter()
        .map(|(destination, regions)| AssignmentEntry { destination, regions })
        .collect())
}

fn group_by_destination(placed: BTreeMap<Region, Destination>) -> Assignments {
    let mut assignments = Assignments::new();
    for (region, destination) in placed {
        assignments.entry(destination).or_default().push(region);
    }
    assignments
}
