//! `shardctl group|table|server|catalog`: catalog administration.

use anyhow::{Result, bail};
use shardgrid_core::{GroupInfo, HostPort, TableName};
use tracing::info;

use super::Env;

pub fn group_add(env: &Env, name: &str, servers: &[String], tables: &[String]) -> Result<()> {
    let servers = servers
        .iter()
        .map(|s| s.parse::<HostPort>())
        .collect::<Result<Vec<_>, _>>()?;
    let group = GroupInfo::new(name)
        .with_servers(servers)
        .with_tables(tables.iter().map(TableName::new));

    let store = env.open_catalog()?;
    store.put_group(&group)?;
    info!(group = name, servers = group.servers.len(), tables = group.tables.len(), "group saved");
    println!("✓ Group {name} saved");
    Ok(())
}

pub fn group_list(env: &Env, format: &str) -> Result<()> {
    let groups = env.open_catalog()?.list_groups()?;
    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&groups)?),
        _ => {
            for group in &groups {
                println!("{}", format_group(group));
            }
        }
    }
    Ok(())
}

pub fn group_remove(env: &Env, name: &str) -> Result<()> {
    if !env.open_catalog()?.delete_group(name)? {
        bail!("group {name} does not exist");
    }
    println!("✓ Group {name} removed");
    Ok(())
}

pub fn table_move(env: &Env, table: &str, group: &str) -> Result<()> {
    env.open_catalog()?.move_table(&TableName::new(table), group)?;
    println!("✓ Table {table} moved to {group}");
    Ok(())
}

pub fn server_move(env: &Env, server: &str, group: &str) -> Result<()> {
    let host_port: HostPort = server.parse()?;
    env.open_catalog()?.move_server(&host_port, group)?;
    println!("✓ Server {host_port} moved to {group}");
    Ok(())
}

pub fn set_online(env: &Env, online: bool) -> Result<()> {
    env.open_catalog()?.set_online(online)?;
    println!("✓ Catalog marked {}", if online { "online" } else { "offline" });
    Ok(())
}

pub fn status(env: &Env) -> Result<()> {
    let store = env.open_catalog()?;
    let groups = store.list_groups()?;
    println!(
        "{} ({} groups)",
        if store.online_flag()? { "online" } else { "offline" },
        groups.len()
    );
    Ok(())
}

fn format_group(group: &GroupInfo) -> String {
    let join = |items: Vec<String>| if items.is_empty() { "-".to_string() } else { items.join(",") };
    format!(
        "{}\tservers={}\ttables={}",
        group.name,
        join(group.servers.iter().map(ToString::to_string).collect()),
        join(group.tables.iter().map(ToString::to_string).collect()),
    )
}
