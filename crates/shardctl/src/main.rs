use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

use commands::plan::AssignMode;

#[derive(Parser)]
#[command(
    name = "shardctl",
    about = "ShardGrid: group-aware region placement",
    version,
    propagate_version = true,
)]
struct Cli {
    /// Path to shardgrid.toml
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
    /// Catalog database file. Overrides [catalog].path from the config.
    #[arg(long, global = true)]
    catalog: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage groups
    Group {
        #[command(subcommand)]
        action: GroupAction,
    },
    /// Move tables between groups
    Table {
        #[command(subcommand)]
        action: TableAction,
    },
    /// Move servers between groups
    Server {
        #[command(subcommand)]
        action: ServerAction,
    },
    /// Inspect or flip the catalog's online flag
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
    /// Plan a group-aware balance for a cluster snapshot.
    ///
    /// The snapshot is JSON: {"servers": [{"server": {...}, "regions": [...]}]}.
    /// Prints the move plans and the regions that would be unassigned.
    Balance {
        /// Cluster snapshot file
        #[arg(long)]
        cluster: PathBuf,
    },
    /// Compute region assignments for a request file
    Assign {
        #[arg(short, long, value_enum, default_value = "round-robin")]
        mode: AssignMode,
        /// Request file: {"servers": [...], "regions": [...], "current": [...]}
        #[arg(short, long)]
        input: PathBuf,
    },
}

#[derive(Subcommand)]
enum GroupAction {
    /// Create or replace a group
    Add {
        name: String,
        /// Member server as host:port (repeatable)
        #[arg(short, long = "server")]
        servers: Vec<String>,
        /// Owned table (repeatable)
        #[arg(short, long = "table")]
        tables: Vec<String>,
    },
    /// List all groups
    List {
        /// Output format: text or json
        #[arg(short, long, default_value = "text")]
        format: String,
    },
    /// Remove a group
    Remove { name: String },
}

#[derive(Subcommand)]
enum TableAction {
    Move { table: String, group: String },
}

#[derive(Subcommand)]
enum ServerAction {
    /// Move a host:port into a group
    Move { server: String, group: String },
}

#[derive(Subcommand)]
enum CatalogAction {
    Online,
    Offline,
    Status,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("shardctl=info".parse()?)
                .add_directive("shardgrid=info".parse()?)
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let env = commands::Env::load(cli.config.as_deref(), cli.catalog)?;

    match cli.command {
        Commands::Group { action } => match action {
            GroupAction::Add { name, servers, tables } => {
                commands::catalog::group_add(&env, &name, &servers, &tables)
            }
            GroupAction::List { format } => commands::catalog::group_list(&env, &format),
            GroupAction::Remove { name } => commands::catalog::group_remove(&env, &name),
        },
        Commands::Table { action: TableAction::Move { table, group } } => {
            commands::catalog::table_move(&env, &table, &group)
        }
        Commands::Server { action: ServerAction::Move { server, group } } => {
            commands::catalog::server_move(&env, &server, &group)
        }
        Commands::Catalog { action } => match action {
            CatalogAction::Online => commands::catalog::set_online(&env, true),
            CatalogAction::Offline => commands::catalog::set_online(&env, false),
            CatalogAction::Status => commands::catalog::status(&env),
        },
        Commands::Balance { cluster } => commands::plan::balance(&env, &cluster),
        Commands::Assign { mode, input } => commands::plan::assign(&env, mode, &input),
    }
}
