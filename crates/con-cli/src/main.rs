//! con - administrative CLI for the agent fleet.
//!
//! Embeds `con-core`: the per-agent drain loop, the outer-inbox router, the
//! contract healthcheck, and provisioning, plus a few presentational
//! subcommands for operators.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

mod commands;

/// con - host-local agent fleet orchestrator
#[derive(Parser, Debug)]
#[command(name = "con")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the fleet configuration file
    #[arg(short, long, env = "CON_CONFIG", default_value = "/etc/con/con.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Drain an agent's inbox until empty
    Run {
        /// Agent name
        name: String,

        /// Keep draining on an interval instead of exiting
        #[arg(long)]
        continuous: bool,
    },

    /// Move outer-inbox tasks to the router agent
    RouteInbox,

    /// Evaluate contracts and dispatch failure actions
    Healthcheck,

    /// Drop a task into the outer inbox
    Task {
        /// Task content
        message: String,
    },

    /// Provision users, directories, ACLs, units, and instruction documents
    Provision,

    /// Show per-agent unit activity and inbox depth
    Status,

    /// Show recent audit log entries
    Logs,

    /// Show the latest response per agent
    Responses,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_new(&cli.log_level).unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let layout = con_core::Layout::default();

    match cli.command {
        Commands::Run { name, continuous } => {
            commands::run::run(&cli.config, &layout, &name, continuous)
        }
        Commands::RouteInbox => commands::route::route_inbox(&cli.config, &layout),
        Commands::Healthcheck => commands::healthcheck::healthcheck(&layout),
        Commands::Task { message } => commands::task::drop_task(&layout, &message),
        Commands::Provision => commands::provision::provision(&cli.config, &layout),
        Commands::Status => commands::status::status(&layout),
        Commands::Logs => commands::logs::logs(&layout),
        Commands::Responses => commands::responses::responses(&layout),
    }
}
