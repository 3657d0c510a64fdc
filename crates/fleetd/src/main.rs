//! fleetd — the fleetscale daemon.
//!
//! # Usage
//!
//! ```text
//! fleetd run --config /etc/fleetscale/fleetd.toml --data-dir /var/lib/fleetscale
//! fleetd check-config --config /etc/fleetscale/fleetd.toml
//! fleetd group put --data-dir /var/lib/fleetscale --file web.toml
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use fleetd::{Daemon, FleetConfig, GroupFile};
use fleetscale_state::StateStore;

const DEFAULT_FILTER: &str = "info,fleetd=debug,fleetscale=debug";
const DB_FILE: &str = "fleetscale.redb";

#[derive(Parser)]
#[command(name = "fleetd", about = "fleetscale autoscaling daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the autoscaling control loop until Ctrl-C.
    Run {
        /// Config file (TOML). Defaults apply when omitted.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/fleetscale")]
        data_dir: PathBuf,

        /// Emit logs as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Validate a config file and print the effective configuration.
    CheckConfig {
        #[arg(long)]
        config: PathBuf,
    },

    /// Manage stored groups.
    Group {
        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/fleetscale")]
        data_dir: PathBuf,

        #[command(subcommand)]
        command: GroupCommand,
    },
}

#[derive(Subcommand)]
enum GroupCommand {
    /// Create or replace a group from a TOML file.
    Put {
        #[arg(long)]
        file: PathBuf,
    },
    /// List stored groups.
    List,
    /// Delete a group. Its history is kept.
    Delete { id: String },
    /// Show recent scaling events for a group, newest first.
    History {
        id: String,
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            data_dir,
            json,
        } => {
            init_tracing(json);
            run(config.as_deref(), &data_dir).await
        }
        Command::CheckConfig { config } => {
            let config = FleetConfig::from_file(&config)?;
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        Command::Group { data_dir, command } => {
            init_tracing(false);
            group(&data_dir, command)
        }
    }
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn open_store(data_dir: &Path) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("creating data dir {}", data_dir.display()))?;
    let db_path = data_dir.join(DB_FILE);
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");
    Ok(store)
}

async fn run(config_path: Option<&Path>, data_dir: &Path) -> anyhow::Result<()> {
    info!("fleetd starting");

    let config = match config_path {
        Some(path) => FleetConfig::from_file(path)?,
        None => FleetConfig::default(),
    };
    let store = open_store(data_dir)?;

    let mut daemon = Daemon::start(&config, Arc::new(store))?;

    let notification_log = daemon.take_notifications().map(|mut notifications| {
        tokio::spawn(async move {
            while let Some(notification) = notifications.recv().await {
                match serde_json::to_string(&notification) {
                    Ok(line) => info!(notification = %line, "scaling notification"),
                    Err(e) => tracing::warn!(error = %e, "unable to encode notification"),
                }
            }
        })
    });

    tokio::signal::ctrl_c()
        .await
        .context("installing Ctrl-C handler")?;
    info!("shutdown signal received");

    daemon.shutdown().await;
    if let Some(task) = notification_log {
        let _ = task.await;
    }

    info!("fleetd stopped");
    Ok(())
}

fn group(data_dir: &Path, command: GroupCommand) -> anyhow::Result<()> {
    let store = open_store(data_dir)?;

    match command {
        GroupCommand::Put { file } => {
            let group = GroupFile::from_file(&file)?.apply(&store)?;
            println!("stored group {} ({})", group.id, group.name);
        }
        GroupCommand::List => {
            for group in store.list_groups()? {
                println!(
                    "{}\t{}\t{}\t{}",
                    group.id,
                    group.name,
                    group.metric_type,
                    group.policy_type()
                );
            }
        }
        GroupCommand::Delete { id } => {
            if store.delete_group(&id)? {
                println!("deleted group {id}");
            } else {
                anyhow::bail!("group {id} not found");
            }
        }
        GroupCommand::History { id, limit } => {
            for status in store.group_history(&id, limit)? {
                println!("{}\t{:+}\t{}", status.created_at, status.delta, status.total);
            }
        }
    }
    Ok(())
}
