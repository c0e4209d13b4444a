//! `treelined` — the Treeline node daemon.
//!
//! Binary entrypoint that wires the cluster state controller to a store,
//! a local tree-head database, and an election.
//!
//! # Usage
//!
//! ```text
//! treelined start                     # start with defaults
//! treelined start -c treeline.toml    # start with a config file
//! treelined start --memory            # no disk persistence
//! ```
//!
//! The daemon currently runs in standalone mode: the in-process store
//! and election stand in for a multi-node deployment, which keeps the
//! wiring honest for local development and smoke testing.

mod config;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use treeline_cluster::ClusterStateController;
use treeline_db::{TreeHeadDatabase, TreeHeadDb};
use treeline_election::{Election, StandaloneElection};
use treeline_store::{ConsistentStore, MemoryStore};
use treeline_types::ClusterConfig;

use config::CliConfig;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "treelined", version, about = "Treeline log cluster daemon")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Treeline node.
    Start {
        /// Override the data directory.
        #[arg(short, long)]
        data_dir: Option<PathBuf>,

        /// Run fully in-memory (no disk persistence).
        #[arg(short, long)]
        memory: bool,
    },
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    telemetry::init(&config.log.level);

    match cli.command {
        Commands::Start { data_dir, memory } => {
            if let Some(dir) = data_dir {
                config.node.data_dir = dir;
            }
            cmd_start(config, memory).await
        }
    }
}

// -----------------------------------------------------------------------
// treelined start
// -----------------------------------------------------------------------

async fn cmd_start(config: CliConfig, memory: bool) -> Result<()> {
    info!(
        node_id = %config.node.node_id,
        hostname = %config.node.hostname,
        log_port = config.node.log_port,
        data_dir = %config.node.data_dir.display(),
        memory,
        "starting treelined"
    );

    // --- Local tree-head database ---
    let db: Arc<dyn TreeHeadDatabase> = if memory {
        Arc::new(TreeHeadDb::in_memory())
    } else {
        std::fs::create_dir_all(&config.node.data_dir)
            .context("failed to create data directory")?;
        Arc::new(TreeHeadDb::open(&config.node.data_dir).context("failed to open database")?)
    };

    // --- Consistent store and election (standalone mode) ---
    let store = Arc::new(MemoryStore::new());
    store.set_cluster_config(ClusterConfig {
        minimum_serving_nodes: config.cluster.minimum_serving_nodes,
        minimum_serving_fraction: config.cluster.minimum_serving_fraction,
    });
    let election = Arc::new(StandaloneElection::new());

    // --- Controller ---
    let controller = ClusterStateController::spawn(
        config.node.node_id.clone(),
        Arc::clone(&store) as Arc<dyn ConsistentStore>,
        Arc::clone(&db),
        Arc::clone(&election) as Arc<dyn Election>,
    );
    controller
        .set_node_host_port(&config.node.hostname, config.node.log_port)
        .await;

    // Resume from whatever the local database already holds.
    if let Some(sth) = db.latest_tree_head().context("failed to read local tree head")? {
        info!(
            tree_size = sth.tree_size,
            timestamp = sth.timestamp,
            "announcing tree head from local database"
        );
        controller.new_tree_head(sth).await;
    }

    info!("treelined running, press ctrl-c to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;

    info!("shutting down");
    controller.shutdown().await;
    Ok(())
}
