//! berthd — the berth daemon.
//!
//! Single binary that assembles the control plane:
//! - Status store (redb)
//! - Fleet manager + placement selector
//! - Creation and deletion workflow engines
//! - Reaper
//! - REST API + metrics
//!
//! The two pollers and the reaper are explicit tasks spawned here and
//! owned through a shutdown channel; nothing self-registers.
//!
//! # Usage
//!
//! ```text
//! berthd standalone --port 8460 --data-dir /var/lib/berth
//! ```
//!
//! Standalone mode binds the collaborator contracts to their in-process
//! implementations (memory fleet, memory queues); the cloud provider
//! bindings are deployment-specific and live outside this repository.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::watch;
use tracing::{info, warn};

use berth_config::{BerthConfig, CryptoMaterial, MasterCredentials, OperatorToken, PasswordVault};
use berth_envelope::Envelope;
use berth_fleet::FleetManager;
use berth_ids::IdAllocator;
use berth_metrics::Metrics;
use berth_placement::PlacementSelector;
use berth_provider::{MemoryClone, MemoryFleet, MemorySql};
use berth_queue::MemoryQueue;
use berth_reaper::Reaper;
use berth_schema::{CloneRunner, SchemaManager};
use berth_state::RecordStore;
use berth_workflow::{CreationEngine, DatabaseService, DeletionEngine, WorkflowContext};

/// Visibility timeout on the in-process queues.
const QUEUE_VISIBILITY: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "berthd", about = "Berth daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run single-node with in-process collaborators.
    Standalone {
        /// Port to listen on.
        #[arg(long, default_value = "8460")]
        port: u16,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/berth")]
        data_dir: PathBuf,

        /// Service configuration file (TOML); a built-in staging
        /// configuration is used when absent.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,berthd=debug,berth=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Standalone {
            port,
            data_dir,
            config,
        } => run_standalone(port, data_dir, config).await,
    }
}

async fn run_standalone(
    port: u16,
    data_dir: PathBuf,
    config_path: Option<PathBuf>,
) -> anyhow::Result<()> {
    info!("berth daemon starting in standalone mode");

    let config = Arc::new(match &config_path {
        Some(path) => BerthConfig::load(path)?,
        None => {
            warn!("no --config given, using the built-in staging configuration");
            BerthConfig::sample()
        }
    });

    // Ensure data directory exists.
    std::fs::create_dir_all(&data_dir)?;
    let db_path = data_dir.join("berth.redb");

    // ── Initialize subsystems ──────────────────────────────────

    // Status store.
    let store = RecordStore::open(&db_path)?;
    info!(path = ?db_path, "record store opened");

    // Envelope key material.
    let envelope = match config.crypto_file.as_deref().and_then(CryptoMaterial::load) {
        Some(material) => Envelope::derive(&material.passphrase, &material.salt),
        None => {
            warn!("no crypto material configured, deriving a standalone dev key");
            Envelope::derive("berth-standalone", "berth-standalone-salt")
        }
    };

    // Secret files.
    let allocator = IdAllocator::new(&config.identifier_prefix);
    let mut vault = PasswordVault::load(&config.password_file);
    if vault.is_empty() {
        warn!("password vault is empty, generating standalone credentials for default hosts");
        vault = PasswordVault::from_entries(config.default_shared_hosts.iter().map(|h| {
            (
                format!("{}_{}", config.deploy_color, h.identifier),
                MasterCredentials {
                    username: config.host_template.master_user.clone(),
                    password: berth_config::secrets::generate_password(),
                },
            )
        }));
    }
    let token = match OperatorToken::load(&config.token_file) {
        Ok(token) => token,
        Err(e) => {
            warn!(error = %e, "no operator token file, generating a standalone token");
            OperatorToken::from_value(berth_config::secrets::generate_password())
        }
    };

    // In-process collaborators.
    let fleet_provider = Arc::new(MemoryFleet::auto_available());
    let sql = Arc::new(MemorySql::new());
    let clone_tool = Arc::new(MemoryClone::new());

    let metrics = Metrics::new();
    let fleet = Arc::new(FleetManager::new(fleet_provider, config.clone()));
    info!("fleet manager initialized");

    let ctx = Arc::new(WorkflowContext {
        config: config.clone(),
        store,
        fleet: fleet.clone(),
        allocator: allocator.clone(),
        placement: PlacementSelector::new(fleet.clone(), config.clone(), metrics.clone()),
        schema: SchemaManager::new(sql),
        cloner: CloneRunner::new(clone_tool, config.clone_config.clone(), metrics.clone()),
        vault: vault.clone(),
        metrics: metrics.clone(),
    });

    // Default shared hosts must exist before any placement decision.
    berth_fleet::ensure_default_hosts(&fleet, &config, &vault, &allocator).await?;
    info!(
        hosts = config.default_shared_hosts.len(),
        "default shared hosts ensured"
    );

    // Engines.
    let creation_queue = Arc::new(MemoryQueue::new(
        config.creation_queue.name.as_str(),
        QUEUE_VISIBILITY,
    ));
    let deletion_queue = Arc::new(MemoryQueue::new(
        config.deletion_queue.name.as_str(),
        QUEUE_VISIBILITY,
    ));
    let creation = Arc::new(CreationEngine::new(
        ctx.clone(),
        creation_queue,
        envelope.clone(),
    ));
    let deletion = Arc::new(DeletionEngine::new(ctx.clone(), deletion_queue, envelope));
    let service = Arc::new(DatabaseService::new(
        ctx.clone(),
        creation.clone(),
        deletion.clone(),
    ));
    let reaper = Arc::new(Reaper::new(ctx, token));
    info!("workflow engines initialized");

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let creation_handle = tokio::spawn(creation.run(shutdown_rx.clone()));
    let deletion_handle = tokio::spawn(deletion.run(shutdown_rx.clone()));
    let reaper_handle = tokio::spawn(reaper.clone().run(shutdown_rx));

    // ── Start API server ───────────────────────────────────────

    let router = berth_api::build_router(service, reaper, metrics);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for background tasks.
    let _ = creation_handle.await;
    let _ = deletion_handle.await;
    let _ = reaper_handle.await;

    info!("berth daemon stopped");
    Ok(())
}
