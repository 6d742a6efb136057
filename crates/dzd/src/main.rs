//! dzd — the dropzone daemon.
//!
//! Single binary that assembles the assignment system:
//! - State store (redb)
//! - Auto-assign scheduler, driven by store changes and a periodic tick
//! - REST API
//!
//! # Usage
//!
//! ```text
//! dzd serve --port 8080 --data-dir /var/lib/dropzone --config dropzone.toml
//! dzd init-config --path dropzone.toml
//! dzd balances --data-dir /var/lib/dropzone
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info, warn};

use dropzone_core::DropzoneConfig;
use dropzone_scheduler::{AutoAssigner, Collaborators, EngineConfig, EngineEvent, TracingNotifier};
use dropzone_state::{Period, Settings, StateStore, epoch_secs};

#[derive(Parser)]
#[command(name = "dzd", about = "Dropzone assignment daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the API server and the auto-assign scheduler.
    Serve {
        /// Port to listen on.
        #[arg(long, default_value = "8080")]
        port: u16,

        /// Data directory for persistent state.
        #[arg(long, default_value = "/var/lib/dropzone")]
        data_dir: PathBuf,

        /// Path to dropzone.toml. Defaults apply when the file is missing.
        #[arg(long, default_value = "dropzone.toml")]
        config: PathBuf,
    },

    /// Write a starter dropzone.toml.
    InitConfig {
        #[arg(long, default_value = "dropzone.toml")]
        path: PathBuf,

        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },

    /// Print the balance sheet for the active rotation period.
    Balances {
        #[arg(long, default_value = "/var/lib/dropzone")]
        data_dir: PathBuf,

        #[arg(long, default_value = "dropzone.toml")]
        config: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,dzd=debug,dropzone=debug".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            port,
            data_dir,
            config,
        } => run_serve(port, &data_dir, &config).await,
        Command::InitConfig { path, force } => init_config(&path, force),
        Command::Balances { data_dir, config } => print_balances(&data_dir, &config).await,
    }
}

fn open_store(data_dir: &Path) -> anyhow::Result<StateStore> {
    std::fs::create_dir_all(data_dir)?;
    let db_path = data_dir.join("dropzone.redb");
    let store = StateStore::open(&db_path)?;
    info!(path = ?db_path, "state store opened");
    Ok(store)
}

/// First-run defaults: settings from the config file and an open period.
fn seed_store(store: &StateStore, config: &DropzoneConfig) -> anyhow::Result<()> {
    if store.settings()?.is_none() {
        store.put_settings(&Settings::from(&config.scheduler))?;
        info!("settings seeded from config");
    }
    if store.active_period()?.is_none() {
        let id = format!("period-{}", uuid::Uuid::new_v4());
        let period = Period::open(&id, "Initial", epoch_secs());
        store.put_period(&period)?;
        info!(period_id = %period.id, "initial rotation period opened");
    }
    Ok(())
}

fn build_engine(store: &StateStore, config: &DropzoneConfig) -> AutoAssigner {
    let collab = Collaborators::from_store(store.clone(), Arc::new(TracingNotifier));
    AutoAssigner::new(collab, EngineConfig::from(config))
}

async fn run_serve(port: u16, data_dir: &Path, config_path: &Path) -> anyhow::Result<()> {
    info!("dropzone daemon starting");

    let config = DropzoneConfig::from_file_or_default(config_path)?;
    info!(path = ?config_path, "configuration loaded");

    let store = open_store(data_dir)?;
    seed_store(&store, &config)?;

    let engine = build_engine(&store, &config);
    info!(
        tick_secs = config.scheduler.tick_interval_secs,
        write_retries = config.scheduler.write_retries,
        "auto-assign scheduler initialized"
    );

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let (events_tx, events_rx) = mpsc::channel(64);
    let feed_handle = tokio::spawn(forward_events(
        store.subscribe(),
        events_tx,
        Duration::from_secs(config.scheduler.tick_interval_secs.max(1)),
        shutdown_rx.clone(),
    ));

    let engine_loop = engine.clone();
    let engine_handle = tokio::spawn(async move {
        engine_loop.run(events_rx, shutdown_rx).await;
    });

    // Pick up anything already waiting.
    if let Err(e) = engine.evaluate_and_maybe_schedule().await {
        warn!(error = %e, "initial evaluation failed");
    }

    // ── Start API server ───────────────────────────────────────

    let router = dropzone_api::build_router(store, engine);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    let _ = feed_handle.await;
    let _ = engine_handle.await;

    info!("dropzone daemon stopped");
    Ok(())
}

/// Turn store writes and the periodic tick into scheduler events.
async fn forward_events(
    mut changes: broadcast::Receiver<dropzone_state::StoreChange>,
    events: mpsc::Sender<EngineEvent>,
    tick: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        let event = tokio::select! {
            change = changes.recv() => match change {
                Ok(change) => EngineEvent::from(change),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "change feed lagged");
                    EngineEvent::Tick
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            _ = interval.tick() => EngineEvent::Tick,
            _ = shutdown.changed() => break,
        };
        if events.send(event).await.is_err() {
            break;
        }
    }
    debug!("event feed stopped");
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{} already exists (use --force to overwrite)", path.display());
    }
    let config = DropzoneConfig::scaffold();
    std::fs::write(path, config.to_toml_string()?)?;
    info!(path = ?path, "configuration written");
    Ok(())
}

async fn print_balances(data_dir: &Path, config_path: &Path) -> anyhow::Result<()> {
    let config = DropzoneConfig::from_file_or_default(config_path)?;
    let store = open_store(data_dir)?;
    let engine = build_engine(&store, &config);
    let sheet = engine.balance_sheet().await?;
    println!("{}", serde_json::to_string_pretty(&sheet)?);
    Ok(())
}
