use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use foreman_runtime::{
    resolve_data_path, Config, ContentWatcher, Coordinator, ProcessKind, ProcessSupervisor,
    TickMode,
};
use foreman_server::{router, AppState, WsHub};
use foreman_store::KnowledgeStore;

#[derive(Parser)]
#[command(name = "foreman", about = "Human-in-the-loop control plane for multi-agent orchestration")]
struct Cli {
    /// Config file path (defaults to the data directory's config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// SQLite database path (defaults to <data dir>/knowledge.db)
    #[arg(long)]
    db: Option<PathBuf>,

    /// Listen address
    #[arg(long, default_value = "127.0.0.1:8750")]
    bind: String,

    /// Content root to watch for external edits
    #[arg(long)]
    content_root: Option<PathBuf>,

    /// Dev server command to own (e.g. "hugo server -D")
    #[arg(long)]
    dev_server: Option<String>,

    /// Force manual tick mode regardless of config
    #[arg(long)]
    manual_tick: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if cli.manual_tick {
        config.tick.mode = TickMode::Manual;
    }

    let db_path = match &cli.db {
        Some(path) => path.clone(),
        None => {
            let data_dir = resolve_data_path(None)?;
            std::fs::create_dir_all(&data_dir)
                .with_context(|| format!("creating data dir {}", data_dir.display()))?;
            data_dir.join("knowledge.db")
        }
    };
    let store = KnowledgeStore::open(&db_path)
        .with_context(|| format!("opening knowledge store at {}", db_path.display()))?;
    info!(db = %db_path.display(), "knowledge store opened");

    let heartbeat_ms = config.ws.heartbeat_ms;
    // Agent runtime plugins register here when the control plane is
    // embedded; the standalone binary runs as a pure observation and
    // gating plane.
    let coordinator = Coordinator::new(config, store, Vec::new());

    let hub = Arc::new(WsHub::new(coordinator.outbound_sender(), heartbeat_ms));
    let supervisor = Arc::new(ProcessSupervisor::new(coordinator.outbound_sender()));

    if let Some(command) = &cli.dev_server {
        let parts: Vec<String> = command.split_whitespace().map(String::from).collect();
        let (program, args) = parts
            .split_first()
            .context("empty --dev-server command")?;
        supervisor
            .start("dev-server", ProcessKind::DevServer, program, args)
            .context("starting dev server")?;
    }

    let _watcher = match &cli.content_root {
        Some(root) => Some(
            ContentWatcher::start(root.clone(), coordinator.outbound_sender())
                .with_context(|| format!("watching {}", root.display()))?,
        ),
        None => None,
    };

    let state = AppState {
        coordinator: coordinator.clone(),
        hub: Arc::clone(&hub),
        supervisor: Arc::clone(&supervisor),
    };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&cli.bind)
        .await
        .with_context(|| format!("binding {}", cli.bind))?;
    info!(bind = %cli.bind, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("shutdown signal received");
        })
        .await?;

    // Ordered teardown: clock, sockets, children, store (on drop)
    coordinator.shutdown();
    hub.close();
    supervisor.shutdown().await;
    Ok(())
}
