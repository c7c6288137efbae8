//! Lifeline API server
//!
//! # Usage
//!
//! ```bash
//! # In-memory store on the default address
//! lifelined
//!
//! # Durable store, JSON logs
//! lifelined --store sled --store-path /var/lib/lifeline --json-logs
//!
//! # From a config file; LIFELINE__SECTION__KEY variables override it
//! lifelined --config lifeline.toml
//! ```

use clap::Parser;
use lifeline_core::{LifelineConfig, StoreBackend};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "lifelined")]
#[command(about = "Lifeline - request identifiers and lifecycle tracking")]
#[command(version)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(short, long, env = "LIFELINE_CONFIG")]
    config: Option<PathBuf>,

    /// Address to listen on
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Storage backend (memory or sled)
    #[arg(long)]
    store: Option<StoreBackend>,

    /// Directory for the sled backend
    #[arg(long)]
    store_path: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, env = "LIFELINE_JSON_LOGS")]
    json_logs: bool,
}

impl Cli {
    fn apply(&self, config: &mut LifelineConfig) {
        if let Some(listen) = self.listen {
            config.server.listen = listen;
        }
        if let Some(backend) = self.store {
            config.store.backend = backend;
        }
        if let Some(path) = &self.store_path {
            config.store.path = Some(path.clone());
        }
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,tower_http=debug"));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    // Defaults < file < environment < command line
    let mut config = LifelineConfig::load(cli.config.as_deref())?;
    cli.apply(&mut config);
    config.validate()?;

    let router = lifeline_api::build_router(&config)?;
    let addr = config.server.listen;

    tracing::info!(
        store = ?config.store.backend,
        header = %config.propagation.header_name,
        "Starting Lifeline API on {}",
        addr
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Lifeline API stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to listen for shutdown signal");
    }
}
