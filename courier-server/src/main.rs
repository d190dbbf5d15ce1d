//! courier-server binary entry point.
//!
//! Usage:
//! ```bash
//! courier-server --config courier.toml
//! courier-server --port 2049
//! courier-server --help
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use courier_server::{keyfile, Config, MailServer, MemoryDelegate, StaticRouter};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Federated encrypted-mail node.
#[derive(Parser, Debug)]
#[command(name = "courier-server")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file
    #[arg(long, short, default_value = "courier.toml")]
    config: PathBuf,

    /// Port to listen on (overrides server.port)
    #[arg(long, short)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let config = if cli.config.exists() {
        Config::from_file(&cli.config)?
    } else {
        tracing::warn!(
            "Config file {} not found, using defaults",
            cli.config.display()
        );
        Config::default()
    };

    let mut identity = keyfile::load_or_create(&config.server.key_path)
        .context("Failed to load node identity")?;
    if let Some(location) = &config.server.location {
        identity = identity.with_location(location.clone());
    }
    if let Some(alias) = &config.server.alias {
        identity = identity.with_alias(alias.clone());
    }

    let router = StaticRouter::from_routes(&config.routing.routes)?;
    tracing::info!("Loaded {} static routes", router.len());

    let port = cli.port.unwrap_or(config.server.port);
    let server = Arc::new(
        MailServer::new(config, identity, Arc::new(MemoryDelegate::new()))?
            .with_router(Arc::new(router)),
    );

    let mut accept = tokio::spawn(server.clone().start(port));
    tokio::select! {
        result = &mut accept => {
            result.context("Accept loop panicked")??;
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            server.shutdown();
            accept.await.context("Accept loop panicked")??;
        }
    }

    tracing::info!("Courier node stopped");
    Ok(())
}
