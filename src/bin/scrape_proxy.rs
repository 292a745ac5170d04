#![forbid(unsafe_code)]

//! HTTP front for the channel scraper.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use tubescrape::{
    browser::{SessionProvider, chrome::ChromeProvider},
    config::{RuntimeOverrides, resolve_runtime_settings},
    server::{AppState, router},
};

#[derive(Debug, Parser)]
#[command(name = "scrape_proxy", version, about = "Channel scraping API")]
struct Args {
    /// Port to listen on (overrides PORT).
    #[arg(long)]
    port: Option<u16>,
    /// Address to bind (overrides HOST).
    #[arg(long)]
    host: Option<String>,
    /// Path of the .env file to read.
    #[arg(long)]
    env_file: Option<PathBuf>,
    /// Chromium or Chrome binary (overrides CHROME_EXECUTABLE).
    #[arg(long)]
    chrome: Option<PathBuf>,
}

impl From<Args> for RuntimeOverrides {
    fn from(args: Args) -> Self {
        Self {
            port: args.port,
            host: args.host,
            chrome_executable: args.chrome,
            env_path: args.env_file,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();

    let settings = resolve_runtime_settings(Args::parse().into())?;
    if settings.api_key.is_none() {
        warn!("API_KEY is not set; every scrape request will be rejected");
    }

    let provider = Arc::new(ChromeProvider::new(settings.chrome_executable.clone()));
    let state = AppState {
        provider: provider.clone(),
        settings: Arc::new(settings.extraction.clone()),
        api_key: settings.api_key.as_deref().map(Arc::from),
    };

    let ip: IpAddr = settings
        .host
        .parse()
        .with_context(|| format!("invalid listen host {}", settings.host))?;
    let addr = SocketAddr::new(ip, settings.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("binding to {addr}"))?;
    info!(%addr, "scrape proxy listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("running API server")?;

    provider.shutdown().await;
    info!("browser closed, bye");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = signal::ctrl_c().await {
        warn!(error = %err, "failed to install Ctrl+C handler");
    }
}
