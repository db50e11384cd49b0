//! # Tunnel Proxy
//!
//! A routing and tunnelling proxy sitting between untrusted *devices*
//! (authenticated via Diffie-Hellman key exchange, on the frontend
//! listener) and trusted *backend servers* (on the backend listener).
//! It multiplexes device requests onto backends, routes responses back
//! to the originating device, and lets backends push tunnelled
//! messages at a specific device.
//!
//! ## Architecture
//!
//! ```text
//! Device ──DH+TCP──► frontend pipeline ──► TransProxy ──► Backend pipeline ──TCP──► Backend server
//! ```
//!
//! ## Modules
//!
//! - [`config`]   — TOML configuration with env-var overrides
//! - [`crypto`]   — the frontend's DH handshake
//! - [`frontend`] — device-facing connection lifecycle
//! - [`backend`]  — backend-facing connection lifecycle
//! - [`hooks`]    — this binary's `ProxyHooks` implementation

mod backend;
mod config;
mod crypto;
mod error;
mod frontend;
mod hooks;

use clap::Parser;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tracing::info;
use tunnel_core::ProxyRegistry;

#[derive(Parser, Debug)]
#[command(name = "tunnel-server", about = "Tunnel proxy between devices and backend servers")]
struct Args {
    /// Path to a TOML config file. Falls back to `tunnel-server.toml` in
    /// the current directory, then compiled defaults.
    #[arg(long)]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tunnel_server=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = config::Config::load(args.config.as_deref())?;

    let dh = Arc::new(crypto::DhHandshake::new(&config.dh.g, &config.dh.p)?);
    let registry = ProxyRegistry::new();
    let hooks: Arc<dyn tunnel_core::ProxyHooks> = Arc::new(hooks::LoggingHooks);
    hooks.register().await;

    let frontend_listener = TcpListener::bind(&config.frontend.bind_addr).await?;
    info!(addr = %config.frontend.bind_addr, "frontend listening");

    let backend_listener = TcpListener::bind(&config.backend.bind_addr).await?;
    info!(addr = %config.backend.bind_addr, "backend listening");

    let heartbeat_interval = Duration::from_secs(config.heartbeat.interval_secs);

    let frontend_task = tokio::spawn(frontend::run(
        frontend_listener,
        registry.clone(),
        hooks.clone(),
        dh,
        heartbeat_interval,
    ));
    let backend_task = tokio::spawn(backend::run(backend_listener, registry, hooks));

    tokio::select! {
        result = frontend_task => result.map_err(anyhow::Error::from)?,
        result = backend_task => result.map_err(anyhow::Error::from)?,
    }

    Ok(())
}
