//! `vaultd` — the Vault Sync Engine server binary.
//!
//! Parses [`Config`], resolves `VAULT_PATH`, builds the [`VaultRegistry`]
//! and HTTP/WS [`router`](vault_sync::http::router), spawns the fan-out
//! heartbeat task, and serves until SIGINT/SIGTERM.

use std::sync::Arc;
use std::time::Duration;

use vault_sync::config::Config;
use vault_sync::realtime::{ChannelMessage, HEARTBEAT_INTERVAL_SECS, MessageType, STALE_AFTER_SECS};
use vault_sync::registry::VaultRegistry;
use vault_sync::{http, telemetry, time};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    telemetry::init(&config.log_level);

    let vault_path = config.resolve_vault_path()?;
    tracing::info!(
        host = %config.host,
        port = config.port,
        log_level = %config.log_level,
        vault_path = %vault_path.display(),
        "starting vaultd"
    );

    let registry = Arc::new(VaultRegistry::new(vault_path));
    spawn_heartbeat(Arc::clone(&registry));

    let app = http::router(Arc::clone(&registry));
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("shut down");
    Ok(())
}

/// Periodically sweep every open vault's channel table (§4.7 "Heartbeat"):
/// evict channels silent for more than [`STALE_AFTER_SECS`], ping the rest.
fn spawn_heartbeat(registry: Arc<VaultRegistry>) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(HEARTBEAT_INTERVAL_SECS));
        loop {
            ticker.tick().await;
            let now = time::now_secs();
            for handle in registry.handles() {
                handle.channels.heartbeat(now, STALE_AFTER_SECS, |device_id| {
                    ChannelMessage::new(MessageType::Ping, &handle.vault_name, device_id, now)
                });
            }
        }
    });
}

/// Waits for SIGINT or (on Unix) SIGTERM. In-flight writer-lock holders run
/// to completion — this signal only stops accepting new connections (§9
/// supplemental: "no forced abort of a write in progress").
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install SIGINT handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    tracing::info!("shutting down");
}
