//! GuardianBridge server library.
//!
//! Provides a reusable server function to serve GuardianBridge either for the
//! binary, or for the integration tests.

#![deny(missing_docs)]

mod error;
mod forward;
mod health;
mod logger;
mod moderate;
mod pipeline;
mod state;
mod tracing;

pub use logger::init as init_logger;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::anyhow;
use axum::{Router, routing::any};
use axum_server::tls_rustls::RustlsConfig;
use config::Config;
use state::AppState;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use training::{TrainerBinary, scheduler};

use crate::tracing::TracingLayer;

/// Configuration for serving GuardianBridge.
pub struct ServeConfig {
    /// The socket address (IP and port) the server will bind to.
    pub listen_address: SocketAddr,
    /// The deserialized GuardianBridge TOML configuration.
    pub config: Config,
    /// Cancellation token for graceful shutdown.
    pub shutdown_signal: CancellationToken,
    /// The version string to log on startup.
    pub version: String,
    /// Optional oneshot sender to send back the bound address (useful if port 0 was specified).
    pub bound_addr_sender: Option<tokio::sync::oneshot::Sender<SocketAddr>>,
}

/// Starts and runs the GuardianBridge server with the provided configuration.
///
/// Expects [`init_logger`] to already have been called: the binary does this
/// before parsing arguments so early startup errors are logged too, which
/// this library has no log filter string to do on its own.
pub async fn serve(
    ServeConfig {
        listen_address,
        config,
        shutdown_signal,
        version,
        bound_addr_sender,
    }: ServeConfig,
) -> anyhow::Result<()> {
    let _telemetry_guard = telemetry::init(&config.telemetry);

    log::info!("GuardianBridge {version}");

    let state = Arc::new(state::AppState::new(config.guardian.clone())?);

    spawn_background_tasks(&config, shutdown_signal.clone());

    let app = Router::new()
        .route("/health", axum::routing::get(health::health))
        .fallback(any(pipeline::handle))
        .layer(TracingLayer::with_config(Arc::new(config.telemetry.clone())))
        .with_state(state);

    if let Some(listen) = config.server.health.listen {
        tokio::spawn(health::bind_health_endpoint(listen, config.server.tls.clone(), config.server.health.clone()));
    }

    let listener = TcpListener::bind(listen_address).await.map_err(|e| anyhow!("Failed to bind to {listen_address}: {e}"))?;

    if let Some(sender) = bound_addr_sender {
        sender.send(listener.local_addr()?).expect("Failed to send back bound address.");
    }

    match &config.server.tls {
        Some(tls_config) => {
            let rustls_config = RustlsConfig::from_pem_file(&tls_config.certificate, &tls_config.key)
                .await
                .map_err(|e| anyhow!("Failed to load TLS certificate and key: {e}"))?;

            log::info!("GuardianBridge listening on https://{listen_address}");

            let server = axum_server::from_tcp_rustls(listener.into_std()?, rustls_config).serve(app.into_make_service_with_connect_info::<SocketAddr>());

            tokio::select! {
                result = server => {
                    result.map_err(|e| anyhow!("Failed to start HTTPS server: {e}"))?;
                }
                _ = shutdown_signal.cancelled() => {
                    log::info!("Received shutdown signal, shutting down gracefully...");
                }
            }
        }
        None => {
            log::info!("GuardianBridge listening on http://{listen_address}");

            tokio::select! {
                result = axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()) => {
                    result.map_err(|e| anyhow!("Failed to start HTTP server: {}", e))?;
                }
                _ = shutdown_signal.cancelled() => {
                    log::info!("Received shutdown signal, shutting down gracefully...");
                }
            }
        }
    }

    Ok(())
}

/// Starts the trainer scheduler and memory guard as long-lived background
/// tasks, both stopping on the same shutdown signal as the HTTP server.
fn spawn_background_tasks(config: &Config, shutdown_signal: CancellationToken) {
    match TrainerBinary::current_exe() {
        Ok(trainer_binary) => {
            let scheduler_config = config.guardian.scheduler.clone();
            let profiles_root = config.guardian.profiles_root.clone();
            let shutdown = shutdown_signal.clone();
            tokio::spawn(async move {
                scheduler::run(scheduler_config, profiles_root, trainer_binary, shutdown).await;
            });
        }
        Err(err) => {
            log::error!("failed to resolve current executable path, trainer scheduler will not run: {err}");
        }
    }

    let memory_config = config.guardian.memory.clone();
    tokio::spawn(async move {
        memguard::run(memory_config, shutdown_signal).await;
    });
}
