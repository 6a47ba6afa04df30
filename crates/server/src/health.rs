//! Health check endpoint, optionally served on its own listener.

use std::net::SocketAddr;

use axum::{Json, Router, routing::get};
use config::{HealthConfig, TlsServerConfig};
use serde_json::{json, Value};

/// `GET /health` handler: a static, always-200 liveness probe. GuardianBridge
/// has no dependency whose health would make this conditional — the training
/// scheduler and memory guard fail closed (log and retry, or exit the
/// process) rather than leaving the server in a degraded-but-alive state.
pub async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

/// Serve the health endpoint on its own listener, independent of the main
/// server's routes and middleware stack.
pub async fn bind_health_endpoint(listen: SocketAddr, tls: Option<TlsServerConfig>, health: HealthConfig) {
    let router = Router::new().route(&health.path, get(health));

    let result = match tls {
        Some(tls_config) => match axum_server::tls_rustls::RustlsConfig::from_pem_file(&tls_config.certificate, &tls_config.key).await {
            Ok(rustls_config) => axum_server::bind_rustls(listen, rustls_config).serve(router.into_make_service()).await,
            Err(err) => {
                log::error!("health endpoint: failed to load TLS certificate: {err}");
                return;
            }
        },
        None => axum_server::bind(listen).serve(router.into_make_service()).await,
    };

    if let Err(err) = result {
        log::error!("health endpoint: server error: {err}");
    }
}
