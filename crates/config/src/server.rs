//! HTTP server configuration settings.

use std::{net::SocketAddr, path::PathBuf};

use serde::Deserialize;

/// HTTP server configuration settings.
#[derive(Default, Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    /// The socket address the server should listen on.
    pub listen_address: Option<SocketAddr>,
    /// TLS configuration for secure connections.
    pub tls: Option<TlsServerConfig>,
    /// Health endpoint configuration.
    pub health: HealthConfig,
}

/// TLS configuration for the HTTPS listener.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TlsServerConfig {
    /// Path to the PEM-encoded certificate chain.
    pub certificate: PathBuf,
    /// Path to the PEM-encoded private key.
    pub key: PathBuf,
}

/// Health check endpoint configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct HealthConfig {
    /// Whether the health endpoint is exposed at all.
    pub enabled: bool,
    /// Bind the health endpoint on its own listener instead of the main one.
    pub listen: Option<SocketAddr>,
    /// Path the health endpoint is served under.
    pub path: String,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            listen: None,
            path: "/health".to_string(),
        }
    }
}
