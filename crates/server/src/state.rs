//! Process-wide state shared by every request handler.

use std::sync::Arc;

use config::GuardianConfig;

/// Everything a request handler needs that isn't re-derived per request:
/// the static GuardianBridge settings and the pooled HTTP client reused for
/// both upstream forwarding and AI adjudication calls.
#[derive(Clone)]
pub struct AppState {
    pub guardian: Arc<GuardianConfig>,
    pub http: reqwest::Client,
}

impl AppState {
    pub fn new(guardian: GuardianConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder().build()?;

        Ok(Self {
            guardian: Arc::new(guardian),
            http,
        })
    }
}
