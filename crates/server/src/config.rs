//! Server configuration

use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

/// Environment variables are read as `RIGHTSIZER_<FIELD>`
pub const ENV_PREFIX: &str = "RIGHTSIZER";

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Reported in structured log events
    #[serde(default = "default_node_name")]
    pub node_name: String,

    /// Port for the optimize API and health/metrics endpoints
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// JSON catalog snapshot, one array per catalog table
    #[serde(default = "default_catalog_path")]
    pub catalog_path: String,

    /// Base URL of the cost quoting service
    #[serde(default = "default_cost_service_url")]
    pub cost_service_url: String,

    #[serde(default = "default_cost_timeout_ms")]
    pub cost_timeout_ms: u64,

    /// Base URL of the explanation service; explanations are disabled when unset
    #[serde(default)]
    pub explainer_url: Option<String>,

    #[serde(default = "default_explain_timeout_ms")]
    pub explain_timeout_ms: u64,
}

fn default_node_name() -> String {
    std::env::var("NODE_NAME").unwrap_or_else(|_| "unknown".to_string())
}

fn default_api_port() -> u16 {
    8080
}

fn default_catalog_path() -> String {
    "/etc/rightsizer/catalog.json".to_string()
}

fn default_cost_service_url() -> String {
    "http://cost-service:8080".to_string()
}

fn default_cost_timeout_ms() -> u64 {
    5_000
}

fn default_explain_timeout_ms() -> u64 {
    10_000
}

impl ServerConfig {
    /// Load configuration from the environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix(ENV_PREFIX))
            .build()
            .context("Failed to read configuration")?;
        Self::from_config(config)
    }

    pub fn from_config(config: config::Config) -> Result<Self> {
        let mut server: ServerConfig = config
            .try_deserialize()
            .context("Invalid rightsizer configuration")?;
        // An empty URL from the environment means "not configured"
        server.explainer_url = server.explainer_url.filter(|url| !url.trim().is_empty());
        Ok(server)
    }

    pub fn cost_timeout(&self) -> Duration {
        Duration::from_millis(self.cost_timeout_ms)
    }

    pub fn explain_timeout(&self) -> Duration {
        Duration::from_millis(self.explain_timeout_ms)
    }
}
