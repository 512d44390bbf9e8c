use std::path::Path;

use serde::Deserialize;

use crate::checks::{GenericInstance, GitlabInstance};
use crate::error::{Error, Result};

/// Application configuration constants
pub struct AppConfig;

impl AppConfig {
    // Network Configuration
    pub const DEFAULT_PROMETHEUS_TIMEOUT_SECS: u64 = 10;
    pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 5;
    pub const DEFAULT_RECEIVE_TIMEOUT_SECS: u64 = 15;
    pub const POOL_IDLE_TIMEOUT_SECS: u64 = 60;
    pub const TCP_KEEPALIVE_SECS: u64 = 30;
    pub const USER_AGENT: &'static str = concat!("promcheck/", env!("CARGO_PKG_VERSION"));

    // Data Collection
    pub const DEFAULT_COLLECTION_INTERVAL_SECS: u64 = 15;
    pub const LINE_BUFFER_CAPACITY: usize = 10 * 1024;

    // Service Checks
    pub const HEALTH_SERVICE_CHECK_SUFFIX: &'static str = "prometheus.health";
}

fn default_interval() -> u64 {
    AppConfig::DEFAULT_COLLECTION_INTERVAL_SECS
}

/// Runtime configuration file.
///
/// ```toml
/// interval_secs = 15
///
/// [[gitlab]]
/// prometheus_core_endpoint = "http://localhost:8080/-/metrics"
/// gitlab_url = "http://localhost:8080"
///
/// [[prometheus]]
/// prometheus_url = "http://localhost:9100/metrics"
/// namespace = "node"
/// metrics = ["node_load*"]
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_interval")]
    pub interval_secs: u64,
    #[serde(default)]
    pub gitlab: Vec<GitlabInstance>,
    #[serde(default)]
    pub prometheus: Vec<GenericInstance>,
}

impl AgentConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.interval_secs == 0 {
            return Err(Error::Config("interval_secs must be greater than 0".into()));
        }
        if self.gitlab.is_empty() && self.prometheus.is_empty() {
            return Err(Error::Config(
                "no [[gitlab]] or [[prometheus]] instances configured".into(),
            ));
        }
        Ok(())
    }
}
