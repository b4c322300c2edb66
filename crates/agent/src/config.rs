//! Agent configuration

use anyhow::{Context, Result};
use container_metrics_lib::MetricFamily;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;
use tracing::warn;

/// Agent configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AgentConfig {
    /// Root holding the `cgroup` and `proc` pseudo filesystems
    #[serde(default = "default_pseudo_root")]
    pub pseudo_root: PathBuf,

    /// Directory holding the container and task trees
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Metrics collection interval in seconds
    #[serde(default = "default_collection_interval")]
    pub collection_interval_secs: u64,

    /// Cleanup interval in seconds
    #[serde(default = "default_cleanup_interval")]
    pub cleanup_interval_secs: u64,

    /// Seconds after the last observation before a container is removed
    #[serde(default = "default_expiration")]
    pub expiration_secs: u64,

    /// Concurrent container units per cycle, 0 for available parallelism
    #[serde(default)]
    pub max_workers: usize,

    /// Comma-separated metric families to sample
    #[serde(default = "default_families")]
    pub families: String,

    /// Docker CLI used for task lookups
    #[serde(default = "default_docker_binary")]
    pub docker_binary: String,

    /// Identifier carried by every structured log event
    #[serde(default = "default_agent_id")]
    pub agent_id: String,
}

fn default_pseudo_root() -> PathBuf {
    PathBuf::from("/")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("/buildeng-metrics")
}

fn default_collection_interval() -> u64 {
    5
}

fn default_cleanup_interval() -> u64 {
    30
}

fn default_expiration() -> u64 {
    60 * 60
}

fn default_families() -> String {
    "cpu.usage,memory.usage".to_string()
}

fn default_docker_binary() -> String {
    "docker".to_string()
}

fn default_agent_id() -> String {
    std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string())
}

impl AgentConfig {
    /// Load configuration from `AGENT_*` environment variables
    pub fn load() -> Result<Self> {
        Self::from_environment(config::Environment::with_prefix("AGENT"))
    }

    fn from_environment(environment: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(environment)
            .build()
            .context("Failed to read agent configuration")?;

        config
            .try_deserialize()
            .context("Invalid agent configuration")
    }

    pub fn collection_interval(&self) -> Duration {
        Duration::from_secs(self.collection_interval_secs.max(1))
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_secs(self.cleanup_interval_secs.max(1))
    }

    pub fn expiration(&self) -> Duration {
        Duration::from_secs(self.expiration_secs)
    }

    /// Configured metric families; unknown names are logged and skipped
    pub fn metric_families(&self) -> Vec<MetricFamily> {
        let mut families = Vec::new();
        for name in self.families.split(',').map(str::trim) {
            if name.is_empty() {
                continue;
            }
            match MetricFamily::from_name(name) {
                Some(family) if !families.contains(&family) => families.push(family),
                Some(_) => {}
                None => warn!(family = %name, "Unknown metric family in configuration, ignoring"),
            }
        }
        families
    }
}
