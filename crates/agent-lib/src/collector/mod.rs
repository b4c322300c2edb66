//! Metrics collection from the cgroup filesystem
//!
//! This module provides the pseudo-file parser, the cgroup v1 extractors
//! for each metric family, and the collection cycle that fans lifecycle and
//! extraction work out over every live container.

mod cgroup_v1;
mod r#loop;
pub mod pseudo_file;


pub use cgroup_v1::{
    cpu_usage, memory_usage, parse_blkio, parse_net_dev, CgroupV1Collector,
    UNLIMITED_MEMORY_THRESHOLD,
};
pub use r#loop::{CollectionConfig, CollectionLoop, CollectionLoopBuilder, CycleReport};

use crate::error::ParseError;
use crate::models::{MetricFamily, Sample};
use anyhow::Result;

pub use async_trait::async_trait;

/// Trait for metrics collection implementations
#[async_trait]
pub trait MetricsCollector: Send + Sync {
    /// Extract one family's usage for a specific container
    async fn collect(&self, container_id: &str, family: MetricFamily) -> Result<Sample, ParseError>;

    /// List the ids of all live containers on the host
    async fn list_containers(&self) -> Result<Vec<String>>;
}
