//! cgroup v1 metrics extraction
//!
//! Reads per-container usage from the legacy cgroup v1 hierarchy that
//! Docker places under `<controller>/docker/<container_id>`:
//! - cpuacct controller for user/system time
//! - cpu controller for throttling stats
//! - memory controller for cache/rss/swap and the configured limit
//! - blkio controller for throttled I/O bytes and operations
//! - the container's first pid for network interface counters

use super::pseudo_file::{parse_pseudo_file, parse_single_value, read_lines};
use super::MetricsCollector;
use crate::error::ParseError;
use crate::models::{MetricFamily, Sample};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::warn;

/// Limits above this value mean no limit was configured
pub const UNLIMITED_MEMORY_THRESHOLD: u64 = 100_000 * 1024 * 1024;

/// Nanoseconds to USER_HZ (10 ms) ticks
const THROTTLED_NS_TO_TICKS: f64 = 0.000_000_1;

/// blkio operations reported per device, mapped to field prefixes
const BLKIO_OPS: [(&str, &str); 5] = [
    ("Read", "read"),
    ("Write", "write"),
    ("Sync", "sync"),
    ("Async", "async"),
    ("Total", "total"),
];

/// Collector for the cgroup v1 hierarchy
pub struct CgroupV1Collector {
    /// Root containing the `cgroup` and `proc` pseudo filesystems
    pseudo_root: PathBuf,
}

impl CgroupV1Collector {
    /// Create a new cgroup v1 collector rooted at `pseudo_root`
    pub fn new(pseudo_root: impl Into<PathBuf>) -> Self {
        Self {
            pseudo_root: pseudo_root.into(),
        }
    }

    /// Directory of a controller's Docker hierarchy
    pub fn controller_dir(&self, controller: &str) -> PathBuf {
        self.pseudo_root.join("cgroup").join(controller).join("docker")
    }

    /// Directory whose child directories are the live containers
    pub fn live_container_dir(&self) -> PathBuf {
        self.controller_dir("cpu")
    }

    fn proc_dir(&self) -> PathBuf {
        self.pseudo_root.join("proc")
    }

    /// Memory usage for a container
    pub async fn memory(&self, container_id: &str) -> Result<Sample, ParseError> {
        let dir = self.controller_dir("memory").join(container_id);
        let stat = parse_pseudo_file(&dir.join("memory.stat")).await?;
        let limit_path = dir.join("memory.limit_in_bytes");
        let limit = parse_single_value(&limit_path, "0").await?;
        let limit = limit
            .parse::<u64>()
            .map_err(|_| ParseError::malformed(&limit_path, &limit))?;

        Ok(memory_usage(stat, limit))
    }

    /// CPU usage for a container
    pub async fn cpu(&self, container_id: &str) -> Result<Sample, ParseError> {
        let throttling =
            parse_pseudo_file(&self.controller_dir("cpu").join(container_id).join("cpu.stat"))
                .await?;
        let accounting = parse_pseudo_file(
            &self
                .controller_dir("cpuacct")
                .join(container_id)
                .join("cpuacct.stat"),
        )
        .await?;

        Ok(cpu_usage(accounting, &throttling))
    }

    /// Block I/O usage for a container
    pub async fn blkio(&self, container_id: &str) -> Result<Sample, ParseError> {
        let dir = self.controller_dir("blkio").join(container_id);
        let mut sample = Sample::new();

        for (file, suffix) in [
            ("blkio.throttle.io_service_bytes", "bytes"),
            ("blkio.throttle.io_serviced", "ops"),
        ] {
            let path = dir.join(file);
            let lines = read_lines(&path).await?;
            sample.extend(parse_blkio(&path, &lines, suffix)?);
        }

        Ok(sample)
    }

    /// Network usage for a container, read through its first process
    pub async fn network(&self, container_id: &str) -> Result<Sample, ParseError> {
        let tasks_path = self.live_container_dir().join(container_id).join("tasks");
        let lines = read_lines(&tasks_path).await?;
        let Some(first) = lines.iter().map(|l| l.trim()).find(|l| !l.is_empty()) else {
            return Ok(Sample::new());
        };
        let pid: u32 = first
            .parse()
            .map_err(|_| ParseError::malformed(&tasks_path, first))?;

        let net_dev = self.proc_dir().join(pid.to_string()).join("net").join("dev");
        let lines = read_lines(&net_dev).await?;
        parse_net_dev(&net_dev, &lines)
    }
}

/// Derive the memory sample from `memory.stat` and the raw limit
pub fn memory_usage(mut stat: Sample, limit: u64) -> Sample {
    let total = ["cache", "rss", "swap"]
        .iter()
        .map(|k| stat.get(*k).copied().unwrap_or(0))
        .fold(0u64, u64::saturating_add);

    stat.insert("total".to_string(), total);
    let limit = if limit > UNLIMITED_MEMORY_THRESHOLD { 0 } else { limit };
    stat.insert("limit".to_string(), limit);
    stat
}

/// Derive the CPU sample from `cpuacct.stat` and `cpu.stat`
pub fn cpu_usage(mut accounting: Sample, throttling: &Sample) -> Sample {
    let throttled_ns = throttling.get("throttled_time").copied().unwrap_or(0);
    let throttled = (throttled_ns as f64 * THROTTLED_NS_TO_TICKS) as u64;
    accounting.insert("throttled".to_string(), throttled);
    accounting
}

/// Sum per-device `<major:minor> <Op> <value>` lines into `<op>_<suffix>`
pub fn parse_blkio(path: &Path, lines: &[String], suffix: &str) -> Result<Sample, ParseError> {
    let mut sample = Sample::new();

    for line in lines {
        let parts: Vec<&str> = line.split_whitespace().collect();
        match parts.as_slice() {
            [] => continue,
            // Trailing grand total, already covered by the per-device Total lines
            ["Total", value] if value.parse::<u64>().is_ok() => continue,
            [_device, op, value] => {
                let value: u64 = value
                    .parse()
                    .map_err(|_| ParseError::malformed(path, line))?;
                if let Some((_, prefix)) = BLKIO_OPS.iter().find(|(name, _)| name == op) {
                    *sample.entry(format!("{}_{}", prefix, suffix)).or_insert(0) += value;
                }
            }
            _ => return Err(ParseError::malformed(path, line)),
        }
    }

    Ok(sample)
}

/// Sum `/proc/<pid>/net/dev` counters across every interface except loopback
pub fn parse_net_dev(path: &Path, lines: &[String]) -> Result<Sample, ParseError> {
    const COLUMNS: [(usize, &str); 8] = [
        (0, "rx_bytes"),
        (1, "rx_packets"),
        (2, "rx_errors"),
        (3, "rx_dropped"),
        (8, "tx_bytes"),
        (9, "tx_packets"),
        (10, "tx_errors"),
        (11, "tx_dropped"),
    ];

    let mut sample = Sample::new();

    // Two header lines precede the interfaces
    for line in lines.iter().skip(2) {
        if line.trim().is_empty() {
            continue;
        }
        let (iface, counters) = line
            .split_once(':')
            .ok_or_else(|| ParseError::malformed(path, line))?;
        if iface.trim() == "lo" {
            continue;
        }

        let values = counters
            .split_whitespace()
            .map(str::parse::<u64>)
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| ParseError::malformed(path, line))?;
        if values.len() < 12 {
            return Err(ParseError::malformed(path, line));
        }

        for (column, field) in COLUMNS {
            *sample.entry(field.to_string()).or_insert(0) += values[column];
        }
    }

    Ok(sample)
}

#[async_trait]
impl MetricsCollector for CgroupV1Collector {
    async fn collect(&self, container_id: &str, family: MetricFamily) -> Result<Sample, ParseError> {
        match family {
            MetricFamily::Cpu => self.cpu(container_id).await,
            MetricFamily::Memory => self.memory(container_id).await,
            MetricFamily::Blkio => self.blkio(container_id).await,
            MetricFamily::Network => self.network(container_id).await,
        }
    }

    async fn list_containers(&self) -> Result<Vec<String>> {
        let dir = self.live_container_dir();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %dir.display(), "Container cgroup directory not found");
                return Ok(Vec::new());
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to list {}", dir.display()));
            }
        };

        let mut containers = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            // Controller files such as cpu.shares sit next to container directories
            let file_type = entry.file_type().await?;
            if file_type.is_file() {
                continue;
            }
            containers.push(entry.file_name().to_string_lossy().to_string());
        }

        containers.sort();
        Ok(containers)
    }
}
