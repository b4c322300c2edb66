//! Structured JSON logging for agent events
//!
//! Every event carries an `event` name and the agent id so that log
//! pipelines can filter on them without parsing messages.

use crate::collector::CycleReport;
use crate::lifecycle::CleanupReport;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Structured logger for agent lifecycle and cycle events
pub struct StructuredLogger {
    agent_id: String,
}

impl StructuredLogger {
    pub fn new(agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Log agent startup
    pub fn log_startup(
        &self,
        version: &str,
        data_dir: &Path,
        pseudo_root: &Path,
        collection_interval: Duration,
        cleanup_interval: Duration,
    ) {
        info!(
            event = "agent_started",
            agent = %self.agent_id,
            version = %version,
            data_dir = %data_dir.display(),
            pseudo_root = %pseudo_root.display(),
            collection_interval_secs = collection_interval.as_secs(),
            cleanup_interval_secs = cleanup_interval.as_secs(),
            "Container metrics agent started"
        );
    }

    /// Log the result of a collection cycle
    pub fn log_cycle(&self, report: &CycleReport) {
        if report.failed > 0 {
            warn!(
                event = "collection_cycle",
                agent = %self.agent_id,
                observed = report.observed,
                resolved = report.resolved,
                sampled = report.sampled,
                stopped = report.stopped,
                failed = report.failed,
                terminated = report.terminated,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Collection cycle finished with failures"
            );
        } else {
            info!(
                event = "collection_cycle",
                agent = %self.agent_id,
                observed = report.observed,
                resolved = report.resolved,
                sampled = report.sampled,
                stopped = report.stopped,
                terminated = report.terminated,
                elapsed_ms = report.elapsed.as_millis() as u64,
                "Collection cycle finished"
            );
        }
    }

    /// Log a collection cycle that could not run at all
    pub fn log_cycle_error(&self, error: &anyhow::Error) {
        warn!(
            event = "collection_cycle_failed",
            agent = %self.agent_id,
            error = %format!("{:#}", error),
            "Collection cycle failed"
        );
    }

    /// Log the result of a cleanup pass
    pub fn log_cleanup(&self, report: &CleanupReport) {
        info!(
            event = "cleanup",
            agent = %self.agent_id,
            containers_removed = report.containers_removed,
            tasks_removed = report.tasks_removed,
            tasks_kept = report.tasks_kept,
            "Cleanup pass finished"
        );
    }

    /// Log agent shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "agent_shutdown",
            agent = %self.agent_id,
            reason = %reason,
            "Container metrics agent shutting down"
        );
    }
}
