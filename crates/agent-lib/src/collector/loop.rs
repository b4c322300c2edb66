//! Metrics collection cycle
//!
//! One cycle lists the live containers and runs a lifecycle unit for each
//! of them on a bounded pool of tasks, then waits for every unit to finish.

use super::MetricsCollector;
use crate::lifecycle::{ContainerTracker, UnitOutcome};
use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Configuration for the metrics collection cycle
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    /// Collection interval (default: 5 seconds)
    pub interval: Duration,
    /// Maximum units running at once (default: available parallelism)
    pub max_workers: usize,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            max_workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Results from a collection cycle
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Live containers seen in this cycle
    pub observed: usize,
    /// Units that looked up the owning task
    pub resolved: usize,
    /// Units that wrote metric stores
    pub sampled: usize,
    /// Units skipped because of a stop marker
    pub stopped: usize,
    /// Units aborted by an error
    pub failed: usize,
    /// Tracked containers no longer live
    pub terminated: usize,
    pub elapsed: Duration,
}

/// Runs collection cycles for every live container
pub struct CollectionLoop {
    tracker: Arc<ContainerTracker>,
    config: CollectionConfig,
}

impl CollectionLoop {
    /// Create a new collection loop
    pub fn new(tracker: Arc<ContainerTracker>, config: CollectionConfig) -> Self {
        Self { tracker, config }
    }

    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    pub fn tracker(&self) -> &Arc<ContainerTracker> {
        &self.tracker
    }

    /// Run one collection cycle and wait for all of its units
    pub async fn run_cycle(&self) -> Result<CycleReport> {
        let start = Instant::now();
        let layout = self.tracker.layout();
        layout.ensure_root().await?;

        let collector: &Arc<dyn MetricsCollector> = self.tracker.collector();
        let live = collector.list_containers().await?;

        let mut report = CycleReport {
            observed: live.len(),
            ..Default::default()
        };

        let semaphore = Arc::new(Semaphore::new(self.config.max_workers.max(1)));
        let mut units = JoinSet::new();

        for container_id in live.iter().cloned() {
            let tracker = Arc::clone(&self.tracker);
            let semaphore = Arc::clone(&semaphore);
            units.spawn(async move {
                let _permit = semaphore.acquire_owned().await.ok();
                let outcome = tracker.observe(&container_id).await;
                (container_id, outcome)
            });
        }

        while let Some(joined) = units.join_next().await {
            match joined {
                Ok((_, Ok(UnitOutcome::Resolved { .. }))) => report.resolved += 1,
                Ok((_, Ok(UnitOutcome::Sampled { .. }))) => report.sampled += 1,
                Ok((_, Ok(UnitOutcome::Stopped))) => report.stopped += 1,
                Ok((container_id, Err(e))) => {
                    report.failed += 1;
                    warn!(container_id = %container_id, error = %e, "Container unit failed");
                }
                Err(e) => {
                    report.failed += 1;
                    warn!(error = %e, "Container unit panicked");
                }
            }
        }

        let live: HashSet<&String> = live.iter().collect();
        report.terminated = layout
            .tracked_containers()
            .await?
            .iter()
            .filter(|id| !live.contains(id))
            .count();

        report.elapsed = start.elapsed();
        debug!(
            observed = report.observed,
            sampled = report.sampled,
            failed = report.failed,
            elapsed_ms = report.elapsed.as_millis(),
            "Collection cycle complete"
        );

        Ok(report)
    }
}

/// Builder for creating the collection loop
pub struct CollectionLoopBuilder {
    tracker: Option<Arc<ContainerTracker>>,
    config: CollectionConfig,
}

impl CollectionLoopBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            tracker: None,
            config: CollectionConfig::default(),
        }
    }

    /// Set the container tracker
    pub fn tracker(mut self, tracker: Arc<ContainerTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    /// Set the collection interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.config.interval = interval;
        self
    }

    /// Set the worker pool size; zero keeps the default
    pub fn max_workers(mut self, max_workers: usize) -> Self {
        if max_workers > 0 {
            self.config.max_workers = max_workers;
        }
        self
    }

    /// Build the collection loop
    pub fn build(self) -> Result<CollectionLoop> {
        let tracker = self
            .tracker
            .ok_or_else(|| anyhow::anyhow!("Tracker is required"))?;

        Ok(CollectionLoop::new(tracker, self.config))
    }
}

impl Default for CollectionLoopBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParseError;
    use crate::lifecycle::{DataLayout, RuntimeInspector};
    use crate::models::{InspectResult, MetricFamily, Sample};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Mock collector for testing
    struct MockCollector {
        containers: Vec<String>,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    impl MockCollector {
        fn new(containers: &[&str]) -> Self {
            Self {
                containers: containers.iter().map(|s| s.to_string()).collect(),
                in_flight: AtomicUsize::new(0),
                max_in_flight: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MetricsCollector for MockCollector {
        async fn collect(
            &self,
            container_id: &str,
            family: MetricFamily,
        ) -> Result<Sample, ParseError> {
            let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(current, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            if container_id == "broken" {
                return Err(ParseError::Malformed {
                    path: "memory.stat".into(),
                    line: "garbage".to_string(),
                });
            }

            Ok(match family {
                MetricFamily::Cpu => [("user", 10u64), ("system", 5), ("throttled", 0)],
                _ => [("cache", 1), ("rss", 2), ("swap", 0)],
            }
            .iter()
            .map(|(k, v)| (k.to_string(), *v))
            .collect())
        }

        async fn list_containers(&self) -> Result<Vec<String>> {
            Ok(self.containers.clone())
        }
    }

    struct MockInspector;

    #[async_trait]
    impl RuntimeInspector for MockInspector {
        async fn inspect(&self, container_id: &str) -> Result<InspectResult> {
            Ok(InspectResult {
                task_arn: "arn:aws:ecs:us-east-1:1:task/t-1".to_string(),
                container_name: container_id.to_string(),
            })
        }
    }

    fn collection_loop(
        temp_dir: &TempDir,
        collector: Arc<MockCollector>,
        max_workers: usize,
    ) -> CollectionLoop {
        let tracker = ContainerTracker::new(
            DataLayout::new(temp_dir.path()),
            collector,
            Arc::new(MockInspector),
            vec![MetricFamily::Cpu, MetricFamily::Memory],
        );

        CollectionLoopBuilder::new()
            .tracker(Arc::new(tracker))
            .max_workers(max_workers)
            .build()
            .unwrap()
    }

    #[test]
    fn test_collection_config_default() {
        let config = CollectionConfig::default();
        assert_eq!(config.interval, Duration::from_secs(5));
        assert!(config.max_workers >= 1);
    }

    #[test]
    fn test_collection_loop_builder_missing_tracker() {
        let result = CollectionLoopBuilder::new().build();
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_cycle_without_containers() {
        let temp_dir = TempDir::new().unwrap();
        let collection = collection_loop(&temp_dir, Arc::new(MockCollector::new(&[])), 2);

        let report = collection.run_cycle().await.unwrap();

        assert_eq!(report.observed, 0);
        assert_eq!(report.terminated, 0);
        assert!(temp_dir.path().join("containers").is_dir());
        assert!(temp_dir.path().join("tasks").is_dir());
    }

    #[tokio::test]
    async fn test_cycles_resolve_then_sample() {
        let temp_dir = TempDir::new().unwrap();
        let collector = Arc::new(MockCollector::new(&["a", "b", "broken"]));
        let collection = collection_loop(&temp_dir, collector, 4);

        let first = collection.run_cycle().await.unwrap();
        assert_eq!(first.observed, 3);
        assert_eq!(first.resolved, 3);
        assert_eq!(first.sampled, 0);

        let second = collection.run_cycle().await.unwrap();
        assert_eq!(second.sampled, 2);
        assert_eq!(second.failed, 1);
        assert!(temp_dir.path().join("containers/a/cpu.usage.rrd").exists());
        assert!(temp_dir.path().join("containers/b/memory.usage.rrd").exists());
        assert!(!temp_dir.path().join("containers/broken/cpu.usage.rrd").exists());
    }

    #[tokio::test]
    async fn test_worker_pool_is_bounded() {
        let temp_dir = TempDir::new().unwrap();
        let ids = ["c1", "c2", "c3", "c4", "c5", "c6"];
        let collector = Arc::new(MockCollector::new(&ids));
        let collection = collection_loop(&temp_dir, collector.clone(), 2);

        collection.run_cycle().await.unwrap();
        let report = collection.run_cycle().await.unwrap();

        assert_eq!(report.sampled, ids.len());
        assert!(collector.max_in_flight.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_terminated_containers_counted() {
        let temp_dir = TempDir::new().unwrap();
        let collection = collection_loop(&temp_dir, Arc::new(MockCollector::new(&["live"])), 2);

        std::fs::create_dir_all(temp_dir.path().join("containers/gone")).unwrap();
        let report = collection.run_cycle().await.unwrap();

        assert_eq!(report.observed, 1);
        assert_eq!(report.terminated, 1);
    }
}
