//! Container metrics agent
//!
//! Runs on each build host, sampling per-container cgroup usage into
//! round-robin stores and tracking which task owns each container.

use anyhow::Result;
use container_metrics_lib::{
    cleanup, CgroupV1Collector, CollectionLoopBuilder, ContainerTracker, DataLayout,
    DockerCliInspector, PeriodicTask, StructuredLogger,
};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod config;

const AGENT_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    let config = config::AgentConfig::load()?;
    let logger = Arc::new(StructuredLogger::new(&config.agent_id));
    logger.log_startup(
        AGENT_VERSION,
        &config.data_dir,
        &config.pseudo_root,
        config.collection_interval(),
        config.cleanup_interval(),
    );

    let layout = DataLayout::new(&config.data_dir);
    layout.ensure_root().await?;

    let tracker = Arc::new(ContainerTracker::new(
        layout.clone(),
        Arc::new(CgroupV1Collector::new(&config.pseudo_root)),
        Arc::new(DockerCliInspector::new(&config.docker_binary)),
        config.metric_families(),
    ));

    let collection = Arc::new(
        CollectionLoopBuilder::new()
            .tracker(tracker)
            .interval(config.collection_interval())
            .max_workers(config.max_workers)
            .build()?,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let collection_task = PeriodicTask::new("collection", collection.config().interval);
    let collection_handle = {
        let logger = Arc::clone(&logger);
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            collection_task
                .run(
                    move || {
                        let collection = Arc::clone(&collection);
                        let logger = Arc::clone(&logger);
                        async move {
                            match collection.run_cycle().await {
                                Ok(report) => logger.log_cycle(&report),
                                Err(e) => logger.log_cycle_error(&e),
                            }
                        }
                    },
                    shutdown,
                )
                .await
        })
    };

    let cleanup_task = PeriodicTask::new("cleanup", config.cleanup_interval());
    let cleanup_handle = {
        let logger = Arc::clone(&logger);
        let expiration = config.expiration();
        tokio::spawn(async move {
            cleanup_task
                .run(
                    move || {
                        let layout = layout.clone();
                        let logger = Arc::clone(&logger);
                        async move {
                            match cleanup(&layout, expiration, SystemTime::now()).await {
                                Ok(report) => logger.log_cleanup(&report),
                                Err(e) => warn!(error = %e, "Cleanup pass failed"),
                            }
                        }
                    },
                    shutdown_rx,
                )
                .await
        })
    };

    // Wait for shutdown signal
    let mut terminate = signal(SignalKind::terminate())?;
    let reason = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            result?;
            "SIGINT received"
        }
        _ = terminate.recv() => "SIGTERM received",
    };
    logger.log_shutdown(reason);

    // Both timers stop and finish their in-flight run before exit
    let _ = shutdown_tx.send(true);
    for (name, handle) in [("collection", collection_handle), ("cleanup", cleanup_handle)] {
        match handle.await {
            Ok(stats) => info!(task = %name, runs = stats.runs, dropped = stats.dropped, "Timer stopped"),
            Err(e) => warn!(task = %name, error = %e, "Timer task failed"),
        }
    }

    Ok(())
}
