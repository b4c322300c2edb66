//! Agent library for per-container resource metrics
//!
//! This crate provides the core functionality for:
//! - Metrics collection from cgroup v1 pseudo-files
//! - Round-robin time-series persistence
//! - Container and task lifecycle tracking
//! - Periodic scheduling and structured logging

pub mod collector;
pub mod error;
pub mod lifecycle;
pub mod models;
pub mod observability;
pub mod scheduler;
pub mod store;

pub use collector::{
    CgroupV1Collector, CollectionConfig, CollectionLoop, CollectionLoopBuilder, CycleReport,
    MetricsCollector,
};
pub use error::{LifecycleError, ParseError, StoreError};
pub use lifecycle::{
    cleanup, CleanupReport, ContainerRecord, ContainerState, ContainerTracker, DataLayout,
    DockerCliInspector, RuntimeInspector, UnitOutcome, DEFAULT_EXPIRATION,
};
pub use models::*;
pub use observability::StructuredLogger;
pub use scheduler::{PeriodicStats, PeriodicTask, RunPermit, TickGuard};
