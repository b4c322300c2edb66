//! Fixed store schemas per metric family

use serde::{Deserialize, Serialize};

/// Data is collected every STEP_SECS seconds
pub const STEP_SECS: u64 = 5;

/// Silence between two updates before a value is considered unknown
pub const HEARTBEAT_SECS: u64 = STEP_SECS * 2;

/// How a data source interprets written values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataSourceKind {
    /// Monotonic counter, stored as a per-second rate
    Counter,
    /// Instantaneous value, stored as is
    Gauge,
}

/// Consolidation function of an archive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Consolidation {
    Min,
    Max,
    Average,
}

/// A retention archive: `rows` rows, each consolidating `pdp_per_row` steps
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Archive {
    pub consolidation: Consolidation,
    /// Fraction of unknown steps tolerated in one row
    pub xff: f64,
    pub pdp_per_row: u32,
    pub rows: u32,
}

impl Archive {
    const fn new(consolidation: Consolidation, pdp_per_row: u32, rows: u32) -> Self {
        Self {
            consolidation,
            xff: 0.5,
            pdp_per_row,
            rows,
        }
    }
}

// 12 samples per minute, 1440 samples in two hours
pub const ARCHIVES: [Archive; 6] = [
    // every sample of the last two hours
    Archive::new(Consolidation::Min, 1, 1440),
    // one row per minute for the last six hours
    Archive::new(Consolidation::Min, 12, 360),
    Archive::new(Consolidation::Max, 1, 1440),
    Archive::new(Consolidation::Max, 12, 360),
    Archive::new(Consolidation::Average, 1, 1440),
    Archive::new(Consolidation::Average, 12, 360),
];

/// Field layout of one metric family's store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schema {
    pub family: &'static str,
    pub kind: DataSourceKind,
    pub fields: &'static [&'static str],
}

pub const SCHEMAS: [Schema; 4] = [
    Schema {
        family: "cpu.usage",
        kind: DataSourceKind::Counter,
        fields: &["user", "system", "throttled"],
    },
    Schema {
        family: "blkio.usage",
        kind: DataSourceKind::Counter,
        fields: &[
            "read_bytes",
            "read_ops",
            "write_bytes",
            "write_ops",
            "sync_bytes",
            "sync_ops",
            "async_bytes",
            "async_ops",
            "total_bytes",
            "total_ops",
        ],
    },
    Schema {
        family: "memory.usage",
        kind: DataSourceKind::Gauge,
        fields: &["cache", "rss", "swap", "total", "limit"],
    },
    Schema {
        family: "network.usage",
        kind: DataSourceKind::Counter,
        fields: &[
            "rx_bytes",
            "rx_packets",
            "rx_errors",
            "rx_dropped",
            "tx_bytes",
            "tx_packets",
            "tx_errors",
            "tx_dropped",
        ],
    },
];

/// Registered schema for a family name
pub fn schema_for(family: &str) -> Option<&'static Schema> {
    SCHEMAS.iter().find(|s| s.family == family)
}
