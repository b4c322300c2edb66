//! Time-series persistence
//!
//! One round-robin store per (container, metric family). Stores are created
//! on the first sample for a family and appended to on every cycle after
//! that; a failed creation or append is retried on the next cycle through
//! the same existence check.

mod rrd;
pub mod schema;

pub use rrd::{DataSourceDef, RoundRobinStore, StoreHeader};
pub use schema::{schema_for, Archive, Consolidation, DataSourceKind, Schema, ARCHIVES};

use crate::error::StoreError;
use crate::models::Sample;
use std::path::Path;
use tracing::{info, warn};

/// Create the store at `path` if it does not exist yet
///
/// Returns `true` when the store was created by this call.
pub fn ensure_created(path: &Path, schema: &Schema) -> Result<bool, StoreError> {
    // Start one second back so an append in the creation second is accepted
    let start = chrono::Utc::now().timestamp() - 1;
    let created = RoundRobinStore::create(path, schema, start)?;
    if created {
        info!(path = %path.display(), family = schema.family, "Created round-robin store");
    }
    Ok(created)
}

/// Append one sample stamped with the current wall-clock second
pub fn append(path: &Path, schema: &Schema, values: &Sample) -> Result<(), StoreError> {
    append_at(path, schema, values, chrono::Utc::now().timestamp())
}

/// Append one sample at `timestamp`
///
/// Schema fields missing from `values` are written as 0 so an idle
/// subsystem does not show up as a gap.
pub fn append_at(
    path: &Path,
    schema: &Schema,
    values: &Sample,
    timestamp: i64,
) -> Result<(), StoreError> {
    let mut store = RoundRobinStore::open(path)?;

    let found = store.header().field_names();
    if found.iter().map(String::as_str).ne(schema.fields.iter().copied()) {
        return Err(StoreError::SchemaMismatch {
            path: path.to_path_buf(),
            expected: schema.fields.iter().map(|f| f.to_string()).collect(),
            found,
        });
    }

    let row: Vec<f64> = schema
        .fields
        .iter()
        .map(|field| values.get(*field).copied().unwrap_or(0) as f64)
        .collect();

    store.update(timestamp, &row)
}

/// Outcome of dispatching one sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Written,
    /// Nothing to write
    Empty,
    /// No schema registered for the family
    UnknownFamily,
    /// Store creation or append failed; retried next cycle
    Failed,
}

/// Persist a sample for `family` under `container_dir`
///
/// Never fails: every problem is logged and reported through the outcome.
pub fn dispatch(container_dir: &Path, family: &str, sample: &Sample) -> DispatchOutcome {
    if sample.is_empty() {
        return DispatchOutcome::Empty;
    }

    let Some(schema) = schema_for(family) else {
        warn!(family = %family, "No matching data source found for metric family, dropping sample");
        return DispatchOutcome::UnknownFamily;
    };

    let path = container_dir.join(format!("{}.rrd", schema.family));

    if let Err(e) = ensure_created(&path, schema) {
        warn!(path = %path.display(), error = %e, "Failed to create round-robin store");
        return DispatchOutcome::Failed;
    }

    match append(&path, schema, sample) {
        Ok(()) => DispatchOutcome::Written,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to append sample");
            DispatchOutcome::Failed
        }
    }
}
