//! Round-robin database file
//!
//! A store file is fully pre-allocated when created and never grows:
//!
//! ```text
//! magic (8) | header length (u32 LE) | JSON header | pad to 8
//! live state: last update, per data source raw value + step accumulator,
//!             per archive step counter, row pointer + consolidation state
//! archive rows: f64 LE, one column per data source, NaN = unknown
//! ```
//!
//! Updates are applied in place through a memory map. Written values are
//! turned into rates (counters) or taken as is (gauges), integrated into
//! one primary data point per step, and consolidated into every archive.
//!
//! Files are never resized after creation, so a mapping stays valid for its
//! whole lifetime. Updates are not locked: one agent process per data
//! directory is assumed. Two agents appending to the same store would
//! interleave their live-state words.

use super::schema::{
    Archive, Consolidation, DataSourceKind, Schema, ARCHIVES, HEARTBEAT_SECS, STEP_SECS,
};
use crate::error::StoreError;
use memmap2::MmapMut;
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

const MAGIC: &[u8; 8] = b"CMRRD\0v1";
const FORMAT_VERSION: u32 = 1;
const PREAMBLE_LEN: usize = MAGIC.len() + 4;
const WORD: usize = 8;

/// Data source definition persisted in the header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSourceDef {
    pub name: String,
    pub kind: DataSourceKind,
    pub heartbeat: u64,
    pub min: f64,
    /// `None` means unbounded
    pub max: Option<f64>,
}

/// Immutable part of a store file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreHeader {
    pub version: u32,
    pub step: u64,
    pub start: i64,
    pub data_sources: Vec<DataSourceDef>,
    pub archives: Vec<Archive>,
}

impl StoreHeader {
    fn for_schema(schema: &Schema, archives: &[Archive], start: i64) -> Self {
        Self {
            version: FORMAT_VERSION,
            step: STEP_SECS,
            start,
            data_sources: schema
                .fields
                .iter()
                .map(|name| DataSourceDef {
                    name: name.to_string(),
                    kind: schema.kind,
                    heartbeat: HEARTBEAT_SECS,
                    min: 0.0,
                    max: None,
                })
                .collect(),
            archives: archives.to_vec(),
        }
    }

    pub fn field_names(&self) -> Vec<String> {
        self.data_sources.iter().map(|ds| ds.name.clone()).collect()
    }
}

/// Byte offsets of the live state and archive areas
#[derive(Debug, Clone)]
struct Layout {
    ds_count: usize,
    state_offset: usize,
    archive_offsets: Vec<usize>,
    total_len: usize,
}

impl Layout {
    fn new(header: &StoreHeader, header_len: usize) -> Self {
        let ds_count = header.data_sources.len();
        let state_offset = (PREAMBLE_LEN + header_len).div_ceil(WORD) * WORD;
        let state_words = 1 + 3 * ds_count + header.archives.len() * (2 + 2 * ds_count);

        let mut offset = state_offset + state_words * WORD;
        let mut archive_offsets = Vec::with_capacity(header.archives.len());
        for archive in &header.archives {
            archive_offsets.push(offset);
            offset += archive.rows as usize * ds_count * WORD;
        }

        Self {
            ds_count,
            state_offset,
            archive_offsets,
            total_len: offset,
        }
    }

    fn last_update(&self) -> usize {
        self.state_offset
    }

    /// Last raw value written to a data source
    fn last_raw(&self, ds: usize) -> usize {
        self.state_offset + (1 + 3 * ds) * WORD
    }

    /// Integrated value of the current step
    fn pdp_value(&self, ds: usize) -> usize {
        self.last_raw(ds) + WORD
    }

    /// Known seconds of the current step
    fn pdp_known(&self, ds: usize) -> usize {
        self.last_raw(ds) + 2 * WORD
    }

    fn archive_state(&self, archive: usize) -> usize {
        self.state_offset + (1 + 3 * self.ds_count + archive * (2 + 2 * self.ds_count)) * WORD
    }

    /// Steps consolidated into the current row so far
    fn pdp_count(&self, archive: usize) -> usize {
        self.archive_state(archive)
    }

    /// Index of the most recently written row
    fn cur_row(&self, archive: usize) -> usize {
        self.archive_state(archive) + WORD
    }

    fn cdp_value(&self, archive: usize, ds: usize) -> usize {
        self.archive_state(archive) + (2 + 2 * ds) * WORD
    }

    fn cdp_unknown(&self, archive: usize, ds: usize) -> usize {
        self.cdp_value(archive, ds) + WORD
    }

    fn cell(&self, archive: usize, row: usize, ds: usize) -> usize {
        self.archive_offsets[archive] + (row * self.ds_count + ds) * WORD
    }
}

fn get_word(buf: &[u8], offset: usize) -> [u8; 8] {
    let mut word = [0u8; WORD];
    word.copy_from_slice(&buf[offset..offset + WORD]);
    word
}

fn get_f64(buf: &[u8], offset: usize) -> f64 {
    f64::from_le_bytes(get_word(buf, offset))
}

fn put_f64(buf: &mut [u8], offset: usize, value: f64) {
    buf[offset..offset + WORD].copy_from_slice(&value.to_le_bytes());
}

fn get_u64(buf: &[u8], offset: usize) -> u64 {
    u64::from_le_bytes(get_word(buf, offset))
}

fn put_u64(buf: &mut [u8], offset: usize, value: u64) {
    buf[offset..offset + WORD].copy_from_slice(&value.to_le_bytes());
}

fn get_i64(buf: &[u8], offset: usize) -> i64 {
    i64::from_le_bytes(get_word(buf, offset))
}

fn put_i64(buf: &mut [u8], offset: usize, value: i64) {
    buf[offset..offset + WORD].copy_from_slice(&value.to_le_bytes());
}

fn gcd(a: u64, b: u64) -> u64 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// An open round-robin store
pub struct RoundRobinStore {
    path: PathBuf,
    header: StoreHeader,
    layout: Layout,
    map: MmapMut,
}

impl RoundRobinStore {
    /// Create a store file for `schema` unless one already exists
    ///
    /// Returns `true` when this call created the file. The file is written
    /// to a temporary sibling and persisted without clobbering, so losing a
    /// creation race to another writer counts as "already exists".
    pub fn create(path: &Path, schema: &Schema, start: i64) -> Result<bool, StoreError> {
        if path.exists() {
            return Ok(false);
        }

        let header = StoreHeader::for_schema(schema, &ARCHIVES, start);
        let header_json = serde_json::to_vec(&header)
            .map_err(|e| StoreError::format(path, e.to_string()))?;
        let layout = Layout::new(&header, header_json.len());

        let mut buf = vec![0u8; layout.total_len];
        buf[..MAGIC.len()].copy_from_slice(MAGIC);
        buf[MAGIC.len()..PREAMBLE_LEN].copy_from_slice(&(header_json.len() as u32).to_le_bytes());
        buf[PREAMBLE_LEN..PREAMBLE_LEN + header_json.len()].copy_from_slice(&header_json);

        put_i64(&mut buf, layout.last_update(), start);
        for ds in 0..layout.ds_count {
            put_f64(&mut buf, layout.last_raw(ds), f64::NAN);
        }

        let start_step = start.div_euclid(header.step as i64) as u64;
        for (index, archive) in header.archives.iter().enumerate() {
            // Rows are aligned to absolute time; steps before `start` are unknown
            let elapsed = start_step % archive.pdp_per_row as u64;
            put_u64(&mut buf, layout.pdp_count(index), elapsed);
            put_u64(&mut buf, layout.cur_row(index), archive.rows as u64 - 1);
            for ds in 0..layout.ds_count {
                put_f64(&mut buf, layout.cdp_value(index, ds), f64::NAN);
                put_f64(&mut buf, layout.cdp_unknown(index, ds), elapsed as f64);
            }
            for row in 0..archive.rows as usize {
                for ds in 0..layout.ds_count {
                    put_f64(&mut buf, layout.cell(index, row, ds), f64::NAN);
                }
            }
        }

        let dir = path
            .parent()
            .ok_or_else(|| StoreError::format(path, "store path has no parent directory"))?;
        let mut temp = tempfile::NamedTempFile::new_in(dir).map_err(|e| StoreError::io(path, e))?;
        temp.write_all(&buf).map_err(|e| StoreError::io(path, e))?;
        temp.as_file()
            .sync_all()
            .map_err(|e| StoreError::io(path, e))?;

        match temp.persist_noclobber(path) {
            Ok(_) => {
                debug!(path = %path.display(), bytes = buf.len(), "Store file written");
                Ok(true)
            }
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(StoreError::io(path, e.error)),
        }
    }

    /// Open an existing store file for reading and updating
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)
            .map_err(|e| StoreError::io(path, e))?;

        // SAFETY: store files are created at their final length and never
        // truncated, so the mapping cannot outlive its backing pages. Writers
        // are limited to one agent per data directory (see module docs).
        let map = unsafe { MmapMut::map_mut(&file) }.map_err(|e| StoreError::io(path, e))?;

        if map.len() < PREAMBLE_LEN || &map[..MAGIC.len()] != MAGIC {
            return Err(StoreError::format(path, "bad magic"));
        }
        let mut len_bytes = [0u8; 4];
        len_bytes.copy_from_slice(&map[MAGIC.len()..PREAMBLE_LEN]);
        let header_len = u32::from_le_bytes(len_bytes) as usize;
        if map.len() < PREAMBLE_LEN + header_len {
            return Err(StoreError::format(path, "truncated header"));
        }

        let header: StoreHeader =
            serde_json::from_slice(&map[PREAMBLE_LEN..PREAMBLE_LEN + header_len])
                .map_err(|e| StoreError::format(path, e.to_string()))?;
        if header.version != FORMAT_VERSION {
            return Err(StoreError::format(
                path,
                format!("unsupported version {}", header.version),
            ));
        }

        let layout = Layout::new(&header, header_len);
        if map.len() != layout.total_len {
            return Err(StoreError::format(
                path,
                format!("expected {} bytes, found {}", layout.total_len, map.len()),
            ));
        }

        Ok(Self {
            path: path.to_path_buf(),
            header,
            layout,
            map,
        })
    }

    pub fn header(&self) -> &StoreHeader {
        &self.header
    }

    /// Timestamp of the latest accepted update
    pub fn last_update(&self) -> i64 {
        get_i64(&self.map, self.layout.last_update())
    }

    /// Raw values of the latest accepted update, NaN before the first one
    pub fn last_values(&self) -> Vec<f64> {
        (0..self.layout.ds_count)
            .map(|ds| get_f64(&self.map, self.layout.last_raw(ds)))
            .collect()
    }

    /// Rows of one archive, oldest first
    pub fn archive_rows(&self, archive: usize) -> Vec<Vec<f64>> {
        let Some(def) = self.header.archives.get(archive) else {
            return Vec::new();
        };
        let rows = def.rows as usize;
        let cur_row = get_u64(&self.map, self.layout.cur_row(archive)) as usize;

        (1..=rows)
            .map(|i| (cur_row + i) % rows)
            .map(|row| {
                (0..self.layout.ds_count)
                    .map(|ds| get_f64(&self.map, self.layout.cell(archive, row, ds)))
                    .collect()
            })
            .collect()
    }

    /// Apply one update at `timestamp`, one value per data source
    pub fn update(&mut self, timestamp: i64, values: &[f64]) -> Result<(), StoreError> {
        if values.len() != self.layout.ds_count {
            return Err(StoreError::format(
                &self.path,
                format!(
                    "expected {} values, got {}",
                    self.layout.ds_count,
                    values.len()
                ),
            ));
        }

        let last_update = self.last_update();
        if timestamp <= last_update {
            return Err(StoreError::StaleUpdate {
                path: self.path.clone(),
                timestamp,
                last_update,
            });
        }

        let elapsed = timestamp - last_update;
        let rates = self.rates(elapsed, values);

        let step = self.header.step as i64;
        let boundary = last_update - last_update.rem_euclid(step) + step;

        if timestamp < boundary {
            self.accumulate(&rates, elapsed);
        } else {
            self.accumulate(&rates, boundary - last_update);
            let pdp = self.finish_step();
            self.consolidate(&pdp);

            let full_steps = (timestamp - boundary) / step;
            for _ in 0..self.steps_to_replay(full_steps as u64) {
                self.consolidate(&rates);
            }
            self.accumulate(&rates, timestamp - (boundary + full_steps * step));
        }

        put_i64(&mut self.map, self.layout.last_update(), timestamp);
        self.map.flush().map_err(|e| StoreError::io(&self.path, e))
    }

    /// Per-second rate (counters) or value (gauges) of this update
    fn rates(&mut self, elapsed: i64, values: &[f64]) -> Vec<f64> {
        let mut rates = Vec::with_capacity(values.len());

        for (ds, &value) in values.iter().enumerate() {
            let def = &self.header.data_sources[ds];
            let previous = get_f64(&self.map, self.layout.last_raw(ds));

            let mut rate = match def.kind {
                DataSourceKind::Gauge => value,
                DataSourceKind::Counter if previous.is_nan() || value < previous => f64::NAN,
                DataSourceKind::Counter => (value - previous) / elapsed as f64,
            };
            if elapsed as u64 > def.heartbeat
                || rate < def.min
                || def.max.is_some_and(|max| rate > max)
            {
                rate = f64::NAN;
            }

            put_f64(&mut self.map, self.layout.last_raw(ds), value);
            rates.push(rate);
        }

        rates
    }

    fn accumulate(&mut self, rates: &[f64], seconds: i64) {
        if seconds <= 0 {
            return;
        }
        for (ds, &rate) in rates.iter().enumerate() {
            if rate.is_nan() {
                continue;
            }
            let value = get_f64(&self.map, self.layout.pdp_value(ds));
            let known = get_f64(&self.map, self.layout.pdp_known(ds));
            put_f64(&mut self.map, self.layout.pdp_value(ds), value + rate * seconds as f64);
            put_f64(&mut self.map, self.layout.pdp_known(ds), known + seconds as f64);
        }
    }

    /// Close the current step; unknown unless at least half of it is known
    fn finish_step(&mut self) -> Vec<f64> {
        let step = self.header.step as f64;
        let mut pdp = Vec::with_capacity(self.layout.ds_count);

        for ds in 0..self.layout.ds_count {
            let value = get_f64(&self.map, self.layout.pdp_value(ds));
            let known = get_f64(&self.map, self.layout.pdp_known(ds));
            pdp.push(if known * 2.0 >= step {
                value / known
            } else {
                f64::NAN
            });
            put_f64(&mut self.map, self.layout.pdp_value(ds), 0.0);
            put_f64(&mut self.map, self.layout.pdp_known(ds), 0.0);
        }

        pdp
    }

    /// Number of identical steps worth replaying after a long gap
    ///
    /// Past the longest archive span every row would be overwritten anyway;
    /// the remainder keeps row boundaries aligned.
    fn steps_to_replay(&self, full_steps: u64) -> u64 {
        let span = self
            .header
            .archives
            .iter()
            .map(|a| a.rows as u64 * a.pdp_per_row as u64)
            .max()
            .unwrap_or(0);
        let cycle = self
            .header
            .archives
            .iter()
            .map(|a| a.pdp_per_row as u64)
            .fold(1, |acc, n| acc / gcd(acc, n) * n);

        if full_steps > span {
            span + (full_steps - span) % cycle
        } else {
            full_steps
        }
    }

    /// Feed one primary data point into every archive
    fn consolidate(&mut self, pdp: &[f64]) {
        for index in 0..self.header.archives.len() {
            let archive = self.header.archives[index];

            for (ds, &value) in pdp.iter().enumerate() {
                if value.is_nan() {
                    let unknown = get_f64(&self.map, self.layout.cdp_unknown(index, ds));
                    put_f64(&mut self.map, self.layout.cdp_unknown(index, ds), unknown + 1.0);
                    continue;
                }
                let current = get_f64(&self.map, self.layout.cdp_value(index, ds));
                let next = if current.is_nan() {
                    value
                } else {
                    match archive.consolidation {
                        Consolidation::Min => current.min(value),
                        Consolidation::Max => current.max(value),
                        Consolidation::Average => current + value,
                    }
                };
                put_f64(&mut self.map, self.layout.cdp_value(index, ds), next);
            }

            let count = get_u64(&self.map, self.layout.pdp_count(index)) + 1;
            if count < archive.pdp_per_row as u64 {
                put_u64(&mut self.map, self.layout.pdp_count(index), count);
                continue;
            }

            let row = (get_u64(&self.map, self.layout.cur_row(index)) + 1) % archive.rows as u64;
            let steps = archive.pdp_per_row as f64;
            for ds in 0..self.layout.ds_count {
                let value = get_f64(&self.map, self.layout.cdp_value(index, ds));
                let unknown = get_f64(&self.map, self.layout.cdp_unknown(index, ds));
                let known = steps - unknown;

                let cell = if known <= 0.0 || unknown / steps > archive.xff {
                    f64::NAN
                } else if archive.consolidation == Consolidation::Average {
                    value / known
                } else {
                    value
                };
                put_f64(&mut self.map, self.layout.cell(index, row as usize, ds), cell);
                put_f64(&mut self.map, self.layout.cdp_value(index, ds), f64::NAN);
                put_f64(&mut self.map, self.layout.cdp_unknown(index, ds), 0.0);
            }
            put_u64(&mut self.map, self.layout.cur_row(index), row);
            put_u64(&mut self.map, self.layout.pdp_count(index), 0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::schema::schema_for;
    use tempfile::TempDir;

    fn memory_schema() -> &'static Schema {
        schema_for("memory.usage").unwrap()
    }

    fn cpu_schema() -> &'static Schema {
        schema_for("cpu.usage").unwrap()
    }

    fn last_row(store: &RoundRobinStore, archive: usize) -> Vec<f64> {
        store.archive_rows(archive).pop().unwrap()
    }

    #[test]
    fn test_create_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("memory.usage.rrd");

        assert!(RoundRobinStore::create(&path, memory_schema(), 1000).unwrap());
        let len = std::fs::metadata(&path).unwrap().len();
        assert!(!RoundRobinStore::create(&path, memory_schema(), 2000).unwrap());

        // Second call left the file alone
        assert_eq!(std::fs::metadata(&path).unwrap().len(), len);
        let store = RoundRobinStore::open(&path).unwrap();
        assert_eq!(store.last_update(), 1000);
        assert_eq!(store.header().start, 1000);
    }

    #[test]
    fn test_new_store_is_unknown() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cpu.usage.rrd");
        RoundRobinStore::create(&path, cpu_schema(), 1000).unwrap();

        let store = RoundRobinStore::open(&path).unwrap();
        assert_eq!(store.header().field_names(), vec!["user", "system", "throttled"]);
        assert_eq!(store.header().step, 5);
        assert_eq!(store.header().archives, ARCHIVES.to_vec());
        assert!(store.last_values().iter().all(|v| v.is_nan()));

        let rows = store.archive_rows(0);
        assert_eq!(rows.len(), 1440);
        assert!(rows.iter().flatten().all(|v| v.is_nan()));
        assert_eq!(store.archive_rows(1).len(), 360);
    }

    #[test]
    fn test_gauge_updates_fill_rows() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("memory.usage.rrd");
        RoundRobinStore::create(&path, memory_schema(), 1000).unwrap();
        let mut store = RoundRobinStore::open(&path).unwrap();

        for (i, cache) in [100.0, 200.0, 300.0].into_iter().enumerate() {
            let ts = 1005 + 5 * i as i64;
            store.update(ts, &[cache, 50.0, 0.0, cache + 50.0, 0.0]).unwrap();
        }

        let rows = store.archive_rows(0);
        let tail: Vec<f64> = rows[rows.len() - 3..].iter().map(|r| r[0]).collect();
        assert_eq!(tail, vec![100.0, 200.0, 300.0]);
        assert_eq!(last_row(&store, 4), vec![300.0, 50.0, 0.0, 350.0, 0.0]);
        assert_eq!(store.last_update(), 1015);
    }

    #[test]
    fn test_counter_rates() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("cpu.usage.rrd");
        RoundRobinStore::create(&path, cpu_schema(), 1000).unwrap();
        let mut store = RoundRobinStore::open(&path).unwrap();

        // First sample has no previous value to diff against
        store.update(1005, &[100.0, 10.0, 0.0]).unwrap();
        assert!(last_row(&store, 4).iter().all(|v| v.is_nan()));

        store.update(1010, &[150.0, 20.0, 5.0]).unwrap();
        assert_eq!(last_row(&store, 4), vec![10.0, 2.0, 1.0]);

        // Counter reset yields unknown rather than a negative rate
        store.update(1015, &[0.0, 25.0, 5.0]).unwrap();
        let row = last_row(&store, 4);
        assert!(row[0].is_nan());
        assert_eq!(row[1], 1.0);
        assert_eq!(row[2], 0.0);
    }

    #[test]
    fn test_heartbeat_gap_is_unknown() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("memory.usage.rrd");
        RoundRobinStore::create(&path, memory_schema(), 1000).unwrap();
        let mut store = RoundRobinStore::open(&path).unwrap();

        store.update(1005, &[1.0; 5]).unwrap();
        store.update(1030, &[2.0; 5]).unwrap();

        let rows = store.archive_rows(4);
        let tail: Vec<f64> = rows[rows.len() - 6..].iter().map(|r| r[0]).collect();
        assert_eq!(tail[0], 1.0);
        assert!(tail[1..].iter().all(|v| v.is_nan()));
        // Raw value is still recorded
        assert_eq!(store.last_values()[0], 2.0);
    }

    #[test]
    fn test_stale_update_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("memory.usage.rrd");
        RoundRobinStore::create(&path, memory_schema(), 1000).unwrap();
        let mut store = RoundRobinStore::open(&path).unwrap();

        store.update(1005, &[1.0; 5]).unwrap();
        let err = store.update(1005, &[2.0; 5]).unwrap_err();
        assert!(matches!(
            err,
            StoreError::StaleUpdate {
                timestamp: 1005,
                last_update: 1005,
                ..
            }
        ));
        assert_eq!(store.last_values()[0], 1.0);
    }

    #[test]
    fn test_reopen_keeps_state_and_length() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("memory.usage.rrd");
        RoundRobinStore::create(&path, memory_schema(), 1000).unwrap();
        let len = std::fs::metadata(&path).unwrap().len();

        {
            let mut store = RoundRobinStore::open(&path).unwrap();
            store.update(1005, &[3.0; 5]).unwrap();
        }

        // A restarted agent sees the previous run's state through a new map
        let mut store = RoundRobinStore::open(&path).unwrap();
        assert_eq!(store.last_update(), 1005);
        assert_eq!(store.last_values(), vec![3.0; 5]);
        assert!(store.update(1005, &[4.0; 5]).is_err());
        store.update(1010, &[4.0; 5]).unwrap();
        drop(store);

        assert_eq!(std::fs::metadata(&path).unwrap().len(), len);
    }

    #[test]
    fn test_minute_consolidation() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("memory.usage.rrd");
        // 1200 is a minute boundary
        RoundRobinStore::create(&path, memory_schema(), 1200).unwrap();
        let mut store = RoundRobinStore::open(&path).unwrap();

        for i in 1..=12 {
            store.update(1200 + 5 * i, &[i as f64; 5]).unwrap();
        }

        assert_eq!(last_row(&store, 1)[0], 1.0);
        assert_eq!(last_row(&store, 3)[0], 12.0);
        assert_eq!(last_row(&store, 5)[0], 6.5);
    }

    #[test]
    fn test_long_gap_keeps_store_consistent() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("memory.usage.rrd");
        RoundRobinStore::create(&path, memory_schema(), 1200).unwrap();
        let mut store = RoundRobinStore::open(&path).unwrap();

        store.update(1205, &[1.0; 5]).unwrap();
        store.update(1205 + 86_400, &[2.0; 5]).unwrap();
        store.update(1210 + 86_400, &[3.0; 5]).unwrap();

        assert_eq!(last_row(&store, 0)[0], 3.0);
        assert_eq!(store.archive_rows(0).len(), 1440);
    }

    #[test]
    fn test_open_rejects_foreign_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bogus.rrd");
        std::fs::write(&path, b"not a store").unwrap();

        assert!(matches!(
            RoundRobinStore::open(&path),
            Err(StoreError::Format { .. })
        ));
    }
}
