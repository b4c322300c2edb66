//! Container lifecycle tracking
//!
//! All state lives on disk under the data directory so that other
//! processes (and the next agent run) can see it:
//!
//! ```text
//! containers/<id>/{arn, start.txt, end.txt, stop, task_symlink, *.rrd}
//! tasks/<task-id>/<container-name> -> containers/<id>
//! ```
//!
//! Every operation is an idempotent upsert: check, create if absent, and
//! treat `AlreadyExists` from a concurrent writer as success.

mod cleanup;
mod inspect;


pub use cleanup::{cleanup, CleanupReport, DEFAULT_EXPIRATION};
pub use inspect::{
    parse_inspect_output, DockerCliInspector, RuntimeInspector, CONTAINER_NAME_LABEL,
    TASK_ARN_LABEL,
};

use crate::collector::MetricsCollector;
use crate::error::LifecycleError;
use crate::models::{InspectResult, MetricFamily};
use crate::store::{self, DispatchOutcome};
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

pub const ARN_FILE: &str = "arn";
pub const START_FILE: &str = "start.txt";
pub const END_FILE: &str = "end.txt";
pub const STOP_FILE: &str = "stop";
pub const TASK_LINK: &str = "task_symlink";

/// Sticky bit plus rwx for everyone: other processes write into these
/// directories, but may not remove each other's entries
const CONTAINER_DIR_MODE: u32 = 0o1777;

/// Paths of the persisted layout
#[derive(Debug, Clone)]
pub struct DataLayout {
    data_dir: PathBuf,
}

impl DataLayout {
    /// Relative paths are anchored at the current directory, since symlink
    /// targets under the layout must resolve from any directory
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            data_dir: std::path::absolute(&data_dir).unwrap_or(data_dir),
        }
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn containers_dir(&self) -> PathBuf {
        self.data_dir.join("containers")
    }

    pub fn tasks_dir(&self) -> PathBuf {
        self.data_dir.join("tasks")
    }

    pub fn container_dir(&self, container_id: &str) -> PathBuf {
        self.containers_dir().join(container_id)
    }

    pub fn task_dir(&self, task_id: &str) -> PathBuf {
        self.tasks_dir().join(task_id)
    }

    /// Create the `containers` and `tasks` roots
    pub async fn ensure_root(&self) -> Result<(), LifecycleError> {
        for dir in [self.containers_dir(), self.tasks_dir()] {
            fs::create_dir_all(&dir)
                .await
                .map_err(|e| LifecycleError::io(&dir, e))?;
        }
        Ok(())
    }

    /// Ids of every container with a directory on disk
    pub async fn tracked_containers(&self) -> Result<Vec<String>, LifecycleError> {
        let dir = self.containers_dir();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(LifecycleError::io(&dir, e)),
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LifecycleError::io(&dir, e))?
        {
            if entry.path().is_dir() {
                ids.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        ids.sort();
        Ok(ids)
    }
}

/// Lifecycle state derived from the markers on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerState {
    /// Directory exists, task not looked up yet
    Discovered,
    /// Task lookup done, nothing sampled yet
    TaskResolved,
    /// At least one store has been written
    Active,
    /// No longer in the live container listing
    Terminated,
}

/// Container state read back from its directory
#[derive(Debug, Clone)]
pub struct ContainerRecord {
    pub container_id: String,
    pub dir: PathBuf,
    pub created_at: Option<i64>,
    pub last_seen: Option<i64>,
    pub inspect: Option<InspectResult>,
    pub task_id: Option<String>,
    pub stopped: bool,
    pub has_samples: bool,
}

impl ContainerRecord {
    pub async fn load(dir: &Path) -> Result<Self, LifecycleError> {
        let container_id = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let inspect = read_marker(&dir.join(ARN_FILE))
            .await?
            .map(|content| parse_inspect_output(&content));
        let task_id = task_of(dir).await;

        let mut has_samples = false;
        let mut entries = fs::read_dir(dir)
            .await
            .map_err(|e| LifecycleError::io(dir, e))?;
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| LifecycleError::io(dir, e))?
        {
            if entry.file_name().to_string_lossy().ends_with(".rrd") {
                has_samples = true;
            }
        }

        Ok(Self {
            container_id,
            dir: dir.to_path_buf(),
            created_at: read_timestamp(&dir.join(START_FILE)).await?,
            last_seen: read_timestamp(&dir.join(END_FILE)).await?,
            inspect,
            task_id,
            stopped: fs::try_exists(dir.join(STOP_FILE)).await.unwrap_or(false),
            has_samples,
        })
    }

    pub fn state(&self, live: bool) -> ContainerState {
        if !live {
            ContainerState::Terminated
        } else if self.inspect.is_none() {
            ContainerState::Discovered
        } else if self.has_samples {
            ContainerState::Active
        } else {
            ContainerState::TaskResolved
        }
    }
}

/// What one unit of work did for a container
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnitOutcome {
    /// Task lookup performed; `None` when the runtime did not know the task
    Resolved { task_id: Option<String> },
    /// Stores written for this many families
    Sampled { families: usize },
    /// Stop marker present, sampling suppressed
    Stopped,
}

/// Drives one container through its lifecycle each collection cycle
pub struct ContainerTracker {
    layout: DataLayout,
    collector: Arc<dyn MetricsCollector>,
    inspector: Arc<dyn RuntimeInspector>,
    families: Vec<MetricFamily>,
}

impl ContainerTracker {
    pub fn new(
        layout: DataLayout,
        collector: Arc<dyn MetricsCollector>,
        inspector: Arc<dyn RuntimeInspector>,
        families: Vec<MetricFamily>,
    ) -> Self {
        Self {
            layout,
            collector,
            inspector,
            families,
        }
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    pub fn collector(&self) -> &Arc<dyn MetricsCollector> {
        &self.collector
    }

    /// Run one cycle of lifecycle work for a live container
    pub async fn observe(&self, container_id: &str) -> Result<UnitOutcome, LifecycleError> {
        let dir = self.layout.container_dir(container_id);
        self.discover(container_id, &dir).await?;

        let outcome = if !exists(&dir.join(ARN_FILE)).await {
            self.resolve(container_id, &dir).await?
        } else if exists(&dir.join(STOP_FILE)).await {
            debug!(container_id = %container_id, "Stop marker present, not sampling");
            return Ok(UnitOutcome::Stopped);
        } else {
            self.sample(container_id, &dir).await?
        };

        touch_end(&dir).await?;
        Ok(outcome)
    }

    /// Create the container directory and record its creation time
    async fn discover(&self, container_id: &str, dir: &Path) -> Result<(), LifecycleError> {
        match fs::create_dir(dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => return Err(LifecycleError::io(dir, e)),
        }

        let start = dir.join(START_FILE);
        if exists(&start).await {
            return Ok(());
        }

        fs::set_permissions(dir, std::fs::Permissions::from_mode(CONTAINER_DIR_MODE))
            .await
            .map_err(|e| LifecycleError::io(dir, e))?;
        let now = chrono::Utc::now().timestamp();
        write_new(&start, &now.to_string()).await?;

        info!(container_id = %container_id, "Discovered container");
        Ok(())
    }

    /// Ask the runtime which task owns the container and link the two
    async fn resolve(&self, container_id: &str, dir: &Path) -> Result<UnitOutcome, LifecycleError> {
        let result = match self.inspector.inspect(container_id).await {
            Ok(result) => result,
            Err(e) => {
                // Recorded as unknown; end.txt lets cleanup expire the directory
                write_new(&dir.join(ARN_FILE), &InspectResult::default().to_marker()).await?;
                touch_end(dir).await?;
                return Err(LifecycleError::Inspect {
                    container_id: container_id.to_string(),
                    reason: format!("{:#}", e),
                });
            }
        };

        // Written even when empty so the lookup is not repeated every cycle
        write_new(&dir.join(ARN_FILE), &result.to_marker()).await?;

        let Some(task_id) = result.task_id() else {
            info!(container_id = %container_id, "Runtime reported no task for container");
            return Ok(UnitOutcome::Resolved { task_id: None });
        };

        let label = result
            .link_label()
            .unwrap_or_else(|| container_id.to_string());
        self.link(dir, task_id, &label).await?;

        info!(
            container_id = %container_id,
            task_id = %task_id,
            container_name = %label,
            "Resolved container task"
        );
        Ok(UnitOutcome::Resolved {
            task_id: Some(task_id.to_string()),
        })
    }

    /// Link task -> container (by label) and container -> task
    async fn link(&self, dir: &Path, task_id: &str, label: &str) -> Result<(), LifecycleError> {
        let task_dir = self.layout.task_dir(task_id);
        fs::create_dir_all(&task_dir)
            .await
            .map_err(|e| LifecycleError::io(&task_dir, e))?;

        symlink_new(dir, &task_dir.join(label)).await?;
        symlink_new(&task_dir, &dir.join(TASK_LINK)).await
    }

    /// Extract and persist every configured family
    async fn sample(&self, container_id: &str, dir: &Path) -> Result<UnitOutcome, LifecycleError> {
        let mut written = 0;

        for family in &self.families {
            let sample = self.collector.collect(container_id, *family).await?;

            let store_dir = dir.to_path_buf();
            let family_name = family.as_str();
            let outcome = tokio::task::spawn_blocking(move || {
                store::dispatch(&store_dir, family_name, &sample)
            })
            .await
            .unwrap_or_else(|e| {
                warn!(container_id = %container_id, family = %family_name, error = %e, "Store task panicked");
                DispatchOutcome::Failed
            });

            if outcome == DispatchOutcome::Written {
                written += 1;
            }
        }

        Ok(UnitOutcome::Sampled { families: written })
    }
}

/// Record the current time as the container's last-seen heartbeat
async fn touch_end(dir: &Path) -> Result<(), LifecycleError> {
    let end = dir.join(END_FILE);
    fs::write(&end, chrono::Utc::now().timestamp().to_string())
        .await
        .map_err(|e| LifecycleError::io(&end, e))
}

async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

/// Write a file unless it already exists
async fn write_new(path: &Path, content: &str) -> Result<(), LifecycleError> {
    use tokio::io::AsyncWriteExt;

    let mut file = match fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
    {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(()),
        Err(e) => return Err(LifecycleError::io(path, e)),
    };

    file.write_all(content.as_bytes())
        .await
        .map_err(|e| LifecycleError::io(path, e))?;
    file.flush().await.map_err(|e| LifecycleError::io(path, e))
}

/// Create a symlink at `link` pointing to `target` unless one exists
async fn symlink_new(target: &Path, link: &Path) -> Result<(), LifecycleError> {
    match fs::symlink(target, link).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(LifecycleError::io(link, e)),
    }
}

async fn read_marker(path: &Path) -> Result<Option<String>, LifecycleError> {
    match fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(LifecycleError::io(path, e)),
    }
}

async fn read_timestamp(path: &Path) -> Result<Option<i64>, LifecycleError> {
    Ok(read_marker(path)
        .await?
        .and_then(|content| content.trim().parse().ok()))
}

/// Task id a container directory links to, from the link target's last segment
pub(crate) async fn task_of(container_dir: &Path) -> Option<String> {
    let target = fs::read_link(container_dir.join(TASK_LINK)).await.ok()?;
    target
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
}
