//! Expired container garbage collection
//!
//! A container's `end.txt` is refreshed on every cycle while it is live and
//! not stopped, so its modification time is the last time it was seen.

use super::{task_of, DataLayout, END_FILE};
use crate::error::LifecycleError;
use std::collections::HashSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::{debug, info};

/// Containers unseen for longer than this are removed
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(60 * 60);

/// What a cleanup pass removed
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupReport {
    pub containers_removed: usize,
    pub tasks_removed: usize,
    /// Tasks kept because another container under them is still tracked
    pub tasks_kept: usize,
}

/// Remove containers whose end marker is older than `expiration` at `now`
///
/// Removal is best-effort; whatever fails is retried on the next pass.
pub async fn cleanup(
    layout: &DataLayout,
    expiration: Duration,
    now: SystemTime,
) -> Result<CleanupReport, LifecycleError> {
    let containers_dir = layout.containers_dir();
    let mut entries = match fs::read_dir(&containers_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(CleanupReport::default()),
        Err(e) => return Err(LifecycleError::io(&containers_dir, e)),
    };

    let mut expired = HashSet::new();
    let mut tasks = HashSet::new();

    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(|e| LifecycleError::io(&containers_dir, e))?
    {
        let dir = entry.path();
        if !is_expired(&dir, expiration, now).await {
            continue;
        }
        if let Some(task_id) = task_of(&dir).await {
            tasks.insert(layout.task_dir(&task_id));
        }
        expired.insert(dir);
    }

    let mut report = CleanupReport::default();

    for task_dir in &tasks {
        if has_surviving_container(task_dir, &expired).await {
            debug!(task_dir = %task_dir.display(), "Task still has live containers, keeping");
            report.tasks_kept += 1;
            continue;
        }
        if fs::remove_dir_all(task_dir).await.is_ok() {
            report.tasks_removed += 1;
        }
    }

    for dir in &expired {
        match fs::remove_dir_all(dir).await {
            Ok(()) => {
                report.containers_removed += 1;
                info!(container_dir = %dir.display(), "Removed expired container");
            }
            Err(e) => {
                debug!(container_dir = %dir.display(), error = %e, "Failed to remove container, will retry");
            }
        }
    }

    Ok(report)
}

async fn is_expired(dir: &Path, expiration: Duration, now: SystemTime) -> bool {
    let Ok(metadata) = fs::metadata(dir.join(END_FILE)).await else {
        return false;
    };
    let Ok(modified) = metadata.modified() else {
        return false;
    };

    now.duration_since(modified)
        .map(|age| age > expiration)
        .unwrap_or(false)
}

/// True if any link under the task points at a container directory that is
/// not being removed in this pass
async fn has_surviving_container(task_dir: &Path, expired: &HashSet<PathBuf>) -> bool {
    let Ok(mut entries) = fs::read_dir(task_dir).await else {
        return false;
    };

    while let Ok(Some(entry)) = entries.next_entry().await {
        let Ok(target) = fs::read_link(entry.path()).await else {
            continue;
        };
        if expired.contains(&target) {
            continue;
        }
        if fs::metadata(&target).await.is_ok() {
            return true;
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::TASK_LINK;
    use tempfile::TempDir;

    async fn container_with_end(layout: &DataLayout, id: &str) -> PathBuf {
        let dir = layout.container_dir(id);
        fs::create_dir_all(&dir).await.unwrap();
        fs::write(dir.join(END_FILE), "0").await.unwrap();
        dir
    }

    #[tokio::test]
    async fn test_cleanup_missing_data_dir() {
        let temp_dir = TempDir::new().unwrap();
        let layout = DataLayout::new(temp_dir.path().join("nothing"));

        let report = cleanup(&layout, DEFAULT_EXPIRATION, SystemTime::now())
            .await
            .unwrap();
        assert_eq!(report, CleanupReport::default());
    }

    #[tokio::test]
    async fn test_container_without_end_marker_is_kept() {
        let temp_dir = TempDir::new().unwrap();
        let layout = DataLayout::new(temp_dir.path());
        let dir = layout.container_dir("fresh");
        fs::create_dir_all(&dir).await.unwrap();

        let later = SystemTime::now() + Duration::from_secs(10 * 3600);
        let report = cleanup(&layout, DEFAULT_EXPIRATION, later).await.unwrap();

        assert_eq!(report.containers_removed, 0);
        assert!(dir.exists());
    }

    #[tokio::test]
    async fn test_expiration_window() {
        let temp_dir = TempDir::new().unwrap();
        let layout = DataLayout::new(temp_dir.path());
        let dir = container_with_end(&layout, "abc").await;

        let soon = SystemTime::now() + Duration::from_secs(30 * 60);
        let report = cleanup(&layout, DEFAULT_EXPIRATION, soon).await.unwrap();
        assert_eq!(report.containers_removed, 0);
        assert!(dir.exists());

        let later = SystemTime::now() + Duration::from_secs(2 * 3600);
        let report = cleanup(&layout, DEFAULT_EXPIRATION, later).await.unwrap();
        assert_eq!(report.containers_removed, 1);
        assert!(!dir.exists());
    }

    #[tokio::test]
    async fn test_task_kept_while_sibling_survives() {
        let temp_dir = TempDir::new().unwrap();
        let layout = DataLayout::new(temp_dir.path());
        let task_dir = layout.task_dir("task-1");
        fs::create_dir_all(&task_dir).await.unwrap();

        let old = container_with_end(&layout, "old").await;
        let young = layout.container_dir("young");
        fs::create_dir_all(&young).await.unwrap();

        for (dir, label) in [(&old, "build"), (&young, "sidecar")] {
            fs::symlink(dir, task_dir.join(label)).await.unwrap();
            fs::symlink(&task_dir, dir.join(TASK_LINK))
                .await
                .unwrap();
        }

        let later = SystemTime::now() + Duration::from_secs(2 * 3600);
        let report = cleanup(&layout, DEFAULT_EXPIRATION, later).await.unwrap();

        // "young" has no end marker yet, so it survives and keeps the task
        assert_eq!(report.containers_removed, 1);
        assert_eq!(report.tasks_removed, 0);
        assert_eq!(report.tasks_kept, 1);
        assert!(task_dir.exists());
        assert!(young.exists());
    }
}
