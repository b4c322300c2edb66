//! Core data models for the metrics agent

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One usage snapshot: counter name -> value
pub type Sample = HashMap<String, u64>;

/// Metric families the agent knows how to extract and persist
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MetricFamily {
    #[serde(rename = "cpu.usage")]
    Cpu,
    #[serde(rename = "memory.usage")]
    Memory,
    #[serde(rename = "blkio.usage")]
    Blkio,
    #[serde(rename = "network.usage")]
    Network,
}

impl MetricFamily {
    pub const ALL: [MetricFamily; 4] = [
        MetricFamily::Cpu,
        MetricFamily::Memory,
        MetricFamily::Blkio,
        MetricFamily::Network,
    ];

    /// Family name as used for store file names and configuration
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricFamily::Cpu => "cpu.usage",
            MetricFamily::Memory => "memory.usage",
            MetricFamily::Blkio => "blkio.usage",
            MetricFamily::Network => "network.usage",
        }
    }

    /// Look a family up by name
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.as_str() == name.trim())
    }

    /// File name of the round-robin store for this family
    pub fn store_file_name(&self) -> String {
        format!("{}.rrd", self.as_str())
    }
}

impl fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Task metadata reported by the container runtime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InspectResult {
    /// Task ARN (or bare task id); empty when unknown
    pub task_arn: String,
    /// Container name within the task; empty when unknown
    pub container_name: String,
}

impl InspectResult {
    /// Task id: final `/`-separated segment of the ARN
    ///
    /// `None` unless the segment is usable as a directory name.
    pub fn task_id(&self) -> Option<&str> {
        let id = self.task_arn.rsplit('/').next().unwrap_or_default().trim();
        is_path_segment(id).then_some(id)
    }

    /// Label for the task's link to this container, `/` mapped to `_`
    ///
    /// `None` when the name is empty or a relative path component.
    pub fn link_label(&self) -> Option<String> {
        let label = self.container_name.trim().replace('/', "_");
        is_path_segment(&label).then_some(label)
    }

    /// True when the runtime reported nothing useful
    pub fn is_empty(&self) -> bool {
        self.task_arn.is_empty() && self.container_name.is_empty()
    }

    /// Marker file representation, `<task_arn>||<container_name>`
    pub fn to_marker(&self) -> String {
        format!("{}||{}", self.task_arn, self.container_name)
    }
}

/// A non-empty single path component other than `.` and `..`
fn is_path_segment(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".."
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_family_names() {
        for family in MetricFamily::ALL {
            assert_eq!(MetricFamily::from_name(family.as_str()), Some(family));
        }
        assert_eq!(MetricFamily::from_name("disk.usage"), None);
        assert_eq!(MetricFamily::Cpu.store_file_name(), "cpu.usage.rrd");
    }

    #[test]
    fn test_task_id_from_arn() {
        let result = InspectResult {
            task_arn: "arn:aws:ecs:us-east-1:960714566901:task/c15f4e79-6eb9-4051-9951-018916920a9a"
                .to_string(),
            container_name: "bamboo-agent".to_string(),
        };
        assert_eq!(
            result.task_id(),
            Some("c15f4e79-6eb9-4051-9951-018916920a9a")
        );

        let bare = InspectResult {
            task_arn: "abc".to_string(),
            container_name: String::new(),
        };
        assert_eq!(bare.task_id(), Some("abc"));

        assert_eq!(InspectResult::default().task_id(), None);
        assert!(InspectResult::default().is_empty());
    }

    #[test]
    fn test_relative_components_are_not_usable() {
        let result = |task_arn: &str, container_name: &str| InspectResult {
            task_arn: task_arn.to_string(),
            container_name: container_name.to_string(),
        };

        assert_eq!(result("arn:aws:ecs:us-east-1:1:task/..", "").task_id(), None);
        assert_eq!(result("arn:aws:ecs:us-east-1:1:task/.", "").task_id(), None);
        assert_eq!(result("", "..").link_label(), None);
        assert_eq!(result("", ".").link_label(), None);
        assert_eq!(result("", "").link_label(), None);
        assert_eq!(
            result("", "team/builder").link_label().as_deref(),
            Some("team_builder")
        );
        assert_eq!(result("", "../x").link_label().as_deref(), Some(".._x"));
    }
}
