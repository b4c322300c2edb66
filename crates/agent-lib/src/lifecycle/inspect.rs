//! Container runtime metadata lookup
//!
//! The tracker only needs the owning task and the container's name within
//! it. The Docker adapter reads both from the labels the ECS agent puts on
//! every task container.

use crate::models::InspectResult;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

/// Label holding the owning task ARN
pub const TASK_ARN_LABEL: &str = "com.amazonaws.ecs.task-arn";

/// Label holding the container name within the task
pub const CONTAINER_NAME_LABEL: &str = "com.amazonaws.ecs.container-name";

/// What `docker inspect --format` prints for a missing map key
const NO_VALUE: &str = "<no value>";

/// Source of task metadata for a container
#[async_trait]
pub trait RuntimeInspector: Send + Sync {
    /// Look up the task owning `container_id`
    ///
    /// Empty fields in the result mean the runtime does not know (yet).
    async fn inspect(&self, container_id: &str) -> Result<InspectResult>;
}

/// Inspector shelling out to the Docker CLI
pub struct DockerCliInspector {
    binary: String,
}

impl DockerCliInspector {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn format_template() -> String {
        format!(
            "{{{{index .Config.Labels \"{}\"}}}}||{{{{index .Config.Labels \"{}\"}}}}",
            TASK_ARN_LABEL, CONTAINER_NAME_LABEL
        )
    }
}

impl Default for DockerCliInspector {
    fn default() -> Self {
        Self::new("docker")
    }
}

#[async_trait]
impl RuntimeInspector for DockerCliInspector {
    async fn inspect(&self, container_id: &str) -> Result<InspectResult> {
        let output = Command::new(&self.binary)
            .arg("inspect")
            .arg("--format")
            .arg(Self::format_template())
            .arg(container_id)
            .output()
            .await
            .with_context(|| format!("Failed to run {} inspect", self.binary))?;

        if !output.status.success() {
            bail!(
                "{} inspect exited with {}: {}",
                self.binary,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        debug!(container_id = %container_id, output = %stdout.trim(), "Inspected container");
        Ok(parse_inspect_output(&stdout))
    }
}

/// Parse `<task-arn>||<container-name>`
pub fn parse_inspect_output(output: &str) -> InspectResult {
    let clean = |s: &str| {
        let s = s.trim();
        if s == NO_VALUE {
            String::new()
        } else {
            s.to_string()
        }
    };

    match output.trim().split_once("||") {
        Some((task_arn, container_name)) => InspectResult {
            task_arn: clean(task_arn),
            container_name: clean(container_name),
        },
        None => InspectResult {
            task_arn: clean(output),
            container_name: String::new(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_inspect_output() {
        let result = parse_inspect_output(
            "arn:aws:ecs:us-east-1:960714566901:task/c15f4e79||bamboo-agent\n",
        );
        assert_eq!(result.task_arn, "arn:aws:ecs:us-east-1:960714566901:task/c15f4e79");
        assert_eq!(result.container_name, "bamboo-agent");
    }

    #[test]
    fn test_parse_inspect_output_missing_labels() {
        assert!(parse_inspect_output("||\n").is_empty());
        assert!(parse_inspect_output("<no value>||<no value>\n").is_empty());
        assert!(parse_inspect_output("").is_empty());
    }

    #[test]
    fn test_format_template() {
        assert_eq!(
            DockerCliInspector::format_template(),
            "{{index .Config.Labels \"com.amazonaws.ecs.task-arn\"}}||{{index .Config.Labels \"com.amazonaws.ecs.container-name\"}}"
        );
    }

    #[tokio::test]
    async fn test_docker_inspector_missing_binary() {
        let inspector = DockerCliInspector::new("/nonexistent/docker");
        assert!(inspector.inspect("abc").await.is_err());
    }
}
