//! Exec tool — shell command execution with timeout and supervision.

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{ToolError, ToolResult};
use crate::process::runner::DEFAULT_TIMEOUT_SECS;
use crate::process::{ExecOutput, ExecRequest, ProcessRunner};

use super::{ToolArguments, ToolDefinition};

pub const EXEC: &str = "exec";

#[derive(Debug, Deserialize)]
pub struct ExecParams {
    /// The shell command to execute.
    pub command: String,
    /// Timeout in seconds (default: 300).
    #[serde(default)]
    pub timeout: Option<i64>,
    /// Working directory (default: the workspace).
    #[serde(default)]
    pub work_dir: Option<String>,
}

pub fn tool_definition() -> ToolDefinition {
    ToolDefinition {
        name: EXEC.to_owned(),
        description: "Execute a shell command in a specified or current working directory".to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "command": {
                    "type": "string",
                    "description": "The shell command to execute"
                },
                "timeout": {
                    "type": "integer",
                    "description": "Timeout in seconds (default: 300, i.e., 5 minutes)",
                    "minimum": 1
                },
                "work_dir": {
                    "type": "string",
                    "description": "Working directory for command execution (default: current working directory)"
                }
            },
            "required": ["command"]
        }),
    }
}

impl ExecParams {
    fn into_request(self, workspace: &Path) -> ToolResult<ExecRequest> {
        let timeout = match self.timeout {
            None => DEFAULT_TIMEOUT_SECS,
            Some(secs) => u64::try_from(secs)
                .ok()
                .filter(|&secs| secs > 0)
                .ok_or_else(|| {
                    ToolError::invalid_arguments(format!(
                        "timeout must be a positive number of seconds, got {secs}"
                    ))
                })?,
        };
        let work_dir = match self.work_dir.as_deref() {
            Some(dir) => super::resolve_path(workspace, dir)?,
            None => workspace.to_path_buf(),
        };
        Ok(ExecRequest::new(self.command)
            .with_work_dir(work_dir)
            .with_timeout(Duration::from_secs(timeout)))
    }
}

/// Execute the exec tool.
pub async fn execute(
    workspace: &Path,
    runner: &ProcessRunner,
    arguments: &ToolArguments,
) -> ToolResult<ExecOutput> {
    let params: ExecParams = arguments.parse()?;
    let request = params.into_request(workspace)?;
    runner.run(&request).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn params(value: serde_json::Value) -> ExecParams {
        ToolArguments::from_value(value).parse().expect("parse")
    }

    #[test]
    fn test_defaults() {
        let req = params(json!({"command": "ls"}))
            .into_request(Path::new("/ws"))
            .expect("request");
        assert_eq!(req.timeout, Duration::from_secs(300));
        assert_eq!(req.work_dir.as_deref(), Some(Path::new("/ws")));
    }

    #[test]
    fn test_relative_work_dir_resolves_against_workspace() {
        let req = params(json!({"command": "ls", "work_dir": "sub", "timeout": 5}))
            .into_request(Path::new("/ws"))
            .expect("request");
        assert_eq!(req.work_dir.as_deref(), Some(Path::new("/ws/sub")));
        assert_eq!(req.timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_non_positive_timeout_is_rejected() {
        for timeout in [0, -3] {
            let err = params(json!({"command": "ls", "timeout": timeout}))
                .into_request(Path::new("/ws"))
                .expect_err("must reject");
            assert!(matches!(err, ToolError::InvalidArguments { .. }));
        }
    }

    #[test]
    fn test_missing_command_is_invalid() {
        let err = ToolArguments::from_value(json!({"timeout": 5}))
            .parse::<ExecParams>()
            .expect_err("must reject");
        assert!(err.to_string().contains("command"));
    }
}
