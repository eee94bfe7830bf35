//! Write tool — file creation and overwrite with directory auto-creation.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ToolResult;
use crate::util::atomic::atomic_write;

use super::{ToolArguments, ToolDefinition};

pub const WRITE_FILE: &str = "write_file";

#[derive(Debug, Deserialize)]
pub struct WriteParams {
    /// Path to the file to write.
    pub filename: String,
    /// Content to write.
    pub content: String,
}

/// Result of `write_file` and `edit_file`.
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct FileWriteResult {
    pub status: &'static str,
    pub message: String,
    pub bytes_written: u64,
}

impl FileWriteResult {
    pub(crate) fn success(message: String, bytes_written: u64) -> Self {
        Self {
            status: "success",
            message,
            bytes_written,
        }
    }
}

pub fn tool_definition() -> ToolDefinition {
    ToolDefinition {
        name: WRITE_FILE.to_owned(),
        description: "Write content to a file. Creates the file and parent directories if they don't exist. \
            Overwrites existing content."
            .to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "filename": {
                    "type": "string",
                    "description": "Path to the file to write"
                },
                "content": {
                    "type": "string",
                    "description": "Content to write to the file"
                }
            },
            "required": ["filename", "content"]
        }),
    }
}

pub async fn execute(workspace: &Path, arguments: &ToolArguments) -> ToolResult<FileWriteResult> {
    let params: WriteParams = arguments.parse()?;
    let path = super::resolve_path(workspace, &params.filename)?;

    let target = path.clone();
    let bytes_written =
        super::blocking(move || atomic_write(&target, params.content.as_bytes())).await?;
    debug!(path = %path.display(), bytes_written, "write_file completed");

    Ok(FileWriteResult::success(
        format!(
            "File {} written successfully. Bytes written: {bytes_written}",
            params.filename
        ),
        bytes_written,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_write_creates_file_and_reports_bytes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let args = ToolArguments::from_value(json!({
            "filename": "nested/out.txt",
            "content": "héllo\n"
        }));
        let result = execute(dir.path(), &args).await.expect("write");
        assert_eq!(result.status, "success");
        assert_eq!(result.bytes_written, 7);
        assert!(result.message.contains("nested/out.txt"));
        let on_disk = std::fs::read_to_string(dir.path().join("nested/out.txt")).expect("read");
        assert_eq!(on_disk, "héllo\n");
    }

    #[tokio::test]
    async fn test_missing_content_is_invalid() {
        let dir = tempfile::tempdir().expect("tempdir");
        let args = ToolArguments::from_value(json!({"filename": "x.txt"}));
        let err = execute(dir.path(), &args).await.expect_err("must fail");
        assert_eq!(err.code(), crate::protocol::INVALID_PARAMS);
    }
}
