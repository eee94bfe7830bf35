//! Edit tool — full rewrite, find-and-replace, or append.
//!
//! Which mode runs depends on the arguments present, in priority order:
//!
//! 1. `content`: the file is replaced wholesale.
//! 2. `old_string` (legacy `old_text`): every occurrence is replaced with
//!    `new_string` (legacy `new_text`, default empty). `"*"` matches the whole
//!    file. When nothing matches and the replacement is non-empty, it is
//!    appended on a new line instead.
//! 3. `new_string` alone: appended on a new line.
//!
//! A file that does not exist reads as empty.

use std::io::ErrorKind;
use std::path::Path;

use serde::Deserialize;
use tracing::debug;

use crate::error::{ToolError, ToolResult};
use crate::util::atomic::atomic_write;

use super::write::FileWriteResult;
use super::{ToolArguments, ToolDefinition};

pub const EDIT_FILE: &str = "edit_file";

/// Matches the entire file regardless of its content.
const WHOLE_FILE: &str = "*";

/// Parameters for the edit tool.
#[derive(Debug, Default, Deserialize)]
pub struct EditParams {
    pub filename: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub old_string: Option<String>,
    #[serde(default)]
    pub new_string: Option<String>,
    #[serde(default)]
    pub old_text: Option<String>,
    #[serde(default)]
    pub new_text: Option<String>,
}

/// Resolved edit operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditMode {
    Write(String),
    Replace { old: String, new: String },
    Append(String),
}

impl EditParams {
    fn into_mode(self) -> ToolResult<EditMode> {
        let new = self.new_string.or(self.new_text);
        if let Some(content) = self.content {
            return Ok(EditMode::Write(content));
        }
        if let Some(old) = self.old_string.or(self.old_text) {
            if old.is_empty() {
                return Err(ToolError::invalid_arguments(
                    "old_string must not be empty; use \"*\" to replace the whole file",
                ));
            }
            return Ok(EditMode::Replace {
                old,
                new: new.unwrap_or_default(),
            });
        }
        new.map(EditMode::Append).ok_or_else(|| {
            ToolError::invalid_arguments(
                "must provide either 'content' (for full write), 'old_string' (for \
                 replacement/removal), or 'new_string' (for append)",
            )
        })
    }
}

/// Return the MCP tool definition for `edit_file`.
pub fn tool_definition() -> ToolDefinition {
    ToolDefinition {
        name: EDIT_FILE.to_owned(),
        description: "Edit a file: write full content, replace every occurrence of old_string with \
            new_string (\"*\" replaces the whole file), or append new_string. \
            Missing files and directories are created."
            .to_owned(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "filename": {
                    "type": "string",
                    "description": "Path to the file to edit"
                },
                "content": {
                    "type": "string",
                    "description": "Full content to write (replaces the file)"
                },
                "old_string": {
                    "type": "string",
                    "description": "Text to replace; \"*\" matches the whole file"
                },
                "new_string": {
                    "type": "string",
                    "description": "Replacement text, or text to append when old_string is omitted"
                },
                "old_text": {
                    "type": "string",
                    "description": "Legacy name for old_string"
                },
                "new_text": {
                    "type": "string",
                    "description": "Legacy name for new_string"
                }
            },
            "required": ["filename"]
        }),
    }
}

/// Compute the new file content for `mode` applied to `current`.
pub fn apply_edit(current: &str, mode: &EditMode) -> String {
    match mode {
        EditMode::Write(content) => content.clone(),
        EditMode::Replace { old, new } if old == WHOLE_FILE => new.clone(),
        EditMode::Replace { old, new } if current.contains(old.as_str()) => {
            current.replace(old.as_str(), new)
        }
        EditMode::Replace { new, .. } if !new.is_empty() => append_line(current, new),
        EditMode::Replace { .. } => current.to_owned(),
        EditMode::Append(new) => append_line(current, new),
    }
}

fn append_line(current: &str, addition: &str) -> String {
    let mut out = String::with_capacity(current.len() + addition.len() + 1);
    out.push_str(current);
    if !current.is_empty() && !current.ends_with('\n') {
        out.push('\n');
    }
    out.push_str(addition);
    out
}

/// Execute the edit tool.
///
/// # Errors
///
/// Returns an error if no edit mode is selected or the file cannot be read
/// or written.
pub async fn execute(workspace: &Path, arguments: &ToolArguments) -> ToolResult<FileWriteResult> {
    let params: EditParams = arguments.parse()?;
    let filename = params.filename.clone();
    let path = super::resolve_path(workspace, &filename)?;
    let mode = params.into_mode()?;

    let current = match &mode {
        EditMode::Write(_) => String::new(),
        _ => match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(ToolError::io("Failed to read file", &path, e)),
        },
    };
    let updated = apply_edit(&current, &mode);

    let target = path.clone();
    let bytes_written = super::blocking(move || atomic_write(&target, updated.as_bytes())).await?;
    debug!(path = %path.display(), bytes_written, "edit_file completed");

    Ok(FileWriteResult::success(
        format!("File {filename} updated successfully. Bytes written: {bytes_written}"),
        bytes_written,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn replace(old: &str, new: &str) -> EditMode {
        EditMode::Replace {
            old: old.to_owned(),
            new: new.to_owned(),
        }
    }

    #[test]
    fn test_replaces_every_occurrence() {
        assert_eq!(
            apply_edit("foo bar foo\n", &replace("foo", "baz")),
            "baz bar baz\n"
        );
    }

    #[test]
    fn test_star_replaces_whole_file() {
        assert_eq!(apply_edit("anything\n", &replace("*", "fresh")), "fresh");
    }

    #[test]
    fn test_missing_old_appends_on_new_line() {
        assert_eq!(apply_edit("line one", &replace("nope", "tail")), "line one\ntail");
        assert_eq!(apply_edit("line one\n", &replace("nope", "tail")), "line one\ntail");
        assert_eq!(apply_edit("", &replace("nope", "tail")), "tail");
    }

    #[test]
    fn test_missing_old_with_empty_new_is_noop() {
        assert_eq!(apply_edit("keep", &replace("nope", "")), "keep");
    }

    #[test]
    fn test_removal_with_empty_new() {
        assert_eq!(apply_edit("a-b-c", &replace("-", "")), "abc");
    }

    #[test]
    fn test_mode_priority() {
        let params = EditParams {
            content: Some("full".to_owned()),
            old_string: Some("x".to_owned()),
            ..EditParams::default()
        };
        assert_eq!(params.into_mode().expect("mode"), EditMode::Write("full".to_owned()));

        let legacy = EditParams {
            old_text: Some("a".to_owned()),
            new_text: Some("b".to_owned()),
            ..EditParams::default()
        };
        assert_eq!(legacy.into_mode().expect("mode"), replace("a", "b"));

        let append = EditParams {
            new_string: Some("more".to_owned()),
            ..EditParams::default()
        };
        assert_eq!(append.into_mode().expect("mode"), EditMode::Append("more".to_owned()));

        assert!(EditParams::default().into_mode().is_err());
    }

    #[tokio::test]
    async fn test_edit_missing_file_creates_it() {
        let dir = tempfile::tempdir().expect("tempdir");
        let args = ToolArguments::from_value(json!({
            "filename": "new/notes.txt",
            "new_string": "first"
        }));
        let result = execute(dir.path(), &args).await.expect("edit");
        assert_eq!(result.bytes_written, 5);
        let text = std::fs::read_to_string(dir.path().join("new/notes.txt")).expect("read");
        assert_eq!(text, "first");
    }

    #[tokio::test]
    async fn test_edit_in_place() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cfg.ini");
        std::fs::write(&path, "mode=old\nlevel=old\n").expect("seed");
        let args = ToolArguments::from_value(json!({
            "filename": path.to_string_lossy(),
            "old_string": "old",
            "new_string": "new"
        }));
        let result = execute(dir.path(), &args).await.expect("edit");
        assert_eq!(result.status, "success");
        assert_eq!(
            std::fs::read_to_string(&path).expect("read"),
            "mode=new\nlevel=new\n"
        );
    }
}
