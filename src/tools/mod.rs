//! Tool router — registers and dispatches MCP tool calls.
//!
//! Each tool takes JSON arguments and returns a JSON result value. The
//! router owns the tool set and provides `list_tools()` / `call_tool()` for
//! the MCP server.

pub mod edit;
pub mod exec;
pub mod list;
pub mod read;
pub mod write;

use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::debug;

use crate::error::{ToolError, ToolResult};
use crate::process::ProcessRunner;

/// MCP tool definition for tools/list.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
}

/// MCP content item in tools/call results.
#[derive(Debug, Serialize)]
pub struct ContentItem {
    #[serde(rename = "type")]
    pub content_type: String,
    pub text: String,
}

/// MCP content-style tools/call result.
#[derive(Debug, Serialize)]
pub struct ToolCallResult {
    pub content: Vec<ContentItem>,
}

impl ToolCallResult {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ContentItem {
                content_type: "text".to_owned(),
                text: text.into(),
            }],
        }
    }
}

/// Tool arguments as received, plus the form echoed back in error data.
#[derive(Debug, Clone)]
pub struct ToolArguments {
    value: Value,
    raw: Option<String>,
}

impl ToolArguments {
    /// Normalize `arguments` from a tools/call request.
    ///
    /// Accepts an object or a JSON-encoded string holding one. A missing
    /// value is treated as an empty object.
    pub fn from_value(arguments: Value) -> Self {
        match arguments {
            Value::Null => Self {
                value: Value::Object(Map::new()),
                raw: None,
            },
            Value::String(text) => match serde_json::from_str::<Value>(&text) {
                Ok(value) => Self {
                    value,
                    raw: Some(text),
                },
                Err(_) => Self {
                    value: Value::String(text.clone()),
                    raw: Some(text),
                },
            },
            value => Self { value, raw: None },
        }
    }

    pub const fn value(&self) -> &Value {
        &self.value
    }

    /// Decode into a tool's parameter struct.
    pub fn parse<T: DeserializeOwned>(&self) -> ToolResult<T> {
        T::deserialize(&self.value).map_err(|e| ToolError::invalid_arguments(e.to_string()))
    }

    /// Diagnostic copy for error responses: the argument object when there
    /// is one, otherwise the raw text under `_raw`.
    pub fn received(&self) -> Value {
        if self.value.is_object() {
            return self.value.clone();
        }
        let raw = self
            .raw
            .clone()
            .unwrap_or_else(|| self.value.to_string());
        json!({ "_raw": raw })
    }
}

/// Resolve a client-supplied path against the workspace.
pub fn resolve_path(workspace: &Path, file_path: &str) -> ToolResult<PathBuf> {
    if file_path.is_empty() {
        return Err(ToolError::invalid_arguments("filename must not be empty"));
    }
    // Paths with NUL bytes cannot reach the OS intact.
    if file_path.contains('\0') {
        return Err(ToolError::invalid_arguments("path contains null byte"));
    }
    let path = Path::new(file_path);
    Ok(if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    })
}

/// Tool router that dispatches MCP tool calls to implementations.
#[derive(Debug, Clone)]
pub struct ToolRouter {
    /// Base directory for relative paths and the default `exec` directory.
    workspace: PathBuf,
    runner: ProcessRunner,
}

impl ToolRouter {
    pub const fn new(workspace: PathBuf, runner: ProcessRunner) -> Self {
        Self { workspace, runner }
    }

    pub const fn runner(&self) -> &ProcessRunner {
        &self.runner
    }

    /// List all available tools with their JSON Schema definitions.
    pub fn list_tools(&self) -> Vec<ToolDefinition> {
        vec![
            edit::tool_definition(),
            read::tool_definition(read::READ_FILE, "Read content of a file with optional parameters: start_line, end_line, encoding, line_numbers, skip_empty, max_lines, pattern (regex filter)"),
            read::tool_definition(read::VIEW, "Read content of a file (alias for read_file)"),
            write::tool_definition(),
            list::tool_definition(),
            exec::tool_definition(),
        ]
    }

    /// Call a tool by name.
    pub async fn call_tool(&self, name: &str, arguments: &ToolArguments) -> ToolResult<Value> {
        debug!(tool = name, "dispatching tool call");

        match name {
            edit::EDIT_FILE => to_value(edit::execute(&self.workspace, arguments).await?),
            read::READ_FILE | read::VIEW => {
                to_value(read::execute(&self.workspace, arguments).await?)
            }
            write::WRITE_FILE => to_value(write::execute(&self.workspace, arguments).await?),
            list::LIST_FILES => to_value(list::execute(&self.workspace, arguments).await?),
            exec::EXEC => to_value(exec::execute(&self.workspace, &self.runner, arguments).await?),
            _ => Err(ToolError::UnknownTool {
                name: name.to_owned(),
            }),
        }
    }
}

/// Run synchronous filesystem work on the blocking pool.
pub(crate) async fn blocking<T, F>(f: F) -> ToolResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> ToolResult<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await?
}

fn to_value(result: impl Serialize) -> ToolResult<Value> {
    Ok(serde_json::to_value(result)?)
}
