//! `mcp-file-edit` — MCP stdio server for file editing and shell execution.
//!
//! Speaks JSON-RPC 2.0 (newline-delimited) on stdin/stdout and exposes file
//! tools plus a supervised `exec` tool to a calling agent.
//!
//! # Tools
//!
//! - `read_file` / `view` — Reading with encodings, line ranges, regex filter
//! - `write_file` — Atomic file creation/overwrite
//! - `edit_file` — Full write, replace-all, or append
//! - `list_files` — Directory listing with name globs and depth limits
//! - `exec` — Shell commands with timeout, output capture and process-group
//!   cleanup on shutdown
//!
//! # Architecture
//!
//! ```text
//! stdin (JSON-RPC) → McpServer → ToolRouter → Tool implementations
//!                                                   ↓ (exec)
//!                        ProcessRunner ⇄ ProcessRegistry ← ShutdownCoordinator
//! stdout (JSON-RPC) ←────────────────────────────────┘
//! ```

pub mod error;
pub mod process;
pub mod protocol;
pub mod server;
pub mod tools;
pub mod util;

pub use error::{ToolError, ToolResult};
pub use server::{McpServer, McpServerConfig, run_mcp_server};
