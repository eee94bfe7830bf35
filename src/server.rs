//! MCP Server — stdio transport, JSON-RPC 2.0, newline-delimited.
//!
//! Reads one request per line, dispatches it to the tool router and writes
//! exactly one response for every request that carries an `id`.
//! Notifications are logged and never answered.
//!
//! Protocol flow:
//! 1. Client sends `initialize` → server responds with capabilities
//! 2. Client sends `notifications/initialized`
//! 3. Client sends `tools/list` → server returns tool definitions
//! 4. Client sends `tools/call` → server executes tool and returns result
//! 5. Client closes stdin, or SIGINT/SIGTERM arrives → running commands are
//!    terminated and the server exits

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::io::{AsyncBufRead, AsyncWrite, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::process::runner::default_shell;
use crate::process::shutdown::termination_signal;
use crate::process::{ProcessRegistry, ProcessRunner, SHUTDOWN_GRACE_PERIOD, ShutdownCoordinator};
use crate::protocol::{
    Decoded, INVALID_REQUEST, JsonRpcRequest, JsonRpcResponse, LineRead, MAX_LINE_BYTES,
    METHOD_NOT_FOUND, PARSE_ERROR, decode_request, error_response, read_line_limited, recover_id,
    success_response, write_response,
};
use crate::tools::{ToolArguments, ToolDefinition, ToolRouter};

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "file-edit-server";

// ---------------------------------------------------------------------------
// MCP protocol types
// ---------------------------------------------------------------------------

/// MCP server info returned in initialize response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ServerInfo {
    name: String,
    version: String,
}

/// MCP server capabilities.
#[derive(Debug, Serialize)]
struct ServerCapabilities {
    tools: ToolsCapability,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ToolsCapability {
    list_changed: bool,
}

/// MCP initialize result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InitializeResult {
    protocol_version: String,
    capabilities: ServerCapabilities,
    server_info: ServerInfo,
}

/// MCP tools/list result.
#[derive(Debug, Serialize)]
struct ToolsListResult {
    tools: Vec<ToolDefinition>,
}

/// MCP tools/call params.
#[derive(Debug, Deserialize)]
struct ToolCallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

// ---------------------------------------------------------------------------
// MCP Server configuration
// ---------------------------------------------------------------------------

/// Configuration for the MCP server.
#[derive(Debug, Clone)]
pub struct McpServerConfig {
    /// Base directory for relative paths and the default `exec` directory.
    pub workspace: PathBuf,
    /// Shell used as `<shell> -c <command>`.
    pub shell: PathBuf,
    /// Time running commands get after SIGTERM during shutdown.
    pub grace_period: Duration,
}

impl Default for McpServerConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("."),
            shell: default_shell(),
            grace_period: SHUTDOWN_GRACE_PERIOD,
        }
    }
}

// ---------------------------------------------------------------------------
// Request dispatcher
// ---------------------------------------------------------------------------

/// Sequential request dispatcher over any line-oriented byte stream.
#[derive(Debug, Clone)]
pub struct McpServer {
    router: ToolRouter,
    shutdown: CancellationToken,
}

impl McpServer {
    pub const fn new(router: ToolRouter, shutdown: CancellationToken) -> Self {
        Self { router, shutdown }
    }

    pub const fn router(&self) -> &ToolRouter {
        &self.router
    }

    /// Serve requests until end of input, an I/O failure or cancellation
    /// of the shutdown token.
    ///
    /// # Errors
    ///
    /// Returns an error if reading or writing the stream fails.
    pub async fn serve<R, W>(&self, mut reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = Vec::new();
        loop {
            line.clear();
            let read = tokio::select! {
                biased;
                () = self.shutdown.cancelled() => {
                    info!("shutdown requested, no longer reading requests");
                    break;
                }
                read = read_line_limited(&mut reader, &mut line, MAX_LINE_BYTES) => {
                    read.context("failed to read request")?
                }
            };

            match read {
                LineRead::Eof => {
                    info!("input closed, shutting down");
                    break;
                }
                LineRead::Oversized => {
                    warn!(max = MAX_LINE_BYTES, "discarded over-long request line");
                    if let Some(id) = recover_id(&line) {
                        let response = error_response(
                            id,
                            INVALID_REQUEST,
                            &format!("Invalid request: request exceeds maximum size ({MAX_LINE_BYTES} bytes)"),
                            None,
                        );
                        write_response(&mut writer, &response).await?;
                    }
                    continue;
                }
                LineRead::Line => {}
            }

            let trimmed = line.trim_ascii();
            if trimmed.is_empty() {
                continue;
            }
            debug!(raw = %String::from_utf8_lossy(trimmed), "received request");

            if let Some(response) = self.handle_line(trimmed).await {
                write_response(&mut writer, &response).await?;
            }
        }
        Ok(())
    }

    /// Decode and handle one line. `None` means nothing is owed to the client.
    async fn handle_line(&self, line: &[u8]) -> Option<JsonRpcResponse> {
        let request = match decode_request(line) {
            Decoded::Request(request) => request,
            Decoded::Malformed { id, reason } => {
                warn!(error = %reason, "malformed request");
                return Some(error_response(
                    id,
                    PARSE_ERROR,
                    &format!("Parse error: {reason}"),
                    None,
                ));
            }
            Decoded::Unaddressable { reason } => {
                warn!(error = %reason, "unparseable input without id, ignoring");
                return None;
            }
        };

        let Some(id) = request.id.clone() else {
            debug!(method = request.method, "notification received (no response)");
            return None;
        };

        if let Some(version) = request.jsonrpc.as_deref().filter(|v| *v != "2.0") {
            warn!(version, "invalid JSON-RPC version (expected \"2.0\")");
            return Some(error_response(
                id,
                INVALID_REQUEST,
                &format!("Invalid request: jsonrpc version must be \"2.0\", got \"{version}\""),
                None,
            ));
        }

        Some(self.dispatch(id, &request).await)
    }

    async fn dispatch(&self, id: Value, req: &JsonRpcRequest) -> JsonRpcResponse {
        match req.method.as_str() {
            "initialize" => handle_initialize(id),
            "tools/list" => success_response(
                id,
                &ToolsListResult {
                    tools: self.router.list_tools(),
                },
            ),
            "tools/call" => self.handle_tools_call(id, &req.params).await,
            "ping" => success_response(id, &json!({})),
            _ => {
                warn!(method = req.method, "unknown method");
                error_response(
                    id,
                    METHOD_NOT_FOUND,
                    &format!("Method not found: {}", req.method),
                    None,
                )
            }
        }
    }

    async fn handle_tools_call(&self, id: Value, params: &Value) -> JsonRpcResponse {
        let params = match ToolCallParams::deserialize(params) {
            Ok(p) => p,
            Err(e) => {
                return error_response(
                    id,
                    INVALID_REQUEST,
                    &format!("Invalid tools/call params: {e}"),
                    None,
                );
            }
        };

        let arguments = ToolArguments::from_value(params.arguments);
        match self.router.call_tool(&params.name, &arguments).await {
            Ok(result) => success_response(id, &result),
            Err(e) => {
                error!(tool = params.name, error = %e, "tool call failed");
                let data = e.context().map(|context| {
                    let mut data = Map::new();
                    data.insert("received_arguments".to_owned(), arguments.received());
                    data.extend(context);
                    Value::Object(data)
                });
                error_response(id, e.code(), &e.to_string(), data)
            }
        }
    }
}

fn handle_initialize(id: Value) -> JsonRpcResponse {
    let result = InitializeResult {
        protocol_version: PROTOCOL_VERSION.to_owned(),
        capabilities: ServerCapabilities {
            tools: ToolsCapability {
                list_changed: false,
            },
        },
        server_info: ServerInfo {
            name: SERVER_NAME.to_owned(),
            version: env!("CARGO_PKG_VERSION").to_owned(),
        },
    };
    success_response(id, &result)
}

// ---------------------------------------------------------------------------
// Server main loop
// ---------------------------------------------------------------------------

/// Run the MCP server on stdin/stdout.
///
/// A signal listener cancels the shutdown token on SIGINT/SIGTERM; a
/// separate coordinator task waits for that token and terminates every
/// running command. The token is also cancelled when the dispatch loop
/// ends for any reason, so the sweep always runs before this returns.
///
/// # Errors
///
/// Returns an error if stdin/stdout I/O fails fatally.
pub async fn run_mcp_server(config: McpServerConfig) -> Result<()> {
    info!(
        workspace = %config.workspace.display(),
        shell = %config.shell.display(),
        "MCP server starting"
    );

    let registry = ProcessRegistry::new();
    let runner = ProcessRunner::new(registry.clone(), config.shell);
    let router = ToolRouter::new(config.workspace, runner);
    let shutdown = CancellationToken::new();

    let signal_token = shutdown.clone();
    let listener = tokio::spawn(async move {
        termination_signal().await;
        signal_token.cancel();
    });

    let coordinator = ShutdownCoordinator::new(registry).with_grace_period(config.grace_period);
    let sweep_token = shutdown.clone();
    let sweep = tokio::spawn(async move {
        sweep_token.cancelled().await;
        coordinator.shutdown().await
    });

    let server = McpServer::new(router, shutdown.clone());
    let result = server
        .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await;
    if let Err(e) = &result {
        error!(error = %e, "dispatch loop failed");
    }

    shutdown.cancel();
    listener.abort();
    match sweep.await {
        Ok(report) => info!(swept = report.swept, killed = report.killed, "MCP server stopped"),
        Err(e) => warn!(error = %e, "shutdown task failed"),
    }
    result
}
