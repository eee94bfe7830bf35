//! mcp-file-edit -- standalone MCP file editing and exec server.
//!
//! Usage: mcp-file-edit [--workspace <path>] [--shell <path>] [--debug [--log-file <path>]]

use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mcp_file_edit::McpServerConfig;
use mcp_file_edit::process::runner::default_shell;

/// How long runtime shutdown waits for blocking tasks (the stdin reader).
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Debug, Parser)]
#[command(version, about = "MCP server exposing file tools and shell execution over stdio")]
struct Cli {
    /// Base directory for relative paths and the default exec directory.
    #[arg(long, default_value = ".")]
    workspace: PathBuf,

    /// Shell used to run exec commands (default: bash, falling back to sh).
    #[arg(long)]
    shell: Option<PathBuf>,

    /// Write debug logs, including request and response bodies, to the log file.
    #[arg(long)]
    debug: bool,

    /// Log file used with --debug.
    #[arg(long, default_value = "mcp.log")]
    log_file: PathBuf,
}

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    // stdout carries the protocol, logs never go there.
    if cli.debug {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&cli.log_file)
            .with_context(|| format!("failed to open log file {}", cli.log_file.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
            )
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let workspace = cli
        .workspace
        .canonicalize()
        .with_context(|| format!("invalid workspace {}", cli.workspace.display()))?;

    let config = McpServerConfig {
        workspace,
        shell: cli.shell.unwrap_or_else(default_shell),
        ..McpServerConfig::default()
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    let result = runtime.block_on(mcp_file_edit::run_mcp_server(config));
    // The stdin reader sits on a blocking thread that cannot be interrupted.
    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
    result
}
