//! Shutdown coordinator — graceful, then forceful, termination of every
//! registered command.

use std::time::Duration;

use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{info, warn};

use super::{ProcessHandle, ProcessRegistry, Signal};

/// Time processes get to exit after SIGTERM before they are killed.
pub const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// How often surviving group members are checked once leaders have exited.
const GROUP_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Outcome of one shutdown sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ShutdownReport {
    /// Processes found in the registry.
    pub swept: usize,
    /// Process groups that had to be sent SIGKILL after the grace period.
    pub killed: usize,
}

#[derive(Debug, Clone)]
pub struct ShutdownCoordinator {
    registry: ProcessRegistry,
    grace_period: Duration,
}

impl ShutdownCoordinator {
    pub const fn new(registry: ProcessRegistry) -> Self {
        Self {
            registry,
            grace_period: SHUTDOWN_GRACE_PERIOD,
        }
    }

    #[must_use]
    pub const fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// Terminate everything in the registry.
    ///
    /// Total latency is bounded by the grace period regardless of how many
    /// processes are running or whether they honour SIGTERM. A group counts
    /// as gone only when every member has exited, not just its leader.
    pub async fn shutdown(&self) -> ShutdownReport {
        let handles = self.registry.drain();
        if handles.is_empty() {
            info!("shutdown: no running commands");
            return ShutdownReport::default();
        }
        info!(count = handles.len(), "shutdown: terminating running commands");

        let deadline = Instant::now() + self.grace_period;
        for handle in &handles {
            handle.cancel();
            if handle.group_alive() {
                handle.signal(Signal::Terminate);
            }
        }

        let mut waiters = JoinSet::new();
        for handle in &handles {
            let handle = handle.clone();
            waiters.spawn(async move { handle.wait_exit().await });
        }
        let _ = tokio::time::timeout_at(deadline, async {
            while waiters.join_next().await.is_some() {}
        })
        .await;

        // Leaders are reaped; other group members may still be running.
        let mut survivors: Vec<&ProcessHandle> =
            handles.iter().filter(|h| h.group_alive()).collect();
        while !survivors.is_empty() && Instant::now() < deadline {
            tokio::time::sleep_until(deadline.min(Instant::now() + GROUP_POLL_INTERVAL)).await;
            survivors.retain(|h| h.group_alive());
        }

        for handle in &survivors {
            warn!(pid = handle.pid(), "grace period elapsed, killing process group");
            handle.signal(Signal::Kill);
        }

        let report = ShutdownReport {
            swept: handles.len(),
            killed: survivors.len(),
        };
        info!(swept = report.swept, killed = report.killed, "shutdown sweep complete");
        report
    }
}

/// Resolves when the process receives SIGINT or SIGTERM.
#[cfg(unix)]
pub async fn termination_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let (mut sigterm, mut sigint) = match (
        signal(SignalKind::terminate()),
        signal(SignalKind::interrupt()),
    ) {
        (Ok(term), Ok(int)) => (term, int),
        (Err(e), _) | (_, Err(e)) => {
            warn!(error = %e, "failed to install signal handlers, falling back to ctrl-c");
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };
    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM"),
        _ = sigint.recv() => info!("received SIGINT"),
    }
}

#[cfg(not(unix))]
pub async fn termination_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("received ctrl-c");
    }
}
