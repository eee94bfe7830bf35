//! Shell command execution and supervision.
//!
//! ```text
//! exec ─→ ProcessRunner ──spawn──→ <shell> -c <command>   (own process group)
//!              │ register / drop guard
//!              ▼
//!        ProcessRegistry ←──drain── ShutdownCoordinator ←── SIGINT / SIGTERM / EOF
//! ```

pub mod context;
pub mod registry;
pub mod runner;
pub mod shutdown;

pub use context::ExecContext;
pub use registry::{ProcessHandle, ProcessRegistry, Registration};
pub use runner::{ExecOutput, ExecRequest, ExecStatus, ProcessRunner};
pub use shutdown::{SHUTDOWN_GRACE_PERIOD, ShutdownCoordinator, ShutdownReport};

/// Signals the supervisor sends to command process groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    /// Polite request to exit (SIGTERM).
    Terminate,
    /// Non-ignorable kill (SIGKILL).
    Kill,
}

/// Send `signal` to the process group led by `pid`.
///
/// A group that no longer exists is not an error.
#[cfg(unix)]
pub fn signal_process_group(pid: u32, signal: Signal) {
    use nix::errno::Errno;
    use nix::sys::signal::{Signal as NixSignal, killpg};
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        tracing::warn!(pid, "pid out of range, not signalling");
        return;
    };
    let sig = match signal {
        Signal::Terminate => NixSignal::SIGTERM,
        Signal::Kill => NixSignal::SIGKILL,
    };
    match killpg(Pid::from_raw(raw), sig) {
        Ok(()) => tracing::debug!(pid, signal = ?sig, "signalled process group"),
        Err(Errno::ESRCH) => tracing::debug!(pid, "process group already gone"),
        Err(e) => tracing::warn!(pid, signal = ?sig, error = %e, "failed to signal process group"),
    }
}

#[cfg(not(unix))]
pub fn signal_process_group(pid: u32, signal: Signal) {
    tracing::warn!(pid, ?signal, "process group signals are not supported on this platform");
}

/// True while any member of the process group led by `pid` exists.
///
/// Members that exited but were not yet reaped still count.
#[cfg(unix)]
pub fn process_group_alive(pid: u32) -> bool {
    use nix::errno::Errno;
    use nix::sys::signal::killpg;
    use nix::unistd::Pid;

    let Ok(raw) = i32::try_from(pid) else {
        return false;
    };
    match killpg(Pid::from_raw(raw), None) {
        Ok(()) | Err(Errno::EPERM) => true,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
pub fn process_group_alive(_pid: u32) -> bool {
    false
}
