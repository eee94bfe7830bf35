//! Registry of in-flight subprocesses.
//!
//! Each running `exec` call holds one entry from the moment its shell has
//! been spawned until the runner returns. The shutdown sweep drains the
//! whole map in one step and signals the processes afterwards, outside the
//! lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::Signal;
use crate::error::{ToolError, ToolResult};

/// Registry-assigned identity of a running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessId(u64);

/// What the registry knows about one running process.
///
/// The runner keeps the `Child`; the handle only carries what is needed to
/// cancel, signal and await it from elsewhere.
#[derive(Debug, Clone)]
pub struct ProcessHandle {
    pid: u32,
    cancel: CancellationToken,
    exit: watch::Receiver<Option<i32>>,
}

impl ProcessHandle {
    pub const fn new(pid: u32, cancel: CancellationToken, exit: watch::Receiver<Option<i32>>) -> Self {
        Self { pid, cancel, exit }
    }

    /// OS process id, which is also the id of the process group it leads.
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// Cancel the execution context of the owning runner.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// True once the runner has reaped the process, or is gone.
    pub fn has_exited(&self) -> bool {
        self.exit.borrow().is_some() || self.exit.has_changed().is_err()
    }

    /// True while the leader or any other member of its group is running.
    pub fn group_alive(&self) -> bool {
        !self.has_exited() || super::process_group_alive(self.pid)
    }

    /// Deliver `signal` to the process group.
    pub fn signal(&self, signal: Signal) {
        super::signal_process_group(self.pid, signal);
    }

    /// Wait until the runner reports an exit status.
    pub async fn wait_exit(&self) {
        let mut exit = self.exit.clone();
        // A closed channel means the runner dropped its child, which kills it.
        let _ = exit.wait_for(Option::is_some).await;
    }
}

#[derive(Debug, Default)]
struct RegistryState {
    next_id: u64,
    entries: HashMap<ProcessId, ProcessHandle>,
    closed: bool,
}

/// Concurrency-safe map from [`ProcessId`] to [`ProcessHandle`].
#[derive(Debug, Clone, Default)]
pub struct ProcessRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a started process. The returned guard removes it on drop.
    ///
    /// Fails once the registry has been drained for shutdown.
    pub fn register(&self, handle: ProcessHandle) -> ToolResult<Registration> {
        let mut state = self.lock();
        if state.closed {
            return Err(ToolError::ShuttingDown);
        }
        state.next_id += 1;
        let id = ProcessId(state.next_id);
        debug!(pid = handle.pid(), ?id, "registered process");
        state.entries.insert(id, handle);
        Ok(Registration {
            id,
            registry: self.clone(),
        })
    }

    /// Remove an entry. Missing entries are ignored.
    pub fn unregister(&self, id: ProcessId) {
        if self.lock().entries.remove(&id).is_some() {
            debug!(?id, "unregistered process");
        }
    }

    /// Take every entry out of the registry and refuse further inserts.
    pub fn drain(&self) -> Vec<ProcessHandle> {
        let mut state = self.lock();
        state.closed = true;
        state.entries.drain().map(|(_, handle)| handle).collect()
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of registrations ever made.
    pub fn registered_total(&self) -> u64 {
        self.lock().next_id
    }
}

/// Scope guard for one registry entry.
#[derive(Debug)]
pub struct Registration {
    id: ProcessId,
    registry: ProcessRegistry,
}

impl Registration {
    pub const fn id(&self) -> ProcessId {
        self.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.registry.unregister(self.id);
    }
}
