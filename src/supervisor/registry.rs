// src/supervisor/registry.rs

//! Registry of live background and daemon processes.
//!
//! The "exiting" flag lives under the same mutex as the process map, so a
//! registration can never slip in after shutdown has taken its snapshot.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tracing::debug;

/// A tracked child process.
#[derive(Debug, Clone)]
pub struct RunningProcess {
    pub pid: u32,
    /// Daemon name or program, for logs.
    pub label: String,
    pub started: Instant,
}

#[derive(Debug, Default)]
struct RegistryState {
    exiting: bool,
    processes: HashMap<u32, RunningProcess>,
}

#[derive(Debug, Default)]
pub struct ProcessRegistry {
    state: Mutex<RegistryState>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track `pid`. Returns `false` (and tracks nothing) once shutdown has
    /// begun; the caller then owns killing the process.
    pub fn register(&self, pid: u32, label: &str) -> bool {
        let mut state = self.state();
        if state.exiting {
            debug!(pid, label, "refusing to register process during shutdown");
            return false;
        }
        state.processes.insert(
            pid,
            RunningProcess {
                pid,
                label: label.to_string(),
                started: Instant::now(),
            },
        );
        debug!(pid, label, "process registered");
        true
    }

    /// Stop tracking `pid`. Returns whether it was tracked.
    pub fn unregister(&self, pid: u32) -> bool {
        let removed = self.state().processes.remove(&pid).is_some();
        if removed {
            debug!(pid, "process unregistered");
        }
        removed
    }

    pub fn is_exiting(&self) -> bool {
        self.state().exiting
    }

    /// Set the exiting flag and return the pids tracked at that instant.
    pub fn begin_shutdown(&self) -> Vec<u32> {
        let mut state = self.state();
        state.exiting = true;
        state.processes.keys().copied().collect()
    }

    pub fn pids(&self) -> Vec<u32> {
        self.state().processes.keys().copied().collect()
    }

    /// Every tracked process, oldest first.
    pub fn snapshot(&self) -> Vec<RunningProcess> {
        let mut all: Vec<RunningProcess> = self.state().processes.values().cloned().collect();
        all.sort_by_key(|p| (p.started, p.pid));
        all
    }

    pub fn get(&self, pid: u32) -> Option<RunningProcess> {
        self.state().processes.get(&pid).cloned()
    }

    pub fn len(&self) -> usize {
        self.state().processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state().processes.is_empty()
    }

    pub fn clear(&self) {
        self.state().processes.clear();
    }
}
