// src/supervisor/daemon.rs

//! Daemon supervision loop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::config::DaemonSpec;
use crate::engine::Engine;
use crate::exec::pipeline;

/// Why a daemon loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonExit {
    /// The process exited with status 0.
    NormalExit,
    /// The retry budget ran out; `attempts` counts every start.
    GaveUp { attempts: u32 },
    /// The service is shutting down.
    Shutdown,
    BuildFailed,
    SpawnFailed,
}

/// Counts consecutive short-lived failures.
///
/// A run that stayed up for at least the liveness window resets the count;
/// any shorter run adds one. With no window the count never resets, with a
/// zero window it always does.
#[derive(Debug, Clone)]
pub struct RetryTracker {
    retries: u32,
    live: Option<Duration>,
    failures: u32,
}

impl RetryTracker {
    pub fn new(retries: u32, live: Option<Duration>) -> Self {
        Self {
            retries,
            live,
            failures: 0,
        }
    }

    /// Record a failed run that lasted `uptime`; returns whether another
    /// attempt is allowed.
    pub fn record_failure(&mut self, uptime: Duration) -> bool {
        if self.live.is_some_and(|live| uptime >= live) {
            self.failures = 0;
        } else {
            self.failures += 1;
        }
        self.failures <= self.retries
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }
}

/// Keep `spec` running until it exits cleanly, exhausts its retries, or the
/// service starts shutting down.
pub async fn run_daemon(name: String, spec: DaemonSpec, engine: Arc<Engine>) -> DaemonExit {
    let command = spec.to_command();
    let registry = Arc::clone(engine.processes());
    let mut tracker = RetryTracker::new(spec.retries, spec.live);
    let mut attempts: u32 = 0;

    info!(daemon = %name, "starting daemon");

    loop {
        if registry.is_exiting() {
            info!(daemon = %name, "service exiting; daemon stopped");
            return DaemonExit::Shutdown;
        }

        let built = {
            let resolver = engine.resolver(None);
            match engine.builder().build(&command, &resolver) {
                Ok(built) => built,
                Err(e) => {
                    warn!(daemon = %name, error = %e, "create daemon command failed");
                    return DaemonExit::BuildFailed;
                }
            }
        };

        let mut child = match pipeline::spawn(&built, false) {
            Ok(child) => child,
            Err(e) => {
                warn!(daemon = %name, error = %e, "start daemon failed");
                return DaemonExit::SpawnFailed;
            }
        };
        attempts += 1;
        let started = Instant::now();
        let pid = child.id();
        info!(daemon = %name, pid, attempt = attempts, "daemon started");

        if let Some(pid) = pid {
            if !registry.register(pid, &name) {
                if let Err(e) = child.kill().await {
                    debug!(daemon = %name, pid, error = %e, "kill after refused registration failed");
                }
                return DaemonExit::Shutdown;
            }
        }

        let status = child.wait().await;
        if let Some(pid) = pid {
            registry.unregister(pid);
        }
        let uptime = started.elapsed();

        match status {
            Ok(status) if status.success() => {
                info!(daemon = %name, ?uptime, "daemon normal exit");
                return DaemonExit::NormalExit;
            }
            Ok(status) => {
                warn!(daemon = %name, exit_code = ?status.code(), ?uptime, "daemon exited")
            }
            Err(e) => warn!(daemon = %name, error = %e, "waiting for daemon failed"),
        }

        if !tracker.record_failure(uptime) {
            warn!(
                daemon = %name,
                retries = spec.retries,
                attempts,
                "daemon give up after {} retries",
                spec.retries
            );
            return DaemonExit::GaveUp { attempts };
        }
    }
}
