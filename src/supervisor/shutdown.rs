// src/supervisor/shutdown.rs

//! Signal-driven shutdown of tracked processes.
//!
//! On SIGTERM or SIGINT the coordinator:
//! 1. sets the registry's exiting flag so no new work is scheduled,
//! 2. sends SIGTERM to every tracked process group,
//! 3. polls briefly for the entries to clear as processes exit,
//! 4. SIGKILLs whatever is left,
//! 5. clears the registry and exits the service with status 0.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::Pid;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::supervisor::ProcessRegistry;

const DRAIN_POLLS: usize = 10;
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(10);

/// What a drain did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Processes sent SIGTERM.
    pub terminated: usize,
    /// Processes still tracked after polling and sent SIGKILL.
    pub killed: usize,
}

#[derive(Debug)]
pub struct ShutdownCoordinator {
    registry: Arc<ProcessRegistry>,
    installed: AtomicBool,
}

impl ShutdownCoordinator {
    pub fn new(registry: Arc<ProcessRegistry>) -> Self {
        Self {
            registry,
            installed: AtomicBool::new(false),
        }
    }

    /// Listen for SIGTERM/SIGINT; on either, drain and exit the process.
    ///
    /// Only the first call installs anything; later calls return
    /// `Ok(false)`. Failing to install the handlers is fatal to the caller.
    pub fn install(self: &Arc<Self>) -> Result<bool> {
        if self.installed.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let this = Arc::clone(self);

        tokio::spawn(async move {
            tokio::select! {
                _ = sigterm.recv() => info!("got signal SIGTERM"),
                _ = sigint.recv() => info!("got signal SIGINT"),
            }
            let report = this.drain().await;
            info!(
                terminated = report.terminated,
                killed = report.killed,
                "cleaning up done"
            );
            std::process::exit(0);
        });

        debug!("shutdown handler installed");
        Ok(true)
    }

    /// Terminate every tracked process, escalating to SIGKILL after a short
    /// grace period, and leave the registry empty.
    pub async fn drain(&self) -> DrainReport {
        info!("cleaning up processes");
        let pids = self.registry.begin_shutdown();
        let mut report = DrainReport::default();

        for pid in pids {
            match send(pid, Signal::SIGTERM) {
                Ok(()) => report.terminated += 1,
                Err(Errno::ESRCH) => {
                    self.registry.unregister(pid);
                }
                Err(e) => warn!(pid, error = %e, "failed to send SIGTERM"),
            }
        }

        for _ in 0..DRAIN_POLLS {
            if self.registry.is_empty() {
                break;
            }
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
            for pid in self.registry.pids() {
                if kill(Pid::from_raw(pid as i32), None) == Err(Errno::ESRCH) {
                    self.registry.unregister(pid);
                    info!(pid, "process terminated");
                }
            }
        }

        for process in self.registry.snapshot() {
            let pid = process.pid;
            info!(
                pid,
                label = %process.label,
                uptime = ?process.started.elapsed(),
                "killing process"
            );
            if let Err(e) = send(pid, Signal::SIGKILL) {
                debug!(pid, error = %e, "SIGKILL failed");
            }
            report.killed += 1;
        }

        self.registry.clear();
        report
    }
}

/// Signal the process group led by `pid`, falling back to the process
/// itself when it leads no group.
fn send(pid: u32, sig: Signal) -> std::result::Result<(), Errno> {
    let pid = Pid::from_raw(pid as i32);
    match killpg(pid, sig) {
        Err(Errno::ESRCH) => kill(pid, sig),
        other => other,
    }
}
