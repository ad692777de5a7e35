// src/exec/pipeline.rs

//! Spawning built commands and collecting their results.
//!
//! Foreground runs race output collection against the timeout; whichever
//! finishes first decides the outcome. When the timer wins, the whole
//! process group is killed and reaped before returning, and partial output
//! is dropped.
//!
//! Background runs are detached and registered with the
//! [`ProcessRegistry`]; a watcher task logs their exit and unregisters them.

use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, BufReader};
use tokio::process::Child;
use tracing::{debug, info, warn};

use crate::errors::ExecError;
use crate::exec::command::BuiltCommand;
use crate::supervisor::ProcessRegistry;

/// Caller-supplied bytes for a foreground command's stdin.
pub type InputStream = Box<dyn AsyncRead + Send + Unpin>;

/// Spawn without waiting. Stdio is wired by [`BuiltCommand::to_command`].
pub fn spawn(built: &BuiltCommand, with_input: bool) -> Result<Child, ExecError> {
    built
        .to_command(with_input)
        .spawn()
        .map_err(|e| ExecError::SpawnFailed(format!("{}: {e}", built.program)))
}

/// Run in the foreground and return captured stdout.
///
/// `timeout = None` waits forever. A non-zero exit becomes
/// [`ExecError::RuntimeFailed`] carrying the captured output.
pub async fn run_foreground(
    built: &BuiltCommand,
    input: Option<InputStream>,
    timeout: Option<Duration>,
) -> Result<Vec<u8>, ExecError> {
    let mut child = spawn(built, input.is_some())?;
    let pid = child.id();
    info!(pid, argv = ?built.argv(), "process started");

    if let (Some(mut input), Some(mut stdin)) = (input, child.stdin.take()) {
        tokio::spawn(async move {
            // stdin is closed when this task drops it.
            if let Err(e) = tokio::io::copy(&mut input, &mut stdin).await {
                debug!(pid, error = %e, "feeding stdin stopped");
            }
        });
    }

    // Consume stderr so the child never blocks on a full pipe.
    if let Some(stderr) = child.stderr.take() {
        tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(pid, "stderr: {}", line);
            }
        });
    }

    let stdout = child.stdout.take();
    let collect = async {
        let mut out = Vec::new();
        if let Some(mut stdout) = stdout {
            stdout
                .read_to_end(&mut out)
                .await
                .map_err(|e| ExecError::IoFailed(format!("reading output: {e}")))?;
        }
        let status = child
            .wait()
            .await
            .map_err(|e| ExecError::IoFailed(format!("waiting for process: {e}")))?;
        Ok::<_, ExecError>((status, out))
    };

    let finished = match timeout {
        Some(limit) => {
            let raced = tokio::time::timeout(limit, collect).await;
            match raced {
                Ok(result) => result,
                Err(_) => {
                    warn!(pid, timeout = ?limit, "command execution timeout; killing process group");
                    kill_group(pid, &mut child).await;
                    return Err(ExecError::Timeout(limit));
                }
            }
        }
        None => collect.await,
    };

    let (status, out) = finished?;
    if status.success() {
        info!(pid, bytes = out.len(), "process exited");
        Ok(out)
    } else {
        warn!(pid, exit_code = ?status.code(), "process exited with failure");
        Err(ExecError::RuntimeFailed {
            status: status.code(),
            output: String::from_utf8_lossy(&out).into_owned(),
        })
    }
}

async fn kill_group(pid: Option<u32>, child: &mut Child) {
    if let Some(pid) = pid {
        if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
            debug!(pid, error = %e, "killpg failed");
        }
    }
    // Kills the leader if still alive and reaps it.
    if let Err(e) = child.kill().await {
        debug!(pid, error = %e, "kill after timeout failed");
    }
}

/// Spawn detached and return its pid immediately.
///
/// The process is tracked in `registry` until it exits. If the registry is
/// already shutting down the process is killed and the spawn reported as
/// failed.
pub fn spawn_background(
    built: &BuiltCommand,
    registry: Arc<ProcessRegistry>,
) -> Result<u32, ExecError> {
    let mut child = spawn(built, false)?;
    let pid = child
        .id()
        .ok_or_else(|| ExecError::SpawnFailed("process exited before it was tracked".into()))?;

    let label = built.program.clone();
    if !registry.register(pid, &label) {
        if let Err(e) = child.start_kill() {
            debug!(pid, error = %e, "kill after refused registration failed");
        }
        return Err(ExecError::SpawnFailed("service is shutting down".into()));
    }
    info!(pid, argv = ?built.argv(), "background process started");

    tokio::spawn(async move {
        match child.wait().await {
            Ok(status) if status.success() => info!(pid, "background process ended"),
            Ok(status) => warn!(pid, exit_code = ?status.code(), "background process ended with error"),
            Err(e) => warn!(pid, error = %e, "background process wait failed"),
        }
        registry.unregister(pid);
    });

    Ok(pid)
}
