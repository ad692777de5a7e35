// tests/execution.rs
mod common;
use crate::common::builders::{CommandSpecBuilder, MapLookup};
use crate::common::{init_tracing, test_engine, with_timeout};

use std::error::Error;
use std::io::{self, Cursor};
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Instant;

use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::{Pid, getuid};
use tokio::io::AsyncWrite;
use tokio::time::{sleep, Duration};

use servant::errors::{ErrorKind, ExecError};
use servant::exec::InputStream;
use servant::vars::RequestParams;

type TestResult = Result<(), Box<dyn Error>>;

fn no_params() -> MapLookup {
    MapLookup::new()
}

/// Gone means no such pid, or a zombie nobody has reaped yet.
async fn wait_until_gone(pid: i32) -> bool {
    for _ in 0..100 {
        if kill(Pid::from_raw(pid), None) == Err(Errno::ESRCH) {
            return true;
        }
        let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).unwrap_or_default();
        if stat.contains(") Z ") {
            return true;
        }
        sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn foreground_output_is_captured() -> TestResult {
    init_tracing();
    let engine = test_engine();

    let spec = CommandSpecBuilder::shell("echo hello; echo ignored >&2").build();
    let out = with_timeout(engine.execute(&spec, &no_params(), None)).await?;
    assert_eq!(out, b"hello\n");
    Ok(())
}

#[tokio::test]
async fn exec_commands_receive_expanded_request_params() -> TestResult {
    let engine = test_engine();
    engine.set_variable("greet.word", "hello", false);

    let params = RequestParams::from_pairs(["name=world"]);
    let resolver = engine.resolver(Some(&params));
    let spec = CommandSpecBuilder::exec("echo ${greet.word} '${name} !'")
        .validate("name", "^[a-z]+$")
        .build();

    let out = with_timeout(engine.execute(&spec, &resolver, None)).await?;
    assert_eq!(String::from_utf8(out)?, "hello world !\n");

    let missing = engine.resolver(None);
    let err = engine.execute(&spec, &missing, None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ValidationFailed);
    Ok(())
}

#[tokio::test]
async fn non_zero_exit_is_a_runtime_failure_with_output() {
    let engine = test_engine();
    let spec = CommandSpecBuilder::shell("echo partial; exit 3").build();

    let err = with_timeout(engine.execute(&spec, &no_params(), None))
        .await
        .unwrap_err();
    match err {
        ExecError::RuntimeFailed { status, output } => {
            assert_eq!(status, Some(3));
            assert_eq!(output, "partial\n");
        }
        other => panic!("expected runtime failure, got {other:?}"),
    }
}

#[tokio::test]
async fn missing_program_fails_to_spawn() {
    let engine = test_engine();
    let spec = CommandSpecBuilder::exec("/nonexistent/servant-binary --flag").build();

    let err = engine.execute(&spec, &no_params(), None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SpawnFailed);
}

#[tokio::test]
async fn timeout_kills_the_whole_process_group() -> TestResult {
    init_tracing();
    let engine = test_engine();
    let dir = tempfile::tempdir()?;
    let pid_file = dir.path().join("child.pid");

    let code = format!(
        "sleep 30 & echo $! > {}; echo early; wait",
        pid_file.display()
    );
    let spec = CommandSpecBuilder::shell(&code)
        .timeout(Duration::from_millis(300))
        .build();

    let started = Instant::now();
    let err = with_timeout(engine.execute(&spec, &no_params(), None))
        .await
        .unwrap_err();
    assert!(matches!(err, ExecError::Timeout(d) if d == Duration::from_millis(300)));
    assert!(started.elapsed() < Duration::from_secs(5));

    let grandchild: i32 = std::fs::read_to_string(&pid_file)?.trim().parse()?;
    assert!(wait_until_gone(grandchild).await, "sleep {grandchild} survived the timeout");
    Ok(())
}

#[tokio::test]
async fn commands_within_timeout_complete_normally() -> TestResult {
    let engine = test_engine();
    let spec = CommandSpecBuilder::shell("sleep 0.1; echo done")
        .timeout(Duration::from_secs(5))
        .build();

    let out = with_timeout(engine.execute(&spec, &no_params(), None)).await?;
    assert_eq!(out, b"done\n");
    Ok(())
}

#[tokio::test]
async fn input_stream_feeds_stdin() -> TestResult {
    let engine = test_engine();
    let spec = CommandSpecBuilder::shell("tr a-z A-Z").build();

    let input: InputStream = Box::new(Cursor::new(b"shout\n".to_vec()));
    let out = with_timeout(engine.execute(&spec, &no_params(), Some(input))).await?;
    assert_eq!(out, b"SHOUT\n");
    Ok(())
}

#[tokio::test]
async fn without_input_stdin_is_empty() -> TestResult {
    let engine = test_engine();
    let spec = CommandSpecBuilder::shell("wc -c").build();

    // Must not hang waiting for input.
    let out = with_timeout(engine.execute(&spec, &no_params(), None)).await?;
    assert_eq!(String::from_utf8(out)?.trim(), "0");
    Ok(())
}

#[tokio::test]
async fn execute_to_writes_output() -> TestResult {
    let engine = test_engine();
    let spec = CommandSpecBuilder::shell("printf 'a\\nb\\n'").build();

    let mut sink: Vec<u8> = Vec::new();
    with_timeout(engine.execute_to(&spec, &no_params(), None, &mut sink)).await?;
    assert_eq!(sink, b"a\nb\n");
    Ok(())
}

/// A writer whose peer has gone away.
struct ClosedPipe;

impl AsyncWrite for ClosedPipe {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::from(io::ErrorKind::BrokenPipe)))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

#[tokio::test]
async fn execute_to_reports_write_failures() {
    let engine = test_engine();
    let spec = CommandSpecBuilder::shell("echo hi").build();

    let mut sink = ClosedPipe;
    let err = with_timeout(engine.execute_to(&spec, &no_params(), None, &mut sink))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IoFailed);
}

#[tokio::test]
async fn background_commands_return_at_once_and_are_tracked() -> TestResult {
    init_tracing();
    let engine = test_engine();
    let spec = CommandSpecBuilder::shell("sleep 30").background().build();

    let started = Instant::now();
    let out = with_timeout(engine.execute(&spec, &no_params(), None)).await?;
    assert!(out.is_empty());
    assert!(started.elapsed() < Duration::from_secs(2));

    let pids = engine.processes().pids();
    assert_eq!(pids.len(), 1);
    let pid = pids[0];
    assert!(engine.processes().get(pid).is_some());

    killpg(Pid::from_raw(pid as i32), Signal::SIGKILL)?;
    for _ in 0..100 {
        if engine.processes().is_empty() {
            break;
        }
        sleep(Duration::from_millis(20)).await;
    }
    assert!(engine.processes().is_empty(), "exited process still tracked");
    Ok(())
}

#[tokio::test]
async fn background_spawn_is_refused_while_exiting() {
    let engine = test_engine();
    engine.processes().begin_shutdown();

    let spec = CommandSpecBuilder::shell("sleep 30").background().build();
    let err = engine.execute(&spec, &no_params(), None).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SpawnFailed);
    assert!(engine.processes().is_empty());
}

#[tokio::test]
async fn commands_run_as_the_configured_user() -> TestResult {
    let engine = test_engine();
    let uid = getuid().as_raw();
    let spec = CommandSpecBuilder::shell("id -u").run_as(&uid.to_string()).build();

    let out = with_timeout(engine.execute(&spec, &no_params(), None)).await?;
    assert_eq!(String::from_utf8(out)?.trim(), uid.to_string());
    Ok(())
}

#[tokio::test]
async fn try_lock_conflict_reports_busy() -> TestResult {
    let engine = test_engine();
    let spec = CommandSpecBuilder::shell("echo locked").try_lock("release").build();

    let lookup = no_params();

    let inner = engine
        .locks()
        .acquire_blocking("release", || engine.execute_locked(&spec, &lookup, None))
        .await;
    assert!(matches!(inner, Err(ExecError::LockBusy(ref name)) if name == "release"));

    let out = engine.execute_locked(&spec, &lookup, None).await?;
    assert_eq!(out, b"locked\n");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn waiting_lock_serializes_commands() -> TestResult {
    init_tracing();
    let engine = test_engine();
    let dir = tempfile::tempdir()?;
    let log = dir.path().join("order.log");

    let code = format!(
        "echo start >> {log}; sleep 0.2; echo end >> {log}",
        log = log.display()
    );
    let spec = CommandSpecBuilder::shell(&code)
        .wait_lock("serial", Some(Duration::from_secs(5)))
        .build();

    let a = {
        let engine = engine.clone();
        let spec = spec.clone();
        tokio::spawn(async move { engine.execute_locked(&spec, &MapLookup::new(), None).await })
    };
    let b = {
        let engine = engine.clone();
        let spec = spec.clone();
        tokio::spawn(async move { engine.execute_locked(&spec, &MapLookup::new(), None).await })
    };
    with_timeout(a).await??;
    with_timeout(b).await??;

    let lines: Vec<String> = std::fs::read_to_string(&log)?
        .lines()
        .map(str::to_string)
        .collect();
    assert_eq!(lines, vec!["start", "end", "start", "end"]);
    Ok(())
}

#[tokio::test]
async fn acquire_and_execute_times_out_waiting() -> TestResult {
    let engine = test_engine();
    let spec = CommandSpecBuilder::shell("true")
        .wait_lock("w", Some(Duration::from_millis(50)))
        .build();
    let lock = spec.lock.clone().ok_or("lock missing")?;

    let result = engine
        .acquire_and_execute(&lock, || async {
            Ok(engine.acquire_and_execute(&lock, || async { Ok(()) }).await)
        })
        .await?;
    assert_eq!(result.map_err(|e| e.kind()), Err(ErrorKind::LockTimeout));
    Ok(())
}
