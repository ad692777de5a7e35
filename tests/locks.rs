// tests/locks.rs
mod common;
use crate::common::{init_tracing, with_timeout};

use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::oneshot;
use tokio::time::{sleep, Duration};

use servant::config::LockSpec;
use servant::errors::{ErrorKind, ExecError};
use servant::lock::LockManager;
use servant::types::LockWaitMode;

type TestResult = Result<(), Box<dyn Error>>;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn bodies_under_one_name_never_overlap() -> TestResult {
    init_tracing();

    let locks = Arc::new(LockManager::new());
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let locks = Arc::clone(&locks);
        let active = Arc::clone(&active);
        let peak = Arc::clone(&peak);
        handles.push(tokio::spawn(async move {
            locks
                .acquire_blocking("deploy", || async {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    sleep(Duration::from_millis(10)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                })
                .await;
        }));
    }
    for h in handles {
        with_timeout(h).await?;
    }

    assert_eq!(peak.load(Ordering::SeqCst), 1);
    assert_eq!(locks.len(), 1);
    Ok(())
}

#[tokio::test]
async fn try_against_held_lock_returns_immediately() {
    let locks = LockManager::new();
    let ran = AtomicUsize::new(0);

    locks
        .acquire_blocking("db", || async {
            let started = Instant::now();
            let inner = locks
                .acquire_try("db", || async {
                    ran.fetch_add(1, Ordering::SeqCst);
                })
                .await;
            assert!(inner.is_none());
            assert!(started.elapsed() < Duration::from_millis(50));
        })
        .await;

    assert_eq!(ran.load(Ordering::SeqCst), 0);

    // Released once the holder's body returned.
    assert_eq!(locks.acquire_try("db", || async { 7 }).await, Some(7));
}

#[tokio::test]
async fn distinct_names_do_not_contend() {
    let locks = LockManager::new();
    let got = locks
        .acquire_blocking("a", || async { locks.acquire_try("b", || async { "b" }).await })
        .await;
    assert_eq!(got, Some("b"));
    assert_eq!(locks.len(), 2);
}

#[tokio::test]
async fn wait_gives_up_after_timeout() -> TestResult {
    let locks = Arc::new(LockManager::new());
    let (held_tx, held_rx) = oneshot::channel();

    let holder = {
        let locks = Arc::clone(&locks);
        tokio::spawn(async move {
            locks
                .acquire_blocking("slow", || async {
                    let _ = held_tx.send(());
                    sleep(Duration::from_millis(400)).await;
                })
                .await;
        })
    };
    held_rx.await?;

    let started = Instant::now();
    let result = locks
        .acquire_wait("slow", Duration::from_millis(100), || async { "ran" })
        .await;
    assert_eq!(result, None);
    assert!(started.elapsed() >= Duration::from_millis(100));

    // Long enough to outlast the holder.
    let result = locks
        .acquire_wait("slow", Duration::from_secs(5), || async { "ran" })
        .await;
    assert_eq!(result, Some("ran"));

    holder.await?;
    Ok(())
}

async fn explode() {
    panic!("body blew up");
}

#[tokio::test]
async fn lock_is_released_when_body_panics() -> TestResult {
    let locks = Arc::new(LockManager::new());

    let crashed = {
        let locks = Arc::clone(&locks);
        tokio::spawn(async move {
            locks.acquire_blocking("fragile", explode).await
        })
    };
    assert!(crashed.await.is_err());

    assert_eq!(locks.acquire_try("fragile", || async { 1 }).await, Some(1));
    Ok(())
}

#[tokio::test]
async fn configured_modes_map_to_errors() {
    let locks = LockManager::new();
    let try_spec = LockSpec {
        name: "job".into(),
        timeout: None,
        wait_mode: LockWaitMode::Try,
    };
    let wait_spec = LockSpec {
        name: "job".into(),
        timeout: Some(Duration::from_millis(50)),
        wait_mode: LockWaitMode::Wait,
    };
    let forever_spec = LockSpec {
        name: "other".into(),
        timeout: None,
        wait_mode: LockWaitMode::Wait,
    };

    let outcome = locks
        .acquire(&try_spec, || async {
            let busy = locks.acquire(&try_spec, || async {}).await;
            let timed_out = locks.acquire(&wait_spec, || async {}).await;
            let other = locks.acquire(&forever_spec, || async { 3 }).await;
            (busy, timed_out, other)
        })
        .await;

    let Ok((busy, timed_out, other)) = outcome else {
        panic!("outer acquire failed");
    };
    assert!(matches!(busy, Err(ExecError::LockBusy(ref n)) if n == "job"));
    assert_eq!(timed_out.map_err(|e| e.kind()), Err(ErrorKind::LockTimeout));
    assert_eq!(other.ok(), Some(3));
}

#[test]
fn wait_mode_follows_flag() {
    assert_eq!(LockWaitMode::from(true), LockWaitMode::Wait);
    assert_eq!(LockWaitMode::from(false), LockWaitMode::Try);
    assert_eq!(LockWaitMode::default(), LockWaitMode::Try);
}
