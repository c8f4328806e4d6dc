//! Integration tests for core-async.
//!
//! These tests verify that the abstraction behaves the way the metadata
//! coordinator relies on: blocking work overlaps, timeouts fire, and
//! cancellation propagates.

use core_async::{fs, runtime, sync, task, time};
use std::sync::Arc;

#[tokio::test]
async fn test_task_spawn() {
    let handle = task::spawn(async { 42 });
    let result = handle.await.unwrap();
    assert_eq!(result, 42);
}

#[tokio::test]
async fn test_spawn_blocking_runs_in_parallel() {
    let start = time::Instant::now();
    let handles: Vec<_> = (0..8)
        .map(|i| {
            task::spawn_blocking(move || {
                std::thread::sleep(std::time::Duration::from_millis(100));
                i
            })
        })
        .collect();

    let mut sum = 0;
    for handle in handles {
        sum += handle.await.unwrap();
    }

    assert_eq!(sum, 28);
    // Eight 100ms sleeps in series would take 800ms
    assert!(start.elapsed() < time::Duration::from_millis(600));
}

#[tokio::test]
async fn test_timeout_success() {
    let result = time::timeout(time::Duration::from_millis(100), async {
        time::sleep(time::Duration::from_millis(10)).await;
        42
    })
    .await;

    assert_eq!(result.unwrap(), 42);
}

#[tokio::test]
async fn test_timeout_failure() {
    let result = time::timeout(time::Duration::from_millis(10), async {
        time::sleep(time::Duration::from_millis(100)).await;
        42
    })
    .await;

    assert!(result.is_err());
}

#[tokio::test]
async fn test_describe_join_error_reports_panic_message() {
    let handle = task::spawn_blocking(|| -> u32 { panic!("corrupt header") });
    let err = handle.await.unwrap_err();
    let description = task::describe_join_error(err);
    assert!(description.contains("corrupt header"), "{}", description);
}

#[tokio::test]
async fn test_semaphore_limits_concurrency() {
    let limiter = Arc::new(sync::Semaphore::new(2));
    let active = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let peak = Arc::new(std::sync::atomic::AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..6 {
        let limiter = limiter.clone();
        let active = active.clone();
        let peak = peak.clone();
        handles.push(task::spawn(async move {
            let _permit = limiter.acquire_owned().await.unwrap();
            let now = active.fetch_add(1, std::sync::atomic::Ordering::SeqCst) + 1;
            peak.fetch_max(now, std::sync::atomic::Ordering::SeqCst);
            time::sleep(time::Duration::from_millis(20)).await;
            active.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
        }));
    }

    for handle in handles {
        handle.await.unwrap();
    }

    assert!(peak.load(std::sync::atomic::Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn test_cancellation_token_propagates_to_children() {
    let parent = sync::CancellationToken::new();
    let child = parent.child_token();

    let handle = task::spawn(async move {
        child.cancelled().await;
        "cancelled"
    });

    parent.cancel();
    assert_eq!(handle.await.unwrap(), "cancelled");
}

#[tokio::test]
async fn test_watch_channel_delivers_latest_value() {
    let (tx, mut rx) = sync::watch::channel(None::<u32>);

    task::spawn(async move {
        time::sleep(time::Duration::from_millis(10)).await;
        tx.send(Some(7)).ok();
    });

    let value = rx.wait_for(|v| v.is_some()).await.unwrap();
    assert_eq!(*value, Some(7));
}

#[tokio::test]
async fn test_is_readable_file() {
    let dir = std::env::temp_dir().join(format!("core-async-fs-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let file = dir.join("present.txt");
    std::fs::write(&file, b"data").unwrap();

    assert!(fs::is_readable_file(&file).await);
    assert!(!fs::is_readable_file(&dir).await);
    assert!(!fs::is_readable_file(&dir.join("missing.txt")).await);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn test_worker_runtime_blocks_on_future() {
    let rt = runtime::worker_runtime(Some(2)).unwrap();
    let value = rt.block_on(async { task::spawn(async { 5 }).await.unwrap() });
    assert_eq!(value, 5);
}

#[test]
fn test_try_block_on_outside_runtime() {
    assert!(!runtime::inside_runtime());
    let value = runtime::try_block_on(async { runtime::inside_runtime() }).unwrap();
    assert!(value);
}
