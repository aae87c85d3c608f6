#![allow(clippy::unwrap_used, clippy::expect_used)]

//! Concurrent callers, stale-while-revalidate and the sweeper task.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use recordkit_cache::TtlCache;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

fn counting_fetch(
    calls: &Arc<AtomicUsize>,
    value: u32,
    delay: Duration,
) -> impl FnOnce() -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<u32>> + Send>> + use<>
{
    let calls = Arc::clone(calls);
    move || {
        Box::pin(async move {
            calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(delay).await;
            Ok(value)
        })
    }
}

#[tokio::test(start_paused = true)]
async fn concurrent_cold_reads_share_one_fetch() {
    let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60));
    let calls = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let cache = cache.clone();
        let fetch = counting_fetch(&calls, 42, Duration::from_millis(50));
        tasks.push(tokio::spawn(async move {
            cache.first_get_then_fetch("k", fetch).await
        }));
    }
    for task in tasks {
        assert_eq!(task.await.unwrap().unwrap(), 42);
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(cache.get("k"), Some(42));
}

#[tokio::test(start_paused = true)]
async fn concurrent_callers_all_see_the_failure() {
    let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60));
    let calls = Arc::new(AtomicUsize::new(0));

    let mut tasks = Vec::new();
    for _ in 0..4 {
        let cache = cache.clone();
        let calls = Arc::clone(&calls);
        tasks.push(tokio::spawn(async move {
            cache
                .first_get_then_fetch("k", move || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(10)).await;
                    Err::<u32, _>(anyhow::anyhow!("directory unavailable"))
                })
                .await
        }));
    }
    for task in tasks {
        let err = task.await.unwrap().unwrap_err();
        assert!(err.to_string().contains("directory unavailable"));
    }

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(cache.get("k").is_none());
}

#[tokio::test(start_paused = true)]
async fn stale_value_is_served_while_refreshing() {
    let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60));
    cache.set("k", 1);

    let release = Arc::new(Notify::new());
    let gate = Arc::clone(&release);
    let value = cache
        .first_fetch_then_refresh("k", move || async move {
            gate.notified().await;
            Ok(2)
        })
        .await
        .unwrap();
    assert_eq!(value, 1);

    // A refresh is already running, so this caller neither waits nor fetches.
    let calls = Arc::new(AtomicUsize::new(0));
    let again = cache
        .first_fetch_then_refresh("k", counting_fetch(&calls, 3, Duration::ZERO))
        .await
        .unwrap();
    assert_eq!(again, 1);
    assert_eq!(calls.load(Ordering::SeqCst), 0);

    release.notify_one();
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(cache.get("k"), Some(2));
}

#[tokio::test(start_paused = true)]
async fn cold_refresh_waits_for_the_fetch() {
    let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60));
    let calls = Arc::new(AtomicUsize::new(0));

    let value = cache
        .first_fetch_then_refresh("k", counting_fetch(&calls, 9, Duration::from_millis(20)))
        .await
        .unwrap();

    assert_eq!(value, 9);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn abandoned_caller_does_not_cancel_the_fetch() {
    let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(60));
    let calls = Arc::new(AtomicUsize::new(0));

    let abandoned = tokio::time::timeout(
        Duration::from_millis(5),
        cache.first_get_then_fetch("k", counting_fetch(&calls, 3, Duration::from_millis(50))),
    )
    .await;
    assert!(abandoned.is_err());

    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(cache.get("k"), Some(3));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test(start_paused = true)]
async fn sweeper_evicts_until_cancelled() {
    let cache: TtlCache<u32> = TtlCache::new(Duration::from_secs(10));
    let cancel = CancellationToken::new();
    let sweeper = cache.spawn_sweeper(Duration::from_secs(5), cancel.clone());

    cache.set("a", 1);
    cache.set("b", 2);
    assert_eq!(cache.len(), 2);

    tokio::time::sleep(Duration::from_secs(16)).await;
    assert!(cache.is_empty());

    cancel.cancel();
    sweeper.await.unwrap();
}
