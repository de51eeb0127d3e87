//! Store lifecycle tests: first-load retry, refresh resilience, forced
//! reads, push subscriptions, and source composition.
//!
//! Time-sensitive tests run under a paused tokio clock so retry delays and
//! poll intervals are exact instead of flaky.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tokio::sync::mpsc;

use resolve_engine::{
    CompositeSource, ConfigSource, ConfigStore, ReadOptions, ResolvableMap, RetryPolicy,
    StaticSource, StoreError, StoreSnapshot,
};

// ─────────────────────────────────────────────────────────────────────────────
// Test Sources
// ─────────────────────────────────────────────────────────────────────────────

fn map_of(pairs: &[(&str, serde_json::Value)]) -> ResolvableMap {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

/// Fails the first `fail_first` state fetches, then serves `state`.
struct FlakySource {
    fail_first: u32,
    attempts: AtomicU32,
    state: ResolvableMap,
}

impl FlakySource {
    fn new(fail_first: u32, state: ResolvableMap) -> Self {
        Self {
            fail_first,
            attempts: AtomicU32::new(0),
            state,
        }
    }

    fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConfigSource for FlakySource {
    async fn fetch_state(&self) -> Result<ResolvableMap, StoreError> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if n <= self.fail_first {
            Err(StoreError::Fetch(format!("induced failure {n}")))
        } else {
            Ok(self.state.clone())
        }
    }

    async fn fetch_archived(&self) -> Result<ResolvableMap, StoreError> {
        Ok(ResolvableMap::new())
    }
}

/// A source whose served map and failure mode can be switched mid-test.
#[derive(Default)]
struct SwitchSource {
    state: Mutex<ResolvableMap>,
    failing: AtomicBool,
}

impl SwitchSource {
    fn serving(state: ResolvableMap) -> Self {
        Self {
            state: Mutex::new(state),
            failing: AtomicBool::new(false),
        }
    }

    fn set_state(&self, state: ResolvableMap) {
        *self.state.lock() = state;
    }

    fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }
}

#[async_trait]
impl ConfigSource for SwitchSource {
    async fn fetch_state(&self) -> Result<ResolvableMap, StoreError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(StoreError::Fetch("provider outage".to_string()))
        } else {
            Ok(self.state.lock().clone())
        }
    }

    async fn fetch_archived(&self) -> Result<ResolvableMap, StoreError> {
        Ok(ResolvableMap::new())
    }
}

/// A source with a one-shot push channel.
struct PushSource {
    initial: ResolvableMap,
    channel: Mutex<Option<mpsc::Receiver<StoreSnapshot>>>,
}

impl PushSource {
    fn new(initial: ResolvableMap, rx: mpsc::Receiver<StoreSnapshot>) -> Self {
        Self {
            initial,
            channel: Mutex::new(Some(rx)),
        }
    }
}

#[async_trait]
impl ConfigSource for PushSource {
    async fn fetch_state(&self) -> Result<ResolvableMap, StoreError> {
        Ok(self.initial.clone())
    }

    async fn fetch_archived(&self) -> Result<ResolvableMap, StoreError> {
        Ok(ResolvableMap::new())
    }

    async fn subscribe(&self) -> Option<mpsc::Receiver<StoreSnapshot>> {
        self.channel.lock().take()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Load Retry
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_first_load_exhausts_retry_budget() {
    let source = Arc::new(FlakySource::new(u32::MAX, ResolvableMap::new()));
    let retry = RetryPolicy {
        max_attempts: 3,
        delay: Duration::from_millis(250),
    };
    let store = ConfigStore::with_retry(source.clone(), retry);

    let start = tokio::time::Instant::now();
    let err = store.snapshot(ReadOptions::default()).await.unwrap_err();
    let elapsed = start.elapsed();

    assert!(matches!(err, StoreError::Unavailable { attempts: 3, .. }));
    assert_eq!(source.attempts(), 3);
    // Two inter-attempt delays; no delay after the final attempt.
    assert!(elapsed >= Duration::from_millis(500));
    assert!(elapsed < Duration::from_millis(750));
    assert!(store.current().is_none());
}

#[tokio::test(start_paused = true)]
async fn test_first_load_recovers_within_budget() {
    let state = map_of(&[("home", json!({"__type": "Page"}))]);
    let source = Arc::new(FlakySource::new(2, state));
    let store = ConfigStore::with_retry(
        source.clone(),
        RetryPolicy {
            max_attempts: 3,
            delay: Duration::from_millis(100),
        },
    );

    let snapshot = store.snapshot(ReadOptions::default()).await.unwrap();
    assert_eq!(source.attempts(), 3);
    assert!(snapshot.state.contains_key("home"));

    // Later reads serve the installed snapshot without touching the source.
    let again = store.snapshot(ReadOptions::default()).await.unwrap();
    assert!(Arc::ptr_eq(&snapshot, &again));
    assert_eq!(source.attempts(), 3);
}

#[tokio::test]
async fn test_concurrent_first_reads_share_one_fetch() {
    let source = Arc::new(FlakySource::new(0, map_of(&[("a", json!(1))])));
    let store = ConfigStore::new(source.clone());

    let (a, b) = futures::join!(
        store.snapshot(ReadOptions::default()),
        store.snapshot(ReadOptions::default())
    );

    assert!(Arc::ptr_eq(&a.unwrap(), &b.unwrap()));
    assert_eq!(source.attempts(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Background Refresh
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_refresh_failure_keeps_last_good_snapshot() {
    let source = Arc::new(SwitchSource::serving(map_of(&[("v", json!(1))])));
    let store = Arc::new(ConfigStore::new(source.clone()));

    let first = store.snapshot(ReadOptions::default()).await.unwrap();
    assert_eq!(first.state["v"], json!(1));

    store.spawn_refresh(Duration::from_secs(1));

    // Provider goes down; the poll fails but readers never notice.
    source.set_failing(true);
    tokio::time::sleep(Duration::from_millis(1500)).await;
    let held = store.snapshot(ReadOptions::default()).await.unwrap();
    assert_eq!(held.state["v"], json!(1));

    // Provider recovers with new data; the next poll installs it.
    source.set_failing(false);
    source.set_state(map_of(&[("v", json!(2))]));
    tokio::time::sleep(Duration::from_secs(1)).await;
    let fresh = store.snapshot(ReadOptions::default()).await.unwrap();
    assert_eq!(fresh.state["v"], json!(2));
}

#[tokio::test]
async fn test_forced_fresh_read_bypasses_cache() {
    let source = Arc::new(SwitchSource::serving(map_of(&[("v", json!(1))])));
    let store = ConfigStore::new(source.clone());

    store.snapshot(ReadOptions::default()).await.unwrap();
    source.set_state(map_of(&[("v", json!(2))]));

    // Default read keeps serving the cached snapshot.
    let cached = store.snapshot(ReadOptions::default()).await.unwrap();
    assert_eq!(cached.state["v"], json!(1));

    // A fresh read refetches and installs the new snapshot for everyone.
    let fresh = store.snapshot(ReadOptions::fresh()).await.unwrap();
    assert_eq!(fresh.state["v"], json!(2));
    assert_eq!(store.current().unwrap().state["v"], json!(2));
}

#[tokio::test(start_paused = true)]
async fn test_failed_fresh_read_leaves_cache_intact() {
    let source = Arc::new(SwitchSource::serving(map_of(&[("v", json!(1))])));
    let store = ConfigStore::with_retry(
        source.clone(),
        RetryPolicy {
            max_attempts: 2,
            delay: Duration::from_millis(10),
        },
    );

    store.snapshot(ReadOptions::default()).await.unwrap();
    source.set_failing(true);

    let err = store.snapshot(ReadOptions::fresh()).await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable { .. }));
    assert_eq!(store.current().unwrap().state["v"], json!(1));
}

// ─────────────────────────────────────────────────────────────────────────────
// Push Subscription
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn test_subscription_installs_pushed_snapshots() {
    let (tx, rx) = mpsc::channel(4);
    let source = Arc::new(PushSource::new(map_of(&[("v", json!(1))]), rx));
    let store = Arc::new(ConfigStore::new(source));

    store.snapshot(ReadOptions::default()).await.unwrap();
    store.spawn_subscription(Duration::from_secs(3600));

    tx.send(StoreSnapshot::new(
        map_of(&[("v", json!(2))]),
        ResolvableMap::new(),
    ))
    .await
    .unwrap();

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(store.current().unwrap().state["v"], json!(2));
}

#[tokio::test(start_paused = true)]
async fn test_closed_subscription_falls_back_to_polling() {
    let (tx, rx) = mpsc::channel(4);
    let push = Arc::new(PushSource::new(map_of(&[("v", json!(1))]), rx));

    // Close the channel immediately; the task must fall back to polling.
    drop(tx);
    let store = Arc::new(ConfigStore::new(push));
    store.snapshot(ReadOptions::default()).await.unwrap();
    store.spawn_subscription(Duration::from_secs(5));

    tokio::time::sleep(Duration::from_secs(6)).await;
    // The fallback poll refetched from the source (same data here; the
    // point is that the task is alive and polling, not wedged).
    assert_eq!(store.current().unwrap().state["v"], json!(1));
}

// ─────────────────────────────────────────────────────────────────────────────
// Composition
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_composite_store_merges_with_later_precedence() {
    let base = StaticSource::new()
        .with_entry("home", json!({"__type": "Page", "title": "base"}))
        .with_entry("about", json!({"__type": "Page", "title": "about"}));
    let overlay = StaticSource::new()
        .with_entry("home", json!({"__type": "Page", "title": "overlay"}))
        .with_archived("retired", json!({"__type": "Page"}));

    let composite = CompositeSource::new(vec![Arc::new(base), Arc::new(overlay)]);
    let store = ConfigStore::new(Arc::new(composite));

    let snapshot = store.snapshot(ReadOptions::default()).await.unwrap();
    assert_eq!(snapshot.state["home"]["title"], json!("overlay"));
    assert_eq!(snapshot.state["about"]["title"], json!("about"));
    assert!(snapshot.archived.contains_key("retired"));
}

#[tokio::test]
async fn test_composite_fails_when_any_constituent_fails() {
    let ok = StaticSource::new().with_entry("a", json!(1));
    let broken = FlakySource::new(u32::MAX, ResolvableMap::new());

    let composite = CompositeSource::new(vec![Arc::new(ok), Arc::new(broken)]);
    let store = ConfigStore::with_retry(
        Arc::new(composite),
        RetryPolicy {
            max_attempts: 1,
            delay: Duration::ZERO,
        },
    );

    let err = store.snapshot(ReadOptions::default()).await.unwrap_err();
    assert!(matches!(err, StoreError::Unavailable { attempts: 1, .. }));
}
