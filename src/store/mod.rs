//! Config store: external supplier of the resolvable map.
//!
//! The engine depends only on the [`ConfigSource`] contract, never on a
//! specific storage technology. [`ConfigStore`] wraps a source with the
//! snapshot lifecycle: bounded first-load retry, an atomically swapped
//! immutable snapshot pointer, and best-effort background refresh (polling
//! or push subscription) that keeps serving the last good snapshot through
//! transient provider outages.

pub mod composite;
pub mod file;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::try_join;
use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::singleflight::SingleFlight;
use crate::types::{ResolvableMap, StoreError, StoreSnapshot};

pub use composite::CompositeSource;
pub use file::FileSource;
pub use memory::StaticSource;

/// Provider of the `(state, archived)` resolvable maps.
///
/// Implementations may perform network I/O; the engine itself never does.
#[async_trait]
pub trait ConfigSource: Send + Sync {
    /// Fetch the live resolvable map.
    async fn fetch_state(&self) -> Result<ResolvableMap, StoreError>;

    /// Fetch the parallel archived map.
    async fn fetch_archived(&self) -> Result<ResolvableMap, StoreError>;

    /// Open a push channel of fresh snapshots, if the source supports one.
    ///
    /// The store falls back to polling when the channel closes.
    async fn subscribe(&self) -> Option<mpsc::Receiver<StoreSnapshot>> {
        None
    }
}

/// First-load retry policy: fixed attempt bound, fixed inter-attempt delay.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum fetch attempts before the read rejects.
    pub max_attempts: u32,
    /// Delay between attempts.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

/// Options for a store read.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadOptions {
    /// Bypass the cached snapshot and fetch from the source.
    pub fresh: bool,
}

impl ReadOptions {
    /// A forced-fresh read.
    pub fn fresh() -> Self {
        Self { fresh: true }
    }
}

/// Caching wrapper around a [`ConfigSource`] with the snapshot lifecycle.
pub struct ConfigStore {
    source: Arc<dyn ConfigSource>,
    retry: RetryPolicy,
    // Single writer (fetch paths), many readers; replaced wholesale.
    snapshot: RwLock<Option<Arc<StoreSnapshot>>>,
    flight: SingleFlight<Arc<StoreSnapshot>, StoreError>,
}

impl ConfigStore {
    /// Wrap `source` with the default retry policy.
    pub fn new(source: Arc<dyn ConfigSource>) -> Self {
        Self::with_retry(source, RetryPolicy::default())
    }

    /// Wrap `source` with an explicit retry policy.
    pub fn with_retry(source: Arc<dyn ConfigSource>, retry: RetryPolicy) -> Self {
        Self {
            source,
            retry,
            snapshot: RwLock::new(None),
            flight: SingleFlight::new(),
        }
    }

    /// The current snapshot, if one has loaded. Never blocks or fetches.
    pub fn current(&self) -> Option<Arc<StoreSnapshot>> {
        self.snapshot.read().clone()
    }

    /// Read (or load) the snapshot.
    ///
    /// The first read performs the bounded-retry initial fetch; concurrent
    /// reads share one fetch through the single-flight guard. A fresh read
    /// bypasses the cache but leaves the last good snapshot in place if it
    /// fails.
    pub async fn snapshot(&self, options: ReadOptions) -> Result<Arc<StoreSnapshot>, StoreError> {
        if !options.fresh {
            if let Some(snapshot) = self.current() {
                return Ok(snapshot);
            }
        }

        self.flight
            .run("snapshot", || self.fetch_with_retry())
            .await
    }

    /// The live resolvable map.
    pub async fn state(&self, options: ReadOptions) -> Result<Arc<ResolvableMap>, StoreError> {
        Ok(self.snapshot(options).await?.state.clone())
    }

    /// The archived map (read-only parallel map, no resolution semantics).
    pub async fn archived(&self, options: ReadOptions) -> Result<Arc<ResolvableMap>, StoreError> {
        Ok(self.snapshot(options).await?.archived.clone())
    }

    async fn fetch_with_retry(&self) -> Result<Arc<StoreSnapshot>, StoreError> {
        let mut last_error = None;
        for attempt in 1..=self.retry.max_attempts {
            match self.fetch_once().await {
                Ok(snapshot) => {
                    self.install(snapshot.clone());
                    return Ok(snapshot);
                }
                Err(err) => {
                    warn!(
                        target: "resolve_engine::store",
                        attempt,
                        max_attempts = self.retry.max_attempts,
                        error = %err,
                        "snapshot fetch failed"
                    );
                    last_error = Some(err);
                    if attempt < self.retry.max_attempts {
                        tokio::time::sleep(self.retry.delay).await;
                    }
                }
            }
        }
        Err(StoreError::Unavailable {
            attempts: self.retry.max_attempts,
            last_error: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts made".to_string()),
        })
    }

    /// One consistent fetch of the `(state, archived)` pair.
    async fn fetch_once(&self) -> Result<Arc<StoreSnapshot>, StoreError> {
        let (state, archived) =
            try_join!(self.source.fetch_state(), self.source.fetch_archived())?;
        Ok(Arc::new(StoreSnapshot::new(state, archived)))
    }

    fn install(&self, snapshot: Arc<StoreSnapshot>) {
        info!(
            target: "resolve_engine::store",
            entries = snapshot.state.len(),
            archived = snapshot.archived.len(),
            fingerprint = %snapshot.fingerprint(),
            "snapshot installed"
        );
        *self.snapshot.write() = Some(snapshot);
    }

    /// Spawn fixed-interval background polling.
    ///
    /// A failed poll keeps the previous snapshot and is logged, never
    /// surfaced to readers.
    pub fn spawn_refresh(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                match store.fetch_once().await {
                    Ok(snapshot) => store.install(snapshot),
                    Err(err) => warn!(
                        target: "resolve_engine::store",
                        error = %err,
                        "background refresh failed, keeping previous snapshot"
                    ),
                }
            }
        })
    }

    /// Spawn push-based refresh, falling back to polling at
    /// `fallback_interval` if the source has no subscription or the channel
    /// ends.
    pub fn spawn_subscription(self: &Arc<Self>, fallback_interval: Duration) -> JoinHandle<()> {
        let store = Arc::clone(self);
        tokio::spawn(async move {
            if let Some(mut rx) = store.source.subscribe().await {
                debug!(target: "resolve_engine::store", "subscription channel open");
                while let Some(snapshot) = rx.recv().await {
                    store.install(Arc::new(snapshot));
                }
                warn!(
                    target: "resolve_engine::store",
                    "subscription channel closed, falling back to polling"
                );
            }
            loop {
                tokio::time::sleep(fallback_interval).await;
                match store.fetch_once().await {
                    Ok(snapshot) => store.install(snapshot),
                    Err(err) => warn!(
                        target: "resolve_engine::store",
                        error = %err,
                        "fallback poll failed, keeping previous snapshot"
                    ),
                }
            }
        })
    }
}

impl std::fmt::Debug for ConfigStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigStore")
            .field("loaded", &self.current().is_some())
            .field("retry", &self.retry)
            .finish()
    }
}
