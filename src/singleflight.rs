//! Keyed deduplication of concurrent identical async operations.
//!
//! The first caller for a key becomes the leader and runs the operation;
//! concurrent callers for the same key await the leader's result instead of
//! running it again. Once the operation settles the slot is cleared, so a
//! later call with the same key starts fresh work.
//!
//! Used at two granularities:
//! - per resolution, keyed by `(resolution id, chain key)`, so a resolver
//!   reached via two concurrent paths runs exactly once;
//! - inside a config store, keyed by a fixed name, so concurrent reads
//!   trigger a single remote fetch.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

type SlotMap<T, E> = Arc<Mutex<HashMap<String, broadcast::Sender<Result<T, E>>>>>;

/// Keyed single-flight guard.
///
/// Results (and failures) must be `Clone` so one outcome can be delivered
/// to every waiter. A failure is broadcast like a success and the slot is
/// cleared, so the next call retries rather than replaying the failure.
pub struct SingleFlight<T, E> {
    inflight: SlotMap<T, E>,
}

impl<T, E> Default for SingleFlight<T, E> {
    fn default() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl<T, E> SingleFlight<T, E>
where
    T: Clone + Send + 'static,
    E: Clone + Send + 'static,
{
    /// Create an empty guard.
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `make()` under `key`, or await an in-flight run of the same key.
    pub async fn run<F, Fut>(&self, key: &str, make: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        enum Role<T, E> {
            Leader(broadcast::Sender<Result<T, E>>),
            Follower(broadcast::Receiver<Result<T, E>>),
        }

        // `make` is consumed only on the leader path; the loop re-enters
        // only from the follower path.
        let mut make = Some(make);
        loop {
            let role = {
                let mut map = self.inflight.lock();
                match map.get(key) {
                    Some(tx) => Role::Follower(tx.subscribe()),
                    None => {
                        let (tx, _) = broadcast::channel(1);
                        map.insert(key.to_string(), tx.clone());
                        Role::Leader(tx)
                    }
                }
            };

            match role {
                Role::Follower(mut rx) => match rx.recv().await {
                    Ok(result) => return result,
                    // Leader dropped without settling (cancelled); race for
                    // leadership and run the operation ourselves.
                    Err(_) => continue,
                },
                Role::Leader(tx) => {
                    let guard = SlotGuard {
                        map: Arc::clone(&self.inflight),
                        key: key.to_string(),
                    };
                    let result = (make.take().expect("leader path entered once"))().await;
                    // Clear the slot before settling so late arrivals start
                    // fresh work instead of subscribing to a spent channel.
                    drop(guard);
                    let _ = tx.send(result.clone());
                    return result;
                }
            }
        }
    }

    /// Number of operations currently in flight.
    pub fn in_flight(&self) -> usize {
        self.inflight.lock().len()
    }
}

/// Clears the slot even if the leader future is cancelled mid-run, so
/// followers observe a closed channel and retry instead of hanging.
struct SlotGuard<T, E> {
    map: SlotMap<T, E>,
    key: String,
}

impl<T, E> Drop for SlotGuard<T, E> {
    fn drop(&mut self) {
        self.map.lock().remove(&self.key);
    }
}
