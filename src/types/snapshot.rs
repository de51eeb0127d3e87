//! Immutable config store snapshots.
//!
//! A snapshot pairs the live `state` map with the parallel `archived` map.
//! The two are always fetched together so readers never observe a torn
//! pair, and a snapshot is only ever replaced wholesale by the store's
//! refresh logic, never mutated in place.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::canonical::canonical_hash_hex;
use crate::types::resolvable::ResolvableMap;

/// An immutable `(state, archived)` pair with fetch metadata.
///
/// The `archived` map is exposed read-only for audit/undo tooling; the
/// evaluator never resolves into it.
#[derive(Debug, Clone)]
pub struct StoreSnapshot {
    /// Live resolvable entries by id.
    pub state: Arc<ResolvableMap>,
    /// Archived entries by id, same shape as `state`.
    pub archived: Arc<ResolvableMap>,
    /// When this snapshot was fetched.
    pub fetched_at: DateTime<Utc>,
}

/// Summary of a snapshot for diagnostics endpoints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotStats {
    /// Number of live entries.
    pub entry_count: usize,
    /// Number of archived entries.
    pub archived_count: usize,
    /// Deterministic fingerprint of the full snapshot content.
    pub fingerprint: String,
    /// When the snapshot was fetched.
    pub fetched_at: DateTime<Utc>,
}

impl StoreSnapshot {
    /// Build a snapshot from freshly fetched maps.
    pub fn new(state: ResolvableMap, archived: ResolvableMap) -> Self {
        Self {
            state: Arc::new(state),
            archived: Arc::new(archived),
            fetched_at: Utc::now(),
        }
    }

    /// An empty snapshot (useful for tests and cold starts).
    pub fn empty() -> Self {
        Self::new(ResolvableMap::new(), ResolvableMap::new())
    }

    /// Deterministic fingerprint of the snapshot content.
    ///
    /// Two snapshots with identical state and archived maps share a
    /// fingerprint regardless of when they were fetched.
    pub fn fingerprint(&self) -> String {
        canonical_hash_hex(&(&*self.state, &*self.archived))
    }

    /// Stats for diagnostics.
    pub fn stats(&self) -> SnapshotStats {
        SnapshotStats {
            entry_count: self.state.len(),
            archived_count: self.archived.len(),
            fingerprint: self.fingerprint(),
            fetched_at: self.fetched_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map_of(pairs: &[(&str, serde_json::Value)]) -> ResolvableMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_fingerprint_ignores_fetch_time() {
        let state = map_of(&[("home", json!({"__type": "Page"}))]);
        let a = StoreSnapshot::new(state.clone(), ResolvableMap::new());
        let b = StoreSnapshot::new(state, ResolvableMap::new());
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_differs_on_content() {
        let a = StoreSnapshot::new(
            map_of(&[("home", json!({"__type": "Page"}))]),
            ResolvableMap::new(),
        );
        let b = StoreSnapshot::new(
            map_of(&[("home", json!({"__type": "Page", "title": "Hi"}))]),
            ResolvableMap::new(),
        );
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_archived_is_part_of_identity() {
        let state = map_of(&[("home", json!({"__type": "Page"}))]);
        let a = StoreSnapshot::new(state.clone(), ResolvableMap::new());
        let b = StoreSnapshot::new(state, map_of(&[("old", json!({"__type": "Page"}))]));
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_eq!(b.stats().archived_count, 1);
    }
}
