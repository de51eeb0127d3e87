//! Precomputed reference-shape hints.
//!
//! For a given resolvable shape, a hint records which top-level props carry
//! references, so the evaluator can skip runtime shape inspection. Hints
//! are generated ahead of time by scanning a full resolvable map, keyed by
//! a structural fingerprint of the shape, and are serializable so they can
//! be produced offline and shipped alongside the state document.
//!
//! ## Correctness property
//!
//! Resolving with hints must produce output identical to resolving with
//! on-demand inspection; the only observable difference is latency. This
//! holds because the fingerprint captures the full kind-structure of a
//! value (scalar contents ignored), and the reference-prop set is a pure
//! function of that structure.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::num::NonZeroUsize;

use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::canonical::canonical_hash_hex;
use crate::types::resolvable::{reference_props, ResolvableMap, TYPE_FIELD};

/// Structural fingerprint of a resolvable shape (xxh64 hex of the kind
/// skeleton).
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ShapeFingerprint(String);

impl ShapeFingerprint {
    /// The fingerprint as a hex string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ShapeFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Reduce a value to its kind skeleton: scalars collapse to a marker,
/// arrays and objects keep their structure with skeleton elements.
fn kind_skeleton(value: &Value) -> Value {
    match value {
        Value::Object(obj) => Value::Object(
            obj.iter()
                .map(|(k, v)| (k.clone(), kind_skeleton(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(kind_skeleton).collect()),
        _ => Value::String("s".to_string()),
    }
}

/// Compute the structural fingerprint of a value.
pub fn shape_fingerprint(value: &Value) -> ShapeFingerprint {
    ShapeFingerprint(canonical_hash_hex(&kind_skeleton(value)))
}

/// Fingerprint of an object map without wrapping it in a `Value` first.
///
/// Identical to `shape_fingerprint(&Value::Object(obj.clone()))`.
pub fn shape_fingerprint_obj(obj: &Map<String, Value>) -> ShapeFingerprint {
    let skeleton: Map<String, Value> = obj
        .iter()
        .map(|(k, v)| (k.clone(), kind_skeleton(v)))
        .collect();
    ShapeFingerprint(canonical_hash_hex(&Value::Object(skeleton)))
}

/// Serializable map from shape fingerprint to reference-bearing prop names.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HintStore {
    hints: BTreeMap<ShapeFingerprint, BTreeSet<String>>,
}

impl HintStore {
    /// Generate hints by scanning every tagged resolvable in `map`,
    /// including ones nested inside other entries.
    pub fn generate(map: &ResolvableMap) -> Self {
        let mut store = Self::default();
        for value in map.values() {
            store.scan(value);
        }
        store
    }

    fn scan(&mut self, value: &Value) {
        match value {
            Value::Object(obj) => {
                if obj.contains_key(TYPE_FIELD) {
                    self.record(value, obj);
                }
                for nested in obj.values() {
                    self.scan(nested);
                }
            }
            Value::Array(items) => {
                for item in items {
                    self.scan(item);
                }
            }
            _ => {}
        }
    }

    fn record(&mut self, value: &Value, obj: &Map<String, Value>) {
        let fingerprint = shape_fingerprint(value);
        self.hints
            .entry(fingerprint)
            .or_insert_with(|| reference_props(obj));
    }

    /// Reference props for a shape, if a hint was generated for it.
    ///
    /// Absence is not an error; the evaluator falls back to inspection.
    pub fn lookup(&self, fingerprint: &ShapeFingerprint) -> Option<&BTreeSet<String>> {
        self.hints.get(fingerprint)
    }

    /// Number of distinct shapes covered.
    pub fn len(&self) -> usize {
        self.hints.len()
    }

    /// True if no shapes are covered.
    pub fn is_empty(&self) -> bool {
        self.hints.is_empty()
    }
}

/// LRU memoization of fallback shape inspections.
///
/// Shapes absent from the pregenerated hints are inspected once and cached,
/// so repeated resolutions of structurally identical resolvables amortize
/// the inspection cost across requests.
pub struct InspectionCache {
    cache: Mutex<LruCache<ShapeFingerprint, BTreeSet<String>>>,
}

impl InspectionCache {
    /// Create a cache bounded to `capacity` shapes (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity clamped to >= 1");
        Self {
            cache: Mutex::new(LruCache::new(capacity)),
        }
    }

    /// Reference props for `obj`, from cache or fresh inspection.
    pub fn reference_props_for(
        &self,
        fingerprint: &ShapeFingerprint,
        obj: &Map<String, Value>,
    ) -> BTreeSet<String> {
        if let Some(hit) = self.cache.lock().get(fingerprint) {
            return hit.clone();
        }
        let props = reference_props(obj);
        self.cache.lock().put(fingerprint.clone(), props.clone());
        props
    }

    /// Number of cached shapes.
    pub fn len(&self) -> usize {
        self.cache.lock().len()
    }

    /// True if nothing is cached yet.
    pub fn is_empty(&self) -> bool {
        self.cache.lock().is_empty()
    }
}

impl Default for InspectionCache {
    fn default() -> Self {
        Self::new(1024)
    }
}
