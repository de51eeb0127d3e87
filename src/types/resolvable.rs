//! Resolvable wire model.
//!
//! A resolvable is a JSON object carrying the reserved `__type` field naming
//! the resolver to invoke. All other fields are props; a prop value may be a
//! nested resolvable, a `{"__ref": "<id>"}` store reference, an
//! array/object containing either, or a scalar.
//!
//! A store snapshot is a flat map from id string to resolvable, plus a
//! parallel `archived` map of the same shape.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

/// Reserved field naming the resolver type of a resolvable object.
pub const TYPE_FIELD: &str = "__type";

/// Reserved field marking a by-id reference into the store snapshot.
pub const REF_FIELD: &str = "__ref";

/// Flat map from entry id to resolvable value.
///
/// `BTreeMap` for deterministic iteration, which keeps hint generation and
/// snapshot fingerprints stable.
pub type ResolvableMap = BTreeMap<String, Value>;

/// Return the type tag of `value` if it is a tagged resolvable object.
pub fn type_tag(value: &Value) -> Option<&str> {
    value.as_object()?.get(TYPE_FIELD)?.as_str()
}

/// Return the referenced entry id if `value` is a `{"__ref": id}` object.
pub fn ref_id(value: &Value) -> Option<&str> {
    let obj = value.as_object()?;
    // A reference is exactly the `__ref` field; extra fields mean the
    // author wrote a plain object that happens to contain the key.
    if obj.len() == 1 {
        obj.get(REF_FIELD)?.as_str()
    } else {
        None
    }
}

/// Build a `{"__ref": id}` reference value.
pub fn make_ref(id: &str) -> Value {
    let mut obj = Map::new();
    obj.insert(REF_FIELD.to_string(), Value::String(id.to_string()));
    Value::Object(obj)
}

/// True if `value` is, or anywhere contains, a resolvable or a reference.
///
/// The evaluator uses this to skip whole subtrees of plain data without
/// walking them element-wise.
pub fn is_reference_bearing(value: &Value) -> bool {
    match value {
        Value::Object(obj) => {
            obj.contains_key(TYPE_FIELD)
                || obj.contains_key(REF_FIELD)
                || obj.values().any(is_reference_bearing)
        }
        Value::Array(items) => items.iter().any(is_reference_bearing),
        _ => false,
    }
}

/// The set of top-level prop names of a tagged resolvable whose values are
/// reference-bearing.
///
/// This is the runtime shape inspection that pregenerated hints replace; the
/// two must agree exactly for every shape.
pub fn reference_props(obj: &Map<String, Value>) -> BTreeSet<String> {
    obj.iter()
        .filter(|(key, _)| key.as_str() != TYPE_FIELD)
        .filter(|(_, value)| is_reference_bearing(value))
        .map(|(key, _)| key.clone())
        .collect()
}
