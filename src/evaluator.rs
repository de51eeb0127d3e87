//! Graph evaluator: the resolver core.
//!
//! Given an entry (a resolvable or raw value) and a context, the evaluator
//! walks the graph depth-first: plain containers are resolved element-wise
//! preserving order and keys, `{"__ref": id}` values are dereferenced
//! against the snapshot (after override rewriting), and tagged objects
//! dispatch to the registered resolver with their reference-bearing props
//! resolved concurrently (fan-out, then fan-in before the handler runs).
//!
//! ## Bookkeeping
//!
//! - The resolve chain is the address of every node reached; the
//!   single-flight guard keys on `(resolution id, chain key)` so a resolver
//!   at one chain position runs at most once per resolution.
//! - Cycles are detected as a repeated `Enter` of the same store id;
//!   overall depth is bounded deliberately rather than by the call stack
//!   (recursion is heap-boxed).
//! - Dangling conditions (unregistered tag, missing id) route through the
//!   configured recovery hook, or surface as hard errors naming the chain.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use futures::future::try_join_all;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::context::ResolveContext;
use crate::hints::{shape_fingerprint_obj, HintStore, InspectionCache};
use crate::registry::ResolverRegistry;
use crate::types::resolvable::{is_reference_bearing, make_ref, ref_id, TYPE_FIELD};
use crate::types::{ChainStep, ResolveError, StoreSnapshot};

/// Fallback invoked when a reference cannot be resolved: receives the
/// almost-resolved parent value and produces a safe substitute.
pub type RecoveryFn = dyn Fn(Value) -> Result<Value, ResolveError> + Send + Sync;

/// Outcome of a top-level resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved {
    /// The entry resolved to a value.
    Value(Value),
    /// A resolver deliberately aborted the resolution with a final value.
    ShortCircuit(Value),
}

impl Resolved {
    /// The payload, whichever way it was produced.
    pub fn into_value(self) -> Value {
        match self {
            Resolved::Value(v) | Resolved::ShortCircuit(v) => v,
        }
    }

    /// True if a resolver short-circuited the resolution.
    pub fn is_short_circuit(&self) -> bool {
        matches!(self, Resolved::ShortCircuit(_))
    }
}

struct EngineInner {
    registry: ResolverRegistry,
    hints: Option<Arc<HintStore>>,
    recovery: Option<Arc<RecoveryFn>>,
    max_depth: usize,
    inspection_cache: InspectionCache,
}

/// The resolution engine. Cheap to clone; all configuration is shared.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

/// Builder for [`Engine`].
pub struct EngineBuilder {
    registry: ResolverRegistry,
    hints: Option<Arc<HintStore>>,
    recovery: Option<Arc<RecoveryFn>>,
    max_depth: usize,
    cache_capacity: usize,
}

impl EngineBuilder {
    /// Start from a populated resolver registry.
    pub fn new(registry: ResolverRegistry) -> Self {
        Self {
            registry,
            hints: None,
            recovery: None,
            max_depth: 64,
            cache_capacity: 1024,
        }
    }

    /// Use pregenerated shape hints.
    pub fn hints(mut self, hints: HintStore) -> Self {
        self.hints = Some(Arc::new(hints));
        self
    }

    /// Configure the dangling-recovery hook.
    ///
    /// Without a hook, dangling conditions are hard resolution errors.
    pub fn recovery<F>(mut self, hook: F) -> Self
    where
        F: Fn(Value) -> Result<Value, ResolveError> + Send + Sync + 'static,
    {
        self.recovery = Some(Arc::new(hook));
        self
    }

    /// Bound the resolve chain length (default 64).
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Capacity of the fallback inspection cache (default 1024 shapes).
    pub fn inspection_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Build the engine.
    pub fn build(self) -> Engine {
        Engine {
            inner: Arc::new(EngineInner {
                registry: self.registry,
                hints: self.hints,
                recovery: self.recovery,
                max_depth: self.max_depth,
                inspection_cache: InspectionCache::new(self.cache_capacity),
            }),
        }
    }
}

type BoxedResolve<'a> = Pin<Box<dyn Future<Output = Result<Value, ResolveError>> + Send + 'a>>;

impl Engine {
    /// Builder entry point.
    pub fn builder(registry: ResolverRegistry) -> EngineBuilder {
        EngineBuilder::new(registry)
    }

    /// A fresh context for resolving against `snapshot` with no overrides.
    pub fn context(&self, snapshot: Arc<StoreSnapshot>) -> ResolveContext {
        ResolveContext::new(self.clone(), snapshot, BTreeMap::new())
    }

    /// A fresh context with an override table (from audience selection).
    pub fn context_with_overrides(
        &self,
        snapshot: Arc<StoreSnapshot>,
        overrides: BTreeMap<String, String>,
    ) -> ResolveContext {
        ResolveContext::new(self.clone(), snapshot, overrides)
    }

    /// Resolve a store entry by id.
    ///
    /// A deliberate short-circuit raised anywhere in the subtree surfaces
    /// as [`Resolved::ShortCircuit`], not as an error.
    pub async fn resolve_entry(
        &self,
        id: &str,
        ctx: &ResolveContext,
    ) -> Result<Resolved, ResolveError> {
        match self.resolve_reference(id, ctx).await {
            Ok(value) => Ok(Resolved::Value(value)),
            Err(ResolveError::ShortCircuit(value)) => Ok(Resolved::ShortCircuit(value)),
            Err(err) => Err(err),
        }
    }

    pub(crate) fn max_depth(&self) -> usize {
        self.inner.max_depth
    }

    /// Dereference `id` against the snapshot, applying override rewriting,
    /// cycle detection, and dangling recovery.
    pub(crate) async fn resolve_reference(
        &self,
        id: &str,
        ctx: &ResolveContext,
    ) -> Result<Value, ResolveError> {
        let target = ctx.rewrite(id);
        if ctx.chain().has_entered(&target) {
            return Err(ResolveError::CycleDetected {
                id: target,
                chain: ctx.chain().key(),
            });
        }

        let Some(entry) = ctx.resolvables().get(&target).cloned() else {
            return self.recover(
                make_ref(id),
                ResolveError::MissingReference {
                    id: target,
                    chain: ctx.chain().key(),
                },
            );
        };

        let entered = ctx.enter(ChainStep::Enter(target))?;
        self.resolve_value(entry, entered).await
    }

    /// Resolve an arbitrary entry value.
    ///
    /// Boxed recursion keeps the future type finite and the stack depth
    /// governed by the chain bound, not the call stack.
    pub(crate) fn resolve_value(&self, value: Value, ctx: ResolveContext) -> BoxedResolve<'_> {
        Box::pin(async move {
            // Plain data with no references anywhere returns untouched.
            if !is_reference_bearing(&value) {
                return Ok(value);
            }

            if let Some(id) = ref_id(&value).map(str::to_string) {
                return self.resolve_reference(&id, &ctx).await;
            }

            match value {
                Value::Object(obj) if obj.contains_key(TYPE_FIELD) => {
                    self.resolve_tagged(obj, &ctx).await
                }
                Value::Array(items) => {
                    let futs = items.into_iter().enumerate().map(|(i, item)| {
                        let child = ctx.descend(ChainStep::Index(i));
                        async move { self.resolve_value(item, child).await }
                    });
                    // try_join_all preserves input order in its output.
                    let resolved = try_join_all(futs).await?;
                    Ok(Value::Array(resolved))
                }
                Value::Object(obj) => {
                    let futs = obj.into_iter().map(|(key, item)| {
                        let child = ctx.descend(ChainStep::Prop(key.clone()));
                        async move {
                            let resolved = self.resolve_value(item, child).await?;
                            Ok::<_, ResolveError>((key, resolved))
                        }
                    });
                    let resolved = try_join_all(futs).await?;
                    Ok(Value::Object(resolved.into_iter().collect()))
                }
                scalar => Ok(scalar),
            }
        })
    }

    /// Dispatch a tagged object to its registered resolver.
    async fn resolve_tagged(
        &self,
        obj: Map<String, Value>,
        ctx: &ResolveContext,
    ) -> Result<Value, ResolveError> {
        // The reserved field must hold a string; anything else is an
        // authoring error, not an unregistered type.
        let tag = match obj.get(TYPE_FIELD) {
            Some(Value::String(tag)) => tag.clone(),
            other => {
                return Err(ResolveError::MalformedType {
                    found: other.cloned().unwrap_or(Value::Null).to_string(),
                    chain: ctx.chain().key(),
                })
            }
        };

        let Some(resolver) = self.inner.registry.get(&tag) else {
            let chain = ctx.chain().key();
            return self.recover(
                Value::Object(obj),
                ResolveError::UnregisteredType { tag, chain },
            );
        };

        let ref_props = self.reference_props_of(&obj);
        // Dispatch, not Enter: type tags recur freely across a graph and
        // must never trip store-id cycle detection.
        let entered = ctx.enter(ChainStep::Dispatch(tag.clone()))?;
        let key = entered.flight_key();

        entered
            .flight()
            .run(&key, || async {
                let futs = obj
                    .into_iter()
                    .filter(|(prop, _)| prop != TYPE_FIELD)
                    .map(|(prop, item)| {
                        let child = entered.descend(ChainStep::Prop(prop.clone()));
                        let is_ref = ref_props.contains(&prop);
                        async move {
                            let resolved = if is_ref {
                                self.resolve_value(item, child).await?
                            } else {
                                item
                            };
                            Ok::<_, ResolveError>((prop, resolved))
                        }
                    });
                let props: Map<String, Value> = try_join_all(futs).await?.into_iter().collect();

                debug!(
                    target: "resolve_engine::evaluator",
                    chain = %entered.chain(),
                    tag = %tag,
                    "invoking resolver"
                );
                resolver.run(Value::Object(props), entered.clone()).await
            })
            .await
    }

    /// Reference-bearing props of a tagged object: pregenerated hint if
    /// available, otherwise cached inspection. Both produce the same set.
    fn reference_props_of(&self, obj: &Map<String, Value>) -> BTreeSet<String> {
        let fingerprint = shape_fingerprint_obj(obj);
        if let Some(hint) = self
            .inner
            .hints
            .as_ref()
            .and_then(|h| h.lookup(&fingerprint))
        {
            return hint.clone();
        }
        self.inner
            .inspection_cache
            .reference_props_for(&fingerprint, obj)
    }

    /// Route a dangling condition through the recovery hook, if configured.
    fn recover(&self, parent: Value, err: ResolveError) -> Result<Value, ResolveError> {
        match &self.inner.recovery {
            Some(hook) => {
                warn!(
                    target: "resolve_engine::evaluator",
                    error = %err,
                    "dangling reference, invoking recovery"
                );
                hook(parent)
            }
            None => Err(err),
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("resolvers", &self.inner.registry.len())
            .field("hinted_shapes", &self.inner.hints.as_ref().map(|h| h.len()))
            .field("max_depth", &self.inner.max_depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ResolvableMap;
    use serde_json::json;

    fn snapshot_of(pairs: &[(&str, Value)]) -> Arc<StoreSnapshot> {
        let state: ResolvableMap = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        Arc::new(StoreSnapshot::new(state, ResolvableMap::new()))
    }

    fn echo_registry() -> ResolverRegistry {
        let mut registry = ResolverRegistry::new();
        registry.register_fn("Page", |props, _ctx| async move { Ok(props) });
        registry.register_fn("Hero", |props, _ctx| async move { Ok(props) });
        registry
    }

    #[tokio::test]
    async fn test_scalar_passes_through() {
        let engine = Engine::builder(echo_registry()).build();
        let ctx = engine.context(snapshot_of(&[]));
        let out = ctx.resolve(json!([1, "two", {"three": 3}])).await.unwrap();
        assert_eq!(out, json!([1, "two", {"three": 3}]));
    }

    #[tokio::test]
    async fn test_tagged_entry_dispatches() {
        let engine = Engine::builder(echo_registry()).build();
        let snapshot = snapshot_of(&[("home", json!({"__type": "Page", "title": "Hi"}))]);
        let ctx = engine.context(snapshot);

        let out = engine.resolve_entry("home", &ctx).await.unwrap();
        assert_eq!(out, Resolved::Value(json!({"title": "Hi"})));
    }

    #[tokio::test]
    async fn test_nested_reference_resolves() {
        let engine = Engine::builder(echo_registry()).build();
        let snapshot = snapshot_of(&[
            (
                "home",
                json!({"__type": "Page", "hero": {"__ref": "hero"}}),
            ),
            ("hero", json!({"__type": "Hero", "image": "sunset.png"})),
        ]);
        let ctx = engine.context(snapshot);

        let out = engine.resolve_entry("home", &ctx).await.unwrap();
        assert_eq!(
            out,
            Resolved::Value(json!({"hero": {"image": "sunset.png"}}))
        );
    }

    #[tokio::test]
    async fn test_array_order_preserved() {
        let mut registry = echo_registry();
        registry.register_fn("Label", |props, _ctx| async move {
            Ok(props.get("text").cloned().unwrap_or(Value::Null))
        });
        let engine = Engine::builder(registry).build();
        let snapshot = snapshot_of(&[(
            "list",
            json!({
                "__type": "Page",
                "items": [
                    {"__type": "Label", "text": "a"},
                    {"__type": "Label", "text": "b"},
                    {"__type": "Label", "text": "c"}
                ]
            }),
        )]);
        let ctx = engine.context(snapshot);

        let out = engine.resolve_entry("list", &ctx).await.unwrap();
        assert_eq!(out, Resolved::Value(json!({"items": ["a", "b", "c"]})));
    }

    #[tokio::test]
    async fn test_unregistered_tag_without_recovery_errors() {
        let engine = Engine::builder(ResolverRegistry::new()).build();
        let snapshot = snapshot_of(&[("home", json!({"__type": "Mystery", "a": 1}))]);
        let ctx = engine.context(snapshot);

        let err = engine.resolve_entry("home", &ctx).await.unwrap_err();
        assert!(matches!(err, ResolveError::UnregisteredType { .. }));
    }

    #[tokio::test]
    async fn test_recovery_substitutes_value() {
        let engine = Engine::builder(ResolverRegistry::new())
            .recovery(|parent| {
                let mut obj = parent.as_object().cloned().unwrap_or_default();
                obj.remove(TYPE_FIELD);
                Ok(Value::Object(obj))
            })
            .build();
        let snapshot = snapshot_of(&[("home", json!({"__type": "unregistered.tag", "a": 1}))]);
        let ctx = engine.context(snapshot);

        let out = engine.resolve_entry("home", &ctx).await.unwrap();
        assert_eq!(out, Resolved::Value(json!({"a": 1})));
    }

    #[tokio::test]
    async fn test_missing_reference_without_recovery_errors() {
        let engine = Engine::builder(echo_registry()).build();
        let snapshot = snapshot_of(&[("home", json!({"__type": "Page", "hero": {"__ref": "nope"}}))]);
        let ctx = engine.context(snapshot);

        let err = engine.resolve_entry("home", &ctx).await.unwrap_err();
        assert!(matches!(err, ResolveError::MissingReference { ref id, .. } if id == "nope"));
    }

    #[tokio::test]
    async fn test_cycle_detected() {
        let engine = Engine::builder(echo_registry()).build();
        let snapshot = snapshot_of(&[
            ("a", json!({"__type": "Page", "next": {"__ref": "b"}})),
            ("b", json!({"__type": "Page", "next": {"__ref": "a"}})),
        ]);
        let ctx = engine.context(snapshot);

        let err = engine.resolve_entry("a", &ctx).await.unwrap_err();
        assert!(matches!(err, ResolveError::CycleDetected { ref id, .. } if id == "a"));
    }

    #[tokio::test]
    async fn test_store_id_matching_type_tag_is_not_a_cycle() {
        let mut registry = echo_registry();
        registry.register_fn("Card", |props, _ctx| async move { Ok(props) });
        let engine = Engine::builder(registry).build();
        // The entry id "Hero" collides with the "Hero" tag dispatched on
        // the way in; the graph itself is acyclic.
        let snapshot = snapshot_of(&[
            (
                "page",
                json!({"__type": "Hero", "child": {"__ref": "Hero"}}),
            ),
            ("Hero", json!({"__type": "Card", "n": 1})),
        ]);
        let ctx = engine.context(snapshot);

        let out = engine.resolve_entry("page", &ctx).await.unwrap();
        assert_eq!(out, Resolved::Value(json!({"child": {"n": 1}})));
    }

    #[tokio::test]
    async fn test_non_string_type_tag_rejected() {
        let engine = Engine::builder(echo_registry()).build();
        let snapshot = snapshot_of(&[("bad", json!({"__type": 42, "a": 1}))]);
        let ctx = engine.context(snapshot);

        let err = engine.resolve_entry("bad", &ctx).await.unwrap_err();
        assert!(matches!(err, ResolveError::MalformedType { ref found, .. } if found == "42"));
    }

    #[tokio::test]
    async fn test_short_circuit_surfaces_payload() {
        let mut registry = echo_registry();
        registry.register_fn("Redirect", |_props, _ctx| async move {
            Err(ResolveError::ShortCircuit(json!({"status": 302})))
        });
        let engine = Engine::builder(registry).build();
        let snapshot = snapshot_of(&[(
            "home",
            json!({"__type": "Page", "guard": {"__type": "Redirect"}}),
        )]);
        let ctx = engine.context(snapshot);

        let out = engine.resolve_entry("home", &ctx).await.unwrap();
        assert_eq!(out, Resolved::ShortCircuit(json!({"status": 302})));
    }

    #[tokio::test]
    async fn test_override_rewrites_reference() {
        let engine = Engine::builder(echo_registry()).build();
        let snapshot = snapshot_of(&[
            ("home", json!({"__type": "Page", "hero": {"__ref": "hero"}})),
            ("hero", json!({"__type": "Hero", "image": "default.png"})),
            ("hero-b", json!({"__type": "Hero", "image": "variant.png"})),
        ]);
        let overrides = [("hero".to_string(), "hero-b".to_string())]
            .into_iter()
            .collect();
        let ctx = engine.context_with_overrides(snapshot, overrides);

        let out = engine.resolve_entry("home", &ctx).await.unwrap();
        assert_eq!(
            out,
            Resolved::Value(json!({"hero": {"image": "variant.png"}}))
        );
    }

    #[tokio::test]
    async fn test_composite_resolver_recurses_via_context() {
        let mut registry = echo_registry();
        registry.register_fn("Embed", |props, ctx| async move {
            let id = props
                .get("entry")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            ctx.resolve_ref(&id).await
        });
        let engine = Engine::builder(registry).build();
        let snapshot = snapshot_of(&[
            ("outer", json!({"__type": "Embed", "entry": "inner"})),
            ("inner", json!({"__type": "Page", "title": "nested"})),
        ]);
        let ctx = engine.context(snapshot);

        let out = engine.resolve_entry("outer", &ctx).await.unwrap();
        assert_eq!(out, Resolved::Value(json!({"title": "nested"})));
    }

    #[tokio::test]
    async fn test_depth_limit_enforced() {
        let mut registry = ResolverRegistry::new();
        registry.register_fn("Wrap", |props, _ctx| async move { Ok(props) });
        let engine = Engine::builder(registry).max_depth(4).build();

        let deep = json!({"__type": "Wrap", "inner": {"__type": "Wrap", "inner": {"__type": "Wrap", "inner": {"__type": "Wrap", "inner": 1}}}});
        let snapshot = snapshot_of(&[("deep", deep)]);
        let ctx = engine.context(snapshot);

        let err = engine.resolve_entry("deep", &ctx).await.unwrap_err();
        assert!(matches!(err, ResolveError::DepthExceeded { limit: 4, .. }));
    }
}
