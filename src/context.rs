//! Per-resolution context threaded through the whole recursive resolution.
//!
//! A context carries the resolution id, the current resolve chain, the
//! snapshot being resolved against, the active override table, ad hoc
//! extensions, and the single-flight guard for this resolution. Contexts
//! are cheap to clone (everything shared is behind `Arc`); stepping deeper
//! produces a child context so sibling branches never observe each other's
//! chains.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use uuid::Uuid;

use crate::evaluator::Engine;
use crate::singleflight::SingleFlight;
use crate::types::{ChainStep, ResolvableMap, ResolveChain, ResolveError, StoreSnapshot};

/// Per-invocation resolution state.
#[derive(Clone)]
pub struct ResolveContext {
    resolution_id: Uuid,
    chain: ResolveChain,
    snapshot: Arc<StoreSnapshot>,
    overrides: Arc<BTreeMap<String, String>>,
    extensions: Arc<BTreeMap<String, Value>>,
    flight: Arc<SingleFlight<Value, ResolveError>>,
    engine: Engine,
}

impl ResolveContext {
    pub(crate) fn new(
        engine: Engine,
        snapshot: Arc<StoreSnapshot>,
        overrides: BTreeMap<String, String>,
    ) -> Self {
        Self {
            resolution_id: Uuid::new_v4(),
            chain: ResolveChain::root(),
            snapshot,
            overrides: Arc::new(overrides),
            extensions: Arc::new(BTreeMap::new()),
            flight: Arc::new(SingleFlight::new()),
            engine,
        }
    }

    /// Unique id of this top-level resolution.
    pub fn resolution_id(&self) -> Uuid {
        self.resolution_id
    }

    /// The chain of steps taken to reach the current node.
    pub fn chain(&self) -> &ResolveChain {
        &self.chain
    }

    /// The live resolvable map of the current snapshot.
    pub fn resolvables(&self) -> &ResolvableMap {
        &self.snapshot.state
    }

    /// The read-only archived map of the current snapshot.
    pub fn archived(&self) -> &ResolvableMap {
        &self.snapshot.archived
    }

    /// Ad hoc context value added via [`extend`](Self::extend).
    pub fn extension(&self, key: &str) -> Option<&Value> {
        self.extensions.get(key)
    }

    /// A child context with `key` set for the subtree below this point.
    ///
    /// The parent's extensions are unaffected.
    pub fn extend(&self, key: impl Into<String>, value: Value) -> Self {
        let mut extensions = (*self.extensions).clone();
        extensions.insert(key.into(), value);
        Self {
            extensions: Arc::new(extensions),
            ..self.clone()
        }
    }

    /// Resolve a value in place, continuing from the current chain.
    ///
    /// This is the re-entry point for composite resolvers.
    pub async fn resolve(&self, value: Value) -> Result<Value, ResolveError> {
        self.engine.resolve_value(value, self.clone()).await
    }

    /// Resolve a value under an explicit chain.
    ///
    /// Preview tooling uses this to resolve a node found partway down an
    /// existing chain without re-walking from the root.
    pub async fn resolve_at(
        &self,
        value: Value,
        chain: ResolveChain,
    ) -> Result<Value, ResolveError> {
        let mut ctx = self.clone();
        ctx.chain = chain;
        self.engine.resolve_value(value, ctx).await
    }

    /// Resolve a store entry by id, respecting the active override table.
    pub async fn resolve_ref(&self, id: &str) -> Result<Value, ResolveError> {
        self.engine.resolve_reference(id, self).await
    }

    /// Apply the override table to a referenced id (single rewrite hop).
    pub(crate) fn rewrite(&self, id: &str) -> String {
        self.overrides
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    /// Child context for a container step (no depth accounting).
    pub(crate) fn descend(&self, step: ChainStep) -> Self {
        let mut ctx = self.clone();
        ctx.chain = self.chain.child(step);
        ctx
    }

    /// Child context entering a resolvable, enforcing the depth bound.
    pub(crate) fn enter(&self, step: ChainStep) -> Result<Self, ResolveError> {
        let limit = self.engine.max_depth();
        if self.chain.len() >= limit {
            return Err(ResolveError::DepthExceeded {
                limit,
                chain: self.chain.key(),
            });
        }
        Ok(self.descend(step))
    }

    pub(crate) fn flight(&self) -> &SingleFlight<Value, ResolveError> {
        &self.flight
    }

    /// Single-flight key for the current chain position.
    pub(crate) fn flight_key(&self) -> String {
        format!("{}:{}", self.resolution_id, self.chain.key())
    }
}

impl std::fmt::Debug for ResolveContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolveContext")
            .field("resolution_id", &self.resolution_id)
            .field("chain", &self.chain.key())
            .field("entries", &self.snapshot.state.len())
            .finish()
    }
}
