//! Resolver registry: type tag → executable handler.
//!
//! Handlers are registered by the embedding application (rendering layer,
//! route handler layer). Dispatch is an explicit map lookup by tag, not
//! reflection, so every call site stays statically checkable.

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::context::ResolveContext;
use crate::types::ResolveError;

/// A registered handler bound to a type tag.
///
/// Receives the already-resolved props of its resolvable (reserved fields
/// stripped) and the current context. A resolver may call back into the
/// engine via [`ResolveContext::resolve`] to implement composite handlers,
/// and may abort the whole resolution with
/// [`ResolveError::ShortCircuit`].
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Execute the handler with resolved props.
    async fn run(&self, props: Value, ctx: ResolveContext) -> Result<Value, ResolveError>;
}

/// Adapter exposing an async closure as a [`Resolver`].
struct FnResolver<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Resolver for FnResolver<F>
where
    F: Fn(Value, ResolveContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<Value, ResolveError>> + Send + 'static,
{
    async fn run(&self, props: Value, ctx: ResolveContext) -> Result<Value, ResolveError> {
        (self.f)(props, ctx).await
    }
}

/// Mapping from type tag to handler.
#[derive(Clone, Default)]
pub struct ResolverRegistry {
    handlers: BTreeMap<String, Arc<dyn Resolver>>,
}

impl ResolverRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for `tag`, replacing any previous one.
    pub fn register(&mut self, tag: impl Into<String>, resolver: Arc<dyn Resolver>) {
        self.handlers.insert(tag.into(), resolver);
    }

    /// Register an async closure for `tag`.
    pub fn register_fn<F, Fut>(&mut self, tag: impl Into<String>, f: F)
    where
        F: Fn(Value, ResolveContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, ResolveError>> + Send + 'static,
    {
        self.register(tag, Arc::new(FnResolver { f }));
    }

    /// Look up the handler for `tag`.
    pub fn get(&self, tag: &str) -> Option<Arc<dyn Resolver>> {
        self.handlers.get(tag).cloned()
    }

    /// True if a handler is registered for `tag`.
    pub fn contains(&self, tag: &str) -> bool {
        self.handlers.contains_key(tag)
    }

    /// All registered tags, sorted.
    pub fn tags(&self) -> Vec<&str> {
        self.handlers.keys().map(String::as_str).collect()
    }

    /// Number of registered handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for ResolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolverRegistry")
            .field("tags", &self.tags())
            .finish()
    }
}
