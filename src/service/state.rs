//! Shared service state.

use std::sync::Arc;

use crate::audience::Audience;
use crate::evaluator::Engine;
use crate::store::ConfigStore;

/// Shared state behind every request: the engine, the config store, and
/// the ordered audience list evaluated per request.
#[derive(Clone)]
pub struct ServiceState {
    /// The resolution engine (registry, hints, recovery, limits).
    pub engine: Engine,
    /// The config store serving snapshots.
    pub store: Arc<ConfigStore>,
    /// Ordered audiences folded against each request's profile.
    pub audiences: Arc<Vec<Audience>>,
}

impl ServiceState {
    /// State with no audiences configured.
    pub fn new(engine: Engine, store: Arc<ConfigStore>) -> Self {
        Self {
            engine,
            store,
            audiences: Arc::new(Vec::new()),
        }
    }

    /// State with an ordered audience list.
    pub fn with_audiences(engine: Engine, store: Arc<ConfigStore>, audiences: Vec<Audience>) -> Self {
        Self {
            engine,
            store,
            audiences: Arc::new(audiences),
        }
    }
}
