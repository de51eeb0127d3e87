//! In-memory config source for tests and fixtures.

use async_trait::async_trait;
use serde_json::Value;

use crate::types::{ResolvableMap, StoreError};

use super::ConfigSource;

/// A source serving fixed maps from memory.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    state: ResolvableMap,
    archived: ResolvableMap,
}

impl StaticSource {
    /// Empty source.
    pub fn new() -> Self {
        Self::default()
    }

    /// Source serving an existing state map.
    pub fn from_state(state: ResolvableMap) -> Self {
        Self {
            state,
            archived: ResolvableMap::new(),
        }
    }

    /// Add a live entry.
    pub fn with_entry(mut self, id: impl Into<String>, value: Value) -> Self {
        self.state.insert(id.into(), value);
        self
    }

    /// Add an archived entry.
    pub fn with_archived(mut self, id: impl Into<String>, value: Value) -> Self {
        self.archived.insert(id.into(), value);
        self
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.state.len()
    }

    /// True if no live entries exist.
    pub fn is_empty(&self) -> bool {
        self.state.is_empty()
    }
}

#[async_trait]
impl ConfigSource for StaticSource {
    async fn fetch_state(&self) -> Result<ResolvableMap, StoreError> {
        Ok(self.state.clone())
    }

    async fn fetch_archived(&self) -> Result<ResolvableMap, StoreError> {
        Ok(self.archived.clone())
    }
}
