//! Composition of several config sources into one logical source.
//!
//! `state`/`archived` of the composition is the shallow merge of all
//! constituents fetched in parallel, with later sources in the list
//! overriding earlier ones on id conflicts. Any constituent failure
//! propagates as a standard store-read failure for the whole read.

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;

use crate::types::{ResolvableMap, StoreError};

use super::ConfigSource;

/// Ordered list of sources merged later-wins.
pub struct CompositeSource {
    sources: Vec<Arc<dyn ConfigSource>>,
}

impl CompositeSource {
    /// Compose `sources`; later entries win on id conflicts.
    pub fn new(sources: Vec<Arc<dyn ConfigSource>>) -> Self {
        Self { sources }
    }

    /// Number of constituent sources.
    pub fn len(&self) -> usize {
        self.sources.len()
    }

    /// True if the composition is empty (reads yield empty maps).
    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    fn merge(maps: Vec<ResolvableMap>) -> ResolvableMap {
        let mut merged = ResolvableMap::new();
        // `try_join_all` preserves list order, so later sources overwrite.
        for map in maps {
            merged.extend(map);
        }
        merged
    }
}

#[async_trait]
impl ConfigSource for CompositeSource {
    async fn fetch_state(&self) -> Result<ResolvableMap, StoreError> {
        let maps = try_join_all(self.sources.iter().map(|s| s.fetch_state())).await?;
        Ok(Self::merge(maps))
    }

    async fn fetch_archived(&self) -> Result<ResolvableMap, StoreError> {
        let maps = try_join_all(self.sources.iter().map(|s| s.fetch_archived())).await?;
        Ok(Self::merge(maps))
    }
}
