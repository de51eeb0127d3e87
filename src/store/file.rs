//! Config source backed by a JSON document on disk.
//!
//! Document layout:
//!
//! ```json
//! {
//!   "state":    { "<id>": { "__type": "...", ... }, ... },
//!   "archived": { "<id>": { ... }, ... }
//! }
//! ```
//!
//! Both sections are optional; a missing section reads as an empty map.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::{ResolvableMap, StoreError};

use super::ConfigSource;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StateDocument {
    #[serde(default)]
    state: ResolvableMap,
    #[serde(default)]
    archived: ResolvableMap,
}

/// A source reading the state document from a file on every fetch.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    /// Source reading from `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_document(&self) -> Result<StateDocument, StoreError> {
        let bytes = tokio::fs::read(&self.path)
            .await
            .map_err(|e| StoreError::Fetch(format!("read {}: {e}", self.path.display())))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| StoreError::Fetch(format!("parse {}: {e}", self.path.display())))
    }
}

#[async_trait]
impl ConfigSource for FileSource {
    async fn fetch_state(&self) -> Result<ResolvableMap, StoreError> {
        Ok(self.read_document().await?.state)
    }

    async fn fetch_archived(&self) -> Result<ResolvableMap, StoreError> {
        Ok(self.read_document().await?.archived)
    }
}
