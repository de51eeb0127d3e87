//! Core types for the resolution engine.

pub mod chain;
pub mod error;
pub mod resolvable;
pub mod snapshot;

pub use chain::{ChainStep, ResolveChain};
pub use error::{ResolveError, StoreError};
pub use resolvable::{
    is_reference_bearing, make_ref, ref_id, reference_props, type_tag, ResolvableMap, REF_FIELD,
    TYPE_FIELD,
};
pub use snapshot::{SnapshotStats, StoreSnapshot};
