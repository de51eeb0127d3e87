//! # resolve-engine
//!
//! Runtime configuration-resolution engine for declarative resolvable
//! graphs.
//!
//! The engine answers one question:
//!
//! > Given an entry point and a request context, what concrete value does
//! > this declarative graph resolve to right now?
//!
//! ## Core Contract
//!
//! 1. Walk the entry's graph depth-first, dereferencing `{"__ref": id}`
//!    values against the current store snapshot
//! 2. Dispatch tagged objects (`"__type"`) to registered resolver handlers
//!    with their reference-bearing props resolved first
//! 3. Return a concrete value, a deliberate short-circuit payload, or an
//!    error naming the resolve chain that failed
//!
//! ## Architecture
//!
//! ```text
//! Entry id → Override rewrite → Graph Evaluator → Resolver Registry
//!                  ↑                   ↓
//!           Audience selection    Hint Store / Single-Flight Guard
//!                                      ↓
//!                        ConfigStore (snapshot + retry + refresh)
//! ```
//!
//! ## Guarantees
//!
//! - Output with pregenerated hints is identical to output with on-demand
//!   shape inspection
//! - A resolver at one chain position runs at most once per resolution
//! - Snapshots are immutable pairs of `(state, archived)` replaced
//!   wholesale; readers never observe a torn pair

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod audience;
pub mod canonical;
pub mod context;
pub mod evaluator;
pub mod hints;
pub mod registry;
pub mod singleflight;
pub mod store;
pub mod types;

#[cfg(feature = "service")]
pub mod service;

// Re-exports
pub use audience::{
    rank_routes, select, Audience, AudienceMatcher, Override, RankedRoute, RequestProfile,
    Selection,
};
pub use canonical::{canonical_hash, canonical_hash_hex, to_canonical_bytes};
pub use context::ResolveContext;
pub use evaluator::{Engine, EngineBuilder, RecoveryFn, Resolved};
pub use hints::{shape_fingerprint, HintStore, InspectionCache, ShapeFingerprint};
pub use registry::{Resolver, ResolverRegistry};
pub use singleflight::SingleFlight;
pub use store::{
    CompositeSource, ConfigSource, ConfigStore, FileSource, ReadOptions, RetryPolicy,
    StaticSource,
};
pub use types::{
    ChainStep, ResolvableMap, ResolveChain, ResolveError, SnapshotStats, StoreError,
    StoreSnapshot, REF_FIELD, TYPE_FIELD,
};

// Service re-exports (when the service feature is enabled)
#[cfg(feature = "service")]
pub use service::{create_router, ServiceState};

/// Schema version for hint artifacts and state documents.
/// Increment on breaking changes to any wire shape.
pub const ENGINE_SCHEMA_VERSION: &str = "1.0.0";
