//! Error taxonomy for resolution and store reads.

use serde_json::Value;

/// Errors raised while resolving an entry.
///
/// `Clone` is required so the single-flight guard can deliver one failure
/// to every waiter; fault payloads are therefore carried as strings.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ResolveError {
    /// A type tag has no registry entry and no recovery hook is configured.
    #[error("no resolver registered for type `{tag}` at {chain}")]
    UnregisteredType {
        /// The unmatched type tag.
        tag: String,
        /// Chain key identifying the offending node.
        chain: String,
    },

    /// The reserved type field holds a non-string value.
    #[error("type field holds non-string value `{found}` at {chain}")]
    MalformedType {
        /// JSON rendering of the offending value.
        found: String,
        /// Chain key identifying the offending node.
        chain: String,
    },

    /// A referenced id is absent from the current snapshot and no recovery
    /// hook is configured.
    #[error("referenced entry `{id}` not found at {chain}")]
    MissingReference {
        /// The missing entry id.
        id: String,
        /// Chain key identifying the offending reference.
        chain: String,
    },

    /// The chain re-entered a store id it already passed through.
    #[error("cycle detected: `{id}` re-entered at {chain}")]
    CycleDetected {
        /// The id that closed the cycle.
        id: String,
        /// Chain key at the point of re-entry.
        chain: String,
    },

    /// The chain grew past the configured depth bound.
    #[error("resolve depth limit {limit} exceeded at {chain}")]
    DepthExceeded {
        /// Configured maximum chain length.
        limit: usize,
        /// Chain key at the point of failure.
        chain: String,
    },

    /// A resolver's own logic failed.
    #[error("resolver fault at {chain}: {message}")]
    Fault {
        /// Description of the failure.
        message: String,
        /// Chain key of the faulting resolver.
        chain: String,
    },

    /// Deliberate early termination carrying a final output value.
    ///
    /// Not a failure: the evaluator unwinds the in-progress resolution and
    /// the top level returns the payload to the original caller.
    #[error("resolution short-circuited")]
    ShortCircuit(Value),

    /// A store read failed before resolution could start.
    #[error("store read failed: {0}")]
    Store(String),
}

impl ResolveError {
    /// Convenience constructor for resolver-authored faults.
    pub fn fault(message: impl Into<String>, chain: impl Into<String>) -> Self {
        Self::Fault {
            message: message.into(),
            chain: chain.into(),
        }
    }

    /// True for the two dangling conditions that route through recovery.
    pub fn is_dangling(&self) -> bool {
        matches!(
            self,
            Self::UnregisteredType { .. } | Self::MissingReference { .. }
        )
    }
}

/// Errors raised by config store reads.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// First load (or a forced-fresh read) exhausted its retry budget.
    #[error("store unavailable after {attempts} attempts: {last_error}")]
    Unavailable {
        /// Number of fetch attempts made.
        attempts: u32,
        /// The last observed fetch error.
        last_error: String,
    },

    /// A single fetch from the underlying source failed.
    #[error("fetch failed: {0}")]
    Fetch(String),

    /// A push subscription channel failed.
    #[error("subscription failed: {0}")]
    Subscription(String),
}

impl From<StoreError> for ResolveError {
    fn from(err: StoreError) -> Self {
        ResolveError::Store(err.to_string())
    }
}
