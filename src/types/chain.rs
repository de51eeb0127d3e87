//! Resolve chain: the ordered breadcrumb of steps taken to reach a node.
//!
//! The chain serves three roles:
//!
//! 1. Deterministic identity for a subtree: the single-flight guard keys
//!    on `(resolution id, chain key)`.
//! 2. Addressing scheme for diagnostics and preview tooling
//!    (`ResolveContext::resolve_at`).
//! 3. Cycle detection: a repeated `Enter` of the same store id means the
//!    graph loops back on itself. `Dispatch` steps record which resolver
//!    ran at a position and never participate in cycle detection, since
//!    one type tag legitimately recurs all over a graph.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One step on a resolve chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ChainStep {
    /// Dereferenced a store entry by id.
    Enter(String),
    /// Dispatched a tagged object to the resolver named by its type tag.
    Dispatch(String),
    /// Read a named property.
    Prop(String),
    /// Read an array element.
    Index(usize),
}

impl fmt::Display for ChainStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChainStep::Enter(name) | ChainStep::Dispatch(name) => write!(f, ">{name}"),
            ChainStep::Prop(name) => write!(f, ".{name}"),
            ChainStep::Index(i) => write!(f, "[{i}]"),
        }
    }
}

/// Ordered sequence of steps from the resolution root to the current node.
///
/// Chains are short and cloned freely; pushing a step produces a new chain
/// so sibling branches never observe each other's steps.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolveChain(Vec<ChainStep>);

impl ResolveChain {
    /// The empty chain at the resolution root.
    pub fn root() -> Self {
        Self::default()
    }

    /// Build a chain from explicit steps (preview tooling).
    pub fn from_steps(steps: Vec<ChainStep>) -> Self {
        Self(steps)
    }

    /// A new chain with `step` appended.
    pub fn child(&self, step: ChainStep) -> Self {
        let mut steps = self.0.clone();
        steps.push(step);
        Self(steps)
    }

    /// The steps in root-to-leaf order.
    pub fn steps(&self) -> &[ChainStep] {
        &self.0
    }

    /// Number of steps on the chain.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the root chain.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// True if the chain already dereferenced the store entry named `name`.
    ///
    /// Only `Enter` steps count; `Dispatch` steps carry type tags, which
    /// share a namespace with nothing.
    pub fn has_entered(&self, name: &str) -> bool {
        self.0
            .iter()
            .any(|s| matches!(s, ChainStep::Enter(n) if n == name))
    }

    /// Stable string rendering, used as cache and single-flight key.
    ///
    /// The root renders as `$`; steps append as `>entry`, `.prop`, `[i]`.
    pub fn key(&self) -> String {
        let mut out = String::from("$");
        for step in &self.0 {
            out.push_str(&step.to_string());
        }
        out
    }
}

impl fmt::Display for ResolveChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}
