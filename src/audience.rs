//! Audience selection, override tables, and route ranking.
//!
//! An ordered list of audiences is folded against a request profile: every
//! matching audience contributes its route and override tables, and later
//! (more specific) audiences win on key conflicts. The merged routes are
//! then ranked by path-template specificity for request dispatch.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A rule substituting one resolvable reference for another.
///
/// Overrides never mutate the store; they only change which id a reference
/// looks up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Override {
    /// The id as written in the graph.
    pub instead_of: String,
    /// The id to dereference instead.
    #[serde(rename = "use")]
    pub use_id: String,
}

/// Matching rule evaluated against a request profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AudienceMatcher {
    /// Matches every request.
    Always,
    /// Matches when a profile attribute equals a value.
    Attribute {
        /// Attribute name.
        key: String,
        /// Required value.
        equals: Value,
    },
    /// Matches when all inner matchers match.
    AllOf {
        /// Inner matchers.
        matchers: Vec<AudienceMatcher>,
    },
    /// Matches when any inner matcher matches.
    AnyOf {
        /// Inner matchers.
        matchers: Vec<AudienceMatcher>,
    },
}

impl AudienceMatcher {
    /// Evaluate against a profile.
    pub fn matches(&self, profile: &RequestProfile) -> bool {
        match self {
            AudienceMatcher::Always => true,
            AudienceMatcher::Attribute { key, equals } => {
                profile.attributes.get(key) == Some(equals)
            }
            AudienceMatcher::AllOf { matchers } => matchers.iter().all(|m| m.matches(profile)),
            AudienceMatcher::AnyOf { matchers } => matchers.iter().any(|m| m.matches(profile)),
        }
    }
}

/// Request-shaped input to audience selection: a flat attribute map
/// (locale, segment, feature flags, ...).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RequestProfile {
    /// Attributes by name.
    pub attributes: BTreeMap<String, Value>,
}

impl RequestProfile {
    /// Empty profile (matches only `Always` audiences).
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style attribute insertion.
    pub fn with_attribute(mut self, key: impl Into<String>, value: Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }
}

/// An audience: a matcher plus its route and override contributions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Audience {
    /// Human-readable name (diagnostics only).
    pub name: String,
    /// Matching rule.
    pub matcher: AudienceMatcher,
    /// Path template → resolvable id.
    #[serde(default)]
    pub routes: BTreeMap<String, String>,
    /// Reference substitutions.
    #[serde(default)]
    pub overrides: Vec<Override>,
}

/// Merged output of folding audiences against a profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Selection {
    /// Merged route table, later audiences winning.
    pub routes: BTreeMap<String, String>,
    /// Merged override table keyed by `instead_of`, later audiences winning.
    pub overrides: BTreeMap<String, String>,
}

/// Fold `audiences` in order against `profile`.
///
/// Every matching audience contributes; later entries overwrite earlier
/// ones on key conflicts.
pub fn select(audiences: &[Audience], profile: &RequestProfile) -> Selection {
    let mut selection = Selection::default();
    for audience in audiences {
        if !audience.matcher.matches(profile) {
            continue;
        }
        for (template, target) in &audience.routes {
            selection
                .routes
                .insert(template.clone(), target.clone());
        }
        for rule in &audience.overrides {
            selection
                .overrides
                .insert(rule.instead_of.clone(), rule.use_id.clone());
        }
    }
    selection
}

/// A route with its ranking position resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RankedRoute {
    /// The path template, e.g. `/docs/:slug`.
    pub template: String,
    /// The resolvable id the route dispatches to.
    pub target: String,
}

/// Per-segment specificity class. Higher ranks first.
fn segment_class(segment: &str) -> u8 {
    if segment == "*" {
        0
    } else if segment.starts_with(':') {
        1
    } else {
        2
    }
}

fn specificity(template: &str) -> Vec<u8> {
    template
        .split('/')
        .filter(|s| !s.is_empty())
        .map(segment_class)
        .collect()
}

/// Rank route templates by specificity: per segment, a static literal
/// outranks a `:param`, which outranks a `*` wildcard; compared
/// segment-wise from the left, longer templates winning on a shared
/// prefix.
///
/// The ordering is total and stable: ties fall back to the original list
/// order, so identical inputs always rank identically.
pub fn rank_routes<'a, I>(routes: I) -> Vec<RankedRoute>
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    let mut ranked: Vec<(usize, Vec<u8>, RankedRoute)> = routes
        .into_iter()
        .enumerate()
        .map(|(index, (template, target))| {
            (
                index,
                specificity(template),
                RankedRoute {
                    template: template.to_string(),
                    target: target.to_string(),
                },
            )
        })
        .collect();

    ranked.sort_by(|(ai, aspec, _), (bi, bspec, _)| {
        let mut a = aspec.iter();
        let mut b = bspec.iter();
        loop {
            match (a.next(), b.next()) {
                (Some(x), Some(y)) if x == y => continue,
                // More specific segment ranks first.
                (Some(x), Some(y)) => return y.cmp(x),
                // Longer template wins on a shared prefix.
                (Some(_), None) => return std::cmp::Ordering::Less,
                (None, Some(_)) => return std::cmp::Ordering::Greater,
                (None, None) => return ai.cmp(bi),
            }
        }
    });

    ranked.into_iter().map(|(_, _, route)| route).collect()
}

impl Selection {
    /// The merged routes ranked for dispatch.
    pub fn ranked_routes(&self) -> Vec<RankedRoute> {
        rank_routes(
            self.routes
                .iter()
                .map(|(t, target)| (t.as_str(), target.as_str())),
        )
    }
}
