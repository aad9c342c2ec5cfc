//! File identity resolution
//!
//! Scanners, fixers and the original input disagree on how a file is named:
//! absolute vs. relative, forward vs. backslashes, full path vs. basename.
//! [`resolve`] maps a requested name onto one key of a candidate map using a
//! fixed priority order, first hit wins:
//!
//! 1. exact key
//! 2. basename equality (in candidate order)
//! 3. normalized bidirectional substring containment (in candidate order)
//! 4. the only candidate, when there is exactly one
//!
//! Candidate maps are [`IndexMap`]s so "candidate order" is well defined.

use crate::types::basename;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Which rule produced a match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchTier {
    /// Keys are identical
    Exact,
    /// Final path components are identical
    Basename,
    /// One normalized path contains the other
    Substring,
    /// Only one candidate exists
    Singleton,
}

/// A successful resolution
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resolved<'a, V> {
    /// Matched candidate key
    pub key: &'a str,
    /// Matched candidate value
    pub value: &'a V,
    /// Rule that matched
    pub tier: MatchTier,
}

/// Resolve `requested` against `candidates`.
///
/// Returns `None` when nothing matches; callers decide how to record that.
/// A request that is empty after normalization never takes the substring
/// tier, since every key would contain it; it can still match exactly, by
/// basename, or as the only candidate.
pub fn resolve<'a, V>(requested: &str, candidates: &'a IndexMap<String, V>) -> Option<Resolved<'a, V>> {
    let found = resolve_inner(requested, candidates);
    match &found {
        Some(hit) => tracing::debug!(requested, key = hit.key, tier = ?hit.tier, "resolved file"),
        None => tracing::debug!(requested, candidates = candidates.len(), "no file matched"),
    }
    found
}

fn resolve_inner<'a, V>(requested: &str, candidates: &'a IndexMap<String, V>) -> Option<Resolved<'a, V>> {
    let hit = |key: &'a String, value: &'a V, tier| Resolved {
        key: key.as_str(),
        value,
        tier,
    };

    if let Some((key, value)) = candidates.get_key_value(requested) {
        return Some(hit(key, value, MatchTier::Exact));
    }

    let wanted = basename(requested);
    if let Some((key, value)) = candidates.iter().find(|(k, _)| basename(k) == wanted) {
        return Some(hit(key, value, MatchTier::Basename));
    }

    let needle = normalize(requested);
    if !needle.is_empty() {
        let contained = candidates.iter().find(|(k, _)| {
            let key = normalize(k);
            !key.is_empty() && (key.contains(&needle) || needle.contains(&key))
        });
        if let Some((key, value)) = contained {
            return Some(hit(key, value, MatchTier::Substring));
        }
    }

    if candidates.len() == 1 {
        let (key, value) = candidates.first()?;
        return Some(hit(key, value, MatchTier::Singleton));
    }

    None
}

/// Backslashes to slashes, lowercase
#[must_use]
pub fn normalize(path: &str) -> String {
    path.replace('\\', "/").to_lowercase()
}
