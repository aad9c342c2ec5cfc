//! Rescan diff and fix-rate estimate
//!
//! After a fix, a rescan's issues are split by [`IssueSignature`]: those whose
//! signature existed before the fix are *remaining*, the rest are *new*.
//! Without a rescan the assessed rate falls back to a coarse estimate.

use mend_core::{FixStatus, Issue, IssueSignature};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Post-fix issues split against the pre-fix set
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RescanDiff {
    /// Post-fix issues already present before the fix
    pub remaining: Vec<Issue>,
    /// Post-fix issues not present before the fix
    pub new: Vec<Issue>,
}

impl RescanDiff {
    /// Split `post` against `original`
    #[must_use]
    pub fn compute(original: &[Issue], post: &[Issue]) -> Self {
        let before: HashSet<IssueSignature> = original.iter().map(Issue::signature).collect();
        let (remaining, new) = post
            .iter()
            .cloned()
            .partition(|issue| before.contains(&issue.signature()));
        Self { remaining, new }
    }

    /// Fixed issues implied by the diff
    #[inline]
    #[must_use]
    pub fn fixed_count(&self, original_count: usize) -> usize {
        original_count.saturating_sub(self.remaining.len())
    }

    /// `fixed / original * 100`; with no original issues, 100 only if nothing remains
    #[must_use]
    pub fn fix_rate(&self, original_count: usize) -> f64 {
        if original_count == 0 {
            return if self.remaining.is_empty() { 100.0 } else { 0.0 };
        }
        100.0 * self.fixed_count(original_count) as f64 / original_count as f64
    }
}

/// Rate used when no rescan is available
#[must_use]
pub fn estimated_fix_rate(original_count: usize, compiled: bool, status: FixStatus) -> f64 {
    if original_count == 0 {
        100.0
    } else if !compiled {
        0.0
    } else if status == FixStatus::Fixed {
        90.0
    } else {
        70.0
    }
}
