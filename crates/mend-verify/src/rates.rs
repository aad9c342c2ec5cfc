//! Fix-rate arithmetic
//!
//! Per file:
//!
//! ```text
//! remaining = max(0, original - fixed)
//! fix_rate  = 100 * fixed / max(1, original + new)
//! ```
//!
//! Aggregate over N files:
//!
//! ```text
//! compile_rate = compiled / max(1, N)
//! test_rate    = tests_passed / max(1, N)
//! traditional  = 100 * Σfixed / max(1, Σoriginal + Σnew)
//! dynamic      = 100 * (compile_share * compile_rate + (1 - compile_share) * test_rate)
//! total        = w_traditional * traditional + w_dynamic * dynamic
//! weighted     = 100 * mean(fix_rate/100 * exp(-penalty * remaining / (original + 1)))
//! ```
//!
//! Rates are clamped to `[0, 100]` so over-reporting fixers cannot push them out of range.

use mend_core::FixRateWeights;
use serde::{Deserialize, Serialize};

/// Counts for one verified file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTally {
    /// Issues planned for the file
    pub original: usize,
    /// Issues fixed
    pub fixed: usize,
    /// Issues introduced
    pub new: usize,
    /// Compile check passed or was skipped
    pub compiled: bool,
    /// Functional cases passed (or there were none)
    pub tests_passed: bool,
}

impl FileTally {
    /// Issues left after the fix
    #[inline]
    #[must_use]
    pub fn remaining(&self) -> usize {
        remaining_count(self.original, self.fixed)
    }

    /// Per-file fix rate
    #[inline]
    #[must_use]
    pub fn fix_rate(&self) -> f64 {
        file_fix_rate(self.fixed, self.original, self.new)
    }
}

/// `max(0, original - fixed)`
#[inline]
#[must_use]
pub fn remaining_count(original: usize, fixed: usize) -> usize {
    original.saturating_sub(fixed)
}

/// `100 * fixed / max(1, original + new)`, clamped to `[0, 100]`
#[must_use]
pub fn file_fix_rate(fixed: usize, original: usize, new: usize) -> f64 {
    percent(fixed, original + new)
}

fn percent(numerator: usize, denominator: usize) -> f64 {
    (100.0 * numerator as f64 / denominator.max(1) as f64).clamp(0.0, 100.0)
}

/// Aggregate rates for one round
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct FixRates {
    /// Share of files that compiled, in `[0, 1]`
    pub compile_rate: f64,
    /// Share of files whose functional cases passed, in `[0, 1]`
    pub test_rate: f64,
    /// Issue-count based rate
    pub traditional_fix_rate: f64,
    /// Compile/test based rate
    pub dynamic_fix_rate: f64,
    /// Weighted blend of traditional and dynamic
    pub total_fix_rate: f64,
    /// Mean per-file rate penalised by remaining issues
    pub weighted_fix_rate: f64,
}

/// Computes [`FixRates`] with configurable weights
#[derive(Debug, Clone, Copy, Default)]
pub struct FixRateCalculator {
    weights: FixRateWeights,
}

impl FixRateCalculator {
    /// Create with weights
    #[inline]
    #[must_use]
    pub fn new(weights: FixRateWeights) -> Self {
        Self { weights }
    }

    /// Aggregate a round's tallies
    #[must_use]
    pub fn aggregate(&self, tallies: &[FileTally]) -> FixRates {
        let n = tallies.len();
        let denom = n.max(1) as f64;
        let compiled = tallies.iter().filter(|t| t.compiled).count();
        let tests_ok = tallies.iter().filter(|t| t.tests_passed).count();
        let compile_rate = compiled as f64 / denom;
        let test_rate = tests_ok as f64 / denom;

        let fixed: usize = tallies.iter().map(|t| t.fixed).sum();
        let original: usize = tallies.iter().map(|t| t.original).sum();
        let new: usize = tallies.iter().map(|t| t.new).sum();
        let traditional_fix_rate = percent(fixed, original + new);

        let share = self.weights.compile_share;
        let dynamic_fix_rate =
            (100.0 * (share * compile_rate + (1.0 - share) * test_rate)).clamp(0.0, 100.0);
        let total_fix_rate = (self.weights.traditional * traditional_fix_rate
            + self.weights.dynamic * dynamic_fix_rate)
            .clamp(0.0, 100.0);

        let weighted_fix_rate = if n == 0 {
            0.0
        } else {
            let sum: f64 = tallies
                .iter()
                .map(|t| {
                    let decay = (-self.weights.remaining_penalty * t.remaining() as f64
                        / (t.original as f64 + 1.0))
                        .exp();
                    t.fix_rate() / 100.0 * decay
                })
                .sum();
            (100.0 * sum / n as f64).clamp(0.0, 100.0)
        };

        FixRates {
            compile_rate,
            test_rate,
            traditional_fix_rate,
            dynamic_fix_rate,
            total_fix_rate,
            weighted_fix_rate,
        }
    }
}

/// Total fix rate as reported for a round: zero unless every file compiled
#[inline]
#[must_use]
pub fn headline_total_fix_rate(rates: &FixRates, all_compiled: bool) -> f64 {
    if all_compiled {
        rates.total_fix_rate
    } else {
        0.0
    }
}
