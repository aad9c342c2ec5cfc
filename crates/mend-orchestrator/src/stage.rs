//! Pipeline stage machine
//!
//! ```text
//! INIT → SCAN → ANALYZE → FIX → VERIFY → { CONVERGED | RETRY }
//! RETRY → FIX → VERIFY → ...
//! any non-terminal stage → TERMINATED
//! ```
//!
//! Disabled stages are skipped, so forward jumps (for example `INIT → FIX`)
//! are allowed. Backward moves other than `RETRY → FIX` are not.

use serde::{Deserialize, Serialize};

/// Stage of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PipelineStage {
    /// Nothing has run yet
    Init,
    /// Static scan (round 0 only)
    Scan,
    /// Issue analysis (round 0 only)
    Analyze,
    /// Fixer running
    Fix,
    /// Verifier running
    Verify,
    /// No dynamic issues left
    Converged,
    /// Dynamic issues left and budget remains
    Retry,
    /// Run finished
    Terminated,
}

/// Illegal stage change
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StageError {
    /// Transition not in the table
    #[error("illegal stage transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current stage
        from: PipelineStage,
        /// Requested stage
        to: PipelineStage,
    },
}

/// Validates a stage transition.
pub fn validate_transition(from: PipelineStage, to: PipelineStage) -> Result<(), StageError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(StageError::IllegalTransition { from, to })
    }
}

/// Stages reachable in one step from `from`
#[must_use]
pub fn allowed_transitions(from: PipelineStage) -> Vec<PipelineStage> {
    match from {
        PipelineStage::Init => vec![
            PipelineStage::Scan,
            PipelineStage::Analyze,
            PipelineStage::Fix,
            PipelineStage::Verify,
            PipelineStage::Terminated,
        ],
        PipelineStage::Scan => vec![
            PipelineStage::Analyze,
            PipelineStage::Fix,
            PipelineStage::Verify,
            PipelineStage::Terminated,
        ],
        PipelineStage::Analyze => vec![PipelineStage::Fix, PipelineStage::Verify, PipelineStage::Terminated],
        PipelineStage::Fix => vec![PipelineStage::Verify, PipelineStage::Terminated],
        PipelineStage::Verify => vec![PipelineStage::Converged, PipelineStage::Retry, PipelineStage::Terminated],
        PipelineStage::Retry => vec![PipelineStage::Fix, PipelineStage::Verify, PipelineStage::Terminated],
        PipelineStage::Converged => vec![PipelineStage::Terminated],
        PipelineStage::Terminated => vec![],
    }
}

/// Current stage plus the trace of every stage entered
#[derive(Debug, Clone)]
pub struct StageTracker {
    current: PipelineStage,
    trace: Vec<PipelineStage>,
}

impl StageTracker {
    /// Start at `INIT`
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: PipelineStage::Init,
            trace: vec![PipelineStage::Init],
        }
    }

    /// Current stage
    #[inline]
    #[must_use]
    pub fn current(&self) -> PipelineStage {
        self.current
    }

    /// Move to `to` if the table allows it
    pub fn advance(&mut self, to: PipelineStage) -> Result<(), StageError> {
        validate_transition(self.current, to)?;
        tracing::debug!(from = ?self.current, ?to, "stage transition");
        self.current = to;
        self.trace.push(to);
        Ok(())
    }

    /// Move to `TERMINATED`; a no-op if already there
    pub fn terminate(&mut self) {
        if self.current != PipelineStage::Terminated {
            self.current = PipelineStage::Terminated;
            self.trace.push(PipelineStage::Terminated);
        }
    }

    /// Stages entered so far, starting with `INIT`
    #[must_use]
    pub fn into_trace(self) -> Vec<PipelineStage> {
        self.trace
    }
}

impl Default for StageTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_pipeline_path_is_legal() {
        let mut tracker = StageTracker::new();
        for stage in [
            PipelineStage::Scan,
            PipelineStage::Analyze,
            PipelineStage::Fix,
            PipelineStage::Verify,
            PipelineStage::Retry,
            PipelineStage::Fix,
            PipelineStage::Verify,
            PipelineStage::Converged,
        ] {
            tracker.advance(stage).unwrap();
        }
        tracker.terminate();
        assert_eq!(tracker.current(), PipelineStage::Terminated);
        assert_eq!(tracker.into_trace().len(), 10);
    }

    #[test]
    fn scan_cannot_run_after_fix() {
        assert!(validate_transition(PipelineStage::Fix, PipelineStage::Scan).is_err());
        assert!(validate_transition(PipelineStage::Retry, PipelineStage::Analyze).is_err());
        assert!(validate_transition(PipelineStage::Converged, PipelineStage::Fix).is_err());
    }

    #[test]
    fn terminated_is_final() {
        assert!(allowed_transitions(PipelineStage::Terminated).is_empty());
        let mut tracker = StageTracker::new();
        tracker.terminate();
        tracker.terminate();
        assert_eq!(tracker.into_trace(), vec![PipelineStage::Init, PipelineStage::Terminated]);
    }
}
