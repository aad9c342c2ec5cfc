//! Errors that end a round
//!
//! A [`PipelineError`] never escapes [`crate::RoundOrchestrator::run`]: it is
//! recorded on the failing round and in the final report.

use crate::stage::StageError;
use mend_core::CollaboratorError;
use mend_verify::VerifyError;

/// Failure inside a round
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// Scanner failed
    #[error("scan failed: {0}")]
    Scan(#[source] CollaboratorError),

    /// Analyzer failed
    #[error("analysis failed: {0}")]
    Analyze(#[source] CollaboratorError),

    /// Fixer failed as a whole
    #[error("fix failed: {0}")]
    Fix(#[source] CollaboratorError),

    /// Verifier could not run
    #[error(transparent)]
    Verify(#[from] VerifyError),

    /// Stage machine rejected a move
    #[error(transparent)]
    Stage(#[from] StageError),
}

impl PipelineError {
    /// Whether an external collaborator caused the failure
    #[inline]
    #[must_use]
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(self, Self::Scan(_) | Self::Analyze(_) | Self::Fix(_))
    }
}
