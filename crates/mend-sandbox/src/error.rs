//! Sandbox errors
//!
//! These never escape a batch: the runner folds them into the failing
//! probe's [`crate::TestResult`].

use mend_core::ToolError;
use std::path::PathBuf;

/// Failure while preparing or running one probe
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// Temporary workspace could not be created
    #[error("cannot create sandbox directory: {0}")]
    Workspace(#[source] std::io::Error),

    /// A file could not be staged into the workspace
    #[error("cannot stage {path}: {source}")]
    Stage {
        /// Destination inside the workspace
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Probe process failed to run
    #[error(transparent)]
    Tool(#[from] ToolError),
}

impl SandboxError {
    /// Whether the probe hit its deadline
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Tool(e) if e.is_timeout())
    }
}
