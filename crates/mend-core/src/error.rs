//! Error types for Mend Core
//!
//! Provides error handling for:
//! - External tool invocation (missing binaries, timeouts, I/O)
//! - Collaborator failures (scanner, analyzer, fixer)
//! - Configuration loading and validation

use std::path::PathBuf;

/// Failure to run an external tool (compiler, interpreter).
///
/// `Unavailable` is a degraded condition rather than a hard failure: callers
/// treat the check as skipped.
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    /// Binary not found on `PATH`
    #[error("tool unavailable: {tool}")]
    Unavailable {
        /// Program that could not be spawned
        tool: String,
    },

    /// Process exceeded its deadline and was killed
    #[error("{tool} timed out after {secs}s")]
    Timeout {
        /// Program that timed out
        tool: String,
        /// Deadline in seconds
        secs: u64,
    },

    /// Spawning or talking to the process failed
    #[error("failed to run {tool}: {source}")]
    Io {
        /// Program being run
        tool: String,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

impl ToolError {
    /// Check if the tool was simply not installed
    #[inline]
    #[must_use]
    pub fn is_unavailable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }

    /// Check if the tool hit its deadline
    #[inline]
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Failure reported by an external collaborator (scanner, analyzer, fixer).
#[derive(Debug, thiserror::Error)]
pub enum CollaboratorError {
    /// Collaborator rejected its input
    #[error("invalid input for {collaborator}: {reason}")]
    InvalidInput {
        /// Collaborator name
        collaborator: String,
        /// Reason given
        reason: String,
    },

    /// Collaborator failed while working
    #[error("{collaborator} failed: {reason}")]
    Failed {
        /// Collaborator name
        collaborator: String,
        /// Reason given
        reason: String,
    },

    /// Underlying tool error
    #[error(transparent)]
    Tool(#[from] ToolError),
}

impl CollaboratorError {
    /// Create a generic failure
    #[inline]
    pub fn failed(collaborator: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            collaborator: collaborator.into(),
            reason: reason.into(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("cannot read config {path}: {source}")]
    Read {
        /// Config path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or shape error
    #[error("invalid TOML config: {0}")]
    Toml(#[from] toml::de::Error),

    /// YAML syntax or shape error
    #[error("invalid YAML config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Unsupported file extension
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// Value out of range
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Offending field
        field: &'static str,
        /// Why it was rejected
        reason: String,
    },
}
