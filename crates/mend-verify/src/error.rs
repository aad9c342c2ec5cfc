//! Verifier errors
//!
//! Missing tools, timeouts and tools that cannot run on one file are not
//! errors here; they degrade to skipped or failed checks on that file. What
//! remains are harness failures that make a round's verification meaningless.

use mend_core::ToolError;

/// Verification could not be carried out
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    /// A check could not be run for reasons unrelated to the file under test
    #[error("verification of {file} failed: {source}")]
    Harness {
        /// File being verified
        file: String,
        /// Underlying tool error
        #[source]
        source: ToolError,
    },
}
