//! Mend Core - shared foundation of the repair pipeline
//!
//! Provides:
//! - The data model flowing between stages (files, issues, fix records)
//! - Collaborator boundaries (scanner, analyzer, fixer) as async traits
//! - File identity resolution across inconsistent path conventions
//! - Pipeline configuration (TOML/YAML)
//! - Subprocess execution under hard deadlines
//!
//! # Example
//!
//! ```rust
//! use indexmap::IndexMap;
//! use mend_core::{resolve, FileRecord};
//!
//! let mut files = IndexMap::new();
//! files.insert("src/Foo.java".to_string(), FileRecord::new("src/Foo.java", "class Foo {}"));
//! files.insert("lib/Foo.java".to_string(), FileRecord::new("lib/Foo.java", "class Foo {}"));
//!
//! let hit = resolve("Foo.java", &files).unwrap();
//! assert_eq!(hit.key, "src/Foo.java");
//! ```

#![warn(unreachable_pub)]

pub mod boundary;
pub mod config;
pub mod error;
pub mod process;
pub mod resolver;
pub mod types;

// Re-exports for convenience
pub use boundary::{
    Analysis, Analyzer, FixGuidance, FixInput, FixOptions, FixOutcome, Fixer, GroupingAnalyzer,
    LanguageAnalysis, LanguageFixer, LanguageScan, ScanResults, ScanSummary, Scanner,
    SeverityCounts,
};
pub use config::{
    FixRateWeights, FixerConfig, ForceOnEmpty, PipelineConfig, SandboxConfig, StageToggles,
    VerifierConfig,
};
pub use error::{CollaboratorError, ConfigError, ToolError};
pub use process::{CommandOutput, CommandSpec};
pub use resolver::{resolve, MatchTier, Resolved};
pub use types::{
    basename, FileRecord, FixBatch, FixMethod, FixRecord, FixStatus, FixSummary, FunctionalCase,
    Issue, IssueSignature, Language, Severity,
};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for working with Mend Core
    pub use crate::{
        resolve, Analysis, CollaboratorError, FileRecord, FixBatch, FixInput, FixRecord, Fixer,
        Issue, Language, PipelineConfig, Scanner, Severity,
    };
}

/// Build an insertion-ordered map of files keyed by path
#[must_use]
pub fn file_map(files: &[FileRecord]) -> indexmap::IndexMap<String, FileRecord> {
    files.iter().map(|f| (f.path.clone(), f.clone())).collect()
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
