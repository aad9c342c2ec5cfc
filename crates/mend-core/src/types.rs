//! Core data model shared by every stage of a repair pipeline
//!
//! - [`FileRecord`]: a logical source file as seen by one stage
//! - [`Issue`] and [`IssueSignature`]: defects and their stable identity
//! - [`FixRecord`] and [`FixBatch`]: per-file repair outcomes
//! - [`FunctionalCase`]: stdin/stdout cases used by the verifier

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Languages the pipeline knows how to route
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    /// Python 3
    Python,
    /// Java
    Java,
    /// C++
    Cpp,
    /// C
    C,
    /// Anything else (assets, configs, unsupported sources)
    Unknown,
}

impl Language {
    /// All routable languages, in dispatch order
    pub const SOURCE_LANGUAGES: [Language; 4] =
        [Language::Python, Language::Java, Language::Cpp, Language::C];

    /// Get file extensions for this language
    #[inline]
    #[must_use]
    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            Language::Python => &["py"],
            Language::Java => &["java"],
            Language::Cpp => &["cpp", "cc", "cxx", "hpp", "hh"],
            Language::C => &["c", "h"],
            Language::Unknown => &[],
        }
    }

    /// Get lowercase name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Java => "java",
            Language::Cpp => "cpp",
            Language::C => "c",
            Language::Unknown => "unknown",
        }
    }

    /// Detect language from a path's extension
    #[must_use]
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        let Some(ext) = path.as_ref().extension().and_then(|e| e.to_str()) else {
            return Language::Unknown;
        };
        let ext = ext.to_ascii_lowercase();
        Self::SOURCE_LANGUAGES
            .into_iter()
            .find(|lang| lang.extensions().contains(&ext.as_str()))
            .unwrap_or(Language::Unknown)
    }

    /// Whether files of this language are source code (vs. assets)
    #[inline]
    #[must_use]
    pub fn is_source(&self) -> bool {
        !matches!(self, Language::Unknown)
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unrecognised language name
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown language: {0}")]
pub struct UnknownLanguage(pub String);

impl FromStr for Language {
    type Err = UnknownLanguage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "python3" | "py" => Ok(Language::Python),
            "java" => Ok(Language::Java),
            "cpp" | "c++" | "cxx" => Ok(Language::Cpp),
            "c" => Ok(Language::C),
            "unknown" => Ok(Language::Unknown),
            other => Err(UnknownLanguage(other.to_string())),
        }
    }
}

/// A logical source file.
///
/// `path` is the identity, but different stages spell it differently
/// (absolute, relative, basename, backslashes), so lookups go through
/// [`crate::resolver`]. Records are replaced, never edited, when a fix lands.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    /// Logical path as known to the stage that produced it
    pub path: String,
    /// Text content; `None` for binary assets
    #[serde(default)]
    pub content: Option<String>,
    /// Detected language
    pub language: Language,
    /// On-disk location for byte-for-byte copies of assets
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physical_source_path: Option<PathBuf>,
}

impl FileRecord {
    /// Create a text file record, detecting the language from `path`
    #[must_use]
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        let path = path.into();
        let language = Language::from_path(&path);
        Self {
            path,
            content: Some(content.into()),
            language,
            physical_source_path: None,
        }
    }

    /// Create an asset record backed by a file on disk
    #[must_use]
    pub fn asset(path: impl Into<String>, physical: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let language = Language::from_path(&path);
        Self {
            path,
            content: None,
            language,
            physical_source_path: Some(physical.into()),
        }
    }

    /// Override the detected language
    #[inline]
    #[must_use]
    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    /// Set the on-disk source location
    #[inline]
    #[must_use]
    pub fn with_physical_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.physical_source_path = Some(path.into());
        self
    }

    /// Copy of this record with new content
    #[must_use]
    pub fn with_content(&self, content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..self.clone()
        }
    }

    /// Text content or empty string
    #[inline]
    #[must_use]
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }

    /// Final path component, accepting both `/` and `\` separators
    #[inline]
    #[must_use]
    pub fn basename(&self) -> &str {
        basename(&self.path)
    }
}

/// Final component of a path written with either separator style
#[must_use]
pub fn basename(path: &str) -> &str {
    path.rsplit(['/', '\\']).next().unwrap_or(path)
}

/// Issue severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    /// Low impact
    Low,
    /// Medium impact
    Medium,
    /// High impact
    High,
}

/// A defect reported by a scanner, analyzer or dynamic probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Rule identifier
    pub rule_id: String,
    /// Severity
    pub severity: Severity,
    /// Human-readable message
    pub message: String,
    /// File the issue was reported against
    pub file: String,
    /// 1-based line, 0 when unknown
    #[serde(default)]
    pub line: u32,
    /// 1-based column, 0 when unknown
    #[serde(default)]
    pub column: u32,
    /// Reporting tool
    #[serde(default)]
    pub tool: String,
}

impl Issue {
    /// Create an issue with no position information
    #[must_use]
    pub fn new(
        rule_id: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
        file: impl Into<String>,
    ) -> Self {
        Self {
            rule_id: rule_id.into(),
            severity,
            message: message.into(),
            file: file.into(),
            line: 0,
            column: 0,
            tool: String::new(),
        }
    }

    /// Set line
    #[inline]
    #[must_use]
    pub fn at_line(mut self, line: u32) -> Self {
        self.line = line;
        self
    }

    /// Set reporting tool
    #[inline]
    #[must_use]
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    /// Stable identity of this issue
    #[inline]
    #[must_use]
    pub fn signature(&self) -> IssueSignature {
        IssueSignature::of(self)
    }
}

/// Number of message characters that contribute to a signature
pub const SIGNATURE_MESSAGE_CHARS: usize = 80;

/// Identity of an issue across scans: `(rule_id, line, hash(message[..80]) % 10000)`.
///
/// The hash is the first 8 bytes of SHA-256, so signatures agree between
/// processes and runs.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IssueSignature {
    /// Rule identifier
    pub rule_id: String,
    /// Reported line
    pub line: u32,
    /// Bucketed digest of the message prefix
    pub message_hash: u16,
}

impl IssueSignature {
    /// Compute the signature of an issue
    #[must_use]
    pub fn of(issue: &Issue) -> Self {
        let prefix: String = issue.message.chars().take(SIGNATURE_MESSAGE_CHARS).collect();
        let digest = Sha256::digest(prefix.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let bucket = u64::from_be_bytes(head) % 10_000;
        Self {
            rule_id: issue.rule_id.clone(),
            line: issue.line,
            message_hash: u16::try_from(bucket).unwrap_or(u16::MAX),
        }
    }
}

/// How a fix was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FixMethod {
    /// Deterministic rule rewrite
    #[serde(rename = "rule")]
    Rule,
    /// Model-generated patch
    #[serde(rename = "llm")]
    Llm,
    /// Rules first, then model
    #[serde(rename = "rule+llm")]
    RuleLlm,
    /// No fix attempted or possible
    #[serde(rename = "none")]
    None,
}

/// Coarse outcome of a fix attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixStatus {
    /// Fixer changed the file and reports success
    Fixed,
    /// Fixer ran but did not succeed
    Failed,
    /// File could not be resolved or the fixer errored
    Error,
}

/// Outcome of repairing one file in one round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixRecord {
    /// File key as planned by the fixer boundary
    pub file: String,
    /// Language of the file
    pub language: Language,
    /// Fixed content on success, original content otherwise
    pub content: String,
    /// Content before the fix, when known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_content: Option<String>,
    /// Whether the fixer succeeded
    pub success: bool,
    /// Coarse status
    pub status: FixStatus,
    /// Issues the fixer claims to have fixed
    pub fixed_count: usize,
    /// Issues newly introduced by the fix, as self-reported
    #[serde(default)]
    pub new_issues_count: usize,
    /// How the fix was produced
    pub method: FixMethod,
    /// Issues planned for this file
    #[serde(default)]
    pub original_issues: Vec<Issue>,
    /// Number of planned issues
    pub original_issues_count: usize,
    /// Failure detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl FixRecord {
    /// Record for a planned file that matched nothing in the file list
    #[must_use]
    pub fn unresolved(file: impl Into<String>, language: Language, issues: Vec<Issue>) -> Self {
        let file = file.into();
        let message = format!("{file} not found in file map");
        Self::errored(file, language, String::new(), issues, message)
    }

    /// Record for a file whose fixer failed outright
    #[must_use]
    pub fn errored(
        file: impl Into<String>,
        language: Language,
        content: String,
        issues: Vec<Issue>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            file: file.into(),
            language,
            original_content: Some(content.clone()),
            content,
            success: false,
            status: FixStatus::Error,
            fixed_count: 0,
            new_issues_count: 0,
            method: FixMethod::None,
            original_issues_count: issues.len(),
            original_issues: issues,
            error_message: Some(message.into()),
        }
    }
}

/// Counts over a set of fix records
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixSummary {
    /// Files attempted
    pub total_files: usize,
    /// Files whose fix succeeded
    pub successfully_fixed: usize,
    /// Files whose fix did not succeed
    pub failed: usize,
    /// Sum of `fixed_count`
    pub total_fixes: usize,
}

impl FixSummary {
    /// Summarise a set of records
    #[must_use]
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a FixRecord>) -> Self {
        records.into_iter().fold(Self::default(), |mut acc, r| {
            acc.total_files += 1;
            if r.success {
                acc.successfully_fixed += 1;
            } else {
                acc.failed += 1;
            }
            acc.total_fixes += r.fixed_count;
            acc
        })
    }
}

/// Fixer output for one round
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FixBatch {
    /// Per-file outcomes
    pub fixed_files: Vec<FixRecord>,
    /// Counts over `fixed_files`
    pub summary: FixSummary,
}

impl FixBatch {
    /// Build a batch, computing its summary
    #[must_use]
    pub fn new(fixed_files: Vec<FixRecord>) -> Self {
        let summary = FixSummary::from_records(&fixed_files);
        Self {
            fixed_files,
            summary,
        }
    }
}

/// A stdin/stdout functional case for compiled or interpreted programs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionalCase {
    /// Text fed on stdin
    #[serde(default)]
    pub input: String,
    /// Expected stdout, compared after trimming
    pub expected_output: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn language_detection_from_extension() {
        assert_eq!(Language::from_path("src/app.py"), Language::Python);
        assert_eq!(Language::from_path("Main.JAVA"), Language::Java);
        assert_eq!(Language::from_path("a/b/solver.cc"), Language::Cpp);
        assert_eq!(Language::from_path("lib.c"), Language::C);
        assert_eq!(Language::from_path("logo.png"), Language::Unknown);
        assert_eq!(Language::from_path("Makefile"), Language::Unknown);
    }

    #[test]
    fn language_parses_aliases() {
        assert_eq!("c++".parse::<Language>(), Ok(Language::Cpp));
        assert_eq!("Python3".parse::<Language>(), Ok(Language::Python));
        assert!("cobol".parse::<Language>().is_err());
    }

    #[test]
    fn basename_handles_both_separators() {
        assert_eq!(basename("src/pkg/Foo.java"), "Foo.java");
        assert_eq!(basename(r"C:\work\pkg\Foo.java"), "Foo.java");
        assert_eq!(basename("Foo.java"), "Foo.java");
    }

    #[test]
    fn signature_ignores_message_tail_past_80_chars() {
        let base = "x".repeat(80);
        let a = Issue::new("R1", Severity::High, format!("{base}tail-one"), "a.py").at_line(4);
        let b = Issue::new("R1", Severity::Low, format!("{base}tail-two"), "b.py").at_line(4);
        assert_eq!(a.signature(), b.signature());
    }

    #[test]
    fn signature_distinguishes_line_and_rule() {
        let a = Issue::new("R1", Severity::High, "msg", "a.py").at_line(4);
        assert_ne!(a.signature(), a.clone().at_line(5).signature());
        let mut other_rule = a.clone();
        other_rule.rule_id = "R2".into();
        assert_ne!(a.signature(), other_rule.signature());
    }

    #[test]
    fn fix_method_serializes_like_wire_format() {
        let json = serde_json::to_string(&FixMethod::RuleLlm).unwrap();
        assert_eq!(json, "\"rule+llm\"");
    }

    #[test]
    fn unresolved_record_is_failed_error() {
        let issues = vec![Issue::new("R", Severity::Low, "m", "Gone.java")];
        let record = FixRecord::unresolved("Gone.java", Language::Java, issues);
        assert!(!record.success);
        assert_eq!(record.status, FixStatus::Error);
        assert_eq!(record.method, FixMethod::None);
        assert_eq!(record.original_issues_count, 1);
        assert!(record.content.is_empty());
        assert!(record.error_message.unwrap().contains("not found"));
    }

    #[test]
    fn summary_counts_records() {
        let mut ok = FixRecord::unresolved("a.py", Language::Python, Vec::new());
        ok.success = true;
        ok.fixed_count = 3;
        let bad = FixRecord::unresolved("b.py", Language::Python, Vec::new());
        let batch = FixBatch::new(vec![ok, bad]);
        assert_eq!(
            batch.summary,
            FixSummary {
                total_files: 2,
                successfully_fixed: 1,
                failed: 1,
                total_fixes: 3,
            }
        );
    }

    proptest! {
        #[test]
        fn signature_bucket_is_below_ten_thousand(msg in ".{0,200}", line in 0u32..10_000) {
            let issue = Issue::new("RULE", Severity::Medium, msg, "f.py").at_line(line);
            prop_assert!(issue.signature().message_hash < 10_000);
        }

        #[test]
        fn signature_is_deterministic(msg in ".{0,120}") {
            let a = Issue::new("RULE", Severity::Medium, msg.clone(), "f.py");
            let b = Issue::new("RULE", Severity::Medium, msg, "g.py");
            prop_assert_eq!(a.signature(), b.signature());
        }
    }
}
