//! Collaborator boundaries
//!
//! Scanning, analysis and per-language repair are performed by external
//! collaborators. This module fixes their data shapes and the async traits
//! the orchestrator drives them through.

use crate::error::CollaboratorError;
use crate::types::{FileRecord, FixBatch, FixMethod, Issue, Language, Severity};
use async_trait::async_trait;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Scanner output for one language
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageScan {
    /// Issues from built-in rules
    #[serde(default)]
    pub builtin: Vec<Issue>,
    /// Issues from external tools
    #[serde(default)]
    pub external: Vec<Issue>,
    /// Opaque dynamic-analysis payload, passed through untouched
    #[serde(default)]
    pub dynamic: serde_json::Value,
}

impl LanguageScan {
    /// Built-in then external issues
    pub fn all_issues(&self) -> impl Iterator<Item = &Issue> {
        self.builtin.iter().chain(self.external.iter())
    }
}

/// Scanner totals
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Total defects across languages
    pub total_defects: usize,
    /// Defects per language
    #[serde(default)]
    pub by_language: BTreeMap<Language, usize>,
}

/// Scanner output, produced once in round 0
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanResults {
    /// Totals
    pub summary: ScanSummary,
    /// Per-language issues
    #[serde(default)]
    pub by_language: BTreeMap<Language, LanguageScan>,
}

impl ScanResults {
    /// Build results from issue lists, computing the summary
    #[must_use]
    pub fn from_languages(by_language: BTreeMap<Language, LanguageScan>) -> Self {
        let counts: BTreeMap<Language, usize> = by_language
            .iter()
            .map(|(lang, scan)| (*lang, scan.builtin.len() + scan.external.len()))
            .collect();
        Self {
            summary: ScanSummary {
                total_defects: counts.values().sum(),
                by_language: counts,
            },
            by_language,
        }
    }

    /// Every issue reported against `file` (exact path match)
    #[must_use]
    pub fn issues_for(&self, file: &str) -> Vec<Issue> {
        self.by_language
            .values()
            .flat_map(LanguageScan::all_issues)
            .filter(|issue| issue.file == file)
            .cloned()
            .collect()
    }
}

/// Severity histogram
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeverityCounts {
    /// HIGH issues
    pub high: usize,
    /// MEDIUM issues
    pub medium: usize,
    /// LOW issues
    pub low: usize,
}

impl SeverityCounts {
    /// Count severities
    #[must_use]
    pub fn of<'a>(issues: impl IntoIterator<Item = &'a Issue>) -> Self {
        issues.into_iter().fold(Self::default(), |mut acc, issue| {
            match issue.severity {
                Severity::High => acc.high += 1,
                Severity::Medium => acc.medium += 1,
                Severity::Low => acc.low += 1,
            }
            acc
        })
    }
}

/// Analyzer output for one language
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageAnalysis {
    /// Issue count
    pub total: usize,
    /// Issues grouped by the file they were reported against
    #[serde(default)]
    pub issues_by_file: IndexMap<String, Vec<Issue>>,
    /// Severity histogram
    #[serde(default)]
    pub summary: SeverityCounts,
    /// Raw built-in issues, used when `issues_by_file` is empty
    #[serde(default)]
    pub builtin: Vec<Issue>,
    /// Raw external issues, used when `issues_by_file` is empty
    #[serde(default)]
    pub external: Vec<Issue>,
}

impl LanguageAnalysis {
    /// Group issues by file, computing totals
    #[must_use]
    pub fn from_issues(issues: impl IntoIterator<Item = Issue>) -> Self {
        let mut issues_by_file: IndexMap<String, Vec<Issue>> = IndexMap::new();
        for issue in issues {
            issues_by_file.entry(issue.file.clone()).or_default().push(issue);
        }
        let summary = SeverityCounts::of(issues_by_file.values().flatten());
        Self {
            total: issues_by_file.values().map(Vec::len).sum(),
            issues_by_file,
            summary,
            builtin: Vec::new(),
            external: Vec::new(),
        }
    }
}

/// Analyzer output, produced once in round 0 and cached
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// Per-language grouping
    #[serde(default)]
    pub by_language: BTreeMap<Language, LanguageAnalysis>,
    /// Free-form recommendations
    #[serde(default)]
    pub recommendations: Vec<String>,
}

impl Analysis {
    /// Analysis that simply groups scan results by file
    #[must_use]
    pub fn from_scan(scan: &ScanResults) -> Self {
        let by_language = scan
            .by_language
            .iter()
            .map(|(lang, result)| {
                let mut analysis = LanguageAnalysis::from_issues(result.all_issues().cloned());
                analysis.builtin.clone_from(&result.builtin);
                analysis.external.clone_from(&result.external);
                (*lang, analysis)
            })
            .collect();
        Self {
            by_language,
            recommendations: Vec::new(),
        }
    }

    /// Whether no language has any issue
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_language.values().all(|a| a.total == 0 && a.issues_by_file.is_empty())
    }
}

/// Where the issues handed to the fixer came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixGuidance {
    /// Round 0: static analysis
    StaticAnalysis,
    /// Later rounds: failures from the dynamic sandbox
    DynamicFeedback,
}

/// Input to one fix round
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixInput {
    /// Issues to fix, grouped per language and file
    pub analysis: Analysis,
    /// Origin of `analysis`
    pub guidance: FixGuidance,
    /// Latest file contents
    pub files: Vec<FileRecord>,
    /// Free-text request; may carry planning markers
    pub user_request: String,
    /// Round index
    pub round: u32,
}

/// Result of fixing one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixOutcome {
    /// Whether the fix succeeded
    pub success: bool,
    /// New content, when produced
    pub fixed_content: Option<String>,
    /// Issues fixed
    pub fixed_count: usize,
    /// Issues introduced
    #[serde(default)]
    pub new_issues_count: usize,
    /// How the fix was produced
    pub method: FixMethod,
    /// Failure detail
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Options forwarded to language fixers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FixOptions {
    /// Allow rule-based fixes
    pub use_rules: bool,
    /// Allow model-generated fixes
    pub use_llm: bool,
    /// Free-text request
    pub user_request: String,
    /// Origin of the issues
    pub guidance: FixGuidance,
}

/// Static scanner
#[async_trait]
pub trait Scanner: Send + Sync {
    /// Scan files and report issues per language
    async fn scan(&self, files: &[FileRecord]) -> Result<ScanResults, CollaboratorError>;
}

/// Issue analyzer
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Group and prioritise scan results
    async fn analyze(&self, scan: &ScanResults, files: &[FileRecord]) -> Result<Analysis, CollaboratorError>;
}

/// The fixer boundary as seen by the orchestrator
#[async_trait]
pub trait Fixer: Send + Sync {
    /// Fix every planned file for one round
    async fn fix(&self, input: &FixInput) -> Result<FixBatch, CollaboratorError>;
}

/// A fixer for one language
#[async_trait]
pub trait LanguageFixer: Send + Sync {
    /// Language handled
    fn language(&self) -> Language;

    /// Fix `file` given its planned issues (possibly empty)
    async fn fix_file(
        &self,
        file: &FileRecord,
        issues: &[Issue],
        options: &FixOptions,
    ) -> Result<FixOutcome, CollaboratorError>;
}

/// Analyzer that groups scan results per file without prioritisation
#[derive(Debug, Clone, Copy, Default)]
pub struct GroupingAnalyzer;

#[async_trait]
impl Analyzer for GroupingAnalyzer {
    async fn analyze(&self, scan: &ScanResults, _files: &[FileRecord]) -> Result<Analysis, CollaboratorError> {
        Ok(Analysis::from_scan(scan))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn issue(file: &str, severity: Severity) -> Issue {
        Issue::new("R", severity, "m", file)
    }

    #[test]
    fn scan_summary_counts_both_sources() {
        let mut langs = BTreeMap::new();
        langs.insert(
            Language::Python,
            LanguageScan {
                builtin: vec![issue("a.py", Severity::High)],
                external: vec![issue("b.py", Severity::Low), issue("a.py", Severity::Low)],
                dynamic: serde_json::Value::Null,
            },
        );
        let scan = ScanResults::from_languages(langs);
        assert_eq!(scan.summary.total_defects, 3);
        assert_eq!(scan.summary.by_language[&Language::Python], 3);
        assert_eq!(scan.issues_for("a.py").len(), 2);
    }

    #[tokio::test]
    async fn grouping_analyzer_groups_by_file() {
        let mut langs = BTreeMap::new();
        langs.insert(
            Language::Java,
            LanguageScan {
                builtin: vec![issue("A.java", Severity::High), issue("B.java", Severity::Medium)],
                external: vec![issue("A.java", Severity::Medium)],
                dynamic: serde_json::Value::Null,
            },
        );
        let scan = ScanResults::from_languages(langs);
        let analysis = GroupingAnalyzer.analyze(&scan, &[]).await.unwrap();
        let java = &analysis.by_language[&Language::Java];
        assert_eq!(java.total, 3);
        assert_eq!(java.issues_by_file["A.java"].len(), 2);
        assert_eq!(java.summary, SeverityCounts { high: 1, medium: 2, low: 0 });
        assert_eq!(java.builtin.len(), 2);
        assert!(!analysis.is_empty());
    }
}
