//! Verifier agent
//!
//! Verification of one round:
//! 1. Fixed files are grouped by language (first-seen order)
//! 2. Each file is compile-checked and run against functional cases; a tool
//!    that cannot run fails that file only
//! 3. With a rescanner, post-fix issues are diffed against the planned ones
//! 4. Per-file and aggregate fix rates are computed
//! 5. The dynamic sandbox probes every file fixed so far, against the project
//!    with all successful fixes overlaid

use crate::diff::{estimated_fix_rate, RescanDiff};
use crate::error::VerifyError;
use crate::rates::{headline_total_fix_rate, FileTally, FixRateCalculator, FixRates};
use crate::toolchain::{toolchain_for, Toolchain};
use async_trait::async_trait;
use indexmap::IndexMap;
use mend_core::{
    file_map, resolve, FileRecord, FixRecord, FixStatus, FunctionalCase, Issue, Language,
    PipelineConfig, Scanner, ToolError,
};
use mend_sandbox::{DynamicReport, DynamicTester};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// Input to one round's verification
#[derive(Debug, Clone, Default)]
pub struct VerifyInput {
    /// Records produced by this round's fixer
    pub fixed_files: Vec<FixRecord>,
    /// Every file fixed so far, this round included
    pub dynamic_targets: Vec<FixRecord>,
    /// The project as originally supplied
    pub original_files: Vec<FileRecord>,
    /// Functional stdin/stdout cases
    pub test_cases: Vec<FunctionalCase>,
    /// Round index
    pub attempt: u32,
}

/// Outcome of a compile check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileStatus {
    /// Compiled cleanly
    Passed,
    /// Compile errors or compile timeout
    Failed,
    /// No toolchain or tool not installed; assumed to pass
    Skipped,
}

impl CompileStatus {
    /// Passed or skipped
    #[inline]
    #[must_use]
    pub fn is_ok(&self) -> bool {
        !matches!(self, Self::Failed)
    }
}

/// Where the assessed fix rate came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateBasis {
    /// Rescan diff
    Rescan,
    /// Degraded estimate
    Estimate,
}

/// Verification of one file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileVerification {
    /// File key
    pub file: String,
    /// Language
    pub language: Language,
    /// Fixer status
    pub status: FixStatus,
    /// Planned issues
    pub original_count: usize,
    /// Fixed issues
    pub fixed_count: usize,
    /// Introduced issues
    pub new_count: usize,
    /// `max(0, original - fixed)`
    pub remaining_count: usize,
    /// `100 * fixed / max(1, original + new)`; not zeroed on compile failure
    pub fix_rate: f64,
    /// Compile outcome
    pub compile: CompileStatus,
    /// Compile diagnostics
    pub compile_errors: Vec<String>,
    /// Functional cases passed (true when there are none)
    pub tests_passed: bool,
    /// Functional case failures
    pub test_failures: Vec<String>,
    /// Rescan-based or estimated rate; zero on compile failure
    pub assessed_fix_rate: f64,
    /// Source of `assessed_fix_rate`
    pub basis: RateBasis,
    /// Rescan issues present before the fix
    pub remaining_issues: Vec<Issue>,
    /// Rescan issues introduced by the fix
    pub new_issues: Vec<Issue>,
}

impl FileVerification {
    /// Counts fed to the rate calculator
    #[must_use]
    pub fn tally(&self) -> FileTally {
        FileTally {
            original: self.original_count,
            fixed: self.fixed_count,
            new: self.new_count,
            compiled: self.compile.is_ok(),
            tests_passed: self.tests_passed,
        }
    }
}

/// Aggregate counts and rates
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationSummary {
    /// Files verified
    pub total_files: usize,
    /// Files whose compile check passed or was skipped
    pub compile_success: usize,
    /// Files whose functional cases passed
    pub test_passed: usize,
    /// Σ original
    pub total_original_issues: usize,
    /// Σ fixed
    pub total_fixed_issues: usize,
    /// Σ new
    pub total_new_issues: usize,
    /// Σ remaining
    pub total_remaining_issues: usize,
    /// Every file compiled
    pub all_compiled: bool,
    /// Aggregate rates
    #[serde(flatten)]
    pub rates: FixRates,
    /// `total_fix_rate`, or 0 when any file failed to compile
    pub headline_total_fix_rate: f64,
}

/// Verification of one round
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VerificationReport {
    /// Round index
    pub attempt: u32,
    /// Per-file results, grouped by language
    pub verified_files: Vec<FileVerification>,
    /// Sandbox results, when dynamic tests ran
    pub dynamic_report: Option<DynamicReport>,
    /// Any probe failed
    pub has_dynamic_issues: bool,
    /// Aggregates
    pub summary: VerificationSummary,
}

/// The verifier as seen by the orchestrator
#[async_trait]
pub trait RoundVerifier: Send + Sync {
    /// Verify one round
    async fn verify(&self, input: &VerifyInput) -> Result<VerificationReport, VerifyError>;
}

/// Compile checks, rescan diff, fix rates and dynamic probes
#[derive(Clone)]
pub struct VerifierAgent {
    calculator: FixRateCalculator,
    toolchains: HashMap<Language, Arc<dyn Toolchain>>,
    rescanner: Option<Arc<dyn Scanner>>,
    sandbox: Option<DynamicTester>,
}

impl std::fmt::Debug for VerifierAgent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VerifierAgent")
            .field("toolchains", &self.toolchains.keys().collect::<Vec<_>>())
            .field("rescanner", &self.rescanner.is_some())
            .field("sandbox", &self.sandbox.is_some())
            .finish_non_exhaustive()
    }
}

impl VerifierAgent {
    /// Create with a toolchain for every source language
    #[must_use]
    pub fn new(config: &PipelineConfig) -> Self {
        let toolchains = Language::SOURCE_LANGUAGES
            .into_iter()
            .filter_map(|lang| toolchain_for(lang, &config.verifier).map(|t| (lang, t)))
            .collect();
        let sandbox = config
            .verifier
            .dynamic_tests
            .then(|| DynamicTester::new(config.sandbox.clone()));
        Self {
            calculator: FixRateCalculator::new(config.fix_rate),
            toolchains,
            rescanner: None,
            sandbox,
        }
    }

    /// Rescan fixed files with `scanner` instead of trusting self-reported counts
    #[inline]
    #[must_use]
    pub fn with_rescanner(mut self, scanner: Arc<dyn Scanner>) -> Self {
        self.rescanner = Some(scanner);
        self
    }

    /// Replace the toolchain for its language
    #[inline]
    #[must_use]
    pub fn with_toolchain(mut self, toolchain: Arc<dyn Toolchain>) -> Self {
        self.toolchains.insert(toolchain.language(), toolchain);
        self
    }

    /// Remove the toolchain for a language, so its files are skipped
    #[inline]
    #[must_use]
    pub fn without_toolchain(mut self, language: Language) -> Self {
        self.toolchains.remove(&language);
        self
    }

    /// Replace or disable the dynamic sandbox
    #[inline]
    #[must_use]
    pub fn with_sandbox(mut self, sandbox: Option<DynamicTester>) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// Verify one record. Tool failures stay with the file they happened on.
    async fn verify_file(&self, record: &FixRecord, cases: &[FunctionalCase]) -> FileVerification {
        let file = FileRecord::new(record.file.clone(), record.content.clone()).with_language(record.language);
        let toolchain = self.toolchains.get(&record.language);

        let (compile, compile_errors) = match toolchain {
            None => (CompileStatus::Skipped, Vec::new()),
            Some(tc) => match tc.check_syntax(&file).await {
                Ok(report) if report.success => (CompileStatus::Passed, Vec::new()),
                Ok(report) => (CompileStatus::Failed, report.errors),
                Err(ToolError::Unavailable { tool }) => {
                    tracing::warn!(file = %record.file, %tool, "compiler unavailable, compile check skipped");
                    (CompileStatus::Skipped, Vec::new())
                }
                Err(ToolError::Timeout { tool, secs }) => {
                    (CompileStatus::Failed, vec![format!("{tool} timed out after {secs}s")])
                }
                Err(e) => {
                    tracing::warn!(file = %record.file, error = %e, "compile check could not run");
                    (CompileStatus::Failed, vec![e.to_string()])
                }
            },
        };

        let (tests_passed, test_failures) = match (toolchain, cases.is_empty()) {
            (_, true) | (None, _) => (true, Vec::new()),
            (Some(tc), false) => match tc.run_cases(&file, cases).await {
                Ok(report) => (report.all_passed(), report.failures),
                Err(ToolError::Unavailable { tool }) => {
                    tracing::warn!(file = %record.file, %tool, "runtime unavailable, functional cases skipped");
                    (true, Vec::new())
                }
                Err(e) => {
                    tracing::warn!(file = %record.file, error = %e, "functional cases could not run");
                    (false, vec![e.to_string()])
                }
            },
        };

        let original_count = record.original_issues_count;
        let mut fixed_count = record.fixed_count;
        let mut new_count = record.new_issues_count;
        let mut remaining_issues = Vec::new();
        let mut new_issues = Vec::new();
        let (mut assessed_fix_rate, basis) = match self.rescan(&file).await {
            Some(post) => {
                let diff = RescanDiff::compute(&record.original_issues, &post);
                fixed_count = diff.fixed_count(original_count);
                new_count = diff.new.len();
                let rate = diff.fix_rate(original_count);
                remaining_issues = diff.remaining;
                new_issues = diff.new;
                (rate, RateBasis::Rescan)
            }
            None => (
                estimated_fix_rate(original_count, compile.is_ok(), record.status),
                RateBasis::Estimate,
            ),
        };
        if !compile.is_ok() {
            assessed_fix_rate = 0.0;
        }

        let tally = FileTally {
            original: original_count,
            fixed: fixed_count,
            new: new_count,
            compiled: compile.is_ok(),
            tests_passed,
        };
        FileVerification {
            file: record.file.clone(),
            language: record.language,
            status: record.status,
            original_count,
            fixed_count,
            new_count,
            remaining_count: tally.remaining(),
            fix_rate: tally.fix_rate(),
            compile,
            compile_errors,
            tests_passed,
            test_failures,
            assessed_fix_rate,
            basis,
            remaining_issues,
            new_issues,
        }
    }

    async fn rescan(&self, file: &FileRecord) -> Option<Vec<Issue>> {
        let scanner = self.rescanner.as_ref()?;
        match scanner.scan(std::slice::from_ref(file)).await {
            Ok(results) => Some(
                results
                    .by_language
                    .values()
                    .flat_map(|scan| scan.all_issues().cloned())
                    .collect(),
            ),
            Err(e) => {
                tracing::warn!(file = %file.path, error = %e, "rescan failed, estimating fix rate");
                None
            }
        }
    }

    fn summarize(&self, files: &[FileVerification]) -> VerificationSummary {
        let tallies: Vec<FileTally> = files.iter().map(FileVerification::tally).collect();
        let rates = self.calculator.aggregate(&tallies);
        let compile_success = tallies.iter().filter(|t| t.compiled).count();
        let all_compiled = compile_success == tallies.len();
        VerificationSummary {
            total_files: tallies.len(),
            compile_success,
            test_passed: tallies.iter().filter(|t| t.tests_passed).count(),
            total_original_issues: tallies.iter().map(|t| t.original).sum(),
            total_fixed_issues: tallies.iter().map(|t| t.fixed).sum(),
            total_new_issues: tallies.iter().map(|t| t.new).sum(),
            total_remaining_issues: tallies.iter().map(FileTally::remaining).sum(),
            all_compiled,
            headline_total_fix_rate: headline_total_fix_rate(&rates, all_compiled),
            rates,
        }
    }
}

#[async_trait]
impl RoundVerifier for VerifierAgent {
    async fn verify(&self, input: &VerifyInput) -> Result<VerificationReport, VerifyError> {
        let mut by_language: IndexMap<Language, Vec<&FixRecord>> = IndexMap::new();
        for record in &input.fixed_files {
            by_language.entry(record.language).or_default().push(record);
        }

        let mut verified_files = Vec::with_capacity(input.fixed_files.len());
        for (language, records) in &by_language {
            tracing::debug!(%language, files = records.len(), "verifying language group");
            for record in records {
                verified_files.push(self.verify_file(record, &input.test_cases).await);
            }
        }
        let summary = self.summarize(&verified_files);

        let dynamic_report = match &self.sandbox {
            Some(sandbox) => {
                let (project, targets) = merge_project(&input.original_files, &input.dynamic_targets);
                Some(sandbox.run(&targets, &project).await)
            }
            None => None,
        };
        let has_dynamic_issues = dynamic_report.as_ref().is_some_and(DynamicReport::has_failures);

        tracing::info!(
            attempt = input.attempt,
            files = summary.total_files,
            compiled = summary.compile_success,
            total_fix_rate = summary.rates.total_fix_rate,
            headline = summary.headline_total_fix_rate,
            has_dynamic_issues,
            "verification finished"
        );
        Ok(VerificationReport {
            attempt: input.attempt,
            verified_files,
            dynamic_report,
            has_dynamic_issues,
            summary,
        })
    }
}

/// Overlay successful fixes onto the original project.
///
/// Returns the merged project and the merged records of every fixed file
/// (the probe targets). Fixes that match no original file are added to the
/// project under their own key.
#[must_use]
pub fn merge_project(original: &[FileRecord], fixes: &[FixRecord]) -> (Vec<FileRecord>, Vec<FileRecord>) {
    let lookup = file_map(original);
    let mut project = lookup.clone();
    let mut target_keys: Vec<String> = Vec::new();

    for fix in fixes {
        let key = match resolve(&fix.file, &lookup) {
            Some(hit) => hit.key.to_string(),
            None => {
                if fix.success {
                    project.insert(
                        fix.file.clone(),
                        FileRecord::new(fix.file.clone(), fix.content.clone()).with_language(fix.language),
                    );
                }
                fix.file.clone()
            }
        };
        if fix.success {
            if let Some(current) = project.get_mut(&key) {
                *current = current.with_content(fix.content.clone());
            }
        }
        if project.contains_key(&key) && !target_keys.contains(&key) {
            target_keys.push(key);
        }
    }

    let targets = target_keys
        .iter()
        .filter_map(|k| project.get(k).cloned())
        .collect();
    (project.into_values().collect(), targets)
}
