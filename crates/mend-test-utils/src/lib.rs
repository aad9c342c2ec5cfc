//! Testing utilities for the Mend workspace
//!
//! Scripted collaborators for driving the orchestrator without real tools,
//! plus small fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use mend_core::{
    CollaboratorError, FileRecord, FixBatch, FixInput, FixMethod, FixOptions, FixOutcome,
    FixRecord, FixStatus, Fixer, Issue, Language, LanguageFixer, LanguageScan, ScanResults,
    Scanner, Severity, ToolError,
};
use mend_sandbox::{DynamicReport, ProbeCategory, ProbeDetail};
use mend_verify::{RoundVerifier, VerificationReport, VerifyError, VerifyInput};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

pub fn python_file(path: &str, content: &str) -> FileRecord {
    FileRecord::new(path, content)
}

pub fn issue(file: &str, rule: &str, line: u32) -> Issue {
    Issue::new(rule, Severity::High, format!("{rule} in {file}"), file).at_line(line)
}

pub fn fix_record(file: &str, content: &str, success: bool) -> FixRecord {
    FixRecord {
        file: file.into(),
        language: Language::from_path(file),
        content: content.into(),
        original_content: None,
        success,
        status: if success { FixStatus::Fixed } else { FixStatus::Failed },
        fixed_count: usize::from(success),
        new_issues_count: 0,
        method: FixMethod::Llm,
        original_issues: Vec::new(),
        original_issues_count: 1,
        error_message: None,
    }
}

pub fn failing_probe(test_name: &str, target: Option<&str>, issues: &[&str]) -> ProbeDetail {
    ProbeDetail {
        test_name: test_name.into(),
        category: ProbeCategory::BoundaryConditions,
        description: "scripted probe".into(),
        target_file: target.map(Into::into),
        passed: false,
        issues_found: issues.iter().map(|s| (*s).to_string()).collect(),
        error: None,
        execution_time_ms: 1,
    }
}

fn recorded<T: Clone>(cell: &Mutex<Vec<T>>) -> Vec<T> {
    cell.lock().unwrap_or_else(PoisonError::into_inner).clone()
}

/// Push `value`, returning its index
fn record<T>(cell: &Mutex<Vec<T>>, value: T) -> usize {
    let mut values = cell.lock().unwrap_or_else(PoisonError::into_inner);
    values.push(value);
    values.len() - 1
}

/// Scanner that always returns the same issues
#[derive(Debug, Default)]
pub struct StaticScanner {
    results: ScanResults,
    calls: AtomicUsize,
}

impl StaticScanner {
    pub fn new(issues: Vec<Issue>) -> Self {
        let mut by_language: BTreeMap<Language, LanguageScan> = BTreeMap::new();
        for issue in issues {
            by_language
                .entry(Language::from_path(&issue.file))
                .or_default()
                .builtin
                .push(issue);
        }
        Self {
            results: ScanResults::from_languages(by_language),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Scanner for StaticScanner {
    async fn scan(&self, _files: &[FileRecord]) -> Result<ScanResults, CollaboratorError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.results.clone())
    }
}

/// Scanner that always fails
#[derive(Debug, Default)]
pub struct FailingScanner;

#[async_trait]
impl Scanner for FailingScanner {
    async fn scan(&self, _files: &[FileRecord]) -> Result<ScanResults, CollaboratorError> {
        Err(CollaboratorError::failed("scanner", "scripted failure"))
    }
}

/// One scripted fixer round
#[derive(Debug, Clone)]
pub enum FixStep {
    Records(Vec<FixRecord>),
    Fail(String),
}

/// Fixer that replays a script, one step per call; calls past the end
/// return an empty batch
#[derive(Debug, Default)]
pub struct ScriptedFixer {
    steps: Vec<FixStep>,
    inputs: Mutex<Vec<FixInput>>,
}

impl ScriptedFixer {
    pub fn new(steps: Vec<FixStep>) -> Self {
        Self {
            steps,
            inputs: Mutex::new(Vec::new()),
        }
    }

    pub fn inputs(&self) -> Vec<FixInput> {
        recorded(&self.inputs)
    }
}

#[async_trait]
impl Fixer for ScriptedFixer {
    async fn fix(&self, input: &FixInput) -> Result<FixBatch, CollaboratorError> {
        let call = record(&self.inputs, input.clone());
        match self.steps.get(call) {
            Some(FixStep::Records(records)) => Ok(FixBatch::new(records.clone())),
            Some(FixStep::Fail(reason)) => Err(CollaboratorError::failed("fixer", reason.clone())),
            None => Ok(FixBatch::default()),
        }
    }
}

/// One scripted verification
#[derive(Debug, Clone)]
pub enum VerifyStep {
    Clean,
    Failing(Vec<ProbeDetail>),
    Broken,
}

/// Verifier that replays a script; calls past the end are clean
#[derive(Debug, Default)]
pub struct ScriptedVerifier {
    steps: Vec<VerifyStep>,
    inputs: Mutex<Vec<VerifyInput>>,
}

impl ScriptedVerifier {
    pub fn new(steps: Vec<VerifyStep>) -> Self {
        Self {
            steps,
            inputs: Mutex::new(Vec::new()),
        }
    }

    /// Reports dynamic issues on every call
    pub fn never_converges(rounds: usize) -> Self {
        let probe = failing_probe("test_boundary_a.py", None, &["still broken"]);
        Self::new(vec![VerifyStep::Failing(vec![probe]); rounds])
    }

    pub fn inputs(&self) -> Vec<VerifyInput> {
        recorded(&self.inputs)
    }
}

#[async_trait]
impl RoundVerifier for ScriptedVerifier {
    async fn verify(&self, input: &VerifyInput) -> Result<VerificationReport, VerifyError> {
        record(&self.inputs, input.clone());
        let step = self.steps.get(input.attempt as usize).cloned().unwrap_or(VerifyStep::Clean);
        let dynamic_report = match step {
            VerifyStep::Clean => DynamicReport::default(),
            VerifyStep::Failing(details) => DynamicReport {
                total_tests: details.len(),
                failed: details.len(),
                total_issues: details.iter().map(|d| d.issues_found.len()).sum(),
                details,
                ..DynamicReport::default()
            },
            VerifyStep::Broken => {
                return Err(VerifyError::Harness {
                    file: "scripted".into(),
                    source: ToolError::Io {
                        tool: "scripted".into(),
                        source: std::io::Error::other("scripted failure"),
                    },
                })
            }
        };
        Ok(VerificationReport {
            attempt: input.attempt,
            has_dynamic_issues: dynamic_report.has_failures(),
            dynamic_report: Some(dynamic_report),
            ..VerificationReport::default()
        })
    }
}

/// Language fixer that appends a marker comment to every file
#[derive(Debug, Clone)]
pub struct AppendingFixer {
    pub language: Language,
    pub marker: String,
    calls: std::sync::Arc<Mutex<Vec<(String, Vec<Issue>)>>>,
}

impl AppendingFixer {
    pub fn new(language: Language, marker: &str) -> Self {
        Self {
            language,
            marker: marker.into(),
            calls: std::sync::Arc::default(),
        }
    }

    /// `(path, issues)` per call
    pub fn calls(&self) -> Vec<(String, Vec<Issue>)> {
        recorded(&self.calls)
    }
}

#[async_trait]
impl LanguageFixer for AppendingFixer {
    fn language(&self) -> Language {
        self.language
    }

    async fn fix_file(
        &self,
        file: &FileRecord,
        issues: &[Issue],
        _options: &FixOptions,
    ) -> Result<FixOutcome, CollaboratorError> {
        record(&self.calls, (file.path.clone(), issues.to_vec()));
        Ok(FixOutcome {
            success: true,
            fixed_content: Some(format!("{}\n{}", file.text(), self.marker)),
            fixed_count: issues.len(),
            new_issues_count: 0,
            method: FixMethod::Llm,
            error_message: None,
        })
    }
}

/// Language fixer that always errors
#[derive(Debug, Clone, Copy)]
pub struct BrokenFixer(pub Language);

#[async_trait]
impl LanguageFixer for BrokenFixer {
    fn language(&self) -> Language {
        self.0
    }

    async fn fix_file(
        &self,
        _file: &FileRecord,
        _issues: &[Issue],
        _options: &FixOptions,
    ) -> Result<FixOutcome, CollaboratorError> {
        Err(CollaboratorError::failed("fixer", "model unavailable"))
    }
}
