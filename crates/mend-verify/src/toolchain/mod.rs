//! Per-language compile and functional checks
//!
//! A [`Toolchain`] knows how to syntax-check one language and how to run a
//! program against stdin/stdout cases. [`toolchain_for`] is the factory keyed
//! on [`Language`]; languages without a toolchain are skipped by the verifier.

mod cpp;
mod java;
mod python;

pub use cpp::CCompilerToolchain;
pub use java::JavaToolchain;
pub use python::PythonToolchain;

use async_trait::async_trait;
use mend_core::process::{self, CommandOutput, CommandSpec};
use mend_core::{basename, FileRecord, FunctionalCase, Language, ToolError, VerifierConfig};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Result of a syntax/compile check
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileReport {
    /// No errors reported
    pub success: bool,
    /// Error diagnostics
    pub errors: Vec<String>,
    /// Warning diagnostics
    pub warnings: Vec<String>,
    /// Tool that ran
    pub tool: String,
}

/// Result of running functional cases
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaseReport {
    /// Cases run
    pub total: usize,
    /// Cases whose trimmed stdout matched
    pub passed: usize,
    /// One message per failing case
    pub failures: Vec<String>,
}

impl CaseReport {
    /// Every case passed
    #[inline]
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.passed == self.total
    }

    /// Every case failed with the same reason
    #[must_use]
    pub fn all_failed(total: usize, reason: &str) -> Self {
        Self {
            total,
            passed: 0,
            failures: (0..total).map(|i| format!("case {i}: {reason}")).collect(),
        }
    }
}

/// Compile and run support for one language
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Language handled
    fn language(&self) -> Language;

    /// Syntax-check a file
    async fn check_syntax(&self, file: &FileRecord) -> Result<CompileReport, ToolError>;

    /// Run the program once per case, feeding `input` and comparing trimmed stdout
    async fn run_cases(&self, file: &FileRecord, cases: &[FunctionalCase]) -> Result<CaseReport, ToolError>;
}

/// Toolchain for a language, if one exists
#[must_use]
pub fn toolchain_for(language: Language, config: &VerifierConfig) -> Option<Arc<dyn Toolchain>> {
    match language {
        Language::Python => Some(Arc::new(PythonToolchain::new(config))),
        Language::Java => Some(Arc::new(JavaToolchain::new(config))),
        Language::Cpp | Language::C => Some(Arc::new(CCompilerToolchain::new(language, config))),
        Language::Unknown => None,
    }
}

/// A private directory holding one source file under its own basename
pub(crate) struct StagedSource {
    pub(crate) dir: TempDir,
    pub(crate) path: PathBuf,
}

pub(crate) fn stage_source(file: &FileRecord, tool: &str) -> Result<StagedSource, ToolError> {
    let io = |source| ToolError::Io {
        tool: tool.to_string(),
        source,
    };
    let dir = tempfile::Builder::new()
        .prefix("mend-verify-")
        .tempdir()
        .map_err(io)?;
    let path = dir.path().join(staged_name(file));
    std::fs::write(&path, file.text()).map_err(io)?;
    Ok(StagedSource { dir, path })
}

/// Basename of the record, or a language default when the path has none
fn staged_name(file: &FileRecord) -> String {
    let name = basename(&file.path);
    if !name.is_empty() && name != "." && name != ".." {
        return name.to_string();
    }
    let stem = if file.language == Language::Java { "Main" } else { "main" };
    match file.language.extensions().first() {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem.to_string(),
    }
}

/// Run `base` once per case, collecting mismatches. A per-case timeout fails that case only.
pub(crate) async fn run_each_case(
    base: &CommandSpec,
    cases: &[FunctionalCase],
    timeout: Duration,
) -> Result<CaseReport, ToolError> {
    let mut report = CaseReport {
        total: cases.len(),
        ..CaseReport::default()
    };
    for (index, case) in cases.iter().enumerate() {
        let spec = base.clone().stdin(case.input.clone()).timeout(timeout);
        match process::run(spec).await {
            Ok(output) => match case_mismatch(case, &output) {
                None => report.passed += 1,
                Some(reason) => report.failures.push(format!("case {index}: {reason}")),
            },
            Err(ToolError::Timeout { secs, .. }) => {
                report.failures.push(format!("case {index}: timed out after {secs}s"));
            }
            Err(e) => return Err(e),
        }
    }
    Ok(report)
}

fn case_mismatch(case: &FunctionalCase, output: &CommandOutput) -> Option<String> {
    if !output.success() {
        let last = output.stderr.lines().rev().find(|l| !l.trim().is_empty()).unwrap_or("");
        return Some(format!("exit status {:?}: {}", output.exit_code, last.trim()));
    }
    let actual = output.stdout.trim();
    let expected = case.expected_output.trim();
    (actual != expected).then(|| format!("expected {expected:?}, got {actual:?}"))
}

/// Diagnostics containing `error:`, and those containing `warning:`
pub(crate) fn split_diagnostics(stderr: &str) -> (Vec<String>, Vec<String>) {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();
    for line in stderr.lines() {
        if line.contains("error:") {
            errors.push(line.trim().to_string());
        } else if line.contains("warning:") {
            warnings.push(line.trim().to_string());
        }
    }
    (errors, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn factory_covers_source_languages() {
        let config = VerifierConfig::default();
        for lang in Language::SOURCE_LANGUAGES {
            assert_eq!(toolchain_for(lang, &config).unwrap().language(), lang);
        }
        assert!(toolchain_for(Language::Unknown, &config).is_none());
    }

    #[test]
    fn paths_without_a_basename_stage_under_a_default_name() {
        let file = FileRecord::new("pkg/", "x = 1\n").with_language(Language::Python);
        let staged = stage_source(&file, "python3").unwrap();
        assert_eq!(staged.path.file_name().unwrap(), "main.py");
        assert_eq!(std::fs::read_to_string(&staged.path).unwrap(), "x = 1\n");

        let file = FileRecord::new("", "class Main {}").with_language(Language::Java);
        let staged = stage_source(&file, "javac").unwrap();
        assert_eq!(staged.path.file_name().unwrap(), "Main.java");

        let staged = stage_source(&FileRecord::new("src/calc.py", ""), "python3").unwrap();
        assert_eq!(staged.path.file_name().unwrap(), "calc.py");
    }

    #[test]
    fn only_error_lines_are_errors() {
        let stderr = "a.cpp:3:5: warning: unused variable 'x'\na.cpp:9:1: error: expected ';'\nnote: here\n";
        let (errors, warnings) = split_diagnostics(stderr);
        assert_eq!(errors, vec!["a.cpp:9:1: error: expected ';'"]);
        assert_eq!(warnings.len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn cases_compare_trimmed_stdout() {
        let cases = vec![
            FunctionalCase { input: "hello\n".into(), expected_output: "hello".into() },
            FunctionalCase { input: "a".into(), expected_output: "b".into() },
        ];
        let report = run_each_case(&CommandSpec::new("cat"), &cases, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(report.total, 2);
        assert_eq!(report.passed, 1);
        assert!(!report.all_passed());
        assert!(report.failures[0].starts_with("case 1: expected \"b\""));
    }
}
