//! Verifier agent behavior
//!
//! Tenet: verification degrades instead of failing. Missing tools are
//! skipped, compile failures zero the headline rate but not per-file rates,
//! and rescans replace self-reported counts when available.

use async_trait::async_trait;
use mend_core::{
    CollaboratorError, FileRecord, FixMethod, FixRecord, FixStatus, FunctionalCase, Issue,
    Language, LanguageScan, PipelineConfig, ScanResults, Scanner, Severity, ToolError,
};
use mend_sandbox::DynamicTester;
use mend_verify::{
    CaseReport, CompileReport, CompileStatus, RateBasis, RoundVerifier, Toolchain, VerifierAgent,
    VerifyInput,
};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;
use std::sync::Arc;

#[derive(Clone, Copy)]
enum Compile {
    Ok,
    Errors,
    Missing,
    Hangs,
    Unrunnable,
}

struct FakeToolchain {
    language: Language,
    compile: Compile,
    cases_pass: bool,
}

#[async_trait]
impl Toolchain for FakeToolchain {
    fn language(&self) -> Language {
        self.language
    }

    async fn check_syntax(&self, _file: &FileRecord) -> Result<CompileReport, ToolError> {
        match self.compile {
            Compile::Ok => Ok(CompileReport {
                success: true,
                tool: "fake".into(),
                ..CompileReport::default()
            }),
            Compile::Errors => Ok(CompileReport {
                success: false,
                errors: vec!["x:1: error: expected ';'".into()],
                tool: "fake".into(),
                ..CompileReport::default()
            }),
            Compile::Missing => Err(ToolError::Unavailable { tool: "fakec".into() }),
            Compile::Hangs => Err(ToolError::Timeout { tool: "fakec".into(), secs: 30 }),
            Compile::Unrunnable => Err(ToolError::Io {
                tool: "fakec".into(),
                source: std::io::Error::other("permission denied"),
            }),
        }
    }

    async fn run_cases(&self, _file: &FileRecord, cases: &[FunctionalCase]) -> Result<CaseReport, ToolError> {
        Ok(if self.cases_pass {
            CaseReport { total: cases.len(), passed: cases.len(), failures: Vec::new() }
        } else {
            CaseReport::all_failed(cases.len(), "wrong answer")
        })
    }
}

fn fake(language: Language, compile: Compile) -> Arc<dyn Toolchain> {
    Arc::new(FakeToolchain { language, compile, cases_pass: true })
}

fn issue(rule: &str, line: u32) -> Issue {
    Issue::new(rule, Severity::High, format!("problem {rule}"), "x").at_line(line)
}

fn record(file: &str, original: usize, fixed: usize, new: usize) -> FixRecord {
    FixRecord {
        file: file.into(),
        language: Language::from_path(file),
        content: "content".into(),
        original_content: Some("old".into()),
        success: true,
        status: FixStatus::Fixed,
        fixed_count: fixed,
        new_issues_count: new,
        method: FixMethod::Llm,
        original_issues: (0..original).map(|i| issue(&format!("R{i}"), i as u32)).collect(),
        original_issues_count: original,
        error_message: None,
    }
}

fn agent() -> VerifierAgent {
    VerifierAgent::new(&PipelineConfig::default())
        .with_sandbox(None)
        .with_toolchain(fake(Language::Python, Compile::Ok))
        .with_toolchain(fake(Language::Java, Compile::Ok))
        .with_toolchain(fake(Language::Cpp, Compile::Ok))
}

fn input(fixed: Vec<FixRecord>) -> VerifyInput {
    VerifyInput {
        dynamic_targets: fixed.clone(),
        fixed_files: fixed,
        ..VerifyInput::default()
    }
}

#[tokio::test]
async fn reference_rates_for_one_clean_file() {
    let report = agent().verify(&input(vec![record("a.py", 10, 7, 1)])).await.unwrap();

    let file = &report.verified_files[0];
    assert_eq!(file.remaining_count, 3);
    assert!((file.fix_rate - 63.64).abs() < 0.01);
    assert_eq!(file.basis, RateBasis::Estimate);
    assert_eq!(file.assessed_fix_rate, 90.0);
    assert!((report.summary.rates.total_fix_rate - 78.18).abs() < 0.01);
    assert!((report.summary.headline_total_fix_rate - 78.18).abs() < 0.01);
    assert!(!report.has_dynamic_issues);
    assert!(report.dynamic_report.is_none());
}

#[tokio::test]
async fn compile_failure_zeroes_headline_but_not_file_rate() {
    let verifier = agent().with_toolchain(fake(Language::Java, Compile::Errors));
    let report = verifier
        .verify(&input(vec![record("a.py", 4, 4, 0), record("Main.java", 2, 1, 0)]))
        .await
        .unwrap();

    let java = &report.verified_files[1];
    assert_eq!(java.compile, CompileStatus::Failed);
    assert_eq!(java.fix_rate, 50.0);
    assert_eq!(java.assessed_fix_rate, 0.0);
    assert_eq!(java.compile_errors.len(), 1);
    assert!(!report.summary.all_compiled);
    assert_eq!(report.summary.rates.compile_rate, 0.5);
    assert!(report.summary.rates.total_fix_rate > 0.0);
    assert_eq!(report.summary.headline_total_fix_rate, 0.0);
}

#[tokio::test]
async fn missing_compiler_is_skipped_and_assumed_to_pass() {
    let verifier = agent().with_toolchain(fake(Language::Cpp, Compile::Missing));
    let report = verifier.verify(&input(vec![record("solve.cpp", 1, 1, 0)])).await.unwrap();
    assert_eq!(report.verified_files[0].compile, CompileStatus::Skipped);
    assert!(report.summary.all_compiled);
    assert_eq!(report.summary.rates.compile_rate, 1.0);
}

#[tokio::test]
async fn compile_timeout_is_a_compile_failure() {
    let verifier = agent().with_toolchain(fake(Language::Cpp, Compile::Hangs));
    let report = verifier.verify(&input(vec![record("solve.cpp", 1, 1, 0)])).await.unwrap();
    let file = &report.verified_files[0];
    assert_eq!(file.compile, CompileStatus::Failed);
    assert_eq!(file.compile_errors, vec!["fakec timed out after 30s"]);
}

#[tokio::test]
async fn languages_without_toolchain_are_skipped() {
    let verifier = agent().without_toolchain(Language::Python);
    let report = verifier.verify(&input(vec![record("a.py", 1, 0, 0)])).await.unwrap();
    assert_eq!(report.verified_files[0].compile, CompileStatus::Skipped);
}

#[tokio::test]
async fn files_are_grouped_by_language_in_first_seen_order() {
    let report = agent()
        .verify(&input(vec![
            record("a.py", 1, 1, 0),
            record("B.java", 1, 1, 0),
            record("c.py", 1, 1, 0),
        ]))
        .await
        .unwrap();
    let order: Vec<_> = report.verified_files.iter().map(|f| f.file.as_str()).collect();
    assert_eq!(order, vec!["a.py", "c.py", "B.java"]);
}

#[tokio::test]
async fn functional_cases_drive_test_rate() {
    let failing = Arc::new(FakeToolchain {
        language: Language::Python,
        compile: Compile::Ok,
        cases_pass: false,
    });
    let mut verify_input = input(vec![record("a.py", 2, 2, 0)]);
    verify_input.test_cases = vec![FunctionalCase { input: "1".into(), expected_output: "2".into() }];

    let report = agent().with_toolchain(failing).verify(&verify_input).await.unwrap();

    assert!(!report.verified_files[0].tests_passed);
    assert_eq!(report.verified_files[0].test_failures, vec!["case 0: wrong answer"]);
    assert_eq!(report.summary.rates.test_rate, 0.0);
    assert_eq!(report.summary.rates.dynamic_fix_rate, 50.0);
}

struct RescanAfterFix {
    post: Vec<Issue>,
}

#[async_trait]
impl Scanner for RescanAfterFix {
    async fn scan(&self, _files: &[FileRecord]) -> Result<ScanResults, CollaboratorError> {
        let mut langs = BTreeMap::new();
        langs.insert(
            Language::Python,
            LanguageScan { builtin: self.post.clone(), ..LanguageScan::default() },
        );
        Ok(ScanResults::from_languages(langs))
    }
}

#[tokio::test]
async fn rescan_replaces_self_reported_counts() {
    let fixed = record("a.py", 3, 3, 0);
    let still_there = fixed.original_issues[1].clone();
    let scanner = Arc::new(RescanAfterFix {
        post: vec![still_there, issue("NEW", 42)],
    });

    let report = agent().with_rescanner(scanner).verify(&input(vec![fixed])).await.unwrap();

    let file = &report.verified_files[0];
    assert_eq!(file.basis, RateBasis::Rescan);
    assert_eq!(file.fixed_count, 2);
    assert_eq!(file.new_count, 1);
    assert_eq!(file.remaining_count, 1);
    assert_eq!(file.remaining_issues.len(), 1);
    assert_eq!(file.new_issues[0].rule_id, "NEW");
    assert!((file.assessed_fix_rate - 66.666).abs() < 0.01);
    assert_eq!(file.fix_rate, 50.0);
}

struct BrokenScanner;

#[async_trait]
impl Scanner for BrokenScanner {
    async fn scan(&self, _files: &[FileRecord]) -> Result<ScanResults, CollaboratorError> {
        Err(CollaboratorError::failed("rescanner", "crashed"))
    }
}

#[tokio::test]
async fn failed_rescan_falls_back_to_estimate() {
    let report = agent()
        .with_rescanner(Arc::new(BrokenScanner))
        .verify(&input(vec![record("a.py", 3, 1, 0)]))
        .await
        .unwrap();
    assert_eq!(report.verified_files[0].basis, RateBasis::Estimate);
    assert_eq!(report.verified_files[0].fixed_count, 1);
}

#[tokio::test]
async fn sandbox_without_probe_worthy_code_reports_no_dynamic_issues() {
    let config = PipelineConfig::default();
    let verifier = agent().with_sandbox(Some(DynamicTester::new(config.sandbox)));
    let mut fixed = record("calc.py", 1, 1, 0);
    fixed.content = "def add(a, b):\n    return a + b\n".into();

    let mut verify_input = input(vec![fixed]);
    verify_input.original_files = vec![FileRecord::new("calc.py", "def add(a, b):\n    return a - b\n")];
    let report = verifier.verify(&verify_input).await.unwrap();

    let dynamic = report.dynamic_report.unwrap();
    assert_eq!(dynamic.total_tests, 0);
    assert!(!report.has_dynamic_issues);
}

#[tokio::test]
async fn tool_that_cannot_run_fails_only_its_file() {
    let verifier = agent().with_toolchain(fake(Language::Java, Compile::Unrunnable));
    let report = verifier
        .verify(&input(vec![record("Main.java", 1, 1, 0), record("a.py", 1, 1, 0)]))
        .await
        .unwrap();

    let java = &report.verified_files[0];
    assert_eq!(java.compile, CompileStatus::Failed);
    assert!(java.compile_errors[0].contains("permission denied"), "{java:?}");
    assert_eq!(report.verified_files[1].compile, CompileStatus::Passed);
    assert_eq!(report.summary.total_files, 2);
    assert_eq!(report.summary.compile_success, 1);
}

#[tokio::test]
async fn record_without_a_basename_is_verified_next_to_its_neighbours() {
    let verifier = VerifierAgent::new(&PipelineConfig::default()).with_sandbox(None);
    let mut nameless = record("pkg/", 1, 0, 0);
    nameless.language = Language::Python;
    nameless.content = "x = 1\n".into();
    let mut ok = record("ok.py", 1, 1, 0);
    ok.content = "y = 2\n".into();

    let report = verifier.verify(&input(vec![ok, nameless])).await.unwrap();

    let files: Vec<_> = report.verified_files.iter().map(|f| f.file.as_str()).collect();
    assert_eq!(files, vec!["ok.py", "pkg/"]);
    assert!(report.verified_files.iter().all(|f| f.compile.is_ok()), "{report:?}");
}

#[tokio::test]
async fn sandbox_probes_every_file_fixed_so_far_against_the_merged_project() {
    if !mend_core::process::is_available("python3").await {
        eprintln!("python3 not installed, skipping");
        return;
    }
    let config = PipelineConfig::default();
    let verifier = agent().with_sandbox(Some(DynamicTester::new(config.sandbox)));

    let mut calc = record("calc.py", 1, 1, 0);
    calc.content = "def inverse(x):\n    return 1 / x\n".into();
    let mut helper = record("helper.py", 1, 0, 0);
    helper.success = false;
    helper.status = FixStatus::Failed;
    helper.content = "def broken(:\n".into();

    let verify_input = VerifyInput {
        fixed_files: vec![calc.clone()],
        dynamic_targets: vec![helper, calc],
        original_files: vec![
            FileRecord::new("src/calc.py", "def inverse(x):\n    return x\n"),
            FileRecord::new("src/helper.py", "def add(a, b):\n    return a + b\n"),
            FileRecord::new("README.md", "docs"),
        ],
        ..VerifyInput::default()
    };
    let report = verifier.verify(&verify_input).await.unwrap();

    let dynamic = report.dynamic_report.unwrap();
    assert_eq!(dynamic.total_tests, 1);
    assert_eq!(dynamic.failed, 1);
    assert!(report.has_dynamic_issues);
    let detail = &dynamic.details[0];
    assert_eq!(detail.target_file.as_deref(), Some("src/calc.py"));
    assert!(
        detail.issues_found.iter().any(|i| i.contains("ZeroDivisionError")),
        "{detail:?}"
    );
}
