//! Sandbox execution tests
//!
//! Tenet: every probe runs in its own directory, and that directory is gone
//! once the probe has finished, whatever the outcome.
//!
//! Probes here are shell scripts run by `sh`, so the tests do not depend on a
//! Python installation. The end-to-end Python test skips itself when
//! `python3` is missing.

#![cfg(unix)]

use mend_core::{FileRecord, SandboxConfig};
use mend_sandbox::{DynamicTestCase, DynamicTester, ProbeCategory, ProbeRunner, TIMEOUT_ERROR};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

fn shell_config() -> SandboxConfig {
    SandboxConfig::default()
        .with_interpreter("sh")
        .with_probe_timeout_secs(1)
}

fn shell_case(name: &str, script: impl Into<String>) -> DynamicTestCase {
    DynamicTestCase {
        category: ProbeCategory::BoundaryConditions,
        test_name: name.to_string(),
        code: script.into(),
        description: "shell probe".into(),
        target_file: None,
    }
}

/// Script prefix recording the sandbox location into `record`
fn record_cwd(record: &Path) -> String {
    format!("pwd > '{}'\n", record.display())
}

fn recorded_dir(record: &Path) -> PathBuf {
    PathBuf::from(std::fs::read_to_string(record).unwrap().trim())
}

#[tokio::test]
async fn passing_probe_cleans_up() {
    let scratch = tempfile::tempdir().unwrap();
    let record = scratch.path().join("cwd.txt");
    let case = shell_case("test_ok", format!("{}echo all good\n", record_cwd(&record)));

    let result = ProbeRunner::new(&shell_config()).run(&case, &[]).await;

    assert!(result.passed, "{result:?}");
    assert!(result.issues_found.is_empty());
    assert!(result.error.is_none());
    let sandbox = recorded_dir(&record);
    assert!(sandbox.file_name().unwrap().to_string_lossy().starts_with("mend-probe-"));
    assert!(!sandbox.exists(), "sandbox {} was not removed", sandbox.display());
}

#[tokio::test]
async fn failing_probe_reports_issues_and_cleans_up() {
    let scratch = tempfile::tempdir().unwrap();
    let record = scratch.path().join("cwd.txt");
    let project = vec![FileRecord::new("pkg/data.txt", "payload-42")];
    let script = format!(
        "{}cat pkg/data.txt\necho\necho 'ISSUES FOUND:'\necho '  - division by zero in avg()'\necho '  - index out of range'\n",
        record_cwd(&record)
    );

    let result = ProbeRunner::new(&shell_config())
        .run(&shell_case("test_fail", script), &project)
        .await;

    assert!(!result.passed);
    assert_eq!(result.exit_code, Some(0));
    assert!(result.stdout.starts_with("payload-42"));
    assert_eq!(
        result.issues_found,
        vec!["division by zero in avg()", "index out of range"]
    );
    assert!(!recorded_dir(&record).exists());
}

#[tokio::test]
async fn timed_out_probe_is_killed_and_cleaned_up() {
    let scratch = tempfile::tempdir().unwrap();
    let record = scratch.path().join("cwd.txt");
    let script = format!("{}exec sleep 10\n", record_cwd(&record));

    let started = Instant::now();
    let result = ProbeRunner::new(&shell_config())
        .run(&shell_case("test_hang", script), &[])
        .await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!result.passed);
    assert_eq!(result.error.as_deref(), Some(TIMEOUT_ERROR));
    assert!(!recorded_dir(&record).exists());
}

#[tokio::test]
async fn background_child_holding_output_does_not_outlive_the_deadline() {
    let case = shell_case("test_detached", "sleep 10 &\necho started\n");

    let started = Instant::now();
    let result = ProbeRunner::new(&shell_config()).run(&case, &[]).await;

    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!result.passed);
    assert_eq!(result.error.as_deref(), Some(TIMEOUT_ERROR));
}

#[tokio::test]
async fn nonzero_exit_fails_without_marker() {
    let case = shell_case("test_crash", "echo 'Traceback: boom' >&2\nexit 3\n");
    let result = ProbeRunner::new(&shell_config()).run(&case, &[]).await;
    assert!(!result.passed);
    assert!(result.issues_found.is_empty());
    assert_eq!(result.exit_code, Some(3));
    assert_eq!(result.error.as_deref(), Some("exit status 3: Traceback: boom"));
}

#[tokio::test]
async fn assets_are_copied_byte_for_byte() {
    let scratch = tempfile::tempdir().unwrap();
    let asset = scratch.path().join("logo.bin");
    std::fs::write(&asset, [0u8, 159, 146, 150, 255]).unwrap();
    let project = vec![
        FileRecord::asset(r"assets\logo.bin", &asset),
        FileRecord::new("../outside.txt", "must not be staged"),
    ];
    let script = format!(
        "cmp -s assets/logo.bin '{}' || {{ echo 'ISSUES FOUND:'; echo '  - asset differs'; }}\n[ -e ../outside.txt ] && {{ echo 'ISSUES FOUND:'; echo '  - escaped sandbox'; }}\nexit 0\n",
        asset.display()
    );

    let result = ProbeRunner::new(&shell_config())
        .run(&shell_case("test_asset", script), &project)
        .await;

    assert!(result.passed, "{result:?}");
}

#[tokio::test]
async fn parallel_probes_keep_order_and_own_directories() {
    let config = shell_config().with_max_parallel_probes(4);
    let tester = DynamicTester::new(config);
    let cases: Vec<_> = (0..4)
        .map(|i| {
            shell_case(
                &format!("test_{i}"),
                format!("[ -e marker ] && echo 'ISSUES FOUND:' && echo '  - shared dir'\ntouch marker\nsleep 0.{}\necho {i}\n", 4 - i),
            )
        })
        .collect();

    let results = tester.execute_tests(&cases, &[]).await;

    let outputs: Vec<_> = results.iter().map(|r| r.stdout.trim().to_string()).collect();
    assert_eq!(outputs, vec!["0", "1", "2", "3"]);
    assert!(results.iter().all(|r| r.passed));
}

#[tokio::test]
async fn python_probe_finds_division_by_zero() {
    if !mend_core::process::is_available("python3").await {
        eprintln!("python3 not installed, skipping");
        return;
    }
    let files = vec![
        FileRecord::new("src/calc.py", "def inverse(x):\n    return 1 / x\n"),
        FileRecord::new("README.md", "docs"),
    ];
    let tester = DynamicTester::new(SandboxConfig::default());

    let report = tester.run(&files[..1], &files).await;

    assert_eq!(report.total_tests, 1);
    assert_eq!(report.failed, 1);
    let detail = &report.details[0];
    assert_eq!(detail.test_name, "test_boundary_calc.py");
    assert_eq!(detail.target_file.as_deref(), Some("src/calc.py"));
    assert!(
        detail.issues_found.iter().any(|i| i.contains("ZeroDivisionError")),
        "{detail:?}"
    );
}
