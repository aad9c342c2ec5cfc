//! Isolated probe execution
//!
//! Every probe gets a fresh temporary directory holding the probe script and
//! a copy of the whole project at its relative paths. The directory is owned
//! by a [`tempfile::TempDir`], so it is removed on every exit path: pass,
//! fail, timeout, staging error, or panic.

use crate::error::SandboxError;
use crate::types::{DynamicTestCase, TestResult};
use mend_core::process::{self, CommandOutput, CommandSpec};
use mend_core::{FileRecord, SandboxConfig};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::Instrument;

/// Error text recorded for probes that hit their deadline
pub const TIMEOUT_ERROR: &str = "timeout";

/// Runs probes one sandbox at a time
#[derive(Debug, Clone)]
pub struct ProbeRunner {
    interpreter: String,
    timeout: Duration,
    marker: String,
}

impl ProbeRunner {
    /// Create a runner from sandbox settings
    #[must_use]
    pub fn new(config: &SandboxConfig) -> Self {
        Self {
            interpreter: config.interpreter.clone(),
            timeout: config.probe_timeout(),
            marker: config.issue_marker.clone(),
        }
    }

    /// Run one probe against a project snapshot. Never fails; errors are recorded.
    pub async fn run(&self, case: &DynamicTestCase, project: &[FileRecord]) -> TestResult {
        let span = tracing::info_span!("probe", test_name = %case.test_name);
        self.run_inner(case, project).instrument(span).await
    }

    async fn run_inner(&self, case: &DynamicTestCase, project: &[FileRecord]) -> TestResult {
        let started = Instant::now();
        let outcome = self.execute(case, project).await;
        let execution_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let mut result = TestResult {
            test_case: case.clone(),
            passed: false,
            issues_found: Vec::new(),
            error: None,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: None,
            execution_time_ms,
        };

        match outcome {
            Ok(output) => {
                let issues = parse_issues(&output.stdout, &self.marker);
                result.passed = output.success() && issues.is_none();
                result.issues_found = issues.unwrap_or_default();
                if !output.success() {
                    result.error = Some(exit_failure(&output));
                }
                result.exit_code = output.exit_code;
                result.stdout = output.stdout;
                result.stderr = output.stderr;
            }
            Err(e) if e.is_timeout() => {
                tracing::warn!(timeout_secs = self.timeout.as_secs(), "probe timed out");
                result.error = Some(TIMEOUT_ERROR.to_string());
            }
            Err(e) => {
                tracing::warn!(error = %e, "probe could not run");
                result.error = Some(e.to_string());
            }
        }

        tracing::debug!(
            passed = result.passed,
            issues = result.issues_found.len(),
            ms = execution_time_ms,
            "probe finished"
        );
        result
    }

    async fn execute(&self, case: &DynamicTestCase, project: &[FileRecord]) -> Result<CommandOutput, SandboxError> {
        let workspace = tempfile::Builder::new()
            .prefix("mend-probe-")
            .tempdir()
            .map_err(SandboxError::Workspace)?;
        stage_project(workspace.path(), project).await?;

        let script = workspace.path().join(case.script_name());
        tokio::fs::write(&script, &case.code)
            .await
            .map_err(|source| SandboxError::Stage {
                path: script.clone(),
                source,
            })?;

        let output = process::run(
            CommandSpec::new(&self.interpreter)
                .arg(&script)
                .cwd(workspace.path())
                .timeout(self.timeout),
        )
        .await;

        let location = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            tracing::warn!(path = %location.display(), error = %e, "failed to remove sandbox directory");
        }
        Ok(output?)
    }
}

/// Copy project files into `root` at their sanitized relative paths.
///
/// Text files are written from `content`; assets are copied byte-for-byte
/// from `physical_source_path`. Files that cannot be placed safely are skipped.
pub async fn stage_project(root: &Path, project: &[FileRecord]) -> Result<(), SandboxError> {
    for file in project {
        let Some(relative) = sandbox_relative(&file.path) else {
            tracing::warn!(file = %file.path, "unsafe or empty path, not staged");
            continue;
        };
        let dest = root.join(relative);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| SandboxError::Stage {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        match (&file.content, &file.physical_source_path) {
            (Some(text), _) => {
                tokio::fs::write(&dest, text)
                    .await
                    .map_err(|source| SandboxError::Stage { path: dest, source })?;
            }
            (None, Some(physical)) => {
                if let Err(e) = tokio::fs::copy(physical, &dest).await {
                    tracing::warn!(file = %file.path, source = %physical.display(), error = %e, "asset copy failed");
                }
            }
            (None, None) => tracing::debug!(file = %file.path, "no content or source path, not staged"),
        }
    }
    Ok(())
}

/// Relative path a project file occupies inside a sandbox.
///
/// Backslashes become separators, drive prefixes and leading separators are
/// dropped, `.` components are ignored. Paths containing `..` are rejected.
#[must_use]
pub fn sandbox_relative(path: &str) -> Option<PathBuf> {
    let unified = path.replace('\\', "/");
    let bytes = unified.as_bytes();
    let without_drive = if bytes.len() >= 2 && bytes[1] == b':' && bytes[0].is_ascii_alphabetic() {
        &unified[2..]
    } else {
        unified.as_str()
    };

    let mut relative = PathBuf::new();
    for part in without_drive.split('/') {
        match part {
            "" | "." => {}
            ".." => return None,
            segment => relative.push(segment),
        }
    }
    let clean = relative
        .components()
        .all(|c| matches!(c, Component::Normal(_)));
    (clean && relative.components().next().is_some()).then_some(relative)
}

/// Issue bullets printed after the first marker line; `None` when no marker appears
#[must_use]
pub fn parse_issues(stdout: &str, marker: &str) -> Option<Vec<String>> {
    let marker = marker.trim();
    let mut lines = stdout.lines();
    lines.by_ref().find(|line| line.contains(marker))?;
    Some(
        lines
            .filter_map(|line| line.trim_start().strip_prefix('-'))
            .map(str::trim)
            .filter(|issue| !issue.is_empty())
            .map(str::to_string)
            .collect(),
    )
}

fn exit_failure(output: &CommandOutput) -> String {
    let status = output
        .exit_code
        .map_or_else(|| "terminated by signal".to_string(), |c| format!("exit status {c}"));
    match output.stderr.lines().rev().find(|l| !l.trim().is_empty()) {
        Some(last) => format!("{status}: {}", last.trim()),
        None => status,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use proptest::prelude::*;

    #[test]
    fn relative_paths_are_sanitized() {
        assert_eq!(sandbox_relative("src/app.py"), Some(PathBuf::from("src/app.py")));
        assert_eq!(sandbox_relative("/abs/src/app.py"), Some(PathBuf::from("abs/src/app.py")));
        assert_eq!(sandbox_relative(r"C:\proj\app.py"), Some(PathBuf::from("proj/app.py")));
        assert_eq!(sandbox_relative("./a//b.py"), Some(PathBuf::from("a/b.py")));
        assert_eq!(sandbox_relative("../escape.py"), None);
        assert_eq!(sandbox_relative("a/../../b.py"), None);
        assert_eq!(sandbox_relative("/"), None);
    }

    #[test]
    fn issues_follow_marker() {
        let stdout = "- not an issue\nISSUES FOUND:\n  - first problem\n  -   second  \nnoise\n  -\n";
        assert_eq!(
            parse_issues(stdout, "ISSUES FOUND:"),
            Some(vec!["first problem".to_string(), "second".to_string()])
        );
        assert_eq!(parse_issues("all good\n", "ISSUES FOUND:"), None);
        assert_eq!(parse_issues("ISSUES FOUND:\n", "ISSUES FOUND:"), Some(Vec::new()));
    }

    proptest! {
        #[test]
        fn sanitized_paths_stay_inside_root(path in "[a-zA-Z./\\\\:]{0,30}") {
            if let Some(rel) = sandbox_relative(&path) {
                prop_assert!(rel.is_relative());
                prop_assert!(rel.components().all(|c| matches!(c, Component::Normal(_))));
            }
        }
    }
}
