//! Probe and report types

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Runtime behavior a probe exercises
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeCategory {
    /// Handling of external input
    UserInput,
    /// Acquisition and release of files, sockets, connections
    ResourceManagement,
    /// Threads and shared state
    Concurrency,
    /// Loops, division, indexing at the edges
    BoundaryConditions,
    /// Environment-dependent configuration
    EnvironmentConfig,
    /// eval/exec, reflection, deserialization
    DynamicExecution,
}

impl ProbeCategory {
    /// Every category, in synthesis order
    pub const ALL: [ProbeCategory; 6] = [
        ProbeCategory::UserInput,
        ProbeCategory::ResourceManagement,
        ProbeCategory::Concurrency,
        ProbeCategory::BoundaryConditions,
        ProbeCategory::EnvironmentConfig,
        ProbeCategory::DynamicExecution,
    ];

    /// Snake-case name
    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            ProbeCategory::UserInput => "user_input",
            ProbeCategory::ResourceManagement => "resource_management",
            ProbeCategory::Concurrency => "concurrency",
            ProbeCategory::BoundaryConditions => "boundary_conditions",
            ProbeCategory::EnvironmentConfig => "environment_config",
            ProbeCategory::DynamicExecution => "dynamic_execution",
        }
    }

    /// Prefix of generated test names
    #[inline]
    #[must_use]
    pub fn test_prefix(&self) -> &'static str {
        match self {
            ProbeCategory::UserInput => "test_user_input_",
            ProbeCategory::ResourceManagement => "test_resource_mgmt_",
            ProbeCategory::Concurrency => "test_concurrency_",
            ProbeCategory::BoundaryConditions => "test_boundary_",
            ProbeCategory::EnvironmentConfig => "test_env_",
            ProbeCategory::DynamicExecution => "test_dynamic_exec_",
        }
    }
}

impl fmt::Display for ProbeCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A synthesized runtime probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DynamicTestCase {
    /// Category exercised
    pub category: ProbeCategory,
    /// Unique name, `<prefix><basename>`
    pub test_name: String,
    /// Complete probe program
    pub code: String,
    /// Human-readable summary
    pub description: String,
    /// Logical path of the file under test
    pub target_file: Option<String>,
}

impl DynamicTestCase {
    /// File name the probe is written to inside its sandbox
    #[must_use]
    pub fn script_name(&self) -> String {
        let stem: String = self
            .test_name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        format!("__mend_probe_{stem}.py")
    }
}

/// Outcome of running one probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TestResult {
    /// Probe that ran
    pub test_case: DynamicTestCase,
    /// Exit code zero and no issue marker
    pub passed: bool,
    /// Issue bullets printed after the marker
    pub issues_found: Vec<String>,
    /// `"timeout"` or an execution failure
    pub error: Option<String>,
    /// Captured stdout
    pub stdout: String,
    /// Captured stderr
    pub stderr: String,
    /// Exit code, when the probe finished
    pub exit_code: Option<i32>,
    /// Wall-clock time
    pub execution_time_ms: u64,
}

/// Per-category counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryStats {
    /// Probes run
    pub total: usize,
    /// Probes passed
    pub passed: usize,
    /// Probes failed
    pub failed: usize,
    /// Issue bullets reported
    pub issues: usize,
}

/// One row of the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeDetail {
    /// Test name
    pub test_name: String,
    /// Category
    pub category: ProbeCategory,
    /// Description
    pub description: String,
    /// File under test
    pub target_file: Option<String>,
    /// Pass flag
    pub passed: bool,
    /// Issue bullets
    pub issues_found: Vec<String>,
    /// Error text
    pub error: Option<String>,
    /// Duration
    pub execution_time_ms: u64,
}

/// Aggregated sandbox results
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DynamicReport {
    /// Probes run
    pub total_tests: usize,
    /// Probes passed
    pub passed: usize,
    /// Probes failed (including timeouts and errors)
    pub failed: usize,
    /// Issue bullets across all probes
    pub total_issues: usize,
    /// Counts per category
    pub by_category: BTreeMap<ProbeCategory, CategoryStats>,
    /// One row per probe, in execution order
    pub details: Vec<ProbeDetail>,
}

impl DynamicReport {
    /// Aggregate probe results
    #[must_use]
    pub fn from_results(results: &[TestResult]) -> Self {
        let mut report = Self::default();
        for result in results {
            let category = result.test_case.category;
            let stats = report.by_category.entry(category).or_default();
            stats.total += 1;
            stats.issues += result.issues_found.len();
            if result.passed {
                stats.passed += 1;
                report.passed += 1;
            } else {
                stats.failed += 1;
                report.failed += 1;
            }
            report.total_tests += 1;
            report.total_issues += result.issues_found.len();
            report.details.push(ProbeDetail {
                test_name: result.test_case.test_name.clone(),
                category,
                description: result.test_case.description.clone(),
                target_file: result.test_case.target_file.clone(),
                passed: result.passed,
                issues_found: result.issues_found.clone(),
                error: result.error.clone(),
                execution_time_ms: result.execution_time_ms,
            });
        }
        report
    }

    /// Whether any probe failed
    #[inline]
    #[must_use]
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }

    /// Rows of failed probes
    pub fn failures(&self) -> impl Iterator<Item = &ProbeDetail> {
        self.details.iter().filter(|d| !d.passed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn result(category: ProbeCategory, passed: bool, issues: &[&str], error: Option<&str>) -> TestResult {
        TestResult {
            test_case: DynamicTestCase {
                category,
                test_name: format!("{}x.py", category.test_prefix()),
                code: String::new(),
                description: "d".into(),
                target_file: Some("x.py".into()),
            },
            passed,
            issues_found: issues.iter().map(ToString::to_string).collect(),
            error: error.map(str::to_string),
            stdout: String::new(),
            stderr: String::new(),
            exit_code: Some(0),
            execution_time_ms: 5,
        }
    }

    #[test]
    fn aggregates_counts_per_category() {
        let report = DynamicReport::from_results(&[
            result(ProbeCategory::UserInput, false, &["a", "b"], None),
            result(ProbeCategory::UserInput, true, &[], None),
            result(ProbeCategory::Concurrency, false, &[], Some("timeout")),
        ]);
        assert_eq!(report.total_tests, 3);
        assert_eq!(report.passed, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(report.total_issues, 2);
        assert_eq!(
            report.by_category[&ProbeCategory::UserInput],
            CategoryStats { total: 2, passed: 1, failed: 1, issues: 2 }
        );
        assert_eq!(report.by_category[&ProbeCategory::Concurrency].failed, 1);
        assert_eq!(report.failures().count(), 2);
        assert_eq!(report.details[2].error.as_deref(), Some("timeout"));
    }

    #[test]
    fn empty_results_make_empty_report() {
        let report = DynamicReport::from_results(&[]);
        assert_eq!(report.total_tests, 0);
        assert!(!report.has_failures());
    }

    #[test]
    fn script_name_is_filesystem_safe() {
        let case = result(ProbeCategory::EnvironmentConfig, true, &[], None).test_case;
        assert_eq!(case.script_name(), "__mend_probe_test_env_x_py.py");
    }
}
