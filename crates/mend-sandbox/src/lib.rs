//! Mend Sandbox - dynamic runtime probes
//!
//! The sandbox turns modified source files into runtime probes and runs them
//! in isolation:
//! - Feature analysis decides which behaviors a file exhibits
//! - Synthesis emits one probe per detected behavior
//! - Execution stages the project into a fresh temporary directory per probe
//!   and runs the probe under a hard timeout
//! - Aggregation summarises results per category
//!
//! # Example
//!
//! ```rust,ignore
//! use mend_core::{FileRecord, SandboxConfig};
//! use mend_sandbox::DynamicTester;
//!
//! # async fn example() {
//! let tester = DynamicTester::new(SandboxConfig::default());
//! let files = vec![FileRecord::new("calc.py", "def div(a):\n    return 1 / a\n")];
//! let report = tester.run(&files, &files).await;
//! println!("{} of {} probes failed", report.failed, report.total_tests);
//! # }
//! ```

#![warn(unreachable_pub)]

pub mod error;
pub mod features;
pub mod runner;
pub mod synth;
pub mod types;

pub use error::SandboxError;
pub use features::SourceFeatures;
pub use runner::{ProbeRunner, TIMEOUT_ERROR};
pub use synth::ProbeSynthesizer;
pub use types::{CategoryStats, DynamicReport, DynamicTestCase, ProbeCategory, ProbeDetail, TestResult};

use futures::future::{BoxFuture, FutureExt};
use futures::stream::{self, StreamExt};
use mend_core::{FileRecord, SandboxConfig};
use rayon::prelude::*;

/// Synthesizes, runs and aggregates runtime probes
#[derive(Debug, Clone)]
pub struct DynamicTester {
    synthesizer: ProbeSynthesizer,
    runner: ProbeRunner,
    max_parallel: usize,
}

impl DynamicTester {
    /// Create a tester from sandbox settings
    #[must_use]
    pub fn new(config: SandboxConfig) -> Self {
        Self {
            synthesizer: ProbeSynthesizer::new(config.issue_marker.clone()),
            runner: ProbeRunner::new(&config),
            max_parallel: config.max_parallel_probes.max(1),
        }
    }

    /// Probes for every target, in target order
    #[must_use]
    pub fn generate_tests(&self, targets: &[FileRecord]) -> Vec<DynamicTestCase> {
        let per_file: Vec<Vec<DynamicTestCase>> = targets
            .par_iter()
            .map(|file| self.synthesizer.synthesize(file))
            .collect();
        per_file.into_iter().flatten().collect()
    }

    /// Run probes against a project snapshot; results keep probe order
    pub async fn execute_tests(&self, cases: &[DynamicTestCase], project: &[FileRecord]) -> Vec<TestResult> {
        let probes: Vec<BoxFuture<'_, TestResult>> = cases
            .iter()
            .map(|case| self.runner.run(case, project).boxed())
            .collect();
        stream::iter(probes)
            .buffered(self.max_parallel)
            .collect()
            .await
    }

    /// Synthesize probes for `targets`, run them with `project` staged, and aggregate
    pub async fn run(&self, targets: &[FileRecord], project: &[FileRecord]) -> DynamicReport {
        let cases = self.generate_tests(targets);
        tracing::info!(targets = targets.len(), probes = cases.len(), "running dynamic probes");
        let results = self.execute_tests(&cases, project).await;
        let report = DynamicReport::from_results(&results);
        tracing::info!(
            passed = report.passed,
            failed = report.failed,
            issues = report.total_issues,
            "dynamic probes finished"
        );
        report
    }
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
