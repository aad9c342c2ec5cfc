//! Dynamic feedback synthesis
//!
//! Turns failed sandbox probes into high-severity issues the fixer can
//! consume in the next round. Each failing probe is associated with a file
//! from the current file list, preferring the probe's recorded target and
//! falling back to the file whose basename appears in the test name.

use indexmap::IndexMap;
use mend_core::{basename, resolve, Analysis, FileRecord, Issue, LanguageAnalysis, Severity};
use mend_sandbox::{DynamicReport, ProbeDetail};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Tool name stamped on synthesized issues
pub const DYNAMIC_TOOL: &str = "dynamic";

/// Build next-round fix guidance from a sandbox report.
///
/// Only failed probes produce issues. Probes that cannot be associated with
/// any file are dropped with a warning.
#[must_use]
pub fn synthesize_feedback(report: &DynamicReport, files: &[FileRecord]) -> Analysis {
    let map = mend_core::file_map(files);
    let mut grouped: BTreeMap<_, Vec<Issue>> = BTreeMap::new();

    for detail in report.details.iter().filter(|d| !d.passed) {
        let Some(key) = associate_feedback_to_file(detail, &map) else {
            warn!(test = %detail.test_name, "dropping dynamic feedback with no matching file");
            continue;
        };
        let language = map[key].language;
        let issues = issues_for(detail, key);
        debug!(test = %detail.test_name, file = key, issues = issues.len(), "feedback associated");
        grouped.entry(language).or_default().extend(issues);
    }

    Analysis {
        by_language: grouped
            .into_iter()
            .map(|(language, issues)| (language, LanguageAnalysis::from_issues(issues)))
            .collect(),
        recommendations: Vec::new(),
    }
}

/// Find the file a failed probe is about.
///
/// Uses the probe's `target_file` through the resolver when present;
/// otherwise the file whose basename occurs in the test name, longest
/// basename first.
#[must_use]
pub fn associate_feedback_to_file<'a>(
    detail: &ProbeDetail,
    files: &'a IndexMap<String, FileRecord>,
) -> Option<&'a str> {
    if let Some(hit) = detail.target_file.as_deref().and_then(|t| resolve(t, files)) {
        return Some(hit.key);
    }
    files
        .keys()
        .filter(|key| {
            let name = basename(key);
            !name.is_empty() && detail.test_name.contains(name)
        })
        .max_by_key(|key| basename(key).len())
        .map(String::as_str)
}

fn issues_for(detail: &ProbeDetail, file: &str) -> Vec<Issue> {
    let rule_id = format!("DYNAMIC_{}", detail.category.name().to_uppercase());
    let messages: Vec<String> = if detail.issues_found.is_empty() {
        let reason = detail.error.as_deref().unwrap_or("probe failed without reporting issues");
        vec![format!("{}: {reason}", detail.test_name)]
    } else {
        detail
            .issues_found
            .iter()
            .map(|issue| format!("{}: {issue}", detail.test_name))
            .collect()
    };
    messages
        .into_iter()
        .map(|message| Issue::new(rule_id.clone(), Severity::High, message, file).with_tool(DYNAMIC_TOOL))
        .collect()
}
