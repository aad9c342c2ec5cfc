//! Round state and cross-round accumulation
//!
//! Each round writes only its own [`RoundState`]. The orchestrator folds a
//! finished round into the [`AccumulatedFixMap`] at the round boundary, so
//! the map has a single writer and the latest record per file always wins,
//! whether or not that record succeeded.

use indexmap::IndexMap;
use mend_core::{resolve, FileRecord, FixRecord};
use mend_sandbox::DynamicReport;
use mend_verify::VerificationReport;
use serde::{Deserialize, Serialize};

/// Everything one round produced
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RoundState {
    /// Zero-based round index
    pub index: u32,
    /// Fix records written this round
    pub fix_results: Vec<FixRecord>,
    /// Verifier output, when verification ran
    pub verification: Option<VerificationReport>,
    /// Sandbox output, when probes ran
    pub dynamic_report: Option<DynamicReport>,
    /// Error that ended the round
    pub error: Option<String>,
}

impl RoundState {
    /// Empty state for round `index`
    #[must_use]
    pub fn new(index: u32) -> Self {
        Self {
            index,
            ..Self::default()
        }
    }

    /// Whether the verifier reported dynamic issues
    #[must_use]
    pub fn has_dynamic_issues(&self) -> bool {
        self.verification.as_ref().is_some_and(|v| v.has_dynamic_issues)
    }
}

/// Latest fix record per file across all rounds
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AccumulatedFixMap {
    entries: IndexMap<String, FixRecord>,
}

impl AccumulatedFixMap {
    /// Empty map
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a finished round in; later records overwrite earlier ones
    pub fn merge_round(&mut self, round: &RoundState) {
        for record in &round.fix_results {
            self.entries.insert(record.file.clone(), record.clone());
        }
    }

    /// What the map would hold after merging `latest`, without merging it
    #[must_use]
    pub fn preview(&self, latest: &[FixRecord]) -> Vec<FixRecord> {
        let mut entries = self.entries.clone();
        for record in latest {
            entries.insert(record.file.clone(), record.clone());
        }
        entries.into_values().collect()
    }

    /// Record for `file`
    #[must_use]
    pub fn get(&self, file: &str) -> Option<&FixRecord> {
        self.entries.get(file)
    }

    /// Number of distinct files
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether no file has been fixed yet
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Records in first-fixed order
    #[must_use]
    pub fn into_records(self) -> Vec<FixRecord> {
        self.entries.into_values().collect()
    }
}

/// Copy successful fixes into the file list the next round will see.
///
/// Each fix is matched to a file with the resolver. Failed fixes and fixes
/// that match nothing leave the list unchanged.
#[must_use]
pub fn propagate_fixed_content(files: &[FileRecord], fixes: &[FixRecord]) -> Vec<FileRecord> {
    let mut map = mend_core::file_map(files);
    for fix in fixes.iter().filter(|f| f.success) {
        let Some(key) = resolve(&fix.file, &map).map(|hit| hit.key.to_string()) else {
            tracing::debug!(file = %fix.file, "fixed file not in file list; not propagated");
            continue;
        };
        if let Some(file) = map.get_mut(&key) {
            *file = file.with_content(fix.content.clone());
        }
    }
    map.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mend_core::{FixMethod, FixStatus, Language};
    use pretty_assertions::assert_eq;

    fn fix(file: &str, content: &str, success: bool) -> FixRecord {
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

    fn round(index: u32, fixes: Vec<FixRecord>) -> RoundState {
        RoundState {
            fix_results: fixes,
            ..RoundState::new(index)
        }
    }

    #[test]
    fn later_failure_overwrites_earlier_success() {
        let mut map = AccumulatedFixMap::new();
        map.merge_round(&round(0, vec![fix("a.py", "good", true), fix("b.py", "b", true)]));
        map.merge_round(&round(1, vec![fix("a.py", "worse", false)]));

        assert_eq!(map.len(), 2);
        let a = map.get("a.py").unwrap();
        assert!(!a.success);
        assert_eq!(a.content, "worse");
        let order: Vec<_> = map.into_records().into_iter().map(|r| r.file).collect();
        assert_eq!(order, vec!["a.py", "b.py"]);
    }

    #[test]
    fn preview_does_not_mutate() {
        let mut map = AccumulatedFixMap::new();
        map.merge_round(&round(0, vec![fix("a.py", "v0", true)]));
        let preview = map.preview(&[fix("a.py", "v1", true), fix("c.py", "c", true)]);
        assert_eq!(preview.len(), 2);
        assert_eq!(preview[0].content, "v1");
        assert_eq!(map.get("a.py").unwrap().content, "v0");
    }

    #[test]
    fn only_successful_fixes_propagate() {
        let files = vec![FileRecord::new("src/a.py", "old a"), FileRecord::new("src/b.py", "old b")];
        let next = propagate_fixed_content(
            &files,
            &[fix("a.py", "new a", true), fix("b.py", "new b", false), fix("zzz.rs", "?", true)],
        );
        assert_eq!(next.len(), 2);
        assert_eq!(next[0].text(), "new a");
        assert_eq!(next[0].path, "src/a.py");
        assert_eq!(next[1].text(), "old b");
    }
}
