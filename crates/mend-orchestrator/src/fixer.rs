//! Fixer agent
//!
//! Plans which files to repair from the round's analysis and dispatches each
//! file to the registered fixer for its language.
//!
//! Planning, in order:
//! - files listed in `issues_by_file`, or the language's raw issues grouped
//!   by their `file` field when that map is empty
//! - when nothing was planned and the request carries the benchmark marker,
//!   every source file with one synthetic `DEBUGBENCH` issue
//! - languages forced by `force_llm_on_empty`, with an empty issue list

use async_trait::async_trait;
use indexmap::IndexMap;
use mend_core::{
    resolve, CollaboratorError, FixBatch, FixInput, FixOptions, FixRecord, FixStatus, Fixer,
    FixerConfig, Issue, Language, LanguageFixer, Severity,
};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Rule id of the synthetic issue planned for benchmark requests
pub const DEBUGBENCH_RULE: &str = "DEBUGBENCH";

/// Files to repair for one language, with their planned issues
#[derive(Debug, Clone, PartialEq)]
pub struct RepairPlan {
    /// Language of every file in the plan
    pub language: Language,
    /// Planned file name to issues (possibly empty)
    pub files: IndexMap<String, Vec<Issue>>,
}

/// Build the repair plans for one round.
#[must_use]
pub fn build_repair_plans(input: &FixInput, config: &FixerConfig) -> Vec<RepairPlan> {
    let mut plans: Vec<RepairPlan> = input
        .analysis
        .by_language
        .iter()
        .filter_map(|(language, analysis)| {
            let files = if analysis.issues_by_file.is_empty() {
                let mut grouped: IndexMap<String, Vec<Issue>> = IndexMap::new();
                for issue in analysis.builtin.iter().chain(&analysis.external) {
                    grouped.entry(issue.file.clone()).or_default().push(issue.clone());
                }
                grouped
            } else {
                analysis.issues_by_file.clone()
            };
            (!files.is_empty()).then_some(RepairPlan { language: *language, files })
        })
        .collect();

    if plans.is_empty() && input.user_request.contains(&config.debugbench_marker) {
        info!("benchmark request; planning every source file");
        plans = plan_every_source_file(input, |file| {
            vec![Issue::new(
                DEBUGBENCH_RULE,
                Severity::Medium,
                "Benchmark task: find and fix the defect in this file",
                file,
            )]
        });
    }

    for language in Language::SOURCE_LANGUAGES {
        if plans.iter().any(|p| p.language == language) || !config.force_llm_on_empty.applies_to(language) {
            continue;
        }
        let files: IndexMap<String, Vec<Issue>> = input
            .files
            .iter()
            .filter(|f| f.language == language)
            .map(|f| (f.path.clone(), Vec::new()))
            .collect();
        if !files.is_empty() {
            debug!(%language, files = files.len(), "forcing fix attempt without issues");
            plans.push(RepairPlan { language, files });
        }
    }

    plans
}

fn plan_every_source_file(input: &FixInput, issues: impl Fn(&str) -> Vec<Issue>) -> Vec<RepairPlan> {
    let mut by_language: IndexMap<Language, IndexMap<String, Vec<Issue>>> = IndexMap::new();
    for file in input.files.iter().filter(|f| f.language.is_source()) {
        by_language
            .entry(file.language)
            .or_default()
            .insert(file.path.clone(), issues(&file.path));
    }
    by_language
        .into_iter()
        .map(|(language, files)| RepairPlan { language, files })
        .collect()
}

/// Language fixers keyed by language
#[derive(Clone, Default)]
pub struct FixerRegistry {
    fixers: HashMap<Language, Arc<dyn LanguageFixer>>,
}

impl FixerRegistry {
    /// Empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a fixer, replacing any for the same language
    #[must_use]
    pub fn register(mut self, fixer: Arc<dyn LanguageFixer>) -> Self {
        self.fixers.insert(fixer.language(), fixer);
        self
    }

    /// Fixer for `language`
    #[must_use]
    pub fn get(&self, language: Language) -> Option<&Arc<dyn LanguageFixer>> {
        self.fixers.get(&language)
    }

    /// Registered languages
    #[must_use]
    pub fn languages(&self) -> Vec<Language> {
        let mut languages: Vec<_> = self.fixers.keys().copied().collect();
        languages.sort();
        languages
    }
}

impl std::fmt::Debug for FixerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FixerRegistry").field("languages", &self.languages()).finish()
    }
}

/// [`Fixer`] that plans files and delegates to per-language fixers
#[derive(Debug, Clone)]
pub struct FixerAgent {
    registry: FixerRegistry,
    config: FixerConfig,
}

impl FixerAgent {
    /// Agent over `registry`
    #[must_use]
    pub fn new(registry: FixerRegistry, config: FixerConfig) -> Self {
        Self { registry, config }
    }

    async fn fix_plan(&self, fixer: &dyn LanguageFixer, plan: RepairPlan, input: &FixInput) -> Vec<FixRecord> {
        let options = FixOptions {
            use_rules: self.config.use_rules,
            use_llm: self.config.use_llm,
            user_request: input.user_request.clone(),
            guidance: input.guidance,
        };
        let files = mend_core::file_map(&input.files);
        let mut records = Vec::with_capacity(plan.files.len());

        for (planned, issues) in plan.files {
            let Some(hit) = resolve(&planned, &files) else {
                warn!(file = %planned, "planned file not in file list");
                records.push(FixRecord::unresolved(planned, plan.language, issues));
                continue;
            };
            let original = hit.value.text().to_string();
            let record = match fixer.fix_file(hit.value, &issues, &options).await {
                Ok(outcome) => FixRecord {
                    file: hit.key.to_string(),
                    language: plan.language,
                    content: match (outcome.success, outcome.fixed_content) {
                        (true, Some(content)) => content,
                        _ => original.clone(),
                    },
                    original_content: Some(original),
                    success: outcome.success,
                    status: if outcome.success { FixStatus::Fixed } else { FixStatus::Failed },
                    fixed_count: outcome.fixed_count,
                    new_issues_count: outcome.new_issues_count,
                    method: outcome.method,
                    original_issues_count: issues.len(),
                    original_issues: issues,
                    error_message: outcome.error_message,
                },
                Err(e) => {
                    warn!(file = hit.key, error = %e, "language fixer failed");
                    FixRecord::errored(hit.key, plan.language, original, issues, e.to_string())
                }
            };
            records.push(record);
        }
        records
    }
}

#[async_trait]
impl Fixer for FixerAgent {
    async fn fix(&self, input: &FixInput) -> Result<FixBatch, CollaboratorError> {
        let mut records = Vec::new();
        for plan in build_repair_plans(input, &self.config) {
            let Some(fixer) = self.registry.get(plan.language) else {
                warn!(language = %plan.language, files = plan.files.len(), "no fixer registered; skipping");
                continue;
            };
            records.extend(self.fix_plan(fixer.as_ref(), plan, input).await);
        }
        let batch = FixBatch::new(records);
        info!(
            files = batch.summary.total_files,
            fixed = batch.summary.successfully_fixed,
            failed = batch.summary.failed,
            "fix batch complete"
        );
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mend_core::{Analysis, FileRecord, FixGuidance, ForceOnEmpty, LanguageAnalysis};
    use pretty_assertions::assert_eq;
    use std::collections::BTreeMap;

    fn input(analysis: Analysis, request: &str) -> FixInput {
        FixInput {
            analysis,
            guidance: FixGuidance::StaticAnalysis,
            files: vec![
                FileRecord::new("src/a.py", "a = 1"),
                FileRecord::new("src/Main.java", "class Main {}"),
                FileRecord::new("README.md", "# readme"),
            ],
            user_request: request.into(),
            round: 0,
        }
    }

    #[test]
    fn issues_by_file_drive_the_plan() {
        let mut analysis = Analysis::default();
        analysis.by_language.insert(
            Language::Python,
            LanguageAnalysis::from_issues(vec![Issue::new("R1", Severity::Low, "m", "a.py")]),
        );
        let plans = build_repair_plans(&input(analysis, ""), &FixerConfig::default());
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].files.keys().collect::<Vec<_>>(), vec!["a.py"]);
    }

    #[test]
    fn raw_issues_are_grouped_when_map_is_empty() {
        let mut analysis = Analysis::default();
        analysis.by_language.insert(
            Language::Java,
            LanguageAnalysis {
                builtin: vec![Issue::new("J1", Severity::High, "m", "Main.java")],
                external: vec![Issue::new("J2", Severity::Low, "m", "Main.java")],
                ..LanguageAnalysis::default()
            },
        );
        let plans = build_repair_plans(&input(analysis, ""), &FixerConfig::default());
        assert_eq!(plans[0].files["Main.java"].len(), 2);
    }

    #[test]
    fn benchmark_request_plans_every_source_file() {
        let plans = build_repair_plans(
            &input(Analysis::default(), "[DEBUGBENCH] fix the bug"),
            &FixerConfig::default(),
        );
        let planned: Vec<_> = plans.iter().flat_map(|p| p.files.keys()).collect();
        assert_eq!(planned, vec!["src/a.py", "src/Main.java"]);
        let issue = &plans[0].files["src/a.py"][0];
        assert_eq!(issue.rule_id, DEBUGBENCH_RULE);
        assert_eq!(issue.severity, Severity::Medium);
        assert_eq!(issue.line, 0);
    }

    #[test]
    fn no_issues_and_no_marker_plans_nothing() {
        assert!(build_repair_plans(&input(Analysis::default(), "fix it"), &FixerConfig::default()).is_empty());
    }

    #[test]
    fn forced_languages_get_empty_issue_plans() {
        let config = FixerConfig {
            force_llm_on_empty: ForceOnEmpty::PerLanguage(BTreeMap::from([(Language::Java, true)])),
            ..FixerConfig::default()
        };
        let plans = build_repair_plans(&input(Analysis::default(), ""), &config);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].language, Language::Java);
        assert!(plans[0].files["src/Main.java"].is_empty());
    }
}
