//! Round orchestrator
//!
//! Runs up to `max_retries + 1` fix/verify rounds:
//! - round 0 scans and analyzes once, then fixes from static analysis
//! - later rounds fix from the previous round's dynamic feedback
//! - the loop stops on convergence, an exhausted budget, or a round error
//!
//! Errors inside a round are recorded on that round and in the report; they
//! never escape [`RoundOrchestrator::run`].

use crate::error::PipelineError;
use crate::feedback::synthesize_feedback;
use crate::report::{sanitize_request, PipelineReport, StageTimings};
use crate::round::{propagate_fixed_content, AccumulatedFixMap, RoundState};
use crate::stage::{PipelineStage, StageTracker};
use chrono::Utc;
use mend_core::{
    Analysis, Analyzer, FileRecord, FixBatch, FixGuidance, FixInput, Fixer, FunctionalCase,
    GroupingAnalyzer, PipelineConfig, ScanResults, Scanner,
};
use mend_sandbox::DynamicReport;
use mend_verify::{RoundVerifier, VerifierAgent, VerifyInput};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Input to one pipeline run
#[derive(Debug, Clone, Default)]
pub struct PipelineInput {
    /// Project files as supplied
    pub files: Vec<FileRecord>,
    /// Free-text request
    pub user_request: String,
    /// Functional stdin/stdout cases
    pub test_cases: Vec<FunctionalCase>,
}

impl PipelineInput {
    /// Input over `files` with an empty request
    #[must_use]
    pub fn new(files: Vec<FileRecord>) -> Self {
        Self {
            files,
            ..Self::default()
        }
    }

    /// With request text
    #[inline]
    #[must_use]
    pub fn with_request(mut self, request: impl Into<String>) -> Self {
        self.user_request = request.into();
        self
    }

    /// With functional cases
    #[inline]
    #[must_use]
    pub fn with_test_cases(mut self, cases: Vec<FunctionalCase>) -> Self {
        self.test_cases = cases;
        self
    }
}

/// How a round ended
#[derive(Debug)]
enum RoundOutcome {
    Converged,
    DynamicIssues(DynamicReport),
    Unverified,
}

/// State carried between rounds of one run
struct RunContext {
    files: Vec<FileRecord>,
    scan: Option<ScanResults>,
    analysis: Option<Analysis>,
    feedback: Option<DynamicReport>,
    accumulated: AccumulatedFixMap,
    tracker: StageTracker,
    timings: StageTimings,
}

impl RunContext {
    fn new(files: Vec<FileRecord>) -> Self {
        Self {
            files,
            scan: None,
            analysis: None,
            feedback: None,
            accumulated: AccumulatedFixMap::new(),
            tracker: StageTracker::new(),
            timings: StageTimings::default(),
        }
    }

    fn enter(&mut self, stage: PipelineStage) -> Result<(), PipelineError> {
        self.tracker.advance(stage)?;
        Ok(())
    }
}

/// Drives scan, analysis, fixing and verification across rounds
#[derive(Clone)]
pub struct RoundOrchestrator {
    config: PipelineConfig,
    scanner: Arc<dyn Scanner>,
    analyzer: Arc<dyn Analyzer>,
    fixer: Arc<dyn Fixer>,
    verifier: Arc<dyn RoundVerifier>,
}

impl std::fmt::Debug for RoundOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoundOrchestrator")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RoundOrchestrator {
    /// Create with the default analyzer and a [`VerifierAgent`] that rescans
    /// with `scanner`
    #[must_use]
    pub fn new(config: PipelineConfig, scanner: Arc<dyn Scanner>, fixer: Arc<dyn Fixer>) -> Self {
        let verifier = VerifierAgent::new(&config).with_rescanner(Arc::clone(&scanner));
        Self {
            config,
            scanner,
            analyzer: Arc::new(GroupingAnalyzer),
            fixer,
            verifier: Arc::new(verifier),
        }
    }

    /// Replace the analyzer
    #[inline]
    #[must_use]
    pub fn with_analyzer(mut self, analyzer: Arc<dyn Analyzer>) -> Self {
        self.analyzer = analyzer;
        self
    }

    /// Replace the verifier
    #[inline]
    #[must_use]
    pub fn with_verifier(mut self, verifier: Arc<dyn RoundVerifier>) -> Self {
        self.verifier = verifier;
        self
    }

    /// Configuration in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline to completion.
    pub async fn run(&self, input: PipelineInput) -> PipelineReport {
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let budget = self.config.round_budget();
        info!(
            %run_id,
            files = input.files.len(),
            budget,
            request = %sanitize_request(&input.user_request),
            "pipeline started"
        );

        let mut ctx = RunContext::new(input.files.clone());
        let mut history: Vec<RoundState> = Vec::new();
        let mut success = false;
        let mut run_error = None;

        for index in 0..budget {
            let mut round = RoundState::new(index);
            let outcome = self
                .run_round(&input, &mut ctx, &mut round)
                .instrument(info_span!("round", index))
                .await;
            ctx.accumulated.merge_round(&round);

            let proceed = match outcome {
                Ok(RoundOutcome::Converged) => {
                    info!(round = index, "no dynamic issues; converged");
                    success = true;
                    ctx.tracker.advance(PipelineStage::Converged).is_ok()
                }
                Ok(RoundOutcome::DynamicIssues(report)) if index + 1 < budget => {
                    info!(round = index, failed = report.failed, "dynamic issues remain; retrying");
                    ctx.feedback = Some(report);
                    ctx.tracker.advance(PipelineStage::Retry).is_ok()
                }
                Ok(RoundOutcome::DynamicIssues(report)) => {
                    warn!(round = index, failed = report.failed, "retry budget exhausted");
                    false
                }
                Ok(RoundOutcome::Unverified) => {
                    info!(round = index, "verification disabled; stopping after one round");
                    false
                }
                Err(e) => {
                    error!(round = index, error = %e, "round failed");
                    round.error = Some(e.to_string());
                    run_error = Some(e.to_string());
                    false
                }
            };
            history.push(round);
            if success || !proceed {
                break;
            }
        }
        ctx.tracker.terminate();

        let verification = history.iter().rev().find_map(|r| r.verification.clone());
        let fix_results = FixBatch::new(ctx.accumulated.into_records());
        info!(
            %run_id,
            success,
            rounds = history.len(),
            files = fix_results.summary.total_files,
            fixed = fix_results.summary.successfully_fixed,
            "pipeline finished"
        );
        PipelineReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            success,
            history,
            fix_results,
            scan_results: ctx.scan,
            verification,
            error: run_error,
            stage_trace: ctx.tracker.into_trace(),
            timings: ctx.timings,
        }
    }

    async fn run_round(
        &self,
        input: &PipelineInput,
        ctx: &mut RunContext,
        round: &mut RoundState,
    ) -> Result<RoundOutcome, PipelineError> {
        let stages = self.config.stages;

        if round.index == 0 {
            if stages.scan {
                ctx.enter(PipelineStage::Scan)?;
                let started = Instant::now();
                let scan = self.scanner.scan(&ctx.files).await.map_err(PipelineError::Scan)?;
                ctx.timings.record(PipelineStage::Scan, started.elapsed());
                info!(defects = scan.summary.total_defects, "scan complete");
                ctx.scan = Some(scan);
            }
            if stages.analyze {
                ctx.enter(PipelineStage::Analyze)?;
                let started = Instant::now();
                let scan = ctx.scan.clone().unwrap_or_default();
                let analysis = self
                    .analyzer
                    .analyze(&scan, &ctx.files)
                    .await
                    .map_err(PipelineError::Analyze)?;
                ctx.timings.record(PipelineStage::Analyze, started.elapsed());
                ctx.analysis = Some(analysis);
            }
        }

        if stages.fix {
            ctx.enter(PipelineStage::Fix)?;
            let started = Instant::now();
            let (analysis, guidance) = if round.index == 0 {
                let analysis = match (&ctx.analysis, &ctx.scan) {
                    (Some(analysis), _) => analysis.clone(),
                    (None, Some(scan)) => Analysis::from_scan(scan),
                    (None, None) => Analysis::default(),
                };
                (analysis, FixGuidance::StaticAnalysis)
            } else {
                let analysis = ctx
                    .feedback
                    .as_ref()
                    .map(|report| synthesize_feedback(report, &ctx.files))
                    .unwrap_or_default();
                (analysis, FixGuidance::DynamicFeedback)
            };
            let fix_input = FixInput {
                analysis,
                guidance,
                files: ctx.files.clone(),
                user_request: input.user_request.clone(),
                round: round.index,
            };
            let batch = self.fixer.fix(&fix_input).await.map_err(PipelineError::Fix)?;
            ctx.timings.record(PipelineStage::Fix, started.elapsed());
            info!(
                files = batch.summary.total_files,
                fixed = batch.summary.successfully_fixed,
                "fix stage complete"
            );
            ctx.files = propagate_fixed_content(&ctx.files, &batch.fixed_files);
            round.fix_results = batch.fixed_files;
        }

        if !stages.verify {
            return Ok(RoundOutcome::Unverified);
        }

        ctx.enter(PipelineStage::Verify)?;
        let started = Instant::now();
        let verify_input = VerifyInput {
            fixed_files: round.fix_results.clone(),
            dynamic_targets: ctx.accumulated.preview(&round.fix_results),
            original_files: input.files.clone(),
            test_cases: input.test_cases.clone(),
            attempt: round.index,
        };
        let report = self.verifier.verify(&verify_input).await?;
        ctx.timings.record(PipelineStage::Verify, started.elapsed());

        round.dynamic_report.clone_from(&report.dynamic_report);
        let has_issues = report.has_dynamic_issues;
        round.verification = Some(report);

        if has_issues {
            Ok(RoundOutcome::DynamicIssues(round.dynamic_report.clone().unwrap_or_default()))
        } else {
            Ok(RoundOutcome::Converged)
        }
    }
}
