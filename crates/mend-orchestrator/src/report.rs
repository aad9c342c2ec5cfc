//! Final run report

use crate::round::RoundState;
use crate::stage::PipelineStage;
use chrono::{DateTime, Utc};
use mend_core::{FixBatch, ScanResults};
use mend_verify::VerificationReport;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use std::time::Duration;
use uuid::Uuid;

/// Wall-clock time spent per stage, summed over rounds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimings {
    /// Scan
    pub scan_ms: u64,
    /// Analysis
    pub analyze_ms: u64,
    /// Fixing
    pub fix_ms: u64,
    /// Verification
    pub verify_ms: u64,
}

impl StageTimings {
    /// Add `elapsed` to the bucket for `stage`
    pub fn record(&mut self, stage: PipelineStage, elapsed: Duration) {
        let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        let bucket = match stage {
            PipelineStage::Scan => &mut self.scan_ms,
            PipelineStage::Analyze => &mut self.analyze_ms,
            PipelineStage::Fix => &mut self.fix_ms,
            PipelineStage::Verify => &mut self.verify_ms,
            _ => return,
        };
        *bucket = bucket.saturating_add(ms);
    }
}

/// Outcome of a whole pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Unique id of the run
    pub run_id: Uuid,
    /// Start time
    pub started_at: DateTime<Utc>,
    /// End time
    pub finished_at: DateTime<Utc>,
    /// A verified round reported no dynamic issues
    pub success: bool,
    /// One entry per round that ran
    pub history: Vec<RoundState>,
    /// Latest fix record per file across every round
    pub fix_results: FixBatch,
    /// Round 0 scan, when the scan stage ran
    pub scan_results: Option<ScanResults>,
    /// Verification of the last round that verified
    pub verification: Option<VerificationReport>,
    /// Error that stopped the run
    pub error: Option<String>,
    /// Every stage entered, in order
    pub stage_trace: Vec<PipelineStage>,
    /// Time per stage
    pub timings: StageTimings,
}

impl PipelineReport {
    /// Rounds executed
    #[inline]
    #[must_use]
    pub fn rounds_run(&self) -> usize {
        self.history.len()
    }

    /// Pretty JSON rendering
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

fn hint_blocks() -> &'static [Regex] {
    static BLOCKS: OnceLock<Vec<Regex>> = OnceLock::new();
    BLOCKS.get_or_init(|| {
        [
            r"(?s)【重要提示】.*?【提示结束】",
            r"(?s)【任务/问题提示】.*?【任务提示结束】",
        ]
        .into_iter()
        .filter_map(|pattern| Regex::new(pattern).ok())
        .collect()
    })
}

/// Strip embedded prompt-hint blocks from a request before logging it.
#[must_use]
pub fn sanitize_request(request: &str) -> String {
    let mut text = request.to_string();
    for block in hint_blocks() {
        text = block.replace_all(&text, "").into_owned();
    }
    text.trim().to_string()
}
