//! Mend Orchestrator - multi-round repair verification
//!
//! Provides:
//! - [`RoundOrchestrator`], the bounded fix/verify loop
//! - Cross-round accumulation of fix records (latest record per file wins)
//! - Dynamic feedback synthesis from failed sandbox probes
//! - [`FixerAgent`], which plans files and dispatches per-language fixers
//! - The pipeline stage machine and its trace
//!
//! # Example
//!
//! ```rust
//! use mend_orchestrator::sanitize_request;
//!
//! assert_eq!(sanitize_request("  fix the loop \n"), "fix the loop");
//! ```

#![warn(unreachable_pub)]

pub mod error;
pub mod feedback;
pub mod fixer;
pub mod orchestrator;
pub mod report;
pub mod round;
pub mod stage;

pub use error::PipelineError;
pub use feedback::{associate_feedback_to_file, synthesize_feedback};
pub use fixer::{build_repair_plans, FixerAgent, FixerRegistry, RepairPlan, DEBUGBENCH_RULE};
pub use orchestrator::{PipelineInput, RoundOrchestrator};
pub use report::{sanitize_request, PipelineReport, StageTimings};
pub use round::{propagate_fixed_content, AccumulatedFixMap, RoundState};
pub use stage::{allowed_transitions, validate_transition, PipelineStage, StageError, StageTracker};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running the pipeline
    pub use crate::{
        FixerAgent, FixerRegistry, PipelineInput, PipelineReport, PipelineStage, RoundOrchestrator,
    };
    pub use mend_core::prelude::*;
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
