//! Mend Verify - did the fixes work?
//!
//! Provides:
//! - Per-language toolchains for compile checks and stdin/stdout cases
//! - Rescan diffing by issue signature, with an estimate when no rescan exists
//! - Fix-rate aggregation (traditional, dynamic, total, weighted)
//! - [`VerifierAgent`], which ties these together with the dynamic sandbox
//!
//! # Example
//!
//! ```rust
//! use mend_verify::rates::{FileTally, FixRateCalculator};
//!
//! let tally = FileTally { original: 10, fixed: 7, new: 1, compiled: true, tests_passed: true };
//! let rates = FixRateCalculator::default().aggregate(&[tally]);
//! assert!((rates.total_fix_rate - 78.18).abs() < 0.01);
//! ```

#![warn(unreachable_pub)]

pub mod diff;
pub mod error;
pub mod rates;
pub mod toolchain;
pub mod verifier;

pub use diff::{estimated_fix_rate, RescanDiff};
pub use error::VerifyError;
pub use rates::{headline_total_fix_rate, FileTally, FixRateCalculator, FixRates};
pub use toolchain::{toolchain_for, CaseReport, CompileReport, Toolchain};
pub use verifier::{
    merge_project, CompileStatus, FileVerification, RateBasis, RoundVerifier, VerificationReport,
    VerificationSummary, VerifierAgent, VerifyInput,
};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
