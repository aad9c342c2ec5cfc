//! Pipeline configuration
//!
//! Every section has defaults matching the reference behavior, so an empty
//! file is a valid configuration. Files may be TOML or YAML.

use crate::error::ConfigError;
use crate::types::Language;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Retry rounds after the first; total rounds is `max_retries + 1`
    pub max_retries: u32,
    /// Stage toggles
    pub stages: StageToggles,
    /// Dynamic sandbox settings
    pub sandbox: SandboxConfig,
    /// Compile/functional check settings
    pub verifier: VerifierConfig,
    /// Fix-rate weights
    pub fix_rate: FixRateWeights,
    /// Fixer boundary settings
    pub fixer: FixerConfig,
}

impl PipelineConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With retry budget
    #[inline]
    #[must_use]
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// With stage toggles
    #[inline]
    #[must_use]
    pub fn with_stages(mut self, stages: StageToggles) -> Self {
        self.stages = stages;
        self
    }

    /// With sandbox settings
    #[inline]
    #[must_use]
    pub fn with_sandbox(mut self, sandbox: SandboxConfig) -> Self {
        self.sandbox = sandbox;
        self
    }

    /// With verifier settings
    #[inline]
    #[must_use]
    pub fn with_verifier(mut self, verifier: VerifierConfig) -> Self {
        self.verifier = verifier;
        self
    }

    /// With fixer settings
    #[inline]
    #[must_use]
    pub fn with_fixer(mut self, fixer: FixerConfig) -> Self {
        self.fixer = fixer;
        self
    }

    /// Total number of rounds the orchestrator may run
    #[inline]
    #[must_use]
    pub fn round_budget(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Parse TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse YAML text
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a `.toml`, `.yaml` or `.yml` file
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Self::from_toml_str(&text),
            Some("yaml" | "yml") => Self::from_yaml_str(&text),
            other => Err(ConfigError::UnsupportedFormat(
                other.unwrap_or("<none>").to_string(),
            )),
        }
    }

    /// Render as TOML
    pub fn to_toml_string(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Reject values the pipeline cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero = |field: &'static str, value: u64| {
            if value == 0 {
                Err(ConfigError::Invalid {
                    field,
                    reason: "must be greater than zero".into(),
                })
            } else {
                Ok(())
            }
        };
        nonzero("sandbox.probe_timeout_secs", self.sandbox.probe_timeout_secs)?;
        nonzero("sandbox.max_parallel_probes", self.sandbox.max_parallel_probes as u64)?;
        nonzero("verifier.compile_timeout_secs", self.verifier.compile_timeout_secs)?;
        nonzero("verifier.java_compile_timeout_secs", self.verifier.java_compile_timeout_secs)?;
        nonzero("verifier.run_timeout_secs", self.verifier.run_timeout_secs)?;
        if self.sandbox.issue_marker.trim().is_empty() {
            return Err(ConfigError::Invalid {
                field: "sandbox.issue_marker",
                reason: "must not be blank".into(),
            });
        }
        self.fix_rate.validate()
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            stages: StageToggles::default(),
            sandbox: SandboxConfig::default(),
            verifier: VerifierConfig::default(),
            fix_rate: FixRateWeights::default(),
            fixer: FixerConfig::default(),
        }
    }
}

/// Which stages run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageToggles {
    /// Run the scanner in round 0
    pub scan: bool,
    /// Run the analyzer in round 0
    pub analyze: bool,
    /// Run the fixer every round
    pub fix: bool,
    /// Run the verifier every round
    pub verify: bool,
}

impl Default for StageToggles {
    fn default() -> Self {
        Self {
            scan: true,
            analyze: true,
            fix: true,
            verify: true,
        }
    }
}

/// Dynamic sandbox settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SandboxConfig {
    /// Program used to run probes
    pub interpreter: String,
    /// Hard deadline per probe
    pub probe_timeout_secs: u64,
    /// Probes allowed in flight at once; 1 runs them sequentially
    pub max_parallel_probes: usize,
    /// Line printed by a probe before its issue bullets
    pub issue_marker: String,
}

impl SandboxConfig {
    /// Probe deadline as a duration
    #[inline]
    #[must_use]
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    /// With interpreter
    #[inline]
    #[must_use]
    pub fn with_interpreter(mut self, interpreter: impl Into<String>) -> Self {
        self.interpreter = interpreter.into();
        self
    }

    /// With probe timeout
    #[inline]
    #[must_use]
    pub fn with_probe_timeout_secs(mut self, secs: u64) -> Self {
        self.probe_timeout_secs = secs;
        self
    }

    /// With probe concurrency
    #[inline]
    #[must_use]
    pub fn with_max_parallel_probes(mut self, n: usize) -> Self {
        self.max_parallel_probes = n;
        self
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".into(),
            probe_timeout_secs: 30,
            max_parallel_probes: 1,
            issue_marker: "ISSUES FOUND:".into(),
        }
    }
}

/// Compile and functional check settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// Python interpreter for syntax checks and functional cases
    pub python: String,
    /// Java compiler
    pub javac: String,
    /// Java launcher
    pub java: String,
    /// C++ compilers, tried in order
    pub cpp_compilers: Vec<String>,
    /// C compilers, tried in order
    pub c_compilers: Vec<String>,
    /// Deadline for python/C/C++ compile checks
    pub compile_timeout_secs: u64,
    /// Deadline for javac
    pub java_compile_timeout_secs: u64,
    /// Deadline per functional case
    pub run_timeout_secs: u64,
    /// Run the dynamic sandbox after static checks
    pub dynamic_tests: bool,
}

impl VerifierConfig {
    /// Compile deadline for a language
    #[must_use]
    pub fn compile_timeout(&self, language: Language) -> Duration {
        match language {
            Language::Java => Duration::from_secs(self.java_compile_timeout_secs),
            _ => Duration::from_secs(self.compile_timeout_secs),
        }
    }

    /// Deadline per functional case
    #[inline]
    #[must_use]
    pub fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            python: "python3".into(),
            javac: "javac".into(),
            java: "java".into(),
            cpp_compilers: vec!["g++".into(), "gcc".into(), "clang++".into(), "clang".into()],
            c_compilers: vec!["gcc".into(), "clang".into(), "g++".into()],
            compile_timeout_secs: 30,
            java_compile_timeout_secs: 60,
            run_timeout_secs: 5,
            dynamic_tests: true,
        }
    }
}

/// Weights of the aggregate fix-rate formulas
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixRateWeights {
    /// Share of the traditional rate in the total
    pub traditional: f64,
    /// Share of the dynamic rate in the total
    pub dynamic: f64,
    /// Share of compile success (vs. test success) in the dynamic rate
    pub compile_share: f64,
    /// Decay applied per remaining issue in the weighted rate
    pub remaining_penalty: f64,
}

impl FixRateWeights {
    fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("fix_rate.traditional", self.traditional),
            ("fix_rate.dynamic", self.dynamic),
            ("fix_rate.compile_share", self.compile_share),
            ("fix_rate.remaining_penalty", self.remaining_penalty),
        ];
        for (field, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::Invalid {
                    field,
                    reason: format!("{value} is not a finite non-negative number"),
                });
            }
        }
        if self.compile_share > 1.0 {
            return Err(ConfigError::Invalid {
                field: "fix_rate.compile_share",
                reason: "must be at most 1".into(),
            });
        }
        Ok(())
    }
}

impl Default for FixRateWeights {
    fn default() -> Self {
        Self {
            traditional: 0.6,
            dynamic: 0.4,
            compile_share: 0.5,
            remaining_penalty: 1.2,
        }
    }
}

/// Force a fix attempt for languages with no planned issues
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ForceOnEmpty {
    /// Same answer for every language
    All(bool),
    /// Per-language answer; missing languages are `false`
    PerLanguage(BTreeMap<Language, bool>),
}

impl ForceOnEmpty {
    /// Whether `language` is forced
    #[must_use]
    pub fn applies_to(&self, language: Language) -> bool {
        match self {
            Self::All(flag) => *flag,
            Self::PerLanguage(map) => map.get(&language).copied().unwrap_or(false),
        }
    }
}

impl Default for ForceOnEmpty {
    fn default() -> Self {
        Self::All(false)
    }
}

/// Fixer boundary settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FixerConfig {
    /// Allow rule-based fixes
    pub use_rules: bool,
    /// Allow model-generated fixes
    pub use_llm: bool,
    /// Plan empty-issue fixes for unplanned languages
    pub force_llm_on_empty: ForceOnEmpty,
    /// Request prefix that turns on "fix every file" planning
    pub debugbench_marker: String,
}

impl Default for FixerConfig {
    fn default() -> Self {
        Self {
            use_rules: true,
            use_llm: true,
            force_llm_on_empty: ForceOnEmpty::default(),
            debugbench_marker: "[DEBUGBENCH".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn empty_toml_is_default() {
        let config = PipelineConfig::from_toml_str("").unwrap();
        assert_eq!(config, PipelineConfig::default());
        assert_eq!(config.round_budget(), 3);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
max_retries = 4

[sandbox]
interpreter = "python3.12"

[fixer]
force_llm_on_empty = { python = true }
"#,
        )
        .unwrap();
        assert_eq!(config.max_retries, 4);
        assert_eq!(config.sandbox.interpreter, "python3.12");
        assert_eq!(config.sandbox.probe_timeout_secs, 30);
        assert!(config.fixer.force_llm_on_empty.applies_to(Language::Python));
        assert!(!config.fixer.force_llm_on_empty.applies_to(Language::Java));
    }

    #[test]
    fn force_on_empty_accepts_bool() {
        let config = PipelineConfig::from_yaml_str("fixer:\n  force_llm_on_empty: true\n").unwrap();
        assert!(config.fixer.force_llm_on_empty.applies_to(Language::Cpp));
    }

    #[test]
    fn zero_timeout_rejected() {
        let err = PipelineConfig::from_toml_str("[sandbox]\nprobe_timeout_secs = 0\n").unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Invalid { field: "sandbox.probe_timeout_secs", .. }
        ));
    }

    #[test]
    fn negative_weight_rejected() {
        let err = PipelineConfig::from_toml_str("[fix_rate]\ndynamic = -0.1\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "fix_rate.dynamic", .. }));
    }

    #[test]
    fn toml_round_trip_through_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mend.toml");
        let config = PipelineConfig::new().with_max_retries(1);
        std::fs::write(&path, config.to_toml_string().unwrap()).unwrap();
        assert_eq!(PipelineConfig::from_path(&path).unwrap(), config);
    }

    #[test]
    fn unknown_extension_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mend.ini");
        std::fs::write(&path, "").unwrap();
        assert!(matches!(
            PipelineConfig::from_path(&path),
            Err(ConfigError::UnsupportedFormat(_))
        ));
    }
}
