use super::{run_each_case, stage_source, CaseReport, CompileReport, Toolchain};
use async_trait::async_trait;
use mend_core::process::{self, CommandSpec};
use mend_core::{FileRecord, FunctionalCase, Language, ToolError, VerifierConfig};
use std::time::Duration;

/// `python -m py_compile` and direct script execution
#[derive(Debug, Clone)]
pub struct PythonToolchain {
    python: String,
    compile_timeout: Duration,
    run_timeout: Duration,
}

impl PythonToolchain {
    /// Create from verifier settings
    #[must_use]
    pub fn new(config: &VerifierConfig) -> Self {
        Self {
            python: config.python.clone(),
            compile_timeout: config.compile_timeout(Language::Python),
            run_timeout: config.run_timeout(),
        }
    }
}

#[async_trait]
impl Toolchain for PythonToolchain {
    fn language(&self) -> Language {
        Language::Python
    }

    async fn check_syntax(&self, file: &FileRecord) -> Result<CompileReport, ToolError> {
        let staged = stage_source(file, &self.python)?;
        let output = process::run(
            CommandSpec::new(&self.python)
                .args(["-m", "py_compile"])
                .arg(&staged.path)
                .cwd(staged.dir.path())
                .timeout(self.compile_timeout),
        )
        .await?;

        let errors = if output.success() {
            Vec::new()
        } else {
            let lines: Vec<String> = output
                .stderr
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(|l| l.trim().to_string())
                .collect();
            if lines.is_empty() {
                vec![format!("py_compile exited with {:?}", output.exit_code)]
            } else {
                lines
            }
        };
        Ok(CompileReport {
            success: errors.is_empty(),
            errors,
            warnings: Vec::new(),
            tool: self.python.clone(),
        })
    }

    async fn run_cases(&self, file: &FileRecord, cases: &[FunctionalCase]) -> Result<CaseReport, ToolError> {
        let staged = stage_source(file, &self.python)?;
        let base = CommandSpec::new(&self.python)
            .arg(&staged.path)
            .cwd(staged.dir.path());
        run_each_case(&base, cases, self.run_timeout).await
    }
}
