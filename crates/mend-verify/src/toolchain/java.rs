use super::{run_each_case, split_diagnostics, stage_source, CaseReport, CompileReport, Toolchain};
use async_trait::async_trait;
use mend_core::process::{self, CommandSpec};
use mend_core::{FileRecord, FunctionalCase, Language, ToolError, VerifierConfig};
use std::path::Path;
use std::time::Duration;

/// `javac` for checks, `java` for functional cases
#[derive(Debug, Clone)]
pub struct JavaToolchain {
    javac: String,
    java: String,
    compile_timeout: Duration,
    run_timeout: Duration,
}

impl JavaToolchain {
    /// Create from verifier settings
    #[must_use]
    pub fn new(config: &VerifierConfig) -> Self {
        Self {
            javac: config.javac.clone(),
            java: config.java.clone(),
            compile_timeout: config.compile_timeout(Language::Java),
            run_timeout: config.run_timeout(),
        }
    }

    fn javac(&self, source: &Path, classes: &Path) -> CommandSpec {
        CommandSpec::new(&self.javac)
            .args(["-encoding", "UTF-8", "-d"])
            .arg(classes)
            .arg(source)
            .timeout(self.compile_timeout)
    }
}

#[async_trait]
impl Toolchain for JavaToolchain {
    fn language(&self) -> Language {
        Language::Java
    }

    async fn check_syntax(&self, file: &FileRecord) -> Result<CompileReport, ToolError> {
        let staged = stage_source(file, &self.javac)?;
        let classes = staged.dir.path().join("classes");
        let output = process::run(self.javac(&staged.path, &classes).cwd(staged.dir.path())).await?;

        let (mut errors, warnings) = split_diagnostics(&output.stderr);
        if !output.success() && errors.is_empty() {
            errors.push(format!("javac exited with {:?}", output.exit_code));
        }
        Ok(CompileReport {
            success: output.success(),
            errors,
            warnings,
            tool: self.javac.clone(),
        })
    }

    async fn run_cases(&self, file: &FileRecord, cases: &[FunctionalCase]) -> Result<CaseReport, ToolError> {
        let staged = stage_source(file, &self.javac)?;
        let classes = staged.dir.path().join("classes");
        let built = process::run(self.javac(&staged.path, &classes).cwd(staged.dir.path())).await?;
        if !built.success() {
            return Ok(CaseReport::all_failed(cases.len(), "javac failed"));
        }
        let class_name = staged
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "Main".to_string());
        let base = CommandSpec::new(&self.java)
            .arg("-cp")
            .arg(&classes)
            .arg(class_name)
            .cwd(staged.dir.path());
        run_each_case(&base, cases, self.run_timeout).await
    }
}
