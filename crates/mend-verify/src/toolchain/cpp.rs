use super::{run_each_case, split_diagnostics, stage_source, CaseReport, CompileReport, Toolchain};
use async_trait::async_trait;
use mend_core::process::{self, CommandSpec};
use mend_core::{FileRecord, FunctionalCase, Language, ToolError, VerifierConfig};
use std::time::Duration;
use tokio::sync::OnceCell;

/// gcc/clang family, for both C and C++
#[derive(Debug)]
pub struct CCompilerToolchain {
    language: Language,
    candidates: Vec<String>,
    compiler: OnceCell<Option<String>>,
    compile_timeout: Duration,
    run_timeout: Duration,
}

impl CCompilerToolchain {
    /// Create for `Language::C` or `Language::Cpp`
    #[must_use]
    pub fn new(language: Language, config: &VerifierConfig) -> Self {
        let candidates = if language == Language::C {
            config.c_compilers.clone()
        } else {
            config.cpp_compilers.clone()
        };
        Self {
            language,
            candidates,
            compiler: OnceCell::new(),
            compile_timeout: config.compile_timeout(language),
            run_timeout: config.run_timeout(),
        }
    }

    fn standard(&self) -> &'static str {
        if self.language == Language::C {
            "-std=c11"
        } else {
            "-std=c++17"
        }
    }

    /// First candidate that can be spawned, probed once
    async fn compiler(&self) -> Result<&str, ToolError> {
        let found = self
            .compiler
            .get_or_init(|| async {
                for candidate in &self.candidates {
                    if process::is_available(candidate).await {
                        tracing::debug!(compiler = %candidate, "selected compiler");
                        return Some(candidate.clone());
                    }
                }
                None
            })
            .await;
        found.as_deref().ok_or_else(|| ToolError::Unavailable {
            tool: self.candidates.join("|"),
        })
    }
}

#[async_trait]
impl Toolchain for CCompilerToolchain {
    fn language(&self) -> Language {
        self.language
    }

    async fn check_syntax(&self, file: &FileRecord) -> Result<CompileReport, ToolError> {
        let compiler = self.compiler().await?;
        let staged = stage_source(file, compiler)?;
        let output = process::run(
            CommandSpec::new(compiler)
                .args([self.standard(), "-Wall", "-Wno-unused", "-fsyntax-only"])
                .arg(&staged.path)
                .cwd(staged.dir.path())
                .timeout(self.compile_timeout),
        )
        .await?;

        let (errors, warnings) = split_diagnostics(&output.stderr);
        Ok(CompileReport {
            success: errors.is_empty(),
            errors,
            warnings,
            tool: compiler.to_string(),
        })
    }

    async fn run_cases(&self, file: &FileRecord, cases: &[FunctionalCase]) -> Result<CaseReport, ToolError> {
        let compiler = self.compiler().await?;
        let staged = stage_source(file, compiler)?;
        let binary = staged.dir.path().join("program");
        let mut build = CommandSpec::new(compiler)
            .args([self.standard(), "-O0", "-o"])
            .arg(&binary)
            .arg(&staged.path)
            .cwd(staged.dir.path())
            .timeout(self.compile_timeout);
        if self.language == Language::Cpp && compiler.ends_with("gcc") {
            build = build.arg("-lstdc++");
        }
        let built = process::run(build).await?;
        if !built.success() {
            return Ok(CaseReport::all_failed(cases.len(), "build failed"));
        }
        let base = CommandSpec::new(binary.to_string_lossy().into_owned()).cwd(staged.dir.path());
        run_each_case(&base, cases, self.run_timeout).await
    }
}
