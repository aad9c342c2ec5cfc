//! Subcommand implementations

use anyhow::Context;
use mend_core::{FileRecord, Language, PipelineConfig};
use mend_sandbox::DynamicTester;
use mend_verify::{toolchain_for, CompileReport};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use walkdir::WalkDir;

const IGNORED_DIRS: &[&str] = &[".git", "target", "node_modules", "__pycache__", ".venv", "venv"];

/// Load and validate configuration, falling back to defaults
pub(crate) fn load_config(path: Option<&PathBuf>) -> anyhow::Result<PipelineConfig> {
    let config = match path {
        Some(path) => PipelineConfig::from_path(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => PipelineConfig::default(),
    };
    config.validate().context("invalid configuration")?;
    Ok(config)
}

fn is_ignored(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|name| IGNORED_DIRS.contains(&name))
}

/// Collect a project as file records keyed by `/`-separated relative paths.
///
/// Readable source files carry their text; everything else is an asset
/// pointing at its location on disk.
pub(crate) fn collect_files(root: &Path) -> anyhow::Result<Vec<FileRecord>> {
    if !root.is_dir() {
        anyhow::bail!("{} is not a directory", root.display());
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| e.depth() == 0 || !is_ignored(e.path()))
        .filter_map(Result::ok)
    {
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = path
            .strip_prefix(root)
            .unwrap_or(path)
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        let language = Language::from_path(path);
        let record = match language.is_source().then(|| std::fs::read_to_string(path)) {
            Some(Ok(text)) => FileRecord::new(relative, text),
            Some(Err(e)) => {
                tracing::debug!(path = %path.display(), error = %e, "unreadable source; keeping as asset");
                FileRecord::asset(relative, path)
            }
            None => FileRecord::asset(relative, path),
        };
        files.push(record);
    }
    Ok(files)
}

/// `mend probe`
pub(crate) async fn probe(root: &Path, config: &PipelineConfig, json: bool) -> anyhow::Result<ExitCode> {
    let project = collect_files(root)?;
    let targets: Vec<FileRecord> = project
        .iter()
        .filter(|f| f.language == Language::Python && f.content.is_some())
        .cloned()
        .collect();
    tracing::info!(files = project.len(), targets = targets.len(), "probing project");

    let report = DynamicTester::new(config.sandbox.clone()).run(&targets, &project).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!(
            "Probes: {} run, {} passed, {} failed, {} issues",
            report.total_tests, report.passed, report.failed, report.total_issues
        );
        for failure in report.failures() {
            println!("  FAIL {} ({})", failure.test_name, failure.category);
            if let Some(error) = &failure.error {
                println!("    error: {error}");
            }
            for issue in &failure.issues_found {
                println!("    - {issue}");
            }
        }
    }
    Ok(if report.has_failures() { ExitCode::FAILURE } else { ExitCode::SUCCESS })
}

/// `mend check`
pub(crate) async fn check(paths: &[PathBuf], config: &PipelineConfig, json: bool) -> anyhow::Result<ExitCode> {
    let mut results: Vec<(String, CompileReport)> = Vec::with_capacity(paths.len());
    for path in paths {
        let language = Language::from_path(path);
        let Some(toolchain) = toolchain_for(language, &config.verifier) else {
            tracing::warn!(path = %path.display(), "no toolchain for this file type; skipped");
            continue;
        };
        let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        let file = FileRecord::new(path.to_string_lossy(), text);
        let report = toolchain
            .check_syntax(&file)
            .await
            .with_context(|| format!("checking {}", path.display()))?;
        results.push((file.path, report));
    }

    if json {
        let rows: Vec<_> = results
            .iter()
            .map(|(file, report)| serde_json::json!({ "file": file, "report": report }))
            .collect();
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for (file, report) in &results {
            let status = if report.success { "ok" } else { "FAILED" };
            println!("{file}: {status} ({})", report.tool);
            for line in report.errors.iter().chain(&report.warnings) {
                println!("  {line}");
            }
        }
    }
    let all_ok = results.iter().all(|(_, r)| r.success);
    Ok(if all_ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

/// `mend config`
pub(crate) fn print_config(config: &PipelineConfig) -> anyhow::Result<ExitCode> {
    print!("{}", config.to_toml_string()?);
    Ok(ExitCode::SUCCESS)
}
