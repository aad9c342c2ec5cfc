//! `mend` command line
//!
//! Subcommands:
//! - `probe <dir>`: synthesize and run dynamic probes against a project
//! - `check <file>...`: compile-check files with the local toolchains
//! - `config`: print the effective configuration

mod commands;

use clap::{value_parser, Arg, ArgAction, Command};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

fn cli() -> Command {
    Command::new("mend")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Multi-round repair verification")
        .subcommand_required(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Pipeline configuration (TOML or YAML)"),
        )
        .arg(
            Arg::new("json-logs")
                .long("json-logs")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON lines"),
        )
        .subcommand(
            Command::new("probe")
                .about("Run dynamic probes against every Python file in a project")
                .arg(
                    Arg::new("dir")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Project root"),
                )
                .arg(
                    Arg::new("parallel")
                        .long("parallel")
                        .value_parser(value_parser!(usize))
                        .help("Probes to run at once"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output the report as JSON"),
                ),
        )
        .subcommand(
            Command::new("check")
                .about("Compile-check source files")
                .arg(
                    Arg::new("files")
                        .required(true)
                        .num_args(1..)
                        .value_parser(value_parser!(PathBuf))
                        .help("Files to check"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output results as JSON"),
                ),
        )
        .subcommand(
            Command::new("config").about("Print the effective configuration as TOML"),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json-logs"));

    let result = async {
        let config = commands::load_config(matches.get_one::<PathBuf>("config"))?;
        match matches.subcommand() {
            Some(("probe", args)) => {
                let mut config = config;
                if let Some(parallel) = args.get_one::<usize>("parallel") {
                    config.sandbox.max_parallel_probes = *parallel;
                }
                let dir = args
                    .get_one::<PathBuf>("dir")
                    .ok_or_else(|| anyhow::anyhow!("missing project directory"))?;
                commands::probe(dir, &config, args.get_flag("json")).await
            }
            Some(("check", args)) => {
                let files: Vec<PathBuf> = args.get_many::<PathBuf>("files").into_iter().flatten().cloned().collect();
                commands::check(&files, &config, args.get_flag("json")).await
            }
            Some(("config", _)) => commands::print_config(&config),
            _ => Ok(ExitCode::SUCCESS),
        }
    }
    .await;

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
