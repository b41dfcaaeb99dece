//! dispose-check: resource lifetime checker CLI
//!
//! Reads a JSON program (procedures + CFGs) and reports instances of
//! disposable types that may not be released.
//!
//! # Usage
//!
//! ```bash
//! dispose-check --program program.json
//! dispose-check --program program.json --config dispose.yaml --format json
//! dispose-check --program program.json --option dispose_analysis_kind=AllPaths
//! ```
//!
//! Exit status: 0 without verdicts, 1 with verdicts, 2 on error.

use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use dispose_flow::{
    analyze_program, AnalysisConfig, AnalysisOutcome, CancellationToken, DisposableTypeSet,
    DisposeFlowError, Program, ProgramReport,
};

#[derive(Parser)]
#[command(name = "dispose-check")]
#[command(about = "Report disposable instances that may not be released", long_about = None)]
struct Cli {
    /// JSON program: {"program": {...}, "disposable_types": {...}}
    #[arg(short, long)]
    program: PathBuf,

    /// YAML configuration file (version 1)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Extra option as key=value, applied after the config file
    #[arg(short = 'o', long = "option", value_name = "KEY=VALUE")]
    options: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum, default_value = "text")]
    format: OutputFormat,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

/// Input file layout
#[derive(Deserialize)]
struct ProgramInput {
    program: Program,
    #[serde(default)]
    disposable_types: DisposableTypeSet,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("dispose_flow=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(report) if report.verdict_count() > 0 => ExitCode::from(1),
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(2)
        }
    }
}

fn run(cli: &Cli) -> Result<ProgramReport, DisposeFlowError> {
    let mut config = match &cli.config {
        Some(path) => AnalysisConfig::from_yaml_file(path)?,
        None => AnalysisConfig::default(),
    };
    config.apply_options(cli.options.iter().filter_map(|option| {
        let parsed = option.split_once('=');
        if parsed.is_none() {
            tracing::warn!("Ignoring option without '=': {}", option);
        }
        parsed
    }));

    let content = std::fs::read_to_string(&cli.program)?;
    let input: ProgramInput = serde_json::from_str(&content)?;
    info!(
        "Loaded {} procedures, {} disposable types",
        input.program.len(),
        input.disposable_types.len()
    );

    let token = CancellationToken::new();
    let report = analyze_program(&input.program, &config, &input.disposable_types, &token);

    match cli.format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_text(&report),
    }
    Ok(report)
}

fn print_text(report: &ProgramReport) {
    for (procedure, verdict) in report.verdicts() {
        println!("{}: {}", procedure, verdict);
    }
    for failed in report.failures() {
        if let AnalysisOutcome::Failed { error } = &failed.outcome {
            println!("{}: analysis failed: {}", failed.procedure, error);
        }
    }
    println!(
        "{} verdict(s) in {} procedure(s)",
        report.verdict_count(),
        report.procedures.len()
    );
}
