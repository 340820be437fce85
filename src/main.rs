//! Binary entry point: wires the CLI to the extraction workflow.

use clap::Parser;
use plsql_catalog::cli::{AnalyzeArgs, Cli, Command, ExitStatus};
use plsql_catalog::config::AnalyzeConfig;
use plsql_catalog::error::Severity;
use plsql_catalog::store::SqliteCatalog;
use plsql_catalog::workflow::{prepare_output_root, Extractor};
use std::fs::File;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();
    match cli.command {
        Command::Analyze(args) => run_analyze(args).into(),
    }
}

fn run_analyze(args: AnalyzeArgs) -> ExitStatus {
    let config = match args.into_config() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("configuration error: {err}");
            return ExitStatus::ConfigError;
        }
    };
    if let Err(err) = config.validate() {
        eprintln!("configuration error: {err}");
        return ExitStatus::ConfigError;
    }
    if let Err(err) = prepare_output_root(&config) {
        eprintln!("error: {err}");
        return ExitStatus::Failure;
    }
    init_logging(&config);

    let mut catalog = match SqliteCatalog::open(config.database_path()) {
        Ok(catalog) => catalog,
        Err(err) => {
            eprintln!(
                "cannot open catalog store {}: {err}",
                config.database_path().display()
            );
            return ExitStatus::Failure;
        }
    };

    let summary = match Extractor::new(&config, &mut catalog).run() {
        Ok(summary) => summary,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitStatus::Failure;
        }
    };

    for diagnostic in &summary.diagnostics {
        let severity = match diagnostic.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        eprintln!(
            "{severity}[{}] {}: {}",
            diagnostic.code,
            diagnostic.path.display(),
            diagnostic.message
        );
    }
    println!(
        "scanned {} file(s): {} skipped, {} reprocessed, {} failed",
        summary.scanned, summary.skipped, summary.reprocessed, summary.failed
    );

    // Non-fatal diagnostics (and per-file failures already reported above)
    // leave the exit code clean.
    ExitStatus::Success
}

/// Routes log output to `<output_root>/logs/analyze.log`; falls back to
/// stderr when the file cannot be created.
fn init_logging(config: &AnalyzeConfig) {
    let mut builder = env_logger::Builder::new();
    builder.filter_level(config.log_level());
    if let Ok(file) = File::create(config.log_dir().join("analyze.log")) {
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    let _ = builder.try_init();
}
