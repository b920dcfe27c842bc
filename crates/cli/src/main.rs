//! # tablemill-cli
//!
//! Command-line interface for the tablemill pipeline.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::{Path, PathBuf};
use tablemill_core::{
    CanonicalSchema, Engine, ErrorPolicy, HookCatalog, RunReport, SchemaConfig, Severity,
    SheetPreview,
};
use tracing_subscriber::EnvFilter;

/// tablemill - map spreadsheet tables onto a canonical schema
#[derive(Parser)]
#[command(name = "tablemill")]
#[command(author, version, about = "Detect, map and normalize spreadsheet tables", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the full pipeline and write an output workbook
    Run {
        /// Source workbook
        #[arg(value_name = "SOURCE")]
        source: PathBuf,

        /// Schema file (.yaml, .yml or .json)
        #[arg(short, long, value_name = "SCHEMA")]
        schema: PathBuf,

        /// Output workbook
        #[arg(short, long, value_name = "OUTPUT")]
        output: PathBuf,

        /// Write the run report as JSON
        #[arg(long, value_name = "JSON")]
        report: Option<PathBuf>,

        /// Stop at the first failure
        #[arg(long)]
        fail_fast: bool,
    },

    /// Print the tables found in each sheet without writing anything
    Detect {
        /// Source workbook
        #[arg(value_name = "SOURCE")]
        source: PathBuf,

        /// Schema file whose detection settings to use
        #[arg(short, long, value_name = "SCHEMA")]
        schema: Option<PathBuf>,

        /// Output format
        #[arg(short = 'f', long = "format", default_value = "table")]
        format: OutputFormat,
    },
}

/// Output format for detection results.
#[derive(Clone, Copy, Default, clap::ValueEnum)]
enum OutputFormat {
    /// JSON output
    Json,
    /// Readable listing (default)
    #[default]
    Table,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over the verbosity flag
    let default_level = if cli.verbose { "info" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Run {
            source,
            schema,
            output,
            report,
            fail_fast,
        } => run(&source, &schema, &output, report.as_deref(), fail_fast),
        Command::Detect {
            source,
            schema,
            format,
        } => detect(&source, schema.as_deref(), format),
    }
}

fn load_config(path: &Path) -> Result<SchemaConfig> {
    SchemaConfig::from_path(path).with_context(|| format!("Failed to load schema: {}", path.display()))
}

/// Run the pipeline and print a summary.
fn run(source: &Path, schema: &Path, output: &Path, report_path: Option<&Path>, fail_fast: bool) -> Result<()> {
    let mut config = load_config(schema)?;
    if fail_fast {
        config.engine.error_policy = ErrorPolicy::AbortRun;
    }
    let engine = Engine::from_config(config, &HookCatalog::new())
        .with_context(|| format!("Invalid schema: {}", schema.display()))?;

    tracing::info!(source = %source.display(), schema = %schema.display(), fail_fast, "starting tablemill run");
    let report = engine
        .run(source, output)
        .with_context(|| format!("Failed to process {}", source.display()))?;

    if let Some(path) = report_path {
        let json = report.to_json()?;
        std::fs::write(path, json)
            .with_context(|| format!("Failed to write report: {}", path.display()))?;
        tracing::info!(path = %path.display(), "wrote run report");
    }

    print_summary(&report);
    Ok(())
}

fn print_summary(report: &RunReport) {
    for sheet in &report.sheets {
        println!("{} {}", "Sheet".cyan().bold(), sheet.name.bold());
        if let Some(skipped) = &sheet.skipped {
            println!("  {} {}", "skipped:".red(), skipped.message);
        }
        if let Some(error) = &sheet.detection_error {
            println!("  {} {}", "detection:".red(), error);
        }
        for table in &sheet.tables {
            let errors = table.issues.iter().filter(|i| i.severity == Severity::Error).count();
            let warnings = table.issues.len() - errors;
            println!(
                "  {} -> {}  {} rows, {} errors, {} warnings",
                table.region,
                table.placement.range(),
                table.rows,
                errors,
                warnings
            );
        }
        for failure in &sheet.failures {
            println!("  {} {}", "failed:".red().bold(), failure.message);
        }
    }
    for failure in &report.failures {
        println!("{} {}", "Hook failed:".red().bold(), failure.message);
    }

    let failures = report.failure_count();
    let status = if failures == 0 {
        "Done".green().bold()
    } else {
        "Done with failures".yellow().bold()
    };
    println!(
        "{status}: {} tables written to {}, {} errors, {} warnings, {} failures",
        report.table_count(),
        report.target.display(),
        report.issue_count(Severity::Error),
        report.issue_count(Severity::Warning),
        failures
    );
}

/// Detect tables and print them.
fn detect(source: &Path, schema: Option<&Path>, format: OutputFormat) -> Result<()> {
    let config = match schema {
        Some(path) => load_config(path)?,
        None => SchemaConfig::new(CanonicalSchema::new(Vec::new())),
    };
    let engine = Engine::builder(config.schema)
        .detection(config.detection)
        .build()
        .context("Invalid detection settings")?;
    let previews = engine
        .detect(source)
        .with_context(|| format!("Failed to read {}", source.display()))?;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&previews)?),
        OutputFormat::Table => print_previews(&previews),
    }
    Ok(())
}

fn print_previews(previews: &[SheetPreview]) {
    for sheet in previews {
        println!("{} {}", "Sheet".cyan().bold(), sheet.name.bold());
        if let Some(error) = &sheet.error {
            println!("  {} {}", "error:".red().bold(), error);
            continue;
        }
        if sheet.tables.is_empty() {
            println!("  {}", "no tables".dimmed());
        }
        for table in &sheet.tables {
            println!(
                "  {} ({} rows): {}",
                table.region.to_string().yellow(),
                table.rows,
                table.header.join(" | ")
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_run_arguments() {
        let cli = Cli::try_parse_from([
            "tablemill", "run", "in.xlsx", "-s", "schema.yaml", "-o", "out.xlsx", "--fail-fast", "-v",
        ])
        .unwrap();
        assert!(cli.verbose);
        match cli.command {
            Command::Run {
                source,
                output,
                report,
                fail_fast,
                ..
            } => {
                assert_eq!(source, PathBuf::from("in.xlsx"));
                assert_eq!(output, PathBuf::from("out.xlsx"));
                assert!(report.is_none());
                assert!(fail_fast);
            }
            Command::Detect { .. } => panic!("expected run"),
        }
    }

    #[test]
    fn test_run_requires_schema_and_output() {
        assert!(Cli::try_parse_from(["tablemill", "run", "in.xlsx"]).is_err());
    }

    #[test]
    fn test_detect_defaults() {
        let cli = Cli::try_parse_from(["tablemill", "detect", "in.xlsx"]).unwrap();
        match cli.command {
            Command::Detect { schema, format, .. } => {
                assert!(schema.is_none());
                assert!(matches!(format, OutputFormat::Table));
            }
            Command::Run { .. } => panic!("expected detect"),
        }
    }
}
