//! dupcode - duplicate key detector for delimited record files

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dupcode_common::compress::{compress, derive_output_name};
use dupcode_common::logging::{init_logging, LogConfig, LogLevel};
use dupcode_scan::config::parse_delimiter;
use dupcode_scan::{list_work_units, Coordinator, RunOutcome, RunReport, ScanConfig, WorkUnit};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "dupcode")]
#[command(author, version, about = "Find duplicate keys across delimited record files")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan every file in a directory for duplicate keys
    Scan {
        /// Directory holding the record files
        dir: PathBuf,

        /// Zero-based index of the key field
        #[arg(long)]
        key_column: Option<usize>,

        /// First-field value marking a header row ("" disables header skipping)
        #[arg(long)]
        header: Option<String>,

        /// Field delimiter (single character or "tab")
        #[arg(long)]
        delimiter: Option<String>,

        /// Maximum number of files scanned at once
        #[arg(long)]
        max_workers: Option<usize>,

        /// Milliseconds to wait for workers after the first duplicate
        #[arg(long)]
        grace_ms: Option<u64>,

        /// Only scan files with this extension
        #[arg(long)]
        extension: Option<String>,

        /// Ignore whitespace around keys
        #[arg(long)]
        trim_keys: bool,

        /// Result format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        format: OutputFormat,
    },

    /// Gzip a file, writing it under a new extension
    Compress {
        /// File to compress
        file: PathBuf,

        /// Extension of the compressed file
        #[arg(long, default_value = "gz")]
        ext: String,

        /// Directory for the output (defaults to the input's directory)
        #[arg(long)]
        output_dir: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let cli = Cli::parse();

    let log_config = LogConfig::builder()
        .level(if cli.verbose { LogLevel::Debug } else { LogLevel::Warn })
        .log_file_prefix("dupcode")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // The scan should still run if logging cannot be set up
    let _log_guard = init_logging(&log_config).ok();

    match execute_command(cli.command).await {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Command failed");
            eprintln!("Error: {e:#}");
            ExitCode::from(2)
        },
    }
}

async fn execute_command(command: Commands) -> Result<ExitCode> {
    match command {
        Commands::Scan {
            dir,
            key_column,
            header,
            delimiter,
            max_workers,
            grace_ms,
            extension,
            trim_keys,
            format,
        } => {
            let mut config = ScanConfig::from_env()?;
            if let Some(column) = key_column {
                config.key_column = column;
            }
            if let Some(header) = header {
                config.header_sentinel = (!header.is_empty()).then_some(header);
            }
            if let Some(delimiter) = delimiter {
                config.delimiter = parse_delimiter(&delimiter)?;
            }
            if let Some(limit) = max_workers {
                config.max_workers = Some(limit);
            }
            if let Some(millis) = grace_ms {
                config.drain_grace = Duration::from_millis(millis);
            }
            if let Some(extension) = extension {
                config.extension = Some(extension.trim_start_matches('.').to_string());
            }
            if trim_keys {
                config.trim_keys = true;
            }
            config.validate()?;

            scan(dir, config, format).await
        },
        Commands::Compress {
            file,
            ext,
            output_dir,
        } => {
            compress_file(file, &ext, output_dir).await?;
            Ok(ExitCode::SUCCESS)
        },
    }
}

async fn scan(dir: PathBuf, config: ScanConfig, format: OutputFormat) -> Result<ExitCode> {
    info!(dir = %dir.display(), "Starting scan");

    let units = list_work_units(&dir, config.extension.as_deref(), config.delimiter).await?;
    let mut coordinator = Coordinator::new(config);
    let report = coordinator
        .run_report(units.into_iter().map(WorkUnit::boxed))
        .await;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&report)?),
        OutputFormat::Text => print_text(&report),
    }

    Ok(match report.outcome {
        RunOutcome::Clean => ExitCode::SUCCESS,
        RunOutcome::DuplicateFound(_) => ExitCode::from(1),
        RunOutcome::Failed { .. } => ExitCode::from(2),
    })
}

fn print_text(report: &RunReport) {
    match &report.outcome {
        RunOutcome::Clean => println!(
            "No duplicates found ({} keys across {} files)",
            report.distinct_keys,
            report.units.len()
        ),
        RunOutcome::DuplicateFound(event) => println!("{event}"),
        RunOutcome::Failed { unit, cause } => eprintln!("Scan failed for {unit}: {cause}"),
    }
}

async fn compress_file(file: PathBuf, ext: &str, output_dir: Option<PathBuf>) -> Result<()> {
    let name = file
        .file_name()
        .and_then(|name| name.to_str())
        .with_context(|| format!("'{}' has no usable file name", file.display()))?;
    let output_name = derive_output_name(name, ext)?;

    let target_dir = match output_dir {
        Some(dir) => dir,
        None => file.parent().map(PathBuf::from).unwrap_or_default(),
    };
    let output = target_dir.join(output_name);
    if same_file(&file, &output).await {
        bail!(
            "'{}' would be overwritten by its compressed copy; pass a different --ext or --output-dir",
            file.display()
        );
    }

    let data = tokio::fs::read(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let compressed = tokio::task::spawn_blocking(move || compress(&data)).await??;

    tokio::fs::write(&output, &compressed)
        .await
        .with_context(|| format!("Failed to write {}", output.display()))?;

    info!(input = %file.display(), output = %output.display(), bytes = compressed.len(), "Compressed file");
    println!("Wrote {}", output.display());
    Ok(())
}

async fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (tokio::fs::canonicalize(a).await, tokio::fs::canonicalize(b).await) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
