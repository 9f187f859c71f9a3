use ald_crawler::artifact::{batch_convert, convert_file, list_artifacts, XlsxWriter};
use ald_crawler::error::PersistenceError;
use clap::Parser;
use std::{path::PathBuf, process::ExitCode};
use tracing::error;
use tracing_error::ErrorLayer;
use tracing_subscriber::prelude::*;

#[derive(Debug, Parser)]
#[command(
    name = "json-to-excel",
    version,
    about = "Convert crawler JSON artifacts into Excel workbooks"
)]
struct Cli {
    /// Records JSON file to convert
    #[arg(required_unless_present_any = ["batch", "list"])]
    input: Option<PathBuf>,
    /// Workbook path (default: next to the input)
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Convert every JSON file in --dir
    #[arg(short, long)]
    batch: bool,
    /// List JSON files in --dir
    #[arg(short, long)]
    list: bool,
    /// Data directory
    #[arg(short, long, default_value = "data")]
    dir: PathBuf,
}

fn run(cli: Cli) -> Result<(), PersistenceError> {
    if cli.list {
        if !cli.dir.is_dir() {
            println!("Data directory {} does not exist", cli.dir.display());
            return Ok(());
        }
        let entries = list_artifacts(&cli.dir)?;
        if entries.is_empty() {
            println!("No JSON files in {}", cli.dir.display());
        }
        for (i, entry) in entries.iter().enumerate() {
            println!("{:>3}. {}", i + 1, entry);
        }
        return Ok(());
    }

    if cli.batch {
        let report = batch_convert(&cli.dir, &XlsxWriter)?;
        println!(
            "Converted {} files, skipped {}:",
            report.converted.len(),
            report.skipped.len()
        );
        for path in &report.converted {
            println!("  {}", path.display());
        }
        return Ok(());
    }

    if let Some(input) = cli.input {
        let output = convert_file(&input, cli.output.as_deref(), &XlsxWriter)?;
        println!("Workbook saved to {}", output.display());
    }
    Ok(())
}

fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL")
                .unwrap_or_else(|_| "info".into()),
        )
        .with(ErrorLayer::default())
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            eprintln!("Conversion failed: {}", e);
            ExitCode::FAILURE
        }
    }
}
