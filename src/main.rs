use ald_crawler::{
    api::ApiSource,
    artifact::{list_artifacts, ArtifactWriter, DataLayout},
    browser::WebDriver,
    config::Config,
    error::{ConfigError, CrawlerError},
    page::{RenderedSource, SnapshotSource},
    resolve_cap, run_pipeline, RunFailure, RunOptions, RunReport, SourceReader,
};
use clap::{Parser, ValueEnum};
use std::{error::Error, path::PathBuf, process::ExitCode};
use tracing::{error, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::prelude::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum SourceKind {
    /// JSON endpoint behind the database page
    Api,
    /// The rendered page, driven through WebDriver
    Page,
    /// A page saved by an earlier run
    Snapshot,
}

#[derive(Debug, Parser)]
#[command(
    name = "ald-crawler",
    version,
    about = "Crawl the ALD process database into JSON and Excel artifacts"
)]
struct Cli {
    /// Configuration file (default: ald-crawler.toml when present)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Root directory for artifacts
    #[arg(long)]
    data_dir: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = SourceKind::Api)]
    source: SourceKind,
    /// Saved page read by `--source snapshot`
    #[arg(long)]
    snapshot_file: Option<PathBuf>,
    /// Keep only the first records (see --max-records)
    #[arg(long, conflicts_with = "full")]
    test: bool,
    /// Keep every record, ignoring any cap
    #[arg(long)]
    full: bool,
    /// Record cap for a test run
    #[arg(short = 'n', long)]
    max_records: Option<usize>,
    /// Records JSON path instead of the timestamped default
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Skip the Excel export
    #[arg(long)]
    no_excel: bool,
    /// WebDriver server for `--source page`
    #[arg(long, env = "WEBDRIVER_URL")]
    webdriver: Option<String>,
    /// List existing JSON artifacts and exit
    #[arg(long)]
    list: bool,
}

fn print_summary(report: &RunReport) {
    let stats = &report.statistics;
    println!("Records           : {}", stats.total_records);
    println!("Reviewed          : {}", stats.reviewed_count);
    println!("With references   : {}", stats.with_references);
    println!("Total references  : {}", stats.total_references);
    println!("Artifacts:");
    for path in report.artifacts.paths() {
        println!("  {}", path.display());
    }
    for path in &report.resources {
        println!("  {}", path.display());
    }
    if stats.total_records == 0 {
        println!("No records left after filtering.");
        return;
    }
    println!("First records:");
    for record in report.records.iter().take(3) {
        println!("{}", record);
    }
}

fn print_failure(failure: &RunFailure) {
    eprintln!(
        "Run failed at the {} stage: {}",
        failure.stage(),
        failure.error
    );
    let mut cause = failure.error.source();
    while let Some(e) = cause {
        eprintln!("  caused by: {}", e);
        cause = e.source();
    }
    if let Some(bundle) = &failure.debug_bundle {
        eprintln!("Debug information saved to {}", bundle.dir.display());
    }
    eprintln!("{}", failure.span_trace);
}

fn print_listing(layout: &DataLayout) -> Result<(), CrawlerError> {
    if !layout.root().is_dir() {
        println!("Data directory {} does not exist", layout.root().display());
        return Ok(());
    }
    let entries = list_artifacts(layout.root())?;
    if entries.is_empty() {
        println!("No JSON artifacts in {}", layout.root().display());
    }
    for (i, entry) in entries.iter().enumerate() {
        println!("{:>3}. {}", i + 1, entry);
    }
    Ok(())
}

async fn run(cli: Cli) -> Result<(), RunFailure> {
    let mut config = Config::load(cli.config.as_deref()).map_err(CrawlerError::from)?;
    if let Some(dir) = cli.data_dir {
        config.output.data_dir = dir;
    }
    if let Some(url) = cli.webdriver {
        config.page.webdriver_url = url;
    }
    if cli.no_excel {
        config.output.excel = false;
    }
    let layout = DataLayout::new(&config.output.data_dir);

    if cli.list {
        print_listing(&layout)?;
        return Ok(());
    }

    let (mode, max_records) = resolve_cap(
        cli.test,
        cli.full,
        cli.max_records,
        config.output.test_max_records,
    );

    let mut source: Box<dyn SourceReader> = match cli.source {
        SourceKind::Api => Box::new(ApiSource::new(&config.api).map_err(CrawlerError::from)?),
        SourceKind::Page => {
            let driver = WebDriver::new(&config.page).map_err(CrawlerError::from)?;
            Box::new(RenderedSource::new(driver, config.page.clone()))
        }
        SourceKind::Snapshot => {
            let path = cli
                .snapshot_file
                .ok_or(ConfigError::MissingSnapshotFile)
                .map_err(CrawlerError::from)?;
            Box::new(SnapshotSource::new(path, config.page.clone()))
        }
    };

    let options = RunOptions {
        mode,
        max_records,
        output: cli.output,
        excel: config.output.excel,
        statistics_sheet: config.output.statistics_sheet,
        capture_resources: cli.source == SourceKind::Page && config.page.capture_resources,
        retry: match cli.source {
            SourceKind::Api => config.retry.api,
            _ => config.retry.page,
        },
    };
    info!(
        "Start {} run against {} source (cap: {:?})",
        mode.as_str(),
        source.name(),
        max_records
    );

    let writer = ArtifactWriter::new(layout);
    let report = run_pipeline(source.as_mut(), &writer, &options).await?;
    print_summary(&report);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| {
                "info,html5ever=error,selectors=error,hyper=warn,reqwest=info".into()
            }),
        )
        .with(ErrorLayer::default())
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(failure) => {
            error!("{}", failure);
            print_failure(&failure);
            ExitCode::FAILURE
        }
    }
}
