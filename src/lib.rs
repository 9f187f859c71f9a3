use std::{fmt, path::PathBuf};
use tokio::time::sleep;
use tracing::{debug, info, warn};
use tracing_error::SpanTrace;

pub mod api;
pub mod artifact;
pub mod browser;
pub mod config;
pub mod diagnostic;
pub mod error;
pub mod normalize;
pub mod page;
pub mod record;
pub mod retry;
pub mod stats;

mod utils;

pub use error::{CrawlerError, Stage};
pub use record::{ProcessRecord, Reference};
pub use stats::AggregateStatistics;

use api::ApiPayload;
use artifact::{ArtifactSet, ArtifactWriter, RunMode, WorkbookWriter, WriteOptions};
use diagnostic::{DebugBundle, DiagnosticCapture, Snapshot};
use normalize::Normalizer;
use page::RawRow;
use retry::RetryPolicy;

/// Source-shaped data, before any interpretation.
#[derive(Debug)]
pub enum RawPayload {
    Api(ApiPayload),
    Rendered(Vec<RawRow>),
}

/// One way of obtaining raw rows.
///
/// `open` and `close` bracket a run; `close` is called on every path once
/// `open` was attempted. `snapshot` describes the current state of the
/// source for diagnostics and is only meaningful after `fetch`.
#[async_trait::async_trait]
pub trait SourceReader: Send {
    /// Short name, also the artifact file prefix.
    fn name(&self) -> &'static str;

    async fn open(&mut self) -> Result<(), CrawlerError> {
        Ok(())
    }

    async fn fetch(&mut self) -> Result<RawPayload, CrawlerError>;

    async fn snapshot(&mut self) -> Result<Option<Snapshot>, CrawlerError> {
        Ok(None)
    }

    async fn close(&mut self) -> Result<(), CrawlerError> {
        Ok(())
    }
}

/// Calls `fetch` until it succeeds, fails for good, or `policy` runs out.
/// Only transient failures earn another attempt.
pub async fn fetch_with_retry(
    source: &mut dyn SourceReader,
    policy: &RetryPolicy,
) -> Result<RawPayload, CrawlerError> {
    let attempts = policy.max_attempts();
    let mut attempt = 0;
    loop {
        match source.fetch().await {
            Ok(payload) => return Ok(payload),
            Err(e) if e.is_transient() && attempt + 1 < attempts => {
                let delay = policy.backoff(attempt);
                warn!(
                    "Attempt {}/{} on {} failed: {}. Retrying in {:?}",
                    attempt + 1,
                    attempts,
                    source.name(),
                    e,
                    delay
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Mode and cap for a run: `full` wins, then `test` (falling back to
/// `test_default`), then a bare `max_records`.
pub fn resolve_cap(
    test: bool,
    full: bool,
    max_records: Option<usize>,
    test_default: usize,
) -> (RunMode, Option<usize>) {
    if full {
        (RunMode::Full, None)
    } else if test {
        (RunMode::Test, Some(max_records.unwrap_or(test_default)))
    } else {
        match max_records {
            Some(cap) => (RunMode::Test, Some(cap)),
            None => (RunMode::Full, None),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunOptions {
    pub mode: RunMode,
    pub max_records: Option<usize>,
    pub output: Option<PathBuf>,
    pub excel: bool,
    pub statistics_sheet: bool,
    /// Keep the page of a successful run under `resources/`.
    pub capture_resources: bool,
    pub retry: RetryPolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            mode: RunMode::Full,
            max_records: None,
            output: None,
            excel: true,
            statistics_sheet: true,
            capture_resources: false,
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub records: Vec<ProcessRecord>,
    pub statistics: AggregateStatistics,
    pub artifacts: ArtifactSet,
    pub resources: Vec<PathBuf>,
}

/// A run that stopped, with what was captured on the way out.
#[derive(Debug)]
pub struct RunFailure {
    pub error: CrawlerError,
    pub debug_bundle: Option<DebugBundle>,
    pub span_trace: SpanTrace,
}

impl RunFailure {
    fn new(error: CrawlerError, debug_bundle: Option<DebugBundle>) -> RunFailure {
        RunFailure {
            error,
            debug_bundle,
            span_trace: SpanTrace::capture(),
        }
    }

    pub fn stage(&self) -> Stage {
        self.error.stage()
    }
}

impl From<CrawlerError> for RunFailure {
    fn from(error: CrawlerError) -> Self {
        RunFailure::new(error, None)
    }
}

impl fmt::Display for RunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} stage failed: {}", self.stage(), self.error)
    }
}

impl std::error::Error for RunFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

async fn close_source(source: &mut dyn SourceReader) {
    if let Err(e) = source.close().await {
        warn!("Cannot close {} source: {}", source.name(), e);
    }
}

/// Acquire, normalize, aggregate, persist.
///
/// The source is closed before normalization starts, whatever the outcome of
/// acquisition. Acquisition failures leave a debug bundle behind.
#[tracing::instrument(skip_all, fields(source = source.name(), mode = options.mode.as_str()))]
pub async fn run_pipeline<W: WorkbookWriter>(
    source: &mut dyn SourceReader,
    writer: &ArtifactWriter<W>,
    options: &RunOptions,
) -> Result<RunReport, RunFailure> {
    let capture = DiagnosticCapture::new(writer.layout().clone());

    let acquired = match source.open().await {
        Ok(()) => fetch_with_retry(source, &options.retry).await,
        Err(e) => Err(e),
    };
    let raw = match acquired {
        Ok(raw) => raw,
        Err(error) => {
            let bundle = capture.capture(source, &error).await;
            close_source(source).await;
            return Err(RunFailure::new(error, bundle));
        }
    };

    let mut resources = vec![];
    if options.capture_resources {
        match source.snapshot().await {
            Ok(Some(snapshot)) => resources = capture.capture_resources(&snapshot),
            Ok(None) => {}
            Err(e) => warn!("Cannot snapshot {} source: {}", source.name(), e),
        }
    }
    close_source(source).await;

    let records = Normalizer::new(options.max_records).normalize(raw);
    info!("{} records after normalization", records.len());
    let statistics = AggregateStatistics::from_records(&records);

    let write = WriteOptions {
        prefix: source.name(),
        mode: options.mode,
        output: options.output.clone(),
        excel: options.excel,
        statistics_sheet: options.statistics_sheet,
    };
    let artifacts = writer
        .write(&records, &statistics, &write)
        .map_err(CrawlerError::from)?;
    debug!("Wrote {} artifacts", artifacts.paths().count());

    Ok(RunReport {
        records,
        statistics,
        artifacts,
        resources,
    })
}
