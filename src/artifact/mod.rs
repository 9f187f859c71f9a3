mod convert;
mod sheet;

pub use convert::{batch_convert, convert_file, BatchReport};
pub use sheet::{
    build_sheets, process_sheet, reference_sheet, statistics_sheet, Cell, Sheet, WorkbookWriter,
    XlsxWriter, JOIN_DELIMITER, PROCESS_SHEET, REFERENCE_SHEET, STATISTICS_SHEET,
};

use crate::{
    error::PersistenceError,
    record::ProcessRecord,
    stats::AggregateStatistics,
    utils::{parse_timestamp_slug, timestamp_slug},
};
use chrono::{DateTime, FixedOffset};
use lazy_regex::regex;
use serde::Serialize;
use serde_json::Value;
use std::{
    fmt, fs,
    path::{Path, PathBuf},
};
use tracing::{debug, info};

/// Root data directory with its `resources/` and `debug/` areas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> DataLayout {
        DataLayout { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn resources_dir(&self) -> PathBuf {
        self.root.join("resources")
    }

    pub fn debug_dir(&self) -> PathBuf {
        self.root.join("debug")
    }

    pub fn ensure(&self) -> Result<(), PersistenceError> {
        for dir in [self.root.clone(), self.resources_dir(), self.debug_dir()] {
            create_dir(&dir)?;
        }
        Ok(())
    }
}

fn create_dir(dir: &Path) -> Result<(), PersistenceError> {
    fs::create_dir_all(dir).map_err(|source| PersistenceError::Io {
        path: dir.to_path_buf(),
        source,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    Full,
    Test,
}

impl RunMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunMode::Full => "full",
            RunMode::Test => "test",
        }
    }
}

#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Source name, used as the file name prefix.
    pub prefix: &'static str,
    pub mode: RunMode,
    /// Replaces the timestamped records path.
    pub output: Option<PathBuf>,
    pub excel: bool,
    pub statistics_sheet: bool,
}

/// Locations written by one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactSet {
    pub records: PathBuf,
    pub latest: PathBuf,
    pub statistics: PathBuf,
    pub workbook: Option<PathBuf>,
    pub latest_workbook: Option<PathBuf>,
}

impl ArtifactSet {
    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        [&self.records, &self.latest, &self.statistics]
            .into_iter()
            .chain(self.workbook.as_ref())
            .chain(self.latest_workbook.as_ref())
            .map(PathBuf::as_path)
    }
}

pub struct ArtifactWriter<W = XlsxWriter> {
    layout: DataLayout,
    workbook: W,
}

impl ArtifactWriter<XlsxWriter> {
    pub fn new(layout: DataLayout) -> ArtifactWriter<XlsxWriter> {
        ArtifactWriter {
            layout,
            workbook: XlsxWriter,
        }
    }
}

impl<W: WorkbookWriter> ArtifactWriter<W> {
    pub fn with_workbook(layout: DataLayout, workbook: W) -> ArtifactWriter<W> {
        ArtifactWriter { layout, workbook }
    }

    pub fn layout(&self) -> &DataLayout {
        &self.layout
    }

    /// Writes the records, the latest snapshot, the statistics and, when
    /// enabled, the workbooks. Files already written stay in place if a
    /// later one fails.
    #[tracing::instrument(skip_all, fields(prefix = options.prefix, mode = options.mode.as_str()))]
    pub fn write(
        &self,
        records: &[ProcessRecord],
        stats: &AggregateStatistics,
        options: &WriteOptions,
    ) -> Result<ArtifactSet, PersistenceError> {
        self.layout.ensure()?;
        let root = self.layout.root();
        let ts = timestamp_slug(&stats.generated_at);
        let (prefix, mode) = (options.prefix, options.mode.as_str());

        let records_path = match &options.output {
            Some(path) => path.clone(),
            None => root.join(format!("{}_{}_data_{}.json", prefix, mode, ts)),
        };
        if let Some(parent) = records_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_dir(parent)?;
        }
        let latest = root.join(format!("{}_latest_data.json", prefix));
        let statistics = root.join(format!("{}_{}_statistics_{}.json", prefix, mode, ts));

        write_json(&records_path, records)?;
        write_json(&latest, records)?;
        write_json(&statistics, stats)?;

        let (workbook, latest_workbook) = if options.excel {
            let sheets = build_sheets(records, options.statistics_sheet.then_some(stats));
            let workbook = records_path.with_extension("xlsx");
            let latest_workbook = root.join(format!("{}_latest_data.xlsx", prefix));
            self.workbook.save(&sheets, &workbook)?;
            self.workbook.save(&sheets, &latest_workbook)?;
            (Some(workbook), Some(latest_workbook))
        } else {
            (None, None)
        };

        let set = ArtifactSet {
            records: records_path,
            latest,
            statistics,
            workbook,
            latest_workbook,
        };
        info!("Saved {} records to {}", records.len(), set.records.display());
        Ok(set)
    }
}

pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<(), PersistenceError> {
    let json = serde_json::to_string_pretty(value).map_err(|source| PersistenceError::Json {
        path: path.to_path_buf(),
        source,
    })?;
    fs::write(path, json).map_err(|source| PersistenceError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    debug!("Wrote {}", path.display());
    Ok(())
}

/// Loads a records artifact. Files that are not a non-empty array of
/// objects carrying `material` are rejected as not process data.
pub fn load_records(path: &Path) -> Result<Vec<ProcessRecord>, PersistenceError> {
    let content = fs::read_to_string(path).map_err(|source| PersistenceError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&content).map_err(|source| PersistenceError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    let is_process_data = value
        .as_array()
        .and_then(|items| items.first())
        .map_or(false, |first| first.get("material").is_some());
    if !is_process_data {
        return Err(PersistenceError::NotProcessData {
            path: path.to_path_buf(),
        });
    }

    serde_json::from_value(value).map_err(|source| PersistenceError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactEntry {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub timestamp: Option<DateTime<FixedOffset>>,
}

impl ArtifactEntry {
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }
}

impl fmt::Display for ArtifactEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<50} {:>8.2} MB", self.name(), self.size_mb())?;
        if let Some(ts) = self.timestamp {
            write!(f, "  {}", ts.format("%Y-%m-%d %H:%M:%S"))?;
        }
        Ok(())
    }
}

fn name_timestamp(name: &str) -> Option<DateTime<FixedOffset>> {
    let captures = regex!(r"_(\d{8}_\d{6})\.json$").captures(name)?;
    parse_timestamp_slug(captures.get(1)?.as_str())
}

/// JSON files directly under `dir`, sorted by name.
pub(crate) fn json_files(dir: &Path) -> Result<Vec<PathBuf>, PersistenceError> {
    let entries = fs::read_dir(dir).map_err(|source| PersistenceError::Read {
        path: dir.to_path_buf(),
        source,
    })?;
    let mut files: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().map_or(false, |e| e == "json"))
        .collect();
    files.sort();
    Ok(files)
}

pub fn list_artifacts(dir: &Path) -> Result<Vec<ArtifactEntry>, PersistenceError> {
    json_files(dir)?
        .into_iter()
        .map(|path| {
            let size_bytes = fs::metadata(&path)
                .map_err(|source| PersistenceError::Read {
                    path: path.clone(),
                    source,
                })?
                .len();
            let timestamp = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(name_timestamp);
            Ok(ArtifactEntry {
                path,
                size_bytes,
                timestamp,
            })
        })
        .collect()
}
