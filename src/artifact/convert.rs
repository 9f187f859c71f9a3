use super::{build_sheets, json_files, load_records, WorkbookWriter};
use crate::{error::PersistenceError, stats::AggregateStatistics};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Converts one records artifact into a workbook next to it, or at `output`.
pub fn convert_file<W: WorkbookWriter>(
    input: &Path,
    output: Option<&Path>,
    workbook: &W,
) -> Result<PathBuf, PersistenceError> {
    let records = load_records(input)?;
    let stats = AggregateStatistics::from_records(&records);
    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| input.with_extension("xlsx"));

    workbook.save(&build_sheets(&records, Some(&stats)), &output)?;
    info!(
        "Converted {} records from {} to {}",
        records.len(),
        input.display(),
        output.display()
    );
    Ok(output)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub converted: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

/// Converts every process-data JSON file directly under `dir`. Files that
/// are not process data, or do not parse, are skipped.
pub fn batch_convert<W: WorkbookWriter>(
    dir: &Path,
    workbook: &W,
) -> Result<BatchReport, PersistenceError> {
    let mut report = BatchReport::default();
    for path in json_files(dir)? {
        match convert_file(&path, None, workbook) {
            Ok(output) => report.converted.push(output),
            Err(e @ PersistenceError::NotProcessData { .. })
            | Err(e @ PersistenceError::Parse { .. }) => {
                warn!("Skip {}: {}", path.display(), e);
                report.skipped.push(path);
            }
            Err(e) => return Err(e),
        }
    }
    info!(
        "Converted {} files, skipped {}",
        report.converted.len(),
        report.skipped.len()
    );
    Ok(report)
}
