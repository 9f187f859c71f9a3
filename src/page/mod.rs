mod script;
mod snapshot;
mod source;

pub use snapshot::{extract_rows, SnapshotSource};
pub use source::RenderedSource;

use crate::error::ExtractionError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body text the site serves when scripts never ran.
pub const JAVASCRIPT_PLACEHOLDER: &str = "You need to enable JavaScript";
/// Rows carrying this class are category headings, not processes.
pub const SUBTITLE_CLASS: &str = "processList--subtitle";

/// One projected table row, as produced by the extraction script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawRow {
    pub material: String,
    pub reactant_a: String,
    pub reactant_b: String,
    pub reactant_c: String,
    pub further_reactants: String,
    pub references: Vec<RawLink>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RawLink {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadyStrategy {
    /// Wait for the process table element to exist.
    #[default]
    #[serde(rename = "table")]
    Table,
    /// Wait for `document.readyState == "complete"`.
    #[serde(rename = "document")]
    DocumentComplete,
}

pub(crate) fn decode_rows(value: Value) -> Result<Vec<RawRow>, ExtractionError> {
    let rows: Vec<RawRow> = serde_json::from_value(value).map_err(ExtractionError::Malformed)?;
    if rows.is_empty() {
        return Err(ExtractionError::NoRows);
    }
    Ok(rows)
}
