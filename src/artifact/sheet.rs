use crate::{error::PersistenceError, record::ProcessRecord, stats::AggregateStatistics};
use itertools::Itertools;
use rust_xlsxwriter::{Format, Workbook, XlsxError};
use std::path::Path;

pub const PROCESS_SHEET: &str = "process data";
pub const REFERENCE_SHEET: &str = "reference detail";
pub const STATISTICS_SHEET: &str = "statistics";

/// Separator for multi-valued cells.
pub const JOIN_DELIMITER: &str = "; ";

const PROCESS_MAX_WIDTH: usize = 50;
const REFERENCE_MAX_WIDTH: usize = 60;
const STATISTICS_WIDTHS: [f64; 2] = [30.0, 15.0];

#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Text(String),
    Number(f64),
    Empty,
}

impl Cell {
    fn text(value: impl Into<String>) -> Cell {
        Cell::Text(value.into())
    }

    fn width(&self) -> usize {
        match self {
            Cell::Text(s) => s.chars().count(),
            Cell::Number(n) => n.to_string().len(),
            Cell::Empty => 0,
        }
    }
}

/// A named grid; the first row is the header.
#[derive(Debug, Clone, PartialEq)]
pub struct Sheet {
    pub name: &'static str,
    pub rows: Vec<Vec<Cell>>,
    pub widths: Vec<f64>,
}

impl Sheet {
    fn with_content_widths(name: &'static str, rows: Vec<Vec<Cell>>, max: usize) -> Sheet {
        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        let widths = (0..columns)
            .map(|col| {
                let longest = rows
                    .iter()
                    .filter_map(|row| row.get(col))
                    .map(Cell::width)
                    .max()
                    .unwrap_or(0);
                (longest + 2).min(max) as f64
            })
            .collect();
        Sheet { name, rows, widths }
    }
}

/// Spreadsheet backend seam.
pub trait WorkbookWriter {
    fn save(&self, sheets: &[Sheet], path: &Path) -> Result<(), PersistenceError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct XlsxWriter;

impl XlsxWriter {
    fn build(sheets: &[Sheet], path: &Path) -> Result<(), XlsxError> {
        let mut workbook = Workbook::new();
        let header = Format::new().set_bold();

        for sheet in sheets {
            let worksheet = workbook.add_worksheet();
            worksheet.set_name(sheet.name)?;
            for (r, row) in sheet.rows.iter().enumerate() {
                for (c, cell) in row.iter().enumerate() {
                    let (r, c) = (r as u32, c as u16);
                    match cell {
                        Cell::Text(s) if r == 0 => {
                            worksheet.write_string_with_format(r, c, s, &header)?;
                        }
                        Cell::Text(s) => {
                            worksheet.write_string(r, c, s)?;
                        }
                        Cell::Number(n) => {
                            worksheet.write_number(r, c, *n)?;
                        }
                        Cell::Empty => {}
                    }
                }
            }
            for (c, width) in sheet.widths.iter().enumerate() {
                worksheet.set_column_width(c as u16, *width)?;
            }
        }
        workbook.save(path)
    }
}

impl WorkbookWriter for XlsxWriter {
    fn save(&self, sheets: &[Sheet], path: &Path) -> Result<(), PersistenceError> {
        XlsxWriter::build(sheets, path).map_err(|e| PersistenceError::Workbook {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }
}

fn joined<'a>(values: impl Iterator<Item = &'a str>) -> String {
    values.filter(|v| !v.is_empty()).join(JOIN_DELIMITER)
}

pub fn process_sheet(records: &[ProcessRecord]) -> Sheet {
    let header = [
        "Process ID",
        "Material",
        "Reactant A",
        "Reactant B",
        "Reactant C",
        "Reactant D",
        "Note",
        "Contributor",
        "Reviewed",
        "Reference count",
        "DOIs",
        "URLs",
        "Authors",
        "Total citations",
    ];
    let mut rows = vec![header.iter().map(|h| Cell::text(*h)).collect::<Vec<_>>()];

    for r in records {
        let refs = &r.references;
        rows.push(vec![
            Cell::text(r.id.clone().unwrap_or_default()),
            Cell::text(r.material.as_str()),
            Cell::text(r.reactant(0)),
            Cell::text(r.reactant(1)),
            Cell::text(r.reactant(2)),
            Cell::text(r.reactant(3)),
            Cell::text(r.note.clone().unwrap_or_default()),
            Cell::text(r.contributor.clone().unwrap_or_default()),
            Cell::text(if r.reviewed { "yes" } else { "no" }),
            Cell::Number(refs.len() as f64),
            Cell::text(joined(refs.iter().map(|x| x.identifier.as_str()))),
            Cell::text(joined(refs.iter().map(|x| x.url.as_str()))),
            Cell::text(joined(
                refs.iter().filter_map(|x| x.display_author.as_deref()),
            )),
            Cell::Number(f64::from(r.total_citations())),
        ]);
    }
    Sheet::with_content_widths(PROCESS_SHEET, rows, PROCESS_MAX_WIDTH)
}

/// One row per (process, reference) pair; `None` when nothing is cited.
pub fn reference_sheet(records: &[ProcessRecord]) -> Option<Sheet> {
    if records.iter().all(|r| r.references.is_empty()) {
        return None;
    }
    let header = [
        "Process ID",
        "Material",
        "DOI",
        "URL",
        "Author",
        "Full author list",
        "Citations",
        "Submitted",
    ];
    let mut rows = vec![header.iter().map(|h| Cell::text(*h)).collect::<Vec<_>>()];

    for r in records {
        for x in &r.references {
            rows.push(vec![
                Cell::text(r.id.clone().unwrap_or_default()),
                Cell::text(r.material.as_str()),
                Cell::text(x.identifier.as_str()),
                Cell::text(x.url.as_str()),
                Cell::text(x.display_author.clone().unwrap_or_default()),
                Cell::text(x.full_author_list.clone().unwrap_or_default()),
                Cell::Number(f64::from(x.citation_count)),
                Cell::text(x.submitted_date.clone().unwrap_or_default()),
            ]);
        }
    }
    Some(Sheet::with_content_widths(
        REFERENCE_SHEET,
        rows,
        REFERENCE_MAX_WIDTH,
    ))
}

pub fn statistics_sheet(stats: &AggregateStatistics) -> Sheet {
    let pair = |name: &str, value: usize| vec![Cell::text(name), Cell::Number(value as f64)];
    let mut rows = vec![
        vec![Cell::text("Statistic"), Cell::text("Value")],
        pair("Total records", stats.total_records),
        pair("Reviewed", stats.reviewed_count),
        pair("With references", stats.with_references),
        pair("Total references", stats.total_references),
        vec![
            Cell::text("Total citations"),
            Cell::Number(stats.total_citations as f64),
        ],
        vec![
            Cell::text("Generated at"),
            Cell::text(stats.generated_at.to_rfc3339()),
        ],
    ];

    for (title, table) in [
        ("Top materials", &stats.top_materials),
        ("Top reactants", &stats.top_reactants),
        ("Top contributors", &stats.top_contributors),
    ] {
        rows.push(vec![Cell::Empty, Cell::Empty]);
        rows.push(vec![Cell::text(title), Cell::text("Count")]);
        rows.extend(table.iter().map(|e| pair(e.name.as_str(), e.count)));
    }

    Sheet {
        name: STATISTICS_SHEET,
        rows,
        widths: STATISTICS_WIDTHS.to_vec(),
    }
}

pub fn build_sheets(records: &[ProcessRecord], stats: Option<&AggregateStatistics>) -> Vec<Sheet> {
    let mut sheets = vec![process_sheet(records)];
    sheets.extend(reference_sheet(records));
    sheets.extend(stats.map(statistics_sheet));
    sheets
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::record::Reference;
    use pretty_assertions::assert_eq;
    use std::{path::PathBuf, sync::Mutex};

    /// Keeps what would have been written.
    #[derive(Debug, Default)]
    pub(crate) struct RecordingWorkbook {
        pub saved: Mutex<Vec<(PathBuf, Vec<Sheet>)>>,
    }

    impl WorkbookWriter for RecordingWorkbook {
        fn save(&self, sheets: &[Sheet], path: &Path) -> Result<(), PersistenceError> {
            std::fs::write(path, b"workbook").map_err(|source| PersistenceError::Io {
                path: path.to_path_buf(),
                source,
            })?;
            self.saved
                .lock()
                .unwrap()
                .push((path.to_path_buf(), sheets.to_vec()));
            Ok(())
        }
    }

    fn cited() -> ProcessRecord {
        ProcessRecord {
            id: Some("7".to_string()),
            material: "Al2O3".to_string(),
            reactants: vec!["TMA".to_string(), "".to_string(), "O3".to_string()],
            note: None,
            contributor: Some("Doe".to_string()),
            reviewed: true,
            references: vec![
                Reference {
                    display_author: Some("Smith".to_string()),
                    citation_count: 42,
                    ..Reference::from_doi("10.1/a")
                },
                Reference::from_doi("10.1/b"),
            ],
        }
    }

    fn bare() -> ProcessRecord {
        ProcessRecord {
            id: None,
            material: "ZnO".to_string(),
            reactants: vec!["DEZ".to_string(), "H2O".to_string()],
            note: None,
            contributor: None,
            reviewed: false,
            references: vec![],
        }
    }

    #[test]
    fn process_rows_flatten_references() {
        let sheet = process_sheet(&[cited(), bare()]);
        assert_eq!(sheet.name, PROCESS_SHEET);
        assert_eq!(sheet.rows.len(), 3);
        assert_eq!(sheet.rows[0].len(), 14);
        assert_eq!(
            sheet.rows[1],
            vec![
                Cell::text("7"),
                Cell::text("Al2O3"),
                Cell::text("TMA"),
                Cell::text(""),
                Cell::text("O3"),
                Cell::text(""),
                Cell::text(""),
                Cell::text("Doe"),
                Cell::text("yes"),
                Cell::Number(2.0),
                Cell::text("10.1/a; 10.1/b"),
                Cell::text("https://doi.org/10.1/a; https://doi.org/10.1/b"),
                Cell::text("Smith"),
                Cell::Number(42.0),
            ]
        );
        assert_eq!(sheet.rows[2][8], Cell::text("no"));
        assert_eq!(sheet.rows[2][10], Cell::text(""));
    }

    #[test]
    fn widths_follow_content_up_to_cap() {
        let mut long = bare();
        long.note = Some("x".repeat(200));
        let sheet = process_sheet(&[long]);
        assert_eq!(sheet.widths.len(), 14);
        // "Process ID" header is the longest cell in the first column.
        assert_eq!(sheet.widths[0], 12.0);
        assert_eq!(sheet.widths[6], 50.0);
    }

    #[test]
    fn reference_detail_only_when_cited() {
        assert_eq!(reference_sheet(&[bare()]), None);

        let sheet = reference_sheet(&[cited(), bare()]).unwrap();
        assert_eq!(sheet.rows.len(), 3);
        assert_eq!(sheet.rows[2][2], Cell::text("10.1/b"));
        assert_eq!(sheet.rows[1][6], Cell::Number(42.0));

        let names: Vec<_> = build_sheets(&[bare()], None).iter().map(|s| s.name).collect();
        assert_eq!(names, vec![PROCESS_SHEET]);
    }

    #[test]
    fn statistics_blocks() {
        let records = [cited(), bare()];
        let stats = AggregateStatistics::from_records(&records);
        let sheet = statistics_sheet(&stats);
        assert_eq!(sheet.widths, vec![30.0, 15.0]);
        assert_eq!(sheet.rows[1], vec![Cell::text("Total records"), Cell::Number(2.0)]);
        assert_eq!(sheet.rows[7], vec![Cell::Empty, Cell::Empty]);
        assert_eq!(sheet.rows[8], vec![Cell::text("Top materials"), Cell::text("Count")]);
        assert_eq!(sheet.rows[9], vec![Cell::text("Al2O3"), Cell::Number(1.0)]);

        let names: Vec<_> = build_sheets(&records, Some(&stats))
            .iter()
            .map(|s| s.name)
            .collect();
        assert_eq!(names, vec![PROCESS_SHEET, REFERENCE_SHEET, STATISTICS_SHEET]);
    }

    #[test]
    fn xlsx_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.xlsx");
        XlsxWriter
            .save(&build_sheets(&[cited(), bare()], None), &path)
            .unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(&bytes[..2], b"PK");
    }
}
