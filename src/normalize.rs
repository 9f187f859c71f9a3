use crate::{
    api::{ApiPayload, RawReference},
    page::RawRow,
    record::{compact_reactants, doi_url, parse_citation_count, ProcessRecord, Reference},
    RawPayload,
};
use itertools::Itertools;
use std::collections::HashMap;
use tracing::debug;

/// Heading the rendered table leaks as a data row.
const SENTINEL_MATERIAL: &str = "Lithium";

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Maps source-shaped rows onto [`ProcessRecord`]s. Pure: no I/O.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Normalizer {
    max_records: Option<usize>,
}

impl Normalizer {
    pub fn new(max_records: Option<usize>) -> Normalizer {
        Normalizer { max_records }
    }

    pub fn normalize(&self, raw: RawPayload) -> Vec<ProcessRecord> {
        match raw {
            RawPayload::Api(payload) => self.normalize_api(payload),
            RawPayload::Rendered(rows) => self.normalize_rows(rows),
        }
    }

    #[tracing::instrument(skip_all, fields(processes = payload.processes.len()))]
    pub fn normalize_api(&self, payload: ApiPayload) -> Vec<ProcessRecord> {
        let references: HashMap<String, Vec<Reference>> = payload
            .references
            .into_iter()
            .map(|r| (r.process_id.trim().to_string(), reference_from_raw(r)))
            .into_group_map();

        let records = payload.processes.into_iter().map(|p| {
            let id = p.process_id.trim().to_string();
            ProcessRecord {
                references: references.get(&id).cloned().unwrap_or_default(),
                id: non_empty(&id),
                material: p.process_material.trim().to_string(),
                reactants: compact_reactants([
                    p.process_reactant_a.trim(),
                    p.process_reactant_b.trim(),
                    p.process_reactant_c.trim(),
                    p.process_reactant_d.trim(),
                ]),
                note: non_empty(&p.process_note),
                contributor: non_empty(&p.process_contributor),
                reviewed: p.process_reviewed.trim() == "1",
            }
        });
        self.finish(records)
    }

    #[tracing::instrument(skip_all, fields(rows = rows.len()))]
    pub fn normalize_rows(&self, rows: Vec<RawRow>) -> Vec<ProcessRecord> {
        let records = rows
            .into_iter()
            .filter(|row| {
                let sentinel = row.material.trim() == SENTINEL_MATERIAL
                    && row.reactant_a.trim().is_empty();
                if sentinel {
                    debug!("Skip {} heading row", SENTINEL_MATERIAL);
                }
                !sentinel
            })
            .map(|row| ProcessRecord {
                id: None,
                material: row.material.trim().to_string(),
                reactants: compact_reactants([
                    row.reactant_a.trim(),
                    row.reactant_b.trim(),
                    row.reactant_c.trim(),
                    row.further_reactants.trim(),
                ]),
                note: None,
                contributor: None,
                reviewed: false,
                references: row
                    .references
                    .iter()
                    .filter(|link| !link.name.trim().is_empty() || !link.url.trim().is_empty())
                    .map(|link| Reference::from_link(&link.name, &link.url))
                    .collect(),
            });
        self.finish(records)
    }

    /// Applies the retention invariant, then the cap in source order.
    fn finish(&self, records: impl Iterator<Item = ProcessRecord>) -> Vec<ProcessRecord> {
        let mut dropped = 0usize;
        let retained = records.filter(|r| {
            let keep = r.is_retained();
            if !keep {
                dropped += 1;
            }
            keep
        });
        let records: Vec<_> = match self.max_records {
            Some(cap) => retained.take(cap).collect(),
            None => retained.collect(),
        };
        debug!(
            "Normalized {} records, dropped {} empty rows",
            records.len(),
            dropped
        );
        records
    }
}

fn reference_from_raw(raw: RawReference) -> Reference {
    let identifier = raw.reference_doi.trim().to_string();
    Reference {
        url: doi_url(&identifier),
        identifier,
        display_author: non_empty(&raw.reference_author),
        full_author_list: non_empty(&raw.reference_full_author_list),
        citation_count: parse_citation_count(raw.reference_citations.trim()).unwrap_or(0),
        submitted_date: non_empty(&raw.entry_submitted),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{api::RawProcess, page::RawLink};
    use pretty_assertions::assert_eq;

    fn process(id: &str, material: &str, a: &str, b: &str) -> RawProcess {
        RawProcess {
            process_id: id.to_string(),
            process_material: material.to_string(),
            process_reactant_a: a.to_string(),
            process_reactant_b: b.to_string(),
            ..RawProcess::default()
        }
    }

    fn citation(id: &str, doi: &str, citations: &str) -> RawReference {
        RawReference {
            process_id: id.to_string(),
            reference_doi: doi.to_string(),
            reference_citations: citations.to_string(),
            ..RawReference::default()
        }
    }

    fn row(material: &str, a: &str, b: &str) -> RawRow {
        RawRow {
            material: material.to_string(),
            reactant_a: a.to_string(),
            reactant_b: b.to_string(),
            ..RawRow::default()
        }
    }

    #[test]
    fn joins_references_on_process_id() {
        let payload = ApiPayload {
            success: true,
            processes: vec![
                RawProcess {
                    process_note: "  ".to_string(),
                    process_contributor: "J. Doe".to_string(),
                    process_reviewed: "1".to_string(),
                    ..process("7", "Al2O3", "TMA", "H2O")
                },
                process("8", "ZnO", "DEZ", "H2O"),
            ],
            references: vec![
                citation("7", "10.1000/a", "42"),
                citation("9", "10.1000/orphan", "1"),
                citation(" 7", "10.1000/b", "N/A"),
            ],
        };

        let records = Normalizer::default().normalize(RawPayload::Api(payload));
        assert_eq!(records.len(), 2);

        let first = &records[0];
        assert_eq!(first.id.as_deref(), Some("7"));
        assert_eq!(first.reactants, vec!["TMA", "H2O"]);
        assert_eq!(first.note, None);
        assert_eq!(first.contributor.as_deref(), Some("J. Doe"));
        assert!(first.reviewed);
        assert_eq!(first.references.len(), 2);
        assert_eq!(first.references[0].url, "https://doi.org/10.1000/a");
        assert_eq!(first.references[0].citation_count, 42);
        assert_eq!(first.references[1].citation_count, 0);

        assert!(!records[1].reviewed);
        assert_eq!(records[1].references, vec![]);
    }

    #[test]
    fn retention_needs_material_or_first_reactants() {
        let payload = ApiPayload {
            success: true,
            processes: vec![
                process("1", "", "", "X"),
                process("2", " ", "", ""),
                RawProcess {
                    process_reactant_c: "O3".to_string(),
                    ..process("3", "", "", "")
                },
            ],
            references: vec![],
        };
        let records = Normalizer::default().normalize_api(payload);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id.as_deref(), Some("1"));
        assert_eq!(records[0].reactants, vec!["", "X"]);
    }

    #[test]
    fn rendered_rows_drop_sentinel_and_empty_rows() {
        let rows = vec![
            RawRow {
                reactant_c: "O3".to_string(),
                further_reactants: "NH3".to_string(),
                references: vec![
                    RawLink {
                        name: "Smith 2020".to_string(),
                        url: "https://doi.org/10.1/a".to_string(),
                    },
                    RawLink::default(),
                ],
                ..row("ZnO", "DEZ", "H2O")
            },
            row(" Lithium ", "", ""),
            row("Lithium", "LiOtBu", "H2O"),
            row("", "", ""),
            row("   ", "\t", ""),
        ];

        let records = Normalizer::default().normalize(RawPayload::Rendered(rows));
        let materials: Vec<_> = records.iter().map(|r| r.material.as_str()).collect();
        assert_eq!(materials, vec!["ZnO", "Lithium"]);

        let zno = &records[0];
        assert_eq!(zno.id, None);
        assert_eq!(zno.reactants, vec!["DEZ", "H2O", "O3", "NH3"]);
        assert_eq!(
            zno.references,
            vec![Reference::from_link("Smith 2020", "https://doi.org/10.1/a")]
        );
    }

    #[test]
    fn cap_keeps_first_records_in_source_order() {
        let rows: Vec<_> = (0..10)
            .map(|i| row(&format!("M{}", i), "A", "B"))
            .collect();
        let records = Normalizer::new(Some(3)).normalize_rows(rows);
        let materials: Vec<_> = records.iter().map(|r| r.material.as_str()).collect();
        assert_eq!(materials, vec!["M0", "M1", "M2"]);
    }

    #[test]
    fn cap_counts_retained_records_only() {
        let rows = vec![
            row("", "", ""),
            row("M0", "", ""),
            row("", "", ""),
            row("M1", "", ""),
            row("M2", "", ""),
        ];
        let records = Normalizer::new(Some(2)).normalize_rows(rows);
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].material, "M1");
    }
}
