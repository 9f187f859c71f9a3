use crate::record::ProcessRecord;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub const TOP_MATERIALS: usize = 20;
pub const TOP_REACTANTS: usize = 20;
pub const TOP_CONTRIBUTORS: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankedEntry {
    pub name: String,
    pub count: usize,
}

/// Read-only summary of one record set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AggregateStatistics {
    pub total_records: usize,
    pub reviewed_count: usize,
    pub with_references: usize,
    pub total_references: usize,
    pub total_citations: u64,
    pub top_materials: Vec<RankedEntry>,
    pub top_reactants: Vec<RankedEntry>,
    pub top_contributors: Vec<RankedEntry>,
    pub generated_at: DateTime<FixedOffset>,
}

/// Counts trimmed, non-empty values, remembering first-seen order.
#[derive(Debug, Default)]
struct Frequency {
    index: HashMap<String, usize>,
    entries: Vec<RankedEntry>,
}

impl Frequency {
    fn add(&mut self, value: &str) {
        let value = value.trim();
        if value.is_empty() {
            return;
        }
        match self.index.get(value) {
            Some(&i) => self.entries[i].count += 1,
            None => {
                self.index.insert(value.to_string(), self.entries.len());
                self.entries.push(RankedEntry {
                    name: value.to_string(),
                    count: 1,
                });
            }
        }
    }

    /// `sort_by` is stable, so ties keep first-seen order.
    fn top(mut self, n: usize) -> Vec<RankedEntry> {
        self.entries.sort_by(|a, b| b.count.cmp(&a.count));
        self.entries.truncate(n);
        self.entries
    }
}

impl AggregateStatistics {
    #[tracing::instrument(skip_all, fields(records = records.len()))]
    pub fn aggregate(
        records: &[ProcessRecord],
        generated_at: DateTime<FixedOffset>,
    ) -> AggregateStatistics {
        let mut materials = Frequency::default();
        let mut reactants = Frequency::default();
        let mut contributors = Frequency::default();
        let mut reviewed_count = 0;
        let mut with_references = 0;
        let mut total_references = 0;
        let mut total_citations = 0u64;

        for record in records {
            materials.add(&record.material);
            for reactant in &record.reactants {
                reactants.add(reactant);
            }
            if let Some(contributor) = &record.contributor {
                contributors.add(contributor);
            }
            if record.reviewed {
                reviewed_count += 1;
            }
            if !record.references.is_empty() {
                with_references += 1;
            }
            total_references += record.references.len();
            total_citations += u64::from(record.total_citations());
        }

        AggregateStatistics {
            total_records: records.len(),
            reviewed_count,
            with_references,
            total_references,
            total_citations,
            top_materials: materials.top(TOP_MATERIALS),
            top_reactants: reactants.top(TOP_REACTANTS),
            top_contributors: contributors.top(TOP_CONTRIBUTORS),
            generated_at,
        }
    }

    pub fn from_records(records: &[ProcessRecord]) -> AggregateStatistics {
        AggregateStatistics::aggregate(records, crate::utils::get_now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Reference;
    use pretty_assertions::assert_eq;

    fn record(material: &str, reactants: &[&str], contributor: Option<&str>) -> ProcessRecord {
        ProcessRecord {
            id: None,
            material: material.to_string(),
            reactants: reactants.iter().map(|r| r.to_string()).collect(),
            note: None,
            contributor: contributor.map(str::to_string),
            reviewed: false,
            references: vec![],
        }
    }

    fn entry(name: &str, count: usize) -> RankedEntry {
        RankedEntry {
            name: name.to_string(),
            count,
        }
    }

    fn at() -> DateTime<FixedOffset> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00+02:00").unwrap()
    }

    #[test]
    fn counts_and_coverage() {
        let mut cited = record("Al2O3", &["TMA", "H2O"], Some("Doe"));
        cited.reviewed = true;
        cited.references = vec![
            Reference {
                citation_count: 42,
                ..Reference::from_doi("10.1/a")
            },
            Reference::from_doi("10.1/b"),
        ];
        let records = vec![
            cited,
            record(" Al2O3 ", &["TMA", "O3"], Some(" ")),
            record("ZnO", &["DEZ", "H2O"], None),
        ];

        let stats = AggregateStatistics::aggregate(&records, at());
        assert_eq!(stats.total_records, 3);
        assert_eq!(stats.reviewed_count, 1);
        assert_eq!(stats.with_references, 1);
        assert_eq!(stats.total_references, 2);
        assert_eq!(stats.total_citations, 42);
        assert_eq!(stats.top_materials, vec![entry("Al2O3", 2), entry("ZnO", 1)]);
        assert_eq!(
            stats.top_reactants,
            vec![
                entry("TMA", 2),
                entry("H2O", 2),
                entry("O3", 1),
                entry("DEZ", 1)
            ]
        );
        assert_eq!(stats.top_contributors, vec![entry("Doe", 1)]);
    }

    #[test]
    fn ties_keep_first_seen_order_after_truncation() {
        let records: Vec<_> = (0..25)
            .map(|i| record(&format!("M{:02}", i), &[], None))
            .chain(std::iter::once(record("M24", &[], None)))
            .collect();

        let stats = AggregateStatistics::aggregate(&records, at());
        assert_eq!(stats.top_materials.len(), TOP_MATERIALS);
        assert_eq!(stats.top_materials[0], entry("M24", 2));
        let rest: Vec<_> = stats.top_materials[1..]
            .iter()
            .map(|e| e.name.as_str())
            .collect();
        let expected: Vec<_> = (0..19).map(|i| format!("M{:02}", i)).collect();
        assert_eq!(rest, expected);
    }

    #[test]
    fn empty_set() {
        let stats = AggregateStatistics::aggregate(&[], at());
        assert_eq!(stats.total_records, 0);
        assert!(stats.top_materials.is_empty());
        assert_eq!(stats.generated_at, at());
    }
}
