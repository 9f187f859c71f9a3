use serde::{Deserialize, Serialize};
use std::fmt;

pub const DOI_RESOLVER: &str = "https://doi.org/";

/// Reactant slots A..D.
pub const REACTANT_SLOTS: usize = 4;

/// One deposition process. Built once by the normalizer and never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default)]
    pub material: String,
    /// Slots A..D in order, trailing empty slots removed.
    #[serde(default)]
    pub reactants: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contributor: Option<String>,
    #[serde(default)]
    pub reviewed: bool,
    #[serde(default)]
    pub references: Vec<Reference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reference {
    pub identifier: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_author_list: Option<String>,
    #[serde(default)]
    pub citation_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_date: Option<String>,
}

impl ProcessRecord {
    /// Reactant in `slot` (0 = A), empty when the slot was not supplied.
    pub fn reactant(&self, slot: usize) -> &str {
        self.reactants.get(slot).map(String::as_str).unwrap_or("")
    }

    /// Material, reactant A or reactant B must carry text.
    pub fn is_retained(&self) -> bool {
        [self.material.as_str(), self.reactant(0), self.reactant(1)]
            .iter()
            .any(|field| !field.trim().is_empty())
    }

    pub fn total_citations(&self) -> u32 {
        self.references.iter().map(|r| r.citation_count).sum()
    }
}

impl Reference {
    pub fn from_doi(doi: &str) -> Reference {
        let identifier = doi.trim().to_string();
        Reference {
            url: doi_url(&identifier),
            identifier,
            display_author: None,
            full_author_list: None,
            citation_count: 0,
            submitted_date: None,
        }
    }

    pub fn from_link(name: &str, url: &str) -> Reference {
        Reference {
            identifier: name.trim().to_string(),
            url: url.trim().to_string(),
            display_author: None,
            full_author_list: None,
            citation_count: 0,
            submitted_date: None,
        }
    }
}

pub fn doi_url(doi: &str) -> String {
    let doi = doi.trim();
    if doi.is_empty() {
        String::new()
    } else {
        format!("{}{}", DOI_RESOLVER, doi)
    }
}

/// Accepts plain decimal digits only, so "N/A", "-1" and "" are rejected.
pub fn parse_citation_count(raw: &str) -> Option<u32> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

/// Drops trailing empty slots, keeping interior ones so positions hold.
pub(crate) fn compact_reactants<I, S>(slots: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut reactants: Vec<String> = slots
        .into_iter()
        .take(REACTANT_SLOTS)
        .map(|s| {
            let s: String = s.into();
            if s.trim().is_empty() {
                String::new()
            } else {
                s
            }
        })
        .collect();
    while reactants.last().map_or(false, String::is_empty) {
        reactants.pop();
    }
    reactants
}

impl fmt::Display for ProcessRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Id              : {}",
            self.id.as_deref().unwrap_or("None")
        )?;
        writeln!(f, "Material        : {}", self.material)?;
        for (slot, reactant) in self.reactants.iter().enumerate() {
            if !reactant.is_empty() {
                writeln!(
                    f,
                    "Reactant {}      : {}",
                    char::from(b'A' + slot as u8),
                    reactant
                )?;
            }
        }
        if let Some(d) = self.note.as_ref() {
            writeln!(f, "Note            : {}", d)?;
        }
        if let Some(d) = self.contributor.as_ref() {
            writeln!(f, "Contributor     : {}", d)?;
        }
        writeln!(f, "Reviewed        : {}", self.reviewed)?;
        writeln!(f, "References      : {}", self.references.len())?;
        if let Some(first) = self.references.first() {
            writeln!(f, "> {} ({})", first.identifier, first.url)?;
        }

        Ok(())
    }
}
