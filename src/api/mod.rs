mod source;

pub use source::ApiSource;

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Decoded response of the processes endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ApiPayload {
    #[serde(default, deserialize_with = "lenient_bool")]
    pub success: bool,
    #[serde(default)]
    pub processes: Vec<RawProcess>,
    #[serde(default)]
    pub references: Vec<RawReference>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RawProcess {
    #[serde(deserialize_with = "lenient_string")]
    pub process_id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub process_material: String,
    #[serde(rename = "process_reactantA", deserialize_with = "lenient_string")]
    pub process_reactant_a: String,
    #[serde(rename = "process_reactantB", deserialize_with = "lenient_string")]
    pub process_reactant_b: String,
    #[serde(rename = "process_reactantC", deserialize_with = "lenient_string")]
    pub process_reactant_c: String,
    #[serde(rename = "process_reactantD", deserialize_with = "lenient_string")]
    pub process_reactant_d: String,
    #[serde(deserialize_with = "lenient_string")]
    pub process_note: String,
    #[serde(deserialize_with = "lenient_string")]
    pub process_contributor: String,
    #[serde(deserialize_with = "lenient_string")]
    pub process_reviewed: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RawReference {
    #[serde(deserialize_with = "lenient_string")]
    pub process_id: String,
    #[serde(deserialize_with = "lenient_string")]
    pub reference_doi: String,
    #[serde(deserialize_with = "lenient_string")]
    pub reference_author: String,
    #[serde(rename = "reference_fullAuthorList", deserialize_with = "lenient_string")]
    pub reference_full_author_list: String,
    #[serde(deserialize_with = "lenient_string")]
    pub reference_citations: String,
    #[serde(rename = "EntrySubmitted", deserialize_with = "lenient_string")]
    pub entry_submitted: String,
}

// The endpoint mixes strings, numbers and nulls for the same column.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(Value::Bool(b)) => if b { "1" } else { "0" }.to_string(),
        Some(other) => other.to_string(),
    })
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Bool(b)) => b,
        Some(Value::Number(n)) => n.as_i64().map_or(false, |n| n != 0),
        Some(Value::String(s)) => matches!(s.trim(), "1" | "true"),
        _ => false,
    })
}
