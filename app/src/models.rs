// ==============================================================================
// models.rs - Variant Record Data Models
// ==============================================================================
// Description: Typed patient, variant, satellite and chunk records
// Author: Matt Barham
// Created: 2026-10-02
// Modified: 2026-10-14
// Version: 1.1.0
// ==============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

pub type PatientId = Uuid;
pub type VariantId = Uuid;

/// Decomposed annotation value (INFO / FORMAT / QUAL)
///
/// Serialized untagged: a JSON number, an array of numbers, or a string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    /// Scalar that parsed as a finite float
    Number(f64),
    /// Comma-separated multi-valued FORMAT entry (e.g. AD=3,7)
    Numbers(Vec<f64>),
    /// Anything that did not coerce; kept verbatim
    Text(String),
}

impl FieldValue {
    /// Opportunistic numeric coercion; falls back to the original string.
    pub fn coerce(raw: &str) -> Self {
        match parse_finite(raw) {
            Some(value) => FieldValue::Number(value),
            None => FieldValue::Text(raw.to_string()),
        }
    }

    /// Coerce a comma-separated list into a sequence of floats.
    ///
    /// If any component fails to parse the whole value stays a string.
    pub fn coerce_list(raw: &str) -> Self {
        let parsed: Option<Vec<f64>> = raw.split(',').map(parse_finite).collect();
        match parsed {
            Some(values) => FieldValue::Numbers(values),
            None => FieldValue::Text(raw.to_string()),
        }
    }
}

// NaN / inf would not survive a JSON round trip
fn parse_finite(raw: &str) -> Option<f64> {
    raw.parse::<f64>().ok().filter(|value| value.is_finite())
}

/// Key -> value mapping produced by INFO / FORMAT decomposition
pub type FieldMap = BTreeMap<String, FieldValue>;

/// Natural key of a variant: (chromosome, position, reference, alternate)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VariantKey {
    pub chrom: String,
    pub pos: u64,
    #[serde(rename = "ref")]
    pub reference: String,
    pub alt: String,
}

impl std::fmt::Display for VariantKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}:{}:{}", self.chrom, self.pos, self.reference, self.alt)
    }
}

/// QUAL / FILTER columns of a row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityFields {
    #[serde(rename = "QUAL")]
    pub qual: FieldValue,
    #[serde(rename = "FILTER")]
    pub filter: String,
}

/// One normalized VCF row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositeRecord {
    pub variant: VariantKey,
    pub qual: QualityFields,
    pub info: FieldMap,
    pub format: FieldMap,
}

/// Patient details supplied on upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPatient {
    pub patient_name: String,
    pub accession_number: String,
    #[serde(default)]
    pub hpo_terms: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct PatientRecord {
    pub id: PatientId,
    pub patient_name: String,
    pub accession_number: String,
    pub hpo_terms: String,
    pub created_at: DateTime<Utc>,
}

/// Stored variant with the set of patients that reported it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariantRecord {
    pub id: VariantId,
    pub key: VariantKey,
    pub patients: Vec<PatientId>,
}

/// Variant to be inserted; id is assigned before the write
#[derive(Debug, Clone, PartialEq)]
pub struct NewVariant {
    pub id: VariantId,
    pub key: VariantKey,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityRecord {
    pub id: Uuid,
    pub variant_id: VariantId,
    pub patient_id: PatientId,
    pub qual: FieldValue,
    pub filter: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InfoRecord {
    pub id: Uuid,
    pub variant_id: VariantId,
    pub patient_id: PatientId,
    pub fields: FieldMap,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FormatRecord {
    pub id: Uuid,
    pub variant_id: VariantId,
    pub patient_id: PatientId,
    pub fields: FieldMap,
}

/// Ordered slice of composite records for one patient (transport unit)
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// Position of this chunk within the upload
    pub index: usize,
    pub patient_id: PatientId,
    pub records: Vec<CompositeRecord>,
}

impl Chunk {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn payload(&self) -> ChunkPayload<'_> {
        ChunkPayload {
            patient_id: self.patient_id,
            data: &self.records,
        }
    }
}

/// Wire form of a chunk: `{ "patient_id": ..., "data": [...] }`
#[derive(Debug, Serialize)]
pub struct ChunkPayload<'a> {
    pub patient_id: PatientId,
    pub data: &'a [CompositeRecord],
}

/// Owned counterpart of [`ChunkPayload`] (receiving side)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariantBatch {
    pub patient_id: PatientId,
    pub data: Vec<CompositeRecord>,
}

/// Patient creation payload: `{ "patient": { ... } }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientEnvelope {
    pub patient: NewPatient,
}

/// Response to patient creation / resolution
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientResponse {
    pub patient_id: PatientId,
    #[serde(default)]
    pub created: bool,
    #[serde(default)]
    pub message: String,
}

/// Functional-consequence counts over stored INFO `FC` annotations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ConsequenceStats {
    pub synonymous: i64,
    pub missense: i64,
    pub nonsense: i64,
    pub insertion: i64,
    pub deletion: i64,
    pub silent: i64,
    pub frameshift: i64,
}

impl ConsequenceStats {
    pub const CATEGORIES: [&'static str; 7] = [
        "synonymous",
        "missense",
        "nonsense",
        "insertion",
        "deletion",
        "silent",
        "frameshift",
    ];

    /// Count one `FC` annotation (case-insensitive substring per category)
    pub fn observe(&mut self, consequence: &str) {
        let lowered = consequence.to_lowercase();
        let counters = [
            &mut self.synonymous,
            &mut self.missense,
            &mut self.nonsense,
            &mut self.insertion,
            &mut self.deletion,
            &mut self.silent,
            &mut self.frameshift,
        ];
        for (category, counter) in Self::CATEGORIES.iter().zip(counters) {
            if lowered.contains(category) {
                *counter += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coerce_numeric_and_fallback() {
        assert_eq!(FieldValue::coerce("10"), FieldValue::Number(10.0));
        assert_eq!(FieldValue::coerce("0.5"), FieldValue::Number(0.5));
        assert_eq!(FieldValue::coerce("1e3"), FieldValue::Number(1000.0));
        assert_eq!(FieldValue::coerce("0/1"), FieldValue::Text("0/1".to_string()));
        assert_eq!(FieldValue::coerce("."), FieldValue::Text(".".to_string()));
        assert_eq!(FieldValue::coerce("nan"), FieldValue::Text("nan".to_string()));
    }

    #[test]
    fn test_coerce_list() {
        assert_eq!(FieldValue::coerce_list("3,7"), FieldValue::Numbers(vec![3.0, 7.0]));
        assert_eq!(FieldValue::coerce_list("3,."), FieldValue::Text("3,.".to_string()));
    }

    #[test]
    fn test_field_value_json_shape() {
        let json = serde_json::to_value(FieldValue::Numbers(vec![1.0, 2.0])).unwrap();
        assert_eq!(json, serde_json::json!([1.0, 2.0]));

        let back: FieldValue = serde_json::from_value(serde_json::json!("PASS")).unwrap();
        assert_eq!(back, FieldValue::Text("PASS".to_string()));

        let back: FieldValue = serde_json::from_value(serde_json::json!(30)).unwrap();
        assert_eq!(back, FieldValue::Number(30.0));
    }

    #[test]
    fn test_variant_key_serializes_ref() {
        let key = VariantKey {
            chrom: "1".to_string(),
            pos: 100,
            reference: "A".to_string(),
            alt: "T".to_string(),
        };
        let json = serde_json::to_value(&key).unwrap();
        assert_eq!(json, serde_json::json!({"chrom": "1", "pos": 100, "ref": "A", "alt": "T"}));
        assert_eq!(key.to_string(), "1:100:A:T");
    }

    #[test]
    fn test_consequence_stats_observe() {
        let mut stats = ConsequenceStats::default();
        stats.observe("Missense_Variant");
        stats.observe("frameshift_deletion");
        stats.observe("intronic");

        assert_eq!(stats.missense, 1);
        assert_eq!(stats.frameshift, 1);
        assert_eq!(stats.deletion, 1);
        assert_eq!(stats.synonymous, 0);
    }
}
