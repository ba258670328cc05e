// ==============================================================================
// ingest.rs - Deduplicating ingestion engine
// ==============================================================================
// Description: Merges composite records into the variant store (one shared
//              variant per natural key) and garbage-collects on patient delete
// Author: Matt Barham
// Created: 2026-10-08
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::IngestError;
use crate::models::{
    CompositeRecord, FormatRecord, InfoRecord, NewPatient, NewVariant, PatientId,
    PatientRecord, QualityRecord, VariantId, VariantKey,
};
use crate::store::VariantStore;

/// Patient looked up or created by accession number
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPatient {
    pub record: PatientRecord,
    pub created: bool,
}

/// Counts for one ingested batch
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestSummary {
    pub records: usize,
    pub variants_created: usize,
    pub variants_merged: usize,
    pub satellites_created: u64,
}

/// Outcome of deleting a patient
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionSummary {
    pub patient_id: PatientId,
    pub variants_deleted: u64,
    pub variants_detached: u64,
    pub satellites_deleted: u64,
}

/// Ingestion engine over an explicit store handle
#[derive(Clone)]
pub struct DedupIngestionEngine {
    store: Arc<dyn VariantStore>,
}

impl DedupIngestionEngine {
    pub fn new(store: Arc<dyn VariantStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn VariantStore> {
        &self.store
    }

    /// Find the patient by accession number or create it (idempotent)
    pub async fn resolve_patient(&self, patient: &NewPatient) -> Result<ResolvedPatient, IngestError> {
        let (record, created) = self.store.insert_patient(patient).await?;
        if created {
            info!(
                "Created patient {} (accession {})",
                record.id, record.accession_number
            );
        } else {
            debug!("Patient {} already exists", record.id);
        }
        Ok(ResolvedPatient { record, created })
    }

    /// Merge one batch of records for `patient_id` into the store.
    ///
    /// Variants are shared across patients by natural key; quality, info and
    /// format records are always created, one each per input record. A store
    /// failure aborts the batch without undoing writes already made.
    pub async fn ingest(
        &self,
        patient_id: PatientId,
        records: &[CompositeRecord],
    ) -> Result<IngestSummary, IngestError> {
        if records.is_empty() {
            return Ok(IngestSummary::default());
        }

        // Distinct keys in first-seen order
        let mut seen = HashSet::with_capacity(records.len());
        let keys: Vec<VariantKey> = records
            .iter()
            .filter(|record| seen.insert(&record.variant))
            .map(|record| record.variant.clone())
            .collect();

        let existing = self.store.find_variants(&keys).await?;
        let mut resolved: HashMap<VariantKey, VariantId> = HashMap::with_capacity(keys.len());
        let mut merges = Vec::new();
        for variant in existing {
            if !variant.patients.contains(&patient_id) {
                merges.push(variant.id);
            }
            resolved.insert(variant.key, variant.id);
        }

        let inserts: Vec<NewVariant> = keys
            .iter()
            .filter(|key| !resolved.contains_key(*key))
            .map(|key| NewVariant {
                id: Uuid::new_v4(),
                key: key.clone(),
            })
            .collect();

        let mut summary = IngestSummary {
            records: records.len(),
            variants_merged: merges.len(),
            ..IngestSummary::default()
        };

        self.store.add_patient_to_variants(patient_id, &merges).await?;

        // The store may resolve a proposed id to a row written concurrently
        let proposed: HashMap<&VariantKey, VariantId> =
            inserts.iter().map(|v| (&v.key, v.id)).collect();
        for (key, id) in self.store.insert_variants(patient_id, &inserts).await? {
            if proposed.get(&key) == Some(&id) {
                summary.variants_created += 1;
            } else {
                summary.variants_merged += 1;
            }
            resolved.insert(key, id);
        }

        let mut qualities = Vec::with_capacity(records.len());
        let mut infos = Vec::with_capacity(records.len());
        let mut formats = Vec::with_capacity(records.len());
        for record in records {
            let variant_id = *resolved
                .get(&record.variant)
                .ok_or_else(|| IngestError::UnresolvedVariant(record.variant.to_string()))?;

            qualities.push(QualityRecord {
                id: Uuid::new_v4(),
                variant_id,
                patient_id,
                qual: record.qual.qual.clone(),
                filter: record.qual.filter.clone(),
            });
            infos.push(InfoRecord {
                id: Uuid::new_v4(),
                variant_id,
                patient_id,
                fields: record.info.clone(),
            });
            formats.push(FormatRecord {
                id: Uuid::new_v4(),
                variant_id,
                patient_id,
                fields: record.format.clone(),
            });
        }

        summary.satellites_created += self.store.insert_qualities(&qualities).await?;
        summary.satellites_created += self.store.insert_infos(&infos).await?;
        summary.satellites_created += self.store.insert_formats(&formats).await?;

        debug!(
            patient_id = %patient_id,
            records = summary.records,
            created = summary.variants_created,
            merged = summary.variants_merged,
            "Batch ingested"
        );
        Ok(summary)
    }

    /// Remove a patient and everything only it references.
    ///
    /// Variants reported by this patient alone are deleted; shared variants
    /// keep their row and lose the patient. Satellites scoped to the patient
    /// are deleted in both cases.
    pub async fn delete_patient(&self, patient_id: PatientId) -> Result<DeletionSummary, IngestError> {
        if self.store.find_patient(patient_id).await?.is_none() {
            return Err(IngestError::PatientNotFound(patient_id));
        }

        let variants = self.store.variants_for_patient(patient_id).await?;
        let mut doomed = Vec::new();
        let mut detached = Vec::new();
        for variant in &variants {
            if variant.patients.iter().all(|p| *p == patient_id) {
                doomed.push(variant.id);
            } else {
                detached.push(variant.id);
            }
        }

        let all_ids: Vec<VariantId> = variants.iter().map(|v| v.id).collect();
        let satellites_deleted = self.store.delete_satellites(patient_id, &all_ids).await?;
        let variants_detached = self
            .store
            .remove_patient_from_variants(patient_id, &detached)
            .await?;
        let variants_deleted = self.store.delete_variants(&doomed).await?;
        self.store.delete_patient(patient_id).await?;

        info!(
            "Deleted patient {}: {} variants removed, {} detached, {} satellites",
            patient_id, variants_deleted, variants_detached, satellites_deleted
        );

        Ok(DeletionSummary {
            patient_id,
            variants_deleted,
            variants_detached,
            satellites_deleted,
        })
    }
}
