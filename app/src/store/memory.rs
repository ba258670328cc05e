// ==============================================================================
// store/memory.rs - In-memory variant store
// ==============================================================================
// Description: Process-local variant store with the same uniqueness and merge
//              semantics as the PostgreSQL store
// Author: Matt Barham
// Created: 2026-10-06
// Modified: 2026-10-14
// Version: 1.0.0
// ==============================================================================

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::VariantStore;
use crate::error::StoreError;
use crate::models::{
    ConsequenceStats, FieldValue, FormatRecord, InfoRecord, NewPatient, NewVariant, PatientId,
    PatientRecord, QualityRecord, VariantId, VariantKey, VariantRecord,
};

#[derive(Default)]
struct State {
    patients: HashMap<PatientId, PatientRecord>,
    variants: HashMap<VariantId, VariantRecord>,
    by_key: HashMap<VariantKey, VariantId>,
    qualities: Vec<QualityRecord>,
    infos: Vec<InfoRecord>,
    formats: Vec<FormatRecord>,
}

/// Variant store held in process memory
///
/// Used by the CLI dry runs and the test suites.
#[derive(Default)]
pub struct InMemoryVariantStore {
    state: Mutex<State>,
}

impl InMemoryVariantStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn variant_by_key(&self, key: &VariantKey) -> Option<VariantRecord> {
        let state = self.state.lock().await;
        state
            .by_key
            .get(key)
            .and_then(|id| state.variants.get(id))
            .cloned()
    }

    pub async fn variant_count(&self) -> usize {
        self.state.lock().await.variants.len()
    }

    pub async fn patient_count(&self) -> usize {
        self.state.lock().await.patients.len()
    }

    /// (qualities, infos, formats) stored for `patient_id`
    pub async fn satellite_counts(&self, patient_id: PatientId) -> (usize, usize, usize) {
        let state = self.state.lock().await;
        (
            state.qualities.iter().filter(|r| r.patient_id == patient_id).count(),
            state.infos.iter().filter(|r| r.patient_id == patient_id).count(),
            state.formats.iter().filter(|r| r.patient_id == patient_id).count(),
        )
    }
}

#[async_trait]
impl VariantStore for InMemoryVariantStore {
    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }

    async fn find_patient(&self, id: PatientId) -> Result<Option<PatientRecord>, StoreError> {
        Ok(self.state.lock().await.patients.get(&id).cloned())
    }

    async fn find_patient_by_accession(
        &self,
        accession_number: &str,
    ) -> Result<Option<PatientRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .patients
            .values()
            .find(|p| p.accession_number == accession_number)
            .cloned())
    }

    async fn insert_patient(
        &self,
        patient: &NewPatient,
    ) -> Result<(PatientRecord, bool), StoreError> {
        let mut state = self.state.lock().await;
        if let Some(existing) = state
            .patients
            .values()
            .find(|p| p.accession_number == patient.accession_number)
        {
            return Ok((existing.clone(), false));
        }

        let record = PatientRecord {
            id: Uuid::new_v4(),
            patient_name: patient.patient_name.clone(),
            accession_number: patient.accession_number.clone(),
            hpo_terms: patient.hpo_terms.clone(),
            created_at: Utc::now(),
        };
        state.patients.insert(record.id, record.clone());
        Ok((record, true))
    }

    async fn patients_by_name(&self, name: &str) -> Result<Vec<PatientRecord>, StoreError> {
        let state = self.state.lock().await;
        let mut matches: Vec<PatientRecord> = state
            .patients
            .values()
            .filter(|p| p.patient_name == name)
            .cloned()
            .collect();
        matches.sort_by_key(|p| p.created_at);
        Ok(matches)
    }

    async fn delete_patient(&self, id: PatientId) -> Result<bool, StoreError> {
        Ok(self.state.lock().await.patients.remove(&id).is_some())
    }

    async fn find_variants(&self, keys: &[VariantKey]) -> Result<Vec<VariantRecord>, StoreError> {
        let state = self.state.lock().await;
        let unique: HashSet<&VariantKey> = keys.iter().collect();
        Ok(unique
            .into_iter()
            .filter_map(|key| state.by_key.get(key))
            .filter_map(|id| state.variants.get(id))
            .cloned()
            .collect())
    }

    async fn variants_for_patient(
        &self,
        patient_id: PatientId,
    ) -> Result<Vec<VariantRecord>, StoreError> {
        let state = self.state.lock().await;
        Ok(state
            .variants
            .values()
            .filter(|v| v.patients.contains(&patient_id))
            .cloned()
            .collect())
    }

    async fn add_patient_to_variants(
        &self,
        patient_id: PatientId,
        variant_ids: &[VariantId],
    ) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let mut updated = 0;
        for id in variant_ids {
            if let Some(variant) = state.variants.get_mut(id) {
                if !variant.patients.contains(&patient_id) {
                    variant.patients.push(patient_id);
                    updated += 1;
                }
            }
        }
        Ok(updated)
    }

    async fn insert_variants(
        &self,
        patient_id: PatientId,
        variants: &[NewVariant],
    ) -> Result<Vec<(VariantKey, VariantId)>, StoreError> {
        let mut state = self.state.lock().await;
        let mut resolved = Vec::with_capacity(variants.len());

        for variant in variants {
            if let Some(existing_id) = state.by_key.get(&variant.key).copied() {
                // Natural-key collision merges into the surviving row
                if let Some(existing) = state.variants.get_mut(&existing_id) {
                    if !existing.patients.contains(&patient_id) {
                        existing.patients.push(patient_id);
                    }
                }
                resolved.push((variant.key.clone(), existing_id));
                continue;
            }

            state.by_key.insert(variant.key.clone(), variant.id);
            state.variants.insert(
                variant.id,
                VariantRecord {
                    id: variant.id,
                    key: variant.key.clone(),
                    patients: vec![patient_id],
                },
            );
            resolved.push((variant.key.clone(), variant.id));
        }

        Ok(resolved)
    }

    async fn remove_patient_from_variants(
        &self,
        patient_id: PatientId,
        variant_ids: &[VariantId],
    ) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let mut updated = 0;
        for id in variant_ids {
            if let Some(variant) = state.variants.get_mut(id) {
                variant.patients.retain(|p| *p != patient_id);
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn delete_variants(&self, variant_ids: &[VariantId]) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        let mut deleted = 0;
        for id in variant_ids {
            if let Some(variant) = state.variants.remove(id) {
                state.by_key.remove(&variant.key);
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    async fn insert_qualities(&self, records: &[QualityRecord]) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        state.qualities.extend_from_slice(records);
        Ok(records.len() as u64)
    }

    async fn insert_infos(&self, records: &[InfoRecord]) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        state.infos.extend_from_slice(records);
        Ok(records.len() as u64)
    }

    async fn insert_formats(&self, records: &[FormatRecord]) -> Result<u64, StoreError> {
        let mut state = self.state.lock().await;
        state.formats.extend_from_slice(records);
        Ok(records.len() as u64)
    }

    async fn delete_satellites(
        &self,
        patient_id: PatientId,
        variant_ids: &[VariantId],
    ) -> Result<u64, StoreError> {
        let targets: HashSet<&VariantId> = variant_ids.iter().collect();
        let mut state = self.state.lock().await;
        let before = state.qualities.len() + state.infos.len() + state.formats.len();

        let doomed = |owner: &PatientId, variant: &VariantId| {
            *owner == patient_id && targets.contains(variant)
        };
        state.qualities.retain(|r| !doomed(&r.patient_id, &r.variant_id));
        state.infos.retain(|r| !doomed(&r.patient_id, &r.variant_id));
        state.formats.retain(|r| !doomed(&r.patient_id, &r.variant_id));

        let after = state.qualities.len() + state.infos.len() + state.formats.len();
        Ok((before - after) as u64)
    }

    async fn consequence_stats(&self) -> Result<ConsequenceStats, StoreError> {
        let state = self.state.lock().await;
        let mut stats = ConsequenceStats::default();
        for info in &state.infos {
            if let Some(FieldValue::Text(consequence)) = info.fields.get("FC") {
                stats.observe(consequence);
            }
        }
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(pos: u64) -> VariantKey {
        VariantKey {
            chrom: "1".to_string(),
            pos,
            reference: "A".to_string(),
            alt: "G".to_string(),
        }
    }

    #[tokio::test]
    async fn test_insert_variants_merges_on_collision() {
        let store = InMemoryVariantStore::new();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        let original = Uuid::new_v4();
        store
            .insert_variants(first, &[NewVariant { id: original, key: key(5) }])
            .await
            .unwrap();

        let resolved = store
            .insert_variants(second, &[NewVariant { id: Uuid::new_v4(), key: key(5) }])
            .await
            .unwrap();

        assert_eq!(resolved, vec![(key(5), original)]);
        let stored = store.variant_by_key(&key(5)).await.unwrap();
        assert_eq!(stored.patients, vec![first, second]);
        assert_eq!(store.variant_count().await, 1);
    }

    #[tokio::test]
    async fn test_insert_patient_reuses_accession() {
        let store = InMemoryVariantStore::new();
        let patient = NewPatient {
            patient_name: "Jane Roe".to_string(),
            accession_number: "ACC-1".to_string(),
            hpo_terms: String::new(),
        };

        let (created, was_created) = store.insert_patient(&patient).await.unwrap();
        let (again, again_created) = store.insert_patient(&patient).await.unwrap();

        assert!(was_created);
        assert!(!again_created);
        assert_eq!(created.id, again.id);
        assert_eq!(store.patients_by_name("Jane Roe").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_variants_frees_key() {
        let store = InMemoryVariantStore::new();
        let id = Uuid::new_v4();
        store
            .insert_variants(Uuid::new_v4(), &[NewVariant { id, key: key(9) }])
            .await
            .unwrap();

        assert_eq!(store.delete_variants(&[id]).await.unwrap(), 1);
        assert!(store.variant_by_key(&key(9)).await.is_none());
        assert!(store.find_variants(&[key(9)]).await.unwrap().is_empty());
    }
}
