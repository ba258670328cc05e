// ==============================================================================
// store/mod.rs - Variant store interface
// ==============================================================================
// Description: Storage seam for patients, variants and satellite records
// Author: Matt Barham
// Created: 2026-10-05
// Modified: 2026-10-13
// Version: 1.0.0
// ==============================================================================

use async_trait::async_trait;

use crate::error::StoreError;
use crate::models::{
    ConsequenceStats, FormatRecord, InfoRecord, NewPatient, NewVariant, PatientId,
    PatientRecord, QualityRecord, VariantId, VariantKey, VariantRecord,
};

pub mod memory;
pub mod postgres;

pub use memory::InMemoryVariantStore;
pub use postgres::PgVariantStore;

/// Bulk-oriented persistence operations used by the ingestion engine
///
/// Implementations must enforce uniqueness of the variant natural key:
/// [`VariantStore::insert_variants`] treats a colliding key as a merge of the
/// patient into the existing variant and returns the surviving id.
#[async_trait]
pub trait VariantStore: Send + Sync {
    /// Connectivity check
    async fn ping(&self) -> Result<(), StoreError>;

    async fn find_patient(&self, id: PatientId) -> Result<Option<PatientRecord>, StoreError>;

    async fn find_patient_by_accession(
        &self,
        accession_number: &str,
    ) -> Result<Option<PatientRecord>, StoreError>;

    /// Insert a patient; an existing accession number returns that record with
    /// `false`.
    async fn insert_patient(
        &self,
        patient: &NewPatient,
    ) -> Result<(PatientRecord, bool), StoreError>;

    async fn patients_by_name(&self, name: &str) -> Result<Vec<PatientRecord>, StoreError>;

    /// Returns whether a row was removed
    async fn delete_patient(&self, id: PatientId) -> Result<bool, StoreError>;

    /// One round trip for every key in the batch
    async fn find_variants(&self, keys: &[VariantKey]) -> Result<Vec<VariantRecord>, StoreError>;

    async fn variants_for_patient(
        &self,
        patient_id: PatientId,
    ) -> Result<Vec<VariantRecord>, StoreError>;

    /// Set-union of `patient_id` into each variant's patient set
    async fn add_patient_to_variants(
        &self,
        patient_id: PatientId,
        variant_ids: &[VariantId],
    ) -> Result<u64, StoreError>;

    /// Insert variants with patient set `{patient_id}`; returns the stored id
    /// for every key.
    async fn insert_variants(
        &self,
        patient_id: PatientId,
        variants: &[NewVariant],
    ) -> Result<Vec<(VariantKey, VariantId)>, StoreError>;

    async fn remove_patient_from_variants(
        &self,
        patient_id: PatientId,
        variant_ids: &[VariantId],
    ) -> Result<u64, StoreError>;

    async fn delete_variants(&self, variant_ids: &[VariantId]) -> Result<u64, StoreError>;

    async fn insert_qualities(&self, records: &[QualityRecord]) -> Result<u64, StoreError>;

    async fn insert_infos(&self, records: &[InfoRecord]) -> Result<u64, StoreError>;

    async fn insert_formats(&self, records: &[FormatRecord]) -> Result<u64, StoreError>;

    /// Delete quality / info / format records scoped to `patient_id` and any
    /// of `variant_ids`
    async fn delete_satellites(
        &self,
        patient_id: PatientId,
        variant_ids: &[VariantId],
    ) -> Result<u64, StoreError>;

    async fn consequence_stats(&self) -> Result<ConsequenceStats, StoreError>;
}
