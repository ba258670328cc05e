// ==============================================================================
// store/postgres.rs - PostgreSQL variant store
// ==============================================================================
// Description: sqlx-backed variant store using UNNEST bulk statements
// Author: Matt Barham
// Created: 2026-10-05
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use tracing::{debug, info};
use uuid::Uuid;

use super::VariantStore;
use crate::config::StoreConfig;
use crate::error::StoreError;
use crate::models::{
    ConsequenceStats, FormatRecord, InfoRecord, NewPatient, NewVariant, PatientId,
    PatientRecord, QualityRecord, VariantId, VariantKey, VariantRecord,
};

const PATIENT_COLUMNS: &str = "id, patient_name, accession_number, hpo_terms, created_at";

#[derive(Debug, sqlx::FromRow)]
struct VariantRow {
    id: Uuid,
    chrom: String,
    pos: i64,
    #[sqlx(rename = "ref")]
    reference: String,
    alt: String,
    patients: Vec<Uuid>,
}

impl VariantRow {
    fn into_record(self) -> Result<VariantRecord, StoreError> {
        let pos = u64::try_from(self.pos).map_err(|_| StoreError::OutOfRange {
            column: "variants.pos",
            value: self.pos.to_string(),
        })?;
        Ok(VariantRecord {
            id: self.id,
            key: VariantKey {
                chrom: self.chrom,
                pos,
                reference: self.reference,
                alt: self.alt,
            },
            patients: self.patients,
        })
    }
}

/// Column-wise arrays of variant keys for UNNEST binding
#[derive(Default)]
struct KeyColumns {
    chroms: Vec<String>,
    positions: Vec<i64>,
    refs: Vec<String>,
    alts: Vec<String>,
}

impl KeyColumns {
    fn push(&mut self, key: &VariantKey) -> Result<(), StoreError> {
        let pos = i64::try_from(key.pos).map_err(|_| StoreError::OutOfRange {
            column: "variants.pos",
            value: key.pos.to_string(),
        })?;
        self.chroms.push(key.chrom.clone());
        self.positions.push(pos);
        self.refs.push(key.reference.clone());
        self.alts.push(key.alt.clone());
        Ok(())
    }
}

fn into_records(rows: Vec<VariantRow>) -> Result<Vec<VariantRecord>, StoreError> {
    rows.into_iter().map(VariantRow::into_record).collect()
}

/// PostgreSQL variant store
#[derive(Clone)]
pub struct PgVariantStore {
    pool: PgPool,
}

impl PgVariantStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect a pool from explicit configuration
    pub async fn connect(config: &StoreConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(&config.database_url)
            .await?;

        info!("Connected to variant store (max {} connections)", config.max_connections);
        Ok(Self { pool })
    }

    /// Apply schema migrations (unique natural-key index included)
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        info!("Variant store migrations applied");
        Ok(())
    }
}

#[async_trait]
impl VariantStore for PgVariantStore {
    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn find_patient(&self, id: PatientId) -> Result<Option<PatientRecord>, StoreError> {
        let patient = sqlx::query_as::<_, PatientRecord>(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(patient)
    }

    async fn find_patient_by_accession(
        &self,
        accession_number: &str,
    ) -> Result<Option<PatientRecord>, StoreError> {
        let patient = sqlx::query_as::<_, PatientRecord>(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients WHERE accession_number = $1"
        ))
        .bind(accession_number)
        .fetch_optional(&self.pool)
        .await?;

        Ok(patient)
    }

    async fn insert_patient(
        &self,
        patient: &NewPatient,
    ) -> Result<(PatientRecord, bool), StoreError> {
        let inserted = sqlx::query_as::<_, PatientRecord>(&format!(
            r#"
            INSERT INTO patients (id, patient_name, accession_number, hpo_terms, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (accession_number) DO NOTHING
            RETURNING {PATIENT_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&patient.patient_name)
        .bind(&patient.accession_number)
        .bind(&patient.hpo_terms)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?;

        if let Some(record) = inserted {
            return Ok((record, true));
        }

        // Lost the race (or already present): reuse the existing row
        let existing = self
            .find_patient_by_accession(&patient.accession_number)
            .await?
            .ok_or(StoreError::Database(sqlx::Error::RowNotFound))?;
        Ok((existing, false))
    }

    async fn patients_by_name(&self, name: &str) -> Result<Vec<PatientRecord>, StoreError> {
        let patients = sqlx::query_as::<_, PatientRecord>(&format!(
            "SELECT {PATIENT_COLUMNS} FROM patients WHERE patient_name = $1 ORDER BY created_at"
        ))
        .bind(name)
        .fetch_all(&self.pool)
        .await?;

        Ok(patients)
    }

    async fn delete_patient(&self, id: PatientId) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM patients WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn find_variants(&self, keys: &[VariantKey]) -> Result<Vec<VariantRecord>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }

        let mut columns = KeyColumns::default();
        for key in keys {
            columns.push(key)?;
        }

        let rows = sqlx::query_as::<_, VariantRow>(
            r#"
            SELECT v.id, v.chrom, v.pos, v.ref, v.alt, v.patients
            FROM variants v
            JOIN UNNEST($1::text[], $2::bigint[], $3::text[], $4::text[])
                AS k(chrom, pos, ref, alt)
              ON v.chrom = k.chrom AND v.pos = k.pos AND v.ref = k.ref AND v.alt = k.alt
            "#,
        )
        .bind(&columns.chroms)
        .bind(&columns.positions)
        .bind(&columns.refs)
        .bind(&columns.alts)
        .fetch_all(&self.pool)
        .await?;

        debug!("Matched {} of {} variant keys", rows.len(), keys.len());
        into_records(rows)
    }

    async fn variants_for_patient(
        &self,
        patient_id: PatientId,
    ) -> Result<Vec<VariantRecord>, StoreError> {
        let rows = sqlx::query_as::<_, VariantRow>(
            r#"
            SELECT id, chrom, pos, ref, alt, patients
            FROM variants
            WHERE patients @> ARRAY[$1::uuid]
            "#,
        )
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;

        into_records(rows)
    }

    async fn add_patient_to_variants(
        &self,
        patient_id: PatientId,
        variant_ids: &[VariantId],
    ) -> Result<u64, StoreError> {
        if variant_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            r#"
            UPDATE variants
            SET patients = array_append(patients, $1)
            WHERE id = ANY($2) AND NOT ($1 = ANY(patients))
            "#,
        )
        .bind(patient_id)
        .bind(variant_ids)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn insert_variants(
        &self,
        patient_id: PatientId,
        variants: &[NewVariant],
    ) -> Result<Vec<(VariantKey, VariantId)>, StoreError> {
        if variants.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<Uuid> = variants.iter().map(|variant| variant.id).collect();
        let mut columns = KeyColumns::default();
        for variant in variants {
            columns.push(&variant.key)?;
        }

        // A colliding natural key merges the patient into the existing row
        let rows = sqlx::query_as::<_, VariantRow>(
            r#"
            INSERT INTO variants (id, chrom, pos, ref, alt, patients)
            SELECT k.id, k.chrom, k.pos, k.ref, k.alt, ARRAY[$6::uuid]
            FROM UNNEST($1::uuid[], $2::text[], $3::bigint[], $4::text[], $5::text[])
                AS k(id, chrom, pos, ref, alt)
            ON CONFLICT (chrom, pos, ref, alt) DO UPDATE
            SET patients = CASE
                WHEN $6::uuid = ANY(variants.patients) THEN variants.patients
                ELSE array_append(variants.patients, $6::uuid)
            END
            RETURNING id, chrom, pos, ref, alt, patients
            "#,
        )
        .bind(&ids)
        .bind(&columns.chroms)
        .bind(&columns.positions)
        .bind(&columns.refs)
        .bind(&columns.alts)
        .bind(patient_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(into_records(rows)?
            .into_iter()
            .map(|record| (record.key, record.id))
            .collect())
    }

    async fn remove_patient_from_variants(
        &self,
        patient_id: PatientId,
        variant_ids: &[VariantId],
    ) -> Result<u64, StoreError> {
        if variant_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query(
            "UPDATE variants SET patients = array_remove(patients, $1) WHERE id = ANY($2)",
        )
        .bind(patient_id)
        .bind(variant_ids)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_variants(&self, variant_ids: &[VariantId]) -> Result<u64, StoreError> {
        if variant_ids.is_empty() {
            return Ok(0);
        }

        let result = sqlx::query("DELETE FROM variants WHERE id = ANY($1)")
            .bind(variant_ids)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn insert_qualities(&self, records: &[QualityRecord]) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        let variant_ids: Vec<Uuid> = records.iter().map(|r| r.variant_id).collect();
        let patient_ids: Vec<Uuid> = records.iter().map(|r| r.patient_id).collect();
        let quals = records
            .iter()
            .map(|r| serde_json::to_value(&r.qual))
            .collect::<Result<Vec<_>, _>>()?;
        let filters: Vec<String> = records.iter().map(|r| r.filter.clone()).collect();

        let result = sqlx::query(
            r#"
            INSERT INTO qualities (id, variant_id, patient_id, qual, filter)
            SELECT * FROM UNNEST($1::uuid[], $2::uuid[], $3::uuid[], $4::jsonb[], $5::text[])
            "#,
        )
        .bind(&ids)
        .bind(&variant_ids)
        .bind(&patient_ids)
        .bind(&quals)
        .bind(&filters)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn insert_infos(&self, records: &[InfoRecord]) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        let variant_ids: Vec<Uuid> = records.iter().map(|r| r.variant_id).collect();
        let patient_ids: Vec<Uuid> = records.iter().map(|r| r.patient_id).collect();
        let fields = records
            .iter()
            .map(|r| serde_json::to_value(&r.fields))
            .collect::<Result<Vec<_>, _>>()?;

        let result = sqlx::query(
            r#"
            INSERT INTO infos (id, variant_id, patient_id, fields)
            SELECT * FROM UNNEST($1::uuid[], $2::uuid[], $3::uuid[], $4::jsonb[])
            "#,
        )
        .bind(&ids)
        .bind(&variant_ids)
        .bind(&patient_ids)
        .bind(&fields)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn insert_formats(&self, records: &[FormatRecord]) -> Result<u64, StoreError> {
        if records.is_empty() {
            return Ok(0);
        }

        let ids: Vec<Uuid> = records.iter().map(|r| r.id).collect();
        let variant_ids: Vec<Uuid> = records.iter().map(|r| r.variant_id).collect();
        let patient_ids: Vec<Uuid> = records.iter().map(|r| r.patient_id).collect();
        let fields = records
            .iter()
            .map(|r| serde_json::to_value(&r.fields))
            .collect::<Result<Vec<_>, _>>()?;

        let result = sqlx::query(
            r#"
            INSERT INTO formats (id, variant_id, patient_id, fields)
            SELECT * FROM UNNEST($1::uuid[], $2::uuid[], $3::uuid[], $4::jsonb[])
            "#,
        )
        .bind(&ids)
        .bind(&variant_ids)
        .bind(&patient_ids)
        .bind(&fields)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn delete_satellites(
        &self,
        patient_id: PatientId,
        variant_ids: &[VariantId],
    ) -> Result<u64, StoreError> {
        if variant_ids.is_empty() {
            return Ok(0);
        }

        let mut deleted = 0;
        for table in ["qualities", "infos", "formats"] {
            let result = sqlx::query(&format!(
                "DELETE FROM {table} WHERE patient_id = $1 AND variant_id = ANY($2)"
            ))
            .bind(patient_id)
            .bind(variant_ids)
            .execute(&self.pool)
            .await?;
            deleted += result.rows_affected();
        }

        Ok(deleted)
    }

    async fn consequence_stats(&self) -> Result<ConsequenceStats, StoreError> {
        let stats = sqlx::query_as::<_, ConsequenceStats>(
            r#"
            SELECT
                COUNT(*) FILTER (WHERE fields->>'FC' ILIKE '%synonymous%') AS synonymous,
                COUNT(*) FILTER (WHERE fields->>'FC' ILIKE '%missense%')   AS missense,
                COUNT(*) FILTER (WHERE fields->>'FC' ILIKE '%nonsense%')   AS nonsense,
                COUNT(*) FILTER (WHERE fields->>'FC' ILIKE '%insertion%')  AS insertion,
                COUNT(*) FILTER (WHERE fields->>'FC' ILIKE '%deletion%')   AS deletion,
                COUNT(*) FILTER (WHERE fields->>'FC' ILIKE '%silent%')     AS silent,
                COUNT(*) FILTER (WHERE fields->>'FC' ILIKE '%frameshift%') AS frameshift
            FROM infos
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        Ok(stats)
    }
}

// These run against a live database and are skipped unless DATABASE_URL (or
// DATABASE_URL_FILE) is set. Keys and accession numbers are unique per run.
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::DedupIngestionEngine;
    use crate::models::{CompositeRecord, FieldMap, FieldValue, QualityFields};
    use std::sync::Arc;

    async fn test_store() -> Option<PgVariantStore> {
        let Ok(config) = StoreConfig::from_env() else {
            eprintln!("DATABASE_URL not set; skipping Postgres store test");
            return None;
        };
        let store = PgVariantStore::connect(&config).await.unwrap();
        store.migrate().await.unwrap();
        Some(store)
    }

    fn key(chrom: &str, pos: u64) -> VariantKey {
        VariantKey {
            chrom: chrom.to_string(),
            pos,
            reference: "A".to_string(),
            alt: "G".to_string(),
        }
    }

    fn record(key: VariantKey) -> CompositeRecord {
        let mut info = FieldMap::new();
        info.insert("FC".to_string(), FieldValue::Text("Missense".to_string()));
        CompositeRecord {
            variant: key,
            qual: QualityFields {
                qual: FieldValue::Number(30.0),
                filter: "PASS".to_string(),
            },
            info,
            format: FieldMap::new(),
        }
    }

    fn new_patient() -> NewPatient {
        NewPatient {
            patient_name: "Jane Roe".to_string(),
            accession_number: format!("ACC-{}", Uuid::new_v4()),
            hpo_terms: String::new(),
        }
    }

    #[tokio::test]
    async fn test_conflicting_insert_merges_patient() {
        let Some(store) = test_store().await else { return };
        let chrom = format!("t{}", Uuid::new_v4().simple());
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();

        let original = Uuid::new_v4();
        store
            .insert_variants(first, &[NewVariant { id: original, key: key(&chrom, 5) }])
            .await
            .unwrap();

        // Same key again, plus a repeat by the same patient
        let resolved = store
            .insert_variants(second, &[NewVariant { id: Uuid::new_v4(), key: key(&chrom, 5) }])
            .await
            .unwrap();
        store
            .insert_variants(second, &[NewVariant { id: Uuid::new_v4(), key: key(&chrom, 5) }])
            .await
            .unwrap();

        assert_eq!(resolved, vec![(key(&chrom, 5), original)]);
        let stored = store.find_variants(&[key(&chrom, 5)]).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].patients, vec![first, second]);

        assert_eq!(store.remove_patient_from_variants(first, &[original]).await.unwrap(), 1);
        let stored = store.find_variants(&[key(&chrom, 5)]).await.unwrap();
        assert_eq!(stored[0].patients, vec![second]);

        assert_eq!(store.delete_variants(&[original]).await.unwrap(), 1);
        assert!(store.find_variants(&[key(&chrom, 5)]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_patient_reuses_accession() {
        let Some(store) = test_store().await else { return };
        let patient = new_patient();

        let (created, was_created) = store.insert_patient(&patient).await.unwrap();
        let (again, again_created) = store.insert_patient(&patient).await.unwrap();

        assert!(was_created);
        assert!(!again_created);
        assert_eq!(created.id, again.id);
        assert!(store.delete_patient(created.id).await.unwrap());
        assert!(!store.delete_patient(created.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_engine_delete_collects_orphans() {
        let Some(store) = test_store().await else { return };
        let store = Arc::new(store);
        let engine = DedupIngestionEngine::new(store.clone());
        let chrom = format!("t{}", Uuid::new_v4().simple());

        let p1 = engine.resolve_patient(&new_patient()).await.unwrap().record.id;
        let p2 = engine.resolve_patient(&new_patient()).await.unwrap().record.id;
        let shared = record(key(&chrom, 500));
        let private = record(key(&chrom, 42));

        engine.ingest(p1, &[shared.clone(), private.clone()]).await.unwrap();
        let merged = engine.ingest(p2, &[shared.clone()]).await.unwrap();
        assert_eq!(merged.variants_merged, 1);

        let summary = engine.delete_patient(p1).await.unwrap();
        assert_eq!(summary.variants_deleted, 1);
        assert_eq!(summary.variants_detached, 1);
        assert_eq!(summary.satellites_deleted, 6);

        let remaining = store
            .find_variants(&[shared.variant.clone(), private.variant.clone()])
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].patients, vec![p2]);
        assert!(store.find_patient(p1).await.unwrap().is_none());

        engine.delete_patient(p2).await.unwrap();
        assert!(store.find_variants(&[shared.variant]).await.unwrap().is_empty());
    }
}
