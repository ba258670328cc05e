// ==============================================================================
// processor.rs - VCF upload pipelines
// ==============================================================================
// Description: End-to-end file pipelines: parse -> decompose -> chunk, then
//              either write directly to the store or relay to the store service
// Author: Matt Barham
// Created: 2026-10-10
// Modified: 2026-10-18
// Version: 2.0.1
// ==============================================================================

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::batch::{self, PreparedFile};
use crate::config::PipelineConfig;
use crate::error::IngestError;
use crate::ingest::{DedupIngestionEngine, IngestSummary};
use crate::manifest;
use crate::models::{NewPatient, PatientId};
use crate::relay::StoreServiceClient;
use crate::transport::{ChunkSink, DeliveryReport, TransportOrchestrator};

/// Read, parse and normalize a file on the blocking pool
async fn prepare_blocking(path: &Path) -> Result<PreparedFile, IngestError> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || batch::prepare_file(&path))
        .await
        .map_err(|e| IngestError::Preparation(e.to_string()))?
        .map_err(IngestError::from)
}

/// Patient details derived from the file when none are supplied:
/// name from the sample column, accession number from the file stem.
pub fn patient_for_file(path: &Path, prepared: &PreparedFile) -> NewPatient {
    let stem = manifest::file_stem(path).unwrap_or_else(|| path.display().to_string());
    NewPatient {
        patient_name: prepared.sample_name.clone().unwrap_or_else(|| stem.clone()),
        accession_number: stem,
        hpo_terms: String::new(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileIngestReport {
    pub path: PathBuf,
    pub patient_id: PatientId,
    pub patient_created: bool,
    pub chunks: usize,
    pub summary: IngestSummary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Per-file outcomes of a manifest run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManifestReport {
    pub ingested: Vec<FileIngestReport>,
    pub failed: Vec<FileFailure>,
}

/// Direct-write pipeline: chunks go through the ingestion engine in order
pub struct DirectWriteProcessor {
    engine: DedupIngestionEngine,
    config: PipelineConfig,
}

impl DirectWriteProcessor {
    pub fn new(engine: DedupIngestionEngine, config: PipelineConfig) -> Self {
        Self { engine, config }
    }

    /// Ingest one file. Stops at the first store failure; chunks already
    /// written stay written.
    pub async fn ingest_file(
        &self,
        path: &Path,
        patient: Option<NewPatient>,
    ) -> Result<FileIngestReport, IngestError> {
        info!("Ingesting {:?}", path);
        let prepared = prepare_blocking(path).await?;
        let patient = patient.unwrap_or_else(|| patient_for_file(path, &prepared));
        let resolved = self.engine.resolve_patient(&patient).await?;
        let patient_id = resolved.record.id;

        let chunks = batch::into_chunks(patient_id, prepared.records, self.config.chunk_size);
        let mut summary = IngestSummary::default();
        for chunk in &chunks {
            let part = self.engine.ingest(patient_id, &chunk.records).await?;
            summary.records += part.records;
            summary.variants_created += part.variants_created;
            summary.variants_merged += part.variants_merged;
            summary.satellites_created += part.satellites_created;
        }

        info!(
            "Ingested {:?}: {} records, {} new variants, {} merged",
            path, summary.records, summary.variants_created, summary.variants_merged
        );

        Ok(FileIngestReport {
            path: path.to_path_buf(),
            patient_id,
            patient_created: resolved.created,
            chunks: chunks.len(),
            summary,
        })
    }

    /// Ingest each file independently; a failing file does not stop the rest
    pub async fn ingest_manifest(&self, files: &[PathBuf]) -> ManifestReport {
        let mut report = ManifestReport::default();
        for path in files {
            match self.ingest_file(path, None).await {
                Ok(file_report) => report.ingested.push(file_report),
                Err(e) => {
                    error!("Failed to ingest {:?}: {}", path, e);
                    report.failed.push(FileFailure {
                        path: path.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }
        report
    }
}

/// Outcome of relaying one file to the store service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayReport {
    pub patient_id: PatientId,
    pub records: usize,
    pub delivery: DeliveryReport,
}

/// Relay pipeline: chunks are POSTed concurrently to the store service
pub struct RelayProcessor {
    client: Arc<StoreServiceClient>,
    orchestrator: TransportOrchestrator,
    config: PipelineConfig,
}

impl RelayProcessor {
    pub fn new(client: StoreServiceClient, config: PipelineConfig) -> Self {
        Self {
            client: Arc::new(client),
            orchestrator: TransportOrchestrator::new(config.max_concurrency),
            config,
        }
    }

    /// Resolve the patient remotely, then deliver every chunk.
    ///
    /// Per-chunk failures are collected in the report, not returned as errors.
    pub async fn relay_file(
        &self,
        path: &Path,
        patient: Option<NewPatient>,
    ) -> Result<RelayReport, IngestError> {
        info!("Relaying {:?} to {}", path, self.client.base_url());
        let prepared = prepare_blocking(path).await?;
        let patient = patient.unwrap_or_else(|| patient_for_file(path, &prepared));
        let resolved = self
            .client
            .add_patient(&patient)
            .await
            .map_err(IngestError::PatientResolution)?;

        let records = prepared.records.len();
        let chunks = batch::into_chunks(resolved.patient_id, prepared.records, self.config.chunk_size);
        let sink: Arc<dyn ChunkSink> = self.client.clone();
        let delivery = self.orchestrator.deliver(sink, chunks).await;

        if !delivery.is_complete_success() {
            warn!(
                "{} of {} chunks failed for patient {}",
                delivery.failures.len(),
                delivery.attempted,
                resolved.patient_id
            );
        }

        Ok(RelayReport {
            patient_id: resolved.patient_id,
            records,
            delivery,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{InMemoryVariantStore, VariantStore};
    use std::fs;

    const VCF: &str = "##fileformat=VCFv4.2\n\
        #CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tNA12878\n\
        1\t100\t.\tA\tT\t30\tPASS\tDP=10;FC=Missense\tGT:DP\t0/1:10\n\
        1\t200\t.\tG\tC\t45\tPASS\tDP=14\tGT:DP\t1/1:14\n\
        2\t300\t.\tT\tA\t12\tq10\tDP=3\tGT:DP\t0/1:3\n";

    fn processor(store: Arc<InMemoryVariantStore>, chunk_size: usize) -> DirectWriteProcessor {
        DirectWriteProcessor::new(
            DedupIngestionEngine::new(store),
            PipelineConfig::new(chunk_size, 2).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_ingest_file_derives_patient() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("case-17.vcf");
        fs::write(&path, VCF).unwrap();

        let store = Arc::new(InMemoryVariantStore::new());
        let report = processor(store.clone(), 2).ingest_file(&path, None).await.unwrap();

        assert!(report.patient_created);
        assert_eq!(report.chunks, 2);
        assert_eq!(report.summary.records, 3);
        assert_eq!(report.summary.variants_created, 3);
        assert_eq!(store.satellite_counts(report.patient_id).await, (3, 3, 3));

        let patients = store.patients_by_name("NA12878").await.unwrap();
        assert_eq!(patients.len(), 1);
        assert_eq!(patients[0].accession_number, "case-17");

        let stats = store.consequence_stats().await.unwrap();
        assert_eq!(stats.missense, 1);
    }

    #[tokio::test]
    async fn test_manifest_continues_past_bad_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.vcf"), VCF).unwrap();
        fs::write(dir.path().join("b.vcf"), "no header here\n").unwrap();
        fs::write(dir.path().join("c.vcf"), VCF.replace("NA12878", "NA24385")).unwrap();

        let files = manifest::list_vcf_files(dir.path()).unwrap();
        let store = Arc::new(InMemoryVariantStore::new());
        let report = processor(store.clone(), 1000).ingest_manifest(&files).await;

        assert_eq!(report.ingested.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].path.ends_with("b.vcf"));

        // Both patients share the same three variants
        assert_eq!(store.variant_count().await, 3);
        assert_eq!(report.ingested[1].summary.variants_merged, 3);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_prepare_runs_off_runtime() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("case-18.vcf.gz");
        let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
        std::io::Write::write_all(&mut encoder, VCF.as_bytes()).unwrap();
        fs::write(&path, encoder.finish().unwrap()).unwrap();

        let prepared = prepare_blocking(&path).await.unwrap();
        assert_eq!(prepared.records.len(), 3);
        assert_eq!(prepared.sample_name.as_deref(), Some("NA12878"));

        let err = prepare_blocking(&dir.path().join("missing.vcf")).await.unwrap_err();
        assert!(matches!(err, IngestError::MalformedInput(_)));
    }
}
