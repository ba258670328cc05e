// ==============================================================================
// main.rs - Variant Ingestion CLI
// ==============================================================================
// Description: Command-line entry point: migrate, ingest (direct write), relay
//              to the store service, and patient deletion
// Author: Matt Barham
// Created: 2026-10-11
// Modified: 2026-10-18
// Version: 2.0.0
// ==============================================================================

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use variant_ingest::config::{PipelineConfig, RelayConfig, StoreConfig};
use variant_ingest::ingest::DedupIngestionEngine;
use variant_ingest::manifest;
use variant_ingest::models::NewPatient;
use variant_ingest::processor::{DirectWriteProcessor, RelayProcessor};
use variant_ingest::relay::StoreServiceClient;
use variant_ingest::store::{InMemoryVariantStore, PgVariantStore, VariantStore};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Apply database migrations
    Migrate,

    /// Parse VCF files and write them straight into the variant store
    Ingest {
        /// VCF files to ingest (ignored with --manifest-dir)
        files: Vec<PathBuf>,

        /// Ingest every .vcf / .vcf.gz file in this directory
        #[arg(long)]
        manifest_dir: Option<PathBuf>,

        #[command(flatten)]
        patient: PatientArgs,

        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Use a throwaway in-memory store instead of Postgres
        #[arg(long)]
        dry_run: bool,
    },

    /// Parse a VCF file and POST its chunks to a running store service
    Relay {
        file: PathBuf,

        #[command(flatten)]
        patient: PatientArgs,

        #[command(flatten)]
        pipeline: PipelineArgs,

        /// Store service base URL
        #[arg(long, env = "STORE_SERVICE_URL")]
        store_url: Option<String>,
    },

    /// Delete a patient and garbage-collect its variants
    Delete {
        #[arg(long)]
        patient_id: Uuid,

        /// Delete through a running store service instead of the database
        #[arg(long)]
        store_url: Option<String>,
    },
}

#[derive(Args, Debug)]
struct PatientArgs {
    /// Patient name (defaults to the sample column name)
    #[arg(long, requires = "accession_number")]
    patient_name: Option<String>,

    /// Accession number (defaults to the file stem)
    #[arg(long)]
    accession_number: Option<String>,

    /// HPO terms
    #[arg(long, default_value = "")]
    hpo_terms: String,
}

impl PatientArgs {
    fn into_patient(self) -> Option<NewPatient> {
        let accession_number = self.accession_number?;
        Some(NewPatient {
            patient_name: self
                .patient_name
                .unwrap_or_else(|| accession_number.clone()),
            accession_number,
            hpo_terms: self.hpo_terms,
        })
    }
}

#[derive(Args, Debug)]
struct PipelineArgs {
    /// Records per chunk
    #[arg(long, env = "VARIANT_CHUNK_SIZE")]
    chunk_size: Option<usize>,

    /// Maximum chunk deliveries in flight
    #[arg(long, env = "VARIANT_MAX_CONCURRENCY")]
    max_concurrency: Option<usize>,
}

impl PipelineArgs {
    fn config(&self) -> Result<PipelineConfig> {
        let defaults = PipelineConfig::default();
        Ok(PipelineConfig::new(
            self.chunk_size.unwrap_or(defaults.chunk_size.get()),
            self.max_concurrency.unwrap_or(defaults.max_concurrency.get()),
        )?)
    }
}

async fn connect_store() -> Result<PgVariantStore> {
    let config = StoreConfig::from_env().context("Invalid store configuration")?;
    PgVariantStore::connect(&config)
        .await
        .context("Failed to connect to variant store")
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "variant_ingest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Migrate => {
            connect_store().await?.migrate().await?;
        }

        Command::Ingest {
            files,
            manifest_dir,
            patient,
            pipeline,
            dry_run,
        } => {
            let store: Arc<dyn VariantStore> = if dry_run {
                warn!("Dry run: records are written to an in-memory store");
                Arc::new(InMemoryVariantStore::new())
            } else {
                Arc::new(connect_store().await?)
            };
            let processor =
                DirectWriteProcessor::new(DedupIngestionEngine::new(store), pipeline.config()?);

            if let Some(dir) = manifest_dir {
                let files = manifest::list_vcf_files(&dir)
                    .with_context(|| format!("Failed to list {:?}", dir))?;
                let report = processor.ingest_manifest(&files).await;
                info!(
                    "Manifest complete: {} ingested, {} failed",
                    report.ingested.len(),
                    report.failed.len()
                );
                println!("{}", serde_json::to_string_pretty(&report)?);
                if !report.failed.is_empty() {
                    anyhow::bail!("{} files failed to ingest", report.failed.len());
                }
            } else {
                if files.is_empty() {
                    anyhow::bail!("No input files given (pass files or --manifest-dir)");
                }
                let patient = patient.into_patient();
                for file in &files {
                    let report = processor
                        .ingest_file(file, patient.clone())
                        .await
                        .with_context(|| format!("Failed to ingest {:?}", file))?;
                    println!("{}", serde_json::to_string_pretty(&report)?);
                }
            }
        }

        Command::Relay {
            file,
            patient,
            pipeline,
            store_url,
        } => {
            let mut relay_config = RelayConfig::from_env()?;
            if let Some(url) = store_url {
                relay_config.base_url = url;
            }
            let client = StoreServiceClient::new(&relay_config)?;
            client
                .connect()
                .await
                .with_context(|| format!("Store service at {} is not ready", client.base_url()))?;
            let processor = RelayProcessor::new(client, pipeline.config()?);

            let report = processor
                .relay_file(&file, patient.into_patient())
                .await
                .with_context(|| format!("Failed to relay {:?}", file))?;
            println!("{}", serde_json::to_string_pretty(&report)?);

            if !report.delivery.is_complete_success() {
                anyhow::bail!(
                    "{} of {} chunks were not accepted",
                    report.delivery.failures.len(),
                    report.delivery.attempted
                );
            }
        }

        Command::Delete {
            patient_id,
            store_url: Some(url),
        } => {
            let mut relay_config = RelayConfig::from_env()?;
            relay_config.base_url = url;
            let body = StoreServiceClient::new(&relay_config)?
                .delete_patient(patient_id)
                .await
                .with_context(|| format!("Failed to delete patient {}", patient_id))?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }

        Command::Delete {
            patient_id,
            store_url: None,
        } => {
            let store: Arc<dyn VariantStore> = Arc::new(connect_store().await?);
            let summary = DedupIngestionEngine::new(store)
                .delete_patient(patient_id)
                .await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }

    Ok(())
}
