// ==============================================================================
// job_processor.rs - Upload Relay Job
// ==============================================================================
// Description: Relays one staged VCF upload to the store service and records
//              the outcome as task status
// Author: Matt Barham
// Created: 2026-10-13
// Modified: 2026-10-18
// Version: 2.0.1
// ==============================================================================

use anyhow::{Context, Result};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use variant_ingest::processor::{RelayProcessor, RelayReport};

use crate::queue::{JobPayload, JobQueue, StatusWriter, TaskState, TaskStatus};

pub struct JobProcessor<W = JobQueue> {
    payload: JobPayload,
    relay: Arc<RelayProcessor>,
    status: W,
}

impl<W: StatusWriter> JobProcessor<W> {
    pub fn new(payload: JobPayload, relay: Arc<RelayProcessor>, status: W) -> Self {
        Self {
            payload,
            relay,
            status,
        }
    }

    /// Run the job. The staged file is removed on every path, including a
    /// failed status write.
    pub async fn process(mut self) -> Result<()> {
        let vcf_path = PathBuf::from(&self.payload.vcf_path);
        let outcome = self.run(&vcf_path).await;
        remove_staged(&vcf_path).await;
        outcome
    }

    async fn run(&mut self, vcf_path: &Path) -> Result<()> {
        let task_id = self.payload.task_id;

        if let Err(e) = self
            .status
            .set_status(&TaskStatus::new(task_id, TaskState::InProgress))
            .await
        {
            warn!("Task {}: could not mark in progress: {:#}", task_id, e);
        }

        let outcome = self.relay_upload(vcf_path).await;
        let status = match &outcome {
            Ok(report) => completed_status(task_id, report),
            Err(e) => {
                let mut status = TaskStatus::new(task_id, TaskState::Failed);
                status.error_message = Some(format!("{:#}", e));
                status
            }
        };
        let written = self
            .status
            .set_status(&status)
            .await
            .with_context(|| format!("Task {}: final status was not recorded", task_id));

        outcome?;
        written
    }

    async fn relay_upload(&self, vcf_path: &Path) -> Result<RelayReport> {
        let data = tokio::fs::read(vcf_path)
            .await
            .with_context(|| format!("Failed to read staged upload {:?}", vcf_path))?;
        let digest = sha256_hex(&data);
        if digest != self.payload.sha256 {
            anyhow::bail!(
                "Checksum mismatch for {:?}: expected {}, found {}",
                vcf_path,
                self.payload.sha256,
                digest
            );
        }

        let report = self
            .relay
            .relay_file(vcf_path, Some(self.payload.patient.clone()))
            .await?;

        info!(
            "Task {}: {}/{} chunks accepted for patient {}",
            self.payload.task_id,
            report.delivery.delivered,
            report.delivery.attempted,
            report.patient_id
        );
        Ok(report)
    }
}

/// Completed status carrying any per-chunk failures
fn completed_status(task_id: uuid::Uuid, report: &RelayReport) -> TaskStatus {
    TaskStatus {
        task_id,
        state: TaskState::Completed,
        patient_id: Some(report.patient_id),
        chunks_total: report.delivery.attempted,
        chunks_failed: report.delivery.failures.len(),
        errors: report.delivery.failures.clone(),
        error_message: None,
        updated_at: Utc::now(),
    }
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// Remove the staged file and its (now empty) task directory
async fn remove_staged(vcf_path: &Path) {
    if let Err(e) = tokio::fs::remove_file(vcf_path).await {
        warn!("Failed to remove staged upload {:?}: {}", vcf_path, e);
        return;
    }
    if let Some(task_dir) = vcf_path.parent() {
        if let Err(e) = tokio::fs::remove_dir(task_dir).await {
            warn!("Failed to remove task directory {:?}: {}", task_dir, e);
        }
    }
}
