// ==============================================================================
// queue.rs - Redis Upload Queue (Worker Side)
// ==============================================================================
// Description: Consumes queued uploads and writes task status records
// Author: Matt Barham
// Created: 2026-10-13
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use std::future::Future;
use uuid::Uuid;

use variant_ingest::models::NewPatient;
use variant_ingest::transport::ChunkFailure;

const QUEUE_KEY: &str = "variants:upload_queue";
const TASK_PREFIX: &str = "variants:task:";
const TASK_TTL_SECS: u64 = 86400;

/// Upload job payload (must match API gateway)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    pub task_id: Uuid,
    pub patient: NewPatient,
    pub vcf_path: String,
    pub sha256: String,
    pub submitted_at: DateTime<Utc>,
}

/// Lifecycle of an upload task (must match API gateway)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    InProgress,
    Completed,
    Failed,
}

/// Task status record (must match API gateway)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskStatus {
    pub task_id: Uuid,
    pub state: TaskState,
    pub patient_id: Option<Uuid>,
    #[serde(default)]
    pub chunks_total: usize,
    #[serde(default)]
    pub chunks_failed: usize,
    #[serde(default)]
    pub errors: Vec<ChunkFailure>,
    pub error_message: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl TaskStatus {
    pub fn new(task_id: Uuid, state: TaskState) -> Self {
        Self {
            task_id,
            state,
            patient_id: None,
            chunks_total: 0,
            chunks_failed: 0,
            errors: Vec::new(),
            error_message: None,
            updated_at: Utc::now(),
        }
    }
}

/// Destination for task status updates
pub trait StatusWriter: Send {
    fn set_status(&mut self, status: &TaskStatus) -> impl Future<Output = Result<()>> + Send;
}

/// Upload queue consumer
#[derive(Clone)]
pub struct JobQueue {
    conn: ConnectionManager,
}

impl JobQueue {
    pub fn new(conn: ConnectionManager) -> Self {
        Self { conn }
    }

    /// Dequeue a job (blocking pop with timeout)
    pub async fn dequeue(&mut self) -> Result<Option<JobPayload>> {
        // BRPOP with 1 second timeout
        let result: Option<(String, String)> = self
            .conn
            .brpop(QUEUE_KEY, 1.0)
            .await
            .context("Failed to pop from queue")?;

        match result {
            Some((_, payload_json)) => {
                let payload: JobPayload = serde_json::from_str(&payload_json)
                    .context("Failed to deserialize job payload")?;
                Ok(Some(payload))
            }
            None => Ok(None),
        }
    }
}

impl StatusWriter for JobQueue {
    async fn set_status(&mut self, status: &TaskStatus) -> Result<()> {
        let key = format!("{}{}", TASK_PREFIX, status.task_id);
        let json = serde_json::to_string(status).context("Failed to serialize task status")?;
        self.conn
            .set_ex::<_, _, ()>(key, json, TASK_TTL_SECS)
            .await
            .context("Failed to store task status")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_payload_from_gateway_json() {
        let json = serde_json::json!({
            "task_id": "00000000-0000-0000-0000-000000000001",
            "patient": {"patient_name": "Jane Roe", "accession_number": "ACC-1", "hpo_terms": ""},
            "vcf_path": "/tmp/variant-uploads/x/sample.vcf",
            "sha256": "ab",
            "submitted_at": "2026-10-16T12:00:00Z"
        });

        let payload: JobPayload = serde_json::from_value(json).unwrap();
        assert_eq!(payload.patient.accession_number, "ACC-1");
        assert!(payload.vcf_path.ends_with("sample.vcf"));
    }

    #[test]
    fn test_status_state_names() {
        let json = serde_json::to_value(TaskStatus::new(Uuid::nil(), TaskState::InProgress)).unwrap();
        assert_eq!(json["state"], "in_progress");
        assert_eq!(json["chunks_failed"], 0);
    }
}
