// ==============================================================================
// queue.rs - Redis Upload Queue
// ==============================================================================
// Description: Enqueues staged VCF uploads and reads task status records
// Author: Matt Barham
// Created: 2026-10-12
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use redis::{AsyncCommands, Client};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use variant_ingest::models::NewPatient;
use variant_ingest::transport::ChunkFailure;

const QUEUE_KEY: &str = "variants:upload_queue";
const TASK_PREFIX: &str = "variants:task:";
const TASK_TTL_SECS: u64 = 86400;

/// Upload job payload (must match worker/src/queue.rs)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobPayload {
    pub task_id: Uuid,
    pub patient: NewPatient,
    pub vcf_path: String,
    pub sha256: String,
    pub submitted_at: DateTime<Utc>,
}

/// Lifecycle of an upload task (must match worker/src/queue.rs)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskState {
    Queued,
    InProgress,
    Completed,
    Failed,
}

impl TaskState {
    pub fn is_finished(&self) -> bool {
        matches!(self, TaskState::Completed | TaskState::Failed)
    }
}

/// Task status record stored under `variants:task:{id}`
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
    pub fn queued(task_id: Uuid) -> Self {
        Self {
            task_id,
            state: TaskState::Queued,
            patient_id: None,
            chunks_total: 0,
            chunks_failed: 0,
            errors: Vec::new(),
            error_message: None,
            updated_at: Utc::now(),
        }
    }
}

fn task_key(task_id: Uuid) -> String {
    format!("{}{}", TASK_PREFIX, task_id)
}

/// Upload queue manager
pub struct JobQueue {
    client: Client,
}

impl JobQueue {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Record the task as queued, then push the job
    pub async fn enqueue(&self, payload: &JobPayload) -> Result<()> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to get Redis connection")?;

        let status_json = serde_json::to_string(&TaskStatus::queued(payload.task_id))
            .context("Failed to serialize task status")?;
        conn.set_ex::<_, _, ()>(task_key(payload.task_id), &status_json, TASK_TTL_SECS)
            .await
            .context("Failed to store task status")?;

        let payload_json =
            serde_json::to_string(payload).context("Failed to serialize job payload")?;

        // LPUSH for FIFO with BRPOP
        conn.lpush::<_, _, ()>(QUEUE_KEY, &payload_json)
            .await
            .context("Failed to push job to queue")?;

        Ok(())
    }

    pub async fn task_status(&self, task_id: Uuid) -> Result<Option<TaskStatus>> {
        let mut conn = self
            .client
            .get_multiplexed_async_connection()
            .await
            .context("Failed to get Redis connection")?;

        let status_json: Option<String> = conn
            .get(task_key(task_id))
            .await
            .context("Failed to read task status")?;

        status_json
            .map(|json| serde_json::from_str(&json).context("Failed to deserialize task status"))
            .transpose()
    }

    pub async fn ping(&self) -> bool {
        match self.client.get_multiplexed_async_connection().await {
            Ok(mut conn) => redis::cmd("PING")
                .query_async::<String>(&mut conn)
                .await
                .is_ok(),
            Err(_) => false,
        }
    }
}
