// ==============================================================================
// main.rs - Variant Relay Worker
// ==============================================================================
// Description: Background worker that relays queued VCF uploads to the
//              variant store service
// Author: Matt Barham
// Created: 2026-10-13
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::Client as RedisClient;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};

use variant_ingest::config::{PipelineConfig, RelayConfig};
use variant_ingest::processor::RelayProcessor;
use variant_ingest::relay::StoreServiceClient;

mod job_processor;
mod queue;

use job_processor::JobProcessor;
use queue::{JobPayload, JobQueue};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing (LOG_FORMAT=json for log shippers)
    let json_logs = std::env::var("LOG_FORMAT")
        .map(|format| format.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logs {
        tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_max_level(Level::INFO)
            .with_target(false)
            .compact()
            .init();
    }

    info!("Starting Variant Relay Worker v1.0.0");

    let pipeline = PipelineConfig::from_env().context("Invalid pipeline configuration")?;
    let relay_config = RelayConfig::from_env().context("Invalid relay configuration")?;
    let client = StoreServiceClient::new(&relay_config)?;
    info!(
        "Relaying to {} (chunk size {}, {} in flight)",
        client.base_url(),
        pipeline.chunk_size,
        pipeline.max_concurrency
    );
    if let Err(e) = client.connect().await {
        warn!("Store service not ready yet: {}", e);
    }

    // Initialize Redis connection
    let redis_url = std::env::var("REDIS_URL")
        .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
    let redis_client = RedisClient::open(redis_url).context("Failed to create Redis client")?;
    let redis_conn = ConnectionManager::new(redis_client)
        .await
        .context("Failed to create Redis connection manager")?;

    info!("Connected to Redis");

    let worker = Worker {
        redis_conn,
        relay: Arc::new(RelayProcessor::new(client, pipeline)),
    };

    info!("Worker ready, waiting for uploads...");
    worker.run().await
}

#[derive(Clone)]
struct Worker {
    redis_conn: ConnectionManager,
    relay: Arc<RelayProcessor>,
}

impl Worker {
    /// Main processing loop - polls Redis queue for uploads
    async fn run(&self) -> Result<()> {
        let mut job_queue = JobQueue::new(self.redis_conn.clone());

        loop {
            match job_queue.dequeue().await {
                Ok(Some(payload)) => {
                    info!("Received upload task: {}", payload.task_id);

                    // Relay in background (don't block queue)
                    let worker = self.clone();
                    tokio::spawn(async move {
                        let task_id = payload.task_id;
                        if let Err(e) = worker.process_job(payload).await {
                            error!("Task {} failed: {:#}", task_id, e);
                        }
                    });
                }
                Ok(None) => {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(e) => {
                    error!("Failed to dequeue upload: {}", e);
                    tokio::time::sleep(Duration::from_secs(5)).await;
                }
            }
        }
    }

    async fn process_job(&self, payload: JobPayload) -> Result<()> {
        let queue = JobQueue::new(self.redis_conn.clone());
        JobProcessor::new(payload, Arc::clone(&self.relay), queue)
            .process()
            .await
    }
}
