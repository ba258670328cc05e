// ==============================================================================
// transport.rs - Concurrent chunk delivery
// ==============================================================================
// Description: Bounded-concurrency dispatch of chunks to a delivery target with
//              per-chunk failure capture
// Author: Matt Barham
// Created: 2026-10-07
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::models::Chunk;

/// Per-chunk delivery failure
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeliveryError {
    /// No response, timeout, connection failure or a crashed delivery task
    #[error("Transport failure: {message}")]
    Transport { message: String },

    /// Target answered with something other than success
    #[error("Remote rejected chunk with status {status}: {body}")]
    RemoteRejection {
        status: u16,
        body: serde_json::Value,
    },
}

impl DeliveryError {
    pub fn transport(message: impl Into<String>) -> Self {
        DeliveryError::Transport {
            message: message.into(),
        }
    }
}

/// Delivery target for one chunk at a time
#[async_trait]
pub trait ChunkSink: Send + Sync + 'static {
    /// Send one chunk; the success payload is whatever the target returned
    async fn deliver(&self, chunk: &Chunk) -> Result<serde_json::Value, DeliveryError>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkFailure {
    pub chunk_index: usize,
    pub records: usize,
    pub error: DeliveryError,
}

/// Aggregate outcome of delivering every chunk of an upload
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeliveryReport {
    pub attempted: usize,
    pub delivered: usize,
    pub failures: Vec<ChunkFailure>,
}

impl DeliveryReport {
    pub fn is_complete_success(&self) -> bool {
        self.failures.is_empty() && self.delivered == self.attempted
    }
}

/// Dispatches chunks concurrently, never more than `max_in_flight` at once
#[derive(Debug, Clone, Copy)]
pub struct TransportOrchestrator {
    max_in_flight: NonZeroUsize,
}

impl TransportOrchestrator {
    pub fn new(max_in_flight: NonZeroUsize) -> Self {
        Self { max_in_flight }
    }

    /// Deliver every chunk and collect each outcome.
    ///
    /// A failing or panicking delivery is recorded against its chunk and does
    /// not cancel the others. Nothing is retried.
    pub async fn deliver(&self, sink: Arc<dyn ChunkSink>, chunks: Vec<Chunk>) -> DeliveryReport {
        let semaphore = Arc::new(Semaphore::new(self.max_in_flight.get()));
        let attempted = chunks.len();
        info!(
            "Dispatching {} chunks (max {} in flight)",
            attempted,
            self.max_in_flight.get()
        );

        let mut tasks = Vec::with_capacity(attempted);
        for chunk in chunks {
            let index = chunk.index;
            let records = chunk.len();
            let sink = Arc::clone(&sink);
            let semaphore = Arc::clone(&semaphore);

            let task = tokio::spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|e| DeliveryError::transport(e.to_string()))?;
                sink.deliver(&chunk).await
            });
            tasks.push((index, records, task));
        }

        let mut report = DeliveryReport {
            attempted,
            ..DeliveryReport::default()
        };

        for (chunk_index, records, task) in tasks {
            let outcome = match task.await {
                Ok(outcome) => outcome,
                Err(join_error) => Err(DeliveryError::transport(format!(
                    "delivery task aborted: {join_error}"
                ))),
            };

            match outcome {
                Ok(_) => {
                    debug!("Chunk {} delivered ({} records)", chunk_index, records);
                    report.delivered += 1;
                }
                Err(error) => {
                    warn!("Chunk {} failed: {}", chunk_index, error);
                    report.failures.push(ChunkFailure {
                        chunk_index,
                        records,
                        error,
                    });
                }
            }
        }

        info!(
            "Delivered {}/{} chunks ({} failed)",
            report.delivered,
            report.attempted,
            report.failures.len()
        );
        report
    }

    /// Blocking entry point for synchronous callers; drives its own runtime.
    pub fn deliver_blocking(
        &self,
        sink: Arc<dyn ChunkSink>,
        chunks: Vec<Chunk>,
    ) -> std::io::Result<DeliveryReport> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()?;
        Ok(runtime.block_on(self.deliver(sink, chunks)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CompositeRecord, FieldMap, FieldValue, QualityFields, VariantKey};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use uuid::Uuid;

    fn chunks(count: usize, records_each: usize) -> Vec<Chunk> {
        let patient_id = Uuid::new_v4();
        (0..count)
            .map(|index| Chunk {
                index,
                patient_id,
                records: (0..records_each)
                    .map(|i| CompositeRecord {
                        variant: VariantKey {
                            chrom: "1".to_string(),
                            pos: (index * records_each + i) as u64,
                            reference: "A".to_string(),
                            alt: "C".to_string(),
                        },
                        qual: QualityFields {
                            qual: FieldValue::Number(50.0),
                            filter: "PASS".to_string(),
                        },
                        info: FieldMap::new(),
                        format: FieldMap::new(),
                    })
                    .collect(),
            })
            .collect()
    }

    fn limit(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    /// Tracks the peak number of concurrent deliveries
    #[derive(Default)]
    struct GaugeSink {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ChunkSink for GaugeSink {
        async fn deliver(&self, _chunk: &Chunk) -> Result<serde_json::Value, DeliveryError> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(serde_json::json!({"status": "created"}))
        }
    }

    /// Rejects one chunk index, panics on another
    struct FlakySink {
        reject: usize,
        panic_on: Option<usize>,
    }

    #[async_trait]
    impl ChunkSink for FlakySink {
        async fn deliver(&self, chunk: &Chunk) -> Result<serde_json::Value, DeliveryError> {
            if Some(chunk.index) == self.panic_on {
                panic!("sink exploded");
            }
            if chunk.index == self.reject {
                return Err(DeliveryError::RemoteRejection {
                    status: 500,
                    body: serde_json::json!({"message": "boom"}),
                });
            }
            Ok(serde_json::Value::Null)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_in_flight_never_exceeds_limit() {
        let sink = Arc::new(GaugeSink::default());
        let orchestrator = TransportOrchestrator::new(limit(3));

        let report = orchestrator.deliver(sink.clone(), chunks(20, 2)).await;

        assert!(report.is_complete_success());
        assert_eq!(report.delivered, 20);
        let peak = sink.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak in flight was {peak}");
        assert!(peak >= 1);
    }

    #[tokio::test]
    async fn test_single_failure_is_isolated() {
        let sink = Arc::new(FlakySink {
            reject: 4,
            panic_on: None,
        });
        let report = TransportOrchestrator::new(limit(2))
            .deliver(sink, chunks(8, 3))
            .await;

        assert_eq!(report.attempted, 8);
        assert_eq!(report.delivered, 7);
        assert_eq!(report.failures.len(), 1);
        let failure = &report.failures[0];
        assert_eq!(failure.chunk_index, 4);
        assert_eq!(failure.records, 3);
        assert!(matches!(
            failure.error,
            DeliveryError::RemoteRejection { status: 500, .. }
        ));
    }

    #[tokio::test]
    async fn test_panicking_delivery_reported_as_transport() {
        let sink = Arc::new(FlakySink {
            reject: usize::MAX,
            panic_on: Some(1),
        });
        let report = TransportOrchestrator::new(limit(4))
            .deliver(sink, chunks(3, 1))
            .await;

        assert_eq!(report.delivered, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].chunk_index, 1);
        assert!(matches!(report.failures[0].error, DeliveryError::Transport { .. }));
    }

    #[test]
    fn test_deliver_blocking() {
        let sink = Arc::new(GaugeSink::default());
        let report = TransportOrchestrator::new(limit(2))
            .deliver_blocking(sink, chunks(5, 1))
            .unwrap();
        assert_eq!(report.attempted, 5);
        assert_eq!(report.delivered, 5);
    }

    #[test]
    fn test_empty_upload() {
        let report = TransportOrchestrator::new(limit(1))
            .deliver_blocking(Arc::new(GaugeSink::default()), Vec::new())
            .unwrap();
        assert_eq!(report, DeliveryReport::default());
        assert!(report.is_complete_success());
    }

    #[test]
    fn test_delivery_error_json_shape() {
        let json = serde_json::to_value(DeliveryError::RemoteRejection {
            status: 400,
            body: serde_json::json!("bad"),
        })
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({"kind": "remote_rejection", "status": 400, "body": "bad"})
        );
    }
}
