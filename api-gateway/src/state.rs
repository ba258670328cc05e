// ==============================================================================
// state.rs - Application State Management
// ==============================================================================
// Description: Shared application state for the variant store API
// Author: Matt Barham
// Created: 2026-10-12
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use redis::Client as RedisClient;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use variant_ingest::config::StoreConfig;
use variant_ingest::ingest::DedupIngestionEngine;
use variant_ingest::store::{PgVariantStore, VariantStore};

use crate::queue::JobQueue;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    engine: DedupIngestionEngine,
    queue: JobQueue,
    upload_dir: PathBuf,
}

impl AppState {
    /// Create application state from environment
    pub async fn new() -> Result<Self> {
        let store_config = StoreConfig::from_env().context("Invalid store configuration")?;
        let store = PgVariantStore::connect(&store_config)
            .await
            .context("Failed to connect to PostgreSQL")?;
        store.migrate().await.context("Failed to run migrations")?;

        let redis_url = std::env::var("REDIS_URL")
            .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());
        let redis_client = RedisClient::open(redis_url).context("Failed to create Redis client")?;

        let upload_dir = PathBuf::from(
            std::env::var("UPLOAD_DIR").unwrap_or_else(|_| "/tmp/variant-uploads".to_string()),
        );
        tokio::fs::create_dir_all(&upload_dir)
            .await
            .context("Failed to create upload directory")?;
        info!("Staging uploads in {:?}", upload_dir);

        Ok(Self::from_parts(Arc::new(store), redis_client, upload_dir))
    }

    pub fn from_parts(
        store: Arc<dyn VariantStore>,
        redis_client: RedisClient,
        upload_dir: PathBuf,
    ) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                engine: DedupIngestionEngine::new(store),
                queue: JobQueue::new(redis_client),
                upload_dir,
            }),
        }
    }

    pub fn engine(&self) -> &DedupIngestionEngine {
        &self.inner.engine
    }

    pub fn store(&self) -> &Arc<dyn VariantStore> {
        self.inner.engine.store()
    }

    pub fn queue(&self) -> &JobQueue {
        &self.inner.queue
    }

    pub fn upload_dir(&self) -> &Path {
        &self.inner.upload_dir
    }

    /// In-memory store, unconnected Redis client, temp staging dir
    #[cfg(test)]
    pub fn mock(upload_dir: &Path) -> Self {
        use variant_ingest::store::InMemoryVariantStore;

        let redis_client =
            RedisClient::open("redis://127.0.0.1:6379").expect("valid redis url");
        Self::from_parts(
            Arc::new(InMemoryVariantStore::new()),
            redis_client,
            upload_dir.to_path_buf(),
        )
    }
}
