// ==============================================================================
// error.rs - Ingestion error types
// ==============================================================================
// Description: Store, ingestion and configuration errors
// Author: Matt Barham
// Created: 2026-10-04
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use thiserror::Error;
use uuid::Uuid;

use crate::parsers::VCFParseError;
use crate::transport::DeliveryError;

/// Persistence failures (fatal to the current request, never rolled back)
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Failed to encode record fields: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Value out of range for store column {column}: {value}")]
    OutOfRange { column: &'static str, value: String },
}

#[derive(Error, Debug)]
pub enum IngestError {
    #[error("Malformed input: {0}")]
    MalformedInput(#[from] VCFParseError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Patient not found: {0}")]
    PatientNotFound(Uuid),

    #[error("Variant {0} was not resolved to a stored record")]
    UnresolvedVariant(String),

    #[error("Patient resolution failed: {0}")]
    PatientResolution(DeliveryError),

    #[error("File preparation task failed: {0}")]
    Preparation(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("Invalid value for {name}: '{value}' ({reason})")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error("Failed to read {name}: {source}")]
    Io {
        name: &'static str,
        #[source]
        source: std::io::Error,
    },
}
