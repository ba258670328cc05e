// ==============================================================================
// models.rs - API Data Models
// ==============================================================================
// Description: Request/response models for the variant store API
// Author: Matt Barham
// Created: 2026-10-12
// Modified: 2026-10-16
// Version: 1.0.0
// ==============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use variant_ingest::ingest::IngestSummary;

/// Deletion request body: `{ "patient_id": ... }`
#[derive(Debug, Deserialize)]
pub struct DeletePatientRequest {
    pub patient_id: Uuid,
}

/// `GET /api/patients?name=`
#[derive(Debug, Deserialize)]
pub struct PatientQuery {
    pub name: String,
}

/// Response to an accepted variant batch
#[derive(Debug, Serialize)]
pub struct AddVariantsResponse {
    pub message: String,
    pub summary: IngestSummary,
}

/// Response to an accepted upload
#[derive(Debug, Serialize)]
pub struct UploadAcceptedResponse {
    pub task_group_id: Uuid,
    pub status: &'static str,
    pub sha256: String,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// API information response
#[derive(Debug, Serialize)]
pub struct ApiInfoResponse {
    pub service: &'static str,
    pub version: &'static str,
    pub endpoints: Vec<&'static str>,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub timestamp: DateTime<Utc>,
}

/// Readiness check response
#[derive(Debug, Serialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    pub store: bool,
    pub redis: bool,
    pub upload_dir: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub details: Option<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: None,
        }
    }

    pub fn with_details(error: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            details: Some(details.into()),
        }
    }
}
