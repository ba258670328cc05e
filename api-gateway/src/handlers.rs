// ==============================================================================
// handlers.rs - API Request Handlers
// ==============================================================================
// Description: HTTP request handlers for the variant store API
// Author: Matt Barham
// Created: 2026-10-12
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};
use uuid::Uuid;

use variant_ingest::error::IngestError;
use variant_ingest::models::{NewPatient, PatientEnvelope, PatientRecord, PatientResponse, VariantBatch};

use crate::{
    models::*,
    queue::{JobPayload, TaskStatus},
    state::AppState,
    validator::FileValidator,
};

/// Root endpoint - API information
pub async fn root() -> Json<ApiInfoResponse> {
    Json(ApiInfoResponse {
        service: "Variant Store API",
        version: "1.0.0",
        endpoints: vec![
            "/health - Health check",
            "/ready - Readiness check",
            "/api/connect - Store connectivity (GET)",
            "/api/addPatient - Create or resolve a patient (POST)",
            "/api/addVariants - Ingest a chunk of variant records (POST)",
            "/api/deletePatient - Delete a patient and its variants (POST)",
            "/api/patients?name= - Patients by name (GET)",
            "/api/stats - Functional consequence counts (GET)",
            "/api/uploadReferencedDocs - Upload a VCF for background relay (POST)",
            "/api/tasks/{task_id} - Upload task status (GET)",
        ],
    })
}

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: "1.0.0",
        timestamp: Utc::now(),
    })
}

/// Readiness check endpoint
pub async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    let store_ready = state.store().ping().await.is_ok();
    let redis_ready = state.queue().ping().await;
    let upload_dir_ready = state.upload_dir().exists();

    let ready = store_ready && redis_ready && upload_dir_ready;
    let response = ReadinessResponse {
        ready,
        store: store_ready,
        redis: redis_ready,
        upload_dir: upload_dir_ready,
    };

    let status = if ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status, Json(response))
}

/// Store reachability
pub async fn connect(State(state): State<AppState>) -> Result<Json<MessageResponse>, AppError> {
    state
        .store()
        .ping()
        .await
        .map_err(|e| AppError::Unavailable(e.to_string()))?;

    Ok(Json(MessageResponse {
        message: "Connected to variant store".to_string(),
    }))
}

/// Create the patient, or return the existing one for the accession number
pub async fn add_patient(
    State(state): State<AppState>,
    payload: Result<Json<PatientEnvelope>, JsonRejection>,
) -> Result<(StatusCode, Json<PatientResponse>), AppError> {
    let Json(envelope) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let patient = envelope.patient;
    if patient.accession_number.trim().is_empty() {
        return Err(AppError::BadRequest("accession_number is required".to_string()));
    }

    let resolved = state.engine().resolve_patient(&patient).await?;
    let (status, message) = if resolved.created {
        (StatusCode::CREATED, "Patient created")
    } else {
        (StatusCode::OK, "Patient already exists")
    };

    Ok((
        status,
        Json(PatientResponse {
            patient_id: resolved.record.id,
            created: resolved.created,
            message: message.to_string(),
        }),
    ))
}

/// Ingest one chunk of composite records for an existing patient
pub async fn add_variants(
    State(state): State<AppState>,
    payload: Result<Json<VariantBatch>, JsonRejection>,
) -> Result<(StatusCode, Json<AddVariantsResponse>), AppError> {
    let Json(batch) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;

    let patient = state
        .store()
        .find_patient(batch.patient_id)
        .await
        .map_err(IngestError::from)?;
    if patient.is_none() {
        return Err(IngestError::PatientNotFound(batch.patient_id).into());
    }

    let summary = state.engine().ingest(batch.patient_id, &batch.data).await?;
    info!(
        "Accepted {} records for patient {}",
        summary.records, batch.patient_id
    );

    Ok((
        StatusCode::CREATED,
        Json(AddVariantsResponse {
            message: "Variants added".to_string(),
            summary,
        }),
    ))
}

pub async fn delete_patient(
    State(state): State<AppState>,
    payload: Result<Json<DeletePatientRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) = payload.map_err(|e| AppError::BadRequest(e.body_text()))?;
    let summary = state.engine().delete_patient(request.patient_id).await?;
    Ok(Json(summary))
}

pub async fn patients_by_name(
    State(state): State<AppState>,
    Query(query): Query<PatientQuery>,
) -> Result<Json<Vec<PatientRecord>>, AppError> {
    let patients = state
        .store()
        .patients_by_name(&query.name)
        .await
        .map_err(IngestError::from)?;
    Ok(Json(patients))
}

pub async fn consequence_stats(State(state): State<AppState>) -> Result<impl IntoResponse, AppError> {
    let stats = state
        .store()
        .consequence_stats()
        .await
        .map_err(IngestError::from)?;
    Ok(Json(stats))
}

/// Accept a VCF upload, stage it, and queue it for the worker
pub async fn upload_referenced_docs(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadAcceptedResponse>), AppError> {
    info!("Received upload request");

    let validator = FileValidator::new();
    let mut upload: Option<(String, axum::body::Bytes)> = None;
    let mut patient_name: Option<String> = None;
    let mut accession_number: Option<String> = None;
    let mut hpo_terms = String::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to read multipart field: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "vcf_file" => {
                let filename = field.file_name().unwrap_or("upload.vcf").to_string();
                let data = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read VCF file: {}", e)))?;
                upload = Some((filename, data));
            }
            "patient_name" | "accession_number" | "hpo_terms" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::BadRequest(format!("Failed to read {}: {}", name, e)))?;
                match name.as_str() {
                    "patient_name" => patient_name = Some(value),
                    "accession_number" => accession_number = Some(value),
                    _ => hpo_terms = value,
                }
            }
            other => warn!("Ignoring unknown multipart field: {}", other),
        }
    }

    let (filename, data) =
        upload.ok_or_else(|| AppError::BadRequest("vcf_file is required".to_string()))?;
    let accession_number = accession_number
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("accession_number is required".to_string()))?;
    let patient_name = patient_name
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| AppError::BadRequest("patient_name is required".to_string()))?;

    // Validate before anything touches the disk
    let validated = validator
        .validate_upload(&filename, &data)
        .map_err(|e| AppError::BadRequest(format!("Invalid VCF file: {}", e)))?;
    info!(
        "VCF validated: {} ({} bytes{}, SHA256: {})",
        validated.safe_name,
        validated.size,
        if validated.compressed { ", gzip" } else { "" },
        &validated.hash_sha256[..16]
    );

    let task_id = Uuid::new_v4();
    let task_dir = state.upload_dir().join(task_id.to_string());
    tokio::fs::create_dir_all(&task_dir)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create upload directory: {}", e)))?;

    let file_path = task_dir.join(&validated.safe_name);
    let mut file = tokio::fs::File::create(&file_path)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to create file: {}", e)))?;
    file.write_all(&data)
        .await
        .map_err(|e| AppError::Internal(format!("Failed to write file: {}", e)))?;

    let payload = JobPayload {
        task_id,
        patient: NewPatient {
            patient_name,
            accession_number,
            hpo_terms,
        },
        vcf_path: file_path.to_string_lossy().to_string(),
        sha256: validated.hash_sha256.clone(),
        submitted_at: Utc::now(),
    };

    if let Err(e) = state.queue().enqueue(&payload).await {
        if let Err(cleanup) = tokio::fs::remove_dir_all(&task_dir).await {
            warn!("Failed to remove staged upload {:?}: {}", task_dir, cleanup);
        }
        return Err(AppError::Internal(format!("Failed to enqueue upload: {:#}", e)));
    }

    info!("Upload queued as task {}", task_id);
    Ok((
        StatusCode::ACCEPTED,
        Json(UploadAcceptedResponse {
            task_group_id: task_id,
            status: "queued",
            sha256: validated.hash_sha256,
        }),
    ))
}

/// 404 unknown task, 202 while queued or running, 200 once finished
pub async fn task_status(
    State(state): State<AppState>,
    Path(task_id): Path<Uuid>,
) -> Result<(StatusCode, Json<TaskStatus>), AppError> {
    let status = state
        .queue()
        .task_status(task_id)
        .await
        .map_err(|e| AppError::Internal(format!("{:#}", e)))?
        .ok_or(AppError::NotFound)?;

    let code = if status.state.is_finished() {
        StatusCode::OK
    } else {
        StatusCode::ACCEPTED
    };
    Ok((code, Json(status)))
}

/// Application error type
#[derive(Debug)]
pub enum AppError {
    NotFound,
    BadRequest(String),
    Unavailable(String),
    Internal(String),
}

impl From<IngestError> for AppError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::PatientNotFound(_) => AppError::NotFound,
            IngestError::MalformedInput(e) => AppError::BadRequest(e.to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::NotFound => (
                StatusCode::NOT_FOUND,
                ErrorResponse::new("Resource not found"),
            ),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, ErrorResponse::new(msg)),
            AppError::Unavailable(msg) => {
                warn!("Store unavailable: {}", msg);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorResponse::with_details("Store unavailable", msg),
                )
            }
            AppError::Internal(msg) => {
                error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse::new("Internal server error"),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
