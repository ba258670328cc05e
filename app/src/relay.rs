// ==============================================================================
// relay.rs - Store service HTTP client
// ==============================================================================
// Description: reqwest client for the variant store service; delivers chunks
//              to /api/addVariants and resolves patients via /api/addPatient
// Author: Matt Barham
// Created: 2026-10-09
// Modified: 2026-10-18
// Version: 1.0.0
// ==============================================================================

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use tracing::debug;

use crate::config::RelayConfig;
use crate::models::{Chunk, NewPatient, PatientEnvelope, PatientId, PatientResponse};
use crate::transport::{ChunkSink, DeliveryError};

/// Client for a running variant store service
#[derive(Debug, Clone)]
pub struct StoreServiceClient {
    http: Client,
    base_url: String,
}

#[derive(Serialize)]
struct DeleteRequest {
    patient_id: PatientId,
}

impl StoreServiceClient {
    pub fn new(config: &RelayConfig) -> Result<Self, DeliveryError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| DeliveryError::transport(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Check that the service can reach its store
    pub async fn connect(&self) -> Result<(), DeliveryError> {
        let response = self
            .http
            .get(self.url("/api/connect"))
            .send()
            .await
            .map_err(transport_error)?;
        expect_status(response, &[StatusCode::OK]).await.map(|_| ())
    }

    /// Create the patient, or fetch the id of the existing one
    pub async fn add_patient(&self, patient: &NewPatient) -> Result<PatientResponse, DeliveryError> {
        let response = self
            .http
            .post(self.url("/api/addPatient"))
            .json(&PatientEnvelope {
                patient: patient.clone(),
            })
            .send()
            .await
            .map_err(transport_error)?;

        let body = expect_status(response, &[StatusCode::CREATED, StatusCode::OK]).await?;
        serde_json::from_value(body)
            .map_err(|e| DeliveryError::transport(format!("Unexpected addPatient response: {e}")))
    }

    pub async fn delete_patient(
        &self,
        patient_id: PatientId,
    ) -> Result<serde_json::Value, DeliveryError> {
        let response = self
            .http
            .post(self.url("/api/deletePatient"))
            .json(&DeleteRequest { patient_id })
            .send()
            .await
            .map_err(transport_error)?;
        expect_status(response, &[StatusCode::OK]).await
    }
}

#[async_trait]
impl ChunkSink for StoreServiceClient {
    async fn deliver(&self, chunk: &Chunk) -> Result<serde_json::Value, DeliveryError> {
        debug!("POST chunk {} ({} records)", chunk.index, chunk.len());
        let response = self
            .http
            .post(self.url("/api/addVariants"))
            .json(&chunk.payload())
            .send()
            .await
            .map_err(transport_error)?;
        expect_status(response, &[StatusCode::CREATED]).await
    }
}

fn transport_error(error: reqwest::Error) -> DeliveryError {
    if error.is_timeout() {
        DeliveryError::transport(format!("request timed out: {error}"))
    } else {
        DeliveryError::transport(error.to_string())
    }
}

/// Read the body; any status outside `accepted` becomes a remote rejection
async fn expect_status(
    response: Response,
    accepted: &[StatusCode],
) -> Result<serde_json::Value, DeliveryError> {
    let status = response.status();
    let text = response.text().await.map_err(transport_error)?;
    let body = serde_json::from_str(&text).unwrap_or(serde_json::Value::String(text));

    if accepted.contains(&status) {
        Ok(body)
    } else {
        Err(DeliveryError::RemoteRejection {
            status: status.as_u16(),
            body,
        })
    }
}
