// ==============================================================================
// main.rs - Variant Store API Entry Point
// ==============================================================================
// Description: Axum web server for variant storage and VCF upload endpoints
// Author: Matt Barham
// Created: 2026-10-12
// Modified: 2026-10-17
// Version: 1.0.0
// ==============================================================================

use anyhow::{Context, Result};
use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, Level};

mod handlers;
mod models;
mod queue;
mod state;
mod validator;

use state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(false)
        .compact()
        .init();

    info!("Starting Variant Store API v1.0.0");

    // Load environment variables
    dotenvy::dotenv().ok();

    let server_port: u16 = std::env::var("SERVER_PORT")
        .ok()
        .map(|port| port.parse())
        .transpose()
        .context("SERVER_PORT must be a port number")?
        .unwrap_or(3000);

    let state = AppState::new()
        .await
        .context("Failed to initialize application state")?;

    let app = build_router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], server_port));
    info!("Variant Store API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}

fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/connect", get(handlers::connect))
        .route("/addPatient", post(handlers::add_patient))
        .route("/addVariants", post(handlers::add_variants))
        .route("/deletePatient", post(handlers::delete_patient))
        .route("/patients", get(handlers::patients_by_name))
        .route("/stats", get(handlers::consequence_stats))
        .route("/uploadReferencedDocs", post(handlers::upload_referenced_docs))
        .route("/tasks/{task_id}", get(handlers::task_status));

    // Origins are configured via CORS_ALLOWED_ORIGINS env var (comma-separated)
    let cors_origins = std::env::var("CORS_ALLOWED_ORIGINS")
        .unwrap_or_else(|_| "http://localhost:3000".to_string());
    let allowed_origins: Vec<_> = cors_origins
        .split(',')
        .filter_map(|s| s.trim().parse().ok())
        .collect();

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::list(allowed_origins))
        .allow_credentials(false)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .expose_headers([header::CONTENT_TYPE]);

    Router::new()
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health_check))
        .route("/ready", get(handlers::readiness_check))
        .nest("/api", api_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                // Chunk bodies of 1000 records and staged VCF uploads
                .layer(DefaultBodyLimit::max(500 * 1024 * 1024)),
        )
        .with_state(state)
}
