// ==============================================================================
// lib.rs - Variant Ingestion Library
// ==============================================================================
// Description: Library interface for VCF parsing, variant deduplication and
//              chunk transport
// Author: Matt Barham
// Created: 2026-10-02
// Modified: 2026-10-17
// Version: 2.0.0
// ==============================================================================

pub mod parsers;
pub mod models;
pub mod batch;
pub mod error;
pub mod config;
pub mod store;
pub mod ingest;
pub mod transport;
pub mod relay;
pub mod manifest;
pub mod processor;
