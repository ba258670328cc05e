// ==============================================================================
// validator.rs - VCF Upload Validation (API Gateway)
// ==============================================================================
// Description: Validates uploaded VCF files before they are staged on disk
// Author: Matt Barham
// Created: 2026-10-12
// Modified: 2026-10-18
// Version: 1.0.0
// Security: Allowlist-only file types, magic number verification, size limits
// ==============================================================================

use anyhow::Result;
use axum::body::Bytes;
use flate2::read::MultiGzDecoder;
use sha2::{Digest, Sha256};
use std::io::{BufRead, BufReader, Read};
use tracing::{debug, info};

use variant_ingest::parsers::HEADER_PREFIX;

const MAX_VCF_FILE_SIZE: usize = 200 * 1024 * 1024; // 200 MB
const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug)]
pub struct ValidatedFile {
    pub safe_name: String,
    pub compressed: bool,
    pub size: usize,
    pub hash_sha256: String,
}

#[derive(Default)]
pub struct FileValidator;

impl FileValidator {
    pub fn new() -> Self {
        Self
    }

    /// Validate a multipart VCF upload
    pub fn validate_upload(&self, filename: &str, file_data: &Bytes) -> Result<ValidatedFile> {
        info!("Validating upload: {}", filename);

        // 1. Size check (BEFORE any processing)
        let size = file_data.len();
        if size > MAX_VCF_FILE_SIZE {
            anyhow::bail!(
                "File too large: {} bytes (max: {} bytes)",
                size,
                MAX_VCF_FILE_SIZE
            );
        }
        if size == 0 {
            anyhow::bail!("File is empty");
        }

        // 2. Filename sanitization
        let safe_name = self.sanitize_filename(filename)?;

        // 3. Extension allowlist
        let compressed = match self.get_extension(&safe_name)? {
            "vcf" => false,
            "vcf.gz" => true,
            other => anyhow::bail!("Invalid file type: .{}", other),
        };

        // 4. Magic number verification
        if compressed && !file_data.starts_with(&GZIP_MAGIC) {
            anyhow::bail!("Magic number mismatch for .vcf.gz file");
        }

        // 5. Header line must be present
        if compressed {
            self.validate_header(MultiGzDecoder::new(&file_data[..]))?;
        } else {
            self.validate_header(&file_data[..])?;
        }
        debug!("Header check passed");

        let hash = self.compute_sha256(file_data);
        debug!("SHA-256: {}", hash);

        Ok(ValidatedFile {
            safe_name,
            compressed,
            size,
            hash_sha256: hash,
        })
    }

    fn sanitize_filename(&self, name: &str) -> Result<String> {
        // Remove path separators, null bytes, control characters
        let safe = name
            .replace(['/', '\\', '\0'], "_")
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
            .take(255)
            .collect::<String>();

        if safe.is_empty() {
            anyhow::bail!("Invalid filename after sanitization");
        }
        if safe.starts_with('.') {
            anyhow::bail!("Filename cannot start with '.'");
        }

        Ok(safe)
    }

    fn get_extension<'a>(&self, filename: &'a str) -> Result<&'a str> {
        let lowered = filename.to_ascii_lowercase();
        if lowered.ends_with(".vcf.gz") {
            return Ok("vcf.gz");
        }
        filename
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .ok_or_else(|| anyhow::anyhow!("No file extension found"))
            .map(|ext| if ext.eq_ignore_ascii_case("vcf") { "vcf" } else { ext })
    }

    /// Everything before the column header is ignored, as the parser does
    fn validate_header<R: Read>(&self, reader: R) -> Result<()> {
        for line in BufReader::new(reader).lines() {
            if line?.starts_with(HEADER_PREFIX) {
                return Ok(());
            }
        }
        anyhow::bail!("Invalid VCF format: no {} header line found", HEADER_PREFIX)
    }

    fn compute_sha256(&self, data: &Bytes) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("{:x}", hasher.finalize())
    }
}
