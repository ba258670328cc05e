// ==============================================================================
// manifest.rs - Batch VCF discovery
// ==============================================================================
// Description: Lists the VCF files of a directory for batch ingestion
// Author: Matt Barham
// Created: 2026-10-10
// Modified: 2026-10-10
// Version: 1.0.0
// ==============================================================================

use std::io;
use std::path::{Path, PathBuf};
use tracing::info;
use walkdir::WalkDir;

/// Whether the file name ends in `.vcf` or `.vcf.gz`
pub fn is_vcf_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(|name| {
            let name = name.to_ascii_lowercase();
            name.ends_with(".vcf") || name.ends_with(".vcf.gz")
        })
        .unwrap_or(false)
}

/// Name without the `.vcf` / `.vcf.gz` suffix
pub fn file_stem(path: &Path) -> Option<String> {
    let name = path.file_name()?.to_str()?;
    let lowered = name.to_ascii_lowercase();
    let cut = if lowered.ends_with(".vcf.gz") {
        name.len() - ".vcf.gz".len()
    } else if lowered.ends_with(".vcf") {
        name.len() - ".vcf".len()
    } else {
        name.len()
    };
    Some(name[..cut].to_string())
}

/// VCF files directly inside `dir`, sorted by path
pub fn list_vcf_files(dir: impl AsRef<Path>) -> io::Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    let mut files = Vec::new();

    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file() && is_vcf_file(entry.path()) {
            files.push(entry.path().canonicalize()?);
        }
    }

    files.sort();
    info!("Manifest for {:?}: {} VCF files", dir, files.len());
    Ok(files)
}
