// ==============================================================================
// batch.rs - Variant normalization and chunking
// ==============================================================================
// Description: Builds per-row composite records and partitions them into
//              ordered, size-bounded chunks
// Author: Matt Barham
// Created: 2026-10-03
// Modified: 2026-10-12
// Version: 1.0.0
// ==============================================================================

use std::num::NonZeroUsize;
use std::path::Path;
use tracing::debug;

use crate::models::{Chunk, CompositeRecord, FieldValue, PatientId, QualityFields, VariantKey};
use crate::parsers::{FieldDecomposer, VCFParseError, VCFParser, VCFTable};

/// Parsed and normalized contents of one VCF file
#[derive(Debug, Clone)]
pub struct PreparedFile {
    /// Last header column (sample name)
    pub sample_name: Option<String>,
    pub records: Vec<CompositeRecord>,
}

/// Column positions of the fixed leading VCF fields
struct FixedColumns {
    chrom: usize,
    pos: usize,
    reference: usize,
    alt: usize,
    qual: usize,
    filter: usize,
}

impl FixedColumns {
    fn locate(table: &VCFTable) -> Result<Self, VCFParseError> {
        Ok(Self {
            chrom: table.require_column("#CHROM")?,
            pos: table.require_column("POS")?,
            reference: table.require_column("REF")?,
            alt: table.require_column("ALT")?,
            qual: table.require_column("QUAL")?,
            filter: table.require_column("FILTER")?,
        })
    }
}

/// Assemble `{variant, qual, info, format}` for every row, in row order.
pub fn normalize(table: &VCFTable) -> Result<Vec<CompositeRecord>, VCFParseError> {
    let columns = FixedColumns::locate(table)?;
    let decomposer = FieldDecomposer::new(table)?;

    let mut records = Vec::with_capacity(table.len());
    for row in table.rows() {
        // Column count is uniform (enforced by the parser)
        let cell = |index: usize| row.get(index).unwrap_or_default();

        let raw_pos = cell(columns.pos);
        let pos = raw_pos
            .parse::<u64>()
            .map_err(|_| VCFParseError::InvalidPosition {
                line: row.line,
                value: raw_pos.to_string(),
            })?;

        records.push(CompositeRecord {
            variant: VariantKey {
                chrom: cell(columns.chrom).to_string(),
                pos,
                reference: cell(columns.reference).to_string(),
                alt: cell(columns.alt).to_string(),
            },
            qual: QualityFields {
                qual: FieldValue::coerce(cell(columns.qual)),
                filter: cell(columns.filter).to_string(),
            },
            info: decomposer.info(row),
            format: decomposer.format(row),
        });
    }

    debug!("Normalized {} composite records", records.len());
    Ok(records)
}

/// Parse and normalize a VCF file in one step.
pub fn prepare_file(path: impl AsRef<Path>) -> Result<PreparedFile, VCFParseError> {
    let table = VCFParser::new().parse(path)?;
    let records = normalize(&table)?;
    Ok(PreparedFile {
        sample_name: table.sample_name().map(str::to_string),
        records,
    })
}

/// Split items into contiguous groups of `size` (the last may be shorter).
pub fn partition<T>(items: Vec<T>, size: NonZeroUsize) -> Vec<Vec<T>> {
    let size = size.get();
    let mut groups = Vec::with_capacity(items.len().div_ceil(size));
    let mut remaining = items.into_iter().peekable();
    while remaining.peek().is_some() {
        groups.push(remaining.by_ref().take(size).collect());
    }
    groups
}

/// Partition a patient's records into indexed transport chunks.
pub fn into_chunks(
    patient_id: PatientId,
    records: Vec<CompositeRecord>,
    chunk_size: NonZeroUsize,
) -> Vec<Chunk> {
    partition(records, chunk_size)
        .into_iter()
        .enumerate()
        .map(|(index, records)| Chunk {
            index,
            patient_id,
            records,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    const HEADER: &str = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tSAMPLE1\n";

    fn size(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn test_worked_example() {
        let vcf = format!("{HEADER}1\t100\t.\tA\tT\t30\tPASS\tDP=10;AF=0.5\tGT:DP\t0/1:10\n");
        let table = VCFParser::new().parse_str(&vcf).unwrap();
        let records = normalize(&table).unwrap();

        let json = serde_json::to_value(&records[0]).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "variant": {"chrom": "1", "pos": 100, "ref": "A", "alt": "T"},
                "qual": {"QUAL": 30.0, "FILTER": "PASS"},
                "info": {"DP": 10.0, "AF": 0.5},
                "format": {"GT": "0/1", "DP": 10.0}
            })
        );
    }

    #[test]
    fn test_row_count_preserved() {
        let mut vcf = format!("##fileformat=VCFv4.2\n{HEADER}");
        for pos in 1..=25 {
            vcf.push_str(&format!("2\t{pos}\t.\tG\tC\t.\tPASS\tDP={pos}\tGT\t0/1\n"));
        }
        let table = VCFParser::new().parse_str(&vcf).unwrap();
        let records = normalize(&table).unwrap();

        assert_eq!(records.len(), 25);
        assert_eq!(records[24].variant.pos, 25);
        assert_eq!(records[0].qual.qual, FieldValue::Text(".".to_string()));
    }

    #[test]
    fn test_invalid_position() {
        let vcf = format!("{HEADER}1\tabc\t.\tA\tT\t30\tPASS\tDP=1\tGT\t0/1\n");
        let table = VCFParser::new().parse_str(&vcf).unwrap();
        let err = normalize(&table).unwrap_err();
        assert!(matches!(err, VCFParseError::InvalidPosition { line: 2, .. }));
    }

    #[test]
    fn test_partition_law() {
        let items: Vec<u32> = (0..23).collect();
        for chunk_size in [1, 2, 5, 7, 23, 50] {
            let groups = partition(items.clone(), size(chunk_size));
            let sizes: Vec<usize> = groups.iter().map(Vec::len).collect();

            // All but the last are full
            if let Some((last, full)) = sizes.split_last() {
                assert!(full.iter().all(|&s| s == chunk_size));
                assert!(*last >= 1 && *last <= chunk_size);
            }

            let rejoined: Vec<u32> = groups.into_iter().flatten().collect();
            assert_eq!(rejoined, items);
        }
    }

    #[test]
    fn test_partition_empty() {
        let groups = partition(Vec::<u8>::new(), size(10));
        assert!(groups.is_empty());
    }

    #[test]
    fn test_into_chunks_indexes_in_order() {
        let vcf = format!(
            "{HEADER}1\t1\t.\tA\tT\t1\tPASS\tDP=1\tGT\t0/1\n\
             1\t2\t.\tA\tT\t1\tPASS\tDP=1\tGT\t0/1\n\
             1\t3\t.\tA\tT\t1\tPASS\tDP=1\tGT\t0/1\n"
        );
        let table = VCFParser::new().parse_str(&vcf).unwrap();
        let records = normalize(&table).unwrap();
        let patient = Uuid::new_v4();

        let chunks = into_chunks(patient, records, size(2));
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].index, 0);
        assert_eq!(chunks[1].index, 1);
        assert_eq!(chunks[1].len(), 1);
        assert_eq!(chunks[1].records[0].variant.pos, 3);
        assert!(chunks.iter().all(|c| c.patient_id == patient));
    }
}
