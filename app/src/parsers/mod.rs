// ==============================================================================
// parsers/mod.rs - File parser modules
// ==============================================================================
// Description: VCF table parsing and INFO / FORMAT field decomposition
// Author: Matt Barham
// Created: 2026-10-02
// Modified: 2026-10-09
// Version: 2.0.0
// ==============================================================================

pub mod vcf;
pub mod fields;

pub use vcf::{VCFParseError, VCFParser, VCFRow, VCFTable, HEADER_PREFIX};
pub use fields::{decompose_format, decompose_info, FieldDecomposer, FLAG_KEY};
