// ==============================================================================
// parsers/vcf.rs - VCF table parser
// ==============================================================================
// Description: Reads VCF text into a column-named table, skipping the
//              metadata preamble up to the #CHROM header line
// Author: Matt Barham
// Created: 2026-10-02
// Modified: 2026-10-18
// Version: 2.0.1
// ==============================================================================
// References:
// - VCF 4.2 Spec: https://samtools.github.io/hts-specs/VCFv4.2.pdf
// ==============================================================================

use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// Literal prefix of the VCF column header line
pub const HEADER_PREFIX: &str = "#CHROM";

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// VCF parsing errors
#[derive(Error, Debug)]
pub enum VCFParseError {
    #[error("No header line starting with #CHROM was found")]
    MissingHeader,

    #[error("Line {line}: expected {expected} columns, found {found}")]
    ColumnCount {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Line {line}: invalid position '{value}'")]
    InvalidPosition { line: u64, value: String },

    #[error("Failed to read VCF table: {0}")]
    TableError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

/// One retained data line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VCFRow {
    /// 1-based line number in the original input
    pub line: u64,
    pub fields: Vec<String>,
}

impl VCFRow {
    pub fn get(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }
}

/// Tabular view of a VCF body: header tokens as columns, one row per data line
#[derive(Debug, Clone, Default)]
pub struct VCFTable {
    columns: Vec<String>,
    rows: Vec<VCFRow>,
}

impl VCFTable {
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[VCFRow] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|column| column == name)
    }

    pub fn require_column(&self, name: &str) -> Result<usize, VCFParseError> {
        self.column_index(name)
            .ok_or_else(|| VCFParseError::MissingColumn(name.to_string()))
    }

    /// Name of the last header column (the per-sample value column)
    pub fn sample_name(&self) -> Option<&str> {
        self.columns.last().map(String::as_str)
    }
}

/// VCF parser
///
/// Everything before the `#CHROM` line is discarded. Gzip (and BGZF) input is
/// detected by its magic bytes.
#[derive(Debug, Default)]
pub struct VCFParser {
    /// Count of lines skipped before the header (for reporting)
    pub skipped_count: usize,
}

impl VCFParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a VCF file (.vcf or .vcf.gz)
    ///
    /// # Example
    /// ```no_run
    /// use variant_ingest::parsers::VCFParser;
    ///
    /// let mut parser = VCFParser::new();
    /// let table = parser.parse("patient.vcf")?;
    /// println!("Parsed {} rows", table.len());
    /// # Ok::<(), variant_ingest::parsers::VCFParseError>(())
    /// ```
    pub fn parse(&mut self, path: impl AsRef<Path>) -> Result<VCFTable, VCFParseError> {
        let path = path.as_ref();
        debug!("Opening VCF file: {:?}", path);
        let file = File::open(path)?;
        self.parse_reader(file)
    }

    pub fn parse_str(&mut self, text: &str) -> Result<VCFTable, VCFParseError> {
        self.parse_reader(text.as_bytes())
    }

    pub fn parse_reader<R: Read>(&mut self, input: R) -> Result<VCFTable, VCFParseError> {
        let mut buffered = BufReader::new(input);
        let is_gzip = buffered.fill_buf()?.starts_with(&GZIP_MAGIC);

        if is_gzip {
            debug!("Detected gzip-compressed VCF input");
            self.parse_plain(BufReader::new(MultiGzDecoder::new(buffered)))
        } else {
            self.parse_plain(buffered)
        }
    }

    fn parse_plain<R: BufRead>(&mut self, mut reader: R) -> Result<VCFTable, VCFParseError> {
        self.skipped_count = 0;

        // Scan for the header line
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                return Err(VCFParseError::MissingHeader);
            }
            if line.starts_with(HEADER_PREFIX) {
                break;
            }
            self.skipped_count += 1;
        }

        let preamble = self.skipped_count as u64;
        let body = Cursor::new(line.into_bytes()).chain(reader);

        let mut table_reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .quoting(false)
            .has_headers(true)
            .flexible(true)
            .from_reader(body);

        let columns = strip_line(table_reader.headers().map_err(|e| table_error(e, preamble))?);

        let mut rows = Vec::new();
        for result in table_reader.records() {
            let record = result.map_err(|e| table_error(e, preamble))?;
            let line = preamble + record.position().map(|p| p.line()).unwrap_or(0);
            let fields = strip_line(&record);
            if fields.is_empty() {
                continue;
            }
            if fields.len() != columns.len() {
                return Err(VCFParseError::ColumnCount {
                    line,
                    expected: columns.len(),
                    found: fields.len(),
                });
            }
            rows.push(VCFRow { line, fields });
        }

        debug!(
            "Parsed VCF table: {} columns, {} rows ({} preamble lines skipped)",
            columns.len(),
            rows.len(),
            self.skipped_count
        );

        Ok(VCFTable { columns, rows })
    }
}

/// Split fields of a line with its surrounding whitespace removed: blank
/// outer fields are dropped and the remaining ends trimmed
fn strip_line(record: &csv::StringRecord) -> Vec<String> {
    let mut fields: Vec<&str> = record.iter().collect();
    while fields.last().is_some_and(|field| field.trim().is_empty()) {
        fields.pop();
    }
    let start = fields
        .iter()
        .position(|field| !field.trim().is_empty())
        .unwrap_or(fields.len());

    let mut fields: Vec<String> = fields[start..].iter().map(|field| field.to_string()).collect();
    if let Some(first) = fields.first_mut() {
        *first = first.trim_start().to_string();
    }
    if let Some(last) = fields.last_mut() {
        *last = last.trim_end().to_string();
    }
    fields
}

fn table_error(error: csv::Error, preamble: u64) -> VCFParseError {
    if let csv::ErrorKind::UnequalLengths {
        pos,
        expected_len,
        len,
    } = error.kind()
    {
        return VCFParseError::ColumnCount {
            line: preamble + pos.as_ref().map(|p| p.line()).unwrap_or(0),
            expected: *expected_len as usize,
            found: *len as usize,
        };
    }
    VCFParseError::TableError(error.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    const SAMPLE: &str = "##fileformat=VCFv4.2\n\
##source=test\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tSAMPLE1\n\
1\t100\t.\tA\tT\t30\tPASS\tDP=10;AF=0.5\tGT:DP\t0/1:10\n\
2\t200\trs7\tG\tC\t.\tq10\tDP=3\tGT:DP\t1/1:3\n";

    #[test]
    fn test_columns_and_rows() {
        let mut parser = VCFParser::new();
        let table = parser.parse_str(SAMPLE).unwrap();

        assert_eq!(table.columns()[0], "#CHROM");
        assert_eq!(table.columns().len(), 10);
        assert_eq!(table.len(), 2);
        assert_eq!(table.sample_name(), Some("SAMPLE1"));
        assert_eq!(parser.skipped_count, 2);

        let first = &table.rows()[0];
        assert_eq!(first.line, 4);
        assert_eq!(first.get(7), Some("DP=10;AF=0.5"));
        assert_eq!(table.rows()[1].get(2), Some("rs7"));
    }

    #[test]
    fn test_missing_header() {
        let mut parser = VCFParser::new();
        let err = parser.parse_str("##fileformat=VCFv4.2\n1\t100\n").unwrap_err();
        assert!(matches!(err, VCFParseError::MissingHeader));
    }

    #[test]
    fn test_header_without_rows() {
        let mut parser = VCFParser::new();
        let table = parser
            .parse_str("#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS\n")
            .unwrap();
        assert!(table.is_empty());
        assert_eq!(table.require_column("INFO").unwrap(), 7);
        assert!(table.require_column("BOGUS").is_err());
    }

    #[test]
    fn test_column_count_mismatch_reports_line() {
        let text = "##meta\n#CHROM\tPOS\tREF\n1\t100\tA\n1\t101\n";
        let mut parser = VCFParser::new();
        match parser.parse_str(text).unwrap_err() {
            VCFParseError::ColumnCount { line, expected, found } => {
                assert_eq!(line, 4);
                assert_eq!(expected, 3);
                assert_eq!(found, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_trailing_whitespace_is_stripped() {
        let text = "#CHROM\tPOS\tREF \n1\t100\tA\t\n2\t200\tG  \r\n\n";
        let mut parser = VCFParser::new();
        let table = parser.parse_str(text).unwrap();

        assert_eq!(table.columns(), ["#CHROM", "POS", "REF"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows()[0].fields, ["1", "100", "A"]);
        assert_eq!(table.rows()[1].get(2), Some("G"));
    }

    #[test]
    fn test_gzip_input() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(SAMPLE.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let mut parser = VCFParser::new();
        let table = parser.parse_reader(&compressed[..]).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.sample_name(), Some("SAMPLE1"));
    }

    #[test]
    fn test_parse_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let mut parser = VCFParser::new();
        let table = parser.parse(file.path()).unwrap();
        assert_eq!(table.len(), 2);
    }
}
