// ==============================================================================
// parsers/fields.rs - INFO / FORMAT field decomposition
// ==============================================================================
// Description: Expands semicolon / colon delimited annotation columns into
//              typed key -> value maps
// Author: Matt Barham
// Created: 2026-10-03
// Modified: 2026-10-11
// Version: 1.0.0
// ==============================================================================

use crate::models::{FieldMap, FieldValue};
use crate::parsers::vcf::{VCFParseError, VCFRow, VCFTable};

/// Key under which equals-free INFO tokens (flags) are stored
pub const FLAG_KEY: &str = "Exon";

/// Split an INFO value on `;` and each token on its first `=`.
///
/// Tokens without `=` are flags and land under [`FLAG_KEY`]; when a row has
/// several flags only the last one is kept.
pub fn decompose_info(raw: &str) -> FieldMap {
    let mut fields = FieldMap::new();
    for token in raw.split(';') {
        match token.split_once('=') {
            Some((key, value)) => {
                fields.insert(key.to_string(), FieldValue::coerce(value));
            }
            None => {
                fields.insert(FLAG_KEY.to_string(), FieldValue::coerce(token));
            }
        }
    }
    fields
}

/// Zip colon-separated FORMAT labels with one sample's colon-separated values.
///
/// Values containing `,` become numeric sequences (or stay strings if any
/// component is not numeric). Surplus labels or values are dropped.
pub fn decompose_format<'a, L>(labels: L, values: &str) -> FieldMap
where
    L: IntoIterator<Item = &'a str>,
{
    labels
        .into_iter()
        .zip(values.split(':'))
        .map(|(label, value)| {
            let value = if value.contains(',') {
                FieldValue::coerce_list(value)
            } else {
                FieldValue::coerce(value)
            };
            (label.to_string(), value)
        })
        .collect()
}

/// Row-wise decomposer bound to a parsed table
///
/// FORMAT labels come from the first data row and are shared by all rows.
#[derive(Debug)]
pub struct FieldDecomposer {
    info_index: usize,
    value_index: usize,
    labels: Vec<String>,
}

impl FieldDecomposer {
    pub fn new(table: &VCFTable) -> Result<Self, VCFParseError> {
        let info_index = table.require_column("INFO")?;

        let column_count = table.columns().len();
        if column_count < 2 {
            return Err(VCFParseError::MissingColumn("FORMAT".to_string()));
        }
        let label_index = column_count - 2;
        let value_index = column_count - 1;

        let labels = table
            .rows()
            .first()
            .and_then(|row| row.get(label_index))
            .map(|raw| raw.split(':').map(str::to_string).collect())
            .unwrap_or_default();

        Ok(Self {
            info_index,
            value_index,
            labels,
        })
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn info(&self, row: &VCFRow) -> FieldMap {
        row.get(self.info_index).map(decompose_info).unwrap_or_default()
    }

    pub fn format(&self, row: &VCFRow) -> FieldMap {
        row.get(self.value_index)
            .map(|values| decompose_format(self.labels.iter().map(String::as_str), values))
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parsers::VCFParser;

    fn text(value: &str) -> FieldValue {
        FieldValue::Text(value.to_string())
    }

    #[test]
    fn test_info_pairs_are_coerced() {
        let info = decompose_info("DP=10;AF=0.5;FC=missense");
        assert_eq!(info["DP"], FieldValue::Number(10.0));
        assert_eq!(info["AF"], FieldValue::Number(0.5));
        assert_eq!(info["FC"], text("missense"));
    }

    #[test]
    fn test_info_splits_on_first_equals() {
        let info = decompose_info("ANN=a=b");
        assert_eq!(info["ANN"], text("a=b"));
    }

    #[test]
    fn test_info_comma_value_stays_text() {
        let info = decompose_info("AF=0.1,0.2");
        assert_eq!(info["AF"], text("0.1,0.2"));
    }

    #[test]
    fn test_info_flag_goes_under_sentinel() {
        let info = decompose_info("DP=4;exonic");
        assert_eq!(info[FLAG_KEY], text("exonic"));
        assert_eq!(info.len(), 2);
    }

    #[test]
    fn test_info_multiple_flags_keep_only_last() {
        // Known information loss: earlier flags are overwritten
        let info = decompose_info("DB;exonic;SOMATIC;DP=2");
        assert_eq!(info[FLAG_KEY], text("SOMATIC"));
        assert_eq!(info.len(), 2);
    }

    #[test]
    fn test_info_missing_value_marker() {
        let info = decompose_info(".");
        assert_eq!(info[FLAG_KEY], text("."));
    }

    #[test]
    fn test_format_zip_and_multi_values() {
        let format = decompose_format(["GT", "AD", "DP", "PL"], "0/1:3,7:10:0,.,5");
        assert_eq!(format["GT"], text("0/1"));
        assert_eq!(format["AD"], FieldValue::Numbers(vec![3.0, 7.0]));
        assert_eq!(format["DP"], FieldValue::Number(10.0));
        // Non-numeric component keeps the raw string
        assert_eq!(format["PL"], text("0,.,5"));
    }

    #[test]
    fn test_format_truncates_to_shorter_side() {
        let format = decompose_format(["GT", "DP", "GQ"], "0/1:12");
        assert_eq!(format.len(), 2);
        assert!(!format.contains_key("GQ"));
    }

    #[test]
    fn test_decomposer_uses_first_row_labels() {
        let vcf = "#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\tFORMAT\tS1\n\
1\t100\t.\tA\tT\t30\tPASS\tDP=10\tGT:DP\t0/1:10\n\
1\t200\t.\tC\tG\t20\tPASS\tDP=5\tGT\t1/1:5\n";
        let table = VCFParser::new().parse_str(vcf).unwrap();
        let decomposer = FieldDecomposer::new(&table).unwrap();

        assert_eq!(decomposer.labels(), ["GT", "DP"]);

        let second = decomposer.format(&table.rows()[1]);
        assert_eq!(second["GT"], text("1/1"));
        assert_eq!(second["DP"], FieldValue::Number(5.0));
        assert_eq!(decomposer.info(&table.rows()[1])["DP"], FieldValue::Number(5.0));
    }

    #[test]
    fn test_decomposer_requires_info() {
        let table = VCFParser::new().parse_str("#CHROM\tPOS\n1\t2\n").unwrap();
        assert!(matches!(
            FieldDecomposer::new(&table),
            Err(VCFParseError::MissingColumn(_))
        ));
    }
}
