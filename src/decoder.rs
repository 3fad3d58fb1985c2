// 🧩 Row Decoder - Turn one raw CSV row into typed application/integration input
//
// Per row, in order:
// 1. Fully blank rows are skipped
// 2. Application name, carried forward from the last named row when empty
// 3. Vendor / notes as trimmed text ("none" means empty)
// 4. Nine rating factors with lenient numeric coercion
// 5. Business units, falling back to the last list seen for the application
// 6. Categories, two-level split over the category and category-type columns
// 7. Integration fields, only materialized when the integration has a name

use crate::entities::{
    clean_name, is_none_token, name_key, ApplicationInput, IntegrationInput, PartialRatings,
    RATING_NAMES,
};
use crate::headers::{ColumnMap, Field, APPLICATION_RATINGS, INTEGRATION_RATINGS};
use csv::StringRecord;
use std::collections::{HashMap, HashSet};

// ============================================================================
// DECODED OUTPUT
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct DecodedRow {
    /// 1-based line in the source file
    pub line: usize,
    pub application: ApplicationInput,
    pub business_units: Vec<String>,
    pub categories: Vec<String>,
    pub integration: Option<IntegrationInput>,

    /// Non-fatal problems found while decoding (bad numbers)
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    Row(DecodedRow),

    /// Every cell empty
    Blank,

    /// No application name on this row and none seen before it
    Orphan {
        line: usize,
        integration_name: Option<String>,
    },
}

// ============================================================================
// CARRY-FORWARD STATE
// ============================================================================

/// Implicit state that flows from one row to the next
#[derive(Debug, Clone, Default)]
pub struct CarryForward {
    /// Most recent non-empty application name
    pub last_application: Option<String>,

    /// Last non-empty business unit list per application key
    pub business_units: HashMap<String, Vec<String>>,
}

// ============================================================================
// ROW DECODER
// ============================================================================

pub struct RowDecoder<'a> {
    columns: &'a ColumnMap,
}

impl<'a> RowDecoder<'a> {
    pub fn new(columns: &'a ColumnMap) -> Self {
        RowDecoder { columns }
    }

    pub fn decode(&self, record: &StringRecord, line: usize, carry: &mut CarryForward) -> Decoded {
        if record.iter().all(|cell| cell.trim().is_empty()) {
            return Decoded::Blank;
        }

        let mut warnings = Vec::new();

        let explicit_name = clean_name(self.cell(record, Field::ApplicationName));
        let carried_forward = explicit_name.is_empty();
        let name = if carried_forward {
            match &carry.last_application {
                Some(previous) => previous.clone(),
                None => {
                    let integration_name = clean_name(self.cell(record, Field::IntegrationName));
                    return Decoded::Orphan {
                        line,
                        integration_name: (!integration_name.is_empty()
                            && !is_none_token(&integration_name))
                        .then_some(integration_name),
                    };
                }
            }
        } else {
            carry.last_application = Some(explicit_name.clone());
            explicit_name
        };

        let application = ApplicationInput {
            vendor: self.text(record, Field::Vendor),
            notes: self.text(record, Field::Notes),
            ratings: self.ratings(record, &APPLICATION_RATINGS, line, "", &mut warnings),
            carried_forward,
            name,
        };

        let key = name_key(&application.name);
        let mut business_units = split_business_units(self.cell(record, Field::BusinessUnits));
        if business_units.is_empty() {
            business_units = carry.business_units.get(&key).cloned().unwrap_or_default();
        } else {
            carry.business_units.insert(key, business_units.clone());
        }

        let categories = split_categories(&[
            self.cell(record, Field::Category),
            self.cell(record, Field::CategoryType),
        ]);

        let integration = self.integration(record, line, &mut warnings);

        Decoded::Row(DecodedRow {
            line,
            application,
            business_units,
            categories,
            integration,
            warnings,
        })
    }

    fn cell<'r>(&self, record: &'r StringRecord, field: Field) -> &'r str {
        self.columns.get(record, field)
    }

    fn text(&self, record: &StringRecord, field: Field) -> String {
        let value = self.cell(record, field).trim();
        if is_none_token(value) {
            String::new()
        } else {
            value.to_string()
        }
    }

    fn ratings(
        &self,
        record: &StringRecord,
        fields: &[Field; 9],
        line: usize,
        prefix: &str,
        warnings: &mut Vec<String>,
    ) -> PartialRatings {
        let mut ratings = PartialRatings::default();
        for (i, field) in fields.iter().enumerate() {
            let raw = self.cell(record, *field);
            ratings.values[i] = match parse_lenient_int(raw) {
                NumericCell::Absent => None,
                NumericCell::Value(n) => Some(n),
                NumericCell::Invalid => {
                    warnings.push(format!(
                        "line {}: could not parse {}{} value '{}', using 0",
                        line,
                        prefix,
                        RATING_NAMES[i],
                        raw.trim()
                    ));
                    Some(0)
                }
            };
        }
        ratings
    }

    fn integration(
        &self,
        record: &StringRecord,
        line: usize,
        warnings: &mut Vec<String>,
    ) -> Option<IntegrationInput> {
        let name = clean_name(self.cell(record, Field::IntegrationName));
        if name.is_empty() || is_none_token(&name) {
            return None;
        }

        let raw_risk = self.cell(record, Field::IntegrationRisk);
        let risk = match parse_lenient_int(raw_risk) {
            NumericCell::Absent => None,
            NumericCell::Value(n) => Some(n),
            NumericCell::Invalid => {
                warnings.push(format!(
                    "line {}: could not parse integration risk '{}', computing it instead",
                    line,
                    raw_risk.trim()
                ));
                None
            }
        };

        let last_modified = self.text(record, Field::IntegrationLastModified);

        Some(IntegrationInput {
            name,
            vendor: self.text(record, Field::IntegrationVendor),
            notes: self.text(record, Field::IntegrationNotes),
            ratings: self.ratings(record, &INTEGRATION_RATINGS, line, "integration_", warnings),
            risk,
            last_modified: (!last_modified.is_empty()).then_some(last_modified),
        })
    }
}

// ============================================================================
// CELL PARSING HELPERS
// ============================================================================

/// A numeric cell after lenient parsing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericCell {
    /// Empty or "none"
    Absent,

    /// Integer, or a float truncated toward zero
    Value(i64),

    /// Non-empty text that is not a number
    Invalid,
}

pub fn parse_lenient_int(raw: &str) -> NumericCell {
    let value = raw.trim();
    if value.is_empty() || is_none_token(value) {
        return NumericCell::Absent;
    }
    if let Ok(n) = value.parse::<i64>() {
        return NumericCell::Value(n);
    }
    match value.parse::<f64>() {
        Ok(f) if f.is_finite() => NumericCell::Value(f.trunc() as i64),
        _ => NumericCell::Invalid,
    }
}

/// Split a business unit cell on any of `; , / |`
pub fn split_business_units(raw: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.split(|c: char| matches!(c, ';' | ',' | '/' | '|'))
        .filter_map(clean_token)
        .filter(|token| seen.insert(name_key(token)))
        .collect()
}

/// Two-level category split: `; ,` for top-level entries, then `/ |` inside each
pub fn split_categories(cells: &[&str]) -> Vec<String> {
    let mut seen = HashSet::new();
    cells
        .iter()
        .flat_map(|cell| cell.split(|c: char| matches!(c, ';' | ',')))
        .flat_map(|top| top.split(|c: char| matches!(c, '/' | '|')))
        .filter_map(clean_token)
        .filter(|token| seen.insert(name_key(token)))
        .collect()
}

fn clean_token(raw: &str) -> Option<String> {
    let token = clean_name(raw);
    if token.is_empty() || is_none_token(&token) {
        None
    } else {
        Some(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headers::HeaderMap;

    fn columns(headers: &[&str]) -> ColumnMap {
        HeaderMap::new(headers.iter().copied()).resolve().unwrap()
    }

    fn row(decoded: Decoded) -> DecodedRow {
        match decoded {
            Decoded::Row(row) => row,
            other => panic!("expected a decoded row, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_lenient_int() {
        assert_eq!(parse_lenient_int(" 7 "), NumericCell::Value(7));
        assert_eq!(parse_lenient_int("7.9"), NumericCell::Value(7));
        assert_eq!(parse_lenient_int("-2.5"), NumericCell::Value(-2));
        assert_eq!(parse_lenient_int(""), NumericCell::Absent);
        assert_eq!(parse_lenient_int("None"), NumericCell::Absent);
        assert_eq!(parse_lenient_int("high"), NumericCell::Invalid);
        assert_eq!(parse_lenient_int("NaN"), NumericCell::Invalid);
    }

    #[test]
    fn test_split_business_units() {
        assert_eq!(
            split_business_units(" IT ; Finance/HR |  Customer   Care ,, none"),
            vec!["IT", "Finance", "HR", "Customer Care"]
        );
        assert!(split_business_units("  ").is_empty());
    }

    #[test]
    fn test_split_categories_two_level_and_deduped() {
        let categories = split_categories(&["Finance,,Ops", "ops/Reporting|None"]);
        assert_eq!(categories, vec!["Finance", "Ops", "Reporting"]);
    }

    #[test]
    fn test_blank_row_skipped() {
        let cols = columns(&["Name", "Vendor"]);
        let decoder = RowDecoder::new(&cols);
        let mut carry = CarryForward::default();

        let decoded = decoder.decode(&StringRecord::from(vec![" ", ""]), 2, &mut carry);
        assert_eq!(decoded, Decoded::Blank);
    }

    #[test]
    fn test_carry_forward_name_and_business_units() {
        let cols = columns(&["Name", "Business Unit", "Category"]);
        let decoder = RowDecoder::new(&cols);
        let mut carry = CarryForward::default();

        let first = row(decoder.decode(&StringRecord::from(vec!["Alpha", "IT", "Finance"]), 2, &mut carry));
        let second = row(decoder.decode(&StringRecord::from(vec!["", "", "Security"]), 3, &mut carry));

        assert!(!first.application.carried_forward);
        assert_eq!(second.application.name, "Alpha");
        assert!(second.application.carried_forward);
        assert_eq!(second.business_units, vec!["IT"]);
        assert_eq!(second.categories, vec!["Security"]);
    }

    #[test]
    fn test_leading_row_without_name_is_orphan() {
        let cols = columns(&["Name", "Integration Name"]);
        let decoder = RowDecoder::new(&cols);
        let mut carry = CarryForward::default();

        let decoded = decoder.decode(&StringRecord::from(vec!["", "Payroll Feed"]), 2, &mut carry);
        assert_eq!(
            decoded,
            Decoded::Orphan {
                line: 2,
                integration_name: Some("Payroll Feed".to_string())
            }
        );
        assert!(carry.last_application.is_none());
    }

    #[test]
    fn test_malformed_number_warns_once_and_defaults_to_zero() {
        let cols = columns(&["Name", "Score", "Criticality"]);
        let decoder = RowDecoder::new(&cols);
        let mut carry = CarryForward::default();

        let decoded = row(decoder.decode(&StringRecord::from(vec!["Alpha", "abc", "5"]), 2, &mut carry));

        assert_eq!(decoded.warnings.len(), 1);
        assert!(decoded.warnings[0].contains("line 2"));
        assert!(decoded.warnings[0].contains("score"));
        assert_eq!(decoded.application.ratings.values[0], Some(0));
        assert_eq!(decoded.application.ratings.values[2], Some(5));
    }

    #[test]
    fn test_vendor_none_token_and_short_rows() {
        let cols = columns(&["Name", "Vendor", "Notes"]);
        let decoder = RowDecoder::new(&cols);
        let mut carry = CarryForward::default();

        // Short row: notes column missing entirely
        let decoded = row(decoder.decode(&StringRecord::from(vec!["Alpha", "NONE"]), 2, &mut carry));

        assert_eq!(decoded.application.vendor, "");
        assert_eq!(decoded.application.notes, "");
    }

    #[test]
    fn test_integration_fields() {
        let cols = columns(&[
            "Name",
            "Integration Name",
            "Integration Vendor",
            "Integration Score",
            "Integration Criticality",
            "Integration Risk",
            "Integration Last Modified",
        ]);
        let decoder = RowDecoder::new(&cols);
        let mut carry = CarryForward::default();

        let decoded = row(decoder.decode(
            &StringRecord::from(vec!["Alpha", "Payroll Feed", "Acme", "6", "2.7", "", "2024-05-01"]),
            2,
            &mut carry,
        ));
        let integration = decoded.integration.unwrap();

        assert_eq!(integration.name, "Payroll Feed");
        assert_eq!(integration.vendor, "Acme");
        assert_eq!(integration.ratings.values[0], Some(6));
        assert_eq!(integration.ratings.values[2], Some(2));
        assert_eq!(integration.risk, None);
        assert_eq!(integration.last_modified.as_deref(), Some("2024-05-01"));
    }

    #[test]
    fn test_empty_integration_name_not_materialized() {
        let cols = columns(&["Name", "Integration Name", "Integration Score"]);
        let decoder = RowDecoder::new(&cols);
        let mut carry = CarryForward::default();

        let decoded = row(decoder.decode(&StringRecord::from(vec!["Alpha", "none", "4"]), 2, &mut carry));
        assert!(decoded.integration.is_none());
    }
}
