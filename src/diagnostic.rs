// 🩺 Diagnostic (dry run) - what an import would do, without touching the store
//
// Same sniffing, header resolution and row decoding as the importer. Instead
// of writing, each distinct application name is checked against the store
// (when one exists) and tallied as "to create" or "existing".

use crate::config::ImportConfig;
use crate::db;
use crate::decoder::{CarryForward, Decoded, RowDecoder};
use crate::dialect::delimiter_name;
use crate::entities::name_key;
use crate::error::ImportError;
use crate::headers::HeaderMapping;
use crate::importer::{parse_input, read_input};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub delimiter: String,
    pub header_mapping: Vec<HeaderMapping>,
    pub rows_analyzed: usize,
    pub rows_skipped: usize,
    pub applications_to_create: usize,
    pub applications_to_update: usize,
    pub integrations_to_create: usize,

    /// First `max_diagnostic_warnings` warnings
    pub warnings: Vec<String>,

    /// Every warning found, including those not kept in `warnings`
    pub warnings_total: usize,
}

impl DiagnosticReport {
    fn warn(&mut self, warning: String, limit: usize) {
        self.warnings_total += 1;
        if self.warnings.len() < limit {
            self.warnings.push(warning);
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} rows ({} delimited): {} applications to create, {} to update, {} integrations, {} warnings",
            self.rows_analyzed,
            self.delimiter,
            self.applications_to_create,
            self.applications_to_update,
            self.integrations_to_create,
            self.warnings_total
        )
    }
}

/// Dry-run a file; `store` is consulted read-only when it holds the schema
pub fn diagnose_file(
    store: Option<&Connection>,
    csv_path: &Path,
    config: &ImportConfig,
) -> Result<DiagnosticReport, ImportError> {
    let bytes = read_input(csv_path)?;
    diagnose(store, &bytes, config)
}

pub fn diagnose(
    store: Option<&Connection>,
    bytes: &[u8],
    config: &ImportConfig,
) -> Result<DiagnosticReport, ImportError> {
    let parsed = parse_input(bytes, config)?;
    let limit = config.max_diagnostic_warnings;

    // A store without the schema has no applications yet
    let store = match store {
        Some(conn) if db::table_exists(conn, "applications").unwrap_or(false) => Some(conn),
        _ => None,
    };

    let mut report = DiagnosticReport {
        delimiter: delimiter_name(parsed.delimiter).to_string(),
        header_mapping: parsed.headers.describe(&parsed.columns),
        rows_analyzed: parsed.records.len(),
        ..Default::default()
    };

    let decoder = RowDecoder::new(&parsed.columns);
    let mut carry = CarryForward::default();
    let mut seen = HashSet::new();

    for (index, record) in parsed.records.iter().enumerate() {
        let line = parsed.line_of(index);
        let row = match decoder.decode(record, line, &mut carry) {
            Decoded::Row(row) => row,
            Decoded::Blank => {
                report.rows_skipped += 1;
                continue;
            }
            Decoded::Orphan { line, integration_name } => {
                report.rows_skipped += 1;
                if let Some(name) = integration_name {
                    report.warn(
                        format!("line {}: integration '{}' has no application name, row skipped", line, name),
                        limit,
                    );
                }
                continue;
            }
        };

        for warning in row.warnings {
            report.warn(warning, limit);
        }

        if row.integration.is_some() {
            report.integrations_to_create += 1;
        }

        let key = name_key(&row.application.name);
        if !seen.insert(key.clone()) {
            continue;
        }
        let exists = match store {
            Some(conn) => match db::find_application(conn, &key) {
                Ok(found) => found.is_some(),
                Err(e) => {
                    report.warn(format!("line {}: could not check '{}': {:#}", line, row.application.name, e), limit);
                    false
                }
            },
            None => false,
        };
        if exists {
            report.applications_to_update += 1;
        } else {
            report.applications_to_create += 1;
        }
    }

    log::info!("Diagnostic: {}", report.summary());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RetryPolicy;
    use crate::importer::{import_bytes, NoProgress};

    const CSV: &str = "\
Application|Vendor|Score|Criticality|Integration Name
Alpha|Acme|7|8|
|||x|Payroll Feed
Beta|Globex|high|2|
";

    #[test]
    fn test_diagnose_without_store() {
        let report = diagnose(None, CSV.as_bytes(), &ImportConfig::default()).unwrap();

        assert_eq!(report.delimiter, "pipe");
        assert_eq!(report.rows_analyzed, 3);
        assert_eq!(report.applications_to_create, 2);
        assert_eq!(report.applications_to_update, 0);
        assert_eq!(report.integrations_to_create, 1);
        assert_eq!(report.warnings_total, 2);
        assert_eq!(report.header_mapping[0].field.as_deref(), Some("division_name"));
        assert_eq!(report.header_mapping[4].field.as_deref(), Some("integration_name"));
    }

    #[test]
    fn test_diagnose_makes_no_writes() {
        let conn = Connection::open_in_memory().unwrap();

        // Store without schema: still no tables afterwards
        diagnose(Some(&conn), CSV.as_bytes(), &ImportConfig::default()).unwrap();
        assert!(!db::table_exists(&conn, "applications").unwrap());

        // Store with data: counts and events unchanged
        let config = ImportConfig::default().with_retry(RetryPolicy::immediate(1));
        import_bytes(&conn, "Name\nAlpha\n".as_bytes(), "seed.csv", &config, &mut NoProgress).unwrap();
        let before = db::get_table_counts(&conn).unwrap();
        let events_before = db::count_events(&conn, db::EventKind::ImportCompleted).unwrap();

        let report = diagnose(Some(&conn), CSV.as_bytes(), &config).unwrap();

        assert_eq!(report.applications_to_create, 1);
        assert_eq!(report.applications_to_update, 1);
        assert_eq!(db::get_table_counts(&conn).unwrap(), before);
        assert_eq!(db::count_events(&conn, db::EventKind::ImportCompleted).unwrap(), events_before);
        println!("✅ Dry run PASSED: store untouched");
    }

    #[test]
    fn test_warnings_are_bounded() {
        let mut csv = String::from("Name,Score\n");
        for i in 0..10 {
            csv.push_str(&format!("App {},bad\n", i));
        }
        let mut config = ImportConfig::default();
        config.max_diagnostic_warnings = 3;

        let report = diagnose(None, csv.as_bytes(), &config).unwrap();

        assert_eq!(report.warnings.len(), 3);
        assert_eq!(report.warnings_total, 10);
    }

    #[test]
    fn test_missing_name_column_is_structural() {
        let err = diagnose(None, b"Vendor;Score\nAcme;3\n", &ImportConfig::default()).unwrap_err();
        assert!(matches!(err, ImportError::MissingNameColumn { .. }));
    }
}
