// 📥 CSV Importer - single pass from raw bytes to reconciled store
//
// Pipeline:
//   sniff delimiter → normalize headers → (per row) decode → resolve + write
//   → reconciliation pass → summary
//
// Structural problems (unreadable file, no header, no name column) abort
// before the first write. Everything after that is row-scoped: a failing row
// becomes a warning and the run continues with the next one.

use crate::config::ImportConfig;
use crate::db::{self, AuditEvent, EventKind};
use crate::decoder::{Decoded, DecodedRow, RowDecoder};
use crate::dialect::{delimiter_name, sniff_delimiter_with, strip_bom};
use crate::entities::{name_key, ReferenceKind};
use crate::error::ImportError;
use crate::headers::{ColumnMap, HeaderMap};
use crate::reconciliation::{reconcile_categories, ReconciliationReport};
use crate::resolver::{resolve_application, resolve_reference, GroupCache, ImportContext, NameCache, Resolution};
use crate::retry;
use anyhow::Result;
use chrono::Utc;
use csv::{ReaderBuilder, StringRecord};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

const ACTOR: &str = "csv_importer";

// ============================================================================
// PROGRESS REPORTING
// ============================================================================

/// Receives (rows processed, total rows); purely advisory
pub trait ProgressReporter {
    fn report(&mut self, processed: usize, total: usize);
}

impl<F> ProgressReporter for F
where
    F: FnMut(usize, usize),
{
    fn report(&mut self, processed: usize, total: usize) {
        self(processed, total)
    }
}

/// Reporter that ignores progress
pub struct NoProgress;

impl ProgressReporter for NoProgress {
    fn report(&mut self, _processed: usize, _total: usize) {}
}

// ============================================================================
// PARSED INPUT (shared with the dry-run diagnostic)
// ============================================================================

pub struct ParsedFile {
    pub delimiter: u8,
    pub headers: HeaderMap,
    pub columns: ColumnMap,
    pub records: Vec<StringRecord>,

    /// SHA-256 of the raw bytes
    pub fingerprint: String,
}

impl ParsedFile {
    /// 1-based source line of a record (header is line 1)
    pub fn line_of(&self, index: usize) -> usize {
        self.records[index]
            .position()
            .map(|p| p.line() as usize)
            .unwrap_or(index + 2)
    }
}

pub fn read_input(path: &Path) -> Result<Vec<u8>, ImportError> {
    std::fs::read(path).map_err(|source| ImportError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Sniff, read and resolve headers; fails only on structural problems
pub fn parse_input(bytes: &[u8], config: &ImportConfig) -> Result<ParsedFile, ImportError> {
    let fingerprint = format!("{:x}", Sha256::digest(bytes));
    let body = strip_bom(bytes);
    let delimiter = sniff_delimiter_with(body, config);

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(false)
        .flexible(true)
        .from_reader(body);

    // Lossy decode keeps a stray non-UTF-8 byte from sinking the whole file
    let mut records = Vec::new();
    for result in reader.byte_records() {
        let raw = result?;
        let mut record = StringRecord::from(
            raw.iter()
                .map(|cell| String::from_utf8_lossy(cell).into_owned())
                .collect::<Vec<_>>(),
        );
        record.set_position(raw.position().cloned());
        records.push(record);
    }

    // Leading blank lines are not a header
    let header_index = records
        .iter()
        .position(|r| r.iter().any(|cell| !cell.trim().is_empty()))
        .ok_or(ImportError::EmptyFile)?;
    let header_record = records.remove(header_index);
    records.drain(..header_index);

    let headers = HeaderMap::new(header_record.iter());
    let columns = headers.resolve()?;

    log::debug!(
        "Parsed {} rows, delimiter {}, headers {:?}",
        records.len(),
        delimiter_name(delimiter),
        headers.headers()
    );

    Ok(ParsedFile {
        delimiter,
        headers,
        columns,
        records,
        fingerprint,
    })
}

// ============================================================================
// SUMMARY
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImportSummary {
    pub source: String,
    pub delimiter: String,
    pub rows_total: usize,
    pub rows_imported: usize,
    pub rows_skipped: usize,
    pub rows_failed: usize,
    pub applications_created: usize,
    pub applications_updated: usize,
    pub integrations_created: usize,

    /// Integrations are append-only during import, so this stays 0
    pub integrations_updated: usize,

    pub business_units_created: usize,
    pub categories_created: usize,
    pub reconciliation: ReconciliationReport,
    pub fingerprint: String,
    pub warnings: Vec<String>,
}

impl ImportSummary {
    pub fn summary(&self) -> String {
        format!(
            "{} rows: {} applications created, {} updated, {} integrations created, {} warnings",
            self.rows_total,
            self.applications_created,
            self.applications_updated,
            self.integrations_created,
            self.warnings.len()
        )
    }
}

// ============================================================================
// IMPORT
// ============================================================================

/// Import a CSV file from disk into `conn`
pub fn run_import(
    conn: &Connection,
    csv_path: &Path,
    config: &ImportConfig,
    progress: &mut dyn ProgressReporter,
) -> Result<ImportSummary, ImportError> {
    let bytes = read_input(csv_path)?;
    let source = csv_path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("input.csv");
    import_bytes(conn, &bytes, source, config, progress)
}

pub fn import_bytes(
    conn: &Connection,
    bytes: &[u8],
    source: &str,
    config: &ImportConfig,
    progress: &mut dyn ProgressReporter,
) -> Result<ImportSummary, ImportError> {
    let parsed = parse_input(bytes, config)?;

    // Bootstrap is the one write where exhausting retries is fatal
    retry::with_retry(&config.retry, "database bootstrap", || db::setup_database(conn)).map_err(|e| {
        log::error!("Database bootstrap failed: {:#}", e);
        ImportError::Bootstrap(e)
    })?;

    let total = parsed.records.len();
    log::info!(
        "Importing {} ({} rows, {} delimited)",
        source,
        total,
        delimiter_name(parsed.delimiter)
    );

    let mut summary = ImportSummary {
        source: source.to_string(),
        delimiter: delimiter_name(parsed.delimiter).to_string(),
        rows_total: total,
        fingerprint: parsed.fingerprint.clone(),
        ..Default::default()
    };

    let mut ctx = ImportContext::new();
    let decoder = RowDecoder::new(&parsed.columns);
    let interval = config.progress_interval.max(1);

    for (index, record) in parsed.records.iter().enumerate() {
        let line = parsed.line_of(index);

        match decoder.decode(record, line, &mut ctx.carry) {
            Decoded::Blank => summary.rows_skipped += 1,
            Decoded::Orphan { line, integration_name } => {
                summary.rows_skipped += 1;
                if let Some(name) = integration_name {
                    push_warning(
                        &mut summary.warnings,
                        format!("line {}: integration '{}' has no application name, row skipped", line, name),
                    );
                } else {
                    log::debug!("line {}: no application name yet, row skipped", line);
                }
            }
            Decoded::Row(row) => {
                for warning in &row.warnings {
                    push_warning(&mut summary.warnings, warning.clone());
                }
                import_row(conn, &mut ctx, &row, config, &mut summary);
            }
        }

        let processed = index + 1;
        if processed % interval == 0 && processed < total {
            progress.report(processed, total);
        }
    }
    progress.report(total, total);

    // Barrier: reconciliation only after every row has been handled
    let reconciliation = reconcile_categories(conn, &mut ctx, &config.retry);
    summary.categories_created += reconciliation.categories_created;
    summary.warnings.extend(reconciliation.warnings.iter().cloned());
    summary.reconciliation = reconciliation;

    summary.applications_created = ctx.applications_created();
    summary.applications_updated = ctx.applications_updated();

    record_run(conn, &summary, config);

    log::info!("Import finished: {}", summary.summary());
    Ok(summary)
}

fn push_warning(warnings: &mut Vec<String>, warning: String) {
    log::warn!("{}", warning);
    warnings.push(warning);
}

// ============================================================================
// ROW WRITE GROUP
// ============================================================================

#[derive(Debug, Default)]
struct RowWrite {
    application_key: String,
    resolution: Option<Resolution>,
    integration_created: bool,
    business_units_created: usize,
    categories_created: usize,
    warnings: Vec<String>,
    pending: NameCache,
}

fn import_row(
    conn: &Connection,
    ctx: &mut ImportContext,
    row: &DecodedRow,
    config: &ImportConfig,
    summary: &mut ImportSummary,
) {
    // Union grows even if the write below fails; reconciliation catches up
    ctx.accumulate_categories(&row.application.name, &row.categories);

    let label = format!("line {} ('{}')", row.line, row.application.name);
    let shared: &ImportContext = ctx;
    let result = retry::in_transaction(conn, &config.retry, &label, |tx| write_row(tx, shared, row));

    match result {
        Ok(write) => {
            ctx.cache.absorb(write.pending);
            if let Some(resolution) = write.resolution {
                ctx.record_application(&write.application_key, resolution);
            }
            summary.rows_imported += 1;
            summary.business_units_created += write.business_units_created;
            summary.categories_created += write.categories_created;
            if write.integration_created {
                summary.integrations_created += 1;
            }
            for warning in write.warnings {
                push_warning(&mut summary.warnings, warning);
            }
        }
        Err(err) => {
            summary.rows_failed += 1;
            push_warning(
                &mut summary.warnings,
                format!("line {}: failed to import '{}': {:#}", row.line, row.application.name, err),
            );
        }
    }
}

/// All writes for one row; runs inside a single transaction
///
/// Failing to resolve the application fails the group. Business unit,
/// category and integration problems (other than contention) only skip that
/// piece and are reported as warnings.
fn write_row(conn: &Connection, ctx: &ImportContext, row: &DecodedRow) -> Result<RowWrite> {
    let now = Utc::now();
    let mut group = GroupCache::new(&ctx.cache);
    let mut write = RowWrite {
        application_key: name_key(&row.application.name),
        ..Default::default()
    };

    let (app, resolution) = resolve_application(conn, &mut group, &row.application, now)?;
    write.resolution = Some(resolution);
    if resolution == Resolution::Created {
        let event = AuditEvent::new(
            EventKind::ApplicationCreated,
            app.id.to_string(),
            serde_json::json!({ "name": app.name, "vendor": app.vendor, "risk_score": app.risk_score }),
            ACTOR,
        );
        if let Err(e) = db::insert_event(conn, &event) {
            log::debug!("Skipping audit event for '{}': {:#}", app.name, e);
        }
    }

    // Business units: current row's list (or the carried one)
    for name in &row.business_units {
        let linked = resolve_reference(conn, &mut group, ReferenceKind::BusinessUnit, name).and_then(|(id, r)| {
            db::link_application(conn, ReferenceKind::BusinessUnit, app.id, id)?;
            Ok(r)
        });
        match linked {
            Ok(Resolution::Created) => write.business_units_created += 1,
            Ok(Resolution::Existing) => {}
            Err(e) if retry::is_busy(&e) => return Err(e),
            Err(e) => write.warnings.push(format!(
                "line {}: business unit '{}' skipped: {:#}",
                row.line, name, e
            )),
        }
    }

    // Best-effort category links: everything accumulated so far for this app
    if let Some(accumulated) = ctx.accumulated_for(&row.application.name) {
        for name in accumulated.categories.names() {
            let linked = resolve_reference(conn, &mut group, ReferenceKind::Category, name).and_then(|(id, r)| {
                db::link_application(conn, ReferenceKind::Category, app.id, id)?;
                Ok(r)
            });
            match linked {
                Ok(Resolution::Created) => write.categories_created += 1,
                Ok(Resolution::Existing) => {}
                Err(e) if retry::is_busy(&e) => return Err(e),
                Err(e) => write.warnings.push(format!(
                    "line {}: category '{}' not linked yet: {:#}",
                    row.line, name, e
                )),
            }
        }
    }

    if let Some(input) = &row.integration {
        let integration = input.to_integration(app.id, now);
        match db::insert_integration(conn, &integration) {
            Ok(integration_id) => {
                write.integration_created = true;

                let event = AuditEvent::new(
                    EventKind::IntegrationCreated,
                    integration_id.to_string(),
                    serde_json::json!({ "name": integration.name, "application_id": app.id }),
                    ACTOR,
                );
                if let Err(e) = db::insert_event(conn, &event) {
                    log::debug!("Skipping audit event for '{}': {:#}", integration.name, e);
                }

                // Integration categories are row-scoped
                for name in &row.categories {
                    let linked = resolve_reference(conn, &mut group, ReferenceKind::Category, name)
                        .and_then(|(id, r)| {
                            db::link_integration_category(conn, integration_id, id)?;
                            Ok(r)
                        });
                    match linked {
                        Ok(Resolution::Created) => write.categories_created += 1,
                        Ok(Resolution::Existing) => {}
                        Err(e) if retry::is_busy(&e) => return Err(e),
                        Err(e) => write.warnings.push(format!(
                            "line {}: integration '{}' category '{}' skipped: {:#}",
                            row.line, integration.name, name, e
                        )),
                    }
                }
            }
            Err(e) if retry::is_busy(&e) => return Err(e),
            Err(e) => write.warnings.push(format!(
                "line {}: integration '{}' skipped: {:#}",
                row.line, input.name, e
            )),
        }
    }

    write.pending = group.into_pending();
    Ok(write)
}

/// One audit row per run; never fails the import
fn record_run(conn: &Connection, summary: &ImportSummary, config: &ImportConfig) {
    let event = AuditEvent::new(
        EventKind::ImportCompleted,
        summary.fingerprint.as_str(),
        serde_json::json!({
            "source": summary.source,
            "rows_total": summary.rows_total,
            "rows_imported": summary.rows_imported,
            "applications_created": summary.applications_created,
            "applications_updated": summary.applications_updated,
            "integrations_created": summary.integrations_created,
            "warnings": summary.warnings.len(),
        }),
        ACTOR,
    );
    let result = retry::with_retry(&config.retry, "import event", || db::insert_event(conn, &event));
    if let Err(e) = result {
        log::warn!("Could not record import event: {:#}", e);
    }
}
