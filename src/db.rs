// 🗄️ Store - SQLite schema and parameterized access for the portfolio tables
//
// Six tables mirror the domain (applications, business_units, categories,
// integrations and three link tables) plus an append-only events table.
// Uniqueness lives in the schema: entities are unique by name_key, link
// tables by their composite primary key.

use crate::entities::{Application, Integration, RatingFactors, ReferenceKind};
use crate::config::ImportConfig;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSqlOutput, Type, ValueRef};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row, ToSql};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

// ============================================================================
// CONNECTIONS
// ============================================================================

/// Open a read-write connection for an import worker
pub fn open_connection(path: &Path, config: &ImportConfig) -> Result<Connection> {
    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database: {}", path.display()))?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}

/// Open an existing database for reading only (dry-run, summaries)
pub fn open_readonly(path: &Path) -> Result<Connection> {
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("Failed to open database read-only: {}", path.display()))?;
    Ok(conn)
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // WAL lets the front end keep reading while the worker writes
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS applications (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            name_key TEXT NOT NULL UNIQUE,
            vendor TEXT NOT NULL DEFAULT '',
            score INTEGER NOT NULL DEFAULT 0,
            need INTEGER NOT NULL DEFAULT 0,
            criticality INTEGER NOT NULL DEFAULT 0,
            installed INTEGER NOT NULL DEFAULT 0,
            disaster_recovery INTEGER NOT NULL DEFAULT 0,
            safety INTEGER NOT NULL DEFAULT 0,
            security INTEGER NOT NULL DEFAULT 0,
            monetary INTEGER NOT NULL DEFAULT 0,
            customer_service INTEGER NOT NULL DEFAULT 0,
            notes TEXT NOT NULL DEFAULT '',
            risk_score INTEGER NOT NULL DEFAULT 0,
            last_modified TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS business_units (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            name_key TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            name_key TEXT NOT NULL UNIQUE
        );

        CREATE TABLE IF NOT EXISTS integrations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            application_id INTEGER NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            vendor TEXT NOT NULL DEFAULT '',
            score INTEGER NOT NULL DEFAULT 0,
            need INTEGER NOT NULL DEFAULT 0,
            criticality INTEGER NOT NULL DEFAULT 0,
            installed INTEGER NOT NULL DEFAULT 0,
            disaster_recovery INTEGER NOT NULL DEFAULT 0,
            safety INTEGER NOT NULL DEFAULT 0,
            security INTEGER NOT NULL DEFAULT 0,
            monetary INTEGER NOT NULL DEFAULT 0,
            customer_service INTEGER NOT NULL DEFAULT 0,
            notes TEXT NOT NULL DEFAULT '',
            risk_score INTEGER NOT NULL DEFAULT 0,
            last_modified TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS application_business_units (
            application_id INTEGER NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
            business_unit_id INTEGER NOT NULL REFERENCES business_units(id) ON DELETE CASCADE,
            PRIMARY KEY (application_id, business_unit_id)
        );

        CREATE TABLE IF NOT EXISTS application_categories (
            application_id INTEGER NOT NULL REFERENCES applications(id) ON DELETE CASCADE,
            category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
            PRIMARY KEY (application_id, category_id)
        );

        CREATE TABLE IF NOT EXISTS integration_categories (
            integration_id INTEGER NOT NULL REFERENCES integrations(id) ON DELETE CASCADE,
            category_id INTEGER NOT NULL REFERENCES categories(id) ON DELETE CASCADE,
            PRIMARY KEY (integration_id, category_id)
        );

        -- Audit trail: every entity the importer creates, plus one row per run
        CREATE TABLE IF NOT EXISTS events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            event_id TEXT UNIQUE NOT NULL,
            timestamp TEXT NOT NULL,
            event_type TEXT NOT NULL,
            entity_type TEXT NOT NULL,
            entity_id TEXT NOT NULL,
            data TEXT NOT NULL,
            actor TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_integrations_application ON integrations(application_id);
        CREATE INDEX IF NOT EXISTS idx_events_entity ON events(entity_type, entity_id);",
    )
    .context("Failed to create tables")?;

    Ok(())
}

pub fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

// ============================================================================
// APPLICATIONS
// ============================================================================

const APPLICATION_COLUMNS: &str = "id, name, vendor, score, need, criticality, installed,
    disaster_recovery, safety, security, monetary, customer_service,
    notes, risk_score, last_modified";

fn ratings_from_row(row: &Row, offset: usize) -> rusqlite::Result<RatingFactors> {
    let mut values = [0i64; 9];
    for (i, slot) in values.iter_mut().enumerate() {
        *slot = row.get(offset + i)?;
    }
    Ok(RatingFactors::from_array(values))
}

fn application_from_row(row: &Row) -> rusqlite::Result<Application> {
    Ok(Application {
        id: row.get(0)?,
        name: row.get(1)?,
        vendor: row.get(2)?,
        ratings: ratings_from_row(row, 3)?,
        notes: row.get(12)?,
        risk_score: row.get(13)?,
        last_modified: row.get(14)?,
    })
}

pub fn find_application(conn: &Connection, name_key: &str) -> Result<Option<Application>> {
    let sql = format!("SELECT {} FROM applications WHERE name_key = ?1", APPLICATION_COLUMNS);
    let app = conn
        .query_row(&sql, [name_key], application_from_row)
        .optional()?;
    Ok(app)
}

pub fn insert_application(conn: &Connection, app: &Application, name_key: &str) -> Result<i64> {
    let r = app.ratings;
    conn.execute(
        "INSERT INTO applications (
            name, name_key, vendor, score, need, criticality, installed,
            disaster_recovery, safety, security, monetary, customer_service,
            notes, risk_score, last_modified
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            app.name,
            name_key,
            app.vendor,
            r.score,
            r.need,
            r.criticality,
            r.installed,
            r.disaster_recovery,
            r.safety,
            r.security,
            r.monetary,
            r.customer_service,
            app.notes,
            app.risk_score,
            app.last_modified,
        ],
    )
    .with_context(|| format!("Failed to insert application '{}'", app.name))?;
    Ok(conn.last_insert_rowid())
}

pub fn update_application(conn: &Connection, app: &Application) -> Result<()> {
    let r = app.ratings;
    conn.execute(
        "UPDATE applications SET
            vendor = ?1, score = ?2, need = ?3, criticality = ?4, installed = ?5,
            disaster_recovery = ?6, safety = ?7, security = ?8, monetary = ?9,
            customer_service = ?10, notes = ?11, risk_score = ?12, last_modified = ?13
         WHERE id = ?14",
        params![
            app.vendor,
            r.score,
            r.need,
            r.criticality,
            r.installed,
            r.disaster_recovery,
            r.safety,
            r.security,
            r.monetary,
            r.customer_service,
            app.notes,
            app.risk_score,
            app.last_modified,
            app.id,
        ],
    )
    .with_context(|| format!("Failed to update application '{}'", app.name))?;
    Ok(())
}

pub fn list_applications(conn: &Connection) -> Result<Vec<Application>> {
    let sql = format!("SELECT {} FROM applications ORDER BY name_key", APPLICATION_COLUMNS);
    let mut stmt = conn.prepare(&sql)?;
    let apps = stmt
        .query_map([], application_from_row)?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(apps)
}

// ============================================================================
// BUSINESS UNITS / CATEGORIES
// ============================================================================

pub fn find_reference(conn: &Connection, kind: ReferenceKind, name_key: &str) -> Result<Option<i64>> {
    let sql = format!("SELECT id FROM {} WHERE name_key = ?1", kind.table());
    let id = conn.query_row(&sql, [name_key], |row| row.get(0)).optional()?;
    Ok(id)
}

/// Plain insert; a duplicate name_key is a constraint error, never a second row
pub fn insert_reference(conn: &Connection, kind: ReferenceKind, name: &str, name_key: &str) -> Result<i64> {
    let sql = format!("INSERT INTO {} (name, name_key) VALUES (?1, ?2)", kind.table());
    conn.execute(&sql, params![name, name_key])
        .with_context(|| format!("Failed to insert {} '{}'", kind.label(), name))?;
    Ok(conn.last_insert_rowid())
}

/// Returns true when a new link row was written
pub fn link_application(
    conn: &Connection,
    kind: ReferenceKind,
    application_id: i64,
    reference_id: i64,
) -> Result<bool> {
    let sql = format!(
        "INSERT OR IGNORE INTO {} (application_id, {}) VALUES (?1, ?2)",
        kind.application_link_table(),
        kind.link_column()
    );
    let inserted = conn.execute(&sql, params![application_id, reference_id])?;
    Ok(inserted > 0)
}

/// Delete-then-insert of an application's category links
pub fn replace_application_categories(
    conn: &Connection,
    application_id: i64,
    category_ids: &[i64],
) -> Result<usize> {
    conn.execute(
        "DELETE FROM application_categories WHERE application_id = ?1",
        [application_id],
    )?;

    let mut stmt = conn.prepare(
        "INSERT OR IGNORE INTO application_categories (application_id, category_id) VALUES (?1, ?2)",
    )?;
    let mut written = 0;
    for category_id in category_ids {
        written += stmt.execute(params![application_id, category_id])?;
    }
    Ok(written)
}

/// Names linked to an application, sorted case-insensitively
pub fn application_reference_names(
    conn: &Connection,
    kind: ReferenceKind,
    application_id: i64,
) -> Result<Vec<String>> {
    let sql = format!(
        "SELECT r.name FROM {link} l
         JOIN {table} r ON r.id = l.{column}
         WHERE l.application_id = ?1
         ORDER BY r.name_key",
        link = kind.application_link_table(),
        table = kind.table(),
        column = kind.link_column(),
    );
    let mut stmt = conn.prepare(&sql)?;
    let names = stmt
        .query_map([application_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
}

// ============================================================================
// INTEGRATIONS
// ============================================================================

pub fn insert_integration(conn: &Connection, integration: &Integration) -> Result<i64> {
    let r = integration.ratings;
    conn.execute(
        "INSERT INTO integrations (
            application_id, name, vendor, score, need, criticality, installed,
            disaster_recovery, safety, security, monetary, customer_service,
            notes, risk_score, last_modified
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        params![
            integration.application_id,
            integration.name,
            integration.vendor,
            r.score,
            r.need,
            r.criticality,
            r.installed,
            r.disaster_recovery,
            r.safety,
            r.security,
            r.monetary,
            r.customer_service,
            integration.notes,
            integration.risk_score,
            integration.last_modified,
        ],
    )
    .with_context(|| format!("Failed to insert integration '{}'", integration.name))?;
    Ok(conn.last_insert_rowid())
}

pub fn link_integration_category(conn: &Connection, integration_id: i64, category_id: i64) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO integration_categories (integration_id, category_id) VALUES (?1, ?2)",
        params![integration_id, category_id],
    )?;
    Ok(inserted > 0)
}

pub fn integrations_for_application(conn: &Connection, application_id: i64) -> Result<Vec<Integration>> {
    let mut stmt = conn.prepare(
        "SELECT id, application_id, name, vendor, score, need, criticality, installed,
                disaster_recovery, safety, security, monetary, customer_service,
                notes, risk_score, last_modified
         FROM integrations
         WHERE application_id = ?1
         ORDER BY id",
    )?;

    let integrations = stmt
        .query_map([application_id], |row| {
            Ok(Integration {
                id: row.get(0)?,
                application_id: row.get(1)?,
                name: row.get(2)?,
                vendor: row.get(3)?,
                ratings: ratings_from_row(row, 4)?,
                notes: row.get(13)?,
                risk_score: row.get(14)?,
                last_modified: row.get(15)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(integrations)
}

pub fn integration_category_names(conn: &Connection, integration_id: i64) -> Result<Vec<String>> {
    let mut stmt = conn.prepare(
        "SELECT c.name FROM integration_categories l
         JOIN categories c ON c.id = l.category_id
         WHERE l.integration_id = ?1
         ORDER BY c.name_key",
    )?;
    let names = stmt
        .query_map([integration_id], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(names)
}

// ============================================================================
// COUNTS
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableCounts {
    pub applications: i64,
    pub business_units: i64,
    pub categories: i64,
    pub integrations: i64,
    pub application_business_units: i64,
    pub application_categories: i64,
    pub integration_categories: i64,
}

pub fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {}", table);
    let count: i64 = conn.query_row(&sql, [], |row| row.get(0))?;
    Ok(count)
}

pub fn get_table_counts(conn: &Connection) -> Result<TableCounts> {
    Ok(TableCounts {
        applications: count_rows(conn, "applications")?,
        business_units: count_rows(conn, "business_units")?,
        categories: count_rows(conn, "categories")?,
        integrations: count_rows(conn, "integrations")?,
        application_business_units: count_rows(conn, "application_business_units")?,
        application_categories: count_rows(conn, "application_categories")?,
        integration_categories: count_rows(conn, "integration_categories")?,
    })
}

// ============================================================================
// AUDIT EVENTS
// ============================================================================

/// What an audit event is about
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Subject {
    Application,
    Integration,
    Import,
}

impl Subject {
    pub fn as_str(&self) -> &'static str {
        match self {
            Subject::Application => "application",
            Subject::Integration => "integration",
            Subject::Import => "import",
        }
    }

    fn parse(value: &str) -> Option<Self> {
        [Subject::Application, Subject::Integration, Subject::Import]
            .into_iter()
            .find(|s| s.as_str() == value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    ApplicationCreated,
    IntegrationCreated,
    ImportCompleted,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ApplicationCreated => "application_created",
            EventKind::IntegrationCreated => "integration_created",
            EventKind::ImportCompleted => "import_completed",
        }
    }

    pub fn subject(&self) -> Subject {
        match self {
            EventKind::ApplicationCreated => Subject::Application,
            EventKind::IntegrationCreated => Subject::Integration,
            EventKind::ImportCompleted => Subject::Import,
        }
    }

    fn parse(value: &str) -> Option<Self> {
        [
            EventKind::ApplicationCreated,
            EventKind::IntegrationCreated,
            EventKind::ImportCompleted,
        ]
        .into_iter()
        .find(|k| k.as_str() == value)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown {what} '{value}' in events table")]
struct UnknownLabel {
    what: &'static str,
    value: String,
}

impl ToSql for Subject {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for Subject {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        Subject::parse(text).ok_or_else(|| {
            FromSqlError::Other(Box::new(UnknownLabel { what: "subject", value: text.to_string() }))
        })
    }
}

impl ToSql for EventKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

impl FromSql for EventKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let text = value.as_str()?;
        EventKind::parse(text).ok_or_else(|| {
            FromSqlError::Other(Box::new(UnknownLabel { what: "event kind", value: text.to_string() }))
        })
    }
}

/// One row of the append-only audit log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_id: String,
    pub timestamp: DateTime<Utc>,
    pub kind: EventKind,
    pub subject: Subject,

    /// Store id for applications/integrations, file fingerprint for imports
    pub subject_id: String,

    pub data: serde_json::Value,
    pub actor: String,
}

impl AuditEvent {
    pub fn new(kind: EventKind, subject_id: impl Into<String>, data: serde_json::Value, actor: &str) -> Self {
        Self {
            event_id: uuid::Uuid::new_v4().to_string(),
            timestamp: Utc::now(),
            kind,
            subject: kind.subject(),
            subject_id: subject_id.into(),
            data,
            actor: actor.to_string(),
        }
    }
}

pub fn insert_event(conn: &Connection, event: &AuditEvent) -> Result<()> {
    conn.execute(
        "INSERT INTO events (
            event_id, timestamp, event_type, entity_type, entity_id, data, actor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            event.event_id,
            event.timestamp.to_rfc3339(),
            event.kind,
            event.subject,
            event.subject_id,
            serde_json::to_string(&event.data)?,
            event.actor,
        ],
    )
    .with_context(|| format!("Failed to record {} event", event.kind.as_str()))?;
    Ok(())
}

/// Text column `column` failed to decode; the cause stays attached
fn conversion_failure<E>(column: usize, err: E) -> rusqlite::Error
where
    E: std::error::Error + Send + Sync + 'static,
{
    rusqlite::Error::FromSqlConversionFailure(column, Type::Text, Box::new(err))
}

fn event_from_row(row: &Row) -> rusqlite::Result<AuditEvent> {
    let timestamp: String = row.get(1)?;
    let data: String = row.get(5)?;

    Ok(AuditEvent {
        event_id: row.get(0)?,
        timestamp: DateTime::parse_from_rfc3339(&timestamp)
            .map_err(|e| conversion_failure(1, e))?
            .with_timezone(&Utc),
        kind: row.get(2)?,
        subject: row.get(3)?,
        subject_id: row.get(4)?,
        data: serde_json::from_str(&data).map_err(|e| conversion_failure(5, e))?,
        actor: row.get(6)?,
    })
}

/// Events about one subject, newest first
pub fn events_for_subject(conn: &Connection, subject: Subject, subject_id: &str) -> Result<Vec<AuditEvent>> {
    let mut stmt = conn.prepare(
        "SELECT event_id, timestamp, event_type, entity_type, entity_id, data, actor
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY timestamp DESC, id DESC",
    )?;

    let events = stmt
        .query_map(params![subject, subject_id], event_from_row)?
        .collect::<Result<Vec<_>, _>>()
        .with_context(|| format!("Failed to read events for {} {}", subject.as_str(), subject_id))?;

    Ok(events)
}

pub fn count_events(conn: &Connection, kind: EventKind) -> Result<i64> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM events WHERE event_type = ?1",
        [kind],
        |row| row.get(0),
    )?;
    Ok(count)
}
