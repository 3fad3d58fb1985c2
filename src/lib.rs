// AppTrack Import - Core Library
// Bulk CSV ingestion and reconciliation for the application / integration tracker

pub mod config;
pub mod db;
pub mod decoder;
pub mod diagnostic;
pub mod dialect;
pub mod entities;
pub mod error;
pub mod headers;
pub mod importer;
pub mod reconciliation;
pub mod resolver;
pub mod retry;
pub mod risk;
pub mod worker;

// Re-export commonly used types
pub use config::{ImportConfig, RetryPolicy};
pub use db::{
    AuditEvent, EventKind, Subject, TableCounts,
    open_connection, open_readonly, setup_database, get_table_counts,
    list_applications, insert_event, events_for_subject,
};
pub use diagnostic::{diagnose, diagnose_file, DiagnosticReport};
pub use dialect::{sniff_delimiter, delimiter_name};
pub use entities::{
    Application, Integration, RatingFactors, ReferenceKind,
};
pub use error::ImportError;
pub use headers::{Field, HeaderMapping};
pub use importer::{import_bytes, run_import, ImportSummary, NoProgress, ProgressReporter};
pub use reconciliation::ReconciliationReport;
pub use risk::calculate_risk;
pub use worker::{spawn_import, ImportHandle, ImportMessage};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
