// 🚫 Import Errors - Structural failures that abort a run before any write
//
// Everything else (bad cells, failed row writes, reconciliation misses)
// is collected as warnings on the summary instead of aborting.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Failed to read input file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Input file has no header row")]
    EmptyFile,

    #[error(
        "No application name column found. Expected one of [{}], found headers [{}]",
        aliases.join(", "),
        found.join(", ")
    )]
    MissingNameColumn {
        aliases: Vec<String>,
        found: Vec<String>,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Database bootstrap failed: {0:#}")]
    Bootstrap(anyhow::Error),
}

impl ImportError {
    /// True for errors caused by the file itself rather than the store.
    pub fn is_structural(&self) -> bool {
        !matches!(self, ImportError::Bootstrap(_))
    }
}
