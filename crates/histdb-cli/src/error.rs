//! CLI error type.

use thiserror::Error;

/// Errors surfaced by the command-line tool.
#[derive(Debug, Error)]
pub enum CliError {
    /// Database error.
    #[error(transparent)]
    Database(#[from] histdb_core::Error),

    /// Malformed JSON argument or input line.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid combination of command-line arguments.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A specific input line failed.
    #[error("line {line}: {source}")]
    Line {
        /// 1-based line number.
        line: usize,
        /// Underlying failure.
        source: Box<CliError>,
    },
}
