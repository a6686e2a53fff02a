//! Error types for the energymodel application.

use thiserror::Error;

/// Errors that can occur when parsing log data or selectors.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("file not found: {0}")]
    FileNotFound(String),

    #[error("cannot read file: {0}")]
    CannotRead(String),

    #[error("invalid Excel format: {0}")]
    InvalidFormat(String),

    #[error("missing required column: {0}")]
    MissingColumn(String),

    #[error("invalid date in row {row}: {value}")]
    InvalidDate { row: usize, value: String },

    #[error("invalid numeric value in row {row}, column {column}: {value}")]
    InvalidNumber {
        row: usize,
        column: String,
        value: String,
    },

    #[error("unknown {kind}: {value}")]
    UnknownSelector { kind: &'static str, value: String },
}

/// Errors that can occur loading or saving persistent settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("cannot read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed settings file: {0}")]
    Malformed(#[from] serde_json::Error),
}
