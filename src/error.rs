use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

use crate::domain::DatasetKind;

#[derive(Debug, Error, Diagnostic)]
pub enum JobError {
    #[error("missing required environment variable {0}")]
    MissingConfig(String),

    #[error("invalid configuration value: {0}")]
    InvalidConfig(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("spreadsheet request failed: {0}")]
    SheetHttp(String),

    #[error("spreadsheet returned status {status}: {message}")]
    SheetStatus { status: u16, message: String },

    #[error("geocoding request failed: {0}")]
    GeocodeHttp(String),

    #[error("geocoding returned status {status}: {message}")]
    GeocodeStatus { status: u16, message: String },

    #[error("object storage request failed: {0}")]
    StorageHttp(String),

    #[error("failed to sign object storage request: {0}")]
    Signing(String),

    #[error("object storage returned status {status}: {message}")]
    StorageStatus { status: u16, message: String },

    #[error("{dataset} row {line} has {found} columns, expected at least {expected}")]
    RowShape {
        dataset: DatasetKind,
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("failed to parse tab-separated data: {0}")]
    Parse(String),

    #[error("failed to serialize dataset: {0}")]
    Serialize(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("{0} pipeline thread panicked")]
    TaskPanicked(DatasetKind),
}
