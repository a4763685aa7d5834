//! Error types for the formula_core library.
//!
//! These are hard failures only. Business-rule failures of a candidate are
//! carried as data in a `ValidationReport`, never as an `Error`.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for formula_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Catalog validation error
    #[error("Catalog validation error: {0}")]
    CatalogValidation(String),

    /// Malformed candidate; cannot be fixed by resubmitting other ingredients
    #[error("Schema error: {0}")]
    Schema(String),

    /// Formula ledger error
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
