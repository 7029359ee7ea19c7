//! Error types for Confirma

use thiserror::Error;

/// A raw field value that could not be canonicalized.
///
/// Recovered locally by the comparator: a field that fails to normalize is
/// treated as differing, never as matching.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NormalizationError {
    #[error("empty value for {field}")]
    Empty { field: String },

    #[error("invalid date for {field}: {value}")]
    InvalidDate { field: String, value: String },

    #[error("invalid number for {field}: {value}")]
    InvalidNumber { field: String, value: String },

    #[error("unknown field: {0}")]
    UnknownField(String),
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Encryption error: {0}")]
    Encryption(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Normalization error: {0}")]
    Normalization(#[from] NormalizationError),

    #[error(
        "no settlement rule matches trade {trade_id}: add one for counterparty {counterparty} \
        ({direction}, {product})"
    )]
    NoRuleMatched {
        trade_id: i64,
        counterparty: String,
        direction: String,
        product: String,
    },

    #[error("Duplicate settlement rule: {0}")]
    DuplicateRule(String),

    #[error("Duplicate priority: {0}")]
    DuplicatePriority(String),

    #[error("Concurrent modification: {0}")]
    ConcurrentModification(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),
}

pub type Result<T> = std::result::Result<T, Error>;
