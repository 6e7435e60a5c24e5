// src/domain/errors.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Hot store error: {0}")]
    Store(#[from] StoreError),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Alert error: {0}")]
    Alert(#[from] AlertError),

    #[error("Trend detection error: {0}")]
    Trend(#[from] TrendError),

    #[error("Query error: {0}")]
    Query(#[from] QueryError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

/// Why a single inbound observation was rejected by the enricher.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EnrichmentError {
    #[error("Invalid JSON payload: {0}")]
    InvalidJson(String),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidField { field: String, reason: String },

    #[error("Arithmetic overflow while computing {0}")]
    Overflow(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Archive unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Publish failed: {0}")]
    Publish(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum AnalysisError {
    #[error("Insufficient data for analysis: {0}")]
    InsufficientData(String),

    #[error("Invalid period: {0}")]
    InvalidPeriod(String),
}

#[derive(Error, Debug)]
pub enum TrendError {
    #[error("Window reconstruction failed: {0}")]
    Store(#[from] StoreError),

    #[error("Signal dispatch failed: {0}")]
    Dispatch(#[from] AlertError),

    #[error("Indicator calculation failed: {0}")]
    Analysis(#[from] AnalysisError),

    #[error("Invalid trend settings: {0}")]
    InvalidSettings(String),
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Query surface is read-only: {0}")]
    ReadOnly(String),
}

impl From<rusqlite::Error> for QueryError {
    fn from(err: rusqlite::Error) -> Self {
        QueryError::Database(err.to_string())
    }
}

// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;
pub type EnrichmentResult<T> = Result<T, EnrichmentError>;
pub type StoreResult<T> = Result<T, StoreError>;
pub type ArchiveResult<T> = Result<T, ArchiveError>;
pub type AlertResult<T> = Result<T, AlertError>;
pub type AnalysisResult<T> = Result<T, AnalysisError>;
pub type TrendResult<T> = Result<T, TrendError>;
pub type QueryResult<T> = Result<T, QueryError>;
