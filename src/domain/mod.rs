// src/domain/mod.rs
pub mod errors;
pub mod models;
pub mod repository;
pub mod service;

// Re-export common types for convenience
pub use errors::{
    AlertError, AlertResult, AnalysisError, AnalysisResult, AppError, AppResult, ArchiveError,
    ArchiveResult, EnrichmentError, EnrichmentResult, QueryError, QueryResult, StoreError,
    StoreResult, TrendError, TrendResult,
};
pub use models::{
    ChangeNotification, CrossoverSignal, Direction, EnrichedRecord, PriceObservation, RecordKey,
    RollingWindow, Severity,
};
