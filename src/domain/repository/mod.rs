// src/domain/repository/mod.rs
// Repository interfaces for the two storage sinks

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::errors::{ArchiveResult, StoreResult};
use crate::domain::models::{EnrichedRecord, PriceObservation, RecordKey};

/// Low-latency keyed store holding enriched records
#[async_trait]
pub trait HotStore: Send + Sync {
    /// Insert or overwrite the row keyed by (symbol, timestamp)
    async fn put(&self, record: &EnrichedRecord) -> StoreResult<()>;

    async fn get(&self, key: &RecordKey) -> StoreResult<Option<EnrichedRecord>>;

    /// Up to `limit` rows for `symbol` with timestamp <= `until`, newest first
    async fn recent(
        &self,
        symbol: &str,
        until: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<EnrichedRecord>>;

    async fn count(&self, symbol: &str) -> StoreResult<usize>;
}

/// Durable object archive holding raw observations, one object per key
#[async_trait]
pub trait ColdArchive: Send + Sync {
    /// Store the raw observation under `<symbol>/<timestamp>`, overwriting any previous object
    async fn put(&self, observation: &PriceObservation) -> ArchiveResult<()>;

    async fn get(&self, key: &RecordKey) -> ArchiveResult<Option<PriceObservation>>;

    /// Every archived observation, optionally restricted to one symbol
    async fn list(&self, symbol: Option<&str>) -> ArchiveResult<Vec<PriceObservation>>;
}
