// src/infrastructure/store/memory.rs
// In-process hot store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

use crate::domain::errors::{StoreError, StoreResult};
use crate::domain::models::{EnrichedRecord, RecordKey};
use crate::domain::repository::HotStore;

/// Hot store backed by an ordered map keyed by (symbol, timestamp)
#[derive(Default)]
pub struct InMemoryHotStore {
    rows: RwLock<BTreeMap<RecordKey, EnrichedRecord>>,
    fail_writes: AtomicBool,
    fail_reads: AtomicBool,
    writes: AtomicUsize,
}

impl InMemoryHotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent writes fail with `StoreError::Unavailable`
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent reads fail with `StoreError::Unavailable`
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    /// Number of successful `put` calls, including overwrites
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> Vec<EnrichedRecord> {
        self.rows.read().await.values().cloned().collect()
    }

    fn check_reads(&self) -> StoreResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("reads disabled".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl HotStore for InMemoryHotStore {
    async fn put(&self, record: &EnrichedRecord) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("writes disabled".to_string()));
        }

        self.rows.write().await.insert(record.key(), record.clone());
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn get(&self, key: &RecordKey) -> StoreResult<Option<EnrichedRecord>> {
        self.check_reads()?;
        Ok(self.rows.read().await.get(key).cloned())
    }

    async fn recent(
        &self,
        symbol: &str,
        until: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<EnrichedRecord>> {
        self.check_reads()?;

        let lower = RecordKey::new(symbol, DateTime::<Utc>::MIN_UTC);
        let upper = RecordKey::new(symbol, until);

        let rows = self.rows.read().await;
        Ok(rows
            .range(lower..=upper)
            .rev()
            .take(limit)
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn count(&self, symbol: &str) -> StoreResult<usize> {
        self.check_reads()?;
        Ok(self
            .rows
            .read()
            .await
            .keys()
            .filter(|key| key.symbol == symbol)
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::fixtures::{record, ts};
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_recent_is_bounded_descending_and_per_symbol() {
        let store = InMemoryHotStore::new();
        for minute in 0..10 {
            store.put(&record("AAPL", minute, Decimal::from(minute))).await.unwrap();
            store.put(&record("MSFT", minute, Decimal::from(100 + minute))).await.unwrap();
        }

        let rows = store.recent("AAPL", ts(6), 3).await.unwrap();
        let prices: Vec<_> = rows.iter().map(|r| r.price()).collect();
        assert_eq!(prices, vec![Decimal::from(6), Decimal::from(5), Decimal::from(4)]);
        assert_eq!(store.count("AAPL").await.unwrap(), 10);
    }

    #[tokio::test]
    async fn test_put_is_idempotent_on_key() {
        let store = InMemoryHotStore::new();
        let row = record("AAPL", 1, Decimal::ONE);

        store.put(&row).await.unwrap();
        store.put(&row).await.unwrap();

        assert_eq!(store.count("AAPL").await.unwrap(), 1);
        assert_eq!(store.get(&row.key()).await.unwrap(), Some(row));
        assert_eq!(store.write_count(), 2);
    }

    #[tokio::test]
    async fn test_failure_injection() {
        let store = InMemoryHotStore::new();
        store.set_fail_writes(true);
        assert!(store.put(&record("AAPL", 1, Decimal::ONE)).await.is_err());
        store.set_fail_reads(true);
        assert!(store.recent("AAPL", ts(1), 5).await.is_err());
    }
}
