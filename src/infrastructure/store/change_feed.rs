// src/infrastructure/store/change_feed.rs
// Confirmed-write notifications for the hot store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::domain::errors::StoreResult;
use crate::domain::models::{ChangeNotification, EnrichedRecord, RecordKey};
use crate::domain::repository::HotStore;

/// Wraps a hot store and emits a `ChangeNotification` after every committed `put`.
///
/// Overwrites notify again, so consumers see at-least-once delivery per key.
pub struct ChangeFeedStore {
    inner: Arc<dyn HotStore>,
    feed: mpsc::Sender<ChangeNotification>,
}

impl ChangeFeedStore {
    pub fn new(inner: Arc<dyn HotStore>, feed: mpsc::Sender<ChangeNotification>) -> Self {
        Self { inner, feed }
    }

    /// Create the store together with the receiving end of its feed
    pub fn with_channel(
        inner: Arc<dyn HotStore>,
        buffer: usize,
    ) -> (Self, mpsc::Receiver<ChangeNotification>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self::new(inner, tx), rx)
    }
}

#[async_trait]
impl HotStore for ChangeFeedStore {
    async fn put(&self, record: &EnrichedRecord) -> StoreResult<()> {
        self.inner.put(record).await?;

        // The row is committed at this point; a closed feed must not fail the write.
        if self
            .feed
            .send(ChangeNotification::new(record.clone()))
            .await
            .is_err()
        {
            log::warn!(
                "change feed closed, notification dropped symbol={} timestamp={}",
                record.symbol(),
                record.key().timestamp_text()
            );
        }

        Ok(())
    }

    async fn get(&self, key: &RecordKey) -> StoreResult<Option<EnrichedRecord>> {
        self.inner.get(key).await
    }

    async fn recent(
        &self,
        symbol: &str,
        until: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<EnrichedRecord>> {
        self.inner.recent(symbol, until, limit).await
    }

    async fn count(&self, symbol: &str) -> StoreResult<usize> {
        self.inner.count(symbol).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::fixtures::record;
    use crate::infrastructure::store::InMemoryHotStore;
    use rust_decimal::Decimal;

    #[tokio::test]
    async fn test_notifies_only_after_successful_commit() {
        let inner = Arc::new(InMemoryHotStore::new());
        let (store, mut rx) = ChangeFeedStore::with_channel(inner.clone(), 8);

        let row = record("AAPL", 1, Decimal::ONE);
        store.put(&row).await.unwrap();
        assert_eq!(rx.recv().await.unwrap().record, row);

        inner.set_fail_writes(true);
        assert!(store.put(&record("AAPL", 2, Decimal::TWO)).await.is_err());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_closed_feed_does_not_fail_write() {
        let inner = Arc::new(InMemoryHotStore::new());
        let (store, rx) = ChangeFeedStore::with_channel(inner.clone(), 1);
        drop(rx);

        store.put(&record("AAPL", 1, Decimal::ONE)).await.unwrap();
        assert_eq!(inner.count("AAPL").await.unwrap(), 1);
    }
}
