// src/infrastructure/archive/memory.rs

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::RwLock;

use crate::domain::errors::{ArchiveError, ArchiveResult};
use crate::domain::models::{PriceObservation, RecordKey};
use crate::domain::repository::ColdArchive;

/// Archive kept in memory, serialized exactly like the filesystem objects
#[derive(Default)]
pub struct InMemoryArchive {
    objects: RwLock<BTreeMap<RecordKey, String>>,
    fail_writes: AtomicBool,
}

impl InMemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Raw JSON body stored for a key
    pub async fn raw_object(&self, key: &RecordKey) -> Option<String> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }
}

#[async_trait]
impl ColdArchive for InMemoryArchive {
    async fn put(&self, observation: &PriceObservation) -> ArchiveResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(ArchiveError::Unavailable("writes disabled".to_string()));
        }

        let body = serde_json::to_string(observation)?;
        self.objects.write().await.insert(observation.key(), body);
        Ok(())
    }

    async fn get(&self, key: &RecordKey) -> ArchiveResult<Option<PriceObservation>> {
        match self.objects.read().await.get(key) {
            Some(body) => Ok(Some(serde_json::from_str(body)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, symbol: Option<&str>) -> ArchiveResult<Vec<PriceObservation>> {
        let objects = self.objects.read().await;
        objects
            .iter()
            .filter(|(key, _)| symbol.map_or(true, |s| key.symbol == s))
            .map(|(_, body)| serde_json::from_str(body).map_err(ArchiveError::from))
            .collect()
    }
}
