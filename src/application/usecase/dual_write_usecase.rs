// src/application/usecase/dual_write_usecase.rs
// Hot store + cold archive writes, independent of each other

use futures_util::future::join;
use std::sync::Arc;

use crate::domain::errors::{ArchiveError, StoreError};
use crate::domain::models::{EnrichedRecord, RecordKey};
use crate::domain::repository::{ColdArchive, HotStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sink {
    HotStore,
    ColdArchive,
}

impl Sink {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sink::HotStore => "hot_store",
            Sink::ColdArchive => "cold_archive",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SinkFailure {
    pub sink: Sink,
    pub key: RecordKey,
    pub reason: String,
}

/// Per-record result; each sink is reported on its own
#[derive(Debug)]
pub struct DualWriteOutcome {
    pub key: RecordKey,
    pub hot: Result<(), StoreError>,
    pub cold: Result<(), ArchiveError>,
}

impl DualWriteOutcome {
    pub fn is_complete(&self) -> bool {
        self.hot.is_ok() && self.cold.is_ok()
    }
}

#[derive(Debug, Default)]
pub struct WriteReport {
    pub attempted: usize,
    pub hot_written: usize,
    pub cold_written: usize,
    pub failures: Vec<SinkFailure>,
}

impl WriteReport {
    pub fn failures_for(&self, sink: Sink) -> impl Iterator<Item = &SinkFailure> {
        self.failures.iter().filter(move |f| f.sink == sink)
    }
}

/// Writes the enriched record to the hot store and the raw observation to the archive.
///
/// The two writes are not transactional. Both are keyed by (symbol, timestamp),
/// so redelivering the batch converges on the same state.
pub struct DualSinkWriter {
    hot: Arc<dyn HotStore>,
    archive: Arc<dyn ColdArchive>,
}

impl DualSinkWriter {
    pub fn new(hot: Arc<dyn HotStore>, archive: Arc<dyn ColdArchive>) -> Self {
        Self { hot, archive }
    }

    pub async fn write(&self, record: &EnrichedRecord) -> DualWriteOutcome {
        let (hot, cold) = join(
            self.hot.put(record),
            self.archive.put(&record.observation),
        )
        .await;

        let key = record.key();
        if let Err(e) = &hot {
            log::error!(
                "hot store write failed symbol={} timestamp={} reason={}",
                key.symbol,
                key.timestamp_text(),
                e
            );
        }
        if let Err(e) = &cold {
            log::error!(
                "archive write failed symbol={} timestamp={} reason={}",
                key.symbol,
                key.timestamp_text(),
                e
            );
        }

        DualWriteOutcome { key, hot, cold }
    }

    /// Write every record in order; a failure never stops the rest of the batch
    pub async fn write_batch(&self, records: &[EnrichedRecord]) -> WriteReport {
        let mut report = WriteReport {
            attempted: records.len(),
            ..WriteReport::default()
        };

        for record in records {
            let outcome = self.write(record).await;

            match outcome.hot {
                Ok(()) => report.hot_written += 1,
                Err(e) => report.failures.push(SinkFailure {
                    sink: Sink::HotStore,
                    key: outcome.key.clone(),
                    reason: e.to_string(),
                }),
            }
            match outcome.cold {
                Ok(()) => report.cold_written += 1,
                Err(e) => report.failures.push(SinkFailure {
                    sink: Sink::ColdArchive,
                    key: outcome.key,
                    reason: e.to_string(),
                }),
            }
        }

        report
    }
}
