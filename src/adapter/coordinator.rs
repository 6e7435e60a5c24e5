// src/adapter/coordinator.rs
// Pipeline coordinator

use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::adapter::scheduler::{SchedulerStats, TrendScheduler};
use crate::application::usecase::{
    AlertDispatcher, DualSinkWriter, RecordEnricher, Rejection, TrendDetectionEngine, WriteReport,
};
use crate::config::Config;
use crate::domain::errors::{AppError, AppResult};
use crate::domain::repository::{ColdArchive, HotStore};
use crate::domain::service::AlertChannel;
use crate::infrastructure::store::ChangeFeedStore;

/// What happened to one ingested batch
#[derive(Debug, Default)]
pub struct BatchReport {
    pub received: usize,
    pub enriched: usize,
    pub rejections: Vec<Rejection>,
    pub writes: WriteReport,
    pub anomalies_notified: usize,
}

/// Enrichment and dual writes happen on the caller's task; trend detection runs
/// on the scheduler, driven by the hot store's change feed.
pub struct PipelineCoordinator {
    enricher: RecordEnricher,
    writer: DualSinkWriter,
    dispatcher: Arc<AlertDispatcher>,
    notify_anomalies: bool,
    scheduler: JoinHandle<SchedulerStats>,
}

impl PipelineCoordinator {
    /// Wire the pipeline and start the scheduler. Must be called inside a tokio runtime.
    pub fn start(
        config: &Config,
        hot: Arc<dyn HotStore>,
        archive: Arc<dyn ColdArchive>,
        channel: Arc<dyn AlertChannel>,
    ) -> AppResult<Self> {
        config.validate()?;
        let settings = config.trend.settings()?;

        let (feed_store, feed) =
            ChangeFeedStore::with_channel(hot.clone(), config.scheduler.feed_buffer);
        let dispatcher = Arc::new(AlertDispatcher::new(channel));

        // The engine reads the plain store; only the writer holds the feed sender,
        // so dropping the writer is what ends the scheduler.
        let engine = Arc::new(TrendDetectionEngine::new(hot, dispatcher.clone(), settings));
        let scheduler = TrendScheduler::new(engine, config.scheduler.clone()).spawn(feed);

        log::info!(
            "pipeline started: short={} long={} lookback={} lanes={} anomaly_threshold={}%",
            settings.short_window,
            settings.long_window,
            settings.lookback,
            config.scheduler.lanes,
            config.enrichment.anomaly_threshold_percent
        );

        Ok(Self {
            enricher: RecordEnricher::new(config.enrichment.anomaly_threshold_percent),
            writer: DualSinkWriter::new(Arc::new(feed_store), archive),
            dispatcher,
            notify_anomalies: config.enrichment.notify_anomalies,
            scheduler,
        })
    }

    /// Enrich and store one batch. Malformed payloads and sink failures are
    /// reported, never raised.
    pub async fn ingest_batch<S: AsRef<str>>(&self, payloads: &[S]) -> BatchReport {
        let batch = self.enricher.enrich_batch(payloads);
        let writes = self.writer.write_batch(&batch.records).await;

        let mut anomalies_notified = 0;
        if self.notify_anomalies {
            for record in batch.records.iter().filter(|r| r.anomaly) {
                match self.dispatcher.dispatch_anomaly(record).await {
                    Ok(()) => anomalies_notified += 1,
                    Err(e) => log::warn!(
                        "anomaly notification failed symbol={} timestamp={} reason={}",
                        record.symbol(),
                        record.key().timestamp_text(),
                        e
                    ),
                }
            }
        }

        let report = BatchReport {
            received: payloads.len(),
            enriched: batch.records.len(),
            rejections: batch.rejections,
            writes,
            anomalies_notified,
        };

        log::info!(
            "batch processed: received={} enriched={} rejected={} hot_written={} cold_written={}",
            report.received,
            report.enriched,
            report.rejections.len(),
            report.writes.hot_written,
            report.writes.cold_written
        );
        report
    }

    /// Close the change feed and wait for in-flight trend invocations
    pub async fn shutdown(self) -> AppResult<SchedulerStats> {
        let Self {
            writer, scheduler, ..
        } = self;
        drop(writer);

        scheduler
            .await
            .map_err(|e| AppError::Unknown(format!("trend scheduler failed: {}", e)))
    }
}
