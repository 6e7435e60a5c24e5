// src/main.rs
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::signal::ctrl_c;

use trend_watch::adapter::PipelineCoordinator;
use trend_watch::application::service::{CanonicalQuery, HistoryQueryService};
use trend_watch::config::Config;
use trend_watch::domain::errors::AppResult;
use trend_watch::infrastructure::alert::LogAlertChannel;
use trend_watch::infrastructure::archive::FileSystemArchive;
use trend_watch::infrastructure::store::SqliteHotStore;

#[derive(Debug, Default)]
struct Totals {
    received: usize,
    enriched: usize,
    rejected: usize,
    sink_failures: usize,
}

#[tokio::main]
async fn main() -> AppResult<()> {
    // Load configuration
    let config = Config::from_env()?;

    // Initialize logging
    config.init_logging()?;

    log::info!("Starting trend_watch v{}", env!("CARGO_PKG_VERSION"));
    let summary = std::env::args().any(|arg| arg == "--summary");

    let hot = Arc::new(SqliteHotStore::open(
        &config.storage.hot_store_path,
        &config.storage.hot_store_table,
    )?);
    let archive = Arc::new(FileSystemArchive::new(
        &config.storage.archive_root,
        &config.storage.archive_bucket,
    )?);

    let pipeline = PipelineCoordinator::start(
        &config,
        hot,
        archive.clone(),
        Arc::new(LogAlertChannel::default()),
    )?;

    // Newline-delimited JSON observations on stdin
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut batch = Vec::with_capacity(config.enrichment.batch_size);
    let mut totals = Totals::default();

    let shutdown = ctrl_c();
    tokio::pin!(shutdown);

    log::info!("Reading observations from stdin. Press Ctrl+C to stop.");
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    batch.push(line);
                    if batch.len() >= config.enrichment.batch_size {
                        flush(&pipeline, &mut batch, &mut totals).await;
                    }
                }
                None => break,
            },
            _ = &mut shutdown => {
                log::info!("Interrupt received, flushing pending observations");
                break;
            }
        }
    }
    flush(&pipeline, &mut batch, &mut totals).await;

    // Shutdown
    log::info!("Shutting down...");
    let stats = pipeline.shutdown().await?;

    log::info!(
        "ingested: received={} enriched={} rejected={} sink_failures={}",
        totals.received,
        totals.enriched,
        totals.rejected,
        totals.sink_failures
    );
    log::info!(
        "trend: invocations={} signals={} no_crossover={} not_ready={} retries={} failures={} abandoned={}",
        stats.invocations,
        stats.signals,
        stats.no_crossover,
        stats.not_ready,
        stats.retries,
        stats.failures,
        stats.abandoned
    );

    if summary {
        let history = HistoryQueryService::load(archive.as_ref()).await?;
        for row in history.canonical(&CanonicalQuery::AverageVolume)? {
            let fields: Vec<String> = row
                .iter()
                .map(|(column, value)| format!("{}={}", column, value))
                .collect();
            log::info!("archive summary: {}", fields.join(" "));
        }
    }

    log::info!("Shutdown complete.");
    Ok(())
}

async fn flush(pipeline: &PipelineCoordinator, batch: &mut Vec<String>, totals: &mut Totals) {
    if batch.is_empty() {
        return;
    }

    let payloads = std::mem::take(batch);
    let report = pipeline.ingest_batch(&payloads).await;

    totals.received += report.received;
    totals.enriched += report.enriched;
    totals.rejected += report.rejections.len();
    totals.sink_failures += report.writes.failures.len();
}
