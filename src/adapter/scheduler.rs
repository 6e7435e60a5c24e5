// src/adapter/scheduler.rs
// Routes change notifications to trend evaluation lanes

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::ops::AddAssign;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};

use crate::application::usecase::{TrendDetectionUseCase, TrendOutcome};
use crate::config::SchedulerConfig;
use crate::domain::models::{format_timestamp, ChangeNotification};

/// Counters collected across all lanes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Notifications taken off the feed
    pub invocations: usize,
    pub signals: usize,
    pub no_crossover: usize,
    pub not_ready: usize,
    /// Attempts beyond the first
    pub retries: usize,
    /// Attempts that errored or timed out
    pub failures: usize,
    /// Invocations given up after the last attempt
    pub abandoned: usize,
}

impl AddAssign for SchedulerStats {
    fn add_assign(&mut self, other: Self) {
        self.invocations += other.invocations;
        self.signals += other.signals;
        self.no_crossover += other.no_crossover;
        self.not_ready += other.not_ready;
        self.retries += other.retries;
        self.failures += other.failures;
        self.abandoned += other.abandoned;
    }
}

/// One lane per hash bucket of the symbol. A lane runs its invocations one at a
/// time, so evaluations for a symbol never overlap; different symbols proceed in
/// parallel.
pub struct TrendScheduler {
    engine: Arc<dyn TrendDetectionUseCase>,
    config: SchedulerConfig,
}

impl TrendScheduler {
    pub fn new(engine: Arc<dyn TrendDetectionUseCase>, config: SchedulerConfig) -> Self {
        Self { engine, config }
    }

    pub fn lane_for(symbol: &str, lanes: usize) -> usize {
        let mut hasher = DefaultHasher::new();
        symbol.hash(&mut hasher);
        (hasher.finish() % lanes.max(1) as u64) as usize
    }

    /// Consume the feed until every sender is dropped, then return the totals
    pub fn spawn(self, mut feed: mpsc::Receiver<ChangeNotification>) -> JoinHandle<SchedulerStats> {
        let lanes = self.config.lanes.max(1);

        let mut senders = Vec::with_capacity(lanes);
        let mut workers = Vec::with_capacity(lanes);
        for lane in 0..lanes {
            let (tx, rx) = mpsc::channel(self.config.feed_buffer.max(1));
            senders.push(tx);
            workers.push(tokio::spawn(run_lane(
                lane,
                self.engine.clone(),
                self.config.clone(),
                rx,
            )));
        }

        tokio::spawn(async move {
            while let Some(notification) = feed.recv().await {
                let lane = Self::lane_for(notification.symbol(), lanes);
                if senders[lane].send(notification).await.is_err() {
                    log::error!("trend lane {} stopped, notification dropped", lane);
                }
            }
            drop(senders);

            let mut stats = SchedulerStats::default();
            for (lane, worker) in workers.into_iter().enumerate() {
                match worker.await {
                    Ok(lane_stats) => stats += lane_stats,
                    Err(e) => log::error!("trend lane {} panicked: {}", lane, e),
                }
            }

            log::info!("trend scheduler stopped: {:?}", stats);
            stats
        })
    }
}

async fn run_lane(
    lane: usize,
    engine: Arc<dyn TrendDetectionUseCase>,
    config: SchedulerConfig,
    mut rx: mpsc::Receiver<ChangeNotification>,
) -> SchedulerStats {
    let mut stats = SchedulerStats::default();
    log::debug!("trend lane {} started", lane);

    while let Some(notification) = rx.recv().await {
        invoke(engine.as_ref(), &notification, &config, &mut stats).await;
    }

    stats
}

async fn invoke(
    engine: &dyn TrendDetectionUseCase,
    notification: &ChangeNotification,
    config: &SchedulerConfig,
    stats: &mut SchedulerStats,
) {
    stats.invocations += 1;
    let symbol = notification.symbol();
    let timestamp = format_timestamp(notification.record.timestamp());
    let attempts = config.max_attempts.max(1);

    for attempt in 1..=attempts {
        let reason = match timeout(config.invocation_timeout(), engine.evaluate(notification)).await
        {
            Ok(Ok(outcome)) => {
                match outcome {
                    TrendOutcome::Signal(_) => stats.signals += 1,
                    TrendOutcome::NoCrossover { .. } => stats.no_crossover += 1,
                    TrendOutcome::NotReady { .. } => stats.not_ready += 1,
                }
                return;
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {:?}", config.invocation_timeout()),
        };

        stats.failures += 1;
        log::warn!(
            "trend invocation failed symbol={} timestamp={} attempt={}/{} reason={}",
            symbol,
            timestamp,
            attempt,
            attempts,
            reason
        );

        if attempt < attempts {
            stats.retries += 1;
            sleep(backoff(config.retry_backoff(), attempt)).await;
        }
    }

    stats.abandoned += 1;
    log::error!(
        "trend invocation abandoned symbol={} timestamp={} attempts={}",
        symbol,
        timestamp,
        attempts
    );
}

/// Doubles per attempt, capped at 32x the base delay
fn backoff(base: Duration, attempt: usize) -> Duration {
    let exponent = attempt.saturating_sub(1).min(5) as u32;
    base.saturating_mul(2u32.pow(exponent))
}
