// src/application/usecase/alert_usecase.rs
// Crossover signal -> fan-out notification

use std::sync::Arc;

use crate::domain::errors::AlertResult;
use crate::domain::models::{format_timestamp, CrossoverSignal, Direction, EnrichedRecord, Severity};
use crate::domain::service::AlertChannel;

/// Stateless; publishing the same signal twice publishes twice.
pub struct AlertDispatcher {
    channel: Arc<dyn AlertChannel>,
}

impl AlertDispatcher {
    pub fn new(channel: Arc<dyn AlertChannel>) -> Self {
        Self { channel }
    }

    /// Deterministic message body, identical for identical signals
    pub fn format_signal(signal: &CrossoverSignal) -> String {
        let (trend, relation) = match signal.direction {
            Direction::Up => ("an uptrend", "above"),
            Direction::Down => ("a downtrend", "below"),
        };

        format!(
            "{} entering {}: short SMA {} crossed {} long SMA {} at {}",
            signal.symbol,
            trend,
            signal.short_average.normalize(),
            relation,
            signal.long_average.normalize(),
            format_timestamp(signal.timestamp)
        )
    }

    pub fn format_anomaly(record: &EnrichedRecord) -> Option<String> {
        let percent = record.change_percent?;
        Some(format!(
            "{} moved {}% against previous close {} at {}",
            record.symbol(),
            percent.round_dp(2).normalize(),
            record.observation.previous_close.normalize(),
            format_timestamp(record.timestamp())
        ))
    }

    pub async fn dispatch(&self, signal: &CrossoverSignal) -> AlertResult<()> {
        let message = Self::format_signal(signal);
        self.channel.publish(&message, Severity::Alert).await?;

        log::info!(
            "signal dispatched symbol={} timestamp={} direction={} channel={}",
            signal.symbol,
            format_timestamp(signal.timestamp),
            signal.direction,
            self.channel.channel_type()
        );
        Ok(())
    }

    /// INFO notification for an anomalous record; no-op for other records
    pub async fn dispatch_anomaly(&self, record: &EnrichedRecord) -> AlertResult<()> {
        if !record.anomaly {
            return Ok(());
        }
        match Self::format_anomaly(record) {
            Some(message) => self.channel.publish(&message, Severity::Info).await,
            None => Ok(()),
        }
    }
}
