// src/application/usecase/trend_detection_usecase.rs
// Short/long SMA crossover detection over a window rebuilt from the hot store

use async_trait::async_trait;
use rust_decimal::Decimal;
use std::sync::Arc;

use crate::analysis::indicators;
use crate::application::usecase::alert_usecase::AlertDispatcher;
use crate::domain::errors::{TrendError, TrendResult};
use crate::domain::models::{
    format_timestamp, ChangeNotification, CrossoverSignal, Direction, RollingWindow,
};
use crate::domain::repository::HotStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrendSettings {
    pub short_window: usize,
    pub long_window: usize,
    /// Records in the rolling window (N)
    pub lookback: usize,
    /// Minimum records before any evaluation happens
    pub min_history: usize,
}

impl TrendSettings {
    pub fn new(
        short_window: usize,
        long_window: usize,
        lookback: usize,
        min_history: usize,
    ) -> TrendResult<Self> {
        if short_window == 0 {
            return Err(TrendError::InvalidSettings(
                "short window must be at least 1".to_string(),
            ));
        }
        if short_window >= long_window {
            return Err(TrendError::InvalidSettings(format!(
                "short window ({}) must be smaller than long window ({})",
                short_window, long_window
            )));
        }
        if lookback < long_window {
            return Err(TrendError::InvalidSettings(format!(
                "lookback ({}) must cover the long window ({})",
                lookback, long_window
            )));
        }
        if min_history < long_window {
            return Err(TrendError::InvalidSettings(format!(
                "minimum history ({}) must cover the long window ({})",
                min_history, long_window
            )));
        }
        if min_history > lookback {
            return Err(TrendError::InvalidSettings(format!(
                "minimum history ({}) cannot exceed lookback ({})",
                min_history, lookback
            )));
        }

        Ok(Self {
            short_window,
            long_window,
            lookback,
            min_history,
        })
    }

    /// Window length below which the engine reports `NotReady`
    pub fn required_history(&self) -> usize {
        self.min_history.max(self.long_window)
    }
}

impl Default for TrendSettings {
    fn default() -> Self {
        Self {
            short_window: 5,
            long_window: 20,
            lookback: 20,
            min_history: 20,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TrendOutcome {
    /// Not enough history yet; expected, not a failure
    NotReady { available: usize, required: usize },
    NoCrossover {
        short_average: Decimal,
        long_average: Decimal,
    },
    Signal(CrossoverSignal),
}

impl TrendOutcome {
    pub fn signal(&self) -> Option<&CrossoverSignal> {
        match self {
            TrendOutcome::Signal(signal) => Some(signal),
            _ => None,
        }
    }
}

/// Strict sign change of (short - long) between two evaluations.
/// Touching zero never fires by itself.
pub fn classify_crossover(previous: Decimal, current: Decimal) -> Option<Direction> {
    if previous <= Decimal::ZERO && current > Decimal::ZERO {
        Some(Direction::Up)
    } else if previous >= Decimal::ZERO && current < Decimal::ZERO {
        Some(Direction::Down)
    } else {
        None
    }
}

/// One invocation per confirmed hot-store write
#[async_trait]
pub trait TrendDetectionUseCase: Send + Sync {
    async fn evaluate(&self, notification: &ChangeNotification) -> TrendResult<TrendOutcome>;
}

/// Keeps no state between invocations. Every evaluation rebuilds its window from
/// the hot store, bounded above by the triggering record, so redelivering a
/// notification reproduces the same decision.
pub struct TrendDetectionEngine {
    store: Arc<dyn HotStore>,
    dispatcher: Arc<AlertDispatcher>,
    settings: TrendSettings,
}

impl TrendDetectionEngine {
    pub fn new(
        store: Arc<dyn HotStore>,
        dispatcher: Arc<AlertDispatcher>,
        settings: TrendSettings,
    ) -> Self {
        Self {
            store,
            dispatcher,
            settings,
        }
    }

    pub fn settings(&self) -> &TrendSettings {
        &self.settings
    }

    /// Current window plus the window one record earlier
    async fn reconstruct(
        &self,
        notification: &ChangeNotification,
    ) -> TrendResult<(RollingWindow, RollingWindow)> {
        let trigger = &notification.record;
        let symbol = trigger.symbol();
        let lookback = self.settings.lookback;

        // One extra row so the prior evaluation also sees a full window.
        let mut rows = self
            .store
            .recent(symbol, trigger.timestamp(), lookback + 1)
            .await?;

        if rows.first().map(|r| r.timestamp()) != Some(trigger.timestamp()) {
            log::debug!(
                "trigger row not visible yet, using notification copy symbol={} timestamp={}",
                symbol,
                format_timestamp(trigger.timestamp())
            );
            rows.insert(0, trigger.clone());
            rows.truncate(lookback + 1);
        }

        let previous_rows = rows.iter().skip(1).cloned().collect();
        let current = RollingWindow::from_descending(symbol, rows, lookback);
        let previous = RollingWindow::from_descending(symbol, previous_rows, lookback);
        Ok((current, previous))
    }
}

#[async_trait]
impl TrendDetectionUseCase for TrendDetectionEngine {
    async fn evaluate(&self, notification: &ChangeNotification) -> TrendResult<TrendOutcome> {
        let symbol = notification.symbol();
        let timestamp = notification.record.timestamp();
        let (current, previous) = self.reconstruct(notification).await?;

        let required = self.settings.required_history();
        if current.len() < required {
            log::info!(
                "trend not ready symbol={} timestamp={} available={} required={}",
                symbol,
                format_timestamp(timestamp),
                current.len(),
                required
            );
            return Ok(TrendOutcome::NotReady {
                available: current.len(),
                required,
            });
        }

        let short = self.settings.short_window;
        let long = self.settings.long_window;
        let (short_average, long_average, current_spread) =
            indicators::sma_spread(&current.prices(), short, long)?;

        // At the window-fill point the prior window is short; no order was established.
        let previous_spread = if previous.len() >= long {
            indicators::sma_spread(&previous.prices(), short, long)?.2
        } else {
            Decimal::ZERO
        };

        let direction = match classify_crossover(previous_spread, current_spread) {
            Some(direction) => direction,
            None => {
                log::debug!(
                    "no crossover symbol={} timestamp={} previous_spread={} spread={}",
                    symbol,
                    format_timestamp(timestamp),
                    previous_spread,
                    current_spread
                );
                return Ok(TrendOutcome::NoCrossover {
                    short_average,
                    long_average,
                });
            }
        };

        let signal = CrossoverSignal {
            symbol: symbol.to_string(),
            timestamp,
            direction,
            short_average,
            long_average,
        };

        log::info!(
            "crossover detected symbol={} timestamp={} direction={} short={} long={}",
            signal.symbol,
            format_timestamp(signal.timestamp),
            signal.direction,
            signal.short_average,
            signal.long_average
        );

        self.dispatcher.dispatch(&signal).await?;
        Ok(TrendOutcome::Signal(signal))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::errors::{AlertError, AlertResult};
    use crate::domain::models::fixtures::record;
    use crate::domain::models::Severity;
    use crate::domain::service::AlertChannel;
    use crate::infrastructure::alert::BroadcastAlertChannel;
    use crate::infrastructure::store::InMemoryHotStore;
    use rust_decimal_macros::dec;

    struct Harness {
        store: Arc<InMemoryHotStore>,
        channel: Arc<BroadcastAlertChannel>,
        engine: TrendDetectionEngine,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryHotStore::new());
        let channel = Arc::new(BroadcastAlertChannel::new(64));
        let engine = TrendDetectionEngine::new(
            store.clone(),
            Arc::new(AlertDispatcher::new(channel.clone())),
            TrendSettings::default(),
        );
        Harness {
            store,
            channel,
            engine,
        }
    }

    /// Write prices at consecutive minutes; return one notification per write
    async fn seed(store: &InMemoryHotStore, prices: &[Decimal]) -> Vec<ChangeNotification> {
        let mut notifications = Vec::new();
        for (minute, price) in prices.iter().enumerate() {
            let row = record("AAPL", minute as u32, *price);
            store.put(&row).await.unwrap();
            notifications.push(ChangeNotification::new(row));
        }
        notifications
    }

    fn rising(n: usize) -> Vec<Decimal> {
        (0..n).map(|i| Decimal::from(100 + i)).collect()
    }

    struct FailingChannel;

    #[async_trait]
    impl AlertChannel for FailingChannel {
        async fn publish(&self, _message: &str, _severity: Severity) -> AlertResult<()> {
            Err(AlertError::Publish("fan-out unavailable".to_string()))
        }

        fn channel_type(&self) -> &'static str {
            "failing"
        }
    }

    #[test]
    fn test_spread_sequence_fires_one_up_at_strict_crossing() {
        let spreads = [dec!(-1), dec!(-0.5), dec!(0), dec!(0.3), dec!(0.2)];
        let fired: Vec<_> = spreads
            .windows(2)
            .enumerate()
            .filter_map(|(i, pair)| classify_crossover(pair[0], pair[1]).map(|d| (i + 1, d)))
            .collect();

        assert_eq!(fired, vec![(3, Direction::Up)]);
    }

    #[test]
    fn test_touching_and_equality_do_not_fire() {
        assert_eq!(classify_crossover(dec!(-1), dec!(0)), None);
        assert_eq!(classify_crossover(dec!(1), dec!(0)), None);
        assert_eq!(classify_crossover(dec!(0), dec!(0)), None);
        assert_eq!(classify_crossover(dec!(0), dec!(-0.1)), Some(Direction::Down));
        assert_eq!(classify_crossover(dec!(0.5), dec!(-0.5)), Some(Direction::Down));
    }

    #[test]
    fn test_settings_validation() {
        assert!(TrendSettings::new(5, 20, 20, 20).is_ok());
        assert!(TrendSettings::new(0, 20, 20, 20).is_err());
        assert!(TrendSettings::new(20, 5, 20, 20).is_err());
        assert!(TrendSettings::new(5, 20, 19, 20).is_err());
        assert!(TrendSettings::new(5, 20, 20, 10).is_err());
        assert!(matches!(
            TrendSettings::new(5, 20, 20, 25),
            Err(TrendError::InvalidSettings(_))
        ));
        assert_eq!(TrendSettings::new(5, 20, 30, 25).unwrap().required_history(), 25);
    }

    #[tokio::test]
    async fn test_not_ready_below_long_window() {
        let h = harness();
        let mut alerts = h.channel.subscribe_deduped(16);
        let notifications = seed(&h.store, &rising(19)).await;

        for notification in &notifications {
            let outcome = h.engine.evaluate(notification).await.unwrap();
            assert!(matches!(outcome, TrendOutcome::NotReady { required: 20, .. }));
        }
        assert!(alerts.drain().is_empty());
    }

    #[tokio::test]
    async fn test_up_signal_at_window_fill() {
        let h = harness();
        let notifications = seed(&h.store, &rising(20)).await;

        let outcome = h.engine.evaluate(&notifications[19]).await.unwrap();
        let signal = outcome.signal().expect("signal at window fill");

        assert_eq!(signal.direction, Direction::Up);
        assert_eq!(signal.short_average, dec!(117));
        assert_eq!(signal.long_average, dec!(109.5));
    }

    #[tokio::test]
    async fn test_redelivery_is_observed_once_downstream() {
        let h = harness();
        let mut alerts = h.channel.subscribe_deduped(16);
        let notifications = seed(&h.store, &rising(20)).await;

        let first = h.engine.evaluate(&notifications[19]).await.unwrap();
        let second = h.engine.evaluate(&notifications[19]).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(alerts.drain().len(), 1);
        assert_eq!(alerts.duplicates(), 1);
    }

    #[tokio::test]
    async fn test_unchanged_trend_never_refires() {
        let h = harness();
        let mut alerts = h.channel.subscribe_deduped(16);
        let notifications = seed(&h.store, &rising(25)).await;

        for notification in &notifications[20..] {
            for _ in 0..2 {
                let outcome = h.engine.evaluate(notification).await.unwrap();
                assert!(matches!(outcome, TrendOutcome::NoCrossover { .. }));
            }
        }
        assert!(alerts.drain().is_empty());
    }

    #[tokio::test]
    async fn test_late_redelivery_reproduces_original_decision() {
        let h = harness();
        let notifications = seed(&h.store, &rising(26)).await;

        // Redelivered after five newer rows were written.
        let replay = h.engine.evaluate(&notifications[19]).await.unwrap();
        assert_eq!(replay.signal().map(|s| s.direction), Some(Direction::Up));

        let replay = h.engine.evaluate(&notifications[22]).await.unwrap();
        assert!(replay.signal().is_none());
    }

    #[tokio::test]
    async fn test_trigger_missing_from_store_is_merged() {
        let h = harness();
        let prices = rising(20);
        seed(&h.store, &prices[..19]).await;

        let unseen = ChangeNotification::new(record("AAPL", 19, prices[19]));
        let outcome = h.engine.evaluate(&unseen).await.unwrap();

        assert_eq!(outcome.signal().map(|s| s.direction), Some(Direction::Up));
    }

    #[tokio::test]
    async fn test_store_failure_propagates() {
        let h = harness();
        let notifications = seed(&h.store, &rising(20)).await;
        h.store.set_fail_reads(true);

        assert!(matches!(
            h.engine.evaluate(&notifications[19]).await,
            Err(TrendError::Store(_))
        ));
    }

    #[tokio::test]
    async fn test_dispatch_failure_fails_the_invocation() {
        let store = Arc::new(InMemoryHotStore::new());
        let engine = TrendDetectionEngine::new(
            store.clone(),
            Arc::new(AlertDispatcher::new(Arc::new(FailingChannel))),
            TrendSettings::default(),
        );
        let notifications = seed(&store, &rising(20)).await;

        assert!(matches!(
            engine.evaluate(&notifications[19]).await,
            Err(TrendError::Dispatch(_))
        ));
        // No crossover means no dispatch, so the same channel is harmless.
        assert!(engine.evaluate(&notifications[10]).await.is_ok());
    }
}
