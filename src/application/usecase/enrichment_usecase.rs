// src/application/usecase/enrichment_usecase.rs
// Raw observation -> enriched record

use rust_decimal::Decimal;

use crate::analysis::indicators;
use crate::application::dto::{parse_observation, peek_identity};
use crate::domain::errors::{EnrichmentError, EnrichmentResult};
use crate::domain::models::{EnrichedRecord, PriceObservation};

/// A payload the enricher refused, with enough context to find it again
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    /// Position of the payload inside its batch
    pub position: usize,
    pub symbol: Option<String>,
    pub timestamp: Option<String>,
    pub reason: EnrichmentError,
}

#[derive(Debug, Default)]
pub struct EnrichedBatch {
    /// Enriched records, in stream order
    pub records: Vec<EnrichedRecord>,
    pub rejections: Vec<Rejection>,
}

/// Stateless enricher; the only knob is the anomaly threshold.
#[derive(Debug, Clone)]
pub struct RecordEnricher {
    anomaly_threshold: Decimal,
}

impl RecordEnricher {
    pub fn new(anomaly_threshold: Decimal) -> Self {
        Self { anomaly_threshold }
    }

    pub fn anomaly_threshold(&self) -> Decimal {
        self.anomaly_threshold
    }

    /// Derive change, change percent, OHLC mean and the anomaly flag
    pub fn enrich(&self, observation: PriceObservation) -> EnrichmentResult<EnrichedRecord> {
        let change = observation
            .price
            .checked_sub(observation.previous_close)
            .ok_or_else(|| EnrichmentError::Overflow("change".to_string()))?;

        let change_percent = if observation.previous_close.is_zero() {
            None
        } else {
            let percent = change
                .checked_div(observation.previous_close)
                .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
                .ok_or_else(|| EnrichmentError::Overflow("change_percent".to_string()))?;
            Some(percent)
        };

        // Mean of open/high/low/price, not of the close alone.
        let moving_average = indicators::mean(&[
            observation.open,
            observation.high,
            observation.low,
            observation.price,
        ])
        .ok_or_else(|| EnrichmentError::Overflow("moving_average".to_string()))?;

        let anomaly = change_percent
            .map(|pct| pct.abs() > self.anomaly_threshold)
            .unwrap_or(false);

        Ok(EnrichedRecord {
            observation,
            change,
            change_percent,
            moving_average,
            anomaly,
        })
    }

    /// Enrich a batch of raw payloads. Bad payloads are rejected one by one.
    pub fn enrich_batch<S: AsRef<str>>(&self, payloads: &[S]) -> EnrichedBatch {
        let mut batch = EnrichedBatch::default();

        for (position, payload) in payloads.iter().enumerate() {
            let payload = payload.as_ref();
            match parse_observation(payload).and_then(|obs| self.enrich(obs)) {
                Ok(record) => batch.records.push(record),
                Err(reason) => {
                    let (symbol, timestamp) = peek_identity(payload);
                    log::warn!(
                        "rejected record position={} symbol={} timestamp={} reason={}",
                        position,
                        symbol.as_deref().unwrap_or("-"),
                        timestamp.as_deref().unwrap_or("-"),
                        reason
                    );
                    batch.rejections.push(Rejection {
                        position,
                        symbol,
                        timestamp,
                        reason,
                    });
                }
            }
        }

        log::debug!(
            "enriched batch: {} records, {} rejections",
            batch.records.len(),
            batch.rejections.len()
        );
        batch
    }
}

impl Default for RecordEnricher {
    fn default() -> Self {
        Self::new(Decimal::new(5, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::fixtures::observation;
    use rust_decimal_macros::dec;

    fn quote(price: Decimal, previous_close: Decimal) -> PriceObservation {
        PriceObservation {
            price,
            previous_close,
            ..observation("AAPL", 0, price)
        }
    }

    #[test]
    fn test_derived_fields() {
        let obs = PriceObservation {
            open: dec!(100),
            high: dec!(106),
            low: dec!(99),
            price: dec!(105),
            previous_close: dec!(100),
            ..observation("AAPL", 0, dec!(105))
        };
        let record = RecordEnricher::default().enrich(obs).unwrap();

        assert_eq!(record.change, dec!(5));
        assert_eq!(record.change_percent, Some(dec!(5)));
        assert_eq!(record.moving_average, dec!(102.5));
        assert!(!record.anomaly);
    }

    #[test]
    fn test_zero_previous_close_yields_null_percent() {
        let record = RecordEnricher::default()
            .enrich(quote(dec!(12.34), Decimal::ZERO))
            .unwrap();

        assert_eq!(record.change, dec!(12.34));
        assert_eq!(record.change_percent, None);
        assert!(!record.anomaly);
    }

    #[test]
    fn test_anomaly_threshold_is_strict() {
        let enricher = RecordEnricher::default();
        let flag = |price| enricher.enrich(quote(price, dec!(100))).unwrap().anomaly;

        assert!(!flag(dec!(104.999)));
        assert!(!flag(dec!(105)));
        assert!(flag(dec!(105.001)));
        assert!(!flag(dec!(95)));
        assert!(flag(dec!(94.999)));
    }

    #[test]
    fn test_custom_threshold() {
        let enricher = RecordEnricher::new(dec!(1.5));
        assert!(enricher.enrich(quote(dec!(102), dec!(100))).unwrap().anomaly);
    }

    #[test]
    fn test_partial_batch_success() {
        let payloads = vec![
            r#"{"symbol":"AAPL","timestamp":"2024-03-01T14:00:00Z","open":1,"high":1,"low":1,"price":1,"previous_close":1,"volume":10}"#,
            r#"{"symbol":"AAPL","timestamp":"2024-03-01T14:01:00Z","open":1,"high":1,"low":1,"price":"abc","previous_close":1,"volume":10}"#,
            r#"{"symbol":"AAPL","timestamp":"2024-03-01T14:02:00Z","open":1,"high":1,"low":1,"price":2,"previous_close":1,"volume":10}"#,
        ];
        let batch = RecordEnricher::default().enrich_batch(&payloads);

        assert_eq!(batch.records.len(), 2);
        assert_eq!(batch.rejections.len(), 1);
        assert_eq!(batch.rejections[0].position, 1);
        assert_eq!(batch.rejections[0].symbol.as_deref(), Some("AAPL"));
        assert_eq!(batch.records[1].price(), dec!(2));
    }
}
