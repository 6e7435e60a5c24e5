// src/domain/models.rs
use chrono::{DateTime, SecondsFormat, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Raw price observation as published on the partitioned stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub price: Decimal,
    pub previous_close: Decimal,
    pub volume: u64,
}

impl PriceObservation {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(&self.symbol, self.timestamp)
    }
}

/// Observation plus the derived fields computed by the enricher.
///
/// Serialized flat, so a hot store row carries every observation field next to
/// the derived ones.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub observation: PriceObservation,
    pub change: Decimal,
    pub change_percent: Option<Decimal>,
    pub moving_average: Decimal,
    pub anomaly: bool,
}

impl EnrichedRecord {
    pub fn symbol(&self) -> &str {
        &self.observation.symbol
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.observation.timestamp
    }

    pub fn price(&self) -> Decimal {
        self.observation.price
    }

    pub fn key(&self) -> RecordKey {
        self.observation.key()
    }
}

/// Idempotency key shared by every downstream write: (symbol, timestamp)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
}

impl RecordKey {
    pub fn new(symbol: &str, timestamp: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            timestamp,
        }
    }

    /// Fixed-width RFC 3339 rendering; lexical order matches chronological order.
    pub fn timestamp_text(&self) -> String {
        format_timestamp(self.timestamp)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}@{}", self.symbol, self.timestamp_text())
    }
}

pub fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

/// Most recent records of one symbol, ascending by timestamp, no duplicate timestamps.
///
/// Rebuilt from the hot store on every evaluation and dropped afterwards.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    pub symbol: String,
    records: Vec<EnrichedRecord>,
}

impl RollingWindow {
    /// Build a window from rows returned newest-first by a range query.
    pub fn from_descending(symbol: &str, mut rows: Vec<EnrichedRecord>, capacity: usize) -> Self {
        rows.reverse();
        Self::from_ascending(symbol, rows, capacity)
    }

    pub fn from_ascending(symbol: &str, rows: Vec<EnrichedRecord>, capacity: usize) -> Self {
        let mut records: Vec<EnrichedRecord> = Vec::with_capacity(rows.len());
        for row in rows {
            if row.symbol() != symbol {
                continue;
            }
            match records.last() {
                Some(last) if last.timestamp() == row.timestamp() => {
                    let idx = records.len() - 1;
                    records[idx] = row;
                }
                Some(last) if last.timestamp() > row.timestamp() => {
                    // Keep ascending order even if the source misbehaves.
                    let pos = records.partition_point(|r| r.timestamp() < row.timestamp());
                    if records[pos].timestamp() == row.timestamp() {
                        records[pos] = row;
                    } else {
                        records.insert(pos, row);
                    }
                }
                _ => records.push(row),
            }
        }

        if records.len() > capacity {
            let excess = records.len() - capacity;
            records.drain(0..excess);
        }

        Self {
            symbol: symbol.to_string(),
            records,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[EnrichedRecord] {
        &self.records
    }

    pub fn latest(&self) -> Option<&EnrichedRecord> {
        self.records.last()
    }

    pub fn prices(&self) -> Vec<Decimal> {
        self.records.iter().map(|r| r.price()).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    Up,
    Down,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Short/long moving average crossover for one symbol at one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossoverSignal {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub direction: Direction,
    pub short_average: Decimal,
    pub long_average: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Alert,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "INFO"),
            Severity::Alert => write!(f, "ALERT"),
        }
    }
}

/// Emitted by the hot store once a row is durably committed
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeNotification {
    pub record: EnrichedRecord,
}

impl ChangeNotification {
    pub fn new(record: EnrichedRecord) -> Self {
        Self { record }
    }

    pub fn symbol(&self) -> &str {
        self.record.symbol()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use chrono::TimeZone;

    pub fn ts(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 14, 0, 0).unwrap()
            + chrono::Duration::minutes(minute as i64)
    }

    pub fn observation(symbol: &str, minute: u32, price: Decimal) -> PriceObservation {
        PriceObservation {
            symbol: symbol.to_string(),
            timestamp: ts(minute),
            open: price,
            high: price,
            low: price,
            price,
            previous_close: price,
            volume: 1_000,
        }
    }

    pub fn record(symbol: &str, minute: u32, price: Decimal) -> EnrichedRecord {
        EnrichedRecord {
            observation: observation(symbol, minute, price),
            change: Decimal::ZERO,
            change_percent: Some(Decimal::ZERO),
            moving_average: price,
            anomaly: false,
        }
    }
}
