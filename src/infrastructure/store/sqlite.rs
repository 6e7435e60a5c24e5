// src/infrastructure/store/sqlite.rs
// SQLite-backed hot store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use rust_decimal::Decimal;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use crate::domain::errors::{StoreError, StoreResult};
use crate::domain::models::{format_timestamp, EnrichedRecord, PriceObservation, RecordKey};
use crate::domain::repository::HotStore;

const COLUMNS: &str = "symbol, timestamp, open, high, low, price, previous_close, volume, \
                       change, change_percent, moving_average, anomaly";

/// Hot store keyed by (symbol, timestamp).
///
/// Decimals are stored as TEXT so they round-trip exactly; timestamps use the
/// fixed-width RFC 3339 form so `ORDER BY timestamp` is chronological.
pub struct SqliteHotStore {
    conn: Mutex<Connection>,
    table: String,
}

impl SqliteHotStore {
    pub fn open(db_path: impl AsRef<Path>, table: &str) -> StoreResult<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| {
                    StoreError::Unavailable(format!(
                        "Failed to create database directory {}: {}",
                        parent.display(),
                        e
                    ))
                })?;
            }
        }

        let conn = Connection::open(db_path.as_ref())?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let store = Self::with_connection(conn, table)?;
        log::info!(
            "SQLite hot store ready at {} (table {})",
            db_path.as_ref().display(),
            store.table
        );
        Ok(store)
    }

    pub fn in_memory(table: &str) -> StoreResult<Self> {
        Self::with_connection(Connection::open_in_memory()?, table)
    }

    fn with_connection(conn: Connection, table: &str) -> StoreResult<Self> {
        if !is_identifier(table) {
            return Err(StoreError::Unavailable(format!(
                "Invalid table name: {:?}",
                table
            )));
        }

        conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {table} (
                    symbol TEXT NOT NULL,
                    timestamp TEXT NOT NULL,
                    open TEXT NOT NULL,
                    high TEXT NOT NULL,
                    low TEXT NOT NULL,
                    price TEXT NOT NULL,
                    previous_close TEXT NOT NULL,
                    volume INTEGER NOT NULL,
                    change TEXT NOT NULL,
                    change_percent TEXT,
                    moving_average TEXT NOT NULL,
                    anomaly INTEGER NOT NULL,
                    PRIMARY KEY (symbol, timestamp)
                )"
            ),
            [],
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
        })
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("connection mutex poisoned".to_string()))
    }
}

pub(crate) fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Row as stored, before decimal parsing
struct RawRow {
    symbol: String,
    timestamp: String,
    open: String,
    high: String,
    low: String,
    price: String,
    previous_close: String,
    volume: i64,
    change: String,
    change_percent: Option<String>,
    moving_average: String,
    anomaly: bool,
}

impl RawRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            symbol: row.get(0)?,
            timestamp: row.get(1)?,
            open: row.get(2)?,
            high: row.get(3)?,
            low: row.get(4)?,
            price: row.get(5)?,
            previous_close: row.get(6)?,
            volume: row.get(7)?,
            change: row.get(8)?,
            change_percent: row.get(9)?,
            moving_average: row.get(10)?,
            anomaly: row.get(11)?,
        })
    }

    fn into_record(self) -> StoreResult<EnrichedRecord> {
        let decimal = |field: &str, text: &str| {
            Decimal::from_str(text)
                .map_err(|e| StoreError::Corrupt(format!("{} {:?}: {}", field, text, e)))
        };

        let timestamp = DateTime::parse_from_rfc3339(&self.timestamp)
            .map_err(|e| StoreError::Corrupt(format!("timestamp {:?}: {}", self.timestamp, e)))?
            .with_timezone(&Utc);

        let volume = u64::try_from(self.volume)
            .map_err(|_| StoreError::Corrupt(format!("volume {}", self.volume)))?;

        let change_percent = match self.change_percent.as_deref() {
            Some(text) => Some(decimal("change_percent", text)?),
            None => None,
        };

        Ok(EnrichedRecord {
            observation: PriceObservation {
                symbol: self.symbol,
                timestamp,
                open: decimal("open", &self.open)?,
                high: decimal("high", &self.high)?,
                low: decimal("low", &self.low)?,
                price: decimal("price", &self.price)?,
                previous_close: decimal("previous_close", &self.previous_close)?,
                volume,
            },
            change: decimal("change", &self.change)?,
            change_percent,
            moving_average: decimal("moving_average", &self.moving_average)?,
            anomaly: self.anomaly,
        })
    }
}

#[async_trait]
impl HotStore for SqliteHotStore {
    async fn put(&self, record: &EnrichedRecord) -> StoreResult<()> {
        let obs = &record.observation;
        let volume = i64::try_from(obs.volume)
            .map_err(|_| StoreError::Database(format!("volume {} exceeds INTEGER", obs.volume)))?;

        let conn = self.lock()?;
        conn.execute(
            &format!(
                "INSERT OR REPLACE INTO {} ({COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                self.table
            ),
            params![
                obs.symbol,
                format_timestamp(obs.timestamp),
                obs.open.to_string(),
                obs.high.to_string(),
                obs.low.to_string(),
                obs.price.to_string(),
                obs.previous_close.to_string(),
                volume,
                record.change.to_string(),
                record.change_percent.map(|p| p.to_string()),
                record.moving_average.to_string(),
                record.anomaly,
            ],
        )?;

        Ok(())
    }

    async fn get(&self, key: &RecordKey) -> StoreResult<Option<EnrichedRecord>> {
        let raw = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM {} WHERE symbol = ?1 AND timestamp = ?2",
                self.table
            ))?;
            let mut rows = stmt.query_map(
                params![key.symbol, key.timestamp_text()],
                RawRow::from_row,
            )?;
            let first = rows.next().transpose()?;
            first
        };

        raw.map(RawRow::into_record).transpose()
    }

    async fn recent(
        &self,
        symbol: &str,
        until: DateTime<Utc>,
        limit: usize,
    ) -> StoreResult<Vec<EnrichedRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let raw_rows = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {COLUMNS} FROM {}
                 WHERE symbol = ?1 AND timestamp <= ?2
                 ORDER BY timestamp DESC
                 LIMIT ?3",
                self.table
            ))?;
            let rows = stmt.query_map(
                params![symbol, format_timestamp(until), limit],
                RawRow::from_row,
            )?;
            let collected = rows.collect::<rusqlite::Result<Vec<_>>>()?;
            collected
        };

        raw_rows.into_iter().map(RawRow::into_record).collect()
    }

    async fn count(&self, symbol: &str) -> StoreResult<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {} WHERE symbol = ?1", self.table),
            params![symbol],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::fixtures::{record, ts};
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_sqlite_round_trips_decimals_and_null_percent() {
        let dir = tempdir().unwrap();
        let store = SqliteHotStore::open(dir.path().join("hot.db"), "price_records").unwrap();

        let mut row = record("AAPL", 0, dec!(101.123456789));
        row.change_percent = None;
        row.anomaly = true;
        store.put(&row).await.unwrap();

        let loaded = store.get(&row.key()).await.unwrap();
        assert_eq!(loaded, Some(row));
    }

    #[tokio::test]
    async fn test_sqlite_recent_orders_newest_first() {
        let store = SqliteHotStore::in_memory("price_records").unwrap();
        for minute in 0..30 {
            store.put(&record("AAPL", minute, Decimal::from(minute))).await.unwrap();
        }
        store.put(&record("MSFT", 5, dec!(1))).await.unwrap();

        let rows = store.recent("AAPL", ts(25), 21).await.unwrap();
        assert_eq!(rows.len(), 21);
        assert_eq!(rows[0].price(), dec!(25));
        assert_eq!(rows[20].price(), dec!(5));
    }

    #[tokio::test]
    async fn test_sqlite_duplicate_write_keeps_one_row() {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("hot.db");
        let store = SqliteHotStore::open(&db_path, "price_records").unwrap();

        let row = record("AAPL", 3, dec!(10));
        store.put(&row).await.unwrap();
        store.put(&row).await.unwrap();

        let conn = Connection::open(&db_path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM price_records", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
        assert_eq!(store.count("AAPL").await.unwrap(), 1);
    }

    #[test]
    fn test_table_name_validation() {
        assert!(is_identifier("price_records"));
        assert!(!is_identifier("records; DROP TABLE x"));
        assert!(!is_identifier("1records"));
        assert!(SqliteHotStore::in_memory("bad name").is_err());
    }
}
