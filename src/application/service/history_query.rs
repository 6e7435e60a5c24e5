// src/application/service/history_query.rs
// Read-only SQL over archived observations

use rusqlite::types::ValueRef;
use rusqlite::{params, Connection, ToSql};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde_json::Value;
use std::str::FromStr;
use std::sync::{Mutex, MutexGuard};

use crate::application::usecase::RecordEnricher;
use crate::domain::errors::{QueryError, QueryResult};
use crate::domain::models::format_timestamp;
use crate::domain::repository::ColdArchive;

/// Schema catalog for the archive. Prices are REAL here; the archive keeps the exact text.
/// `change_percent` is the enricher's exact decimal, as TEXT, NULL without a previous close.
pub const OBSERVATIONS_DDL: &str = "CREATE TABLE observations (
    symbol TEXT NOT NULL,
    timestamp TEXT NOT NULL,
    open REAL NOT NULL,
    high REAL NOT NULL,
    low REAL NOT NULL,
    price REAL NOT NULL,
    previous_close REAL NOT NULL,
    volume INTEGER NOT NULL,
    change_percent TEXT,
    PRIMARY KEY (symbol, timestamp)
)";

/// Ordered (column, value) pairs
pub type QueryRow = Vec<(String, Value)>;

#[derive(Debug, Clone, PartialEq)]
pub enum CanonicalQuery {
    /// Unrestricted sample, ordered by key
    Sample { limit: usize },
    /// Largest absolute price delta against previous close
    TopMovers { limit: usize },
    /// Mean volume per symbol
    AverageVolume,
    /// Observations whose |percent change| exceeds the threshold, compared in decimal
    AnomalousMoves { threshold: Decimal },
}

impl CanonicalQuery {
    pub fn sql(&self) -> &'static str {
        match self {
            CanonicalQuery::Sample { .. } => {
                "SELECT * FROM observations ORDER BY symbol, timestamp LIMIT ?1"
            }
            CanonicalQuery::TopMovers { .. } => {
                "SELECT symbol, timestamp, price, previous_close,
                        price - previous_close AS delta
                 FROM observations
                 ORDER BY ABS(price - previous_close) DESC, symbol, timestamp
                 LIMIT ?1"
            }
            CanonicalQuery::AverageVolume => {
                "SELECT symbol, AVG(volume) AS average_volume, COUNT(*) AS observations
                 FROM observations
                 GROUP BY symbol
                 ORDER BY symbol"
            }
            CanonicalQuery::AnomalousMoves { .. } => {
                "SELECT symbol, timestamp, price, previous_close, change_percent
                 FROM observations
                 WHERE change_percent IS NOT NULL
                 ORDER BY symbol, timestamp"
            }
        }
    }
}

pub struct HistoryQueryService {
    conn: Mutex<Connection>,
    loaded: usize,
}

impl HistoryQueryService {
    /// Snapshot the archive into an in-memory catalog and lock it against writes
    pub async fn load(archive: &dyn ColdArchive) -> QueryResult<Self> {
        let observations = archive.list(None).await?;

        // Same percent change the pipeline computed; the threshold plays no part here.
        let enricher = RecordEnricher::default();

        let conn = Connection::open_in_memory()?;
        conn.execute(OBSERVATIONS_DDL, [])?;
        {
            let mut insert = conn.prepare(
                "INSERT OR REPLACE INTO observations
                 (symbol, timestamp, open, high, low, price, previous_close, volume, change_percent)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for obs in &observations {
                let volume = i64::try_from(obs.volume).map_err(|_| {
                    QueryError::Database(format!("volume {} exceeds INTEGER", obs.volume))
                })?;
                let change_percent = enricher
                    .enrich(obs.clone())
                    .map_err(|e| QueryError::Database(format!("{}: {}", obs.key(), e)))?
                    .change_percent;
                insert.execute(params![
                    obs.symbol,
                    format_timestamp(obs.timestamp),
                    real("open", obs.open)?,
                    real("high", obs.high)?,
                    real("low", obs.low)?,
                    real("price", obs.price)?,
                    real("previous_close", obs.previous_close)?,
                    volume,
                    change_percent.map(|pct| pct.normalize().to_string()),
                ])?;
            }
        }
        conn.pragma_update(None, "query_only", true)?;

        log::info!("history query surface loaded {} observations", observations.len());
        Ok(Self {
            conn: Mutex::new(conn),
            loaded: observations.len(),
        })
    }

    pub fn loaded(&self) -> usize {
        self.loaded
    }

    pub fn canonical(&self, query: &CanonicalQuery) -> QueryResult<Vec<QueryRow>> {
        match query {
            CanonicalQuery::Sample { limit } | CanonicalQuery::TopMovers { limit } => {
                let limit = i64::try_from(*limit).unwrap_or(i64::MAX);
                self.select(query.sql(), &[&limit])
            }
            CanonicalQuery::AverageVolume => self.select(query.sql(), &[]),
            CanonicalQuery::AnomalousMoves { threshold } => {
                let rows = self.select(query.sql(), &[])?;
                Ok(rows
                    .into_iter()
                    .filter(|row| exceeds(row, *threshold))
                    .collect())
            }
        }
    }

    /// Ad-hoc SQL; anything other than a single read-only statement is refused
    pub fn run_sql(&self, sql: &str) -> QueryResult<Vec<QueryRow>> {
        if sql.trim_start().to_ascii_uppercase().starts_with("PRAGMA") {
            return Err(QueryError::ReadOnly(sql.to_string()));
        }
        self.select(sql, &[])
    }

    fn select(&self, sql: &str, args: &[&dyn ToSql]) -> QueryResult<Vec<QueryRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(sql)?;
        if !stmt.readonly() {
            return Err(QueryError::ReadOnly(sql.to_string()));
        }

        let columns: Vec<String> = stmt.column_names().iter().map(|c| c.to_string()).collect();
        let mut rows = stmt.query(args)?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for (idx, name) in columns.iter().enumerate() {
                values.push((name.clone(), json_value(row.get_ref(idx)?)));
            }
            out.push(values);
        }
        Ok(out)
    }

    fn lock(&self) -> QueryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| QueryError::Database("connection mutex poisoned".to_string()))
    }
}

fn real(field: &str, value: Decimal) -> QueryResult<f64> {
    value
        .to_f64()
        .ok_or_else(|| QueryError::Database(format!("{} {} is not representable", field, value)))
}

/// Strict `|change_percent| > threshold` on the exact TEXT column
fn exceeds(row: &QueryRow, threshold: Decimal) -> bool {
    row.iter()
        .find(|(name, _)| name == "change_percent")
        .and_then(|(_, value)| value.as_str())
        .and_then(|text| Decimal::from_str(text).ok())
        .map_or(false, |pct| pct.abs() > threshold)
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        ValueRef::Text(t) | ValueRef::Blob(t) => {
            Value::String(String::from_utf8_lossy(t).into_owned())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::fixtures::observation;
    use crate::infrastructure::archive::InMemoryArchive;
    use rust_decimal_macros::dec;

    async fn service() -> HistoryQueryService {
        let archive = InMemoryArchive::new();

        let mut calm = observation("AAPL", 0, dec!(101));
        calm.previous_close = dec!(100);
        calm.volume = 1_000;

        let mut jump = observation("AAPL", 1, dec!(107));
        jump.previous_close = dec!(100);
        jump.volume = 3_000;

        let mut edge = observation("MSFT", 0, dec!(105));
        edge.previous_close = dec!(100);
        edge.volume = 500;

        let mut unpriced = observation("NEWCO", 0, dec!(10));
        unpriced.previous_close = Decimal::ZERO;

        for obs in [&calm, &jump, &edge, &unpriced] {
            archive.put(obs).await.unwrap();
        }
        HistoryQueryService::load(&archive).await.unwrap()
    }

    fn text<'a>(row: &'a QueryRow, column: &str) -> Option<&'a str> {
        row.iter()
            .find(|(name, _)| name == column)
            .and_then(|(_, value)| value.as_str())
    }

    #[tokio::test]
    async fn test_sample_is_limited_and_ordered() {
        let svc = service().await;
        assert_eq!(svc.loaded(), 4);

        let rows = svc.canonical(&CanonicalQuery::Sample { limit: 2 }).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(text(&rows[0], "symbol"), Some("AAPL"));
        assert_eq!(rows[0][0].0, "symbol");
    }

    #[tokio::test]
    async fn test_top_movers_by_absolute_delta() {
        let svc = service().await;
        let rows = svc.canonical(&CanonicalQuery::TopMovers { limit: 2 }).unwrap();

        assert_eq!(text(&rows[0], "symbol"), Some("NEWCO"));
        assert_eq!(text(&rows[1], "symbol"), Some("AAPL"));
        assert_eq!(rows[1][4], ("delta".to_string(), Value::from(7.0)));
    }

    #[tokio::test]
    async fn test_average_volume_per_symbol() {
        let svc = service().await;
        let rows = svc.canonical(&CanonicalQuery::AverageVolume).unwrap();

        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0][1], ("average_volume".to_string(), Value::from(2000.0)));
        assert_eq!(rows[0][2], ("observations".to_string(), Value::from(2)));
    }

    #[tokio::test]
    async fn test_anomalous_moves_are_strictly_above_threshold() {
        let svc = service().await;
        let rows = svc
            .canonical(&CanonicalQuery::AnomalousMoves { threshold: dec!(5) })
            .unwrap();

        // MSFT moved exactly 5%; NEWCO has no previous close.
        assert_eq!(rows.len(), 1);
        assert_eq!(text(&rows[0], "symbol"), Some("AAPL"));
        assert_eq!(text(&rows[0], "timestamp"), Some("2024-03-01T14:01:00.000000000Z"));
        assert_eq!(text(&rows[0], "change_percent"), Some("7"));
    }

    #[tokio::test]
    async fn test_anomalous_moves_agree_with_enricher_on_fractional_boundary() {
        let archive = InMemoryArchive::new();

        // 5.005 / 100.1 is exactly 5%, which binary floating point overshoots.
        let mut boundary = observation("AAPL", 0, dec!(105.105));
        boundary.previous_close = dec!(100.1);
        let mut above = observation("AAPL", 1, dec!(105.106));
        above.previous_close = dec!(100.1);
        archive.put(&boundary).await.unwrap();
        archive.put(&above).await.unwrap();

        let enricher = RecordEnricher::default();
        assert!(!enricher.enrich(boundary.clone()).unwrap().anomaly);
        assert!(enricher.enrich(above.clone()).unwrap().anomaly);

        let svc = HistoryQueryService::load(&archive).await.unwrap();
        let rows = svc
            .canonical(&CanonicalQuery::AnomalousMoves { threshold: dec!(5) })
            .unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(text(&rows[0], "timestamp"), Some("2024-03-01T14:01:00.000000000Z"));
    }

    #[tokio::test]
    async fn test_ad_hoc_select() {
        let svc = service().await;
        let rows = svc
            .run_sql("SELECT COUNT(*) AS n FROM observations WHERE symbol = 'AAPL'")
            .unwrap();
        assert_eq!(rows, vec![vec![("n".to_string(), Value::from(2))]]);
    }

    #[tokio::test]
    async fn test_writes_are_refused() {
        let svc = service().await;

        assert!(matches!(
            svc.run_sql("DELETE FROM observations"),
            Err(QueryError::ReadOnly(_))
        ));
        assert!(matches!(
            svc.run_sql("DROP TABLE observations"),
            Err(QueryError::ReadOnly(_))
        ));
        assert!(matches!(
            svc.run_sql("pragma query_only = 0"),
            Err(QueryError::ReadOnly(_))
        ));
        assert!(matches!(
            svc.run_sql("SELECT nope FROM nowhere"),
            Err(QueryError::Database(_))
        ));
        assert_eq!(svc.run_sql("SELECT * FROM observations").unwrap().len(), 4);
    }
}
