// src/config.rs
use crate::application::usecase::TrendSettings;
use crate::domain::errors::{AppError, AppResult};
use crate::infrastructure::store::sqlite::is_identifier;
use dotenv::dotenv;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Pipeline configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Hot store and archive locations
    pub storage: StorageConfig,

    /// Enrichment configuration
    pub enrichment: EnrichmentConfig,

    /// Trend detection configuration
    pub trend: TrendConfig,

    /// Trend invocation scheduling
    pub scheduler: SchedulerConfig,

    /// Logging configuration
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// SQLite database file for the hot store
    pub hot_store_path: String,

    /// Hot store table name
    pub hot_store_table: String,

    /// Archive root directory
    pub archive_root: String,

    /// Archive bucket (subdirectory of the root)
    pub archive_bucket: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    /// Absolute percent change above which a record is anomalous
    pub anomaly_threshold_percent: Decimal,

    /// Publish an INFO alert for every anomalous record
    pub notify_anomalies: bool,

    /// Payloads per ingested batch
    pub batch_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendConfig {
    pub short_window: usize,
    pub long_window: usize,

    /// Records in the rolling window
    pub lookback: usize,

    /// Records required before evaluating
    pub min_history: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Concurrent lanes; one symbol always maps to the same lane
    pub lanes: usize,

    /// Attempts per invocation, including the first
    pub max_attempts: usize,

    /// Timeout per attempt in milliseconds
    pub invocation_timeout_ms: u64,

    /// Base delay between attempts in milliseconds
    pub retry_backoff_ms: u64,

    /// Notifications buffered between the hot store and the scheduler
    pub feed_buffer: usize,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (e.g., "info", "debug", "warn", "error")
    pub level: String,

    /// Log to file
    pub to_file: bool,

    /// Log file path
    pub file_path: Option<String>,
}

impl TrendConfig {
    pub fn settings(&self) -> AppResult<TrendSettings> {
        TrendSettings::new(
            self.short_window,
            self.long_window,
            self.lookback,
            self.min_history,
        )
        .map_err(|e| AppError::Config(e.to_string()))
    }
}

impl SchedulerConfig {
    pub fn invocation_timeout(&self) -> Duration {
        Duration::from_millis(self.invocation_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }
}

/// Read and parse one variable; absent means default, unparsable is an error
fn env_or<T: FromStr>(name: &str, default: T) -> AppResult<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|e| {
            AppError::Config(format!("Invalid value for {}: {:?} ({})", name, raw, e))
        }),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        // Load .env file if it exists
        dotenv().ok();

        let defaults = Config::default();

        let storage = StorageConfig {
            hot_store_path: env::var("HOT_STORE_PATH")
                .unwrap_or(defaults.storage.hot_store_path),
            hot_store_table: env::var("HOT_STORE_TABLE")
                .unwrap_or(defaults.storage.hot_store_table),
            archive_root: env::var("ARCHIVE_ROOT").unwrap_or(defaults.storage.archive_root),
            archive_bucket: env::var("ARCHIVE_BUCKET")
                .unwrap_or(defaults.storage.archive_bucket),
        };

        let enrichment = EnrichmentConfig {
            anomaly_threshold_percent: env_or(
                "ANOMALY_THRESHOLD_PERCENT",
                defaults.enrichment.anomaly_threshold_percent,
            )?,
            notify_anomalies: env_or("NOTIFY_ANOMALIES", defaults.enrichment.notify_anomalies)?,
            batch_size: env_or("BATCH_SIZE", defaults.enrichment.batch_size)?,
        };

        let trend = TrendConfig {
            short_window: env_or("SHORT_WINDOW", defaults.trend.short_window)?,
            long_window: env_or("LONG_WINDOW", defaults.trend.long_window)?,
            lookback: env_or("TREND_LOOKBACK", defaults.trend.lookback)?,
            min_history: env_or("MIN_HISTORY", defaults.trend.min_history)?,
        };

        let scheduler = SchedulerConfig {
            lanes: env_or("TREND_LANES", defaults.scheduler.lanes)?,
            max_attempts: env_or("MAX_ATTEMPTS", defaults.scheduler.max_attempts)?,
            invocation_timeout_ms: env_or(
                "INVOCATION_TIMEOUT_MS",
                defaults.scheduler.invocation_timeout_ms,
            )?,
            retry_backoff_ms: env_or("RETRY_BACKOFF_MS", defaults.scheduler.retry_backoff_ms)?,
            feed_buffer: env_or("FEED_BUFFER", defaults.scheduler.feed_buffer)?,
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or(defaults.logging.level),
            to_file: env_or("LOG_TO_FILE", defaults.logging.to_file)?,
            file_path: env::var("LOG_FILE_PATH").ok(),
        };

        let config = Config {
            storage,
            enrichment,
            trend,
            scheduler,
            logging,
        };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> AppResult<Self> {
        let mut file = File::open(path).map_err(|e| {
            AppError::Config(format!("Failed to open config file: {}", e))
        })?;

        let mut contents = String::new();
        file.read_to_string(&mut contents).map_err(|e| {
            AppError::Config(format!("Failed to read config file: {}", e))
        })?;

        let config: Config = serde_json::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file: {}", e))
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> AppResult<()> {
        let contents = serde_json::to_string_pretty(self).map_err(|e| {
            AppError::Config(format!("Failed to serialize config: {}", e))
        })?;

        std::fs::write(path, contents).map_err(|e| {
            AppError::Config(format!("Failed to write config file: {}", e))
        })?;

        Ok(())
    }

    pub fn validate(&self) -> AppResult<()> {
        self.trend.settings()?;

        if !is_identifier(&self.storage.hot_store_table) {
            return Err(AppError::Config(format!(
                "HOT_STORE_TABLE must be a plain identifier, got {:?}",
                self.storage.hot_store_table
            )));
        }
        if self.storage.archive_bucket.trim().is_empty() {
            return Err(AppError::Config("ARCHIVE_BUCKET must not be empty".to_string()));
        }
        if self.enrichment.anomaly_threshold_percent.is_sign_negative() {
            return Err(AppError::Config(
                "ANOMALY_THRESHOLD_PERCENT must not be negative".to_string(),
            ));
        }
        if self.enrichment.batch_size == 0 {
            return Err(AppError::Config("BATCH_SIZE must be at least 1".to_string()));
        }
        if self.scheduler.lanes == 0 {
            return Err(AppError::Config("TREND_LANES must be at least 1".to_string()));
        }
        if self.scheduler.max_attempts == 0 {
            return Err(AppError::Config("MAX_ATTEMPTS must be at least 1".to_string()));
        }
        if self.scheduler.feed_buffer == 0 {
            return Err(AppError::Config("FEED_BUFFER must be at least 1".to_string()));
        }

        Ok(())
    }

    /// Initialize logging based on configuration
    pub fn init_logging(&self) -> AppResult<()> {
        let mut builder = env_logger::Builder::new();

        // Set log level
        let log_level = match self.logging.level.to_lowercase().as_str() {
            "trace" => log::LevelFilter::Trace,
            "debug" => log::LevelFilter::Debug,
            "info" => log::LevelFilter::Info,
            "warn" => log::LevelFilter::Warn,
            "error" => log::LevelFilter::Error,
            other => {
                return Err(AppError::Config(format!("Unknown LOG_LEVEL: {}", other)));
            }
        };

        builder.filter_level(log_level);

        // Configure output
        if self.logging.to_file {
            if let Some(file_path) = &self.logging.file_path {
                let file = File::create(file_path).map_err(|e| {
                    AppError::Config(format!("Failed to create log file: {}", e))
                })?;

                builder.target(env_logger::Target::Pipe(Box::new(file)));
            }
        }

        builder
            .try_init()
            .map_err(|e| AppError::Config(format!("Failed to initialize logger: {}", e)))?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                hot_store_path: "data/hot_store.db".to_string(),
                hot_store_table: "price_records".to_string(),
                archive_root: "data/archive".to_string(),
                archive_bucket: "raw-observations".to_string(),
            },
            enrichment: EnrichmentConfig {
                anomaly_threshold_percent: Decimal::new(5, 0),
                notify_anomalies: false,
                batch_size: 100,
            },
            trend: TrendConfig {
                short_window: 5,
                long_window: 20,
                lookback: 20,
                min_history: 20,
            },
            scheduler: SchedulerConfig {
                lanes: 4,
                max_attempts: 3,
                invocation_timeout_ms: 5_000,
                retry_backoff_ms: 200,
                feed_buffer: 1_024,
            },
            logging: LoggingConfig {
                level: "info".to_string(),
                to_file: false,
                file_path: None,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.trend.settings().unwrap(), TrendSettings::default());
    }

    #[test]
    fn test_invalid_windows_are_rejected() {
        let mut config = Config::default();
        config.trend.short_window = 20;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));

        let mut config = Config::default();
        config.trend.lookback = 10;
        assert!(config.validate().is_err());

        // A guard larger than the window would keep every evaluation not ready.
        let mut config = Config::default();
        config.trend.min_history = 25;
        assert!(matches!(config.validate(), Err(AppError::Config(_))));
    }

    #[test]
    fn test_invalid_storage_and_scheduler_values() {
        let mut config = Config::default();
        config.storage.hot_store_table = "prices; --".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.scheduler.lanes = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.enrichment.anomaly_threshold_percent = Decimal::new(-1, 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_file_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.enrichment.notify_anomalies = true;
        config.to_file(&path).unwrap();

        assert_eq!(Config::from_file(&path).unwrap(), config);
    }
}
