// src/infrastructure/alert/log_channel.rs

use async_trait::async_trait;

use crate::domain::errors::AlertResult;
use crate::domain::models::Severity;
use crate::domain::service::AlertChannel;

/// Publishes notifications through the `log` facade
pub struct LogAlertChannel {
    target: String,
}

impl LogAlertChannel {
    pub fn new(target: &str) -> Self {
        Self {
            target: target.to_string(),
        }
    }
}

impl Default for LogAlertChannel {
    fn default() -> Self {
        Self::new("alerts")
    }
}

#[async_trait]
impl AlertChannel for LogAlertChannel {
    async fn publish(&self, message: &str, severity: Severity) -> AlertResult<()> {
        match severity {
            Severity::Alert => log::warn!(target: &self.target, "[{}] {}", severity, message),
            Severity::Info => log::info!(target: &self.target, "[{}] {}", severity, message),
        }
        Ok(())
    }

    fn channel_type(&self) -> &'static str {
        "log"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_log_channel_never_fails() {
        let channel = LogAlertChannel::default();
        assert!(channel.publish("AAPL entering an uptrend", Severity::Alert).await.is_ok());
        assert!(channel.publish("AAPL moved 6%", Severity::Info).await.is_ok());
        assert_eq!(channel.channel_type(), "log");
    }
}
