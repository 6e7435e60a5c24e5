// src/domain/service/mod.rs
// Domain service interfaces

use async_trait::async_trait;

use crate::domain::errors::AlertResult;
use crate::domain::models::Severity;

/// Fan-out notification channel. Delivery is fire-and-forget from the pipeline's side.
#[async_trait]
pub trait AlertChannel: Send + Sync {
    async fn publish(&self, message: &str, severity: Severity) -> AlertResult<()>;

    /// Channel type for logging
    fn channel_type(&self) -> &'static str;
}
