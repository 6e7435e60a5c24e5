// src/infrastructure/alert/broadcast.rs
// In-process fan-out channel and a de-duplicating subscriber

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};

use crate::domain::errors::AlertResult;
use crate::domain::models::Severity;
use crate::domain::service::AlertChannel;

#[derive(Debug, Clone, PartialEq)]
pub struct PublishedAlert {
    pub message: String,
    pub severity: Severity,
    pub published_at: DateTime<Utc>,
}

/// Fan-out to every current subscriber. Publishing with no subscribers succeeds.
pub struct BroadcastAlertChannel {
    tx: broadcast::Sender<PublishedAlert>,
}

impl BroadcastAlertChannel {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedAlert> {
        self.tx.subscribe()
    }

    /// Subscriber that drops messages it has already delivered
    pub fn subscribe_deduped(&self, memory: usize) -> DedupingSubscriber {
        DedupingSubscriber::new(self.subscribe(), memory)
    }
}

#[async_trait]
impl AlertChannel for BroadcastAlertChannel {
    async fn publish(&self, message: &str, severity: Severity) -> AlertResult<()> {
        let alert = PublishedAlert {
            message: message.to_string(),
            severity,
            published_at: Utc::now(),
        };

        match self.tx.send(alert) {
            Ok(receivers) => log::debug!("alert fanned out to {} subscribers", receivers),
            Err(_) => log::debug!("alert published with no subscribers: {}", message),
        }
        Ok(())
    }

    fn channel_type(&self) -> &'static str {
        "broadcast"
    }
}

/// Duplicate suppression on the subscriber side, keyed by message body.
/// Remembers at most `memory` distinct messages.
pub struct DedupingSubscriber {
    rx: broadcast::Receiver<PublishedAlert>,
    seen: HashSet<String>,
    order: VecDeque<String>,
    memory: usize,
    duplicates: usize,
}

impl DedupingSubscriber {
    pub fn new(rx: broadcast::Receiver<PublishedAlert>, memory: usize) -> Self {
        Self {
            rx,
            seen: HashSet::new(),
            order: VecDeque::new(),
            memory: memory.max(1),
            duplicates: 0,
        }
    }

    /// Number of duplicates dropped so far
    pub fn duplicates(&self) -> usize {
        self.duplicates
    }

    /// Next unseen alert; `None` once the channel is closed
    pub async fn recv(&mut self) -> Option<PublishedAlert> {
        loop {
            match self.rx.recv().await {
                Ok(alert) => {
                    if self.remember(&alert) {
                        return Some(alert);
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!("alert subscriber lagged, {} alerts skipped", skipped);
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Every unseen alert currently buffered, without waiting
    pub fn drain(&mut self) -> Vec<PublishedAlert> {
        let mut out = Vec::new();
        loop {
            match self.rx.try_recv() {
                Ok(alert) => {
                    if self.remember(&alert) {
                        out.push(alert);
                    }
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    log::warn!("alert subscriber lagged, {} alerts skipped", skipped);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return out,
            }
        }
    }

    fn remember(&mut self, alert: &PublishedAlert) -> bool {
        if self.seen.contains(&alert.message) {
            self.duplicates += 1;
            return false;
        }

        if self.order.len() >= self.memory {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.seen.insert(alert.message.clone());
        self.order.push_back(alert.message.clone());
        true
    }
}
