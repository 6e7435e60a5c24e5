// src/infrastructure/alert/mod.rs
// Alert channel implementations

pub mod broadcast;
pub mod log_channel;

pub use broadcast::{BroadcastAlertChannel, DedupingSubscriber, PublishedAlert};
pub use log_channel::LogAlertChannel;
