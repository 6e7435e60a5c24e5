// src/adapter/mod.rs
// Runtime wiring

pub mod coordinator;
pub mod scheduler;

pub use coordinator::{BatchReport, PipelineCoordinator};
pub use scheduler::{SchedulerStats, TrendScheduler};
