// src/application/service/mod.rs
// Application services

pub mod history_query;

pub use history_query::{CanonicalQuery, HistoryQueryService, QueryRow, OBSERVATIONS_DDL};
