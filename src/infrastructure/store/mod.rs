// src/infrastructure/store/mod.rs
// Hot store implementations

pub mod change_feed;
pub mod memory;
pub mod sqlite;

pub use change_feed::ChangeFeedStore;
pub use memory::InMemoryHotStore;
pub use sqlite::SqliteHotStore;
