// src/infrastructure/archive/mod.rs
// Cold archive implementations

pub mod fs;
pub mod memory;

pub use fs::FileSystemArchive;
pub use memory::InMemoryArchive;
