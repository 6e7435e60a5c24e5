// src/infrastructure/mod.rs
// Storage and alert adapters

pub mod alert;
pub mod archive;
pub mod store;
