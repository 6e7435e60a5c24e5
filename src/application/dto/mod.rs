// src/application/dto/mod.rs
// Inbound stream record decoding

pub mod parser;

pub use parser::{parse_observation, peek_identity};
