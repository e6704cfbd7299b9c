//! Core types: errors, configuration, date keys.

pub mod config;
pub mod date_key;
pub mod errors;
