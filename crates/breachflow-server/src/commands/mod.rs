//! CLI command implementations.

pub mod config;
pub mod deadlines;
pub mod serve;
pub mod templates;
