//! Command implementations for the CLI
//!
//! - start: Run the exporter
//! - check: Validate configuration

pub mod check;
pub mod start;
