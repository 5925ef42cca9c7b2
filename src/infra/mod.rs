//! Runtime bootstrap for the binary: telemetry and error reporting.

pub mod error;
pub mod telemetry;
