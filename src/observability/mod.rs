//! Observability
//!
//! Per OBSERVABILITY.md: synchronous structured JSON logging. One line per
//! event, deterministic key ordering, explicit severities.

mod logger;

pub use logger::{LogLevel, Logger};
