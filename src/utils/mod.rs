//! Shared diagnostics: traffic counters and the CSV event log.

pub mod metrics;
pub mod recorder;
