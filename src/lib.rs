//! Pressure-actuator control over a shared serial bus.
//!
//! One side streams setpoint/rate command frames at 1 kHz, the other decodes
//! echoed feedback into a live per-actuator state table and reports drift
//! between them once a second.
//!
//! ## Key Architecture
//! - **codec:** packs a (pressure, rate) pair into the 4-byte wire payload;
//!   only low16(pressure) and high16(rate) ever travel.
//! - **command:** the tick sequencer and its generator thread; the counter
//!   has exactly one owner and fans out through one bounded channel.
//! - **busio:** the worker owning the transport handle, the decode listener
//!   feeding the registry, and the once-a-second drift comparator.
//! - **transport:** the bus driver seam (trait) plus an in-process loopback
//!   with latency jitter for running without hardware.
//!
//! ## Concurrency
//! - Bounded channels with non-blocking sends; a full queue drops and counts.
//! - Atomic flag for cooperative shutdown; every thread is joined on quit.
//! - Registry snapshots travel by message into a single-slot mailbox, so no
//!   observer ever reads the live table.
//!
//! ## Outputs
//! - `data/logs/bus_events.csv`: per-frame tx/rx trace (microsecond ages).
//! - Drift report once a second on the log at info level.

pub mod busio;
pub mod codec;
pub mod command;
pub mod config;
pub mod transport;
pub mod utils;
