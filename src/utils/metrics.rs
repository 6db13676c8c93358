//! metrics.rs
//! Contention-free traffic counters shared by the workers.
//! - Per-address send/receive tallies live in DashMap-backed atomics, so the
//!   1 kHz generator and the bus callback never wait on each other.
//! - Global counters cover queue drops, late ticks, transmit errors, and
//!   inbound frames ignored for being outside the actuator range.
//! - A capped ring keeps recent tick jitter for the console's stats line.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use parking_lot::Mutex;

/// Samples kept in the jitter ring; oldest are evicted first.
pub const MAX_POINTS: usize = 1_000;

/// Statistics summary for a dataset.
#[derive(Debug, Clone)]
pub struct Stats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub count: usize,
}

/// Appends a value to a metrics buffer; removes the oldest if at capacity.
#[inline]
pub fn push_capped_u64(buf: &mut VecDeque<u64>, val: u64) {
    if buf.len() >= MAX_POINTS {
        buf.pop_front();
    }
    buf.push_back(val);
}

/// Computes min, max, mean for a u64 buffer (cast to f64).
pub fn calculate_stats_u64(data: &VecDeque<u64>) -> Option<Stats> {
    if data.is_empty() {
        return None;
    }

    let count = data.len();
    let min = data.iter().map(|&x| x as f64).fold(f64::INFINITY, f64::min);
    let max = data.iter().map(|&x| x as f64).fold(f64::NEG_INFINITY, f64::max);
    let mean = data.iter().map(|&x| x as f64).sum::<f64>() / count as f64;

    Some(Stats {
        min,
        max,
        mean,
        count,
    })
}

/// Shared counter hub. Cloned handles are cheap: callers wrap it in an `Arc`
/// and every increment is a relaxed atomic CAS, safe from any thread.
#[derive(Debug, Default)]
pub struct BusCounters {
    sent: DashMap<u16, AtomicU64>,
    received: DashMap<u16, AtomicU64>,
    queue_drops: AtomicU64,
    late_ticks: AtomicU64,
    bus_errors: AtomicU64,
    ignored: AtomicU64,
    jitter_us: Mutex<VecDeque<u64>>,
}

impl BusCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_sent(&self, address: u16) {
        self.sent
            .entry(address)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self, address: u16) {
        self.received
            .entry(address)
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(1, Ordering::Relaxed);
    }

    /// Command frame dropped because the send queue was full.
    pub fn record_queue_drop(&self) {
        self.queue_drops.fetch_add(1, Ordering::Relaxed);
    }

    /// Generator woke past its scheduled release.
    pub fn record_late_tick(&self) {
        self.late_ticks.fetch_add(1, Ordering::Relaxed);
    }

    /// Transmit rejected by the bus driver.
    pub fn record_bus_error(&self) {
        self.bus_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Inbound frame dropped for an address outside the actuator range.
    pub fn record_ignored(&self) {
        self.ignored.fetch_add(1, Ordering::Relaxed);
    }

    /// Deviation of one generator tick from its nominal period, in us.
    pub fn record_jitter(&self, jitter_us: u64) {
        push_capped_u64(&mut self.jitter_us.lock(), jitter_us);
    }

    /// Summary over the retained jitter samples, `None` before the first tick.
    pub fn jitter_stats(&self) -> Option<Stats> {
        calculate_stats_u64(&self.jitter_us.lock())
    }

    pub fn sent(&self, address: u16) -> u64 {
        self.sent
            .get(&address)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn received(&self, address: u16) -> u64 {
        self.received
            .get(&address)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }

    pub fn total_sent(&self) -> u64 {
        self.sent
            .iter()
            .map(|c| c.value().load(Ordering::Relaxed))
            .sum()
    }

    pub fn total_received(&self) -> u64 {
        self.received
            .iter()
            .map(|c| c.value().load(Ordering::Relaxed))
            .sum()
    }

    pub fn queue_drops(&self) -> u64 {
        self.queue_drops.load(Ordering::Relaxed)
    }

    pub fn late_ticks(&self) -> u64 {
        self.late_ticks.load(Ordering::Relaxed)
    }

    pub fn bus_errors(&self) -> u64 {
        self.bus_errors.load(Ordering::Relaxed)
    }

    pub fn ignored(&self) -> u64 {
        self.ignored.load(Ordering::Relaxed)
    }

    /// Sorted (address, sent, received) rows for the shutdown summary.
    pub fn per_address(&self) -> Vec<(u16, u64, u64)> {
        let mut addresses: Vec<u16> = self
            .sent
            .iter()
            .map(|c| *c.key())
            .chain(self.received.iter().map(|c| *c.key()))
            .collect();
        addresses.sort_unstable();
        addresses.dedup();
        addresses
            .into_iter()
            .map(|a| (a, self.sent(a), self.received(a)))
            .collect()
    }
}
