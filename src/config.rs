//! config.rs
//! Runtime configuration for the control loop, built in `main` and passed
//! explicitly into every worker (no ambient/global state).

use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::time::Duration;

/// First device address accepted by the registry (inclusive).
pub const DEFAULT_ADDRESS_FIRST: u16 = 0x101;
/// Last device address accepted by the registry (inclusive).
/// 0x101..=0x124 spans 36 actuators; the range, not a separate count, is
/// authoritative.
pub const DEFAULT_ADDRESS_LAST: u16 = 0x124;
/// Pressure setpoint broadcast on every command frame.
pub const DEFAULT_SETPOINT: u32 = 200;
/// Address whose feedback is compared against outgoing commands.
pub const DEFAULT_WATCH_ADDRESS: u16 = 0x123;

#[derive(Debug, Clone)]
pub struct BusConfig {
    /// Inclusive bounds of the accepted device address range.
    pub address_first: u16,
    pub address_last: u16,
    /// Fixed setpoint carried by every generated command.
    pub setpoint: u32,
    /// Addresses driven each generator tick, one frame per address.
    pub drive_addresses: Vec<u16>,
    /// Address examined by the periodic drift report.
    pub watch_address: u16,
    /// Generator tick period.
    pub command_period: Duration,
    /// Quiet delay before the generator's first tick, so the bus side is
    /// already listening when the stream starts.
    pub warmup: Duration,
    /// Wall-clock period between drift reports.
    pub report_period: Duration,
    /// Capacity of the generator -> bus worker command channel.
    pub command_queue: usize,
    /// Capacity of the lock-free event log queue.
    pub event_capacity: usize,
    /// Destination of the diagnostic event trace.
    pub event_log: PathBuf,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            address_first: DEFAULT_ADDRESS_FIRST,
            address_last: DEFAULT_ADDRESS_LAST,
            setpoint: DEFAULT_SETPOINT,
            drive_addresses: vec![0x123, 0x124],
            watch_address: DEFAULT_WATCH_ADDRESS,
            command_period: Duration::from_millis(1),
            warmup: Duration::from_secs(2),
            report_period: Duration::from_secs(1),
            command_queue: 1024,
            event_capacity: 8192,
            event_log: PathBuf::from("data/logs/bus_events.csv"),
        }
    }
}

impl BusConfig {
    /// The accepted address range as an iterable range.
    pub fn addresses(&self) -> RangeInclusive<u16> {
        self.address_first..=self.address_last
    }

    /// Whether `address` falls inside the accepted range.
    #[inline]
    pub fn in_range(&self, address: u16) -> bool {
        address >= self.address_first && address <= self.address_last
    }

    /// Number of actuators, derived from the range bounds.
    pub fn actuator_count(&self) -> usize {
        (self.address_last - self.address_first) as usize + 1
    }
}
