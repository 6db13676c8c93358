//! registry.rs
//! Last-known feedback state per actuator address.
//! - One entry per address in the configured range, present from construction
//!   and overwritten last-writer-wins by the decode callback.
//! - A mutex guards the table: updates arrive on the bus notifier thread while
//!   the drift comparator and console read from their own threads. Readers may
//!   observe a slightly stale entry, never a torn one.

use std::ops::RangeInclusive;

use parking_lot::Mutex;

/// Decoded words from the most recent feedback frame for one actuator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ActuatorState {
    pub pressure: u16,
    pub rate: u16,
}

/// Point-in-time copy of the whole table, sorted by address. Published over a
/// mailbox so observers never touch the live table.
pub type RegistrySnapshot = Vec<(u16, ActuatorState)>;

/// Per-instance state table. Constructed explicitly and handed to whoever
/// needs it; nothing here is process-global.
pub struct ActuatorRegistry {
    first: u16,
    last: u16,
    entries: Mutex<Vec<ActuatorState>>,
}

impl ActuatorRegistry {
    pub fn new(range: RangeInclusive<u16>) -> Self {
        let (first, last) = (*range.start(), *range.end());
        let count = if first > last {
            0
        } else {
            (last - first) as usize + 1
        };
        Self {
            first,
            last,
            entries: Mutex::new(vec![ActuatorState::default(); count]),
        }
    }

    pub fn contains(&self, address: u16) -> bool {
        (self.first..=self.last).contains(&address)
    }

    pub fn len(&self) -> usize {
        if self.first > self.last {
            0
        } else {
            (self.last - self.first) as usize + 1
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Overwrites the entry for `address`. Frames from addresses outside the
    /// configured range are not faults, just traffic for somebody else, so the
    /// update reports `false` and changes nothing.
    pub fn update(&self, address: u16, pressure: u16, rate: u16) -> bool {
        if !self.contains(address) {
            return false;
        }
        let index = (address - self.first) as usize;
        self.entries.lock()[index] = ActuatorState { pressure, rate };
        true
    }

    /// Latest state for `address`, or `None` when the address is outside the
    /// configured range. In-range addresses always read back, at worst the
    /// zeroed default from construction.
    pub fn read(&self, address: u16) -> Option<ActuatorState> {
        if !self.contains(address) {
            return None;
        }
        let index = (address - self.first) as usize;
        Some(self.entries.lock()[index])
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        let entries = self.entries.lock();
        entries
            .iter()
            .enumerate()
            .map(|(i, state)| (self.first + i as u16, *state))
            .collect()
    }
}
