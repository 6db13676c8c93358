//! sequencer.rs
//! Monotonic command-value source.
//!
//! Each call advances a 16-bit tick counter and derives the pair of values
//! carried by a command frame: the pressure setpoint verbatim, and the tick
//! in the rate word's high half. The counter wraps at u16::MAX, so after
//! 65535 steps the rate word returns to zero and the cycle repeats.
//! Exactly one owner advances the sequence; everything downstream sees its
//! output through channels, never the counter itself.

/// Pressure/rate pair produced for one command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Command {
    pub pressure: u32,
    pub rate: u32,
}

/// Owns the wrapping tick counter. Not shared: the command generator holds
/// the only instance and fans the resulting values out by message.
#[derive(Debug)]
pub struct CommandSequencer {
    setpoint: u32,
    counter: u16,
}

impl CommandSequencer {
    pub fn new(setpoint: u32) -> Self {
        Self {
            setpoint,
            counter: 0,
        }
    }

    /// Advances the counter first, then forms the values, so the very first
    /// command already carries tick 1 in its rate word.
    pub fn next_command(&mut self) -> Command {
        self.counter = self.counter.wrapping_add(1);
        Command {
            pressure: self.setpoint,
            rate: (self.counter as u32) << 16,
        }
    }

    pub fn setpoint(&self) -> u32 {
        self.setpoint
    }

    /// Tick carried by the most recently issued command.
    pub fn last_tick(&self) -> u16 {
        self.counter
    }
}
