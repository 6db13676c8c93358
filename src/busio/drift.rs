//! drift.rs
//! Once-a-second comparison of what we last sent against what the watched
//! actuator last echoed. A health signal only: the report is logged, nothing
//! acts on it.

use std::fmt;

use crate::busio::registry::ActuatorRegistry;

/// One line of the periodic comparison for the watch address. Values are the
/// 16-bit wire words; `sent_rate_delta` is measured between consecutive
/// reports and goes negative when the tick counter wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriftReport {
    pub address: u16,
    pub received_pressure: u16,
    pub sent_pressure: u16,
    pub received_rate: u16,
    pub sent_rate: u16,
    pub sent_rate_delta: i32,
}

impl fmt::Display for DriftReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "watch 0x{:x} pressure recv/sent {}/{} rate recv/sent 0x{:x}/0x{:x} delta {}",
            self.address,
            self.received_pressure,
            self.sent_pressure,
            self.received_rate,
            self.sent_rate,
            self.sent_rate_delta
        )
    }
}

/// Tracks the words most recently put on the wire and compares them against
/// the registry on demand. The sent-side state is global to the bus handle:
/// all driven addresses carry the same values within a tick, so the last
/// transmit stands in for the watch address.
pub struct DriftReporter {
    watch_address: u16,
    sent_pressure: u16,
    sent_rate: u16,
    prev_sent_rate: u16,
}

impl DriftReporter {
    pub fn new(watch_address: u16) -> Self {
        Self {
            watch_address,
            sent_pressure: 0,
            sent_rate: 0,
            prev_sent_rate: 0,
        }
    }

    /// Called after every transmit with the decoded words of that frame.
    pub fn note_sent(&mut self, pressure: u16, rate: u16) {
        self.sent_pressure = pressure;
        self.sent_rate = rate;
    }

    /// Builds the report for this period and rolls the delta baseline.
    /// `None` only when the watch address is outside the registry's range.
    pub fn report(&mut self, registry: &ActuatorRegistry) -> Option<DriftReport> {
        let state = registry.read(self.watch_address)?;
        let delta = self.sent_rate as i32 - self.prev_sent_rate as i32;
        self.prev_sent_rate = self.sent_rate;
        Some(DriftReport {
            address: self.watch_address,
            received_pressure: state.pressure,
            sent_pressure: self.sent_pressure,
            received_rate: state.rate,
            sent_rate: self.sent_rate,
            sent_rate_delta: delta,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> ActuatorRegistry {
        ActuatorRegistry::new(0x101..=0x124)
    }

    #[test]
    fn steady_state_reports_zero_delta() {
        let reg = registry();
        reg.update(0x123, 5, 5);
        let mut reporter = DriftReporter::new(0x123);
        reporter.note_sent(5, 5);

        let first = reporter.report(&reg).unwrap();
        assert_eq!(first.sent_rate_delta, 5);

        // No new transmits between reports: the delta settles to zero.
        let second = reporter.report(&reg).unwrap();
        assert_eq!(second.received_pressure, 5);
        assert_eq!(second.sent_rate, 5);
        assert_eq!(second.sent_rate_delta, 0);
    }

    #[test]
    fn delta_tracks_sent_side_even_when_registry_lags() {
        let reg = registry();
        // Registry still holds an old echo while the send side advanced.
        reg.update(0x123, 200, 0x10);
        let mut reporter = DriftReporter::new(0x123);

        reporter.note_sent(200, 0x20);
        reporter.report(&reg).unwrap();

        reporter.note_sent(200, 0x24);
        let report = reporter.report(&reg).unwrap();

        assert_eq!(report.received_rate, 0x10);
        assert_eq!(report.sent_rate, 0x24);
        assert_eq!(report.sent_rate_delta, 0x4);
    }

    #[test]
    fn delta_goes_negative_across_counter_wrap() {
        let reg = registry();
        let mut reporter = DriftReporter::new(0x123);

        reporter.note_sent(200, 0xFFFF);
        reporter.report(&reg).unwrap();

        reporter.note_sent(200, 0x0000);
        let report = reporter.report(&reg).unwrap();
        assert_eq!(report.sent_rate_delta, -(0xFFFF as i32));
    }

    #[test]
    fn out_of_range_watch_yields_no_report() {
        let reg = registry();
        let mut reporter = DriftReporter::new(0x300);
        assert!(reporter.report(&reg).is_none());
    }

    #[test]
    fn report_line_formats_words_in_hex() {
        let report = DriftReport {
            address: 0x123,
            received_pressure: 200,
            sent_pressure: 200,
            received_rate: 0x3e8,
            sent_rate: 0x3e9,
            sent_rate_delta: 1,
        };
        assert_eq!(
            report.to_string(),
            "watch 0x123 pressure recv/sent 200/200 rate recv/sent 0x3e8/0x3e9 delta 1"
        );
    }
}
