//! listener.rs
//! Decode side of the bus: turns inbound frames into registry updates.
//! Runs entirely on the transport's notifier thread via the subscription
//! callback; everything it touches is injected at construction.

use std::sync::Arc;

use log::debug;

use crate::busio::registry::ActuatorRegistry;
use crate::codec::Frame;
use crate::transport::FrameCallback;
use crate::utils::{metrics::BusCounters, recorder::BusEventRecorder};

pub struct FrameListener {
    registry: Arc<ActuatorRegistry>,
    counters: Arc<BusCounters>,
    recorder: Arc<BusEventRecorder>,
}

impl FrameListener {
    pub fn new(
        registry: Arc<ActuatorRegistry>,
        counters: Arc<BusCounters>,
        recorder: Arc<BusEventRecorder>,
    ) -> Self {
        Self {
            registry,
            counters,
            recorder,
        }
    }

    /// Handles one inbound frame. Frames for addresses outside the configured
    /// range are counted and dropped; that is routine filtering, not a fault.
    pub fn handle(&self, frame: Frame) {
        let (pressure, rate) = frame.values();
        if self.registry.update(frame.address, pressure, rate) {
            self.counters.record_received(frame.address);
            self.recorder.record_rx(frame.address, pressure, rate);
        } else {
            self.counters.record_ignored();
            debug!("[listener] ignoring frame from 0x{:x}", frame.address);
        }
    }

    /// Wraps the listener for `Transport::subscribe`.
    pub fn into_callback(self) -> FrameCallback {
        Box::new(move |frame| self.handle(frame))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::busio::registry::ActuatorState;

    fn listener_parts() -> (FrameListener, Arc<ActuatorRegistry>, Arc<BusCounters>) {
        let registry = Arc::new(ActuatorRegistry::new(0x101..=0x124));
        let counters = Arc::new(BusCounters::new());
        let recorder = Arc::new(BusEventRecorder::new(64));
        let listener = FrameListener::new(registry.clone(), counters.clone(), recorder);
        (listener, registry, counters)
    }

    #[test]
    fn in_range_frame_updates_registry_and_counts() {
        let (listener, registry, counters) = listener_parts();

        listener.handle(Frame::command(0x123, 200, 0x0001_0000));

        assert_eq!(
            registry.read(0x123),
            Some(ActuatorState {
                pressure: 200,
                rate: 1
            })
        );
        assert_eq!(counters.received(0x123), 1);
        assert_eq!(counters.ignored(), 0);
    }

    #[test]
    fn out_of_range_frame_is_ignored() {
        let (listener, registry, counters) = listener_parts();

        listener.handle(Frame::command(0x300, 200, 0x0001_0000));

        assert_eq!(counters.total_received(), 0);
        assert_eq!(counters.ignored(), 1);
        for (_, state) in registry.snapshot() {
            assert_eq!(state, ActuatorState::default());
        }
    }

    #[test]
    fn callback_feeds_frames_through() {
        let (listener, registry, _) = listener_parts();
        let callback = listener.into_callback();

        callback(Frame::command(0x101, 42, 0x0007_0000));

        assert_eq!(
            registry.read(0x101),
            Some(ActuatorState {
                pressure: 42,
                rate: 7
            })
        );
    }
}
