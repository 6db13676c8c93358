//! worker.rs
//! Owns the bus handle. One loop does three jobs on one thread:
//! - relays command frames from the generator channel onto the transport,
//! - notes every transmit for the drift comparator,
//! - on a wall-clock cadence, logs the drift report and publishes a status
//!   (drift plus registry snapshot) into a single-slot mailbox for the
//!   console.
//! Inbound frames never pass through here; the subscription callback feeds
//! the registry from the transport's notifier thread.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam::channel::{Receiver, RecvTimeoutError};
use crossbeam_queue::ArrayQueue;
use log::{debug, error, info};
use thread_priority::{ThreadBuilderExt, ThreadPriority};

use crate::busio::drift::{DriftReport, DriftReporter};
use crate::busio::listener::FrameListener;
use crate::busio::registry::{ActuatorRegistry, RegistrySnapshot};
use crate::codec::Frame;
use crate::config::BusConfig;
use crate::transport::Transport;
use crate::utils::{metrics::BusCounters, recorder::BusEventRecorder};

const RECV_POLL: Duration = Duration::from_millis(10);

/// One report period's view of the bus, captured together so the console
/// shows a drift line and registry rows from the same instant.
#[derive(Debug, Clone)]
pub struct BusStatus {
    pub drift: Option<DriftReport>,
    pub registry: RegistrySnapshot,
}

/// Latest-value mailbox for bus status. The worker overwrites the slot each
/// period, so a reader always pops the freshest copy.
pub type SnapshotMailbox = Arc<ArrayQueue<BusStatus>>;

pub fn snapshot_mailbox() -> SnapshotMailbox {
    Arc::new(ArrayQueue::new(1))
}

pub struct BusIOWorker {
    name: String,
    transport: Box<dyn Transport>,
    rx: Receiver<Frame>,
    registry: Arc<ActuatorRegistry>,
    reporter: DriftReporter,
    report_period: Duration,
    snapshots: SnapshotMailbox,
    counters: Arc<BusCounters>,
    recorder: Arc<BusEventRecorder>,
    running: Arc<AtomicBool>,
}

impl BusIOWorker {
    pub fn new(
        config: &BusConfig,
        transport: Box<dyn Transport>,
        rx: Receiver<Frame>,
        registry: Arc<ActuatorRegistry>,
        snapshots: SnapshotMailbox,
        counters: Arc<BusCounters>,
        recorder: Arc<BusEventRecorder>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            name: "bus-worker".to_string(),
            transport,
            rx,
            registry,
            reporter: DriftReporter::new(config.watch_address),
            report_period: config.report_period,
            snapshots,
            counters,
            recorder,
            running,
        }
    }

    /// Main relay loop. A transport fault logs and ends the loop without
    /// touching the rest of the system; the liveness monitor reports the
    /// early exit.
    pub fn run(&mut self) {
        // Feedback path first, so the earliest echo already has a listener.
        let listener = FrameListener::new(
            self.registry.clone(),
            self.counters.clone(),
            self.recorder.clone(),
        );
        self.transport.subscribe(listener.into_callback());

        let mut next_report = Instant::now() + self.report_period;
        while self.running.load(Ordering::Acquire) {
            match self.rx.recv_timeout(RECV_POLL) {
                Ok(frame) => {
                    if let Err(e) = self.transport.send(frame) {
                        self.counters.record_bus_error();
                        error!("[{}] transmit failed: {}", self.name, e);
                        break;
                    }
                    let (pressure, rate) = frame.values();
                    self.reporter.note_sent(pressure, rate);
                    self.counters.record_sent(frame.address);
                    self.recorder.record_tx(frame.address, pressure, rate);
                }
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => break,
            }

            if Instant::now() >= next_report {
                let drift = self.reporter.report(&self.registry);
                if let Some(ref report) = drift {
                    info!("[{}] {}", self.name, report);
                }
                let _ = self.snapshots.force_push(BusStatus {
                    drift,
                    registry: self.registry.snapshot(),
                });
                next_report += self.report_period;
            }
        }

        debug!("[{}] stopped.", self.name);
    }
}

/// Spawns the worker at max priority; it shares the 1 ms command cadence.
pub fn start_bus_worker(
    config: &BusConfig,
    transport: Box<dyn Transport>,
    rx: Receiver<Frame>,
    registry: Arc<ActuatorRegistry>,
    snapshots: SnapshotMailbox,
    counters: Arc<BusCounters>,
    recorder: Arc<BusEventRecorder>,
    running: Arc<AtomicBool>,
) -> JoinHandle<()> {
    let mut worker = BusIOWorker::new(
        config, transport, rx, registry, snapshots, counters, recorder, running,
    );
    thread::Builder::new()
        .name(worker.name.clone())
        .spawn_with_priority(ThreadPriority::Max, move |_| worker.run())
        .expect("Failed to spawn bus worker thread")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::busio::registry::ActuatorState;
    use crate::transport::loopback::{LoopbackBus, LoopbackConfig};
    use crate::transport::{FrameCallback, TransportError};
    use crossbeam::channel::bounded;

    struct FailingTransport;

    impl Transport for FailingTransport {
        fn send(&self, _frame: Frame) -> Result<(), TransportError> {
            Err(TransportError::Transmit("injected fault".into()))
        }

        fn subscribe(&self, _callback: FrameCallback) {}
    }

    fn wait_until(limit: Duration, mut cond: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + limit;
        while Instant::now() < deadline {
            if cond() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    fn instant_bus() -> Box<dyn Transport> {
        Box::new(
            LoopbackBus::open(LoopbackConfig {
                latency: Duration::ZERO,
                jitter: Duration::ZERO,
                ..LoopbackConfig::default()
            })
            .unwrap(),
        )
    }

    struct Harness {
        config: BusConfig,
        registry: Arc<ActuatorRegistry>,
        snapshots: SnapshotMailbox,
        counters: Arc<BusCounters>,
        recorder: Arc<BusEventRecorder>,
        running: Arc<AtomicBool>,
    }

    impl Harness {
        fn new(config: BusConfig) -> Self {
            let registry = Arc::new(ActuatorRegistry::new(config.addresses()));
            Self {
                config,
                registry,
                snapshots: snapshot_mailbox(),
                counters: Arc::new(BusCounters::new()),
                recorder: Arc::new(BusEventRecorder::new(1024)),
                running: Arc::new(AtomicBool::new(true)),
            }
        }

        fn start(&self, transport: Box<dyn Transport>, rx: Receiver<Frame>) -> JoinHandle<()> {
            start_bus_worker(
                &self.config,
                transport,
                rx,
                self.registry.clone(),
                self.snapshots.clone(),
                self.counters.clone(),
                self.recorder.clone(),
                self.running.clone(),
            )
        }
    }

    #[test]
    fn relays_commands_and_registers_the_echo() {
        let harness = Harness::new(BusConfig::default());
        let (tx, rx) = bounded(16);
        let handle = harness.start(instant_bus(), rx);

        tx.send(Frame::command(0x123, 200, 0x0001_0000)).unwrap();

        let registry = harness.registry.clone();
        assert!(wait_until(Duration::from_secs(1), || {
            registry.read(0x123)
                == Some(ActuatorState {
                    pressure: 200,
                    rate: 1
                })
        }));
        assert_eq!(harness.counters.sent(0x123), 1);
        assert_eq!(harness.counters.received(0x123), 1);

        harness.running.store(false, Ordering::Release);
        handle.join().unwrap();
    }

    #[test]
    fn transmit_fault_ends_the_worker_alone() {
        let harness = Harness::new(BusConfig::default());
        let (tx, rx) = bounded(16);
        let handle = harness.start(Box::new(FailingTransport), rx);

        tx.send(Frame::command(0x123, 200, 0x0001_0000)).unwrap();

        assert!(wait_until(Duration::from_secs(1), || handle.is_finished()));
        assert_eq!(harness.counters.bus_errors(), 1);
        // The rest of the system was not asked to stop.
        assert!(harness.running.load(Ordering::Acquire));
        handle.join().unwrap();
    }

    #[test]
    fn closed_command_channel_ends_the_worker() {
        let harness = Harness::new(BusConfig::default());
        let (tx, rx) = bounded::<Frame>(16);
        let handle = harness.start(instant_bus(), rx);

        drop(tx);
        assert!(wait_until(Duration::from_secs(1), || handle.is_finished()));
        handle.join().unwrap();
    }

    #[test]
    fn publishes_fresh_snapshots_on_cadence() {
        let config = BusConfig {
            report_period: Duration::from_millis(20),
            ..BusConfig::default()
        };
        let harness = Harness::new(config);
        let (tx, rx) = bounded(16);
        let handle = harness.start(instant_bus(), rx);

        tx.send(Frame::command(0x124, 200, 0x0005_0000)).unwrap();

        let snapshots = harness.snapshots.clone();
        let mut latest = None;
        assert!(wait_until(Duration::from_secs(1), || {
            if let Some(status) = snapshots.pop() {
                let fresh = status
                    .registry
                    .iter()
                    .any(|(addr, state)| *addr == 0x124 && state.rate == 5);
                latest = Some(status);
                fresh
            } else {
                false
            }
        }));
        let status = latest.unwrap();
        assert_eq!(status.registry.len(), 36);
        // The watch address is in range, so every status carries a report.
        assert_eq!(status.drift.map(|d| d.address), Some(0x123));

        harness.running.store(false, Ordering::Release);
        handle.join().unwrap();
    }
}
