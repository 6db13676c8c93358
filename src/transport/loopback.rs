//! loopback.rs
//! In-process stand-in for the physical bus driver.
//!
//! Every frame sent is delivered back to all subscribers after a short,
//! jittered latency, one frame at a time, the same shape as a quiet CAN
//! segment where the actuators echo their state. A bounded send queue models
//! bus saturation: `send` fails rather than blocks when the queue is full.

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TrySendError, bounded};
use log::{debug, info};
use parking_lot::Mutex;
use rand::random_range;

use super::{FrameCallback, Transport, TransportError};
use crate::codec::Frame;

const NOTIFIER_POLL: Duration = Duration::from_millis(10);

/// Configuration mirroring the reference driver surface. `channel` and
/// `bitrate` are carried through for log parity; the simulation itself only
/// honors the latency model and queue bound.
#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    pub channel: String,
    pub bitrate: u32,
    /// Mean per-frame delivery latency.
    pub latency: Duration,
    /// Uniform +/- jitter applied to each delivery.
    pub jitter: Duration,
    /// Send queue capacity; a full queue models a saturated bus.
    pub queue: usize,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            channel: "loop0".into(),
            bitrate: 1_000_000,
            latency: Duration::from_micros(150),
            jitter: Duration::from_micros(100),
            queue: 256,
        }
    }
}

/// Virtual bus handle. Owns the notifier thread; dropping the handle stops
/// delivery and joins the thread.
pub struct LoopbackBus {
    tx: Sender<Frame>,
    running: Arc<AtomicBool>,
    subscribers: Arc<Mutex<Vec<FrameCallback>>>,
    notifier: Option<JoinHandle<()>>,
    config: LoopbackConfig,
}

impl LoopbackBus {
    /// Opens the virtual channel and starts its notifier thread.
    pub fn open(config: LoopbackConfig) -> Result<Self, TransportError> {
        if config.queue == 0 {
            return Err(TransportError::Connect(
                "send queue capacity must be nonzero".into(),
            ));
        }

        let (tx, rx) = bounded(config.queue);
        let running = Arc::new(AtomicBool::new(true));
        let subscribers: Arc<Mutex<Vec<FrameCallback>>> = Arc::new(Mutex::new(Vec::new()));

        info!(
            "[loopback {}] open at {} bit/s (latency {:?} +/- {:?})",
            config.channel, config.bitrate, config.latency, config.jitter
        );

        let notifier = {
            let running = running.clone();
            let subscribers = subscribers.clone();
            let config = config.clone();
            thread::Builder::new()
                .name("bus-notifier".into())
                .spawn(move || notifier_loop(rx, running, subscribers, config))
                .map_err(|e| TransportError::Connect(e.to_string()))?
        };

        Ok(Self {
            tx,
            running,
            subscribers,
            notifier: Some(notifier),
            config,
        })
    }
}

impl Transport for LoopbackBus {
    fn send(&self, frame: Frame) -> Result<(), TransportError> {
        match self.tx.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => Err(TransportError::Transmit(format!(
                "send queue full ({} frames)",
                self.config.queue
            ))),
            Err(TrySendError::Disconnected(_)) => Err(TransportError::Closed),
        }
    }

    fn subscribe(&self, callback: FrameCallback) {
        self.subscribers.lock().push(callback);
    }
}

impl Drop for LoopbackBus {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.notifier.take() {
            let _ = handle.join();
        }
        debug!("[loopback {}] closed", self.config.channel);
    }
}

/// Delivery loop: drains the send queue one frame at a time, holding the
/// simulated bus for the frame's latency window before fanning it out.
fn notifier_loop(
    rx: Receiver<Frame>,
    running: Arc<AtomicBool>,
    subscribers: Arc<Mutex<Vec<FrameCallback>>>,
    config: LoopbackConfig,
) {
    while running.load(Ordering::Acquire) {
        match rx.recv_timeout(NOTIFIER_POLL) {
            Ok(frame) => {
                let delay = delivery_delay(&config);
                if !delay.is_zero() {
                    thread::sleep(delay);
                }
                for callback in subscribers.lock().iter() {
                    callback(frame);
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    debug!("[loopback {}] notifier stopped", config.channel);
}

fn delivery_delay(config: &LoopbackConfig) -> Duration {
    let jitter_us = config.jitter.as_micros() as u64;
    if jitter_us == 0 {
        return config.latency;
    }
    let base_us = config.latency.as_micros() as u64;
    let lo = base_us.saturating_sub(jitter_us);
    let hi = base_us + jitter_us;
    Duration::from_micros(random_range(lo..=hi))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;

    fn instant_config() -> LoopbackConfig {
        LoopbackConfig {
            latency: Duration::ZERO,
            jitter: Duration::ZERO,
            ..LoopbackConfig::default()
        }
    }

    #[test]
    fn delivers_sent_frames_to_subscriber() {
        let bus = LoopbackBus::open(instant_config()).unwrap();
        let (tx, rx) = unbounded();
        bus.subscribe(Box::new(move |frame| {
            let _ = tx.send(frame);
        }));

        let frame = Frame::command(0x110, 200, 0x0003_0000);
        bus.send(frame).unwrap();

        let echoed = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert_eq!(echoed, frame);
    }

    #[test]
    fn fans_out_to_every_subscriber() {
        let bus = LoopbackBus::open(instant_config()).unwrap();
        let (tx_a, rx_a) = unbounded();
        let (tx_b, rx_b) = unbounded();
        bus.subscribe(Box::new(move |frame| {
            let _ = tx_a.send(frame.address);
        }));
        bus.subscribe(Box::new(move |frame| {
            let _ = tx_b.send(frame.address);
        }));

        bus.send(Frame::command(0x101, 1, 0)).unwrap();

        assert_eq!(rx_a.recv_timeout(Duration::from_secs(1)).unwrap(), 0x101);
        assert_eq!(rx_b.recv_timeout(Duration::from_secs(1)).unwrap(), 0x101);
    }

    #[test]
    fn saturated_queue_fails_the_send() {
        let bus = LoopbackBus::open(LoopbackConfig {
            queue: 1,
            latency: Duration::ZERO,
            jitter: Duration::ZERO,
            ..LoopbackConfig::default()
        })
        .unwrap();
        // Subscriber parks the notifier so the queue cannot drain.
        bus.subscribe(Box::new(|_| thread::sleep(Duration::from_secs(1))));

        bus.send(Frame::command(0x101, 1, 0)).unwrap();
        thread::sleep(Duration::from_millis(100)); // notifier now stuck in the callback
        bus.send(Frame::command(0x102, 2, 0)).unwrap(); // occupies the single slot

        match bus.send(Frame::command(0x103, 3, 0)) {
            Err(TransportError::Transmit(_)) => {}
            other => panic!("expected Transmit error, got {other:?}"),
        }
    }

    #[test]
    fn zero_capacity_queue_is_rejected_at_open() {
        let err = LoopbackBus::open(LoopbackConfig {
            queue: 0,
            ..LoopbackConfig::default()
        })
        .err()
        .unwrap();
        assert!(matches!(err, TransportError::Connect(_)));
    }
}
