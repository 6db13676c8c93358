//! generator.rs
//! 1 kHz command source driving every configured actuator address.
//! - Real-time scheduling: SpinSleeper holds the 1 ms release cadence.
//! - Single sequencer owner: the tick counter lives on this thread only and
//!   its values reach the bus worker through one bounded channel.
//! - Non-blocking handoff: a full channel drops the frame and counts it so
//!   the cadence never stretches.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crossbeam::channel::Sender;
use log::debug;
use spin_sleep::{SpinSleeper, SpinStrategy};
use thread_priority::{ThreadBuilderExt, ThreadPriority};

use crate::codec::Frame;
use crate::command::sequencer::CommandSequencer;
use crate::config::BusConfig;
use crate::utils::metrics::BusCounters;

const WARMUP_POLL: Duration = Duration::from_millis(50);

pub struct CommandGenerator {
    name: String,
    addresses: Vec<u16>,
    period: Duration,
    warmup: Duration,
    sequencer: CommandSequencer,
    tx: Sender<Frame>,
    running: Arc<AtomicBool>,
    counters: Arc<BusCounters>,
}

impl CommandGenerator {
    pub fn new(
        config: &BusConfig,
        tx: Sender<Frame>,
        running: Arc<AtomicBool>,
        counters: Arc<BusCounters>,
    ) -> Self {
        Self {
            name: "cmd-generator".to_string(),
            addresses: config.drive_addresses.clone(),
            period: config.command_period,
            warmup: config.warmup,
            sequencer: CommandSequencer::new(config.setpoint),
            tx,
            running,
            counters,
        }
    }

    /// Main generator loop: periodic release with real-time scheduling.
    pub fn run(&mut self) {
        // Let the listener attach and the bus settle before the first command.
        let warmup_end = Instant::now() + self.warmup;
        while self.running.load(Ordering::Acquire) && Instant::now() < warmup_end {
            thread::sleep(WARMUP_POLL.min(self.warmup));
        }
        debug!(
            "[{}] streaming setpoint {} every {:?}",
            self.name,
            self.sequencer.setpoint(),
            self.period
        );

        let sleeper = SpinSleeper::new(100_000).with_spin_strategy(SpinStrategy::YieldThread);
        let period_us = self.period.as_micros() as u64;
        let mut next_deadline = Instant::now() + self.period;
        let mut last_tick = Instant::now();

        while self.running.load(Ordering::Acquire) {
            let now = Instant::now();
            if now < next_deadline {
                sleeper.sleep(next_deadline - now);
            } else {
                // Woke up past the scheduled release (OS scheduling jitter).
                self.counters.record_late_tick();
            }

            // Measure actual period vs nominal period.
            let actual_tick = Instant::now();
            let actual_period_us = actual_tick.duration_since(last_tick).as_micros() as u64;
            self.counters.record_jitter(actual_period_us.abs_diff(period_us));
            last_tick = actual_tick;

            if !self.issue_tick() {
                break;
            }

            next_deadline += self.period;
        }

        debug!("[{}] stopped.", self.name);
    }

    /// One release: advance the sequencer once, then fan the same values out
    /// to every driven address. Returns false once the bus side is gone.
    fn issue_tick(&mut self) -> bool {
        let cmd = self.sequencer.next_command();
        for &address in &self.addresses {
            let frame = Frame::command(address, cmd.pressure, cmd.rate);
            match self.tx.try_send(frame) {
                Ok(_) => {}
                Err(e) => {
                    self.counters.record_queue_drop();
                    debug!("[{}] send failed: {:?}", self.name, e);
                    if e.is_disconnected() {
                        return false;
                    }
                }
            }
        }
        true
    }
}

/// Spawns the generator on a max-priority thread; the 1 ms cadence is the
/// tightest deadline in the system.
pub fn start_generator(
    config: &BusConfig,
    tx: Sender<Frame>,
    running: Arc<AtomicBool>,
    counters: Arc<BusCounters>,
) -> JoinHandle<()> {
    let mut generator = CommandGenerator::new(config, tx, running, counters);
    thread::Builder::new()
        .name(generator.name.clone())
        .spawn_with_priority(ThreadPriority::Max, move |_| generator.run())
        .expect("Failed to spawn command generator thread")
}
