//! recorder.rs
//! Lock-free bus event log with a background CSV consumer.
//! - Workers push tx/rx events into a bounded ArrayQueue without blocking;
//!   a full queue drops the event and counts it rather than stalling the bus.
//! - A consumer thread drains the queue in batches and flushes every few
//!   batches to keep syscall jitter out of the hot paths.

use std::{
    fs::File,
    io::BufWriter,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    thread::{self, JoinHandle},
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

use crossbeam_queue::ArrayQueue;
use csv::Writer;
use log::{debug, error};
use parking_lot::Mutex;
use serde::Serialize;

const CONSUMER_POLL_MS: u64 = 5; // consumer sleep when the queue is empty
const DRAIN_BATCH: usize = 256; // max events drained per poll
const FLUSH_BATCHES: usize = 8; // batches between disk flushes

#[derive(Debug, Clone, Copy)]
enum Direction {
    Tx,
    Rx,
}

impl Direction {
    fn label(self) -> &'static str {
        match self {
            Direction::Tx => "tx",
            Direction::Rx => "rx",
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct RawEvent {
    seq: u64,
    ts: Instant,
    dir: Direction,
    address: u16,
    pressure: u16,
    rate: u16,
}

#[derive(Debug, Serialize)]
struct CsvRow {
    seq: u64,
    ts_epoch_us: u64,
    age_us: u64,
    dir: &'static str,
    address: String,
    pressure: u16,
    rate: u16,
}

/// Bounded event log shared by the bus worker (tx) and listener (rx).
/// Rows carry the two 16-bit words as they appear on the wire.
pub struct BusEventRecorder {
    queue: Arc<ArrayQueue<RawEvent>>,
    dropped: Arc<AtomicU64>,
    seq: AtomicU64,
    consumer_running: Arc<AtomicBool>,
    consumer_handle: Mutex<Option<JoinHandle<()>>>,
}

impl BusEventRecorder {
    pub fn new(capacity: usize) -> Self {
        // ArrayQueue::new panics on a zero capacity.
        let capacity = capacity.max(1);
        Self {
            queue: Arc::new(ArrayQueue::new(capacity)),
            dropped: Arc::new(AtomicU64::new(0)),
            seq: AtomicU64::new(1),
            consumer_running: Arc::new(AtomicBool::new(false)),
            consumer_handle: Mutex::new(None),
        }
    }

    pub fn record_tx(&self, address: u16, pressure: u16, rate: u16) {
        self.push(Direction::Tx, address, pressure, rate);
    }

    pub fn record_rx(&self, address: u16, pressure: u16, rate: u16) {
        self.push(Direction::Rx, address, pressure, rate);
    }

    fn push(&self, dir: Direction, address: u16, pressure: u16, rate: u16) {
        let event = RawEvent {
            seq: self.seq.fetch_add(1, Ordering::Relaxed),
            ts: Instant::now(),
            dir,
            address,
            pressure,
            rate,
        };
        if self.queue.push(event).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Starts the background CSV consumer. Call once; a second call while the
    /// consumer lives is refused.
    pub fn start_consumer(&self, output_csv: PathBuf) -> Result<(), String> {
        {
            let handle = self.consumer_handle.lock();
            if handle.is_some() {
                return Err("consumer already running".into());
            }
        }

        let queue = self.queue.clone();
        let dropped = self.dropped.clone();
        let running = self.consumer_running.clone();
        running.store(true, Ordering::SeqCst);

        let handle = thread::Builder::new()
            .name("event-exporter".into())
            .spawn(move || {
                let file = match File::create(&output_csv) {
                    Ok(f) => f,
                    Err(e) => {
                        error!("failed to create event csv {:?}: {}", output_csv, e);
                        return;
                    }
                };
                let mut wtr = Writer::from_writer(BufWriter::new(file));
                wtr.serialize(("seq", "ts_epoch_us", "age_us", "dir", "address", "pressure", "rate"))
                    .ok();

                let mut flush_counter = 0usize;
                while running.load(Ordering::SeqCst) {
                    let mut any = false;
                    for _ in 0..DRAIN_BATCH {
                        match queue.pop() {
                            Some(event) => {
                                any = true;
                                wtr.serialize(to_row(&event)).ok();
                            }
                            None => break,
                        }
                    }
                    if any {
                        flush_counter += 1;
                        if flush_counter >= FLUSH_BATCHES {
                            wtr.flush().ok();
                            flush_counter = 0;
                        }
                    } else {
                        thread::sleep(Duration::from_millis(CONSUMER_POLL_MS));
                    }
                }

                // Final drain so shutdown loses nothing still queued.
                while let Some(event) = queue.pop() {
                    wtr.serialize(to_row(&event)).ok();
                }
                wtr.flush().ok();
                debug!(
                    "[recorder] consumer exiting, dropped_events={}",
                    dropped.load(Ordering::Relaxed)
                );
            })
            .map_err(|e| format!("failed to spawn event consumer: {}", e))?;

        *self.consumer_handle.lock() = Some(handle);
        Ok(())
    }

    pub fn stop_consumer(&self) {
        self.consumer_running.store(false, Ordering::SeqCst);
        let handle = self.consumer_handle.lock().take();
        if let Some(h) = handle {
            let _ = h.join();
        }
    }
}

impl Drop for BusEventRecorder {
    fn drop(&mut self) {
        self.stop_consumer();
    }
}

fn to_row(event: &RawEvent) -> CsvRow {
    let ts_epoch_us = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as u64;
    CsvRow {
        seq: event.seq,
        ts_epoch_us,
        age_us: event.ts.elapsed().as_micros() as u64,
        dir: event.dir.label(),
        address: format!("0x{:x}", event.address),
        pressure: event.pressure,
        rate: event.rate,
    }
}
