//! # Pressure Bus Control Entry Point
//!
//! Wires the two workers together and runs the console in the foreground.
//!
//! ## Key Architecture
//! - **cmd-generator:** advances the tick sequencer at 1 ms and fans command
//!   frames into a bounded channel (1024).
//! - **bus-worker:** relays frames onto the loopback bus, notes each transmit
//!   for the drift comparator, and publishes a bus status (drift report plus
//!   registry snapshot) once a second.
//! - **bus-notifier:** the transport's delivery thread; invokes the decode
//!   callback that fills the actuator registry.
//! - **event-exporter:** drains the lock-free event queue into CSV.
//! - **liveness:** polls worker handles and reports an early death; the
//!   system keeps running until quit.
//!
//! ## Console
//! `p [addr]` prints the latest published status and counters, `q` quits,
//! `h` help. Dispatch keys off the first letter, so `print` and `quit`
//! work the same.
//!
//! ## Outputs
//! - `data/logs/bus_events.csv`: per-frame tx/rx trace.
//! - Drift report once a second at info level.

use std::{
    fs::create_dir_all,
    io::{Write, stdin, stdout},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam::channel::bounded;
use log::{debug, error, info, warn};

use pressure_bus::busio::registry::{ActuatorRegistry, ActuatorState};
use pressure_bus::busio::worker::{BusStatus, SnapshotMailbox, snapshot_mailbox, start_bus_worker};
use pressure_bus::codec::Frame;
use pressure_bus::command::generator::start_generator;
use pressure_bus::config::BusConfig;
use pressure_bus::transport::Transport;
use pressure_bus::transport::loopback::{LoopbackBus, LoopbackConfig};
use pressure_bus::utils::{metrics::BusCounters, recorder::BusEventRecorder};

const LIVENESS_POLL: Duration = Duration::from_millis(500);

fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();
    info!("=== PRESSURE BUS CONTROL START ===");

    let config = BusConfig::default();

    if let Some(dir) = config.event_log.parent() {
        if let Err(e) = create_dir_all(dir) {
            error!("Failed to create log directory {:?}: {}", dir, e);
            return;
        }
    }

    let transport: Box<dyn Transport> = match LoopbackBus::open(LoopbackConfig::default()) {
        Ok(bus) => Box::new(bus),
        Err(e) => {
            error!("Failed to open bus: {}", e);
            return;
        }
    };

    let running = Arc::new(AtomicBool::new(true));
    let counters = Arc::new(BusCounters::new());
    let registry = Arc::new(ActuatorRegistry::new(config.addresses()));
    let snapshots = snapshot_mailbox();

    let recorder = Arc::new(BusEventRecorder::new(config.event_capacity));
    recorder
        .start_consumer(config.event_log.clone())
        .expect("Failed to start event log consumer");

    let (tx_commands, rx_commands) = bounded::<Frame>(config.command_queue);

    let bus_handle = start_bus_worker(
        &config,
        transport,
        rx_commands,
        registry.clone(),
        snapshots.clone(),
        counters.clone(),
        recorder.clone(),
        running.clone(),
    );
    let generator_handle =
        start_generator(&config, tx_commands, running.clone(), counters.clone());

    let monitor_handle = start_liveness_monitor(
        running.clone(),
        vec![
            ("bus-worker", bus_handle),
            ("cmd-generator", generator_handle),
        ],
    );

    info!(
        "[Main] Driving {} addresses at {:?}, watching 0x{:x}",
        config.drive_addresses.len(),
        config.command_period,
        config.watch_address
    );

    run_console(&config, &snapshots, &counters);

    info!("[Main] Quit requested, stopping workers...");
    running.store(false, Ordering::Relaxed);
    let _ = monitor_handle.join();

    recorder.stop_consumer();
    print_summary(&counters, &recorder);
    info!("=== PRESSURE BUS CONTROL FINISHED ===");
}

/// Foreground command loop. Returns when the user quits or stdin closes.
fn run_console(config: &BusConfig, snapshots: &SnapshotMailbox, counters: &BusCounters) {
    print_help();
    let mut latest: Option<BusStatus> = None;

    loop {
        let line = prompt_line();
        let mut tokens = line.split_whitespace();
        let word = match tokens.next() {
            Some(w) => w,
            None => continue,
        };

        match command_key(word) {
            'q' => return,
            'p' => {
                // Keep only the freshest published status.
                while let Some(status) = snapshots.pop() {
                    latest = Some(status);
                }
                match tokens.next() {
                    Some(raw) => match parse_address(raw) {
                        Some(address) => print_one(latest.as_ref(), address, counters),
                        None => println!("Not an address: '{}'", raw),
                    },
                    None => print_status(config, latest.as_ref(), counters),
                }
            }
            'h' => print_help(),
            _ => println!("Unrecognized command '{}' (h for help)", word),
        }
    }
}

/// First letter of the command word, lowercased, so the long forms `quit`,
/// `print`, and `help` dispatch like their single-letter keys.
fn command_key(word: &str) -> char {
    word.chars().next().map_or(' ', |c| c.to_ascii_lowercase())
}

fn prompt_line() -> String {
    print!("> ");
    let _ = stdout().flush();

    let mut input = String::new();
    match stdin().read_line(&mut input) {
        // Closed stdin reads as quit, otherwise the loop would spin on EOF.
        Ok(0) => "q".to_string(),
        Ok(_) => input.trim().to_string(),
        Err(_) => "q".to_string(),
    }
}

/// Accepts `0x123` style hex or plain decimal.
fn parse_address(raw: &str) -> Option<u16> {
    if let Some(hex) = raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        u16::from_str_radix(hex, 16).ok()
    } else {
        raw.parse::<u16>().ok()
    }
}

fn print_help() {
    println!("┌──────────────────────────────────────────┐");
    println!("│  PRESSURE BUS CONSOLE                    │");
    println!("├──────────────────────────────────────────┤");
    println!("│  p         latest actuator status        │");
    println!("│  p <addr>  one actuator (hex or decimal) │");
    println!("│  q         quit                          │");
    println!("│  h         this help                     │");
    println!("└──────────────────────────────────────────┘");
}

/// Compact status: the latest drift line, every address that has reported
/// plus the watch address, then the live counters.
fn print_status(config: &BusConfig, status: Option<&BusStatus>, counters: &BusCounters) {
    let status = match status {
        Some(s) => s,
        None => {
            println!("No status published yet, try again in a second.");
            return;
        }
    };

    match &status.drift {
        Some(report) => println!("last report: {}", report),
        None => println!("last report: none (watch address out of range)"),
    }

    println!("addr    pressure  rate");
    for (address, state) in &status.registry {
        if *state != ActuatorState::default() || *address == config.watch_address {
            println!(
                "0x{:03x}  {:>8}  0x{:04x}",
                address, state.pressure, state.rate
            );
        }
    }

    println!(
        "sent {}  recv {}  queue_drops {}  late_ticks {}  bus_errors {}  ignored {}",
        counters.total_sent(),
        counters.total_received(),
        counters.queue_drops(),
        counters.late_ticks(),
        counters.bus_errors(),
        counters.ignored()
    );
    if let Some(stats) = counters.jitter_stats() {
        println!(
            "tick jitter us: min {:.0}  mean {:.1}  max {:.0}  ({} samples)",
            stats.min, stats.mean, stats.max, stats.count
        );
    }
}

fn print_one(status: Option<&BusStatus>, address: u16, counters: &BusCounters) {
    let status = match status {
        Some(s) => s,
        None => {
            println!("No status published yet, try again in a second.");
            return;
        }
    };
    match status.registry.iter().find(|(a, _)| *a == address) {
        Some((_, state)) => println!(
            "0x{:03x}  pressure {}  rate 0x{:04x}  sent {}  recv {}",
            address,
            state.pressure,
            state.rate,
            counters.sent(address),
            counters.received(address)
        ),
        None => println!("0x{:03x} is outside the configured range", address),
    }
}

/// Watches worker handles while the system runs, then joins them on the way
/// out so `main` only ever waits on this one thread.
fn start_liveness_monitor(
    running: Arc<AtomicBool>,
    workers: Vec<(&'static str, JoinHandle<()>)>,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name("liveness".into())
        .spawn(move || {
            let mut reported = vec![false; workers.len()];
            while running.load(Ordering::Acquire) {
                for (i, (name, handle)) in workers.iter().enumerate() {
                    if !reported[i] && handle.is_finished() {
                        warn!("[liveness] {} exited early", name);
                        reported[i] = true;
                    }
                }
                thread::sleep(LIVENESS_POLL);
            }
            for (name, handle) in workers {
                match handle.join() {
                    Ok(_) => debug!("[liveness] {} joined", name),
                    Err(_) => error!("[liveness] {} panicked", name),
                }
            }
        })
        .expect("Failed to spawn liveness monitor thread")
}

fn print_summary(counters: &BusCounters, recorder: &BusEventRecorder) {
    println!("=== bus summary ===");
    println!(
        "sent {}  recv {}  queue_drops {}  late_ticks {}  bus_errors {}  ignored {}  log_drops {}",
        counters.total_sent(),
        counters.total_received(),
        counters.queue_drops(),
        counters.late_ticks(),
        counters.bus_errors(),
        counters.ignored(),
        recorder.dropped_count()
    );
    for (address, sent, received) in counters.per_address() {
        println!("0x{:03x}  sent {:>8}  recv {:>8}", address, sent, received);
    }
}
