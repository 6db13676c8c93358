//! Bus transport boundary.
//!
//! The control loop never talks to bus hardware directly; it holds a boxed
//! [`Transport`] and the driver behind it is free to be a CAN adapter, a
//! serial bridge, or the in-process [`loopback`] used by tests and demo runs.
//! Inbound frames are pushed, not polled: the transport invokes the
//! subscribed callback from its own notifier thread for every frame it
//! delivers.

pub mod loopback;

use crate::codec::Frame;
use thiserror::Error;

/// Callback invoked on the transport's notifier thread for every inbound frame.
pub type FrameCallback = Box<dyn Fn(Frame) + Send + Sync + 'static>;

/// Faults at the bus boundary. Anything beyond these is a driver bug, not a
/// condition the control loop reasons about.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Opening the channel failed; surfaces from `open`, aborts startup.
    #[error("bus connect failed: {0}")]
    Connect(String),
    /// A single transmission failed (bus fault, saturated queue).
    #[error("bus transmit failed: {0}")]
    Transmit(String),
    /// The handle outlived its driver.
    #[error("bus handle is closed")]
    Closed,
}

/// Handle to an open bus channel.
///
/// Sends are issued in program order per handle; delivery order of inbound
/// frames is whatever the underlying bus produces.
pub trait Transport: Send {
    /// Queues one frame for transmission.
    fn send(&self, frame: Frame) -> Result<(), TransportError>;

    /// Registers `callback` for inbound frames. The callback runs on the
    /// notifier thread and must not block it for long.
    fn subscribe(&self, callback: FrameCallback);
}
