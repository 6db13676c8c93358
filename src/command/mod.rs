//! Command production: the tick sequencer and its 1 kHz generator thread.

pub mod generator;
pub mod sequencer;
