//! Bus side of the system: the worker that owns the transport, the decode
//! listener, the per-address state registry, and the drift comparator.

pub mod drift;
pub mod listener;
pub mod registry;
pub mod worker;
