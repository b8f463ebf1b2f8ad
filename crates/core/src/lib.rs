//! Gainstage core
//!
//! Real-time gain/soft-clip processing with lock-free peak metering. Everything
//! reachable from the audio callback is allocation-free and never blocks; setup
//! paths (`prepare`, configuration I/O) are the only places that return errors.

pub mod domain;

pub use domain::*;
