//! Polling ports.

pub mod ports;
