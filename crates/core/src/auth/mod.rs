//! Authentication ports.

pub mod ports;
