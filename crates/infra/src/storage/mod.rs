//! File persistence helpers.

pub mod atomic;

pub use atomic::{read_json_if_exists, write_json_atomic};
