//! Request signing primitives.

pub mod ticket;
pub mod wbi;
