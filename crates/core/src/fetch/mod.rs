//! Response classification for the retryable fetcher.

pub mod classify;
