//! HTTP transport.

pub mod client;

pub use client::{browser_headers, HttpClient, HttpClientBuilder};
