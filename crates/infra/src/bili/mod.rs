//! Platform API access: raw client, retrying fetcher, QR login.

pub mod client;
pub mod fetcher;
pub mod login;

pub use client::{BiliApi, BiliApiConfig, RawResponse};
pub use fetcher::RetryableFetcher;
pub use login::{LoginError, QrLoginFlow};
