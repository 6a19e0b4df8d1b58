//! HTTP client module. Every request is a single attempt; failures are
//! reported as `InstallError::DownloadFailure`.

mod client;

pub use client::HttpClient;
