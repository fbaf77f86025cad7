#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod cache;
pub mod config;
pub mod error;
pub mod filter;
pub mod github_client;
pub mod notify;
pub mod query;
pub mod run;
pub mod telemetry;
pub mod types;

pub type Result<T> = std::result::Result<T, error::Error>;
