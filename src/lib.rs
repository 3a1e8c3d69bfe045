//! Caching aggregation client for video, comment, blog/news search and
//! archived-result APIs, with an OAuth session for writes.

pub mod cache;
pub mod client;
pub mod config;
pub mod documents;
pub mod error;
pub mod gateway;
pub mod pagination;
pub mod search;
pub mod session;
pub mod status;
pub mod youtube;

#[cfg(test)]
pub(crate) mod testing;

pub use client::Client;
pub use config::Config;
pub use error::{ClientError, ErrorCode, ErrorInfo, TransportError};
