//! HTTP transport for the news API.
//!
//! - [`client`] - request building, timeouts, status classification, and the
//!   shared retry budget for rate limiting and transport failures

mod client;

pub use client::{TransportClient, TransportError, DEFAULT_MAX_RETRIES};
pub use reqwest::Method;
