//! HTTP client module
//!
//! Rate-limited JSON client for the upstream API.
//!
//! # Features
//!
//! - **Call spacing**: a governor limiter with one-request bursts enforces a
//!   minimum interval between consecutive calls
//! - **429 handling**: one fixed backoff then a single retry of the same call
//! - **Bearer auth**: a token is requested from the credential provider
//!   before every call

mod client;
mod rate_limit;

pub use client::{HttpClient, HttpClientConfig, QueryParams};
pub use rate_limit::RateLimiter;
