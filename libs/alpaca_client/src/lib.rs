//! Alpaca API client library.
//!
//! Provides authenticated REST access to the Alpaca trading and crypto
//! market-data APIs.

pub mod rate_limit;
pub mod rest;

pub use rate_limit::RateLimiter;
pub use rest::AlpacaRestClient;
