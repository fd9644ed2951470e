//! Typed client for the SAM.gov Get Opportunities search API.
//!
//! One call to [`Client::fetch`] runs a single classification-code query and
//! returns a [`types::FetchResult`], never an `Err`. Upstream failures
//! (rate limiting, auth, outages, malformed payloads) are categorized into
//! [`types::ErrorKind`] values so callers can branch without unwinding.

mod client;
mod query;
pub mod types;

pub use self::client::{Client, RetryConfig};
pub use self::query::SearchQuery;
