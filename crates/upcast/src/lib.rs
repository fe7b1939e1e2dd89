//! Upcast - retrying upstream dispatch client for Checkup
//!
//! This library delivers JSON payloads to a single upstream base URL and
//! parses the structured reply envelope. Transport failures and 5xx
//! responses are retried with a fixed delay; anything below 500 is handed
//! back to the caller untouched so the envelope layer can decide what it
//! means. Every exchange is mirrored into the debug log with bodies capped
//! at a configurable size.

pub mod client;
pub mod diag;
pub mod error;
pub mod response;
pub mod transport;

// Re-export main types
pub use client::{Client, ClientConfig};
pub use error::{Error, TransportError};
pub use response::{Message, ReplyStatus, Response};
pub use transport::{HttpTransport, Reply, Request, RetryTransport, Transport};

use std::time::Duration;

/// Upcast result type
pub type Result<T> = std::result::Result<T, Error>;

/// Default number of additional attempts after the first failure
pub const DEFAULT_RETRIES: u32 = 3;

/// Default delay between retry attempts
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(222);

/// Default deadline covering all attempts of one dispatch
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default cap on logged request/response bodies, in bytes
pub const DEFAULT_MAX_BODY: usize = 10_000;
