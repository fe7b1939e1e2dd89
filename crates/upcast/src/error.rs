//! Error types surfaced by the dispatch client.

use std::time::Duration;

use thiserror::Error;

/// Failure of a single transport attempt, or of the whole retry loop.
///
/// `Timeout` and `TimeoutExhausted` are terminal: the deadline covers every
/// attempt, so once it runs out there is nothing left to retry against.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request never produced a reply.
    #[error("making http request: {0}")]
    Http(#[from] reqwest::Error),

    /// The upstream replied 5xx. The body was drained and discarded.
    #[error("upstream error: {url}: {size} bytes, status {status}")]
    ServerError { url: String, status: u16, size: usize },

    /// The deadline ran out on the first attempt.
    #[error("request timed out after {timeout:?}: {url}")]
    Timeout { url: String, timeout: Duration },

    /// The deadline ran out while retrying.
    #[error("[{attempts}/{limit}] request timed out after {timeout:?}, giving up: {url}")]
    TimeoutExhausted {
        url: String,
        attempts: u32,
        limit: u32,
        timeout: Duration,
    },

    /// Every allowed attempt failed; `source` is the last failure.
    #[error("[{attempts}/{limit}] request failed: {source}")]
    Exhausted {
        attempts: u32,
        limit: u32,
        #[source]
        source: Box<TransportError>,
    },
}

/// Error returned by [`Client::send`] and [`Client::get`].
///
/// [`Client::send`]: crate::Client::send
/// [`Client::get`]: crate::Client::get
#[derive(Debug, Error)]
pub enum Error {
    /// The configured base URL does not parse.
    #[error("invalid base url: {0}")]
    BaseUrl(#[from] url::ParseError),

    /// The outgoing payload could not be encoded.
    #[error("encoding payload to JSON: {0}")]
    Encode(#[source] serde_json::Error),

    /// The transport gave up after spending its retry budget.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The upstream answered with a non-success status below 500.
    /// Not retried: a semantic rejection, not a transient fault.
    #[error("non-2xx response: {url}: {status}, {result}: {details}")]
    NonSuccessStatus {
        url: String,
        status: u16,
        result: String,
        details: String,
    },

    /// The reply body was not a valid response envelope.
    #[error("converting json response from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}
