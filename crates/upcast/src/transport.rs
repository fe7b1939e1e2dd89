//! Transport layer: a plain request/reply trait, the reqwest-backed
//! implementation, and the retrying decorator that wraps it.

use std::time::{Duration, Instant};

use reqwest::header::{HeaderName, HeaderValue, SET_COOKIE};
use reqwest::Method;
use tracing::{debug, warn};

use crate::error::TransportError;

/// One outbound request. Cloned per attempt by the retry decorator.
#[derive(Debug, Clone)]
pub struct Request {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    /// Deadline covering every attempt of this request.
    pub timeout: Duration,
}

/// A raw reply, before any envelope decoding.
#[derive(Debug, Clone)]
pub struct Reply {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// Performs one request and returns the raw reply.
///
/// Implemented by [`HttpTransport`] for the wire and by [`RetryTransport`]
/// as a decorator, so retry behavior composes explicitly instead of being
/// baked into the client.
#[async_trait::async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: Request) -> Result<Reply, TransportError>;
}

/// The base transport over a shared reqwest client.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build the underlying HTTP client. No client-level timeout is set;
    /// the retry decorator enforces the request deadline.
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: Request) -> Result<Reply, TransportError> {
        let mut builder = self.client.request(request.method.clone(), &request.url);

        for (name, value) in &request.headers {
            if let (Ok(name), Ok(value)) = (
                name.parse::<HeaderName>(),
                HeaderValue::from_str(value),
            ) {
                builder = builder.header(name, value);
            }
        }

        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await?;
        let status = response.status().as_u16();

        // The protocol is stateless; any cookie from the upstream is an anomaly.
        let cookies: Vec<String> = response
            .headers()
            .get_all(SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok().map(str::to_owned))
            .collect();
        for (i, cookie) in cookies.iter().enumerate() {
            warn!(
                "unexpected cookie [{}/{}] returned from upstream: {}",
                i + 1,
                cookies.len(),
                cookie
            );
        }

        let headers = response
            .headers()
            .iter()
            .map(|(k, v)| {
                (k.as_str().to_owned(), v.to_str().unwrap_or("<binary>").to_owned())
            })
            .collect();

        let body = response.bytes().await?.to_vec();

        Ok(Reply { status, headers, body })
    }
}

/// Retrying decorator around another [`Transport`].
///
/// Transport errors and 5xx replies are retried up to `retries` more times
/// with a fixed delay between attempts. Any reply below 500 is returned
/// as-is. Running out the deadline ends the loop immediately, with the
/// first-attempt and mid-retry flavors kept distinguishable.
pub struct RetryTransport<T> {
    inner: T,
    retries: u32,
    delay: Duration,
}

impl<T: Transport> RetryTransport<T> {
    pub fn new(inner: T, retries: u32, delay: Duration) -> Self {
        Self { inner, retries, delay }
    }
}

#[async_trait::async_trait]
impl<T: Transport> Transport for RetryTransport<T> {
    async fn execute(&self, request: Request) -> Result<Reply, TransportError> {
        let limit = self.retries + 1;
        let deadline = Instant::now() + request.timeout;

        let timed_out = |attempt: u32| {
            if attempt == 1 {
                TransportError::Timeout {
                    url: request.url.clone(),
                    timeout: request.timeout,
                }
            } else {
                TransportError::TimeoutExhausted {
                    url: request.url.clone(),
                    attempts: attempt,
                    limit,
                    timeout: request.timeout,
                }
            }
        };

        for attempt in 1..=limit {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(timed_out(attempt));
            }

            let failure = match tokio::time::timeout(
                remaining,
                self.inner.execute(request.clone()),
            )
            .await
            {
                Err(_) => return Err(timed_out(attempt)),
                Ok(Ok(reply)) if reply.status < 500 => return Ok(reply),
                Ok(Ok(reply)) => TransportError::ServerError {
                    url: request.url.clone(),
                    status: reply.status,
                    size: reply.body.len(),
                },
                Ok(Err(err)) => err,
            };

            if attempt == limit {
                return Err(TransportError::Exhausted {
                    attempts: attempt,
                    limit,
                    source: Box::new(failure),
                });
            }

            debug!(
                "[{}/{}] request failed, retrying in {:?}, error: {}",
                attempt, limit, self.delay, failure
            );
            tokio::time::sleep(self.delay).await;
        }

        unreachable!("retry loop returns from its final attempt")
    }
}
