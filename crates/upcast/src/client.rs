//! The dispatch client: JSON in, envelope out, retries underneath.

use std::time::{Duration, Instant};

use reqwest::Method;
use serde::Serialize;
use url::Url;

use crate::diag;
use crate::error::Error;
use crate::response::{self, Response};
use crate::transport::{HttpTransport, Request, RetryTransport, Transport};
use crate::{Result, DEFAULT_MAX_BODY, DEFAULT_RETRIES, DEFAULT_RETRY_DELAY, DEFAULT_TIMEOUT};

/// Connection settings for one upstream.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL every route is joined onto.
    pub base_url: String,
    /// Value of the X-API-Key header.
    pub api_key: String,
    /// Deadline covering all attempts of one dispatch.
    pub timeout: Duration,
    /// Additional attempts after the first failure.
    pub retries: u32,
    /// Fixed delay between attempts.
    pub retry_delay: Duration,
    /// Cap on logged bodies, in bytes. Zero disables the cap.
    pub max_body: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: String::new(),
            api_key: String::new(),
            timeout: DEFAULT_TIMEOUT,
            retries: DEFAULT_RETRIES,
            retry_delay: DEFAULT_RETRY_DELAY,
            max_body: DEFAULT_MAX_BODY,
        }
    }
}

/// Client for one upstream endpoint.
///
/// Generic over the transport so tests can substitute a scripted one; the
/// default wires the reqwest-backed [`HttpTransport`] behind the retry
/// decorator.
pub struct Client<T: Transport = HttpTransport> {
    config: ClientConfig,
    transport: RetryTransport<T>,
}

impl Client<HttpTransport> {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = HttpTransport::new()?;
        Self::with_transport(config, transport)
    }
}

impl<T: Transport> Client<T> {
    /// Wrap an arbitrary base transport in the retry decorator.
    pub fn with_transport(config: ClientConfig, transport: T) -> Result<Self> {
        Url::parse(&config.base_url)?;
        let transport = RetryTransport::new(transport, config.retries, config.retry_delay);
        Ok(Self { config, transport })
    }

    /// POST `payload` as JSON to base URL + `route` and decode the envelope.
    /// The payload is pretty-printed only when `verbose` logging was asked
    /// for, and is otherwise kept out of the logs entirely.
    pub async fn send<P: Serialize>(
        &self,
        route: &str,
        payload: &P,
        verbose: bool,
    ) -> Result<Response> {
        let body = if verbose {
            serde_json::to_vec_pretty(payload)
        } else {
            serde_json::to_vec(payload)
        }
        .map_err(Error::Encode)?;

        let url = format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            route.trim_start_matches('/')
        );

        self.dispatch(Method::POST, url, Some(body), verbose).await
    }

    /// GET an absolute URL and decode the envelope. Idempotent reads only.
    pub async fn get(&self, url: &str) -> Result<Response> {
        self.dispatch(Method::GET, url.to_owned(), None, false).await
    }

    async fn dispatch(
        &self,
        method: Method,
        url: String,
        body: Option<Vec<u8>>,
        verbose: bool,
    ) -> Result<Response> {
        let mut headers = vec![("X-API-Key".to_owned(), self.config.api_key.clone())];
        if body.is_some() {
            headers.push(("Content-Type".to_owned(), "application/json".to_owned()));
        }

        let request = Request {
            method,
            url: url.clone(),
            headers,
            body,
            timeout: self.config.timeout,
        };

        let started = Instant::now();
        let outcome = self.transport.execute(request.clone()).await;
        diag::log_exchange(
            &request,
            outcome.as_ref().ok(),
            started.elapsed(),
            verbose,
            self.config.max_body,
        );

        let reply = outcome?;
        response::unmarshal(&url, reply.status, &reply.body)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::error::TransportError;
    use crate::transport::Reply;

    /// Scripted transport: replays a fixed sequence of status codes and
    /// counts attempts.
    struct ScriptedTransport {
        statuses: Vec<u16>,
        body: Vec<u8>,
        attempts: Arc<AtomicU32>,
    }

    #[async_trait::async_trait]
    impl Transport for ScriptedTransport {
        async fn execute(&self, _request: Request) -> std::result::Result<Reply, TransportError> {
            let n = self.attempts.fetch_add(1, Ordering::SeqCst) as usize;
            let status = *self.statuses.get(n).unwrap_or(self.statuses.last().unwrap());
            Ok(Reply { status, headers: vec![], body: self.body.clone() })
        }
    }

    fn envelope() -> Vec<u8> {
        br#"{"result":"success","message":{"response":null,"details":""}}"#.to_vec()
    }

    fn config(retries: u32) -> ClientConfig {
        ClientConfig {
            base_url: "http://up.example".to_owned(),
            api_key: "test-key".to_owned(),
            timeout: Duration::from_secs(5),
            retries,
            retry_delay: Duration::from_millis(1),
            max_body: 1000,
        }
    }

    fn scripted(
        statuses: Vec<u16>,
        retries: u32,
    ) -> (Client<ScriptedTransport>, Arc<AtomicU32>) {
        let attempts = Arc::new(AtomicU32::new(0));
        let transport = ScriptedTransport {
            statuses,
            body: envelope(),
            attempts: attempts.clone(),
        };
        let client = Client::with_transport(config(retries), transport).unwrap();
        (client, attempts)
    }

    #[tokio::test]
    async fn test_send_success_is_one_attempt() {
        let (client, attempts) = scripted(vec![200], 3);
        let response = client.send("/api/v1/results", &serde_json::json!({}), false).await;
        assert!(response.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_permanent_failure_spends_retries_plus_one_attempts() {
        let (client, attempts) = scripted(vec![500], 3);
        let err = client.send("/api/v1/results", &serde_json::json!({}), false).await.unwrap_err();
        assert_eq!(attempts.load(Ordering::SeqCst), 4);
        match err {
            Error::Transport(TransportError::Exhausted { attempts, limit, .. }) => {
                assert_eq!(attempts, 4);
                assert_eq!(limit, 4);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_not_found_is_not_retried() {
        let (client, attempts) = scripted(vec![404], 3);
        let err = client.send("/api/v1/results", &serde_json::json!({}), false).await.unwrap_err();
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(matches!(err, Error::NonSuccessStatus { status: 404, .. }));
    }

    #[tokio::test]
    async fn test_server_error_then_success_recovers() {
        let (client, attempts) = scripted(vec![503, 502, 200], 3);
        let response = client.send("/api/v1/results", &serde_json::json!({}), false).await;
        assert!(response.is_ok());
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_timeout_fails_fast_on_first_attempt() {
        struct HangingTransport;

        #[async_trait::async_trait]
        impl Transport for HangingTransport {
            async fn execute(
                &self,
                _request: Request,
            ) -> std::result::Result<Reply, TransportError> {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!()
            }
        }

        let mut cfg = config(3);
        cfg.timeout = Duration::from_millis(20);
        let client = Client::with_transport(cfg, HangingTransport).unwrap();
        let err = client.get("http://up.example/api/v1/ping").await.unwrap_err();
        assert!(matches!(err, Error::Transport(TransportError::Timeout { .. })));
    }

    #[tokio::test]
    async fn test_bad_base_url_rejected_up_front() {
        let mut cfg = config(0);
        cfg.base_url = "not a url".to_owned();
        let attempts = Arc::new(AtomicU32::new(0));
        let transport =
            ScriptedTransport { statuses: vec![200], body: envelope(), attempts };
        assert!(matches!(
            Client::with_transport(cfg, transport),
            Err(Error::BaseUrl(_))
        ));
    }

    #[tokio::test]
    async fn test_get_decodes_envelope() {
        let (client, _) = scripted(vec![200], 0);
        let response = client.get("http://up.example/api/v1/ping").await.unwrap();
        assert_eq!(response.result, crate::ReplyStatus::Success);
    }
}
