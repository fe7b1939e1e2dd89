//! Debug logging of request/response exchanges.
//!
//! Bodies are capped at a configurable size with an explicit truncation
//! marker. Request payloads are only logged when the caller asked for
//! verbose logging; otherwise a placeholder stands in so monitored-data
//! detail never leaks into the debug log.

use std::time::Duration;

use tracing::debug;

use crate::transport::{Reply, Request};

/// Marker used in place of the payload in non-verbose mode.
pub const DATA_NOT_LOGGED: &str = "<data not logged>";

/// Cap `body` at `max` bytes, marking the cut. A `max` of zero disables
/// truncation. The cut lands on a char boundary so the output stays valid.
pub(crate) fn truncate(body: &str, max: usize) -> String {
    if max == 0 || body.len() <= max {
        return body.to_owned();
    }

    let mut end = max;
    while !body.is_char_boundary(end) {
        end -= 1;
    }

    format!("{} <body truncated, max: {}>", &body[..end], max)
}

/// Mirror one finished exchange into the debug log.
pub(crate) fn log_exchange(
    request: &Request,
    reply: Option<&Reply>,
    elapsed: Duration,
    verbose: bool,
    max_body: usize,
) {
    let status = reply.map_or_else(|| "0".to_owned(), |r| r.status.to_string());

    let mut headers = String::new();
    if let Some(reply) = reply {
        for (name, value) in &reply.headers {
            headers.push_str(name);
            headers.push_str(": ");
            headers.push_str(value);
            headers.push('\n');
        }
    }

    let body = reply.map_or_else(String::new, |r| {
        truncate(&String::from_utf8_lossy(&r.body), max_body)
    });

    match &request.body {
        None => debug!(
            "Sent {} request to {} in {:?}, response ({}):\n{}{}",
            request.method, request.url, elapsed, status, headers, body
        ),
        Some(data) => {
            let data = if verbose {
                truncate(&String::from_utf8_lossy(data), max_body)
            } else {
                DATA_NOT_LOGGED.to_owned()
            };
            debug!(
                "Sent JSON payload to {} in {:?}:\n{}\nresponse ({}):\n{}{}",
                request.url, elapsed, data, status, headers, body
            );
        }
    }
}
