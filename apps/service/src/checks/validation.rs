//! Check definition validation and engine policy bounds.
//!
//! Validation runs once at setup and rejects the first bad definition,
//! naming the offending check. Intervals and engine-level knobs
//! (parallelism, report interval) are clamped instead of rejected.

use std::time::Duration;

use thiserror::Error;
use url::Url;

use super::types::{Check, CheckKind};

/// Hard ceiling on the worker pool size
pub const MAXIMUM_PARALLEL: usize = 10;

/// Floor for a single check's own interval
pub const MINIMUM_CHECK_INTERVAL: Duration = Duration::from_secs(10);

/// Report interval used when none is configured
pub const DEFAULT_SEND_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Floor for the report interval, to prevent runaway polling
pub const MINIMUM_SEND_INTERVAL: Duration = Duration::from_secs(5 * 60);

/// A bad check definition. Fatal to setup only.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("check has no name (target: {target})")]
    UnnamedCheck { target: String },

    #[error("duplicate check name: {name}")]
    DuplicateName { name: String },

    #[error("check {name}: timeout must be greater than zero")]
    ZeroTimeout { name: String },

    #[error("check {name}: {reason}")]
    BadTarget { name: String, reason: String },
}

/// Validate one check definition
pub fn validate_check(check: &Check) -> Result<(), ValidationError> {
    if check.name.is_empty() {
        return Err(ValidationError::UnnamedCheck { target: check.target.clone() });
    }

    if check.timeout.is_zero() {
        return Err(ValidationError::ZeroTimeout { name: check.name.clone() });
    }

    match check.kind {
        CheckKind::Http => validate_http_target(check),
        CheckKind::Tcp => validate_tcp_target(check),
        CheckKind::Process => validate_process_target(check),
        // Reserved kind; the target is a bare host, nothing to reject.
        CheckKind::Icmp => Ok(()),
    }
}

/// Validate an HTTP target and its expected status list
fn validate_http_target(check: &Check) -> Result<(), ValidationError> {
    let bad = |reason: String| ValidationError::BadTarget {
        name: check.name.clone(),
        reason,
    };

    let url = Url::parse(&check.target).map_err(|e| bad(format!("invalid URL: {e}")))?;

    match url.scheme() {
        "http" | "https" => {}
        other => return Err(bad(format!("invalid scheme for http check: {other}"))),
    }

    if url.host_str().is_none() {
        return Err(bad("URL has no host".to_owned()));
    }

    for code in expected_statuses(&check.expect) {
        code.map_err(|raw| bad(format!("invalid expected status code: {raw}")))?;
    }

    Ok(())
}

/// Validate a TCP target in host:port form
fn validate_tcp_target(check: &Check) -> Result<(), ValidationError> {
    let bad = |reason: &str| ValidationError::BadTarget {
        name: check.name.clone(),
        reason: reason.to_owned(),
    };

    let Some((host, port)) = check.target.rsplit_once(':') else {
        return Err(bad("tcp target must be in host:port form"));
    };

    if host.is_empty() {
        return Err(bad("tcp target has no host"));
    }

    match port.parse::<u16>() {
        Ok(0) => Err(bad("port 0 is not valid")),
        Ok(_) => Ok(()),
        Err(_) => Err(bad("invalid port number")),
    }
}

/// Validate a process target and its expected minimum count
fn validate_process_target(check: &Check) -> Result<(), ValidationError> {
    let bad = |reason: &str| ValidationError::BadTarget {
        name: check.name.clone(),
        reason: reason.to_owned(),
    };

    if check.target.is_empty() {
        return Err(bad("process target must name a process"));
    }

    if !check.expect.is_empty() && check.expect.parse::<usize>().is_err() {
        return Err(bad("process expect must be a minimum count"));
    }

    Ok(())
}

/// Parse an expect string into status codes. Empty means just 200.
pub fn expected_statuses(expect: &str) -> impl Iterator<Item = Result<u16, String>> + '_ {
    let raw = if expect.is_empty() { "200" } else { expect };
    raw.split(',').map(|part| {
        let part = part.trim();
        part.parse::<u16>().map_err(|_| part.to_owned())
    })
}

/// Clamp the worker pool size to `[1, MAXIMUM_PARALLEL]`
pub fn clamp_parallel(parallel: usize) -> usize {
    parallel.clamp(1, MAXIMUM_PARALLEL)
}

/// Clamp a single check's interval to the floor that prevents runaway
/// polling
pub fn clamp_check_interval(interval: Duration) -> Duration {
    interval.max(MINIMUM_CHECK_INTERVAL)
}

/// Clamp the report interval; zero selects the default
pub fn clamp_interval(interval: Duration) -> Duration {
    if interval.is_zero() {
        DEFAULT_SEND_INTERVAL
    } else {
        interval.max(MINIMUM_SEND_INTERVAL)
    }
}
