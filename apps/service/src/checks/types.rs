use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Kind of probe a check performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckKind {
    Http,
    Tcp,
    Process,
    Icmp,
}

impl std::fmt::Display for CheckKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckKind::Http => write!(f, "http"),
            CheckKind::Tcp => write!(f, "tcp"),
            CheckKind::Process => write!(f, "process"),
            CheckKind::Icmp => write!(f, "icmp"),
        }
    }
}

/// State of a check's most recent run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckState {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl std::fmt::Display for CheckState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CheckState::Ok => write!(f, "ok"),
            CheckState::Warning => write!(f, "warning"),
            CheckState::Critical => write!(f, "critical"),
            CheckState::Unknown => write!(f, "unknown"),
        }
    }
}

/// What prompted a report cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventType {
    Startup,
    Cron,
    Trigger,
    Api,
    /// Run everything but only log the payload locally; nothing is sent.
    Log,
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::Startup => write!(f, "startup"),
            EventType::Cron => write!(f, "cron"),
            EventType::Trigger => write!(f, "trigger"),
            EventType::Api => write!(f, "api"),
            EventType::Log => write!(f, "log"),
        }
    }
}

/// Immutable definition of one probe. Owned by the registry after setup;
/// never mutated afterward.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Check {
    /// Unique key within the registry.
    pub name: String,
    pub kind: CheckKind,
    /// URL, host:port, or process name, depending on the kind.
    pub target: String,
    /// Expected value; meaning depends on the kind. Empty uses the
    /// kind's default.
    pub expect: String,
    /// Hard bound on one execution of this check.
    pub timeout: Duration,
    /// This check's own cadence, decoupled from the report interval.
    pub interval: Duration,
}

/// Result of one check run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckResult {
    pub name: String,
    pub state: CheckState,
    pub output: String,
    pub elapsed_ms: u64,
    pub last_run: Option<DateTime<Utc>>,
}

impl CheckResult {
    /// Placeholder for a check that has not run yet
    pub fn pending(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            state: CheckState::Unknown,
            output: "check has not run yet".to_owned(),
            elapsed_ms: 0,
            last_run: None,
        }
    }

    /// Mark the run as passing
    pub fn passing(mut self, output: String, elapsed_ms: u64) -> Self {
        self.state = CheckState::Ok;
        self.output = output;
        self.elapsed_ms = elapsed_ms;
        self.last_run = Some(Utc::now());
        self
    }

    /// Mark the run as degraded (passing, but slow)
    pub fn degraded(mut self, output: String, elapsed_ms: u64) -> Self {
        self.state = CheckState::Warning;
        self.output = output;
        self.elapsed_ms = elapsed_ms;
        self.last_run = Some(Utc::now());
        self
    }

    /// Mark the run as failed
    pub fn failing(mut self, output: String, elapsed_ms: u64) -> Self {
        self.state = CheckState::Critical;
        self.output = output;
        self.elapsed_ms = elapsed_ms;
        self.last_run = Some(Utc::now());
        self
    }

    /// Mark the run as unknown (the probe could not be executed)
    pub fn unknown(mut self, output: String) -> Self {
        self.state = CheckState::Unknown;
        self.output = output;
        self.last_run = Some(Utc::now());
        self
    }
}

/// Summary of one accepted check, as reported upstream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckSummary {
    pub name: String,
    pub kind: CheckKind,
    pub expect: String,
    pub timeout_secs: u64,
    pub interval_secs: u64,
}

/// Read-only description of the accepted check set, produced once at setup
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceConfig {
    pub disabled: bool,
    pub interval_secs: u64,
    pub parallel: usize,
    pub checks: Vec<CheckSummary>,
}

/// Aggregate payload shipped upstream each report cycle. Built fresh per
/// cycle; no identity beyond the moment it is sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Results {
    pub what: EventType,
    pub interval_secs: u64,
    pub svcs: Vec<CheckResult>,
}
