use anyhow::Result;
use std::time::Duration;

use super::checker::{Checker, HttpChecker, Probe, ProcessChecker, TcpChecker};
use super::types::{Check, CheckKind, CheckResult};
use super::validation::expected_statuses;

/// Executes individual checks and grades the outcome.
///
/// A probe error never propagates: it becomes a Critical result with the
/// error text as output. Latency above the degraded threshold demotes a
/// passing run to Warning.
pub struct Executor {
    http_checker: HttpChecker,
    tcp_checker: TcpChecker,
    process_checker: ProcessChecker,
    degraded_threshold: Duration,
}

impl Executor {
    pub fn new(degraded_threshold: Duration) -> Result<Self> {
        Ok(Self {
            http_checker: HttpChecker::new()?,
            tcp_checker: TcpChecker,
            process_checker: ProcessChecker,
            degraded_threshold,
        })
    }

    /// Execute one check, bounded by the check's own timeout.
    pub async fn execute(&self, check: &Check) -> CheckResult {
        let result = CheckResult::pending(&check.name);

        let checker: &dyn Checker = match check.kind {
            CheckKind::Http => &self.http_checker,
            CheckKind::Tcp => &self.tcp_checker,
            CheckKind::Process => &self.process_checker,
            CheckKind::Icmp => {
                return result.unknown("icmp checks are not implemented".to_owned());
            }
        };

        match tokio::time::timeout(check.timeout, checker.probe(check)).await {
            Err(_) => result.failing(
                format!("timed out after {:?}", check.timeout),
                check.timeout.as_millis() as u64,
            ),
            Ok(Err(err)) => result.failing(err.to_string(), 0),
            Ok(Ok(probe)) => self.grade(check, probe, result),
        }
    }

    /// Grade a completed probe against the check's expectation.
    fn grade(&self, check: &Check, probe: Probe, result: CheckResult) -> CheckResult {
        let degraded = probe.latency_ms > self.degraded_threshold.as_millis() as u64;

        match check.kind {
            CheckKind::Http => {
                let status = probe.status_code.unwrap_or_default();
                let wanted: Vec<u16> =
                    expected_statuses(&check.expect).filter_map(|c| c.ok()).collect();

                if !wanted.contains(&status) {
                    let want = wanted
                        .iter()
                        .map(u16::to_string)
                        .collect::<Vec<_>>()
                        .join(",");
                    return result.failing(
                        format!("unexpected status {status} (want {want})"),
                        probe.latency_ms,
                    );
                }

                let output = format!("HTTP {status} in {}ms", probe.latency_ms);
                if degraded {
                    result.degraded(output, probe.latency_ms)
                } else {
                    result.passing(output, probe.latency_ms)
                }
            }
            CheckKind::Tcp => {
                let output = format!("connected in {}ms", probe.latency_ms);
                if degraded {
                    result.degraded(output, probe.latency_ms)
                } else {
                    result.passing(output, probe.latency_ms)
                }
            }
            CheckKind::Process => {
                let found = probe.count.unwrap_or_default();
                let want: usize = check.expect.parse().unwrap_or(1);
                let output = format!("{found} processes named {} (want >= {want})", check.target);
                if found >= want {
                    result.passing(output, probe.latency_ms)
                } else {
                    result.failing(output, probe.latency_ms)
                }
            }
            CheckKind::Icmp => result.unknown("icmp checks are not implemented".to_owned()),
        }
    }
}
