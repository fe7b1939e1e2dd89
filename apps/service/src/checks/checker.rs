use anyhow::{anyhow, Result};
use std::time::Instant;

use super::types::Check;

/// Raw observation from one probe, before it is graded against the
/// check's expectation.
#[derive(Debug, Clone)]
pub struct Probe {
    pub latency_ms: u64,
    /// HTTP status, when the probe speaks HTTP.
    pub status_code: Option<u16>,
    /// Matching process count, when the probe scans the process table.
    pub count: Option<usize>,
}

/// Checker trait for the different probe kinds
#[async_trait::async_trait]
pub trait Checker: Send + Sync {
    /// Perform the probe. Errors are captured into the check's result by
    /// the executor; they never propagate further.
    async fn probe(&self, check: &Check) -> Result<Probe>;
}

/// HTTP/HTTPS checker
pub struct HttpChecker {
    client: reqwest::Client,
}

impl HttpChecker {
    /// The shared client carries no timeout of its own; the executor
    /// bounds every probe with the check's timeout.
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder().build()?;
        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Checker for HttpChecker {
    async fn probe(&self, check: &Check) -> Result<Probe> {
        let start = Instant::now();

        let response = self
            .client
            .get(&check.target)
            .send()
            .await
            .map_err(|e| anyhow!("HTTP request failed: {e}"))?;

        Ok(Probe {
            latency_ms: start.elapsed().as_millis() as u64,
            status_code: Some(response.status().as_u16()),
            count: None,
        })
    }
}

/// TCP port checker
pub struct TcpChecker;

#[async_trait::async_trait]
impl Checker for TcpChecker {
    async fn probe(&self, check: &Check) -> Result<Probe> {
        let start = Instant::now();

        tokio::net::TcpStream::connect(&check.target)
            .await
            .map_err(|e| anyhow!("TCP connection failed: {e}"))?;

        Ok(Probe {
            latency_ms: start.elapsed().as_millis() as u64,
            status_code: None,
            count: None,
        })
    }
}

/// Running-process checker.
///
/// Counts processes whose comm equals the target, or whose command line
/// contains it. Reads /proc directly; on other platforms the probe fails.
pub struct ProcessChecker;

#[async_trait::async_trait]
impl Checker for ProcessChecker {
    async fn probe(&self, check: &Check) -> Result<Probe> {
        let start = Instant::now();
        let target = check.target.clone();

        // The scan is short but synchronous; keep it off the worker's
        // async thread.
        let count = tokio::task::spawn_blocking(move || count_processes(&target)).await??;

        Ok(Probe {
            latency_ms: start.elapsed().as_millis() as u64,
            status_code: None,
            count: Some(count),
        })
    }
}

#[cfg(target_os = "linux")]
fn count_processes(target: &str) -> Result<usize> {
    let mut count = 0;

    for entry in std::fs::read_dir("/proc")? {
        let entry = entry?;
        if !entry.file_name().to_string_lossy().bytes().all(|b| b.is_ascii_digit()) {
            continue;
        }

        let comm = std::fs::read_to_string(entry.path().join("comm")).unwrap_or_default();
        if comm.trim_end() == target {
            count += 1;
            continue;
        }

        // cmdline is NUL-separated; a substring match covers interpreters
        // and renamed binaries.
        let cmdline = std::fs::read(entry.path().join("cmdline")).unwrap_or_default();
        if String::from_utf8_lossy(&cmdline).replace('\0', " ").contains(target) {
            count += 1;
        }
    }

    Ok(count)
}

#[cfg(not(target_os = "linux"))]
fn count_processes(_target: &str) -> Result<usize> {
    Err(anyhow!("process checks are only supported on linux"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::types::CheckKind;
    use std::time::Duration;

    fn tcp_check(target: String) -> Check {
        Check {
            name: "port".to_owned(),
            kind: CheckKind::Tcp,
            target,
            expect: String::new(),
            timeout: Duration::from_secs(5),
            interval: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn test_tcp_probe_against_local_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let probe = TcpChecker.probe(&tcp_check(addr.to_string())).await.unwrap();
        assert!(probe.status_code.is_none());
        assert!(probe.latency_ms < 5000);
    }

    #[tokio::test]
    async fn test_tcp_probe_refused() {
        // Port 1 is essentially never listening on loopback.
        let err = TcpChecker.probe(&tcp_check("127.0.0.1:1".to_owned())).await;
        assert!(err.is_err());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_process_probe_finds_this_test_binary() {
        let check = Check {
            name: "self".to_owned(),
            kind: CheckKind::Process,
            target: "checkup".to_owned(),
            expect: String::new(),
            timeout: Duration::from_secs(5),
            interval: Duration::from_secs(60),
        };
        let probe = ProcessChecker.probe(&check).await.unwrap();
        // The test binary's own cmdline contains the crate name.
        assert!(probe.count.unwrap_or(0) >= 1);
    }
}
