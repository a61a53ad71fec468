use crate::config::{ScanFailurePolicy, ServiceConfig};
use crate::services::scanner::{AnalysisStatus, ScanReport, VirusScanner};
use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::time::{sleep, timeout};

/// Verdict of one pass through the scan gate. Persisted by the caller.
#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    /// False when no verdict was obtained (disabled, timeout, transport failure)
    pub scanned: bool,
    pub clean: bool,
    pub positives: Option<i32>,
    pub total: Option<i32>,
    pub scan_id: Option<String>,
    pub resource: Option<String>,
    pub permalink: Option<String>,
    pub details: Option<Value>,
    pub message: String,
}

impl ScanOutcome {
    fn unscanned(clean: bool, message: String) -> Self {
        Self {
            scanned: false,
            clean,
            positives: None,
            total: None,
            scan_id: None,
            resource: None,
            permalink: None,
            details: None,
            message,
        }
    }

    fn from_report(scan_id: String, report: ScanReport) -> Self {
        let malicious = report.stats.malicious;
        let total = malicious + report.stats.undetected;
        Self {
            scanned: true,
            clean: malicious == 0,
            positives: Some(malicious),
            total: Some(total),
            scan_id: Some(scan_id),
            resource: report.resource,
            permalink: report.permalink,
            details: report.results,
            message: if malicious > 0 {
                "Virus detected".to_string()
            } else {
                "No virus detected".to_string()
            },
        }
    }
}

pub struct ScanGate {
    scanner: Arc<dyn VirusScanner>,
    config: ServiceConfig,
}

impl ScanGate {
    pub fn new(scanner: Arc<dyn VirusScanner>, config: ServiceConfig) -> Self {
        Self { scanner, config }
    }

    /// Submit content to the scanner and wait (bounded) for a verdict.
    ///
    /// Never fails: transport errors and timeouts come back as an unscanned outcome.
    pub async fn scan(&self, content: &[u8], filename: &str, content_type: &str) -> ScanOutcome {
        if !self.config.enable_virus_scan {
            tracing::info!("Virus scanning is disabled, skipping scan for {}", filename);
            return ScanOutcome::unscanned(true, "Virus scanning is disabled".to_string());
        }

        tracing::info!(
            "Scanning {} ({} bytes, {})",
            filename,
            content.len(),
            content_type
        );

        let limit = self.config.scan_timeout();
        match timeout(limit, self.submit_and_wait(filename, content)).await {
            Ok(Ok((scan_id, report))) => {
                let outcome = ScanOutcome::from_report(scan_id, report);
                if !outcome.clean {
                    tracing::warn!(
                        "Scan flagged {}: {}/{} engines report malicious",
                        filename,
                        outcome.positives.unwrap_or_default(),
                        outcome.total.unwrap_or_default()
                    );
                }
                outcome
            }
            Ok(Err(e)) => {
                tracing::error!("Error scanning file {}: {}", filename, e);
                ScanOutcome::unscanned(false, format!("Error scanning file: {}", e))
            }
            Err(_) => {
                tracing::warn!("Scan of {} did not complete within {:?}", filename, limit);
                ScanOutcome::unscanned(
                    false,
                    format!("Scan did not complete within {} ms", limit.as_millis()),
                )
            }
        }
    }

    /// Submit, then poll until the analysis completes. Bounded by the caller.
    async fn submit_and_wait(&self, filename: &str, content: &[u8]) -> Result<(String, ScanReport)> {
        let scan_id = self.scanner.submit(filename, content).await?;
        let report = self.wait_for_completion(&scan_id).await?;
        Ok((scan_id, report))
    }

    async fn wait_for_completion(&self, scan_id: &str) -> Result<ScanReport> {
        let interval = self.config.scan_poll_interval();
        loop {
            let report = self.scanner.poll(scan_id).await?;
            if report.status == AnalysisStatus::Completed {
                return Ok(report);
            }
            tracing::debug!("Analysis {} still pending, next poll in {:?}", scan_id, interval);
            sleep(interval).await;
        }
    }

    /// Whether content with this outcome may be stored
    pub fn is_safe(&self, outcome: &ScanOutcome) -> bool {
        if outcome.scanned {
            return outcome.clean;
        }
        match self.config.scan_failure_policy {
            ScanFailurePolicy::FailOpen => {
                if self.config.enable_virus_scan {
                    tracing::warn!(
                        "Accepting unscanned content under fail-open policy: {}",
                        outcome.message
                    );
                }
                true
            }
            ScanFailurePolicy::FailClosed => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::scanner::ScanStats;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Reports `pending` for the first `pending_polls` polls, then completes with `stats`
    struct SlowScanner {
        pending_polls: usize,
        polls: AtomicUsize,
        stats: ScanStats,
    }

    #[async_trait::async_trait]
    impl VirusScanner for SlowScanner {
        async fn submit(&self, _filename: &str, _content: &[u8]) -> Result<String> {
            Ok("analysis-1".to_string())
        }

        async fn poll(&self, analysis_id: &str) -> Result<ScanReport> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst);
            let status = if n < self.pending_polls {
                AnalysisStatus::Pending
            } else {
                AnalysisStatus::Completed
            };
            Ok(ScanReport {
                status,
                stats: self.stats.clone(),
                resource: Some(analysis_id.to_string()),
                permalink: Some("https://scanner/analysis-1".to_string()),
                results: None,
            })
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    struct UnreachableScanner;

    #[async_trait::async_trait]
    impl VirusScanner for UnreachableScanner {
        async fn submit(&self, _filename: &str, _content: &[u8]) -> Result<String> {
            Err(anyhow::anyhow!("connection refused"))
        }

        async fn poll(&self, _analysis_id: &str) -> Result<ScanReport> {
            Err(anyhow::anyhow!("connection refused"))
        }

        async fn health_check(&self) -> bool {
            false
        }
    }

    /// Accepts the upload but never answers
    struct HangingScanner;

    #[async_trait::async_trait]
    impl VirusScanner for HangingScanner {
        async fn submit(&self, _filename: &str, _content: &[u8]) -> Result<String> {
            std::future::pending::<Result<_>>().await
        }

        async fn poll(&self, _analysis_id: &str) -> Result<ScanReport> {
            std::future::pending::<Result<_>>().await
        }

        async fn health_check(&self) -> bool {
            true
        }
    }

    fn enabled_config() -> ServiceConfig {
        ServiceConfig {
            enable_virus_scan: true,
            scan_timeout_ms: 500,
            scan_poll_interval_ms: 10,
            ..ServiceConfig::default()
        }
    }

    fn slow(pending_polls: usize, malicious: i32) -> Arc<SlowScanner> {
        Arc::new(SlowScanner {
            pending_polls,
            polls: AtomicUsize::new(0),
            stats: ScanStats {
                malicious,
                undetected: 70,
                ..ScanStats::default()
            },
        })
    }

    #[tokio::test]
    async fn test_disabled_scan_is_clean_and_unscanned() {
        let gate = ScanGate::new(Arc::new(UnreachableScanner), ServiceConfig::development());
        let outcome = gate.scan(b"data", "a.txt", "text/plain").await;
        assert!(!outcome.scanned);
        assert!(outcome.clean);
        assert!(gate.is_safe(&outcome));
    }

    #[tokio::test]
    async fn test_polls_until_completed() {
        let scanner = slow(3, 0);
        let gate = ScanGate::new(scanner.clone(), enabled_config());
        let outcome = gate.scan(b"data", "a.txt", "text/plain").await;
        assert!(outcome.scanned);
        assert!(outcome.clean);
        assert_eq!(outcome.positives, Some(0));
        assert_eq!(outcome.total, Some(70));
        assert_eq!(outcome.scan_id.as_deref(), Some("analysis-1"));
        assert_eq!(scanner.polls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_malicious_content_is_unsafe() {
        let gate = ScanGate::new(slow(0, 3), enabled_config());
        let outcome = gate.scan(b"X5O!P%@AP", "eicar.com", "application/octet-stream").await;
        assert!(outcome.scanned);
        assert!(!outcome.clean);
        assert_eq!(outcome.total, Some(73));
        assert_eq!(outcome.message, "Virus detected");
        assert!(!gate.is_safe(&outcome));
    }

    #[tokio::test]
    async fn test_timeout_yields_unscanned() {
        let gate = ScanGate::new(slow(usize::MAX, 0), enabled_config());
        let outcome = gate.scan(b"data", "a.txt", "text/plain").await;
        assert!(!outcome.scanned);
        assert!(!outcome.clean);
        // fail-open by default
        assert!(gate.is_safe(&outcome));
    }

    #[tokio::test]
    async fn test_transport_failure_respects_policy() {
        let outcome = ScanGate::new(Arc::new(UnreachableScanner), enabled_config())
            .scan(b"data", "a.txt", "text/plain")
            .await;
        assert!(!outcome.scanned);
        assert!(outcome.message.contains("connection refused"));

        let open = ScanGate::new(Arc::new(UnreachableScanner), enabled_config());
        assert!(open.is_safe(&outcome));

        let closed = ScanGate::new(
            Arc::new(UnreachableScanner),
            ServiceConfig {
                scan_failure_policy: ScanFailurePolicy::FailClosed,
                ..enabled_config()
            },
        );
        assert!(!closed.is_safe(&outcome));
    }

    #[tokio::test]
    async fn test_hanging_submit_is_bounded() {
        let gate = ScanGate::new(
            Arc::new(HangingScanner),
            ServiceConfig {
                scan_failure_policy: ScanFailurePolicy::FailClosed,
                ..enabled_config()
            },
        );
        let outcome = tokio::time::timeout(
            std::time::Duration::from_secs(5),
            gate.scan(b"data", "a.txt", "text/plain"),
        )
        .await
        .expect("scan gate blocked on submit");
        assert!(!outcome.scanned);
        assert!(!outcome.clean);
        assert!(outcome.message.contains("did not complete"));
        assert!(!gate.is_safe(&outcome));
    }
}
