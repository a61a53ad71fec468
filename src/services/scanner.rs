use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use url::Url;

/// Upper bound for a single VirusTotal request
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Analysis state reported by the scanning backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisStatus {
    /// Queued or still running
    Pending,
    Completed,
}

/// Engine statistics for a finished (or partial) analysis
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ScanStats {
    #[serde(default)]
    pub malicious: i32,
    #[serde(default)]
    pub suspicious: i32,
    #[serde(default)]
    pub undetected: i32,
    #[serde(default)]
    pub harmless: i32,
}

/// One poll response from the scanning backend
#[derive(Debug, Clone)]
pub struct ScanReport {
    pub status: AnalysisStatus,
    pub stats: ScanStats,
    pub resource: Option<String>,
    pub permalink: Option<String>,
    pub results: Option<Value>,
}

/// Scanning backend: submit content, then poll the returned analysis handle
#[async_trait::async_trait]
pub trait VirusScanner: Send + Sync {
    /// Submit content for analysis and return the backend's analysis id
    async fn submit(&self, filename: &str, content: &[u8]) -> Result<String>;

    /// Fetch the current state of an analysis
    async fn poll(&self, analysis_id: &str) -> Result<ScanReport>;

    /// Check if the scanner is available/healthy
    async fn health_check(&self) -> bool;
}

/// VirusTotal v3 API scanner
///
/// Uploads via `POST /files` and polls `GET /analyses/{id}`.
pub struct VirusTotalScanner {
    client: reqwest::Client,
    api_url: Url,
    api_key: String,
}

#[derive(Deserialize)]
struct SubmitResponse {
    data: SubmitData,
}

#[derive(Deserialize)]
struct SubmitData {
    id: String,
}

#[derive(Deserialize)]
struct AnalysisResponse {
    data: AnalysisData,
}

#[derive(Deserialize)]
struct AnalysisData {
    id: Option<String>,
    attributes: AnalysisAttributes,
    #[serde(default)]
    links: Option<AnalysisLinks>,
}

#[derive(Deserialize)]
struct AnalysisAttributes {
    status: String,
    #[serde(default)]
    stats: ScanStats,
    #[serde(default)]
    results: Option<Value>,
    #[serde(default)]
    permalink: Option<String>,
}

#[derive(Deserialize)]
struct AnalysisLinks {
    #[serde(rename = "self")]
    self_link: Option<String>,
}

impl VirusTotalScanner {
    pub fn new(api_url: &str, api_key: String) -> Result<Self> {
        // Trailing slash so that `join` appends instead of replacing the last segment
        let base = if api_url.ends_with('/') {
            api_url.to_string()
        } else {
            format!("{}/", api_url)
        };
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            api_url: Url::parse(&base)
                .map_err(|e| anyhow!("Invalid VirusTotal API URL {}: {}", api_url, e))?,
            api_key,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.api_url
            .join(path)
            .map_err(|e| anyhow!("Invalid VirusTotal endpoint {}: {}", path, e))
    }
}

#[async_trait::async_trait]
impl VirusScanner for VirusTotalScanner {
    async fn submit(&self, filename: &str, content: &[u8]) -> Result<String> {
        let part = reqwest::multipart::Part::bytes(content.to_vec()).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(self.endpoint("files")?)
            .header("x-apikey", &self.api_key)
            .multipart(form)
            .send()
            .await
            .map_err(|e| anyhow!("Failed to upload file to VirusTotal: {}", e))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "VirusTotal rejected upload with status {}",
                response.status()
            ));
        }

        let body: SubmitResponse = response.json().await?;
        tracing::debug!("VirusTotal analysis queued: {}", body.data.id);
        Ok(body.data.id)
    }

    async fn poll(&self, analysis_id: &str) -> Result<ScanReport> {
        let response = self
            .client
            .get(self.endpoint(&format!("analyses/{}", analysis_id))?)
            .header("x-apikey", &self.api_key)
            .header("accept", "application/json")
            .send()
            .await
            .map_err(|e| anyhow!("Failed to fetch VirusTotal analysis: {}", e))?;

        if !response.status().is_success() {
            return Err(anyhow!(
                "VirusTotal analysis {} returned status {}",
                analysis_id,
                response.status()
            ));
        }

        let body: AnalysisResponse = response.json().await?;
        let attributes = body.data.attributes;
        let status = if attributes.status == "completed" {
            AnalysisStatus::Completed
        } else {
            AnalysisStatus::Pending
        };
        let permalink = attributes
            .permalink
            .or_else(|| body.data.links.and_then(|l| l.self_link));

        Ok(ScanReport {
            status,
            stats: attributes.stats,
            resource: body.data.id,
            permalink,
            results: attributes.results,
        })
    }

    async fn health_check(&self) -> bool {
        if self.api_key.is_empty() {
            return false;
        }
        match self.endpoint("metadata") {
            Ok(url) => self
                .client
                .get(url)
                .header("x-apikey", &self.api_key)
                .send()
                .await
                .map(|r| r.status().is_success())
                .unwrap_or(false),
            Err(_) => false,
        }
    }
}

/// No-op scanner for development/testing. Every analysis completes immediately and clean.
pub struct NoOpScanner;

#[async_trait::async_trait]
impl VirusScanner for NoOpScanner {
    async fn submit(&self, _filename: &str, _content: &[u8]) -> Result<String> {
        tracing::warn!("NoOpScanner: Skipping virus scan (development mode)");
        Ok("noop".to_string())
    }

    async fn poll(&self, analysis_id: &str) -> Result<ScanReport> {
        Ok(ScanReport {
            status: AnalysisStatus::Completed,
            stats: ScanStats::default(),
            resource: Some(analysis_id.to_string()),
            permalink: None,
            results: None,
        })
    }

    async fn health_check(&self) -> bool {
        true
    }
}

/// Factory function to create appropriate scanner based on config.
///
/// An enabled scanner with an unusable endpoint is an error, never a silent no-op.
pub fn create_scanner(
    enabled: bool,
    api_url: &str,
    api_key: &str,
) -> Result<Box<dyn VirusScanner>> {
    if !enabled {
        return Ok(Box::new(NoOpScanner));
    }
    Ok(Box::new(VirusTotalScanner::new(api_url, api_key.to_string())?))
}
