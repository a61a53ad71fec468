use std::env;
use std::time::Duration;

/// What the scan gate does with content that could not be scanned
/// (scanner disabled, unreachable, or timed out).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanFailurePolicy {
    /// Unscanned content is accepted and a warning is logged
    FailOpen,
    /// Unscanned content is rejected.
    FailClosed,
}

impl ScanFailurePolicy {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "fail-open" | "fail_open" | "open" => Some(Self::FailOpen),
            "fail-closed" | "fail_closed" | "closed" => Some(Self::FailClosed),
            _ => None,
        }
    }
}

/// Service-wide configuration, injected into each component at construction
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Retention window applied when an upload or share link does not specify one (default: 7)
    pub default_expiry_days: i64,

    /// Validity of presigned download URLs handed out with file records (default: 3600)
    pub presigned_url_ttl_secs: u64,

    /// Enable virus scanning (default: true)
    pub enable_virus_scan: bool,

    /// VirusTotal API base URL
    pub virustotal_api_url: String,

    /// VirusTotal API key
    pub virustotal_api_key: String,

    /// Upper bound on waiting for a scan verdict, in milliseconds (default: 60000)
    pub scan_timeout_ms: u64,

    /// Delay between scan status polls, in milliseconds (default: 2000)
    pub scan_poll_interval_ms: u64,

    /// Policy for unscanned content (default: fail-open)
    pub scan_failure_policy: ScanFailurePolicy,

    /// OpenFGA HTTP API base URL
    pub openfga_api_url: String,

    /// OpenFGA store id
    pub openfga_store_id: String,

    /// OpenFGA authorization model id (optional, latest model when unset)
    pub openfga_model_id: Option<String>,

    /// OpenFGA pre-shared API token (optional)
    pub openfga_api_token: Option<String>,

    /// How many times owner relations are written before an upload is rolled back (default: 3)
    pub owner_grant_attempts: u32,

    /// Hour of day (UTC) at which the expiry sweep runs (default: 1)
    pub sweep_hour_utc: u32,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            default_expiry_days: 7,
            presigned_url_ttl_secs: 3600,
            enable_virus_scan: true,
            virustotal_api_url: "https://www.virustotal.com/api/v3".to_string(),
            virustotal_api_key: String::new(),
            scan_timeout_ms: 60_000,
            scan_poll_interval_ms: 2_000,
            scan_failure_policy: ScanFailurePolicy::FailOpen,
            openfga_api_url: "http://localhost:8080".to_string(),
            openfga_store_id: String::new(),
            openfga_model_id: None,
            openfga_api_token: None,
            owner_grant_attempts: 3,
            sweep_hour_utc: 1,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            default_expiry_days: env::var("DEFAULT_EXPIRY_DAYS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|days: &i64| *days > 0)
                .unwrap_or(default.default_expiry_days),

            presigned_url_ttl_secs: env::var("PRESIGNED_URL_TTL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.presigned_url_ttl_secs),

            enable_virus_scan: env::var("ENABLE_VIRUS_SCAN")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(default.enable_virus_scan),

            virustotal_api_url: env::var("VIRUSTOTAL_API_URL")
                .unwrap_or(default.virustotal_api_url),

            virustotal_api_key: env::var("VIRUSTOTAL_API_KEY")
                .unwrap_or(default.virustotal_api_key),

            scan_timeout_ms: env::var("SCAN_TIMEOUT_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.scan_timeout_ms),

            scan_poll_interval_ms: env::var("SCAN_POLL_INTERVAL_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.scan_poll_interval_ms),

            scan_failure_policy: env::var("SCAN_FAILURE_POLICY")
                .ok()
                .and_then(|v| ScanFailurePolicy::parse(&v))
                .unwrap_or(default.scan_failure_policy),

            openfga_api_url: env::var("OPENFGA_API_URL").unwrap_or(default.openfga_api_url),

            openfga_store_id: env::var("OPENFGA_STORE_ID").unwrap_or(default.openfga_store_id),

            openfga_model_id: env::var("OPENFGA_MODEL_ID").ok().filter(|v| !v.is_empty()),

            openfga_api_token: env::var("OPENFGA_API_TOKEN").ok().filter(|v| !v.is_empty()),

            owner_grant_attempts: env::var("OWNER_GRANT_ATTEMPTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|attempts: &u32| *attempts > 0)
                .unwrap_or(default.owner_grant_attempts),

            sweep_hour_utc: env::var("SWEEP_HOUR_UTC")
                .ok()
                .and_then(|v| v.parse().ok())
                .filter(|hour: &u32| *hour < 24)
                .unwrap_or(default.sweep_hour_utc),
        }
    }

    /// Create config for development (no virus scanning, short timeouts)
    pub fn development() -> Self {
        Self {
            enable_virus_scan: false,
            scan_timeout_ms: 5_000,
            scan_poll_interval_ms: 100,
            ..Self::default()
        }
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.scan_timeout_ms)
    }

    pub fn scan_poll_interval(&self) -> Duration {
        Duration::from_millis(self.scan_poll_interval_ms)
    }

    pub fn presigned_url_ttl(&self) -> Duration {
        Duration::from_secs(self.presigned_url_ttl_secs)
    }
}
