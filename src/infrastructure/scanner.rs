use crate::config::ServiceConfig;
use crate::services::scanner::VirusScanner;
use std::sync::Arc;
use tracing::info;

pub async fn setup_scanner(config: &ServiceConfig) -> anyhow::Result<Arc<dyn VirusScanner>> {
    let scanner_service = crate::services::scanner::create_scanner(
        config.enable_virus_scan,
        &config.virustotal_api_url,
        &config.virustotal_api_key,
    )?;

    if config.enable_virus_scan {
        if scanner_service.health_check().await {
            info!("🦠 Virus scanner reachable");
        } else {
            tracing::warn!(
                "⚠️  Virus scanner unreachable! Uploads will be accepted or rejected per {:?}.",
                config.scan_failure_policy
            );
        }
    }

    Ok(scanner_service.into())
}
