use crate::config::ServiceConfig;
use crate::services::authorization::{AuthorizationService, OpenFgaClient};
use std::sync::Arc;
use tracing::info;

pub fn setup_authorization(config: &ServiceConfig) -> anyhow::Result<Arc<AuthorizationService>> {
    let client = OpenFgaClient::new(
        &config.openfga_api_url,
        &config.openfga_store_id,
        config.openfga_model_id.clone(),
        config.openfga_api_token.clone(),
    )?;

    info!(
        "🔐 OpenFGA: {} (store {})",
        config.openfga_api_url, config.openfga_store_id
    );

    Ok(Arc::new(AuthorizationService::new(Arc::new(client), config)))
}
