use crate::services::storage::{S3StorageService, StorageService};
use anyhow::Context;
use aws_sdk_s3::config::Region;
use std::env;
use std::sync::Arc;
use tracing::info;

pub async fn setup_storage() -> anyhow::Result<Arc<S3StorageService>> {
    let endpoint_url = env::var("MINIO_ENDPOINT").context("MINIO_ENDPOINT must be set")?;
    let access_key = env::var("MINIO_ACCESS_KEY").context("MINIO_ACCESS_KEY must be set")?;
    let secret_key = env::var("MINIO_SECRET_KEY").context("MINIO_SECRET_KEY must be set")?;
    let bucket = env::var("MINIO_BUCKET").context("MINIO_BUCKET must be set")?;
    let region = env::var("MINIO_REGION").unwrap_or_else(|_| "us-east-1".to_string());

    info!("☁️  S3 Storage: {} (Bucket: {})", endpoint_url, bucket);

    let aws_config = aws_config::from_env()
        .endpoint_url(&endpoint_url)
        .region(Region::new(region))
        .credentials_provider(aws_sdk_s3::config::Credentials::new(
            access_key, secret_key, None, None, "static",
        ))
        .load()
        .await;

    let s3_config = aws_sdk_s3::config::Builder::from(&aws_config)
        .force_path_style(true)
        .build();

    let s3_client = aws_sdk_s3::Client::from_conf(s3_config);
    let storage = Arc::new(S3StorageService::new(s3_client, bucket));

    ensure_bucket(storage.as_ref()).await?;
    Ok(storage)
}

/// Create the bucket if it does not exist yet
pub async fn ensure_bucket(storage: &dyn StorageService) -> anyhow::Result<()> {
    if storage.bucket_exists().await? {
        info!("   - Bucket '{}' exists", storage.bucket());
    } else {
        storage
            .create_bucket()
            .await
            .with_context(|| format!("Failed to create bucket '{}'", storage.bucket()))?;
        info!("   - Bucket '{}' created", storage.bucket());
    }
    Ok(())
}
