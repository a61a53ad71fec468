use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::Client;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use std::time::Duration;

/// Object store collaborator. One instance is bound to one bucket.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Name of the bucket this service writes to
    fn bucket(&self) -> &str;
    async fn put_object(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()>;
    async fn get_object(&self, key: &str) -> Result<ByteStream>;
    async fn delete_object(&self, key: &str) -> Result<()>;
    async fn object_exists(&self, key: &str) -> Result<bool>;
    async fn presigned_url(&self, key: &str, ttl: Duration) -> Result<String>;
    async fn bucket_exists(&self) -> Result<bool>;
    async fn create_bucket(&self) -> Result<()>;
}

pub struct S3StorageService {
    client: Client,
    bucket: String,
}

impl S3StorageService {
    pub fn new(client: Client, bucket: String) -> Self {
        Self { client, bucket }
    }
}

#[async_trait]
impl StorageService for S3StorageService {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn put_object(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await?;
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<ByteStream> {
        let res = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await?;
        Ok(res.body)
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        let res = self
            .client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        if let Err(e) = res {
            tracing::error!(
                "S3 delete_object failed: {}/{}, error={:?}",
                self.bucket,
                key,
                e
            );
            return Err(e.into());
        }
        Ok(())
    }

    async fn object_exists(&self, key: &str) -> Result<bool> {
        let res = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await;

        match res {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(anyhow::anyhow!(service_error))
                }
            }
        }
    }

    async fn presigned_url(&self, key: &str, ttl: Duration) -> Result<String> {
        let presigning = PresigningConfig::expires_in(ttl)?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(presigning)
            .await?;
        Ok(request.uri().to_string())
    }

    async fn bucket_exists(&self) -> Result<bool> {
        match self.client.head_bucket().bucket(&self.bucket).send().await {
            Ok(_) => Ok(true),
            Err(e) => {
                let service_error = e.into_service_error();
                if service_error.is_not_found() {
                    Ok(false)
                } else {
                    Err(anyhow::anyhow!(service_error))
                }
            }
        }
    }

    async fn create_bucket(&self) -> Result<()> {
        self.client
            .create_bucket()
            .bucket(&self.bucket)
            .send()
            .await?;
        Ok(())
    }
}
