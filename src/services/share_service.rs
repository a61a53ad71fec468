use crate::config::ServiceConfig;
use crate::entities::{prelude::*, *};
use crate::error::AppError;
use crate::models::{FileDto, SharePermission, ShareLinkDto, expires_after};
use crate::services::authorization::{AuthorizationService, FILE_TYPE, FileRelation};
use crate::services::storage::StorageService;
use aws_sdk_s3::primitives::ByteStream;
use base64::Engine;
use chrono::{DateTime, Utc};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use std::sync::Arc;
use uuid::Uuid;

const SECONDS_PER_DAY: i64 = 86_400;

/// Shortest URL lifetime handed out with a link
const MIN_URL_TTL_SECS: i64 = 3_600;

/// SigV4 presigned URLs cannot outlive one week
const MAX_URL_TTL_SECS: i64 = 7 * SECONDS_PER_DAY;

/// Capability links: bearer tokens granting READ or WRITE on one file until expiry
pub struct ShareService {
    db: DatabaseConnection,
    storage: Arc<dyn StorageService>,
    authz: Arc<AuthorizationService>,
    config: ServiceConfig,
}

impl ShareService {
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<dyn StorageService>,
        authz: Arc<AuthorizationService>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            db,
            storage,
            authz,
            config,
        }
    }

    /// 32 random bytes, URL-safe base64 without padding
    pub fn generate_token() -> String {
        use rand::Rng;
        let mut rng = rand::thread_rng();
        let bytes: [u8; 32] = rng.r#gen();
        base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
    }

    /// URL lifetime for a link: remaining whole days, at least one hour
    pub fn url_ttl(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> std::time::Duration {
        let days = (expires_at - now).num_days();
        let secs = if days >= 1 {
            (days * SECONDS_PER_DAY).min(MAX_URL_TTL_SECS)
        } else {
            MIN_URL_TTL_SECS
        };
        std::time::Duration::from_secs(secs as u64)
    }

    async fn find_file(&self, file_id: &str) -> Result<files::Model, AppError> {
        Files::find_by_id(file_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File not found: {}", file_id)))
    }

    async fn find_link(&self, token: &str) -> Result<share_links::Model, AppError> {
        ShareLinks::find()
            .filter(share_links::Column::Token.eq(token))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Share link not found".to_string()))
    }

    async fn is_owner(&self, file: &files::Model, username: &str) -> bool {
        file.owner == username
            || self
                .authz
                .check_permission(FILE_TYPE, &file.id, FileRelation::Owner.as_str(), username)
                .await
    }

    async fn to_dto(&self, link: &share_links::Model, file: &files::Model) -> ShareLinkDto {
        let ttl = Self::url_ttl(link.expires_at, Utc::now());
        let file_url = match self.storage.presigned_url(&file.object_name, ttl).await {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Could not presign shared file {}: {}", file.object_name, e);
                String::new()
            }
        };
        ShareLinkDto::from_model(link, file_url)
    }

    /// Issue a link on `file_id`. Requires owner or `reader`.
    pub async fn create_share_link(
        &self,
        file_id: &str,
        permission: &str,
        expiry_days: Option<i64>,
        username: &str,
    ) -> Result<ShareLinkDto, AppError> {
        let file = self.find_file(file_id).await?;
        if !self.is_owner(&file, username).await
            && !self.authz.can_read_file(file_id, username).await
        {
            return Err(AppError::AccessDenied(
                "You don't have permission to share this file".to_string(),
            ));
        }

        let permission: SharePermission = permission.parse()?;
        let days = match expiry_days {
            Some(days) if days < 1 => {
                return Err(AppError::InvalidInput(
                    "Expiry must be at least one day".to_string(),
                ));
            }
            Some(days) => days,
            None => self.config.default_expiry_days,
        };

        let now = Utc::now();
        let expires_at = expires_after(now, days)?;
        let link = share_links::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            token: Set(Self::generate_token()),
            file_id: Set(file.id.clone()),
            permission: Set(permission.as_str().to_string()),
            created_by: Set(username.to_string()),
            created_at: Set(now),
            expires_at: Set(expires_at),
        }
        .insert(&self.db)
        .await?;

        tracing::info!(
            "Created {} share link on file {} by {}, expires {}",
            permission,
            file.id,
            username,
            link.expires_at
        );
        Ok(self.to_dto(&link, &file).await)
    }

    /// Resolve a token to its file when the link is live and strong enough.
    ///
    /// An expired link is deleted on the spot.
    pub async fn validate_share_link(
        &self,
        token: &str,
        required: SharePermission,
    ) -> Result<files::Model, AppError> {
        let link = self.find_link(token).await?;

        if Utc::now() > link.expires_at {
            tracing::info!("Share link {} expired at {}, removing", link.id, link.expires_at);
            ShareLinks::delete_by_id(&link.id).exec(&self.db).await?;
            return Err(AppError::AccessDenied("Share link has expired".to_string()));
        }

        // An unparseable stored permission grants nothing
        let granted = link.permission.parse::<SharePermission>().ok();
        if !granted.is_some_and(|p| p.satisfies(required)) {
            return Err(AppError::AccessDenied(format!(
                "Share link does not grant {} access",
                required
            )));
        }

        self.find_file(&link.file_id).await
    }

    /// Revoke a link. Only its creator may do this.
    pub async fn delete_share_link(&self, token: &str, username: &str) -> Result<(), AppError> {
        let link = self.find_link(token).await?;
        if link.created_by != username {
            return Err(AppError::AccessDenied(
                "Only the creator can delete this share link".to_string(),
            ));
        }

        let link: share_links::ActiveModel = link.into();
        link.delete(&self.db).await?;
        tracing::info!("Share link revoked by {}", username);
        Ok(())
    }

    /// Link details for a live token
    pub async fn get_share_link_by_token(&self, token: &str) -> Result<ShareLinkDto, AppError> {
        let file = self.validate_share_link(token, SharePermission::Read).await?;
        let link = self.find_link(token).await?;
        Ok(self.to_dto(&link, &file).await)
    }

    /// Live links on a file. Owner only.
    pub async fn get_share_links_for_file(
        &self,
        file_id: &str,
        username: &str,
    ) -> Result<Vec<ShareLinkDto>, AppError> {
        let file = self.find_file(file_id).await?;
        if !self.is_owner(&file, username).await {
            return Err(AppError::AccessDenied(
                "Only the owner can list share links of this file".to_string(),
            ));
        }

        let links = ShareLinks::find()
            .filter(share_links::Column::FileId.eq(file_id))
            .filter(share_links::Column::ExpiresAt.gt(Utc::now()))
            .order_by_desc(share_links::Column::CreatedAt)
            .all(&self.db)
            .await?;

        let mut dtos = Vec::with_capacity(links.len());
        for link in &links {
            dtos.push(self.to_dto(link, &file).await);
        }
        Ok(dtos)
    }

    /// Live links created by the user
    pub async fn get_share_links_by_user(
        &self,
        username: &str,
    ) -> Result<Vec<ShareLinkDto>, AppError> {
        let links = ShareLinks::find()
            .filter(share_links::Column::CreatedBy.eq(username))
            .filter(share_links::Column::ExpiresAt.gt(Utc::now()))
            .find_also_related(Files)
            .order_by_desc(share_links::Column::CreatedAt)
            .all(&self.db)
            .await?;

        let mut dtos = Vec::with_capacity(links.len());
        for (link, file) in &links {
            if let Some(file) = file {
                dtos.push(self.to_dto(link, file).await);
            }
        }
        Ok(dtos)
    }

    /// File record with a download URL, for a READ-capable token
    pub async fn access_shared_file(&self, token: &str) -> Result<FileDto, AppError> {
        let file = self.validate_share_link(token, SharePermission::Read).await?;
        let thumbnails = FileThumbnails::find()
            .filter(file_thumbnails::Column::FileId.eq(&file.id))
            .all(&self.db)
            .await?;
        let url = self
            .storage
            .presigned_url(&file.object_name, self.config.presigned_url_ttl())
            .await
            .map_err(|e| AppError::Internal(format!("Failed to sign download URL: {}", e)))?;
        Ok(FileDto::from_model(&file, &thumbnails, url))
    }

    /// Stream the shared bytes for a READ-capable token
    pub async fn open_shared_file(
        &self,
        token: &str,
    ) -> Result<(files::Model, ByteStream), AppError> {
        let file = self.validate_share_link(token, SharePermission::Read).await?;
        let body = self
            .storage
            .get_object(&file.object_name)
            .await
            .map_err(|e| AppError::Internal(format!("Error getting file content: {}", e)))?;
        Ok((file, body))
    }
}
