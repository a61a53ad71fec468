use crate::entities::*;
use crate::error::AppError;
use crate::models::{FileDto, expires_after};
use crate::services::scan_gate::ScanOutcome;
use crate::services::thumbnail_service::StoredThumbnail;
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, Set, TransactionTrait};
use uuid::Uuid;
use validator::Validate;

use super::{FileService, UploadRequest, delete_file_rows};

impl FileService {
    /// Scan, store, derive thumbnails, persist and register owner relations.
    ///
    /// A rejected or failed upload leaves nothing behind in storage, metadata or
    /// the authorization engine.
    pub async fn upload_file(
        &self,
        request: UploadRequest,
        owner: &str,
    ) -> Result<FileDto, AppError> {
        request
            .validate()
            .map_err(|e| AppError::InvalidInput(e.to_string()))?;

        let filename = request.effective_filename().to_string();
        if filename.is_empty() {
            return Err(AppError::InvalidInput("Filename is required".to_string()));
        }
        let content_type = request.resolved_content_type();
        let now = Utc::now();
        let expires_at = expires_after(
            now,
            request
                .expiry_days
                .unwrap_or(self.config.default_expiry_days),
        )?;

        // 1. Scan before anything touches storage
        let outcome = self
            .gate
            .scan(&request.content, &filename, &content_type)
            .await;
        if !self.gate.is_safe(&outcome) {
            tracing::warn!("Rejected upload of {} by {}: {}", filename, owner, outcome.message);
            return Err(AppError::ScanRejected(format!(
                "File failed virus scan: {}",
                outcome.message
            )));
        }

        // 2. Key
        let object_name = format!("{}_{}", Uuid::new_v4(), filename);

        // 3. Primary object
        self.storage
            .put_object(&object_name, request.content.to_vec(), &content_type)
            .await
            .map_err(|e| {
                tracing::error!("Failed to store {}: {}", object_name, e);
                AppError::UploadFailed(format!("Failed to upload file: {}", e))
            })?;

        // 4. Thumbnails (best-effort)
        let thumbnails = self
            .thumbnails
            .generate_thumbnails(
                &request.content,
                &content_type,
                &object_name,
                &request.original_filename,
                &request.thumbnail_dimensions,
            )
            .await;

        // 5. Metadata
        let file_id = Uuid::new_v4().to_string();
        let record = files::Model {
            id: file_id.clone(),
            filename,
            content_type,
            size: request.content.len() as i64,
            bucket_name: self.storage.bucket().to_string(),
            object_name: object_name.clone(),
            owner: owner.to_string(),
            created_at: now,
            updated_at: None,
            expires_at,
        };

        let file = match self.persist_upload(record, &thumbnails, &outcome, now).await {
            Ok(file) => file,
            Err(e) => {
                tracing::error!("Failed to save metadata for {}: {}", object_name, e);
                self.discard_objects(&object_name, &thumbnails).await;
                return Err(AppError::UploadFailed(format!(
                    "Failed to save file metadata: {}",
                    e
                )));
            }
        };

        // 6. Owner relations; the file is not usable without them
        if let Err(e) = self.authz.initialize_file_owner(&file_id, owner).await {
            tracing::error!(
                "Rolling back upload {} after owner relations failed: {}",
                file_id,
                e
            );
            if let Err(db_err) = delete_file_rows(&self.db, &file_id).await {
                tracing::error!("Failed to roll back metadata for {}: {}", file_id, db_err);
            }
            self.discard_objects(&object_name, &thumbnails).await;
            return Err(e);
        }

        tracing::info!(
            "Uploaded {} as {} for {} (scanned: {}, {} thumbnails)",
            file.filename,
            file.id,
            owner,
            outcome.scanned,
            thumbnails.len()
        );

        self.to_dto(&file).await
    }

    async fn persist_upload(
        &self,
        record: files::Model,
        thumbnails: &[StoredThumbnail],
        outcome: &ScanOutcome,
        now: DateTime<Utc>,
    ) -> Result<files::Model, sea_orm::DbErr> {
        let txn = self.db.begin().await?;

        let file_id = record.id.clone();
        let file = files::ActiveModel {
            id: Set(record.id),
            filename: Set(record.filename),
            content_type: Set(record.content_type),
            size: Set(record.size),
            bucket_name: Set(record.bucket_name),
            object_name: Set(record.object_name),
            owner: Set(record.owner),
            created_at: Set(record.created_at),
            updated_at: Set(record.updated_at),
            expires_at: Set(record.expires_at),
        }
        .insert(&txn)
        .await?;

        for thumbnail in thumbnails {
            file_thumbnails::ActiveModel {
                id: Set(Uuid::new_v4().to_string()),
                file_id: Set(file_id.clone()),
                object_name: Set(thumbnail.object_name.clone()),
                width: Set(thumbnail.width),
                height: Set(thumbnail.height),
            }
            .insert(&txn)
            .await?;
        }

        virus_scans::ActiveModel {
            id: Set(Uuid::new_v4().to_string()),
            file_id: Set(file_id),
            scanned: Set(outcome.scanned),
            clean: Set(outcome.clean),
            positives: Set(outcome.positives),
            total: Set(outcome.total),
            scan_id: Set(outcome.scan_id.clone()),
            resource: Set(outcome.resource.clone()),
            permalink: Set(outcome.permalink.clone()),
            message: Set(Some(outcome.message.clone())),
            details: Set(outcome.details.clone()),
            scanned_at: Set(now),
        }
        .insert(&txn)
        .await?;

        txn.commit().await?;
        Ok(file)
    }

    /// Compensation for a failed upload. Failures are logged only.
    async fn discard_objects(&self, object_name: &str, thumbnails: &[StoredThumbnail]) {
        if let Err(e) = self.storage.delete_object(object_name).await {
            tracing::error!("Failed to discard object {}: {}", object_name, e);
        }
        for thumbnail in thumbnails {
            if let Err(e) = self.storage.delete_object(&thumbnail.object_name).await {
                tracing::error!("Failed to discard thumbnail {}: {}", thumbnail.object_name, e);
            }
        }
    }
}
