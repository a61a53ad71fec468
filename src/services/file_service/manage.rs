use crate::entities::*;
use crate::error::AppError;
use crate::models::{FileDto, expires_after};
use crate::services::authorization::FILE_TYPE;
use chrono::Utc;
use sea_orm::{ActiveModelTrait, Set};

use super::{FileService, FileUpdate, purge_file};

impl FileService {
    /// Rename and/or extend retention. Requires owner or `writer`.
    pub async fn update_file_metadata(
        &self,
        file_id: &str,
        update: FileUpdate,
        username: &str,
    ) -> Result<FileDto, AppError> {
        let file = self.find_file(file_id).await?;
        if file.owner != username && !self.authz.can_write_file(file_id, username).await {
            return Err(AppError::AccessDenied(
                "You don't have permission to modify this file".to_string(),
            ));
        }

        let now = Utc::now();
        let mut active: files::ActiveModel = file.into();

        if let Some(name) = update.filename.as_deref().map(str::trim)
            && !name.is_empty()
        {
            active.filename = Set(name.to_string());
        }
        if let Some(days) = update.expiry_days
            && days > 0
        {
            active.expires_at = Set(expires_after(now, days)?);
        }
        active.updated_at = Set(Some(now));

        let updated = active.update(&self.db).await?;
        tracing::info!("Updated metadata of file {} by {}", file_id, username);
        self.to_dto(&updated).await
    }

    /// Remove storage objects and metadata. Requires owner or `deleter`.
    ///
    /// Relations on the file are purged afterwards on a best-effort basis.
    pub async fn delete_file(&self, file_id: &str, username: &str) -> Result<(), AppError> {
        let file = self.find_file(file_id).await?;
        if file.owner != username && !self.authz.can_delete_file(file_id, username).await {
            return Err(AppError::AccessDenied(
                "You don't have permission to delete this file".to_string(),
            ));
        }

        purge_file(&self.db, self.storage.as_ref(), &file)
            .await
            .map_err(|e| {
                tracing::error!("Error deleting file {}: {}", file_id, e);
                AppError::DeleteFailed(format!("Error deleting file: {}", e))
            })?;

        self.authz.remove_all_relations(FILE_TYPE, file_id).await;
        tracing::info!("Deleted file {} ({}) by {}", file_id, file.filename, username);
        Ok(())
    }
}
