use crate::error::AppError;
use crate::models::{FgaRelation, FilePermission};
use crate::services::authorization::{FILE_TYPE, FileRelation};

use super::FileService;

impl FileService {
    /// Relations stored on a file. Requires owner or `reader`.
    pub async fn get_file_permissions(
        &self,
        file_id: &str,
        username: &str,
    ) -> Result<Vec<FgaRelation>, AppError> {
        let file = self.find_file(file_id).await?;
        self.ensure_can_read(&file, username).await?;
        Ok(self.authz.relations_for_object(FILE_TYPE, file_id).await)
    }

    /// Grant `permissions` to `target`. Requires owner or `writer`.
    ///
    /// Unknown permission names are skipped. Returns what was granted.
    pub async fn grant_permissions(
        &self,
        file_id: &str,
        target: &str,
        permissions: &[String],
        username: &str,
    ) -> Result<Vec<FilePermission>, AppError> {
        let file = self.find_file(file_id).await?;
        if file.owner != username && !self.authz.can_write_file(file_id, username).await {
            return Err(AppError::AccessDenied(
                "You don't have permission to grant access to this file".to_string(),
            ));
        }

        let mut granted = Vec::new();
        for name in permissions {
            let permission = match name.parse::<FilePermission>() {
                Ok(p) => p,
                Err(_) => {
                    tracing::warn!("Unknown permission type: {}", name);
                    continue;
                }
            };
            match permission {
                FilePermission::Read => self.authz.grant_read_permission(file_id, target).await?,
                FilePermission::Write => self.authz.grant_write_permission(file_id, target).await?,
                FilePermission::Delete => {
                    self.authz.grant_delete_permission(file_id, target).await?
                }
            }
            granted.push(permission);
        }

        tracing::info!(
            "{} granted {:?} on file {} to {}",
            username,
            granted,
            file_id,
            target
        );
        Ok(granted)
    }

    /// Revoke `permissions` from `target`. Owner only.
    pub async fn revoke_permissions(
        &self,
        file_id: &str,
        target: &str,
        permissions: &[String],
        username: &str,
    ) -> Result<Vec<FilePermission>, AppError> {
        let file = self.find_file(file_id).await?;
        let is_owner = file.owner == username
            || self
                .authz
                .check_permission(FILE_TYPE, file_id, FileRelation::Owner.as_str(), username)
                .await;
        if !is_owner {
            return Err(AppError::AccessDenied(
                "Only the file owner can revoke permissions".to_string(),
            ));
        }

        let mut revoked = Vec::new();
        for name in permissions {
            let permission = match name.parse::<FilePermission>() {
                Ok(p) => p,
                Err(_) => {
                    tracing::warn!("Unknown permission type: {}", name);
                    continue;
                }
            };
            match permission {
                FilePermission::Read => self.authz.revoke_read_permission(file_id, target).await?,
                FilePermission::Write => {
                    self.authz.revoke_write_permission(file_id, target).await?
                }
                FilePermission::Delete => {
                    self.authz.revoke_delete_permission(file_id, target).await?
                }
            }
            revoked.push(permission);
        }

        Ok(revoked)
    }

    /// The caller's own relations across all files
    pub async fn get_user_access(&self, username: &str) -> Vec<FgaRelation> {
        self.authz.relations_for_user(username).await
    }
}
