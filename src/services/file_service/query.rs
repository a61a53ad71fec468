use crate::entities::{prelude::*, *};
use crate::error::AppError;
use crate::models::FileDto;
use aws_sdk_s3::primitives::ByteStream;
use sea_orm::sea_query::{Expr, Func, LikeExpr};
use sea_orm::{ColumnTrait, EntityTrait, QueryFilter, QueryOrder};

use super::FileService;

impl FileService {
    pub(crate) async fn find_file(&self, file_id: &str) -> Result<files::Model, AppError> {
        Files::find_by_id(file_id)
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File not found: {}", file_id)))
    }

    /// Owner or `reader`
    pub(crate) async fn ensure_can_read(
        &self,
        file: &files::Model,
        username: &str,
    ) -> Result<(), AppError> {
        if file.owner == username || self.authz.can_read_file(&file.id, username).await {
            Ok(())
        } else {
            Err(AppError::AccessDenied(
                "You don't have permission to access this file".to_string(),
            ))
        }
    }

    pub async fn get_file_by_id(&self, file_id: &str, username: &str) -> Result<FileDto, AppError> {
        let file = self.find_file(file_id).await?;
        self.ensure_can_read(&file, username).await?;
        self.to_dto(&file).await
    }

    /// Record plus a stream of the stored bytes
    pub async fn get_file_content(
        &self,
        file_id: &str,
        username: &str,
    ) -> Result<(files::Model, ByteStream), AppError> {
        let file = self.find_file(file_id).await?;
        self.ensure_can_read(&file, username).await?;

        let body = self
            .storage
            .get_object(&file.object_name)
            .await
            .map_err(|e| {
                tracing::error!("Error getting content of {}: {}", file.object_name, e);
                AppError::Internal(format!("Error getting file content: {}", e))
            })?;
        Ok((file, body))
    }

    /// Files owned by the user, newest first
    pub async fn list_user_files(&self, username: &str) -> Result<Vec<FileDto>, AppError> {
        let files = Files::find()
            .filter(files::Column::Owner.eq(username))
            .order_by_desc(files::Column::CreatedAt)
            .all(&self.db)
            .await?;

        let mut dtos = Vec::with_capacity(files.len());
        for file in &files {
            dtos.push(self.to_dto(file).await?);
        }
        Ok(dtos)
    }

    /// Case-insensitive filename substring search over files the user may read.
    /// `%` and `_` in `pattern` match literally.
    pub async fn search_files_by_filename(
        &self,
        pattern: &str,
        username: &str,
    ) -> Result<Vec<FileDto>, AppError> {
        let needle = format!("%{}%", escape_like(&pattern.trim().to_lowercase()));
        let candidates = Files::find()
            .filter(
                Expr::expr(Func::lower(Expr::col(files::Column::Filename)))
                    .like(LikeExpr::new(needle).escape('\\')),
            )
            .order_by_asc(files::Column::Filename)
            .all(&self.db)
            .await?;

        let mut dtos = Vec::new();
        for file in &candidates {
            if self.ensure_can_read(file, username).await.is_ok() {
                dtos.push(self.to_dto(file).await?);
            }
        }
        Ok(dtos)
    }

    pub async fn get_virus_scan_result(
        &self,
        file_id: &str,
        username: &str,
    ) -> Result<virus_scans::Model, AppError> {
        let file = self.find_file(file_id).await?;
        self.ensure_can_read(&file, username).await?;

        VirusScans::find()
            .filter(virus_scans::Column::FileId.eq(file_id))
            .one(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("No scan result for file {}", file_id)))
    }

    /// Lookup by storage location, e.g. when resolving a `/bucket/object` path
    pub async fn find_file_by_object(
        &self,
        bucket_name: &str,
        object_name: &str,
    ) -> Result<Option<files::Model>, AppError> {
        Ok(Files::find()
            .filter(files::Column::BucketName.eq(bucket_name))
            .filter(files::Column::ObjectName.eq(object_name))
            .one(&self.db)
            .await?)
    }
}

/// Make `%`, `_` and the escape character itself literal inside a LIKE pattern
fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}
