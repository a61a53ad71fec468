use crate::config::ServiceConfig;
use crate::entities::{prelude::*, *};
use crate::error::AppError;
use crate::models::FileDto;
use crate::services::{
    authorization::AuthorizationService, scan_gate::ScanGate, scanner::VirusScanner,
    storage::StorageService, thumbnail_service::ThumbnailService,
};
use sea_orm::{
    ColumnTrait, ConnectionTrait, DatabaseConnection, DbErr, EntityTrait, QueryFilter,
    TransactionTrait,
};
use std::sync::Arc;

pub mod manage;
pub mod permissions;
pub mod query;
pub mod types;
pub mod upload;

pub use types::{FileUpdate, UploadRequest};

pub struct FileService {
    db: DatabaseConnection,
    storage: Arc<dyn StorageService>,
    gate: ScanGate,
    authz: Arc<AuthorizationService>,
    thumbnails: ThumbnailService,
    config: ServiceConfig,
}

impl FileService {
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<dyn StorageService>,
        scanner: Arc<dyn VirusScanner>,
        authz: Arc<AuthorizationService>,
        config: ServiceConfig,
    ) -> Self {
        Self {
            db,
            gate: ScanGate::new(scanner, config.clone()),
            thumbnails: ThumbnailService::new(storage.clone()),
            storage,
            authz,
            config,
        }
    }

    /// Presigned download URL for DTOs. A signing failure leaves the URL empty.
    pub(crate) async fn download_url(&self, object_name: &str) -> String {
        match self
            .storage
            .presigned_url(object_name, self.config.presigned_url_ttl())
            .await
        {
            Ok(url) => url,
            Err(e) => {
                tracing::warn!("Could not presign {}: {}", object_name, e);
                String::new()
            }
        }
    }

    pub(crate) async fn to_dto(&self, file: &files::Model) -> Result<FileDto, AppError> {
        let thumbnails = FileThumbnails::find()
            .filter(file_thumbnails::Column::FileId.eq(&file.id))
            .all(&self.db)
            .await?;
        let url = self.download_url(&file.object_name).await;
        Ok(FileDto::from_model(file, &thumbnails, url))
    }
}

/// Delete every metadata row belonging to a file, children first
pub(crate) async fn delete_file_rows<C: ConnectionTrait>(db: &C, file_id: &str) -> Result<(), DbErr> {
    VirusScans::delete_many()
        .filter(virus_scans::Column::FileId.eq(file_id))
        .exec(db)
        .await?;
    FileThumbnails::delete_many()
        .filter(file_thumbnails::Column::FileId.eq(file_id))
        .exec(db)
        .await?;
    ShareLinks::delete_many()
        .filter(share_links::Column::FileId.eq(file_id))
        .exec(db)
        .await?;
    Files::delete_by_id(file_id).exec(db).await?;
    Ok(())
}

/// Remove a file from storage and metadata.
///
/// Order is primary object, thumbnail objects, scan record, then the file row
/// together with its thumbnail rows and share links. Stops at the first failure;
/// since the file row goes last, a partially purged file can be purged again.
pub(crate) async fn purge_file(
    db: &DatabaseConnection,
    storage: &dyn StorageService,
    file: &files::Model,
) -> anyhow::Result<()> {
    storage.delete_object(&file.object_name).await?;

    let thumbnails = FileThumbnails::find()
        .filter(file_thumbnails::Column::FileId.eq(&file.id))
        .all(db)
        .await?;
    for thumbnail in &thumbnails {
        storage.delete_object(&thumbnail.object_name).await?;
    }

    VirusScans::delete_many()
        .filter(virus_scans::Column::FileId.eq(&file.id))
        .exec(db)
        .await?;

    let txn = db.begin().await?;
    delete_file_rows(&txn, &file.id).await?;
    txn.commit().await?;

    Ok(())
}
