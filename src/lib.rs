pub mod config;
pub mod entities;
pub mod error;
pub mod infrastructure;
pub mod models;
pub mod services;

use crate::config::ServiceConfig;
use crate::services::authorization::AuthorizationService;
use crate::services::file_service::FileService;
use crate::services::scanner::VirusScanner;
use crate::services::share_service::ShareService;
use crate::services::storage::StorageService;
use sea_orm::DatabaseConnection;
use std::sync::Arc;

/// Wired services sharing one set of collaborators
#[derive(Clone)]
pub struct AppState {
    pub db: DatabaseConnection,
    pub storage: Arc<dyn StorageService>,
    pub authz: Arc<AuthorizationService>,
    pub file_service: Arc<FileService>,
    pub share_service: Arc<ShareService>,
    pub config: ServiceConfig,
}

impl AppState {
    pub fn new(
        db: DatabaseConnection,
        storage: Arc<dyn StorageService>,
        scanner: Arc<dyn VirusScanner>,
        authz: Arc<AuthorizationService>,
        config: ServiceConfig,
    ) -> Self {
        let file_service = Arc::new(FileService::new(
            db.clone(),
            storage.clone(),
            scanner,
            authz.clone(),
            config.clone(),
        ));
        let share_service = Arc::new(ShareService::new(
            db.clone(),
            storage.clone(),
            authz.clone(),
            config.clone(),
        ));

        Self {
            db,
            storage,
            authz,
            file_service,
            share_service,
            config,
        }
    }
}
