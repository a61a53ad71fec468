#![allow(dead_code)]

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use file_lifecycle::AppState;
use file_lifecycle::config::ServiceConfig;
use file_lifecycle::infrastructure::database;
use file_lifecycle::services::authorization::{
    AuthorizationEngine, AuthorizationService, TupleFilter, TupleKey,
};
use file_lifecycle::services::scanner::{AnalysisStatus, ScanReport, ScanStats, VirusScanner};
use file_lifecycle::services::storage::StorageService;
use sea_orm::{Database, DatabaseConnection};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const BUCKET: &str = "test-bucket";

pub async fn setup_test_db() -> DatabaseConnection {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    database::run_migrations(&db).await.unwrap();
    db
}

/// In-memory object store. Puts or deletes on keys matching a failure pattern are refused.
#[derive(Default)]
pub struct MockStorageService {
    pub objects: Mutex<HashMap<String, (Vec<u8>, String)>>,
    pub fail_puts_on: Mutex<Option<String>>,
    pub fail_deletes_on: Mutex<Option<String>>,
}

impl MockStorageService {
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.lock().unwrap().keys().cloned().collect();
        keys.sort();
        keys
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().unwrap().contains_key(key)
    }

    pub fn fail_deletes_on(&self, pattern: Option<&str>) {
        *self.fail_deletes_on.lock().unwrap() = pattern.map(str::to_string);
    }

    pub fn fail_puts_on(&self, pattern: Option<&str>) {
        *self.fail_puts_on.lock().unwrap() = pattern.map(str::to_string);
    }

    fn refuses(rule: &Mutex<Option<String>>, key: &str) -> bool {
        rule.lock()
            .unwrap()
            .as_deref()
            .is_some_and(|pattern| key.contains(pattern))
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    fn bucket(&self) -> &str {
        BUCKET
    }

    async fn put_object(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        if Self::refuses(&self.fail_puts_on, key) {
            return Err(anyhow!("storage unavailable"));
        }
        self.objects
            .lock()
            .unwrap()
            .insert(key.to_string(), (data, content_type.to_string()));
        Ok(())
    }

    async fn get_object(&self, key: &str) -> Result<ByteStream> {
        let data = self
            .objects
            .lock()
            .unwrap()
            .get(key)
            .map(|(data, _)| data.clone())
            .ok_or_else(|| anyhow!("Key not found"))?;
        Ok(ByteStream::from(data))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        if Self::refuses(&self.fail_deletes_on, key) {
            return Err(anyhow!("storage unavailable"));
        }
        self.objects.lock().unwrap().remove(key);
        Ok(())
    }

    async fn object_exists(&self, key: &str) -> Result<bool> {
        Ok(self.contains(key))
    }

    async fn presigned_url(&self, key: &str, ttl: Duration) -> Result<String> {
        Ok(format!(
            "http://minio.local/{}/{}?X-Amz-Expires={}",
            BUCKET,
            key,
            ttl.as_secs()
        ))
    }

    async fn bucket_exists(&self) -> Result<bool> {
        Ok(true)
    }

    async fn create_bucket(&self) -> Result<()> {
        Ok(())
    }
}

/// Tuple store standing in for OpenFGA
#[derive(Default)]
pub struct MockAuthorizationEngine {
    pub tuples: Mutex<HashSet<TupleKey>>,
    pub fail_checks: AtomicBool,
    /// Number of upcoming writes to refuse
    pub failing_writes: AtomicU32,
}

impl MockAuthorizationEngine {
    pub fn relations_on(&self, object: &str) -> Vec<TupleKey> {
        self.tuples
            .lock()
            .unwrap()
            .iter()
            .filter(|k| k.object == object)
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tuples.lock().unwrap().is_empty()
    }
}

#[async_trait]
impl AuthorizationEngine for MockAuthorizationEngine {
    async fn check(&self, key: &TupleKey) -> Result<bool> {
        if self.fail_checks.load(Ordering::SeqCst) {
            return Err(anyhow!("connection refused"));
        }
        Ok(self.tuples.lock().unwrap().contains(key))
    }

    async fn write(&self, writes: Vec<TupleKey>, deletes: Vec<TupleKey>) -> Result<()> {
        if self
            .failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(anyhow!("write timed out"));
        }
        let mut tuples = self.tuples.lock().unwrap();
        for key in deletes {
            tuples.remove(&key);
        }
        tuples.extend(writes);
        Ok(())
    }

    async fn read(&self, filter: &TupleFilter) -> Result<Vec<TupleKey>> {
        Ok(self
            .tuples
            .lock()
            .unwrap()
            .iter()
            .filter(|k| filter.matches(k))
            .cloned()
            .collect())
    }
}

/// Scanner returning a fixed verdict on the first poll
pub struct ScriptedScanner {
    malicious: i32,
    reachable: bool,
}

impl ScriptedScanner {
    pub fn clean() -> Arc<Self> {
        Arc::new(Self {
            malicious: 0,
            reachable: true,
        })
    }

    pub fn infected() -> Arc<Self> {
        Arc::new(Self {
            malicious: 5,
            reachable: true,
        })
    }

    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self {
            malicious: 0,
            reachable: false,
        })
    }
}

#[async_trait]
impl VirusScanner for ScriptedScanner {
    async fn submit(&self, _filename: &str, _content: &[u8]) -> Result<String> {
        if !self.reachable {
            return Err(anyhow!("connection refused"));
        }
        Ok("analysis-1".to_string())
    }

    async fn poll(&self, analysis_id: &str) -> Result<ScanReport> {
        Ok(ScanReport {
            status: AnalysisStatus::Completed,
            stats: ScanStats {
                malicious: self.malicious,
                undetected: 60,
                ..ScanStats::default()
            },
            resource: Some(analysis_id.to_string()),
            permalink: Some(format!("https://scanner.local/{}", analysis_id)),
            results: None,
        })
    }

    async fn health_check(&self) -> bool {
        self.reachable
    }
}

pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        enable_virus_scan: true,
        scan_timeout_ms: 500,
        scan_poll_interval_ms: 10,
        owner_grant_attempts: 2,
        ..ServiceConfig::default()
    }
}

pub struct TestHarness {
    pub state: AppState,
    pub storage: Arc<MockStorageService>,
    pub engine: Arc<MockAuthorizationEngine>,
}

pub async fn harness_with(scanner: Arc<dyn VirusScanner>, config: ServiceConfig) -> TestHarness {
    let db = setup_test_db().await;
    let storage = Arc::new(MockStorageService::default());
    let engine = Arc::new(MockAuthorizationEngine::default());
    let authz = Arc::new(AuthorizationService::new(engine.clone(), &config));
    let state = AppState::new(db, storage.clone(), scanner, authz, config);

    TestHarness {
        state,
        storage,
        engine,
    }
}

pub async fn harness() -> TestHarness {
    harness_with(ScriptedScanner::clean(), test_config()).await
}

/// A small PNG of the given size
pub fn png_bytes(width: u32, height: u32) -> Vec<u8> {
    let img = image::DynamicImage::ImageRgb8(image::RgbImage::new(width, height));
    let mut out = std::io::Cursor::new(Vec::new());
    img.write_to(&mut out, image::ImageFormat::Png).unwrap();
    out.into_inner()
}
