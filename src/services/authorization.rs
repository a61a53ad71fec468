use crate::config::ServiceConfig;
use crate::error::AppError;
use crate::models::FgaRelation;
use anyhow::{Result, anyhow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

pub const FILE_TYPE: &str = "file";

/// Relations a principal can hold on a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileRelation {
    Owner,
    Reader,
    Writer,
    Deleter,
}

impl FileRelation {
    pub const ALL: [FileRelation; 4] = [
        FileRelation::Owner,
        FileRelation::Reader,
        FileRelation::Writer,
        FileRelation::Deleter,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FileRelation::Owner => "owner",
            FileRelation::Reader => "reader",
            FileRelation::Writer => "writer",
            FileRelation::Deleter => "deleter",
        }
    }
}

impl fmt::Display for FileRelation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `(user, relation, object)` as addressed by the engine, e.g. `user:alice`, `file:42`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TupleKey {
    pub user: String,
    pub relation: String,
    pub object: String,
}

impl TupleKey {
    pub fn new(object_type: &str, object_id: &str, relation: &str, username: &str) -> Self {
        Self {
            user: user_ref(username),
            relation: relation.to_string(),
            object: object_ref(object_type, object_id),
        }
    }
}

impl From<TupleKey> for FgaRelation {
    fn from(key: TupleKey) -> Self {
        Self {
            object: key.object,
            relation: key.relation,
            user: key.user,
        }
    }
}

/// Partial tuple used to read stored relations. Unset fields match anything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TupleFilter {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relation: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub object: Option<String>,
}

impl TupleFilter {
    pub fn matches(&self, key: &TupleKey) -> bool {
        let object_matches = match &self.object {
            // "file:" selects every object of that type
            Some(object) if object.ends_with(':') => key.object.starts_with(object.as_str()),
            Some(object) => &key.object == object,
            None => true,
        };
        object_matches
            && self.user.as_ref().is_none_or(|u| &key.user == u)
            && self.relation.as_ref().is_none_or(|r| &key.relation == r)
    }
}

pub fn object_ref(object_type: &str, object_id: &str) -> String {
    format!("{}:{}", object_type, object_id)
}

pub fn user_ref(username: &str) -> String {
    format!("user:{}", username)
}

/// Relationship-based authorization engine
#[async_trait]
pub trait AuthorizationEngine: Send + Sync {
    async fn check(&self, key: &TupleKey) -> Result<bool>;
    /// Apply writes and deletes as one request
    async fn write(&self, writes: Vec<TupleKey>, deletes: Vec<TupleKey>) -> Result<()>;
    async fn read(&self, filter: &TupleFilter) -> Result<Vec<TupleKey>>;
}

/// OpenFGA HTTP API client
pub struct OpenFgaClient {
    client: reqwest::Client,
    store_url: Url,
    model_id: Option<String>,
    api_token: Option<String>,
}

#[derive(Serialize)]
struct CheckRequest<'a> {
    tuple_key: &'a TupleKey,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization_model_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct CheckResponse {
    #[serde(default)]
    allowed: bool,
}

#[derive(Serialize)]
struct TupleKeys {
    tuple_keys: Vec<TupleKey>,
}

#[derive(Serialize)]
struct WriteRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    writes: Option<TupleKeys>,
    #[serde(skip_serializing_if = "Option::is_none")]
    deletes: Option<TupleKeys>,
    #[serde(skip_serializing_if = "Option::is_none")]
    authorization_model_id: Option<&'a str>,
}

#[derive(Serialize)]
struct ReadRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    tuple_key: Option<&'a TupleFilter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    continuation_token: Option<String>,
}

#[derive(Deserialize)]
struct ReadResponse {
    #[serde(default)]
    tuples: Vec<StoredTuple>,
    #[serde(default)]
    continuation_token: Option<String>,
}

#[derive(Deserialize)]
struct StoredTuple {
    key: TupleKey,
}

impl OpenFgaClient {
    pub fn new(
        api_url: &str,
        store_id: &str,
        model_id: Option<String>,
        api_token: Option<String>,
    ) -> Result<Self> {
        if store_id.is_empty() {
            return Err(anyhow!("OpenFGA store id is not configured"));
        }
        let base = Url::parse(api_url).map_err(|e| anyhow!("Invalid OpenFGA URL: {}", e))?;
        let store_url = base
            .join(&format!("stores/{}/", store_id))
            .map_err(|e| anyhow!("Invalid OpenFGA store id {}: {}", store_id, e))?;
        Ok(Self {
            client: reqwest::Client::new(),
            store_url,
            model_id,
            api_token,
        })
    }

    async fn post<B: Serialize + ?Sized, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<R> {
        let url = self.store_url.join(path)?;
        let mut request = self.client.post(url).json(body);
        if let Some(token) = &self.api_token {
            request = request.bearer_auth(token);
        }
        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow!("OpenFGA {} returned {}: {}", path, status, text));
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl AuthorizationEngine for OpenFgaClient {
    async fn check(&self, key: &TupleKey) -> Result<bool> {
        let body = CheckRequest {
            tuple_key: key,
            authorization_model_id: self.model_id.as_deref(),
        };
        let response: CheckResponse = self.post("check", &body).await?;
        Ok(response.allowed)
    }

    async fn write(&self, writes: Vec<TupleKey>, deletes: Vec<TupleKey>) -> Result<()> {
        let body = WriteRequest {
            writes: (!writes.is_empty()).then_some(TupleKeys { tuple_keys: writes }),
            deletes: (!deletes.is_empty()).then_some(TupleKeys {
                tuple_keys: deletes,
            }),
            authorization_model_id: self.model_id.as_deref(),
        };
        if body.writes.is_none() && body.deletes.is_none() {
            return Ok(());
        }
        let _: serde_json::Value = self.post("write", &body).await?;
        Ok(())
    }

    async fn read(&self, filter: &TupleFilter) -> Result<Vec<TupleKey>> {
        let mut keys = Vec::new();
        let mut continuation_token = None;

        loop {
            let body = ReadRequest {
                tuple_key: Some(filter),
                continuation_token: continuation_token.take(),
            };
            let response: ReadResponse = self.post("read", &body).await?;
            keys.extend(response.tuples.into_iter().map(|t| t.key));

            match response.continuation_token {
                Some(token) if !token.is_empty() => continuation_token = Some(token),
                _ => break,
            }
        }

        Ok(keys)
    }
}

/// Permission oracle. Checks fail closed, mutations fail loud.
pub struct AuthorizationService {
    engine: Arc<dyn AuthorizationEngine>,
    owner_grant_attempts: u32,
}

impl AuthorizationService {
    pub fn new(engine: Arc<dyn AuthorizationEngine>, config: &ServiceConfig) -> Self {
        Self {
            engine,
            owner_grant_attempts: config.owner_grant_attempts.max(1),
        }
    }

    /// Check if a user has a specific relation on an object. Engine errors deny.
    pub async fn check_permission(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
        username: &str,
    ) -> bool {
        let key = TupleKey::new(object_type, object_id, relation, username);
        match self.engine.check(&key).await {
            Ok(allowed) => allowed,
            Err(e) => {
                tracing::error!(
                    "Error checking permission {} {} {}: {}",
                    key.object,
                    key.relation,
                    key.user,
                    e
                );
                false
            }
        }
    }

    pub async fn add_relation(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
        username: &str,
    ) -> Result<(), AppError> {
        let key = TupleKey::new(object_type, object_id, relation, username);
        self.engine
            .write(vec![key.clone()], Vec::new())
            .await
            .map_err(|e| {
                tracing::error!("Error adding relation: {}", e);
                AppError::PermissionMutationFailed(format!(
                    "Failed to add {} on {} for {}: {}",
                    key.relation, key.object, key.user, e
                ))
            })?;
        tracing::info!("Added relation: {} {} {}", key.object, key.relation, key.user);
        Ok(())
    }

    pub async fn remove_relation(
        &self,
        object_type: &str,
        object_id: &str,
        relation: &str,
        username: &str,
    ) -> Result<(), AppError> {
        let key = TupleKey::new(object_type, object_id, relation, username);
        self.engine
            .write(Vec::new(), vec![key.clone()])
            .await
            .map_err(|e| {
                tracing::error!("Error removing relation: {}", e);
                AppError::PermissionMutationFailed(format!(
                    "Failed to remove {} on {} for {}: {}",
                    key.relation, key.object, key.user, e
                ))
            })?;
        tracing::info!("Removed relation: {} {} {}", key.object, key.relation, key.user);
        Ok(())
    }

    /// All relations stored for an object. Read failures yield an empty list.
    pub async fn relations_for_object(&self, object_type: &str, object_id: &str) -> Vec<FgaRelation> {
        let filter = TupleFilter {
            object: Some(object_ref(object_type, object_id)),
            ..TupleFilter::default()
        };
        self.read_relations(&filter).await
    }

    /// All file relations held by a user. Read failures yield an empty list.
    pub async fn relations_for_user(&self, username: &str) -> Vec<FgaRelation> {
        let filter = TupleFilter {
            user: Some(user_ref(username)),
            // the engine requires an object type when reading by user
            object: Some(format!("{}:", FILE_TYPE)),
            ..TupleFilter::default()
        };
        self.read_relations(&filter).await
    }

    async fn read_relations(&self, filter: &TupleFilter) -> Vec<FgaRelation> {
        match self.engine.read(filter).await {
            Ok(keys) => keys.into_iter().map(FgaRelation::from).collect(),
            Err(e) => {
                tracing::error!("Error reading relations for {:?}: {}", filter, e);
                Vec::new()
            }
        }
    }

    /// Grant owner, reader, writer and deleter on a new file in one engine write.
    ///
    /// Retried with a short backoff; the last error is returned if every attempt fails.
    pub async fn initialize_file_owner(&self, file_id: &str, username: &str) -> Result<(), AppError> {
        let keys: Vec<TupleKey> = FileRelation::ALL
            .iter()
            .map(|r| TupleKey::new(FILE_TYPE, file_id, r.as_str(), username))
            .collect();

        let mut last_error = None;
        for attempt in 1..=self.owner_grant_attempts {
            match self.engine.write(keys.clone(), Vec::new()).await {
                Ok(()) => {
                    tracing::info!("Initialized owner relations on file {} for {}", file_id, username);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        "Owner relation write for file {} failed (attempt {}/{}): {}",
                        file_id,
                        attempt,
                        self.owner_grant_attempts,
                        e
                    );
                    last_error = Some(e);
                    if attempt < self.owner_grant_attempts {
                        tokio::time::sleep(Duration::from_millis(100 * u64::from(attempt))).await;
                    }
                }
            }
        }

        Err(AppError::PermissionMutationFailed(format!(
            "Failed to initialize owner relations for file {}: {}",
            file_id,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        )))
    }

    /// Best-effort removal of every relation on a file. Failures are logged.
    pub async fn remove_all_relations(&self, object_type: &str, object_id: &str) {
        let filter = TupleFilter {
            object: Some(object_ref(object_type, object_id)),
            ..TupleFilter::default()
        };
        let keys = match self.engine.read(&filter).await {
            Ok(keys) => keys,
            Err(e) => {
                tracing::warn!("Could not read relations of {}: {}", filter.object.as_deref().unwrap_or_default(), e);
                return;
            }
        };
        if keys.is_empty() {
            return;
        }
        if let Err(e) = self.engine.write(Vec::new(), keys).await {
            tracing::warn!(
                "Could not remove relations of {}:{}: {}",
                object_type,
                object_id,
                e
            );
        }
    }

    pub async fn can_read_file(&self, file_id: &str, username: &str) -> bool {
        self.check_permission(FILE_TYPE, file_id, FileRelation::Reader.as_str(), username)
            .await
    }

    pub async fn can_write_file(&self, file_id: &str, username: &str) -> bool {
        self.check_permission(FILE_TYPE, file_id, FileRelation::Writer.as_str(), username)
            .await
    }

    pub async fn can_delete_file(&self, file_id: &str, username: &str) -> bool {
        self.check_permission(FILE_TYPE, file_id, FileRelation::Deleter.as_str(), username)
            .await
    }

    pub async fn grant_read_permission(&self, file_id: &str, username: &str) -> Result<(), AppError> {
        self.add_relation(FILE_TYPE, file_id, FileRelation::Reader.as_str(), username)
            .await
    }

    pub async fn grant_write_permission(&self, file_id: &str, username: &str) -> Result<(), AppError> {
        self.add_relation(FILE_TYPE, file_id, FileRelation::Writer.as_str(), username)
            .await
    }

    pub async fn grant_delete_permission(&self, file_id: &str, username: &str) -> Result<(), AppError> {
        self.add_relation(FILE_TYPE, file_id, FileRelation::Deleter.as_str(), username)
            .await
    }

    pub async fn revoke_read_permission(&self, file_id: &str, username: &str) -> Result<(), AppError> {
        self.remove_relation(FILE_TYPE, file_id, FileRelation::Reader.as_str(), username)
            .await
    }

    pub async fn revoke_write_permission(&self, file_id: &str, username: &str) -> Result<(), AppError> {
        self.remove_relation(FILE_TYPE, file_id, FileRelation::Writer.as_str(), username)
            .await
    }

    pub async fn revoke_delete_permission(&self, file_id: &str, username: &str) -> Result<(), AppError> {
        self.remove_relation(FILE_TYPE, file_id, FileRelation::Deleter.as_str(), username)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Engine with a tuple set; `failing_writes` writes fail before any succeed
    #[derive(Default)]
    struct FlakyEngine {
        tuples: Mutex<HashSet<TupleKey>>,
        failing_writes: AtomicU32,
        fail_checks: bool,
    }

    #[async_trait]
    impl AuthorizationEngine for FlakyEngine {
        async fn check(&self, key: &TupleKey) -> Result<bool> {
            if self.fail_checks {
                return Err(anyhow!("engine unavailable"));
            }
            Ok(self.tuples.lock().unwrap().contains(key))
        }

        async fn write(&self, writes: Vec<TupleKey>, deletes: Vec<TupleKey>) -> Result<()> {
            if self
                .failing_writes
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(anyhow!("write timeout"));
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

    fn service(engine: Arc<FlakyEngine>, attempts: u32) -> AuthorizationService {
        let config = ServiceConfig {
            owner_grant_attempts: attempts,
            ..ServiceConfig::default()
        };
        AuthorizationService::new(engine, &config)
    }

    #[test]
    fn test_refs() {
        let key = TupleKey::new(FILE_TYPE, "42", "reader", "carol");
        assert_eq!(key.object, "file:42");
        assert_eq!(key.user, "user:carol");
    }

    #[test]
    fn test_filter_matches_type_prefix() {
        let key = TupleKey::new(FILE_TYPE, "42", "reader", "carol");
        let by_user = TupleFilter {
            user: Some("user:carol".into()),
            object: Some("file:".into()),
            ..TupleFilter::default()
        };
        assert!(by_user.matches(&key));
        let other = TupleFilter {
            object: Some("file:43".into()),
            ..TupleFilter::default()
        };
        assert!(!other.matches(&key));
    }

    #[tokio::test]
    async fn test_check_fails_closed() {
        let engine = Arc::new(FlakyEngine {
            fail_checks: true,
            ..FlakyEngine::default()
        });
        let authz = service(engine, 1);
        assert!(!authz.can_read_file("1", "alice").await);
    }

    #[tokio::test]
    async fn test_mutation_fails_loud() {
        let engine = Arc::new(FlakyEngine::default());
        engine.failing_writes.store(1, Ordering::SeqCst);
        let authz = service(engine, 1);
        let err = authz.grant_read_permission("1", "bob").await.unwrap_err();
        assert!(matches!(err, AppError::PermissionMutationFailed(_)));
    }

    #[tokio::test]
    async fn test_owner_initialization_retries() {
        let engine = Arc::new(FlakyEngine::default());
        engine.failing_writes.store(2, Ordering::SeqCst);
        let authz = service(engine.clone(), 3);

        authz.initialize_file_owner("f1", "alice").await.unwrap();
        for relation in FileRelation::ALL {
            assert!(
                authz
                    .check_permission(FILE_TYPE, "f1", relation.as_str(), "alice")
                    .await
            );
        }
        assert_eq!(authz.relations_for_object(FILE_TYPE, "f1").await.len(), 4);
    }

    #[tokio::test]
    async fn test_owner_initialization_gives_up() {
        let engine = Arc::new(FlakyEngine::default());
        engine.failing_writes.store(5, Ordering::SeqCst);
        let authz = service(engine.clone(), 2);

        let err = authz.initialize_file_owner("f1", "alice").await.unwrap_err();
        assert!(matches!(err, AppError::PermissionMutationFailed(_)));
        assert!(engine.tuples.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_grant_then_revoke() {
        let engine = Arc::new(FlakyEngine::default());
        let authz = service(engine, 1);

        authz.grant_read_permission("42", "carol").await.unwrap();
        assert!(authz.can_read_file("42", "carol").await);
        assert!(!authz.can_write_file("42", "carol").await);
        assert_eq!(authz.relations_for_user("carol").await.len(), 1);

        authz.revoke_read_permission("42", "carol").await.unwrap();
        assert!(!authz.can_read_file("42", "carol").await);
    }

    #[tokio::test]
    async fn test_remove_all_relations() {
        let engine = Arc::new(FlakyEngine::default());
        let authz = service(engine.clone(), 1);
        authz.initialize_file_owner("f1", "alice").await.unwrap();
        authz.grant_read_permission("f1", "bob").await.unwrap();
        authz.grant_read_permission("f2", "bob").await.unwrap();

        authz.remove_all_relations(FILE_TYPE, "f1").await;
        assert!(authz.relations_for_object(FILE_TYPE, "f1").await.is_empty());
        assert_eq!(authz.relations_for_object(FILE_TYPE, "f2").await.len(), 1);
    }
}
