use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, ensure, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use docverify::auth::identity::{Identity, IdentityError, IdentityVerifier};
use docverify::config::{AppConfig, DeletePolicy, IdentityConfig, IdentityKeySource};
use docverify::mailer::{EmailMessage, Mailer};
use docverify::models::{DocumentRecord, Profile, ProfileRole, ReviewUpdate};
use docverify::records::RecordStore;
use docverify::routes;
use docverify::state::AppState;
use docverify::storage::ObjectStorage;
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use tokio::sync::Mutex;
use tower::util::ServiceExt;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryRecordStore {
    profiles: Mutex<HashMap<(String, ProfileRole), Profile>>,
    documents: Mutex<HashMap<Uuid, DocumentRecord>>,
    fail_inserts: AtomicBool,
}

#[allow(dead_code)]
impl MemoryRecordStore {
    pub fn fail_document_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub async fn document(&self, document_id: Uuid) -> Option<DocumentRecord> {
        self.documents.lock().await.get(&document_id).cloned()
    }

    pub async fn document_count(&self) -> usize {
        self.documents.lock().await.len()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn upsert_profile(&self, profile: Profile) -> Result<()> {
        let mut guard = self.profiles.lock().await;
        guard.insert((profile.user_id.clone(), profile.role), profile);
        Ok(())
    }

    async fn get_profile(&self, user_id: &str, role: ProfileRole) -> Result<Option<Profile>> {
        let guard = self.profiles.lock().await;
        Ok(guard.get(&(user_id.to_string(), role)).cloned())
    }

    async fn insert_document(&self, record: DocumentRecord) -> Result<()> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            bail!("simulated record store outage");
        }
        let mut guard = self.documents.lock().await;
        ensure!(
            !guard.contains_key(&record.document_id),
            "duplicate document id"
        );
        guard.insert(record.document_id, record);
        Ok(())
    }

    async fn get_document(&self, document_id: Uuid) -> Result<Option<DocumentRecord>> {
        Ok(self.documents.lock().await.get(&document_id).cloned())
    }

    async fn documents_by_owner(&self, owner_id: &str) -> Result<Vec<DocumentRecord>> {
        let guard = self.documents.lock().await;
        Ok(newest_first(
            guard.values().filter(|doc| doc.owner_id == owner_id),
        ))
    }

    async fn documents_by_college(&self, college_id: &str) -> Result<Vec<DocumentRecord>> {
        let guard = self.documents.lock().await;
        Ok(newest_first(
            guard.values().filter(|doc| doc.college_id == college_id),
        ))
    }

    async fn apply_review(
        &self,
        document_id: Uuid,
        update: ReviewUpdate,
    ) -> Result<Option<DocumentRecord>> {
        let mut guard = self.documents.lock().await;
        Ok(guard.get_mut(&document_id).map(|doc| {
            doc.status = update.status;
            doc.remark = update.remark;
            doc.reviewed_at = Some(update.reviewed_at);
            doc.reviewed_by = Some(update.reviewed_by);
            doc.clone()
        }))
    }

    async fn delete_document(&self, document_id: Uuid) -> Result<bool> {
        Ok(self.documents.lock().await.remove(&document_id).is_some())
    }
}

fn newest_first<'a>(docs: impl Iterator<Item = &'a DocumentRecord>) -> Vec<DocumentRecord> {
    let mut docs: Vec<DocumentRecord> = docs.cloned().collect();
    docs.sort_by(|a, b| b.uploaded_at.cmp(&a.uploaded_at));
    docs
}

#[allow(dead_code)]
#[derive(Clone)]
pub struct StoredObject {
    pub key: String,
    pub bytes: Bytes,
    pub content_type: Option<String>,
    pub content_disposition: Option<String>,
}

#[derive(Default)]
pub struct FakeStorage {
    objects: Mutex<HashMap<String, StoredObject>>,
    presigned: AtomicUsize,
    fail_deletes: AtomicBool,
}

#[async_trait]
impl ObjectStorage for FakeStorage {
    async fn put_object(
        &self,
        key: &str,
        bytes: Bytes,
        content_type: Option<String>,
        content_disposition: Option<String>,
    ) -> Result<()> {
        let stored = StoredObject {
            key: key.to_string(),
            bytes,
            content_type,
            content_disposition,
        };
        let mut guard = self.objects.lock().await;
        guard.insert(stored.key.clone(), stored);
        Ok(())
    }

    async fn presign_get_object(&self, key: &str, expires_in: Duration) -> Result<String> {
        let guard = self.objects.lock().await;
        ensure!(guard.contains_key(key), "object {key} missing");
        let issued = self.presigned.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!(
            "https://fake-storage/{key}?expires_in={}&issue={issued}",
            expires_in.as_secs()
        ))
    }

    async fn delete_object(&self, key: &str) -> Result<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            bail!("simulated storage outage");
        }
        let mut guard = self.objects.lock().await;
        guard.remove(key);
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>> {
        let guard = self.objects.lock().await;
        Ok(guard
            .keys()
            .filter(|key| key.starts_with(prefix))
            .cloned()
            .collect())
    }
}

#[allow(dead_code)]
impl FakeStorage {
    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        let guard = self.objects.lock().await;
        guard.get(key).cloned()
    }

    pub async fn object_count(&self) -> usize {
        let guard = self.objects.lock().await;
        guard.len()
    }

    pub fn presign_count(&self) -> usize {
        self.presigned.load(Ordering::SeqCst)
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }
}

#[derive(Default)]
pub struct FakeMailer {
    sent: Mutex<Vec<EmailMessage>>,
    fail: AtomicBool,
}

#[async_trait]
impl Mailer for FakeMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        if self.fail.load(Ordering::SeqCst) {
            bail!("simulated email provider outage");
        }
        self.sent.lock().await.push(message.clone());
        Ok(())
    }
}

#[allow(dead_code)]
impl FakeMailer {
    pub async fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().await.clone()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

/// Accepts only tokens it issued through [`TestApp::token_for`].
#[derive(Default)]
pub struct StaticIdentity {
    tokens: Mutex<HashMap<String, Identity>>,
}

#[async_trait]
impl IdentityVerifier for StaticIdentity {
    async fn verify(&self, token: &str) -> Result<Identity, IdentityError> {
        self.tokens
            .lock()
            .await
            .get(token)
            .cloned()
            .ok_or_else(|| IdentityError::Invalid("unknown test token".into()))
    }
}

pub fn test_config() -> AppConfig {
    AppConfig {
        database_url: "postgres://unused".to_string(),
        database_max_pool_size: 1,
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        cors_allowed_origin: None,
        aws_endpoint_url: None,
        aws_access_key_id: None,
        aws_secret_access_key: None,
        aws_region: "us-east-1".to_string(),
        s3_bucket: "test-bucket".to_string(),
        presigned_url_expiry_seconds: 300,
        upload_max_bytes: 1024 * 1024,
        identity: IdentityConfig {
            issuer: "test-issuer".to_string(),
            audience: "test-audience".to_string(),
            key_source: IdentityKeySource::Secret("test-secret".to_string()),
        },
        resend_api_key: None,
        resend_api_url: "http://localhost".to_string(),
        mail_from: "DocVerify Test <test@example.com>".to_string(),
        delete_policy: DeletePolicy::AnyAuthenticated,
        upload_cleanup_on_failure: false,
    }
}

pub struct TestApp {
    pub state: AppState,
    router: Router,
    records: Arc<MemoryRecordStore>,
    storage: Arc<FakeStorage>,
    mailer: Arc<FakeMailer>,
    identity: Arc<StaticIdentity>,
}

#[allow(dead_code)]
impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: AppConfig) -> Self {
        let records = Arc::new(MemoryRecordStore::default());
        let storage = Arc::new(FakeStorage::default());
        let mailer = Arc::new(FakeMailer::default());
        let identity = Arc::new(StaticIdentity::default());

        let state = AppState::new(
            config,
            records.clone(),
            storage.clone(),
            identity.clone(),
            mailer.clone(),
        );
        let router = routes::create_router(state.clone());

        Self {
            state,
            router,
            records,
            storage,
            mailer,
            identity,
        }
    }

    pub fn records(&self) -> Arc<MemoryRecordStore> {
        self.records.clone()
    }

    pub fn storage(&self) -> Arc<FakeStorage> {
        self.storage.clone()
    }

    pub fn mailer(&self) -> Arc<FakeMailer> {
        self.mailer.clone()
    }

    pub async fn token_for(&self, user_id: &str, email: &str) -> String {
        let token = format!("token-{user_id}");
        self.identity.tokens.lock().await.insert(
            token.clone(),
            Identity {
                subject_id: user_id.to_string(),
                email: Some(email.to_string()),
            },
        );
        token
    }

    /// Registers a student through the API and returns their bearer token.
    pub async fn register_student(&self, user_id: &str, name: &str, college_id: &str) -> Result<String> {
        let token = self.token_for(user_id, &format!("{user_id}@example.edu")).await;
        let response = self
            .post_json(
                "/api/students",
                &json!({
                    "name": name,
                    "prn": format!("PRN-{user_id}"),
                    "college_name": format!("College {college_id}"),
                    "college_id": college_id,
                }),
                Some(&token),
            )
            .await?;
        ensure!(
            response.status() == StatusCode::CREATED,
            "student registration failed with status {}",
            response.status()
        );
        Ok(token)
    }

    pub async fn register_admin(&self, user_id: &str, college_id: &str) -> Result<String> {
        let token = self.token_for(user_id, &format!("{user_id}@example.edu")).await;
        let response = self
            .post_json(
                "/api/admins",
                &json!({
                    "name": format!("Admin {user_id}"),
                    "collegeName": format!("College {college_id}"),
                    "collegeId": college_id,
                }),
                Some(&token),
            )
            .await?;
        ensure!(
            response.status() == StatusCode::CREATED,
            "admin registration failed with status {}",
            response.status()
        );
        Ok(token)
    }

    /// Uploads and returns the new document id.
    pub async fn upload(&self, filename: &str, data: &[u8], token: &str) -> Result<Uuid> {
        let response = self
            .upload_document("/api/documents", "document", filename, "application/pdf", data, token)
            .await?;
        ensure!(
            response.status() == StatusCode::CREATED,
            "upload failed with status {}",
            response.status()
        );
        let body: serde_json::Value = read_json(response).await?;
        let id = body["document"]["document_id"]
            .as_str()
            .ok_or_else(|| anyhow!("upload response missing document id"))?;
        Ok(Uuid::parse_str(id)?)
    }

    pub async fn post_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::POST, path, payload, token).await
    }

    pub async fn put_json<T: Serialize + ?Sized>(
        &self,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        self.send_json(Method::PUT, path, payload, token).await
    }

    async fn send_json<T: Serialize + ?Sized>(
        &self,
        method: Method,
        path: &str,
        payload: &T,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let body = serde_json::to_vec(payload)?;
        let mut builder = Request::builder()
            .method(method)
            .uri(path)
            .header("content-type", "application/json");
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn get(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send_empty(Method::GET, path, token).await
    }

    pub async fn delete(&self, path: &str, token: Option<&str>) -> Result<hyper::Response<Body>> {
        self.send_empty(Method::DELETE, path, token).await
    }

    async fn send_empty(
        &self,
        method: Method,
        path: &str,
        token: Option<&str>,
    ) -> Result<hyper::Response<Body>> {
        let mut builder = Request::builder().method(method).uri(path);
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        let request = builder.body(Body::empty())?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }

    pub async fn upload_document(
        &self,
        path: &str,
        field: &str,
        filename: &str,
        content_type: &str,
        data: &[u8],
        token: &str,
    ) -> Result<hyper::Response<Body>> {
        let boundary = format!("boundary-{}", Uuid::new_v4());
        let mut body = Vec::new();
        body.extend(format!("--{boundary}\r\n").as_bytes());
        body.extend(
            format!(
                "Content-Disposition: form-data; name=\"{field}\"; filename=\"{filename}\"\r\n"
            )
            .as_bytes(),
        );
        body.extend(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
        body.extend(data);
        body.extend(b"\r\n");
        body.extend(format!("--{boundary}--\r\n").as_bytes());

        let request = Request::builder()
            .method(Method::POST)
            .uri(path)
            .header(
                "content-type",
                format!("multipart/form-data; boundary={boundary}"),
            )
            .header("authorization", format!("Bearer {token}"))
            .body(Body::from(body))?;
        Ok(self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("infallible response"))
    }
}

pub async fn body_to_vec(body: Body) -> Result<Vec<u8>> {
    let collected = body
        .collect()
        .await
        .map_err(|err| anyhow!("failed to read response body: {err}"))?;
    Ok(collected.to_bytes().to_vec())
}

pub async fn read_json<T: DeserializeOwned>(response: hyper::Response<Body>) -> Result<T> {
    let body = body_to_vec(response.into_body()).await?;
    Ok(serde_json::from_slice(&body)?)
}
