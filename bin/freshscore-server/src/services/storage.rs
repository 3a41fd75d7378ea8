//! Upload orchestration and the temporary-credential cache.
//!
//! The object-storage client only works with short-lived credentials issued
//! by an external endpoint.  [`StorageService`] caches the latest
//! credential together with the client built from it and replaces the pair
//! wholesale when the credential expires, so concurrent readers either see
//! the previous complete pair or the new complete pair, never a mix.

use std::sync::Arc;
use std::time::{Duration, UNIX_EPOCH};

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client as S3Client;
use chrono::Utc;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::{Config, StorageConfig};

/// Errors from the upload path; the first failure aborts the whole call.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The credential endpoint was unreachable or its body unreadable.
    #[error("credential request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The credential endpoint answered with a non-success status.
    #[error("credential endpoint returned status {0}")]
    Auth(u16),

    #[error("put object failed: {0}")]
    Put(String),

    #[error("presign failed: {0}")]
    Presign(String),
}

/// Temporary credential as issued by the credential endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageCredential {
    #[serde(rename = "TmpSecretId")]
    pub secret_id: String,
    #[serde(rename = "TmpSecretKey")]
    pub secret_key: String,
    #[serde(rename = "Token")]
    pub session_token: String,
    /// Absolute epoch seconds after which the credential is unusable.
    #[serde(rename = "ExpiredTime")]
    pub expires_at: i64,
}

impl StorageCredential {
    /// Usable strictly before `expires_at`; the boundary counts as expired.
    fn is_fresh(&self, now: i64) -> bool {
        self.expires_at - now > 0
    }
}

/// A credential and the storage client built from it.
///
/// Never mutated after construction; refresh swaps the whole handle.
#[derive(Debug)]
pub struct StorageHandle {
    pub client: S3Client,
    pub credential: StorageCredential,
}

/// Owns the credential cache and the upload flow.
#[derive(Debug)]
pub struct StorageService {
    config: Arc<Config>,
    http: reqwest::Client,
    cached: RwLock<Option<Arc<StorageHandle>>>,
}

impl StorageService {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            cached: RwLock::new(None),
        }
    }

    /// Return a handle whose credential is still valid, refreshing if needed.
    ///
    /// Concurrent callers that all observe an expired credential each
    /// refresh independently; every refresh yields a valid handle and the
    /// last swap wins, so the redundancy is wasteful but harmless.  A
    /// refresh failure propagates and nothing proceeds without a valid
    /// credential.
    pub async fn client(&self) -> Result<Arc<StorageHandle>, StorageError> {
        let now = Utc::now().timestamp();
        if let Some(handle) = self.cached.read().await.as_ref() {
            if handle.credential.is_fresh(now) {
                return Ok(Arc::clone(handle));
            }
        }

        let credential = self.fetch_credential().await?;
        let handle = Arc::new(StorageHandle {
            client: build_client(&self.config.storage, &credential),
            credential,
        });
        *self.cached.write().await = Some(Arc::clone(&handle));
        Ok(handle)
    }

    async fn fetch_credential(&self) -> Result<StorageCredential, StorageError> {
        debug!(endpoint = %self.config.storage.auth_endpoint, "refreshing temporary storage credential");
        let response = self
            .http
            .get(&self.config.storage.auth_endpoint)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(StorageError::Auth(status.as_u16()));
        }

        let credential: StorageCredential = response.json().await?;
        info!(expires_at = credential.expires_at, "storage credential refreshed");
        Ok(credential)
    }

    /// Upload a file and mint a time-limited download link for it.
    pub async fn upload(&self, file_name: &str, data: Vec<u8>) -> Result<String, StorageError> {
        let handle = self.client().await?;
        let object_name = object_name_for(file_name);

        handle
            .client
            .put_object()
            .bucket(&self.config.storage.bucket)
            .key(&object_name)
            .content_type(content_type_for(&object_name))
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| StorageError::Put(e.to_string()))?;

        let presigning =
            PresigningConfig::expires_in(Duration::from_secs(self.config.storage.presign_expiry_secs))
                .map_err(|e| StorageError::Presign(e.to_string()))?;
        // Signed by the same client, so the link carries the session token
        // of the credential that performed the upload.
        let presigned = handle
            .client
            .get_object()
            .bucket(&self.config.storage.bucket)
            .key(&object_name)
            .presigned(presigning)
            .await
            .map_err(|e| StorageError::Presign(e.to_string()))?;

        info!(object = %object_name, "upload complete");
        Ok(presigned.uri().to_string())
    }
}

/// Randomized object name preserving the original file extension.
fn object_name_for(file_name: &str) -> String {
    match std::path::Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
    {
        Some(ext) => format!("{}.{ext}", Uuid::new_v4()),
        None => Uuid::new_v4().to_string(),
    }
}

fn content_type_for(name: &str) -> &'static str {
    match std::path::Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        Some("bmp") => "image/bmp",
        _ => "application/octet-stream",
    }
}

fn build_client(storage: &StorageConfig, credential: &StorageCredential) -> S3Client {
    let expiry = UNIX_EPOCH + Duration::from_secs(credential.expires_at.max(0) as u64);
    let credentials = Credentials::new(
        credential.secret_id.clone(),
        credential.secret_key.clone(),
        Some(credential.session_token.clone()),
        Some(expiry),
        "freshscore-temporary",
    );

    let mut builder = aws_sdk_s3::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(storage.region.clone()))
        .credentials_provider(credentials);
    if let Some(endpoint) = &storage.endpoint_url {
        builder = builder.endpoint_url(endpoint);
    }
    if storage.force_path_style {
        builder = builder.force_path_style(true);
    }
    S3Client::from_conf(builder.build())
}

// ── Tests ──────────────────────────────────────────────────────────────────────
