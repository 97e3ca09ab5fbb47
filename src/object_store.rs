//! # Object Store
//!
//! Issues upload credentials, accepts the upload they allow, and confirms at
//! `finish` that the object actually landed.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use worker::Bucket;

use crate::errors::{AppError, AppResult};
use crate::models::UploadPolicy;
use crate::policy::PolicySigner;

#[async_trait(?Send)]
pub trait ObjectStore {
    /// Public domain uploaded objects are served from.
    fn domain(&self) -> &str;

    /// Signed policy allowing exactly `file_size` bytes at `object_path`.
    fn upload_policy(&self, object_path: &str, file_size: u64) -> AppResult<UploadPolicy>;

    /// Fails with [`AppError::ObjectNotFound`] unless an object exists at `object_path`.
    async fn assert_exists(&self, object_path: &str) -> AppResult<()>;

    /// Writes `body` at `object_path`, replacing any previous object.
    async fn put_object(&self, object_path: &str, body: Vec<u8>) -> AppResult<()>;
}

/// Stores an upload presented with the credential `start` issued.
///
/// The body is written only if the policy verifies and its length is exactly
/// the declared file size. Returns the object path.
pub async fn accept_upload(
    objects: &dyn ObjectStore,
    signer: &PolicySigner,
    credential: &UploadPolicy,
    body: Vec<u8>,
    now: DateTime<Utc>,
) -> AppResult<String> {
    let grant = signer.verify(credential, now)?;
    if body.len() as u64 != grant.file_size {
        return Err(AppError::PolicyRejected {
            reason: format!(
                "content length {} does not match the declared {}",
                body.len(),
                grant.file_size
            ),
        });
    }

    objects.put_object(&grant.object_path, body).await?;
    Ok(grant.object_path)
}

/// R2 bucket binding plus the signer for its upload credentials.
pub struct R2ObjectStore {
    bucket: Bucket,
    domain: String,
    signer: PolicySigner,
}

impl R2ObjectStore {
    pub fn new(bucket: Bucket, domain: impl Into<String>, signer: PolicySigner) -> Self {
        Self {
            bucket,
            domain: domain.into(),
            signer,
        }
    }
}

#[async_trait(?Send)]
impl ObjectStore for R2ObjectStore {
    fn domain(&self) -> &str {
        &self.domain
    }

    fn upload_policy(&self, object_path: &str, file_size: u64) -> AppResult<UploadPolicy> {
        self.signer.sign(object_path, file_size, Utc::now())
    }

    async fn assert_exists(&self, object_path: &str) -> AppResult<()> {
        match self.bucket.head(object_path).await? {
            Some(_) => Ok(()),
            None => Err(AppError::ObjectNotFound {
                path: object_path.to_string(),
            }),
        }
    }

    async fn put_object(&self, object_path: &str, body: Vec<u8>) -> AppResult<()> {
        self.bucket.put(object_path, body).execute().await?;
        Ok(())
    }
}
