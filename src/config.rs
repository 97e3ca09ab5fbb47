//! # Configuration Management
//!
//! Configuration is stored in Cloudflare KV storage under the `config` key and
//! loaded at runtime, with defaults for every setting.
//!
//! ## Configuration Options
//!
//! - `concurrent_limit`: simultaneous upload sessions allowed per user
//! - `total_size_limit`: per-user storage capacity in bytes
//! - `max_file_size`: largest single file accepted by `start`
//! - `object_path_prefix`: first segment of every object path
//! - `storage_domain`: public domain the bucket is served from
//! - `bucket_name`: bucket name embedded in signed upload policies
//! - `convert_region`: region recorded on files awaiting whiteboard conversion
//! - `policy_expire_seconds`: validity of a signed upload policy, capped at the
//!   upload session lifetime
//!
//! ## Example
//!
//! ```ignore
//! let kv = env.kv(STORAGE_CONFIG_KV_NAME)?;
//! let config = Config::load(&kv).await?;
//! ```

use crate::constants::{
    CLOUD_STORAGE_DB_NAME, DEFAULT_CONCURRENT_LIMIT, DEFAULT_CONVERT_REGION,
    DEFAULT_MAX_FILE_SIZE, DEFAULT_OBJECT_PATH_PREFIX, DEFAULT_POLICY_EXPIRE_SECONDS,
    DEFAULT_TOTAL_SIZE_LIMIT, STORAGE_BUCKET_NAME, UPLOAD_SESSIONS_DO_NAME,
    UPLOAD_SESSION_TTL_SECONDS,
};
use crate::errors::{AppError, AppResult};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use worker::kv::KvStore;
use worker::{console_log, Result};

/// Configuration structure for the upload service.
///
/// Missing keys in the stored JSON fall back to their defaults, so a partial
/// document only needs to name what it overrides.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Config {
    /// Name of the D1 binding holding files, links and usage totals.
    pub database_name: String,

    /// Name of the Durable Object binding holding upload sessions.
    pub session_object_name: String,

    /// Name of the R2 binding uploads land in.
    pub bucket_binding: String,

    pub bucket_name: String,

    pub storage_domain: String,

    pub object_path_prefix: String,

    pub concurrent_limit: usize,

    pub total_size_limit: u64,

    /// Files exceeding this limit are rejected before any quota check.
    pub max_file_size: u64,

    pub convert_region: String,

    pub policy_expire_seconds: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_name: CLOUD_STORAGE_DB_NAME.to_string(),
            session_object_name: UPLOAD_SESSIONS_DO_NAME.to_string(),
            bucket_binding: STORAGE_BUCKET_NAME.to_string(),
            bucket_name: "cloud-storage".to_string(),
            storage_domain: "https://storage.example.com".to_string(),
            object_path_prefix: DEFAULT_OBJECT_PATH_PREFIX.to_string(),
            concurrent_limit: DEFAULT_CONCURRENT_LIMIT,
            total_size_limit: DEFAULT_TOTAL_SIZE_LIMIT,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            convert_region: DEFAULT_CONVERT_REGION.to_string(),
            policy_expire_seconds: DEFAULT_POLICY_EXPIRE_SECONDS,
        }
    }
}

impl Config {
    /// Loads configuration from KV storage with fallback to defaults.
    ///
    /// # Configuration Format
    ///
    /// ```json
    /// {
    ///   "concurrentLimit": 5,
    ///   "totalSizeLimit": 2147483648,
    ///   "storageDomain": "https://files.example.com"
    /// }
    /// ```
    ///
    /// # Error Handling
    ///
    /// - If KV storage is accessible but no config exists, uses defaults
    /// - If KV storage throws an error, the error is propagated up
    /// - Invalid JSON in storage will cause parsing errors
    pub async fn load(kv: &KvStore) -> Result<Self> {
        match kv.get("config").json::<Config>().await? {
            Some(config) => {
                console_log!("Configuration loaded from KV storage");
                Ok(config)
            }
            None => {
                console_log!("Config not found in KV, using default");
                Ok(Self::default())
            }
        }
    }

    /// Validity of a signed upload policy.
    ///
    /// Never outlives the upload session: an object written after its session
    /// expired could not be finished.
    pub fn policy_lifetime(&self) -> AppResult<Duration> {
        let seconds = self
            .policy_expire_seconds
            .min(UPLOAD_SESSION_TTL_SECONDS as i64);
        if seconds <= 0 {
            return Err(AppError::Internal {
                message: format!("Invalid policyExpireSeconds: {}", self.policy_expire_seconds),
            });
        }
        Duration::try_seconds(seconds).ok_or_else(|| AppError::Internal {
            message: format!("Invalid policyExpireSeconds: {}", self.policy_expire_seconds),
        })
    }
}
