//! # D1 Database Service
//!
//! Durable state of the cloud drive: file records, user ownership links and
//! per-user usage totals.
//!
//! ## Database Schema
//!
//! See `migrations/0001_cloud_storage.sql`:
//! - `cloud_storage_files`: one row per stored file or directory
//! - `cloud_storage_user_files`: ownership links from users to files
//! - `cloud_storage_configs`: one usage total per user
//!
//! ## Committing an Upload
//!
//! The file row, its ownership link and the usage upsert are sent as one D1
//! batch, which runs as a single transaction. Every statement in the batch is
//! guarded by the usage total the caller read earlier, so if another upload
//! finished in between, none of them apply and the commit reports a conflict.

use async_trait::async_trait;
use serde::Deserialize;
use uuid::Uuid;
use worker::d1::{D1Database, D1PreparedStatement};
use worker::wasm_bindgen::JsValue;

use crate::errors::{AppError, AppResult};
use crate::models::{FileRecord, UsageRecord, UserFileLink};

#[async_trait(?Send)]
pub trait RelationalStore {
    /// Current usage total of `user_id`, or `None` when the user has no record yet.
    async fn total_usage(&self, user_id: &str) -> AppResult<Option<u64>>;

    /// Whether a file record with `file_id` has been committed.
    async fn file_exists(&self, file_id: &Uuid) -> AppResult<bool>;

    /// Atomically inserts the file and its link and sets the usage total.
    ///
    /// Applies only if the stored total still equals `previous_total` (an absent
    /// record counts as 0); otherwise nothing is written and
    /// [`AppError::UsageConflict`] is returned.
    async fn commit_upload(
        &self,
        file: &FileRecord,
        link: &UserFileLink,
        usage: &UsageRecord,
        previous_total: u64,
    ) -> AppResult<()>;
}

const CURRENT_USAGE: &str =
    "COALESCE((SELECT total_usage FROM cloud_storage_configs WHERE user_id = ?1), 0)";

pub struct DatabaseService {
    db: D1Database,
}

#[derive(Deserialize)]
struct UsageRow {
    total_usage: u64,
}

impl DatabaseService {
    pub fn new(db: D1Database) -> Self {
        Self { db }
    }

    fn insert_file(
        &self,
        file: &FileRecord,
        link: &UserFileLink,
        previous_total: u64,
    ) -> AppResult<D1PreparedStatement> {
        let query = format!(
            "INSERT INTO cloud_storage_files \
             (file_id, file_name, file_size, file_url, directory_path, resource_type, payload) \
             SELECT ?3, ?4, ?5, ?6, ?7, ?8, ?9 WHERE {} = ?2",
            CURRENT_USAGE
        );
        let payload = serde_json::to_string(&file.payload)?;

        Ok(self.db.prepare(query).bind(&[
            JsValue::from(link.user_id.as_str()),
            JsValue::from_f64(previous_total as f64),
            JsValue::from(file.file_id.to_string()),
            JsValue::from(file.file_name.as_str()),
            JsValue::from_f64(file.file_size as f64),
            JsValue::from(file.file_url.as_str()),
            JsValue::from(file.directory_path.as_str()),
            JsValue::from(file.resource_type.as_str()),
            JsValue::from(payload),
        ])?)
    }

    fn insert_link(&self, link: &UserFileLink, previous_total: u64) -> AppResult<D1PreparedStatement> {
        let query = format!(
            "INSERT INTO cloud_storage_user_files (user_id, file_id) \
             SELECT ?1, ?3 WHERE {} = ?2",
            CURRENT_USAGE
        );

        Ok(self.db.prepare(query).bind(&[
            JsValue::from(link.user_id.as_str()),
            JsValue::from_f64(previous_total as f64),
            JsValue::from(link.file_id.to_string()),
        ])?)
    }

    fn upsert_usage(&self, usage: &UsageRecord, previous_total: u64) -> AppResult<D1PreparedStatement> {
        let query = format!(
            "INSERT INTO cloud_storage_configs (user_id, total_usage) \
             SELECT ?1, ?3 WHERE {} = ?2 \
             ON CONFLICT(user_id) DO UPDATE SET total_usage = excluded.total_usage \
             WHERE cloud_storage_configs.total_usage = ?2",
            CURRENT_USAGE
        );

        Ok(self.db.prepare(query).bind(&[
            JsValue::from(usage.user_id.as_str()),
            JsValue::from_f64(previous_total as f64),
            JsValue::from_f64(usage.total_usage_bytes as f64),
        ])?)
    }
}

#[async_trait(?Send)]
impl RelationalStore for DatabaseService {
    async fn total_usage(&self, user_id: &str) -> AppResult<Option<u64>> {
        let row = self
            .db
            .prepare("SELECT total_usage FROM cloud_storage_configs WHERE user_id = ?1")
            .bind(&[JsValue::from(user_id)])?
            .first::<UsageRow>(None)
            .await?;
        Ok(row.map(|row| row.total_usage))
    }

    async fn file_exists(&self, file_id: &Uuid) -> AppResult<bool> {
        let found = self
            .db
            .prepare("SELECT file_id FROM cloud_storage_files WHERE file_id = ?1")
            .bind(&[JsValue::from(file_id.to_string())])?
            .first::<String>(Some("file_id"))
            .await?;
        Ok(found.is_some())
    }

    async fn commit_upload(
        &self,
        file: &FileRecord,
        link: &UserFileLink,
        usage: &UsageRecord,
        previous_total: u64,
    ) -> AppResult<()> {
        // The usage upsert must run last: the guards of the earlier statements
        // read the total it is about to change.
        let statements = vec![
            self.insert_file(file, link, previous_total)?,
            self.insert_link(link, previous_total)?,
            self.upsert_usage(usage, previous_total)?,
        ];

        let results = self.db.batch(statements).await?;
        let usage_changes = match results.last() {
            Some(result) => result.meta()?.and_then(|meta| meta.changes).unwrap_or(0),
            None => 0,
        };

        if usage_changes == 0 {
            return Err(AppError::UsageConflict {
                user_id: usage.user_id.clone(),
            });
        }

        Ok(())
    }
}
