//! # Directory Validation
//!
//! Directories are stored as file records with resource type `Directory`: the
//! directory `/docs/reports/` is the record named `reports` inside `/docs/`.
//! The root `/` always exists.

use async_trait::async_trait;
use worker::d1::D1Database;
use worker::wasm_bindgen::JsValue;

use crate::errors::{AppError, AppResult};
use crate::models::ResourceType;

#[async_trait(?Send)]
pub trait DirectoryValidator {
    /// Fails with [`AppError::DirectoryNotFound`] unless `path` exists for `user_id`.
    async fn assert_exists(&self, user_id: &str, path: &str) -> AppResult<()>;
}

/// Splits `/a/b/` into its parent `/a/` and name `b`. Returns `None` for the root.
pub fn split_directory_path(path: &str) -> Option<(&str, &str)> {
    let trimmed = path.strip_suffix('/')?;
    let index = trimmed.rfind('/')?;
    let name = &trimmed[index + 1..];
    if name.is_empty() {
        return None;
    }
    Some((&path[..=index], name))
}

pub struct D1DirectoryValidator {
    db: D1Database,
}

impl D1DirectoryValidator {
    pub fn new(db: D1Database) -> Self {
        Self { db }
    }
}

#[async_trait(?Send)]
impl DirectoryValidator for D1DirectoryValidator {
    async fn assert_exists(&self, user_id: &str, path: &str) -> AppResult<()> {
        let Some((parent, name)) = split_directory_path(path) else {
            return Ok(());
        };

        let row = self
            .db
            .prepare(
                "SELECT f.file_id FROM cloud_storage_files f \
                 INNER JOIN cloud_storage_user_files u ON u.file_id = f.file_id \
                 WHERE u.user_id = ?1 AND f.directory_path = ?2 AND f.file_name = ?3 \
                 AND f.resource_type = ?4 LIMIT 1",
            )
            .bind(&[
                JsValue::from(user_id),
                JsValue::from(parent),
                JsValue::from(name),
                JsValue::from(ResourceType::Directory.as_str()),
            ])?
            .first::<String>(Some("file_id"))
            .await?;

        match row {
            Some(_) => Ok(()),
            None => Err(AppError::DirectoryNotFound {
                path: path.to_string(),
            }),
        }
    }
}
