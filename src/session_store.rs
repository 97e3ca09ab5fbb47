//! # Ephemeral Session Store
//!
//! Short-lived hash-of-fields storage for in-flight upload sessions. Records
//! expire on their own after a TTL; keys can be enumerated with a trailing `*`
//! wildcard pattern.
//!
//! Writes to a single key are atomic. Enumerating and then reading several keys
//! is not a snapshot, which is why the quota checks built on top of it are
//! best-effort: two concurrent `start`s may both be admitted.

use std::collections::HashMap;

use async_trait::async_trait;
use worker::wasm_bindgen::JsValue;
use worker::{Method, ObjectNamespace, Request, RequestInit, Stub};

use crate::durable_objects::upload_sessions::{SessionCommand, SessionReply};
use crate::errors::{AppError, AppResult};

#[async_trait(?Send)]
pub trait EphemeralStore {
    /// Stores `fields` under `key`, replacing any previous value, for `ttl_seconds`.
    async fn put_hash(
        &self,
        key: &str,
        fields: &HashMap<String, String>,
        ttl_seconds: u64,
    ) -> AppResult<()>;

    /// Returns the stored fields, or an empty map when the key is absent or expired.
    async fn get_hash(&self, key: &str) -> AppResult<HashMap<String, String>>;

    /// Lists at most `limit` live keys matching `pattern` (`prefix*`).
    async fn scan(&self, pattern: &str, limit: usize) -> AppResult<Vec<String>>;

    /// Removes `key`. Deleting an absent key is not an error.
    async fn delete(&self, key: &str) -> AppResult<()>;
}

/// Literal prefix of a `prefix*` pattern.
pub fn pattern_prefix(pattern: &str) -> &str {
    pattern.strip_suffix('*').unwrap_or(pattern)
}

/// Session store backed by the user's
/// [`UploadSessions`](crate::durable_objects::upload_sessions::UploadSessions) Durable Object.
///
/// All sessions of a user live in one object, so a `finish` or `scan` always
/// observes the writes and deletes that preceded it.
pub struct DurableSessionStore {
    stub: Stub,
}

impl DurableSessionStore {
    pub fn new(namespace: &ObjectNamespace, user_id: &str) -> AppResult<Self> {
        let stub = namespace.id_from_name(user_id)?.get_stub()?;
        Ok(Self { stub })
    }

    async fn send(&self, command: &SessionCommand) -> AppResult<SessionReply> {
        let mut init = RequestInit::new();
        init.with_method(Method::Post)
            .with_body(Some(JsValue::from_str(&serde_json::to_string(command)?)));
        let request = Request::new_with_init(SESSION_OBJECT_URL, &init)?;

        let mut response = self.stub.fetch_with_request(request).await?;
        if response.status_code() != 200 {
            return Err(AppError::storage(response.text().await?));
        }
        Ok(response.json::<SessionReply>().await?)
    }
}

const SESSION_OBJECT_URL: &str = "https://upload-sessions/command";

#[async_trait(?Send)]
impl EphemeralStore for DurableSessionStore {
    async fn put_hash(
        &self,
        key: &str,
        fields: &HashMap<String, String>,
        ttl_seconds: u64,
    ) -> AppResult<()> {
        self.send(&SessionCommand::Put {
            key: key.to_string(),
            fields: fields.clone(),
            ttl_seconds,
        })
        .await?;
        Ok(())
    }

    async fn get_hash(&self, key: &str) -> AppResult<HashMap<String, String>> {
        let reply = self
            .send(&SessionCommand::Get {
                key: key.to_string(),
            })
            .await?;
        Ok(reply.fields)
    }

    async fn scan(&self, pattern: &str, limit: usize) -> AppResult<Vec<String>> {
        let reply = self
            .send(&SessionCommand::Scan {
                prefix: pattern_prefix(pattern).to_string(),
                limit,
            })
            .await?;
        Ok(reply.keys)
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        self.send(&SessionCommand::Delete {
            key: key.to_string(),
        })
        .await?;
        Ok(())
    }
}
