//! # Upload Sessions Durable Object
//!
//! Holds the in-flight upload sessions of a single user. Every session is one
//! storage entry carrying its fields and an absolute expiry time.
//!
//! ## Expiry
//!
//! Reads treat an entry past its expiry as absent and remove it. An alarm set
//! for the earliest pending expiry sweeps the rest, so storage does not grow
//! with sessions that were never finished.
//!
//! ## Protocol
//!
//! The worker talks to the object with one JSON [`SessionCommand`] per request
//! and receives a [`SessionReply`]:
//!
//! ```text
//! {"op": "put", "key": "upload:u1:<id>", "fields": {...}, "ttl_seconds": 1200}
//! {"op": "get", "key": "upload:u1:<id>"}                 -> {"fields": {...}}
//! {"op": "scan", "prefix": "upload:u1:", "limit": 6}      -> {"keys": [...]}
//! {"op": "delete", "key": "upload:u1:<id>"}
//! ```

use std::collections::HashMap;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use worker::*;

/// One request to the session object.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum SessionCommand {
    Put {
        key: String,
        fields: HashMap<String, String>,
        ttl_seconds: u64,
    },
    Get {
        key: String,
    },
    Scan {
        prefix: String,
        limit: usize,
    },
    Delete {
        key: String,
    },
}

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct SessionReply {
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub fields: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keys: Vec<String>,
}

/// Stored form of a session, kept as a JSON string in object storage.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct StoredSession {
    pub fields: HashMap<String, String>,
    /// Unix time in milliseconds after which the session no longer exists.
    pub expires_at: i64,
}

impl StoredSession {
    pub fn new(fields: HashMap<String, String>, ttl_seconds: u64, now_ms: i64) -> Self {
        let ttl_ms = i64::try_from(ttl_seconds.saturating_mul(1000)).unwrap_or(i64::MAX);
        Self {
            fields,
            expires_at: now_ms.saturating_add(ttl_ms),
        }
    }

    pub fn is_live(&self, now_ms: i64) -> bool {
        self.expires_at > now_ms
    }
}

/// Outcome of sweeping all stored sessions at one instant.
#[derive(Debug, Default, PartialEq)]
pub struct Sweep {
    /// Keys of live sessions, in key order.
    pub live: Vec<String>,
    pub expired: Vec<String>,
    /// Earliest expiry among live sessions.
    pub next_expiry: Option<i64>,
}

pub fn sweep(entries: &[(String, StoredSession)], now_ms: i64) -> Sweep {
    let mut sweep = Sweep::default();
    for (key, session) in entries {
        if session.is_live(now_ms) {
            sweep.live.push(key.clone());
            sweep.next_expiry = Some(match sweep.next_expiry {
                Some(at) => at.min(session.expires_at),
                None => session.expires_at,
            });
        } else {
            sweep.expired.push(key.clone());
        }
    }
    sweep.live.sort();
    sweep
}

#[durable_object]
pub struct UploadSessions {
    state: State,
}

impl DurableObject for UploadSessions {
    fn new(state: State, _env: Env) -> Self {
        Self { state }
    }

    async fn fetch(&self, mut req: Request) -> Result<Response> {
        let command: SessionCommand = req.json().await?;

        match self.execute(command).await {
            Ok(reply) => Response::from_json(&reply),
            Err(e) => {
                console_error!("UploadSessions command failed: {}", e);
                Response::error(e.to_string(), 500)
            }
        }
    }

    async fn alarm(&self) -> Result<Response> {
        let now = Utc::now().timestamp_millis();
        let sweep = sweep(&self.entries("").await?, now);

        for key in &sweep.expired {
            self.state.storage().delete(key).await?;
        }
        if let Some(at) = sweep.next_expiry {
            self.schedule_sweep(at, now).await?;
        }

        console_log!(
            "UploadSessions swept {} expired, {} live",
            sweep.expired.len(),
            sweep.live.len()
        );
        Response::ok("swept")
    }
}

impl UploadSessions {
    async fn execute(&self, command: SessionCommand) -> Result<SessionReply> {
        let now = Utc::now().timestamp_millis();
        let storage = self.state.storage();

        match command {
            SessionCommand::Put {
                key,
                fields,
                ttl_seconds,
            } => {
                let session = StoredSession::new(fields, ttl_seconds, now);
                storage.put(&key, serde_json::to_string(&session)?).await?;
                self.schedule_sweep(session.expires_at, now).await?;
                Ok(SessionReply::default())
            }
            SessionCommand::Get { key } => {
                let fields = match self.load(&key).await? {
                    Some(session) if session.is_live(now) => session.fields,
                    Some(_) => {
                        storage.delete(&key).await?;
                        HashMap::new()
                    }
                    None => HashMap::new(),
                };
                Ok(SessionReply {
                    fields,
                    ..SessionReply::default()
                })
            }
            SessionCommand::Scan { prefix, limit } => {
                let mut keys = sweep(&self.entries(&prefix).await?, now).live;
                keys.truncate(limit);
                Ok(SessionReply {
                    keys,
                    ..SessionReply::default()
                })
            }
            SessionCommand::Delete { key } => {
                storage.delete(&key).await?;
                Ok(SessionReply::default())
            }
        }
    }

    async fn load(&self, key: &str) -> Result<Option<StoredSession>> {
        match self.state.storage().get::<String>(key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// All stored sessions whose key starts with `prefix`.
    async fn entries(&self, prefix: &str) -> Result<Vec<(String, StoredSession)>> {
        let listed = self
            .state
            .storage()
            .list_with_options(ListOptions::new().prefix(prefix))
            .await?;

        let mut entries = Vec::new();
        listed.for_each(&mut |value, key| {
            let parsed = value
                .as_string()
                .and_then(|raw| serde_json::from_str::<StoredSession>(&raw).ok());
            match (key.as_string(), parsed) {
                (Some(key), Some(session)) => entries.push((key, session)),
                // Unreadable entries are swept as already expired.
                (Some(key), None) => entries.push((
                    key,
                    StoredSession {
                        fields: HashMap::new(),
                        expires_at: 0,
                    },
                )),
                (None, _) => {}
            }
        });
        Ok(entries)
    }

    /// Moves the alarm earlier when `expires_at` precedes it.
    async fn schedule_sweep(&self, expires_at: i64, now_ms: i64) -> Result<()> {
        let storage = self.state.storage();
        let pending = storage.get_alarm().await?;
        if pending.map_or(true, |at| expires_at < at) {
            let offset = u64::try_from(expires_at.saturating_sub(now_ms)).unwrap_or(0);
            storage
                .set_alarm(std::time::Duration::from_millis(offset))
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(expires_at: i64) -> StoredSession {
        StoredSession {
            fields: HashMap::from([("fileSize".to_string(), "10".to_string())]),
            expires_at,
        }
    }

    #[test]
    fn session_expires_after_its_ttl() {
        let session = StoredSession::new(HashMap::new(), 1200, 1_000);
        assert_eq!(session.expires_at, 1_201_000);
        assert!(session.is_live(1_200_999));
        assert!(!session.is_live(1_201_000));
    }

    #[test]
    fn sweep_splits_live_and_expired() {
        let entries = vec![
            ("upload:u1:c".to_string(), session(3_000)),
            ("upload:u1:a".to_string(), session(500)),
            ("upload:u1:b".to_string(), session(2_000)),
        ];

        let sweep = sweep(&entries, 1_000);
        assert_eq!(sweep.live, vec!["upload:u1:b", "upload:u1:c"]);
        assert_eq!(sweep.expired, vec!["upload:u1:a"]);
        assert_eq!(sweep.next_expiry, Some(2_000));
    }

    #[test]
    fn sweep_of_only_expired_sessions_needs_no_alarm() {
        let entries = vec![("upload:u1:a".to_string(), session(500))];
        let sweep = sweep(&entries, 500);
        assert!(sweep.live.is_empty());
        assert_eq!(sweep.next_expiry, None);
    }

    #[test]
    fn commands_use_op_tags() {
        let command = SessionCommand::Scan {
            prefix: "upload:u1:".to_string(),
            limit: 6,
        };
        let json = serde_json::to_value(&command).unwrap();
        assert_eq!(json["op"], "scan");
        assert_eq!(
            serde_json::from_value::<SessionCommand>(json).unwrap(),
            command
        );
    }

    #[test]
    fn empty_reply_parses_as_default() {
        let reply: SessionReply = serde_json::from_str("{}").unwrap();
        assert_eq!(reply, SessionReply::default());
    }
}
