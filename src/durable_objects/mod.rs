//! # Durable Objects Module
//!
//! Durable Objects give the upload workflow strongly consistent state: a read
//! that follows a write or delete on the same object always observes it.
//!
//! ## Current Implementations
//!
//! - **UploadSessions**: In-flight upload sessions of one user, with TTL expiry
//!
//! ## Usage Pattern
//!
//! ```ignore
//! let namespace = env.durable_object(UPLOAD_SESSIONS_DO_NAME)?;
//! let store = DurableSessionStore::new(&namespace, user_id)?;
//! ```

pub mod upload_sessions;
