//! # Utility Functions
//!
//! Object path derivation, session key shapes, request ids and CORS headers.
//!
//! ## Object Layout
//!
//! Every uploaded object lives at
//!
//! ```text
//! {prefix}/{YYYY-MM}/{DD}/{fileId}/{fileId}{extension}
//! ```
//!
//! The date is the UTC day the upload session was started, so the same path is
//! derived again at `finish` no matter when it is called.

use chrono::NaiveDate;
use uuid::Uuid;
use worker::Headers;

use crate::constants::{
    CORS_ALLOW_HEADERS, CORS_ALLOW_METHODS, CORS_ALLOW_ORIGIN, UPLOAD_SESSION_KEY_PREFIX,
};

/// Builds the object store path for an uploaded file.
///
/// # Example
///
/// ```
/// use chrono::NaiveDate;
/// use memenow_drive_cf_workers::utils::build_object_path;
/// use uuid::Uuid;
///
/// let id = Uuid::nil();
/// let date = NaiveDate::from_ymd_opt(2024, 1, 5).unwrap();
/// assert_eq!(
///     build_object_path("cloud-storage", date, &id, "a.png"),
///     format!("cloud-storage/2024-01/05/{id}/{id}.png"),
/// );
/// ```
pub fn build_object_path(prefix: &str, date: NaiveDate, file_id: &Uuid, file_name: &str) -> String {
    format!(
        "{}/{}/{}/{}/{}{}",
        prefix,
        date.format("%Y-%m"),
        date.format("%d"),
        file_id,
        file_id,
        file_extension(file_name)
    )
}

/// Returns the extension of `file_name` including the leading dot, or an empty string.
///
/// Hidden files such as `.env` have no extension.
pub fn file_extension(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(0) | None => "",
        Some(index) => &file_name[index..],
    }
}

/// Ephemeral store key of one upload session.
pub fn session_key(user_id: &str, file_id: &Uuid) -> String {
    format!("{}:{}:{}", UPLOAD_SESSION_KEY_PREFIX, user_id, file_id)
}

/// Wildcard pattern matching every upload session of a user.
pub fn session_pattern(user_id: &str) -> String {
    format!("{}:{}:*", UPLOAD_SESSION_KEY_PREFIX, user_id)
}

/// Public URL of an object served from `domain`.
pub fn object_url(domain: &str, object_path: &str) -> String {
    format!("{}/{}", domain.trim_end_matches('/'), object_path)
}

/// Identifier attached to every log line of one request.
pub fn generate_request_id() -> String {
    Uuid::new_v4().simple().to_string()
}

/// Creates HTTP headers for Cross-Origin Resource Sharing (CORS) support.
pub fn cors_headers() -> Headers {
    let headers = Headers::new();
    // Note: These values are known to be valid
    let _ = headers.set("Access-Control-Allow-Origin", CORS_ALLOW_ORIGIN);
    let _ = headers.set("Access-Control-Allow-Methods", CORS_ALLOW_METHODS);
    let _ = headers.set("Access-Control-Allow-Headers", CORS_ALLOW_HEADERS);
    headers
}
