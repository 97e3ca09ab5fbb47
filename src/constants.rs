//! # Application Constants
//!
//! Binding names that must match `wrangler.toml`, default quota values and the
//! HTTP header names used by the upload API.

/// KV namespace holding the service configuration under the `config` key
pub const STORAGE_CONFIG_KV_NAME: &str = "STORAGE_CONFIG";

/// Durable Object namespace holding in-flight upload sessions, one object per user
pub const UPLOAD_SESSIONS_DO_NAME: &str = "UPLOAD_SESSIONS";

/// R2 bucket binding name
pub const STORAGE_BUCKET_NAME: &str = "STORAGE_BUCKET";

/// D1 database binding name for files, ownership links and usage totals
pub const CLOUD_STORAGE_DB_NAME: &str = "CLOUD_STORAGE_DB";

/// Secret used to sign upload policies
pub const UPLOAD_POLICY_SECRET_NAME: &str = "UPLOAD_POLICY_SECRET";

/// Lifetime of an upload session between `start` and `finish` (20 minutes)
pub const UPLOAD_SESSION_TTL_SECONDS: u64 = 1200;

/// Key prefix for upload sessions: `upload:{userId}:{fileId}`
pub const UPLOAD_SESSION_KEY_PREFIX: &str = "upload";

/// Default number of simultaneous upload sessions per user
pub const DEFAULT_CONCURRENT_LIMIT: usize = 5;

/// Default per-user storage capacity (2GB)
pub const DEFAULT_TOTAL_SIZE_LIMIT: u64 = 2_147_483_648;

/// Default maximum size of a single file (500MB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 524_288_000;

/// Default object path prefix inside the bucket
pub const DEFAULT_OBJECT_PATH_PREFIX: &str = "cloud-storage";

/// Default region recorded on files awaiting whiteboard conversion
pub const DEFAULT_CONVERT_REGION: &str = "cn-hz";

/// Default validity of a signed upload policy, equal to the session lifetime
pub const DEFAULT_POLICY_EXPIRE_SECONDS: i64 = UPLOAD_SESSION_TTL_SECONDS as i64;

/// Longest accepted file name, in characters
pub const MAX_FILE_NAME_LENGTH: usize = 128;

/// Longest accepted directory path, in characters
pub const MAX_DIRECTORY_PATH_LENGTH: usize = 300;

/// HTTP header carrying the authenticated user id
pub const HEADER_USER_ID: &str = "X-User-Id";

/// HTTP header carrying the base64 upload policy issued by `start`
pub const HEADER_UPLOAD_POLICY: &str = "X-Upload-Policy";

/// HTTP header carrying the signature of the upload policy
pub const HEADER_UPLOAD_SIGNATURE: &str = "X-Upload-Signature";

/// CORS header for allowed origins
pub const CORS_ALLOW_ORIGIN: &str = "*";

/// CORS header for allowed methods
pub const CORS_ALLOW_METHODS: &str = "GET, POST, PUT, OPTIONS";

/// CORS header for allowed headers
pub const CORS_ALLOW_HEADERS: &str = "Content-Type, X-User-Id, X-Upload-Policy, X-Upload-Signature";
