//! # Middleware Components
//!
//! Cross-cutting request concerns for the upload API.
//!
//! ## Middleware Types
//!
//! - **CORS Middleware**: Handles cross-origin request support
//! - **Validation Middleware**: Validates caller identity and request bodies
//!
//! ## Usage Examples
//!
//! ```ignore
//! // Handle CORS preflight
//! if req.method() == Method::Options {
//!     return CorsMiddleware::handle_preflight();
//! }
//!
//! // Identify the caller and validate the body
//! let user_id = ValidationMiddleware::require_user_id(&req)?;
//! let request = ValidationMiddleware::validate_start_request(body, config.max_file_size)?;
//! ```

use crate::constants::{HEADER_USER_ID, MAX_DIRECTORY_PATH_LENGTH, MAX_FILE_NAME_LENGTH};
use crate::errors::{AppError, AppResult};
use crate::models::StartUploadRequest;
use crate::utils::cors_headers;
use worker::*;

/// Middleware for handling Cross-Origin Resource Sharing (CORS) requests.
///
/// The current implementation allows all origins (`*`). For production
/// deployments consider restricting origins to trusted domains.
pub struct CorsMiddleware;

impl CorsMiddleware {
    /// Applies CORS headers to an existing response.
    pub fn apply_headers(response: Response) -> Response {
        response.with_headers(cors_headers())
    }

    /// Handles CORS preflight requests (OPTIONS method).
    pub fn handle_preflight() -> Result<Response> {
        Ok(Response::empty()?.with_headers(cors_headers()))
    }
}

/// Middleware for validating request parameters and headers.
///
/// All validation functions return `AppResult<T>` so failures render as
/// structured `ParamsCheckFailed` / `FileSizeTooBig` responses.
pub struct ValidationMiddleware;

impl ValidationMiddleware {
    /// Extracts the authenticated user id set by the upstream gateway.
    ///
    /// # Errors
    ///
    /// - `MissingField`: If the `X-User-Id` header is absent or empty
    /// - `InvalidField`: If it contains characters outside `[A-Za-z0-9_-]`
    pub fn require_user_id(req: &Request) -> AppResult<String> {
        let user_id = req
            .headers()
            .get(HEADER_USER_ID)?
            .filter(|id| !id.is_empty())
            .ok_or(AppError::MissingField {
                field: format!("{} header", HEADER_USER_ID),
            })?;

        Self::validate_user_id(&user_id)?;
        Ok(user_id)
    }

    /// User ids become part of session keys, so separators and wildcards are refused.
    pub fn validate_user_id(user_id: &str) -> AppResult<()> {
        if user_id.len() > 64
            || !user_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        {
            return Err(AppError::InvalidField {
                field: HEADER_USER_ID.to_string(),
                reason: "Must be 1-64 characters of [A-Za-z0-9_-]".to_string(),
            });
        }
        Ok(())
    }

    /// Validates a `start` body and returns it with a normalized directory path.
    pub fn validate_start_request(
        request: StartUploadRequest,
        max_file_size: u64,
    ) -> AppResult<StartUploadRequest> {
        Self::validate_file_name(&request.file_name)?;
        if request.file_size == 0 {
            return Err(AppError::InvalidField {
                field: "fileSize".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }
        Self::validate_file_size(request.file_size, max_file_size)?;
        let target_directory_path =
            Self::normalize_directory_path(&request.target_directory_path)?;

        Ok(StartUploadRequest {
            file_name: request.file_name.trim().to_string(),
            target_directory_path,
            ..request
        })
    }

    /// Validates that a file size is within configured limits.
    ///
    /// # Errors
    ///
    /// - `FileSizeExceeded`: If the file size exceeds the maximum limit
    pub fn validate_file_size(size: u64, max_size: u64) -> AppResult<()> {
        if size > max_size {
            return Err(AppError::FileSizeExceeded {
                size,
                max: max_size,
            });
        }
        Ok(())
    }

    /// Rejects empty names, overlong names and characters that are unsafe in paths.
    pub fn validate_file_name(file_name: &str) -> AppResult<()> {
        let file_name = file_name.trim();
        let invalid = |reason: &str| AppError::InvalidField {
            field: "fileName".to_string(),
            reason: reason.to_string(),
        };

        if file_name.is_empty() {
            return Err(invalid("Must not be empty"));
        }
        if file_name.chars().count() > MAX_FILE_NAME_LENGTH {
            return Err(invalid("Too long"));
        }
        if file_name.chars().any(|c| "/\\:*?\"<>|".contains(c) || c.is_control()) {
            return Err(invalid("Contains illegal characters"));
        }
        Ok(())
    }

    /// Accepts `/`, `/docs` or `/docs/` and always returns the trailing-slash form.
    ///
    /// # Errors
    ///
    /// - `InvalidField`: If the path is relative, too long, or has empty or dot segments
    pub fn normalize_directory_path(path: &str) -> AppResult<String> {
        let invalid = |reason: &str| AppError::InvalidField {
            field: "targetDirectoryPath".to_string(),
            reason: reason.to_string(),
        };

        if !path.starts_with('/') {
            return Err(invalid("Must start with /"));
        }
        if path.chars().count() > MAX_DIRECTORY_PATH_LENGTH {
            return Err(invalid("Too long"));
        }

        let inner = path.trim_start_matches('/').trim_end_matches('/');
        if inner.is_empty() {
            if path.chars().all(|c| c == '/') && path.len() <= 1 {
                return Ok("/".to_string());
            }
            return Err(invalid("Contains empty segments"));
        }
        if path.starts_with("//") || path.ends_with("//") {
            return Err(invalid("Contains empty segments"));
        }

        for segment in inner.split('/') {
            if segment.is_empty() {
                return Err(invalid("Contains empty segments"));
            }
            if segment == "." || segment == ".." {
                return Err(invalid("Contains relative segments"));
            }
            Self::validate_file_name(segment).map_err(|_| invalid("Contains illegal characters"))?;
        }

        Ok(format!("/{}/", inner))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(file_name: &str, file_size: u64, path: &str) -> StartUploadRequest {
        StartUploadRequest {
            file_name: file_name.to_string(),
            file_size,
            target_directory_path: path.to_string(),
        }
    }

    #[test]
    fn validate_file_size_allows_within_limit() {
        assert!(ValidationMiddleware::validate_file_size(1_048_576, 10_485_760).is_ok());
    }

    #[test]
    fn validate_file_size_rejects_over_limit() {
        let err = ValidationMiddleware::validate_file_size(20, 10).unwrap_err();
        assert!(matches!(err, AppError::FileSizeExceeded { .. }));
    }

    #[test]
    fn start_request_is_normalized() {
        let validated =
            ValidationMiddleware::validate_start_request(request(" a.png ", 1000, "/docs"), 10_000)
                .unwrap();
        assert_eq!(validated.file_name, "a.png");
        assert_eq!(validated.file_size, 1000);
        assert_eq!(validated.target_directory_path, "/docs/");
    }

    #[test]
    fn start_request_rejects_zero_size() {
        let err = ValidationMiddleware::validate_start_request(request("a.png", 0, "/"), 10)
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidField { ref field, .. } if field == "fileSize"));
    }

    #[test]
    fn start_request_rejects_oversized_file() {
        let err = ValidationMiddleware::validate_start_request(request("a.png", 11, "/"), 10)
            .unwrap_err();
        assert!(matches!(err, AppError::FileSizeExceeded { size: 11, max: 10 }));
    }

    #[test]
    fn file_names_with_separators_are_rejected() {
        let long_name = "x".repeat(129);
        for name in ["", "   ", "a/b.png", "a\\b.png", "what?.png", long_name.as_str()] {
            assert!(
                ValidationMiddleware::validate_file_name(name).is_err(),
                "{name:?} should be rejected"
            );
        }
        assert!(ValidationMiddleware::validate_file_name("résumé 2026.pdf").is_ok());
    }

    #[test]
    fn directory_paths_are_normalized() {
        assert_eq!(ValidationMiddleware::normalize_directory_path("/").unwrap(), "/");
        assert_eq!(
            ValidationMiddleware::normalize_directory_path("/docs").unwrap(),
            "/docs/"
        );
        assert_eq!(
            ValidationMiddleware::normalize_directory_path("/docs/2026/").unwrap(),
            "/docs/2026/"
        );
    }

    #[test]
    fn malformed_directory_paths_are_rejected() {
        for path in ["docs/", "//", "/docs//a/", "/../etc/", "/docs/./", "//docs/", "/a:b/"] {
            assert!(
                ValidationMiddleware::normalize_directory_path(path).is_err(),
                "{path:?} should be rejected"
            );
        }
    }

    #[test]
    fn user_ids_cannot_carry_key_separators() {
        assert!(ValidationMiddleware::validate_user_id("user_42-a").is_ok());
        assert!(ValidationMiddleware::validate_user_id("user:1").is_err());
        assert!(ValidationMiddleware::validate_user_id("user*").is_err());
    }
}
