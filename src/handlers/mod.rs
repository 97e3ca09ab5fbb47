//! # Handlers Module
//!
//! This module contains HTTP request handlers for the upload service.
//! All handlers are organized by functionality and use consistent error handling.

use worker::*;
use std::sync::Arc;

use crate::config::Config;
use crate::errors::AppError;
use crate::log_data;
use crate::logging::Logger;
use crate::utils::{cors_headers, generate_request_id};

pub mod upload;

/// Dispatches upload operations and renders their errors as JSON responses.
pub async fn handle_upload_routes(req: Request, env: Env, config: Arc<Config>) -> Result<Response> {
    use upload::{finish_upload, start_upload, upload_object};

    let logger = Logger::new(generate_request_id());
    let method = req.method();
    let url = req.url()?;
    let path = url.path();

    let result = match (method, path) {
        (Method::Post, "/v1/cloud-storage/upload/start") => {
            start_upload(req, &env, &config, &logger).await
        },
        (Method::Put, "/v1/cloud-storage/upload/object") => {
            upload_object(req, &env, &config, &logger).await
        },
        (Method::Post, "/v1/cloud-storage/upload/finish") => {
            finish_upload(req, &env, &config, &logger).await
        },
        _ => {
            return Response::error("Not Found", 404);
        }
    };

    match result {
        Ok(response) => Ok(response.with_headers(cors_headers())),
        Err(app_error) => {
            log_failure(&logger, path, &app_error);
            match app_error.to_response() {
                Ok(response) => Ok(response.with_headers(cors_headers())),
                Err(_) => Response::error("Internal Server Error", 500).map(|r| r.with_headers(cors_headers())),
            }
        }
    }
}

fn log_failure(logger: &Logger, path: &str, error: &AppError) {
    let data = log_data!({ "path": path, "code": error.code(), "error": error.to_string() });
    if error.status_code().is_server_error() {
        logger.error("Upload request failed", data);
    } else if !error.is_quota_violation() {
        // Quota violations were already logged with their numbers.
        logger.info("Upload request rejected", data);
    }
}

/// Provides a health check endpoint for monitoring and load balancer probes.
pub async fn handle_health_check(_req: Request, _env: Env) -> Result<Response> {
    Response::from_json(&serde_json::json!({
        "status": "healthy",
        "service": "memenow-drive-cf-workers",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Handles requests to unmatched routes with a 404 Not Found response.
pub async fn handle_not_found(_req: Request, _env: Env) -> Result<Response> {
    Response::error("Not Found", 404)
}
