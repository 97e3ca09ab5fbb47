//! # Request Routing and Dispatch
//!
//! Dispatches requests to handlers based on HTTP method and URL path.
//!
//! ## Supported Routes
//!
//! - `GET /health` - Health check endpoint
//! - `POST /v1/cloud-storage/upload/start` - Open an upload session
//! - `PUT /v1/cloud-storage/upload/object` - Store the bytes a policy allows
//! - `POST /v1/cloud-storage/upload/finish` - Record a completed upload
//! - `OPTIONS *` - CORS preflight requests

use worker::*;
use std::sync::Arc;

use crate::config::Config;
use crate::handlers::*;
use crate::middleware::CorsMiddleware;

/// Handles incoming HTTP requests and routes them to appropriate handlers.
///
/// # Route Patterns
///
/// - **Health Check**: `GET /health` → `handle_health_check`
/// - **Upload Operations**: `POST|PUT /v1/cloud-storage/upload/*` → `handle_upload_routes`
/// - **CORS Preflight**: `OPTIONS *` → `CorsMiddleware::handle_preflight`
/// - **Unmatched**: `* *` → `handle_not_found`
pub async fn handle_request(req: Request, env: Env, config: Arc<Config>) -> Result<Response> {
    // Handle CORS preflight requests early to avoid unnecessary processing
    if req.method() == Method::Options {
        return CorsMiddleware::handle_preflight();
    }

    let url = req.url()?;
    let path = url.path();
    let method = req.method();

    console_log!("Routing request: {:?} {}", method, path);

    match (method, path) {
        (Method::Get, "/health") => handle_health_check(req, env)
            .await
            .map(CorsMiddleware::apply_headers),

        (Method::Post | Method::Put, path) if path.starts_with("/v1/cloud-storage/upload/") => {
            handle_upload_routes(req, env, config).await
        },

        _ => handle_not_found(req, env).await,
    }
}
