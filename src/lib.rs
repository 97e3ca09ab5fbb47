//! # MemeNow Drive - Cloudflare Workers
//!
//! Quota-checked, two-phase file uploads for a cloud drive, built with Rust and
//! Cloudflare Workers:
//!
//! 1. `start` checks the user's quotas and target directory, opens a short-lived
//!    upload session in the user's Durable Object and returns a signed upload
//!    policy.
//! 2. The client `PUT`s the file with that policy; the worker verifies it and
//!    writes the object to R2.
//! 3. `finish` confirms the object exists, records the file in D1 and updates
//!    the user's storage usage.
//!
//! ## Architecture
//!
//! - **Router / Handlers / Middleware**: HTTP surface, validation and CORS
//! - **UploadSessionService**: The session lifecycle and quota enforcement
//! - **Collaborators**: Traits for the session store (Durable Object), relational store
//!   (D1), object store (R2), directory validation and file classification,
//!   each with a worker-backed implementation
//!
//! ## Example Usage
//!
//! ```text
//! POST /v1/cloud-storage/upload/start   - Reserve an upload slot
//! PUT  /v1/cloud-storage/upload/object  - Upload the file with the policy
//! POST /v1/cloud-storage/upload/finish  - Record the uploaded file
//! GET  /health                          - Health check
//! ```

use std::sync::{Arc, OnceLock};
use worker::*;

pub mod classifier;
pub mod config;
pub mod constants;
pub mod database;
pub mod directory;
pub mod durable_objects;
pub mod errors;
mod handlers;
pub mod logging;
mod middleware;
pub mod models;
pub mod object_store;
pub mod policy;
mod router;
pub mod session_store;
pub mod upload_service;
pub mod utils;

#[cfg(test)]
mod testing;

use config::Config;
use constants::STORAGE_CONFIG_KV_NAME;

static CONFIG_CACHE: OnceLock<Arc<Config>> = OnceLock::new();

/// Main entry point for the Cloudflare Worker.
///
/// Sets up panic reporting, loads configuration (cached for the lifetime of
/// the isolate) and delegates to the router.
#[event(fetch)]
pub async fn main(req: Request, env: Env, _ctx: Context) -> Result<Response> {
    // Set up panic hook for better error reporting in development
    console_error_panic_hook::set_once();

    let config = load_config(&env).await?;

    router::handle_request(req, env, config).await
}

async fn load_config(env: &Env) -> Result<Arc<Config>> {
    if let Some(config) = CONFIG_CACHE.get() {
        return Ok(config.clone());
    }

    let kv = env.kv(STORAGE_CONFIG_KV_NAME)?;
    let config = Arc::new(Config::load(&kv).await?);
    let _ = CONFIG_CACHE.set(config.clone());
    Ok(config)
}
