//! # Upload Handlers
//!
//! HTTP handlers for the two phases of an upload and the object upload between
//! them. They parse and validate the request, wire an [`UploadSessionService`]
//! to the worker bindings, and render the result.
//!
//! ## Core Operations
//!
//! - **Start Upload**: Reserve an upload slot and issue a signed upload policy
//! - **Upload Object**: Store the bytes the policy allows
//! - **Finish Upload**: Confirm the object landed and record the file

use std::rc::Rc;

use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use worker::*;

use crate::classifier::ExtensionClassifier;
use crate::config::Config;
use crate::constants::{HEADER_UPLOAD_POLICY, HEADER_UPLOAD_SIGNATURE, UPLOAD_POLICY_SECRET_NAME};
use crate::database::DatabaseService;
use crate::directory::D1DirectoryValidator;
use crate::errors::{AppError, AppResult};
use crate::log_data;
use crate::logging::Logger;
use crate::middleware::ValidationMiddleware;
use crate::models::{FinishUploadRequest, StartUploadRequest, UploadPolicy};
use crate::object_store::{accept_upload, R2ObjectStore};
use crate::policy::PolicySigner;
use crate::session_store::DurableSessionStore;
use crate::upload_service::{Collaborators, UploadSessionService, UploadSettings};

/// Reserve an upload slot: `POST /v1/cloud-storage/upload/start`
pub async fn start_upload(
    mut req: Request,
    env: &Env,
    config: &Config,
    logger: &Logger,
) -> AppResult<Response> {
    let user_id = ValidationMiddleware::require_user_id(&req)?;
    let body: StartUploadRequest = parse_body(&mut req).await?;
    let request = ValidationMiddleware::validate_start_request(body, config.max_file_size)?;

    let service = upload_service(env, config, user_id, logger.clone())?;
    let started = service.start(request).await?;

    success(&started)
}

/// Record a completed upload: `POST /v1/cloud-storage/upload/finish`
pub async fn finish_upload(
    mut req: Request,
    env: &Env,
    config: &Config,
    logger: &Logger,
) -> AppResult<Response> {
    let user_id = ValidationMiddleware::require_user_id(&req)?;
    let request: FinishUploadRequest = parse_body(&mut req).await?;

    let service = upload_service(env, config, user_id, logger.clone())?;
    service.finish(request).await?;

    success(&json!({}))
}

/// Store the uploaded bytes: `PUT /v1/cloud-storage/upload/object`
///
/// The policy and signature returned by `start` travel in the
/// `X-Upload-Policy` and `X-Upload-Signature` headers; the body is the file.
pub async fn upload_object(
    mut req: Request,
    env: &Env,
    config: &Config,
    logger: &Logger,
) -> AppResult<Response> {
    let credential = UploadPolicy {
        policy: required_header(&req, HEADER_UPLOAD_POLICY)?,
        signature: required_header(&req, HEADER_UPLOAD_SIGNATURE)?,
    };
    let body = req.bytes().await?;
    let size = body.len();

    let signer = policy_signer(env, config)?;
    let objects = R2ObjectStore::new(
        env.bucket(&config.bucket_binding)?,
        config.storage_domain.clone(),
        signer.clone(),
    );
    let object_path = accept_upload(&objects, &signer, &credential, body, Utc::now()).await?;

    logger.info(
        "Upload object stored",
        log_data!({ "objectPath": object_path, "fileSize": size }),
    );
    success(&json!({ "objectPath": object_path }))
}

fn required_header(req: &Request, name: &str) -> AppResult<String> {
    req.headers()
        .get(name)?
        .filter(|value| !value.is_empty())
        .ok_or_else(|| AppError::MissingField {
            field: name.to_string(),
        })
}

async fn parse_body<T: serde::de::DeserializeOwned>(req: &mut Request) -> AppResult<T> {
    req.json::<T>().await.map_err(|e| AppError::InvalidField {
        field: "body".to_string(),
        reason: e.to_string(),
    })
}

fn success<T: Serialize>(data: &T) -> AppResult<Response> {
    Ok(Response::from_json(&json!({
        "status": "Success",
        "data": data,
    }))?)
}

fn policy_signer(env: &Env, config: &Config) -> AppResult<PolicySigner> {
    Ok(PolicySigner::new(
        config.bucket_name.clone(),
        env.secret(UPLOAD_POLICY_SECRET_NAME)?.to_string(),
        config.policy_lifetime()?,
    ))
}

/// Wires the service to this worker's Durable Object, D1 and R2 bindings.
fn upload_service(
    env: &Env,
    config: &Config,
    user_id: String,
    logger: Logger,
) -> AppResult<UploadSessionService> {
    let signer = policy_signer(env, config)?;
    let sessions = DurableSessionStore::new(
        &env.durable_object(&config.session_object_name)?,
        &user_id,
    )?;

    let deps = Collaborators {
        sessions: Rc::new(sessions),
        database: Rc::new(DatabaseService::new(env.d1(&config.database_name)?)),
        objects: Rc::new(R2ObjectStore::new(
            env.bucket(&config.bucket_binding)?,
            config.storage_domain.clone(),
            signer,
        )),
        directories: Rc::new(D1DirectoryValidator::new(env.d1(&config.database_name)?)),
        classifier: Rc::new(ExtensionClassifier),
    };

    Ok(UploadSessionService::new(
        user_id,
        UploadSettings::from(config),
        deps,
        logger,
    ))
}
