//! # Upload Session Service
//!
//! Two-phase upload workflow for one user:
//!
//! ```text
//! start  → quota checks → directory check → session (20 min TTL) → signed policy
//!          client PUTs the bytes with the policy, see `object_store::accept_upload`
//! finish → session → not yet committed → directory + object checks → quota check
//!          → file + usage → drop session
//! ```
//!
//! ## Consistency
//!
//! No in-process locking is used. Session writes are atomic per key, but the
//! concurrency and in-flight size checks read several keys without a snapshot,
//! so two racing `start` calls can both be admitted: the limits are soft by up
//! to one file. The durable write at `finish` is a single transaction guarded
//! by a compare-and-set on the usage total, so usage never loses an update.
//!
//! A session abandoned after `start` simply expires; `finish` on it then fails
//! with `FileNotFound`, as does a `finish` of an upload already committed.

use std::rc::Rc;

use chrono::Utc;
use futures::future::try_join_all;
use uuid::Uuid;

use crate::classifier::FileClassifier;
use crate::config::Config;
use crate::constants::UPLOAD_SESSION_TTL_SECONDS;
use crate::database::RelationalStore;
use crate::directory::DirectoryValidator;
use crate::errors::{AppError, AppResult};
use crate::log_data;
use crate::logging::Logger;
use crate::models::{
    FilePayload, FileRecord, FinishUploadRequest, StartUploadRequest, StartUploadResponse,
    UploadSession, UsageRecord, UserFileLink,
};
use crate::object_store::ObjectStore;
use crate::session_store::EphemeralStore;
use crate::utils::{build_object_path, object_url, session_key, session_pattern};

/// Quota and layout settings the service enforces.
#[derive(Clone, Debug, PartialEq)]
pub struct UploadSettings {
    pub concurrent_limit: usize,
    pub total_size_limit: u64,
    pub object_path_prefix: String,
    pub convert_region: String,
}

impl From<&Config> for UploadSettings {
    fn from(config: &Config) -> Self {
        Self {
            concurrent_limit: config.concurrent_limit,
            total_size_limit: config.total_size_limit,
            object_path_prefix: config.object_path_prefix.clone(),
            convert_region: config.convert_region.clone(),
        }
    }
}

/// External systems the workflow is layered on.
#[derive(Clone)]
pub struct Collaborators {
    pub sessions: Rc<dyn EphemeralStore>,
    pub database: Rc<dyn RelationalStore>,
    pub objects: Rc<dyn ObjectStore>,
    pub directories: Rc<dyn DirectoryValidator>,
    pub classifier: Rc<dyn FileClassifier>,
}

pub struct UploadSessionService {
    user_id: String,
    settings: UploadSettings,
    deps: Collaborators,
    logger: Logger,
}

impl UploadSessionService {
    pub fn new(
        user_id: impl Into<String>,
        settings: UploadSettings,
        deps: Collaborators,
        logger: Logger,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            settings,
            deps,
            logger,
        }
    }

    /// Opens an upload session and returns the credential for the direct upload.
    ///
    /// Checks run in order and the first violation wins: concurrent sessions,
    /// durable capacity, in-flight capacity, target directory.
    pub async fn start(&self, request: StartUploadRequest) -> AppResult<StartUploadResponse> {
        let file_id = Uuid::new_v4();

        self.assert_concurrent_limit().await?;
        let projected_total = self.total_usage_by_updated(request.file_size).await?;
        self.assert_concurrent_file_size(projected_total, &file_id).await?;
        self.deps
            .directories
            .assert_exists(&self.user_id, &request.target_directory_path)
            .await?;

        let upload_date = Utc::now().date_naive();
        let resource_type = self.deps.classifier.classify(&request.file_name);
        let object_path = build_object_path(
            &self.settings.object_path_prefix,
            upload_date,
            &file_id,
            &request.file_name,
        );
        let policy = self
            .deps
            .objects
            .upload_policy(&object_path, request.file_size)?;

        let session = UploadSession {
            file_name: request.file_name,
            file_size: request.file_size,
            target_directory_path: request.target_directory_path,
            resource_type,
            upload_date,
        };
        self.deps
            .sessions
            .put_hash(
                &session_key(&self.user_id, &file_id),
                &session.to_fields(),
                UPLOAD_SESSION_TTL_SECONDS,
            )
            .await?;

        self.logger.info(
            "Upload session started",
            log_data!({
                "userId": self.user_id,
                "fileId": file_id,
                "fileSize": session.file_size,
                "resourceType": resource_type.as_str(),
                "objectPath": object_path,
            }),
        );

        Ok(StartUploadResponse {
            file_id,
            object_path,
            storage_domain: self.deps.objects.domain().to_string(),
            policy: policy.policy,
            signature: policy.signature,
        })
    }

    /// Records a completed upload and releases its session.
    pub async fn finish(&self, request: FinishUploadRequest) -> AppResult<()> {
        let file_id = request.file_id;
        let key = session_key(&self.user_id, &file_id);
        let session = self.load_session(&key, &file_id).await?;

        // A session can outlive its commit when the delete below failed.
        if self.deps.database.file_exists(&file_id).await? {
            self.logger.info(
                "Upload already finished",
                log_data!({ "userId": self.user_id, "fileId": file_id }),
            );
            self.release_session(&key, &file_id).await;
            return Err(AppError::FileNotFound {
                file_id: file_id.to_string(),
            });
        }

        self.deps
            .directories
            .assert_exists(&self.user_id, &session.target_directory_path)
            .await?;

        let object_path = build_object_path(
            &self.settings.object_path_prefix,
            session.upload_date,
            &file_id,
            &session.file_name,
        );
        self.deps.objects.assert_exists(&object_path).await?;

        let total_usage = self.total_usage_by_updated(session.file_size).await?;

        let file = FileRecord {
            file_id,
            file_name: session.file_name.clone(),
            file_size: session.file_size,
            file_url: object_url(self.deps.objects.domain(), &object_path),
            directory_path: session.target_directory_path.clone(),
            resource_type: session.resource_type,
            payload: FilePayload::for_resource_type(
                session.resource_type,
                &self.settings.convert_region,
            ),
        };
        let link = UserFileLink {
            user_id: self.user_id.clone(),
            file_id,
        };
        let usage = UsageRecord {
            user_id: self.user_id.clone(),
            total_usage_bytes: total_usage,
        };
        self.deps
            .database
            .commit_upload(&file, &link, &usage, total_usage - session.file_size)
            .await?;

        self.release_session(&key, &file_id).await;

        self.logger.info(
            "Upload finished",
            log_data!({
                "userId": self.user_id,
                "fileId": file_id,
                "fileSize": session.file_size,
                "totalUsage": total_usage,
            }),
        );

        Ok(())
    }

    /// Fails when the user already has `concurrent_limit` live sessions.
    pub async fn assert_concurrent_limit(&self) -> AppResult<()> {
        let live = self.live_session_keys().await?.len();
        let limit = self.settings.concurrent_limit;

        if live >= limit {
            self.logger.info(
                "Upload concurrent limit reached",
                log_data!({ "userId": self.user_id, "liveSessions": live, "limit": limit }),
            );
            return Err(AppError::UploadConcurrentLimit { limit });
        }
        Ok(())
    }

    /// Durable usage plus `file_size`, rejected when it exceeds the capacity.
    ///
    /// Only reads; the caller writes the returned total once the file is stored.
    pub async fn total_usage_by_updated(&self, file_size: u64) -> AppResult<u64> {
        let current = self
            .deps
            .database
            .total_usage(&self.user_id)
            .await?
            .unwrap_or(0);
        let projected = current.saturating_add(file_size);
        let limit = self.settings.total_size_limit;

        if projected > limit {
            self.logger.info(
                "Not enough total usage",
                log_data!({
                    "userId": self.user_id,
                    "currentUsage": current,
                    "fileSize": file_size,
                    "projectedTotal": projected,
                    "limit": limit,
                }),
            );
            return Err(AppError::NotEnoughTotalUsage { projected, limit });
        }
        Ok(projected)
    }

    /// Adds the declared sizes of the other live sessions to `base_total` and
    /// rejects the sum when it exceeds the capacity.
    ///
    /// The session of `exclude_file_id` is already counted in `base_total`.
    pub async fn assert_concurrent_file_size(
        &self,
        base_total: u64,
        exclude_file_id: &Uuid,
    ) -> AppResult<()> {
        let own_key = session_key(&self.user_id, exclude_file_id);
        let keys: Vec<String> = self
            .live_session_keys()
            .await?
            .into_iter()
            .filter(|key| *key != own_key)
            .collect();
        let sessions =
            try_join_all(keys.iter().map(|key| self.deps.sessions.get_hash(key))).await?;

        // Sessions that expired after the scan come back empty and count as 0.
        let in_flight: u64 = sessions
            .iter()
            .filter_map(|fields| fields.get(UploadSession::FIELD_FILE_SIZE))
            .filter_map(|size| size.parse::<u64>().ok())
            .sum();
        let projected = base_total.saturating_add(in_flight);
        let limit = self.settings.total_size_limit;

        if projected > limit {
            self.logger.info(
                "Not enough total usage for in-flight uploads",
                log_data!({
                    "userId": self.user_id,
                    "baseTotal": base_total,
                    "inFlight": in_flight,
                    "inFlightSessions": keys.len(),
                    "projectedTotal": projected,
                    "limit": limit,
                }),
            );
            return Err(AppError::NotEnoughTotalUsage { projected, limit });
        }
        Ok(())
    }

    async fn live_session_keys(&self) -> AppResult<Vec<String>> {
        self.deps
            .sessions
            .scan(
                &session_pattern(&self.user_id),
                self.settings.concurrent_limit + 1,
            )
            .await
    }

    /// Deletes a committed upload's session. The upload is durable at this
    /// point, so a failure only leaves the session to expire on its own.
    async fn release_session(&self, key: &str, file_id: &Uuid) {
        if let Err(e) = self.deps.sessions.delete(key).await {
            self.logger.warn(
                "Failed to delete finished upload session",
                log_data!({ "fileId": file_id, "error": e.to_string() }),
            );
        }
    }

    async fn load_session(&self, key: &str, file_id: &Uuid) -> AppResult<UploadSession> {
        let fields = self.deps.sessions.get_hash(key).await?;

        UploadSession::from_fields(&fields).map_err(|report| {
            self.logger.info(
                "Upload session not found",
                log_data!({ "userId": self.user_id, "fileId": file_id, "present": report }),
            );
            AppError::FileNotFound {
                file_id: file_id.to_string(),
            }
        })
    }
}
