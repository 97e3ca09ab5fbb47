//! In-memory collaborators for exercising the upload workflow without bindings.

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::rc::Rc;

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use crate::classifier::ExtensionClassifier;
use crate::database::RelationalStore;
use crate::directory::DirectoryValidator;
use crate::errors::{AppError, AppResult};
use crate::logging::Logger;
use crate::models::{FileRecord, UploadPolicy, UsageRecord, UserFileLink};
use crate::object_store::ObjectStore;
use crate::policy::PolicySigner;
use crate::session_store::{pattern_prefix, EphemeralStore};
use crate::upload_service::{Collaborators, UploadSessionService, UploadSettings};

/// Session store whose entries expire only when a test says so.
#[derive(Default)]
pub struct MemorySessionStore {
    entries: RefCell<BTreeMap<String, (HashMap<String, String>, u64)>>,
    pub fail_deletes: Cell<bool>,
}

impl MemorySessionStore {
    /// Drops every entry, as if all TTLs had elapsed.
    pub fn expire_all(&self) {
        self.entries.borrow_mut().clear();
    }

    pub fn expire(&self, key: &str) {
        self.entries.borrow_mut().remove(key);
    }

    pub fn keys(&self) -> Vec<String> {
        self.entries.borrow().keys().cloned().collect()
    }

    pub fn ttl_of(&self, key: &str) -> Option<u64> {
        self.entries.borrow().get(key).map(|(_, ttl)| *ttl)
    }

    pub fn fields_of(&self, key: &str) -> Option<HashMap<String, String>> {
        self.entries.borrow().get(key).map(|(fields, _)| fields.clone())
    }

    pub fn insert_raw(&self, key: &str, fields: HashMap<String, String>) {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), (fields, 1200));
    }
}

#[async_trait(?Send)]
impl EphemeralStore for MemorySessionStore {
    async fn put_hash(
        &self,
        key: &str,
        fields: &HashMap<String, String>,
        ttl_seconds: u64,
    ) -> AppResult<()> {
        self.entries
            .borrow_mut()
            .insert(key.to_string(), (fields.clone(), ttl_seconds));
        Ok(())
    }

    async fn get_hash(&self, key: &str) -> AppResult<HashMap<String, String>> {
        Ok(self.fields_of(key).unwrap_or_default())
    }

    async fn scan(&self, pattern: &str, limit: usize) -> AppResult<Vec<String>> {
        let prefix = pattern_prefix(pattern);
        Ok(self
            .entries
            .borrow()
            .keys()
            .filter(|key| key.starts_with(prefix))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn delete(&self, key: &str) -> AppResult<()> {
        if self.fail_deletes.get() {
            return Err(AppError::storage("delete unavailable"));
        }
        self.entries.borrow_mut().remove(key);
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDatabase {
    pub files: RefCell<Vec<FileRecord>>,
    pub links: RefCell<Vec<UserFileLink>>,
    pub usage: RefCell<HashMap<String, u64>>,
    /// Usage written by a competing request right before the next commit.
    pub interleaved_usage: RefCell<Option<(String, u64)>>,
}

impl MemoryDatabase {
    pub fn set_usage(&self, user_id: &str, total: u64) {
        self.usage.borrow_mut().insert(user_id.to_string(), total);
    }

    pub fn usage_of(&self, user_id: &str) -> Option<u64> {
        self.usage.borrow().get(user_id).copied()
    }
}

#[async_trait(?Send)]
impl RelationalStore for MemoryDatabase {
    async fn total_usage(&self, user_id: &str) -> AppResult<Option<u64>> {
        Ok(self.usage_of(user_id))
    }

    async fn file_exists(&self, file_id: &Uuid) -> AppResult<bool> {
        Ok(self.files.borrow().iter().any(|f| f.file_id == *file_id))
    }

    async fn commit_upload(
        &self,
        file: &FileRecord,
        link: &UserFileLink,
        usage: &UsageRecord,
        previous_total: u64,
    ) -> AppResult<()> {
        if let Some((user_id, total)) = self.interleaved_usage.borrow_mut().take() {
            self.set_usage(&user_id, total);
        }

        let current = self.usage_of(&usage.user_id).unwrap_or(0);
        if current != previous_total {
            return Err(AppError::UsageConflict {
                user_id: usage.user_id.clone(),
            });
        }
        if self.files.borrow().iter().any(|f| f.file_id == file.file_id) {
            return Err(AppError::storage("UNIQUE constraint failed: file_id"));
        }

        self.files.borrow_mut().push(file.clone());
        self.links.borrow_mut().push(link.clone());
        self.set_usage(&usage.user_id, usage.total_usage_bytes);
        Ok(())
    }
}

/// Object store that signs real policies and keeps object paths in memory.
pub struct MemoryObjectStore {
    pub objects: RefCell<HashSet<String>>,
    pub issued: RefCell<Vec<(String, u64)>>,
    pub signer: PolicySigner,
}

impl Default for MemoryObjectStore {
    fn default() -> Self {
        Self {
            objects: RefCell::default(),
            issued: RefCell::default(),
            signer: PolicySigner::new("cloud-storage", "test-secret", Duration::seconds(1200)),
        }
    }
}

impl MemoryObjectStore {
    pub const DOMAIN: &'static str = "https://files.test";

    pub fn upload(&self, path: &str) {
        self.objects.borrow_mut().insert(path.to_string());
    }
}

#[async_trait(?Send)]
impl ObjectStore for MemoryObjectStore {
    fn domain(&self) -> &str {
        Self::DOMAIN
    }

    fn upload_policy(&self, object_path: &str, file_size: u64) -> AppResult<UploadPolicy> {
        self.issued
            .borrow_mut()
            .push((object_path.to_string(), file_size));
        self.signer.sign(object_path, file_size, Utc::now())
    }

    async fn assert_exists(&self, object_path: &str) -> AppResult<()> {
        if self.objects.borrow().contains(object_path) {
            Ok(())
        } else {
            Err(AppError::ObjectNotFound {
                path: object_path.to_string(),
            })
        }
    }

    async fn put_object(&self, object_path: &str, _body: Vec<u8>) -> AppResult<()> {
        self.upload(object_path);
        Ok(())
    }
}

/// Directory tree where `/` and every added path exist.
#[derive(Default)]
pub struct MemoryDirectories {
    pub paths: RefCell<HashSet<String>>,
}

impl MemoryDirectories {
    pub fn add(&self, path: &str) {
        self.paths.borrow_mut().insert(path.to_string());
    }

    pub fn remove(&self, path: &str) {
        self.paths.borrow_mut().remove(path);
    }
}

#[async_trait(?Send)]
impl DirectoryValidator for MemoryDirectories {
    async fn assert_exists(&self, _user_id: &str, path: &str) -> AppResult<()> {
        if path == "/" || self.paths.borrow().contains(path) {
            Ok(())
        } else {
            Err(AppError::DirectoryNotFound {
                path: path.to_string(),
            })
        }
    }
}

/// A service wired to in-memory collaborators, with handles to inspect them.
pub struct Harness {
    pub sessions: Rc<MemorySessionStore>,
    pub database: Rc<MemoryDatabase>,
    pub objects: Rc<MemoryObjectStore>,
    pub directories: Rc<MemoryDirectories>,
    pub settings: UploadSettings,
}

impl Harness {
    pub const USER_ID: &'static str = "user-1";

    pub fn new(concurrent_limit: usize, total_size_limit: u64) -> Self {
        let directories = Rc::new(MemoryDirectories::default());
        directories.add("/docs/");

        Self {
            sessions: Rc::new(MemorySessionStore::default()),
            database: Rc::new(MemoryDatabase::default()),
            objects: Rc::new(MemoryObjectStore::default()),
            directories,
            settings: UploadSettings {
                concurrent_limit,
                total_size_limit,
                object_path_prefix: "cloud-storage".to_string(),
                convert_region: "cn-hz".to_string(),
            },
        }
    }

    pub fn service(&self) -> UploadSessionService {
        self.service_for(Self::USER_ID)
    }

    pub fn service_for(&self, user_id: &str) -> UploadSessionService {
        let deps = Collaborators {
            sessions: self.sessions.clone(),
            database: self.database.clone(),
            objects: self.objects.clone(),
            directories: self.directories.clone(),
            classifier: Rc::new(ExtensionClassifier),
        };
        UploadSessionService::new(
            user_id,
            self.settings.clone(),
            deps,
            Logger::new("test".to_string()),
        )
    }
}
