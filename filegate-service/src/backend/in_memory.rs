//! In-memory backend for tests.
//!
//! This provides a [`StorageBackend`] backed by a `HashMap`, removing the need for tempdir
//! management in tests. The backend is [`Clone`] so tests can hold a handle for direct inspection
//! while the service owns a boxed copy.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use futures_util::StreamExt;
use tokio::io::AsyncReadExt;

use super::common::{StorageBackend, open_local_source};
use crate::PayloadStream;
use crate::error::{Error, Result};
use crate::path::RemotePath;
use crate::policy::{Policy, PolicyIssuer};
use crate::request::PolicyRequest;

type Store = HashMap<RemotePath, Bytes>;

/// A [`StorageBackend`] keeping all objects in memory.
#[derive(Debug, Clone)]
pub struct InMemoryBackend {
    store: Arc<Mutex<Store>>,
    issuer: Arc<PolicyIssuer>,
}

impl InMemoryBackend {
    /// Creates an empty backend issuing policies with the given issuer.
    pub fn new(issuer: PolicyIssuer) -> Self {
        Self {
            store: Arc::new(Mutex::new(HashMap::new())),
            issuer: Arc::new(issuer),
        }
    }

    /// Returns a clone of the stored bytes, if present.
    pub fn get_stored(&self, path: &RemotePath) -> Option<Bytes> {
        self.lock().get(path).cloned()
    }

    /// Returns `true` if the backend contains an object at the given path.
    pub fn contains(&self, path: &RemotePath) -> bool {
        self.lock().contains_key(path)
    }

    /// Returns `true` if the backend has no stored objects.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Inserts an object directly, bypassing the `StorageBackend` trait.
    pub fn insert(&self, path: RemotePath, contents: impl Into<Bytes>) {
        self.lock().insert(path, contents.into());
    }

    fn lock(&self) -> MutexGuard<'_, Store> {
        // A panic while holding the lock cannot leave the map half-updated.
        self.store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait::async_trait]
impl StorageBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "in-memory"
    }

    async fn upload_local_file(
        &self,
        local_source: &Path,
        remote_path: &RemotePath,
    ) -> Result<()> {
        let mut file = open_local_source(local_source).await?;
        let mut contents = Vec::new();
        file.read_to_end(&mut contents)
            .await
            .map_err(|err| Error::unavailable("reading local file", err))?;

        self.insert(remote_path.clone(), contents);
        Ok(())
    }

    async fn delete_single_file(&self, remote_path: &RemotePath) -> Result<()> {
        self.lock().remove(remote_path);
        Ok(())
    }

    async fn copy_file(&self, src_path: &RemotePath, dst_path: &RemotePath) -> Result<()> {
        let mut store = self.lock();
        let contents = store
            .get(src_path)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("object `{src_path}`")))?;
        store.insert(dst_path.clone(), contents);
        Ok(())
    }

    async fn get_upload_policy(&self, request: &PolicyRequest) -> Result<Policy> {
        self.issuer.issue(request, None)
    }

    async fn read_file(&self, remote_path: &RemotePath) -> Result<Option<PayloadStream>> {
        let entry = self.get_stored(remote_path);
        Ok(entry.map(|bytes| futures_util::stream::once(async move { Ok(bytes) }).boxed()))
    }
}
