//! Core storage service and configuration.
//!
//! This module contains [`StorageService`], the entry point for all file operations, along with
//! [`StorageConfig`] for backend initialization.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::PayloadStream;
use crate::backend::{self, BoxedBackend};
use crate::error::{Error, Result};
use crate::path::RemotePath;
use crate::policy::{Policy, PolicyIssuer};
use crate::request::{CopyRequest, DeleteRequest, PolicyRequest, UploadRequest};

/// Default upper bound for a single backend operation.
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(60);

/// High-level asynchronous service for managing files in the configured backend.
///
/// The service is created once at startup and cloned cheaply into every request handler. It holds
/// no mutable state; the backend is shared read-only and is safe for concurrent use.
///
/// Every operation is bounded by the operation timeout. Dropping the returned future cancels the
/// operation and releases its local resources.
#[derive(Clone, Debug)]
pub struct StorageService(Arc<StorageServiceInner>);

#[derive(Debug)]
struct StorageServiceInner {
    backend: BoxedBackend,
    timeout: Duration,
}

/// Configuration to initialize a [`StorageService`].
#[derive(Debug, Clone)]
pub enum StorageConfig<'a> {
    /// Use a local filesystem as the storage backend.
    FileSystem {
        /// The path to the directory where files will be stored.
        path: &'a Path,
    },
    /// Use an S3-compatible storage backend.
    S3Compatible {
        /// Endpoint URL of the S3-compatible API.
        endpoint: &'a str,
        /// The name of the bucket to use.
        bucket: &'a str,
    },
    /// Use Google Cloud Storage as storage backend.
    Gcs {
        /// Optional endpoint URL for the GCS API.
        ///
        /// Assumes an emulator without authentication if set.
        endpoint: Option<&'a str>,
        /// The name of the bucket to use.
        bucket: &'a str,
    },
}

impl StorageService {
    /// Creates a new `StorageService` with the specified configuration.
    ///
    /// The issuer moves into the backend, which is the only holder of the signing secret. Any
    /// failure to construct the backend is reported as [`Error::BackendUnavailable`]; there is no
    /// service without a working backend.
    pub async fn new(
        config: StorageConfig<'_>,
        issuer: PolicyIssuer,
        timeout: Duration,
    ) -> Result<Self> {
        let backend = create_backend(config, issuer)
            .await
            .map_err(|err| Error::unavailable("failed to initialize storage backend", err))?;
        tracing::info!(backend = backend.name(), "storage backend initialized");

        Ok(Self::from_backend(backend, timeout))
    }

    /// Creates a service from an already constructed backend.
    pub fn from_backend(backend: BoxedBackend, timeout: Duration) -> Self {
        Self(Arc::new(StorageServiceInner { backend, timeout }))
    }

    /// The name of the configured backend.
    pub fn backend_name(&self) -> &'static str {
        self.0.backend.name()
    }

    /// Uploads a local file to the backend.
    pub async fn upload_local_file(&self, request: &UploadRequest) -> Result<()> {
        tracing::debug!(
            local_source = %request.local_source().display(),
            remote_path = %request.remote_path(),
            "uploading local file"
        );
        self.bounded(
            "upload",
            self.0
                .backend
                .upload_local_file(request.local_source(), request.remote_path()),
        )
        .await
    }

    /// Deletes a single object. Deleting a missing object succeeds.
    pub async fn delete_single_file(&self, request: &DeleteRequest) -> Result<()> {
        tracing::debug!(remote_path = %request.remote_path(), "deleting file");
        self.bounded(
            "delete",
            self.0.backend.delete_single_file(request.remote_path()),
        )
        .await
    }

    /// Copies an object within the backend.
    pub async fn copy_file(&self, request: &CopyRequest) -> Result<()> {
        tracing::debug!(
            src_path = %request.src_path(),
            dst_path = %request.dst_path(),
            "copying file"
        );
        self.bounded(
            "copy",
            self.0
                .backend
                .copy_file(request.src_path(), request.dst_path()),
        )
        .await
    }

    /// Issues a signed upload policy for direct client uploads.
    pub async fn get_upload_policy(&self, request: &PolicyRequest) -> Result<Policy> {
        tracing::debug!(
            remote_path = %request.remote_path(),
            callback_url = %request.callback_url(),
            "issuing upload policy"
        );
        self.bounded("policy", self.0.backend.get_upload_policy(request))
            .await
    }

    /// Streams the contents of an object, or returns `None` if it does not exist.
    pub async fn read_file(&self, remote_path: &RemotePath) -> Result<Option<PayloadStream>> {
        self.bounded("read", self.0.backend.read_file(remote_path))
            .await
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        future: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let result = match tokio::time::timeout(self.0.timeout, future).await {
            Ok(result) => result,
            Err(elapsed) => Err(Error::unavailable(
                format!("{operation} did not complete within {:?}", self.0.timeout),
                elapsed,
            )),
        };

        if let Err(ref err) = result {
            if err.is_client_error() {
                tracing::debug!(operation, error = err as &dyn std::error::Error, "rejected");
            } else {
                tracing::warn!(operation, error = err as &dyn std::error::Error, "failed");
            }
        }

        result
    }
}

async fn create_backend(config: StorageConfig<'_>, issuer: PolicyIssuer) -> Result<BoxedBackend> {
    Ok(match config {
        StorageConfig::FileSystem { path } => Box::new(backend::LocalFs::new(path, issuer)),
        StorageConfig::S3Compatible { endpoint, bucket } => Box::new(
            backend::S3Compatible::without_token(endpoint, bucket, issuer)?,
        ),
        StorageConfig::Gcs { endpoint, bucket } => backend::gcs(endpoint, bucket, issuer).await?,
    })
}

#[cfg(test)]
mod tests {
    use std::pin::Pin;

    use super::*;
    use crate::backend::{InMemoryBackend, StorageBackend};
    use crate::policy::DEFAULT_POLICY_TTL;
    use crate::stream::read_to_vec;

    fn issuer() -> PolicyIssuer {
        PolicyIssuer::new(b"secret", DEFAULT_POLICY_TTL).unwrap()
    }

    #[tokio::test]
    async fn stores_files() {
        let tempdir = tempfile::tempdir().unwrap();
        let source = tempdir.path().join("x.txt");
        tokio::fs::write(&source, b"oh hai!").await.unwrap();

        let config = StorageConfig::FileSystem {
            path: &tempdir.path().join("storage"),
        };
        let service = StorageService::new(config, issuer(), DEFAULT_OPERATION_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(service.backend_name(), "local-fs");

        let request = UploadRequest::new(&source, "remote/x.txt").unwrap();
        service.upload_local_file(&request).await.unwrap();

        let stream = service
            .read_file(request.remote_path())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(read_to_vec(stream).await.unwrap(), b"oh hai!");
    }

    #[tokio::test]
    async fn missing_local_file_is_not_found() {
        let backend = InMemoryBackend::new(issuer());
        let service =
            StorageService::from_backend(Box::new(backend.clone()), DEFAULT_OPERATION_TIMEOUT);

        let request = UploadRequest::new("/tmp/x.txt.filegate-missing", "remote/x.txt").unwrap();
        let err = service.upload_local_file(&request).await.unwrap_err();

        assert!(matches!(err, Error::NotFound(_)), "{err:?}");
        assert!(!backend.contains(request.remote_path()));
        assert!(backend.is_empty());
    }

    #[tokio::test]
    async fn copies_and_deletes() {
        let backend = InMemoryBackend::new(issuer());
        let service =
            StorageService::from_backend(Box::new(backend.clone()), DEFAULT_OPERATION_TIMEOUT);

        let src = RemotePath::new("a/src.txt").unwrap();
        backend.insert(src.clone(), "contents");

        let copy = CopyRequest::new("a/src.txt", "b/dst.txt").unwrap();
        service.copy_file(&copy).await.unwrap();
        assert_eq!(backend.get_stored(copy.dst_path()).unwrap(), "contents");
        assert_eq!(backend.get_stored(&src).unwrap(), "contents");

        let delete = DeleteRequest::new("a/src.txt").unwrap();
        service.delete_single_file(&delete).await.unwrap();
        service.delete_single_file(&delete).await.unwrap();
        assert!(!backend.contains(&src));
    }

    #[tokio::test]
    async fn invalid_s3_endpoint_is_unavailable() {
        let config = StorageConfig::S3Compatible {
            endpoint: "not a url",
            bucket: "bucket",
        };
        let err = StorageService::new(config, issuer(), DEFAULT_OPERATION_TIMEOUT)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::BackendUnavailable { .. }), "{err:?}");
    }

    /// A backend whose operations never complete.
    #[derive(Debug)]
    struct StalledBackend;

    impl StalledBackend {
        fn stall<T: Send + 'static>() -> Pin<Box<dyn Future<Output = Result<T>> + Send + 'static>> {
            Box::pin(std::future::pending())
        }
    }

    #[async_trait::async_trait]
    impl StorageBackend for StalledBackend {
        fn name(&self) -> &'static str {
            "stalled"
        }

        async fn upload_local_file(&self, _: &Path, _: &RemotePath) -> Result<()> {
            Self::stall().await
        }

        async fn delete_single_file(&self, _: &RemotePath) -> Result<()> {
            Self::stall().await
        }

        async fn copy_file(&self, _: &RemotePath, _: &RemotePath) -> Result<()> {
            Self::stall().await
        }

        async fn get_upload_policy(&self, _: &PolicyRequest) -> Result<Policy> {
            Self::stall().await
        }

        async fn read_file(&self, _: &RemotePath) -> Result<Option<PayloadStream>> {
            Self::stall().await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_stalled_operations() {
        let service =
            StorageService::from_backend(Box::new(StalledBackend), Duration::from_secs(5));

        let request = DeleteRequest::new("a/b.txt").unwrap();
        let err = service.delete_single_file(&request).await.unwrap_err();
        assert!(matches!(err, Error::BackendUnavailable { .. }), "{err:?}");
    }
}
