//! Storage backends and the contract they implement.

mod common;
mod gcs;
mod in_memory;
mod local_fs;
mod s3_compatible;

pub use common::{BoxedBackend, StorageBackend, USER_AGENT};
pub use gcs::gcs;
pub use in_memory::InMemoryBackend;
pub use local_fs::LocalFs;
pub use s3_compatible::{NoToken, S3Compatible, Token, TokenProvider};

/// Behavior every backend must share.
#[cfg(test)]
pub(crate) mod contract {
    use std::path::Path;

    use super::*;
    use crate::error::Error;
    use crate::path::RemotePath;
    use crate::policy::{DEFAULT_POLICY_TTL, PolicyIssuer};
    use crate::request::PolicyRequest;
    use crate::stream::read_to_vec;

    const SECRET: &[u8] = b"contract-secret";

    pub(crate) fn issuer() -> PolicyIssuer {
        PolicyIssuer::new(SECRET, DEFAULT_POLICY_TTL).unwrap()
    }

    fn path(path: &str) -> RemotePath {
        RemotePath::new(path).unwrap()
    }

    async fn read(backend: &dyn StorageBackend, path: &RemotePath) -> Option<Vec<u8>> {
        let stream = backend.read_file(path).await.unwrap()?;
        Some(read_to_vec(stream).await.unwrap())
    }

    async fn upload_round_trips(backend: &dyn StorageBackend, scratch: &Path) {
        let source = scratch.join("upload.bin");
        let contents: Vec<u8> = (0..=255u8).cycle().take(100_000).collect();
        tokio::fs::write(&source, &contents).await.unwrap();

        let remote = path("remote/upload.bin");
        backend.upload_local_file(&source, &remote).await.unwrap();

        assert_eq!(read(backend, &remote).await.unwrap(), contents);
    }

    async fn upload_of_missing_file_creates_nothing(backend: &dyn StorageBackend) {
        let remote = path("remote/x.txt");
        let err = backend
            .upload_local_file(Path::new("/tmp/filegate-does-not-exist/x.txt"), &remote)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound(_)), "{err:?}");
        assert!(read(backend, &remote).await.is_none());
    }

    async fn upload_of_directory_is_not_found(backend: &dyn StorageBackend, scratch: &Path) {
        let remote = path("remote/dir");
        let err = backend.upload_local_file(scratch, &remote).await.unwrap_err();

        assert!(matches!(err, Error::NotFound(_)), "{err:?}");
        assert!(read(backend, &remote).await.is_none());
    }

    async fn delete_is_idempotent(backend: &dyn StorageBackend, scratch: &Path) {
        let source = scratch.join("delete.txt");
        tokio::fs::write(&source, b"to be deleted").await.unwrap();

        let remote = path("remote/delete.txt");
        backend.upload_local_file(&source, &remote).await.unwrap();
        backend.delete_single_file(&remote).await.unwrap();
        assert!(read(backend, &remote).await.is_none());

        // Deleting again, or something that never existed, succeeds.
        backend.delete_single_file(&remote).await.unwrap();
        backend
            .delete_single_file(&path("never/existed"))
            .await
            .unwrap();
    }

    async fn copy_duplicates_and_keeps_source(backend: &dyn StorageBackend, scratch: &Path) {
        let source = scratch.join("copy.txt");
        tokio::fs::write(&source, b"copy me").await.unwrap();

        let src = path("copy/src.txt");
        let dst = path("copy/nested/dst.txt");
        backend.upload_local_file(&source, &src).await.unwrap();
        backend.copy_file(&src, &dst).await.unwrap();

        assert_eq!(read(backend, &src).await.unwrap(), b"copy me");
        assert_eq!(read(backend, &dst).await.unwrap(), b"copy me");

        // The copy is independent of the source.
        backend.delete_single_file(&src).await.unwrap();
        assert_eq!(read(backend, &dst).await.unwrap(), b"copy me");
    }

    async fn copy_of_missing_source_is_not_found(backend: &dyn StorageBackend) {
        let dst = path("copy/missing-dst.txt");
        let err = backend
            .copy_file(&path("copy/missing-src.txt"), &dst)
            .await
            .unwrap_err();

        assert!(matches!(err, Error::NotFound(_)), "{err:?}");
        assert!(read(backend, &dst).await.is_none());
    }

    async fn issues_verifiable_policies(backend: &dyn StorageBackend) {
        let request = PolicyRequest::new("a/b.png", "https://cb.example/done", "id=42").unwrap();
        let policy = backend.get_upload_policy(&request).await.unwrap();
        assert!(!policy.as_str().is_empty());

        let document = issuer().verify(&policy).unwrap();
        assert_eq!(document.path, "a/b.png");
        assert_eq!(document.callback.url, "https://cb.example/done");
        assert_eq!(document.callback.body, "id=42");
    }

    async fn keys_below_objects_are_absent(backend: &dyn StorageBackend, scratch: &Path) {
        let source = scratch.join("parent.txt");
        tokio::fs::write(&source, b"parent").await.unwrap();

        let parent = path("nesting/parent");
        let child = path("nesting/parent/child");
        backend.upload_local_file(&source, &parent).await.unwrap();

        assert!(read(backend, &child).await.is_none());
        backend.delete_single_file(&child).await.unwrap();

        let err = backend
            .copy_file(&child, &path("nesting/dst"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)), "{err:?}");
        assert_eq!(read(backend, &parent).await.unwrap(), b"parent");
    }

    pub(crate) async fn run_all(backend: &dyn StorageBackend, scratch: &Path) {
        upload_round_trips(backend, scratch).await;
        upload_of_missing_file_creates_nothing(backend).await;
        upload_of_directory_is_not_found(backend, scratch).await;
        delete_is_idempotent(backend, scratch).await;
        copy_duplicates_and_keeps_source(backend, scratch).await;
        copy_of_missing_source_is_not_found(backend).await;
        keys_below_objects_are_absent(backend, scratch).await;
        issues_verifiable_policies(backend).await;
    }

    #[tokio::test]
    async fn local_fs() {
        let scratch = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let backend = LocalFs::new(root.path(), issuer());

        run_all(&backend, scratch.path()).await;
    }

    #[tokio::test]
    async fn in_memory() {
        let scratch = tempfile::tempdir().unwrap();
        let backend = InMemoryBackend::new(issuer());

        run_all(&backend, scratch.path()).await;
    }

    #[tokio::test]
    async fn concurrent_uploads_to_distinct_paths() {
        let scratch = tempfile::tempdir().unwrap();
        let root = tempfile::tempdir().unwrap();
        let backend = std::sync::Arc::new(LocalFs::new(root.path(), issuer()));

        let mut tasks = Vec::new();
        for i in 0..16 {
            let source = scratch.path().join(format!("{i}.txt"));
            tokio::fs::write(&source, format!("file {i}")).await.unwrap();

            let backend = backend.clone();
            tasks.push(tokio::spawn(async move {
                let remote = path(&format!("concurrent/{i}.txt"));
                backend.upload_local_file(&source, &remote).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        for i in 0..16 {
            let contents = read(backend.as_ref(), &path(&format!("concurrent/{i}.txt"))).await;
            assert_eq!(contents.unwrap(), format!("file {i}").into_bytes());
        }
    }
}
