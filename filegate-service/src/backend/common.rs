use std::fmt::Debug;
use std::path::Path;

use crate::PayloadStream;
use crate::error::{Error, Result};
use crate::path::RemotePath;
use crate::policy::Policy;
use crate::request::PolicyRequest;

/// User agent string used for outgoing requests.
pub const USER_AGENT: &str = concat!("filegate/", env!("CARGO_PKG_VERSION"));

/// A type-erased [`StorageBackend`] instance.
pub type BoxedBackend = Box<dyn StorageBackend>;

/// The contract every storage provider adapter implements.
///
/// All operations may be called concurrently from many requests without external locking.
/// Dropping an operation's future cancels it; adapters release open files and connections on
/// every exit path.
#[async_trait::async_trait]
pub trait StorageBackend: Debug + Send + Sync + 'static {
    /// The backend name, used for diagnostics.
    fn name(&self) -> &'static str;

    /// Uploads the bytes of a local file to `remote_path`, creating or overwriting the object.
    ///
    /// Fails with [`Error::NotFound`] without touching the backend if `local_source` cannot be
    /// opened.
    async fn upload_local_file(&self, local_source: &Path, remote_path: &RemotePath)
    -> Result<()>;

    /// Deletes the object at `remote_path`.
    ///
    /// Deleting an object that does not exist succeeds.
    async fn delete_single_file(&self, remote_path: &RemotePath) -> Result<()>;

    /// Copies the object at `src_path` to `dst_path` without streaming it through the caller.
    ///
    /// Fails with [`Error::NotFound`] if the source does not exist.
    async fn copy_file(&self, src_path: &RemotePath, dst_path: &RemotePath) -> Result<()>;

    /// Issues a signed policy allowing a client to upload directly to the backend.
    async fn get_upload_policy(&self, request: &PolicyRequest) -> Result<Policy>;

    /// Streams the contents of the object at `remote_path`, or `None` if it does not exist.
    async fn read_file(&self, remote_path: &RemotePath) -> Result<Option<PayloadStream>>;
}

/// Opens a local upload source, mapping a missing or unreadable file to [`Error::NotFound`].
pub(crate) async fn open_local_source(local_source: &Path) -> Result<tokio::fs::File> {
    let file = match tokio::fs::File::open(local_source).await {
        Ok(file) => file,
        Err(err)
            if matches!(
                err.kind(),
                std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied
            ) =>
        {
            return Err(Error::NotFound(format!(
                "local file `{}`: {err}",
                local_source.display()
            )));
        }
        Err(err) => {
            return Err(Error::unavailable(
                format!("opening local file `{}`", local_source.display()),
                err,
            ));
        }
    };

    let is_file = file
        .metadata()
        .await
        .map_err(|err| Error::unavailable("reading local file metadata", err))?
        .is_file();
    if !is_file {
        return Err(Error::NotFound(format!(
            "local file `{}` is not a regular file",
            local_source.display()
        )));
    }

    Ok(file)
}

/// Creates a reqwest client with required defaults.
pub fn reqwest_client() -> reqwest::Client {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .expect("Client::new()")
}
