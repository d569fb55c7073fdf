use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

use futures_util::StreamExt;
use tokio::fs::OpenOptions;
use tokio::io::{AsyncRead, AsyncWriteExt, BufWriter};
use tokio_util::io::ReaderStream;

use super::common::{StorageBackend, open_local_source};
use crate::PayloadStream;
use crate::error::{Error, Result};
use crate::path::RemotePath;
use crate::policy::{Policy, PolicyIssuer};
use crate::request::PolicyRequest;

/// A backend storing objects as files below a root directory.
///
/// Writes go to a temporary file next to the target and are renamed into place, so readers see
/// either the old or the new object, never a partial one.
#[derive(Debug)]
pub struct LocalFs {
    path: PathBuf,
    issuer: PolicyIssuer,
}

impl LocalFs {
    /// Creates a backend rooted at `path`. The directory is created on first write.
    pub fn new(path: &Path, issuer: PolicyIssuer) -> Self {
        Self {
            path: path.into(),
            issuer,
        }
    }

    fn object_path(&self, remote_path: &RemotePath) -> PathBuf {
        self.path.join(remote_path.as_str())
    }
}

#[async_trait::async_trait]
impl StorageBackend for LocalFs {
    fn name(&self) -> &'static str {
        "local-fs"
    }

    #[tracing::instrument(level = "trace", fields(%remote_path), skip_all)]
    async fn upload_local_file(
        &self,
        local_source: &Path,
        remote_path: &RemotePath,
    ) -> Result<()> {
        tracing::debug!("Writing to local_fs backend");
        let source = open_local_source(local_source).await?;

        write_atomically(&self.object_path(remote_path), source)
            .await
            .map_err(|err| map_io_error(err, "writing object", remote_path))
    }

    #[tracing::instrument(level = "trace", fields(%remote_path), skip_all)]
    async fn delete_single_file(&self, remote_path: &RemotePath) -> Result<()> {
        tracing::debug!("Deleting from local_fs backend");
        match tokio::fs::remove_file(self.object_path(remote_path)).await {
            Ok(()) => Ok(()),
            // A missing object, a key that is only a prefix of other objects, or a key below an
            // existing object.
            Err(err) if is_absent(&err) => {
                tracing::debug!("Object not found, nothing to delete");
                Ok(())
            }
            Err(err) => Err(map_io_error(err, "deleting object", remote_path)),
        }
    }

    #[tracing::instrument(level = "trace", fields(%src_path, %dst_path), skip_all)]
    async fn copy_file(&self, src_path: &RemotePath, dst_path: &RemotePath) -> Result<()> {
        tracing::debug!("Copying within local_fs backend");
        let Some(source) = open_object(&self.object_path(src_path))
            .await
            .map_err(|err| map_io_error(err, "opening copy source", src_path))?
        else {
            return Err(Error::NotFound(format!("object `{src_path}`")));
        };

        write_atomically(&self.object_path(dst_path), source)
            .await
            .map_err(|err| map_io_error(err, "writing copy destination", dst_path))
    }

    async fn get_upload_policy(&self, request: &PolicyRequest) -> Result<Policy> {
        self.issuer.issue(request, None)
    }

    #[tracing::instrument(level = "trace", fields(%remote_path), skip_all)]
    async fn read_file(&self, remote_path: &RemotePath) -> Result<Option<PayloadStream>> {
        tracing::debug!("Reading from local_fs backend");
        let file = open_object(&self.object_path(remote_path))
            .await
            .map_err(|err| map_io_error(err, "reading object", remote_path))?;

        Ok(file.map(|file| ReaderStream::new(file).boxed()))
    }
}

/// Opens the file backing an object, returning `None` if there is no such object.
async fn open_object(path: &Path) -> io::Result<Option<tokio::fs::File>> {
    let file = match OpenOptions::new().read(true).open(path).await {
        Ok(file) => file,
        Err(err) if is_absent(&err) => return Ok(None),
        Err(err) => return Err(err),
    };

    if !file.metadata().await?.is_file() {
        return Ok(None);
    }

    Ok(Some(file))
}

/// Returns `true` if an I/O error means there is no object at the requested path.
fn is_absent(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::NotFound | ErrorKind::IsADirectory | ErrorKind::NotADirectory
    )
}

/// Writes `reader` to a temporary sibling of `target` and renames it into place.
///
/// The temporary file is removed if writing fails or the future is dropped before the rename.
async fn write_atomically<R>(target: &Path, reader: R) -> io::Result<()>
where
    R: AsyncRead + Unpin,
{
    let parent = target
        .parent()
        .ok_or_else(|| io::Error::new(ErrorKind::InvalidInput, "object path has no parent"))?;
    tokio::fs::create_dir_all(parent)
        .await
        .map_err(|err| match err.kind() {
            ErrorKind::AlreadyExists => io::Error::new(ErrorKind::NotADirectory, err),
            _ => err,
        })?;

    let file_name = target
        .file_name()
        .map(|name| name.to_string_lossy())
        .unwrap_or_default();
    let temp = tempfile::Builder::new()
        .prefix(&format!(".{file_name}."))
        .suffix(".tmp")
        .tempfile_in(parent)?;

    let mut reader = reader;
    let mut writer = BufWriter::new(tokio::fs::File::from_std(temp.reopen()?));

    tokio::io::copy(&mut reader, &mut writer).await?;
    writer.flush().await?;
    let file = writer.into_inner();
    file.sync_data().await?;
    drop(file);

    temp.persist(target).map_err(|err| err.error)?;

    Ok(())
}

fn map_io_error(err: io::Error, context: &str, remote_path: &RemotePath) -> Error {
    match err.kind() {
        ErrorKind::NotADirectory => Error::InvalidPath {
            path: remote_path.to_string(),
            reason: "a parent segment is an existing object",
        },
        ErrorKind::IsADirectory => Error::InvalidPath {
            path: remote_path.to_string(),
            reason: "path is a prefix of existing objects",
        },
        _ => Error::unavailable(format!("{context} `{remote_path}`"), err),
    }
}
