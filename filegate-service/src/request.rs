//! Validated operation requests.
//!
//! Each request type can only be built through its fallible constructor, which checks all input
//! invariants. Handlers build these from raw strings and pass them to the
//! [`StorageService`](crate::StorageService).

use std::path::{Path, PathBuf};

use url::Url;

use crate::error::{Error, Result};
use crate::path::RemotePath;

/// Upload the contents of a local file to the backend.
#[derive(Clone, Debug)]
pub struct UploadRequest {
    local_source: PathBuf,
    remote_path: RemotePath,
}

impl UploadRequest {
    /// Creates an upload request from a local file and a destination key.
    pub fn new(local_source: impl Into<PathBuf>, remote_path: &str) -> Result<Self> {
        let local_source = local_source.into();
        if local_source.as_os_str().is_empty() {
            return Err(Error::InvalidArgument(
                "local source path must not be empty".into(),
            ));
        }

        Ok(Self {
            local_source,
            remote_path: RemotePath::new(remote_path)?,
        })
    }

    /// The local file whose bytes will be uploaded.
    pub fn local_source(&self) -> &Path {
        &self.local_source
    }

    /// The destination key in the backend.
    pub fn remote_path(&self) -> &RemotePath {
        &self.remote_path
    }
}

/// Delete a single object from the backend.
#[derive(Clone, Debug)]
pub struct DeleteRequest {
    remote_path: RemotePath,
}

impl DeleteRequest {
    /// Creates a delete request for the given key.
    pub fn new(remote_path: &str) -> Result<Self> {
        Ok(Self {
            remote_path: RemotePath::new(remote_path)?,
        })
    }

    /// The key of the object to delete.
    pub fn remote_path(&self) -> &RemotePath {
        &self.remote_path
    }
}

/// Copy an object to a new key, server-side.
#[derive(Clone, Debug)]
pub struct CopyRequest {
    src_path: RemotePath,
    dst_path: RemotePath,
}

impl CopyRequest {
    /// Creates a copy request from `src_path` to `dst_path`.
    pub fn new(src_path: &str, dst_path: &str) -> Result<Self> {
        Ok(Self {
            src_path: RemotePath::new(src_path)?,
            dst_path: RemotePath::new(dst_path)?,
        })
    }

    /// The key to copy from.
    pub fn src_path(&self) -> &RemotePath {
        &self.src_path
    }

    /// The key to copy to.
    pub fn dst_path(&self) -> &RemotePath {
        &self.dst_path
    }
}

/// Issue an upload policy that lets a client upload directly to the backend.
#[derive(Clone, Debug)]
pub struct PolicyRequest {
    remote_path: RemotePath,
    callback_url: Url,
    callback_body: String,
}

impl PolicyRequest {
    /// Creates a policy request.
    ///
    /// `callback_url` must be an absolute URL with a host. `callback_body` is opaque and is
    /// echoed verbatim by the backend to `callback_url` after the upload, but it must not be
    /// empty.
    pub fn new(remote_path: &str, callback_url: &str, callback_body: &str) -> Result<Self> {
        if callback_url.is_empty() {
            return Err(Error::InvalidArgument("callback URL must not be empty".into()));
        }
        let callback_url = Url::parse(callback_url)
            .map_err(|err| Error::InvalidArgument(format!("invalid callback URL: {err}")))?;
        if !callback_url.has_host() {
            return Err(Error::InvalidArgument(
                "callback URL must include a host".into(),
            ));
        }

        if callback_body.is_empty() {
            return Err(Error::InvalidArgument(
                "callback body must not be empty".into(),
            ));
        }

        Ok(Self {
            remote_path: RemotePath::new(remote_path)?,
            callback_url,
            callback_body: callback_body.to_owned(),
        })
    }

    /// The key the client is allowed to upload to.
    pub fn remote_path(&self) -> &RemotePath {
        &self.remote_path
    }

    /// Where the backend notifies after a successful upload.
    pub fn callback_url(&self) -> &Url {
        &self.callback_url
    }

    /// The opaque payload sent to the callback URL.
    pub fn callback_body(&self) -> &str {
        &self.callback_body
    }
}
