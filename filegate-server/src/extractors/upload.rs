use std::path::Path;

use axum::extract::multipart::Field;
use axum::extract::{FromRequest, Multipart, Request};
use tempfile::NamedTempFile;
use tokio::io::AsyncWriteExt;

use crate::error::ApiError;
use crate::state::ServiceState;

/// Multipart field carrying the uploaded file.
const FILE_FIELD: &str = "file";
/// Multipart field carrying the destination key.
const REMOTE_PATH_FIELD: &str = "remoteFilePath";

/// A multipart upload whose file part has been spooled to a local temporary file.
///
/// The temporary file is deleted when this value is dropped, regardless of whether the upload to
/// the backend succeeded.
#[derive(Debug)]
pub struct SpooledUpload {
    /// The file name the client sent for the file part, if any.
    pub file_name: Option<String>,
    /// The destination key in the backend.
    pub remote_file_path: String,
    /// The spooled file contents.
    pub file: NamedTempFile,
}

impl FromRequest<ServiceState> for SpooledUpload {
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &ServiceState) -> Result<Self, Self::Rejection> {
        let mut multipart = Multipart::from_request(request, state)
            .await
            .map_err(|rejection| ApiError::Client(rejection.body_text()))?;

        let spool_dir = state.config.upload.spool_dir.as_deref();
        let mut file = None;
        let mut remote_file_path = None;

        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|err| ApiError::Client(err.body_text()))?
        {
            let name = field.name().unwrap_or_default().to_owned();
            match name.as_str() {
                FILE_FIELD => {
                    let file_name = field.file_name().map(str::to_owned);
                    file = Some((file_name, spool(field, spool_dir).await?));
                }
                REMOTE_PATH_FIELD => {
                    let text = field
                        .text()
                        .await
                        .map_err(|err| ApiError::Client(err.body_text()))?;
                    remote_file_path = Some(text);
                }
                _ => tracing::debug!(%name, "ignoring unknown multipart field"),
            }
        }

        let Some((file_name, file)) = file else {
            return Err(ApiError::Client(format!("missing field `{FILE_FIELD}`")));
        };
        let Some(remote_file_path) = remote_file_path else {
            return Err(ApiError::Client(format!(
                "missing field `{REMOTE_PATH_FIELD}`"
            )));
        };

        Ok(Self {
            file_name,
            remote_file_path,
            file,
        })
    }
}

/// Streams a multipart field into a new temporary file.
async fn spool(mut field: Field<'_>, spool_dir: Option<&Path>) -> Result<NamedTempFile, ApiError> {
    let mut builder = tempfile::Builder::new();
    builder.prefix("filegate-upload-");
    let temp = match spool_dir {
        Some(dir) => builder.tempfile_in(dir),
        None => builder.tempfile(),
    }
    .map_err(|err| ApiError::server("failed to create spool file", err))?;

    let handle = temp
        .reopen()
        .map_err(|err| ApiError::server("failed to open spool file", err))?;
    let mut writer = tokio::fs::File::from_std(handle);

    while let Some(chunk) = field
        .chunk()
        .await
        .map_err(|err| ApiError::Client(err.body_text()))?
    {
        writer
            .write_all(&chunk)
            .await
            .map_err(|err| ApiError::server("failed to write spool file", err))?;
    }
    writer
        .flush()
        .await
        .map_err(|err| ApiError::server("failed to write spool file", err))?;

    tracing::trace!(path = %temp.path().display(), "spooled upload");
    Ok(temp)
}
