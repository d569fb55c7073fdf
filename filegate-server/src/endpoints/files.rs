use axum::extract::State;
use axum::{Json, Router, routing};
use filegate_service::{CopyRequest, DeleteRequest, UploadRequest};
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::extractors::{FormOrJson, SpooledUpload};
use crate::state::ServiceState;

/// Status code reported by successful delete and copy operations.
pub const STATUS_OK: u32 = 10000;

const SUCCESS: &str = "success";

pub fn router() -> Router<ServiceState> {
    Router::new()
        .route("/upload", routing::post(upload))
        .route("/delete", routing::post(delete))
        .route("/copy", routing::post(copy))
}

/// Response body of the file operations.
#[derive(Debug, Serialize, Deserialize)]
pub struct StatusResponse<T> {
    /// The uploaded file name, or [`STATUS_OK`].
    pub status: T,
    /// Always `"success"`.
    pub message: String,
}

impl<T> StatusResponse<T> {
    fn success(status: T) -> Json<Self> {
        Json(Self {
            status,
            message: SUCCESS.to_owned(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct DeleteParams {
    #[serde(rename = "remoteFilePath")]
    remote_file_path: String,
}

#[derive(Debug, Deserialize)]
struct CopyParams {
    #[serde(rename = "srcFilePath")]
    src_file_path: String,
    #[serde(rename = "dstFilePath")]
    dst_file_path: String,
}

async fn upload(
    State(state): State<ServiceState>,
    upload: SpooledUpload,
) -> ApiResult<Json<StatusResponse<String>>> {
    let request = UploadRequest::new(upload.file.path(), &upload.remote_file_path)?;
    state.service.upload_local_file(&request).await?;

    let file_name = upload
        .file_name
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| request.remote_path().file_name().to_owned());

    Ok(StatusResponse::success(file_name))
}

async fn delete(
    State(state): State<ServiceState>,
    FormOrJson(params): FormOrJson<DeleteParams>,
) -> ApiResult<Json<StatusResponse<u32>>> {
    let request = DeleteRequest::new(&params.remote_file_path)?;
    state.service.delete_single_file(&request).await?;

    Ok(StatusResponse::success(STATUS_OK))
}

async fn copy(
    State(state): State<ServiceState>,
    FormOrJson(params): FormOrJson<CopyParams>,
) -> ApiResult<Json<StatusResponse<u32>>> {
    let request = CopyRequest::new(&params.src_file_path, &params.dst_file_path)?;
    state.service.copy_file(&request).await?;

    Ok(StatusResponse::success(STATUS_OK))
}
