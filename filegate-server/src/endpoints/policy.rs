use axum::extract::State;
use axum::{Router, routing};
use filegate_service::PolicyRequest;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::extractors::FormOrJson;
use crate::state::ServiceState;

pub fn router() -> Router<ServiceState> {
    Router::new().route("/upload_policy", routing::post(upload_policy))
}

#[derive(Debug, Deserialize)]
struct PolicyParams {
    #[serde(rename = "remoteFilePath")]
    remote_file_path: String,
    #[serde(rename = "callbackURL")]
    callback_url: String,
    #[serde(rename = "callbackBody")]
    callback_body: String,
}

/// Issues a signed upload policy and returns it as plain text.
async fn upload_policy(
    State(state): State<ServiceState>,
    FormOrJson(params): FormOrJson<PolicyParams>,
) -> ApiResult<String> {
    let request = PolicyRequest::new(
        &params.remote_file_path,
        &params.callback_url,
        &params.callback_body,
    )?;
    let policy = state.service.get_upload_policy(&request).await?;

    Ok(policy.into_string())
}
