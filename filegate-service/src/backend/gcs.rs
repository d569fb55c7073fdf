use std::sync::Arc;

use super::common::BoxedBackend;
use super::s3_compatible::{S3Compatible, Token, TokenProvider};
use crate::error::{Error, Result};
use crate::policy::PolicyIssuer;

/// The public Google Cloud Storage XML API endpoint.
const GCS_ENDPOINT: &str = "https://storage.googleapis.com";

impl TokenProvider for Arc<dyn gcp_auth::TokenProvider> {
    async fn get_token(&self) -> anyhow::Result<impl Token> {
        let token = self
            .token(&["https://www.googleapis.com/auth/devstorage.read_write"])
            .await?;
        Ok(token)
    }
}

impl Token for Arc<gcp_auth::Token> {
    fn as_str(&self) -> &str {
        gcp_auth::Token::as_str(self)
    }
}

/// Creates a Google Cloud Storage backend for `bucket`.
///
/// With an explicit `endpoint`, this assumes an emulator and sends unauthenticated requests.
/// Otherwise, credentials are discovered through Application Default Credentials.
pub async fn gcs(
    endpoint: Option<&str>,
    bucket: &str,
    issuer: PolicyIssuer,
) -> Result<BoxedBackend> {
    if let Some(endpoint) = endpoint {
        return Ok(Box::new(S3Compatible::without_token(
            endpoint, bucket, issuer,
        )?));
    }

    let token_provider = gcp_auth::provider()
        .await
        .map_err(|err| Error::unavailable("discovering GCP credentials", err))?;
    Ok(Box::new(S3Compatible::new(
        GCS_ENDPOINT,
        bucket,
        token_provider,
        issuer,
    )?))
}
