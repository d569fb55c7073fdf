use std::fmt;
use std::io;
use std::path::Path;

use futures_util::{StreamExt, TryStreamExt};
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Body, Method, RequestBuilder, Response, StatusCode};
use tokio_util::io::ReaderStream;
use url::Url;

use super::common::{StorageBackend, open_local_source, reqwest_client};
use crate::PayloadStream;
use crate::error::{Error, Result};
use crate::path::RemotePath;
use crate::policy::{Policy, PolicyIssuer};
use crate::request::PolicyRequest;

/// Header instructing the provider to copy an existing object server-side.
///
/// Google Cloud Storage accepts the same header in its XML API.
const COPY_SOURCE_HEADER: &str = "x-amz-copy-source";

/// An access token attached to provider requests as a bearer token.
pub trait Token: Send + Sync {
    /// The raw token value.
    fn as_str(&self) -> &str;
}

/// Source of access tokens for authenticated backends.
pub trait TokenProvider: Send + Sync + 'static {
    /// Returns a currently valid token.
    fn get_token(&self) -> impl Future<Output = anyhow::Result<impl Token>> + Send;
}

/// Placeholder provider for backends that send unauthenticated requests.
// this only exists because we have to provide *some* kind of provider
#[derive(Debug)]
pub struct NoToken;
impl TokenProvider for NoToken {
    #[allow(refining_impl_trait_internal)]
    async fn get_token(&self) -> anyhow::Result<NoToken> {
        anyhow::bail!("no token provider configured")
    }
}
impl Token for NoToken {
    fn as_str(&self) -> &str {
        ""
    }
}

/// A backend talking to an S3-compatible HTTP API at `{endpoint}/{bucket}/{key}`.
pub struct S3Compatible<T> {
    client: reqwest::Client,

    endpoint: Url,
    bucket: String,

    token_provider: Option<T>,
    issuer: PolicyIssuer,
}

impl<T> S3Compatible<T> {
    /// Creates a backend that authenticates every request with a bearer token from `token_provider`.
    pub fn new(
        endpoint: &str,
        bucket: &str,
        token_provider: T,
        issuer: PolicyIssuer,
    ) -> Result<Self> {
        Self::with_provider(endpoint, bucket, Some(token_provider), issuer)
    }

    fn with_provider(
        endpoint: &str,
        bucket: &str,
        token_provider: Option<T>,
        issuer: PolicyIssuer,
    ) -> Result<Self> {
        let endpoint = Url::parse(endpoint)
            .map_err(|err| Error::InvalidArgument(format!("invalid storage endpoint: {err}")))?;
        if endpoint.cannot_be_a_base() {
            return Err(Error::InvalidArgument(format!(
                "storage endpoint `{endpoint}` cannot be a base URL"
            )));
        }
        if bucket.is_empty() {
            return Err(Error::InvalidArgument("bucket name must not be empty".into()));
        }

        Ok(Self {
            client: reqwest_client(),
            endpoint,
            bucket: bucket.into(),
            token_provider,
            issuer,
        })
    }

    fn object_url(&self, path: &RemotePath) -> Url {
        let mut url = self.endpoint.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .push(&self.bucket)
                .extend(path.as_str().split('/'));
        }
        url
    }

    /// The percent-encoded `/{bucket}/{key}` form expected by the copy-source header.
    fn copy_source(&self, path: &RemotePath) -> String {
        let url = self.object_url(path);
        let prefix = self.endpoint.path().trim_end_matches('/');
        url.path()
            .strip_prefix(prefix)
            .unwrap_or(url.path())
            .to_owned()
    }
}

impl S3Compatible<NoToken> {
    /// Creates a backend sending unauthenticated requests, e.g. to a local emulator.
    pub fn without_token(endpoint: &str, bucket: &str, issuer: PolicyIssuer) -> Result<Self> {
        Self::with_provider(endpoint, bucket, None, issuer)
    }
}

impl<T: TokenProvider> S3Compatible<T> {
    async fn request(&self, method: Method, url: Url) -> Result<RequestBuilder> {
        let mut builder = self.client.request(method, url);
        if let Some(provider) = &self.token_provider {
            let token = provider
                .get_token()
                .await
                .map_err(|err| Error::unavailable("fetching access token", err))?;
            builder = builder.bearer_auth(token.as_str());
        }
        Ok(builder)
    }
}

impl<T> fmt::Debug for S3Compatible<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Compatible")
            .field("endpoint", &self.endpoint.as_str())
            .field("bucket", &self.bucket)
            .field("authenticated", &self.token_provider.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait::async_trait]
impl<T: TokenProvider> StorageBackend for S3Compatible<T> {
    fn name(&self) -> &'static str {
        "s3-compatible"
    }

    #[tracing::instrument(level = "trace", fields(%remote_path), skip_all)]
    async fn upload_local_file(
        &self,
        local_source: &Path,
        remote_path: &RemotePath,
    ) -> Result<()> {
        tracing::debug!("Writing to s3_compatible backend");
        let file = open_local_source(local_source).await?;
        let len = file
            .metadata()
            .await
            .map_err(|err| Error::unavailable("reading local file metadata", err))?
            .len();

        let response = self
            .request(Method::PUT, self.object_url(remote_path))
            .await?
            .header(CONTENT_LENGTH, len)
            .body(Body::wrap_stream(ReaderStream::new(file)))
            .send()
            .await?;

        check_status(response, "uploading object", remote_path).await
    }

    #[tracing::instrument(level = "trace", fields(%remote_path), skip_all)]
    async fn delete_single_file(&self, remote_path: &RemotePath) -> Result<()> {
        tracing::debug!("Deleting from s3_compatible backend");
        let response = self
            .request(Method::DELETE, self.object_url(remote_path))
            .await?
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!("Object not found, nothing to delete");
            return Ok(());
        }

        check_status(response, "deleting object", remote_path).await
    }

    #[tracing::instrument(level = "trace", fields(%src_path, %dst_path), skip_all)]
    async fn copy_file(&self, src_path: &RemotePath, dst_path: &RemotePath) -> Result<()> {
        tracing::debug!("Copying within s3_compatible backend");
        let response = self
            .request(Method::PUT, self.object_url(dst_path))
            .await?
            .header(COPY_SOURCE_HEADER, self.copy_source(src_path))
            .header(CONTENT_LENGTH, 0)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::NotFound(format!("object `{src_path}`")));
        }

        check_status(response, "copying object", dst_path).await
    }

    async fn get_upload_policy(&self, request: &PolicyRequest) -> Result<Policy> {
        let upload_url = self.object_url(request.remote_path()).to_string();
        self.issuer.issue(request, Some(upload_url))
    }

    #[tracing::instrument(level = "trace", fields(%remote_path), skip_all)]
    async fn read_file(&self, remote_path: &RemotePath) -> Result<Option<PayloadStream>> {
        tracing::debug!("Reading from s3_compatible backend");
        let response = self
            .request(Method::GET, self.object_url(remote_path))
            .await?
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            tracing::debug!("Object not found");
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(status_error(response, "reading object", remote_path).await);
        }

        let stream = response.bytes_stream().map_err(io::Error::other);
        Ok(Some(stream.boxed()))
    }
}

async fn check_status(response: Response, context: &str, path: &RemotePath) -> Result<()> {
    if response.status().is_success() {
        Ok(())
    } else {
        Err(status_error(response, context, path).await)
    }
}

async fn status_error(response: Response, context: &str, path: &RemotePath) -> Error {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    tracing::debug!(%status, body = %body, "storage provider rejected request");

    Error::BackendUnavailable {
        context: format!("{context} `{path}`: provider responded with {status}"),
        cause: None,
    }
}
