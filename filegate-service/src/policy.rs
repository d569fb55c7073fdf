//! Signed upload policies for direct client uploads.
//!
//! A [`Policy`] authorizes a client to upload one object directly to the storage backend, bypassing
//! the gateway. The backend validates it on upload and then notifies the callback URL embedded in
//! the policy.
//!
//! # Format
//!
//! The policy document is serialized as JSON with a fixed field order and signed with
//! HMAC-SHA256. The transport form is the standard base64 encoding of the envelope:
//!
//! ```json
//! {"document": "<base64 document JSON>", "signature": "<base64 HMAC-SHA256>"}
//! ```
//!
//! Signing covers the exact document bytes carried in the envelope, so verification never depends
//! on re-serializing the document.

use std::fmt;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use base64::{Engine, engine::general_purpose::STANDARD as BASE64_STANDARD};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretSlice};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use thiserror::Error;

use crate::error::{Error, Result};
use crate::request::PolicyRequest;

type HmacSha256 = Hmac<Sha256>;

/// Default lifetime of an issued policy.
pub const DEFAULT_POLICY_TTL: Duration = Duration::from_secs(5 * 60);

/// Upper bound for the policy lifetime, limiting the damage of a leaked policy.
pub const MAX_POLICY_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// An opaque, signed, time-bounded upload authorization.
///
/// Callers pass this through unchanged to the client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Policy(String);

impl Policy {
    /// Returns the encoded policy.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the policy and returns the encoded string.
    pub fn into_string(self) -> String {
        self.0
    }
}

impl From<String> for Policy {
    fn from(encoded: String) -> Self {
        Self(encoded)
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// The callback instruction embedded in a policy.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyCallback {
    /// The URL the backend notifies after a successful upload.
    pub url: String,
    /// The opaque body sent to [`url`](Self::url), verbatim.
    pub body: String,
}

/// The signed content of a [`Policy`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDocument {
    /// The only key the client may upload to.
    pub path: String,
    /// Expiration as seconds since the UNIX epoch.
    pub expires_at: u64,
    /// What the backend does after the upload completes.
    pub callback: PolicyCallback,
    /// Where the client sends the upload, if the backend has a direct-upload endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upload_url: Option<String>,
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    document: String,
    signature: String,
}

/// Reasons a policy fails verification.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PolicyError {
    /// The policy is not a well-formed envelope.
    #[error("malformed policy: {0}")]
    Malformed(String),
    /// The signature does not match the document.
    #[error("policy signature mismatch")]
    SignatureMismatch,
    /// The policy is past its expiration.
    #[error("policy expired at {0}")]
    Expired(u64),
}

/// Issues and verifies upload policies with a secret held by the storage backend.
///
/// The secret is never logged and never leaves the issuer; the `Debug` output is redacted.
pub struct PolicyIssuer {
    secret: SecretSlice<u8>,
    ttl: Duration,
}

impl PolicyIssuer {
    /// Creates an issuer signing with `secret` and issuing policies valid for `ttl`.
    ///
    /// Fails with [`Error::InvalidArgument`] if the secret is empty or the TTL is zero or larger
    /// than [`MAX_POLICY_TTL`].
    pub fn new(secret: &[u8], ttl: Duration) -> Result<Self> {
        if secret.is_empty() {
            return Err(Error::InvalidArgument(
                "upload policy secret must not be empty".into(),
            ));
        }
        if ttl.is_zero() || ttl > MAX_POLICY_TTL {
            return Err(Error::InvalidArgument(format!(
                "upload policy TTL must be between 1s and {}s",
                MAX_POLICY_TTL.as_secs()
            )));
        }

        Ok(Self {
            secret: secret.to_vec().into(),
            ttl,
        })
    }

    /// The lifetime of issued policies.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Issues a policy for the given request, expiring [`ttl`](Self::ttl) from now.
    pub fn issue(&self, request: &PolicyRequest, upload_url: Option<String>) -> Result<Policy> {
        self.issue_at(request, upload_url, SystemTime::now())
    }

    fn issue_at(
        &self,
        request: &PolicyRequest,
        upload_url: Option<String>,
        now: SystemTime,
    ) -> Result<Policy> {
        let expires_at = unix_seconds(now + self.ttl)?;
        let document = PolicyDocument {
            path: request.remote_path().to_string(),
            expires_at,
            callback: PolicyCallback {
                url: request.callback_url().to_string(),
                body: request.callback_body().to_owned(),
            },
            upload_url,
        };

        let document = serde_json::to_vec(&document)
            .map_err(|err| Error::unavailable("serializing policy document", err))?;
        let signature = self.mac(&document).finalize().into_bytes();

        let envelope = Envelope {
            document: BASE64_STANDARD.encode(&document),
            signature: BASE64_STANDARD.encode(signature),
        };
        let envelope = serde_json::to_vec(&envelope)
            .map_err(|err| Error::unavailable("serializing policy envelope", err))?;

        Ok(Policy(BASE64_STANDARD.encode(envelope)))
    }

    /// Decodes a policy, checks its signature and expiration, and returns the signed document.
    pub fn verify(&self, policy: &Policy) -> Result<PolicyDocument, PolicyError> {
        self.verify_at(policy, SystemTime::now())
    }

    fn verify_at(&self, policy: &Policy, now: SystemTime) -> Result<PolicyDocument, PolicyError> {
        let envelope = BASE64_STANDARD
            .decode(policy.as_str())
            .map_err(|err| PolicyError::Malformed(err.to_string()))?;
        let envelope: Envelope = serde_json::from_slice(&envelope)
            .map_err(|err| PolicyError::Malformed(err.to_string()))?;

        let document = BASE64_STANDARD
            .decode(&envelope.document)
            .map_err(|err| PolicyError::Malformed(err.to_string()))?;
        let signature = BASE64_STANDARD
            .decode(&envelope.signature)
            .map_err(|err| PolicyError::Malformed(err.to_string()))?;

        self.mac(&document)
            .verify_slice(&signature)
            .map_err(|_| PolicyError::SignatureMismatch)?;

        let document: PolicyDocument = serde_json::from_slice(&document)
            .map_err(|err| PolicyError::Malformed(err.to_string()))?;

        let now = now
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        if document.expires_at <= now {
            return Err(PolicyError::Expired(document.expires_at));
        }

        Ok(document)
    }

    fn mac(&self, document: &[u8]) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret())
            .expect("HMAC can take key of any size");
        mac.update(document);
        mac
    }
}

impl fmt::Debug for PolicyIssuer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyIssuer")
            .field("secret", &"[redacted]")
            .field("ttl", &self.ttl)
            .finish()
    }
}

fn unix_seconds(time: SystemTime) -> Result<u64> {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|err| Error::unavailable("system clock is before the UNIX epoch", err))
}
