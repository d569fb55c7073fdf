use std::collections::HashMap;

use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header;
use axum::{Form, Json};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde::de::value::{Error as ValueError, MapDeserializer};

use crate::error::ApiError;

/// Extracts `T` from a JSON, multipart, or URL-encoded form body.
///
/// JSON is chosen when the `Content-Type` is `application/json` (or a `+json` suffix), and
/// `multipart/form-data` bodies are read as text fields. Anything else is parsed as a URL-encoded
/// form. Rejections are reported as [`ApiError::Client`].
#[derive(Debug)]
pub struct FormOrJson<T>(pub T);

impl<S, T> FromRequest<S> for FormOrJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        match mime_type(&request).as_deref() {
            Some(mime) if is_json(mime) => {
                let Json(value) = Json::<T>::from_request(request, state)
                    .await
                    .map_err(|rejection| ApiError::Client(rejection.body_text()))?;
                Ok(Self(value))
            }
            Some("multipart/form-data") => {
                let multipart = Multipart::from_request(request, state)
                    .await
                    .map_err(|rejection| ApiError::Client(rejection.body_text()))?;
                from_multipart(multipart).await.map(Self)
            }
            _ => {
                let Form(value) = Form::<T>::from_request(request, state)
                    .await
                    .map_err(|rejection| ApiError::Client(rejection.body_text()))?;
                Ok(Self(value))
            }
        }
    }
}

/// The lowercased media type of the request body, without parameters.
fn mime_type(request: &Request) -> Option<String> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)?
        .to_str()
        .ok()?;
    let mime = content_type.split(';').next().unwrap_or_default();
    Some(mime.trim().to_ascii_lowercase())
}

fn is_json(mime: &str) -> bool {
    mime == "application/json" || (mime.starts_with("application/") && mime.ends_with("+json"))
}

/// Deserializes `T` from the text fields of a multipart body.
///
/// File parts are skipped. A field sent more than once keeps its last value.
async fn from_multipart<T: DeserializeOwned>(mut multipart: Multipart) -> Result<T, ApiError> {
    let mut fields = HashMap::new();
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError::Client(err.body_text()))?
    {
        let Some(name) = field.name().map(str::to_owned) else {
            continue;
        };
        if field.file_name().is_some() {
            tracing::debug!(%name, "ignoring file part in form body");
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|err| ApiError::Client(err.body_text()))?;
        fields.insert(name, value);
    }

    T::deserialize(MapDeserializer::<_, ValueError>::new(fields.into_iter()))
        .map_err(|err| ApiError::Client(format!("Failed to deserialize form body: {err}")))
}
