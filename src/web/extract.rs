//! JSON request bodies decoded through [`crate::json::parse_json`].
//!
//! Unlike `axum::Json`, a malformed body is answered with the standard error
//! shape, and the offending path is carried in `details`.

use axum::body::Bytes;
use axum::extract::{FromRequest, Request};
use serde::de::DeserializeOwned;
use serde_json::json;
use tracing::debug;

use crate::json::parse_json;
use crate::web::error::ApiError;

pub struct JsonBody<T>(pub T);

impl<S, T> FromRequest<S> for JsonBody<T>
where
    S: Send + Sync,
    T: DeserializeOwned,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|e| ApiError::bad_request(e.body_text()))?;
        decode_body(&bytes).map(JsonBody)
    }
}

/// Decode a body already read as bytes, for handlers that must check
/// something else before looking at the payload.
pub fn decode_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|_| ApiError::bad_request("Request body must be UTF-8"))?;
    parse_json(text).map_err(|e| {
        debug!(path = %e.path, error = %e.summary, "Rejected request body");
        ApiError::bad_request("Invalid request body").with_details(json!({
            "path": e.path,
            "message": e.summary,
        }))
    })
}
