//! Rate-limited routes backed by third-party APIs.

use axum::body::Bytes;
use axum::extract::State;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{error, info, instrument};
use ts_rs::TS;

use crate::integrations::gemini::ListingDetails;
use crate::integrations::sheets::{PropertyRow, SignupRow};
use crate::json::parse_json;
use crate::state::AppState;
use crate::web::error::ApiError;
use crate::web::extract::decode_body;

#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct DescriptionResponse {
    pub description: String,
}

/// `POST /api/generate-description`
///
/// Configuration is checked before the body is decoded.
#[instrument(skip_all)]
pub async fn generate_description(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<DescriptionResponse>, ApiError> {
    let gemini = state
        .gemini
        .as_ref()
        .ok_or_else(|| ApiError::not_configured("Gemini API key is not configured"))?;
    let listing: ListingDetails = decode_body(&body)?;

    let description = gemini.describe_listing(&listing).await.map_err(|e| {
        error!(error = %e, model = gemini.model(), "Error generating description");
        ApiError::internal_error("Failed to generate description")
    })?;
    info!(title = %listing.title, chars = description.len(), "Generated listing description");
    Ok(Json(DescriptionResponse { description }))
}

#[derive(Debug, Deserialize)]
pub struct LogRequest {
    #[serde(rename = "type")]
    kind: Option<String>,
    data: Option<Value>,
}

#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct SuccessResponse {
    pub success: bool,
}

/// `POST /api/log-to-sheets`
#[instrument(skip_all)]
pub async fn log_to_sheets(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<SuccessResponse>, ApiError> {
    let Some(sheets) = state.sheets.as_ref() else {
        error!(status = ?state.sheets_status, "Missing Google Sheets credentials");
        return Err(ApiError::not_configured("Google Sheets not configured")
            .with_details(json!(state.sheets_status)));
    };
    let body: LogRequest = decode_body(&body)?;

    let (Some(kind), Some(data)) = (body.kind.filter(|k| !k.is_empty()), body.data) else {
        return Err(ApiError::bad_request("Missing type or data in request body"));
    };
    // Re-serialize so row decoding reports its own path on failure.
    let data = data.to_string();

    let result = match kind.as_str() {
        "signup" => {
            let row: SignupRow = parse_json(&data)
                .map_err(|_| ApiError::bad_request("Missing required signup fields"))?;
            if row.missing_required() {
                return Err(ApiError::bad_request("Missing required signup fields"));
            }
            sheets.append_user_signup(&row).await
        }
        "property" => {
            let row: PropertyRow = parse_json(&data)
                .map_err(|_| ApiError::bad_request("Missing required property fields"))?;
            if row.missing_required() {
                return Err(ApiError::bad_request("Missing required property fields"));
            }
            sheets.append_property_listing(&row).await
        }
        _ => {
            return Err(ApiError::bad_request(
                "Invalid type. Must be 'signup' or 'property'",
            ));
        }
    };

    result.map_err(|e| {
        error!(error = %e, kind = %kind, "Error logging to Google Sheets");
        ApiError::internal_error("Failed to log to Google Sheets")
            .with_details(json!(e.to_string()))
    })?;
    Ok(Json(SuccessResponse { success: true }))
}
