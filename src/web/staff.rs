//! Admin-only staff account management.
//!
//! Staff members are auth accounts with a `crm_staff` row. Creating one makes
//! both; removing one drops only the row and its sheet grants.

use axum::extract::State;
use axum::response::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, instrument, warn};
use ts_rs::TS;
use uuid::Uuid;

use crate::data::staff::{self, StaffMember};
use crate::data::users;
use crate::state::AppState;
use crate::supabase::auth::{NewUser, UserChanges};
use crate::supabase::{AuthApiError, AuthUser};
use crate::web::auth::AdminUser;
use crate::web::error::{ApiError, db_error};
use crate::web::extract::JsonBody;

fn require_service_key(state: &AppState) -> Result<(), ApiError> {
    if state.auth.has_service_key() {
        Ok(())
    } else {
        Err(ApiError::not_configured("Service role key not configured"))
    }
}

/// Auth service rejections are reported to the caller verbatim.
fn auth_admin_error(context: &str, e: AuthApiError) -> ApiError {
    match e {
        AuthApiError::NotConfigured => ApiError::not_configured("Service role key not configured"),
        AuthApiError::Api { message, status } => {
            warn!(status, message = %message, context, "Auth service rejected request");
            ApiError::bad_request(message)
        }
        e => {
            error!(error = %e, context, "Auth service request failed");
            ApiError::upstream("Authentication service unavailable")
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

fn parse_staff_id(value: Option<String>) -> Result<Uuid, ApiError> {
    let raw = non_blank(value).ok_or_else(|| ApiError::bad_request("Staff ID is required"))?;
    raw.parse()
        .map_err(|_| ApiError::bad_request(format!("Invalid staff ID: {raw}")))
}

#[derive(Debug, Deserialize)]
pub struct CreateStaffRequest {
    email: Option<String>,
    password: Option<String>,
    name: Option<String>,
}

#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct CreateStaffResponse {
    pub success: bool,
    pub staff: StaffMember,
}

/// `POST /api/create-staff`
#[instrument(skip_all, fields(admin_id = %admin.id))]
pub async fn create_staff(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    JsonBody(body): JsonBody<CreateStaffRequest>,
) -> Result<Json<CreateStaffResponse>, ApiError> {
    let (Some(email), Some(password), Some(name)) = (
        non_blank(body.email),
        body.password.filter(|p| !p.is_empty()),
        non_blank(body.name),
    ) else {
        return Err(ApiError::bad_request("Email, password, and name are required"));
    };
    require_service_key(&state)?;

    let user = state
        .auth
        .create_user(&NewUser {
            email: &email,
            password: &password,
            email_confirm: true,
            user_metadata: Some(json!({ "name": name })),
        })
        .await
        .map_err(|e| auth_admin_error("create staff account", e))?;

    let staff = match staff::insert(&state.db_pool, user.id, &email, &name, Some(admin.id)).await {
        Ok(staff) => staff,
        Err(e) => {
            error!(error = ?e, user_id = %user.id, "Error creating staff record");
            // Don't leave an orphaned account behind.
            if let Err(cleanup) = state.auth.delete_user(user.id).await {
                error!(error = %cleanup, user_id = %user.id, "Failed to remove auth user after staff insert failed");
            }
            return Err(ApiError::bad_request("Failed to create staff record"));
        }
    };

    info!(staff_id = %staff.id, "Created staff member");
    Ok(Json(CreateStaffResponse {
        success: true,
        staff,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStaffRequest {
    staff_id: Option<String>,
    email: Option<String>,
    name: Option<String>,
    password: Option<String>,
}

#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct MessageResponse {
    pub success: bool,
    pub message: String,
}

impl MessageResponse {
    fn ok(message: &str) -> Json<Self> {
        Json(Self {
            success: true,
            message: message.to_owned(),
        })
    }
}

/// `POST /api/update-staff`
#[instrument(skip_all, fields(admin_id = %admin.id))]
pub async fn update_staff(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    JsonBody(body): JsonBody<UpdateStaffRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let staff_id = parse_staff_id(body.staff_id)?;
    require_service_key(&state)?;

    let email = non_blank(body.email);
    let name = non_blank(body.name);
    let changes = UserChanges {
        email: email.clone(),
        password: non_blank(body.password),
        user_metadata: name.as_ref().map(|n| json!({ "name": n })),
    };

    if !changes.is_empty() {
        state
            .auth
            .update_user(staff_id, &changes)
            .await
            .map_err(|e| auth_admin_error("update staff account", e))?;
    }

    if name.is_some() || email.is_some() {
        let updated = staff::update(&state.db_pool, staff_id, name.as_deref(), email.as_deref())
            .await
            .map_err(|e| db_error("Staff update", e))?;
        if !updated {
            warn!(staff_id = %staff_id, "Auth account updated but no staff row exists");
        }
    }

    info!(staff_id = %staff_id, "Updated staff member");
    Ok(MessageResponse::ok("Staff updated successfully"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteStaffRequest {
    staff_id: Option<String>,
}

/// `POST /api/delete-staff`
#[instrument(skip_all, fields(admin_id = %admin.id))]
pub async fn delete_staff(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    JsonBody(body): JsonBody<DeleteStaffRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let staff_id = parse_staff_id(body.staff_id)?;

    let removed = staff::delete(&state.db_pool, staff_id)
        .await
        .map_err(|e| db_error("Staff removal", e))?;
    info!(staff_id = %staff_id, removed, "Removed staff role");

    Ok(MessageResponse::ok(
        "Staff role removed successfully. User account remains active.",
    ))
}

#[derive(Debug, Deserialize)]
pub struct LookupUserRequest {
    email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LookupUserResponse {
    pub exists: bool,
    pub name: Option<String>,
    pub is_staff: bool,
    pub is_admin: bool,
}

impl LookupUserResponse {
    fn missing() -> Self {
        Self {
            exists: false,
            name: None,
            is_staff: false,
            is_admin: false,
        }
    }
}

/// Profile name, then admin name, then metadata `name`, then `full_name`.
pub fn resolve_display_name(
    profile_name: Option<&str>,
    admin_name: Option<&str>,
    user: &AuthUser,
) -> String {
    [profile_name, admin_name]
        .into_iter()
        .flatten()
        .find(|n| !n.is_empty())
        .or_else(|| user.metadata_str("name"))
        .or_else(|| user.metadata_str("full_name"))
        .unwrap_or_default()
        .to_owned()
}

/// `POST /api/lookup-user`
#[instrument(skip_all, fields(admin_id = %admin.id))]
pub async fn lookup_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    JsonBody(body): JsonBody<LookupUserRequest>,
) -> Result<Json<LookupUserResponse>, ApiError> {
    let email = non_blank(body.email).ok_or_else(|| ApiError::bad_request("Email is required"))?;
    require_service_key(&state)?;

    let Some(user) = state
        .auth
        .find_user_by_email(&email)
        .await
        .map_err(|e| auth_admin_error("look up user", e))?
    else {
        return Ok(Json(LookupUserResponse::missing()));
    };

    let pool = &state.db_pool;
    let (is_staff, admin_name, profile_name) = tokio::try_join!(
        staff::exists(pool, user.id),
        users::admin_name(pool, user.id),
        users::profile_name(pool, user.id),
    )
    .map_err(|e| db_error("User lookup", e))?;

    let name = resolve_display_name(
        profile_name.as_deref(),
        admin_name.as_ref().and_then(|n| n.as_deref()),
        &user,
    );
    Ok(Json(LookupUserResponse {
        exists: true,
        name: Some(name),
        is_staff,
        is_admin: admin_name.is_some(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(metadata: serde_json::Value) -> AuthUser {
        AuthUser {
            id: Uuid::new_v4(),
            email: Some("asha@example.com".into()),
            user_metadata: metadata,
        }
    }

    #[test]
    fn display_name_prefers_profile() {
        let u = user(json!({"name": "Meta Name"}));
        assert_eq!(
            resolve_display_name(Some("Profile"), Some("Admin"), &u),
            "Profile"
        );
        assert_eq!(resolve_display_name(Some(""), Some("Admin"), &u), "Admin");
        assert_eq!(resolve_display_name(None, None, &u), "Meta Name");
    }

    #[test]
    fn display_name_falls_back_to_full_name_then_empty() {
        let u = user(json!({"full_name": "Asha Rao"}));
        assert_eq!(resolve_display_name(None, None, &u), "Asha Rao");
        assert_eq!(resolve_display_name(None, None, &user(json!({}))), "");
    }

    #[test]
    fn staff_id_is_required_and_validated() {
        assert_eq!(
            parse_staff_id(None).unwrap_err().message,
            "Staff ID is required"
        );
        assert!(parse_staff_id(Some("  ".into())).is_err());
        assert!(parse_staff_id(Some("not-a-uuid".into())).is_err());
        let id = Uuid::new_v4();
        assert_eq!(parse_staff_id(Some(id.to_string())).unwrap(), id);
    }

    #[test]
    fn missing_user_shape() {
        assert_eq!(
            serde_json::to_value(LookupUserResponse::missing()).unwrap(),
            json!({"exists": false, "name": null, "isStaff": false, "isAdmin": false})
        );
    }
}
