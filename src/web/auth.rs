//! Bearer-token principals.
//!
//! Every principal starts from a session token validated against the hosted
//! auth service. [`AdminUser`] additionally requires a row in `admins`;
//! [`StaffUser`] requires an active `crm_staff` row and carries the sheets
//! that staff member may open.
//!
//! Browsers cannot set headers on WebSocket upgrades, so an `access_token`
//! query parameter is accepted when no `Authorization` header is present.

use axum::extract::FromRequestParts;
use http::request::Parts;
use tracing::{error, warn};
use uuid::Uuid;

use crate::data::{staff, users};
use crate::data::staff::StaffMember;
use crate::state::AppState;
use crate::supabase::{AuthApiError, AuthUser};
use crate::web::error::{ApiError, db_error};
use crate::web::middleware::client_ip::header_str;

const ADMIN_REQUIRED: &str = "Unauthorized: Admin access required";
const STAFF_REQUIRED: &str = "Unauthorized: Staff access required";

/// Any signed-in user.
#[derive(Debug, Clone)]
pub struct CustomerUser(pub AuthUser);

/// A signed-in admin.
#[derive(Debug, Clone)]
pub struct AdminUser(pub AuthUser);

/// A signed-in, active CRM staff member.
#[derive(Debug, Clone)]
pub struct StaffUser {
    pub user: AuthUser,
    pub staff: StaffMember,
    pub sheet_ids: Vec<Uuid>,
}

impl StaffUser {
    pub fn can_access(&self, sheet_id: Uuid) -> bool {
        self.sheet_ids.contains(&sheet_id)
    }
}

/// Token from `Authorization`, with or without the `Bearer ` prefix.
pub fn bearer_token(parts: &Parts) -> Option<String> {
    if let Some(value) = header_str(&parts.headers, "authorization") {
        let token = value.strip_prefix("Bearer ").unwrap_or(value).trim();
        return Some(token.to_owned()).filter(|t| !t.is_empty());
    }
    let query = parts.uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == "access_token")
        .map(|(_, value)| value.into_owned())
        .filter(|t| !t.is_empty())
}

async fn authenticate(parts: &Parts, state: &AppState) -> Result<AuthUser, ApiError> {
    let token = bearer_token(parts)
        .ok_or_else(|| ApiError::unauthorized("Missing authorization header"))?;
    state.auth.get_user(&token).await.map_err(|e| match e {
        AuthApiError::InvalidToken | AuthApiError::Api { .. } => {
            ApiError::unauthorized("Invalid token")
        }
        AuthApiError::NotConfigured => ApiError::not_configured("Service role key not configured"),
        e => {
            error!(error = %e, "Token validation failed");
            ApiError::upstream("Authentication service unavailable")
        }
    })
}

impl FromRequestParts<AppState> for CustomerUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        authenticate(parts, state).await.map(CustomerUser)
    }
}

impl FromRequestParts<AppState> for AdminUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = authenticate(parts, state).await?;
        let is_admin = users::is_admin(&state.db_pool, user.id)
            .await
            .map_err(|e| db_error("Admin check", e))?;
        if !is_admin {
            warn!(user_id = %user.id, "Non-admin attempted admin route");
            return Err(ApiError::forbidden(ADMIN_REQUIRED));
        }
        Ok(AdminUser(user))
    }
}

impl FromRequestParts<AppState> for StaffUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let user = authenticate(parts, state).await?;
        let staff = staff::get_active(&state.db_pool, user.id)
            .await
            .map_err(|e| db_error("Staff check", e))?
            .ok_or_else(|| ApiError::forbidden(STAFF_REQUIRED))?;
        let sheet_ids = staff::accessible_sheet_ids(&state.db_pool, staff.id)
            .await
            .map_err(|e| db_error("Sheet access lookup", e))?;
        Ok(StaffUser {
            user,
            staff,
            sheet_ids,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts(req: Request<()>) -> Parts {
        req.into_parts().0
    }

    #[test]
    fn bearer_prefix_is_optional() {
        let with_prefix = parts(
            Request::builder()
                .header("authorization", "Bearer abc.def")
                .body(())
                .unwrap(),
        );
        assert_eq!(bearer_token(&with_prefix).as_deref(), Some("abc.def"));

        let bare = parts(
            Request::builder()
                .header("authorization", "abc.def")
                .body(())
                .unwrap(),
        );
        assert_eq!(bearer_token(&bare).as_deref(), Some("abc.def"));
    }

    #[test]
    fn empty_header_is_missing() {
        let req = parts(
            Request::builder()
                .header("authorization", "Bearer ")
                .body(())
                .unwrap(),
        );
        assert_eq!(bearer_token(&req), None);
    }

    #[test]
    fn query_token_for_upgrades() {
        let req = parts(
            Request::builder()
                .uri("/api/crm/sheets/x/live?access_token=tok%2B1")
                .body(())
                .unwrap(),
        );
        assert_eq!(bearer_token(&req).as_deref(), Some("tok+1"));
        let none = parts(Request::builder().uri("/api/crm/sheets").body(()).unwrap());
        assert_eq!(bearer_token(&none), None);
    }
}
