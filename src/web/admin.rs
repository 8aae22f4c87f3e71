//! Admin back-office handlers.
//!
//! All endpoints require the [`AdminUser`] extractor, returning 401/403 as needed.

use axum::extract::{Query, State};
use axum::response::Json;
use serde::{Deserialize, Serialize};
use tracing::{instrument, trace};
use ts_rs::TS;
use uuid::Uuid;

use crate::data::activity::{self, ActionType, ActivityLog, LogQuery};
use crate::data::users::{self, UserProfile};
use crate::data::staff;
use crate::state::AppState;
use crate::web::auth::AdminUser;
use crate::web::error::{ApiError, db_error};

#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ExcludedIdsResponse {
    pub admin_ids: Vec<Uuid>,
    pub staff_ids: Vec<Uuid>,
}

/// `GET /api/admin/get-excluded-ids`: internal users hidden from the leads list.
#[instrument(skip_all)]
pub async fn get_excluded_ids(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
) -> Result<Json<ExcludedIdsResponse>, ApiError> {
    let (admin_ids, staff_ids) = tokio::try_join!(
        users::admin_ids(&state.db_pool),
        staff::all_ids(&state.db_pool),
    )
    .map_err(|e| db_error("Excluded id lookup", e))?;

    trace!(
        admins = admin_ids.len(),
        staff = staff_ids.len(),
        "Fetched excluded ids"
    );
    Ok(Json(ExcludedIdsResponse {
        admin_ids,
        staff_ids,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct LogParams {
    page: Option<String>,
    sheet_id: Option<String>,
    staff_id: Option<String>,
    action_type: Option<String>,
    q: Option<String>,
}

fn blank_to_none(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn parse_uuid_param(name: &str, value: Option<String>) -> Result<Option<Uuid>, ApiError> {
    blank_to_none(value)
        .map(|v| {
            v.trim()
                .parse()
                .map_err(|_| ApiError::bad_request(format!("Invalid {name}: {v}")))
        })
        .transpose()
}

impl LogParams {
    fn into_query(self) -> Result<LogQuery, ApiError> {
        let page = match blank_to_none(self.page) {
            Some(p) => p
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|p| *p >= 1)
                .ok_or_else(|| ApiError::bad_request(format!("Invalid page: {p}")))?,
            None => 1,
        };
        let action_type = match blank_to_none(self.action_type).as_deref() {
            None | Some("all") => None,
            Some("add_comment") => Some(ActionType::AddComment),
            Some("update_field") => Some(ActionType::UpdateField),
            Some(other) => {
                return Err(ApiError::bad_request(format!(
                    "Invalid action_type: {other}"
                )));
            }
        };
        Ok(LogQuery {
            page,
            sheet_id: parse_uuid_param("sheet_id", self.sheet_id)?,
            staff_id: parse_uuid_param("staff_id", self.staff_id)?,
            action_type,
            search: blank_to_none(self.q),
        })
    }
}

#[derive(Debug, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LogsResponse {
    pub logs: Vec<ActivityLog>,
    pub page: u32,
    pub page_size: u32,
    /// A full page came back, so another may follow.
    pub has_more: bool,
}

/// `GET /api/admin/crm/logs`
#[instrument(skip_all)]
pub async fn list_activity_logs(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
    Query(params): Query<LogParams>,
) -> Result<Json<LogsResponse>, ApiError> {
    let query = params.into_query()?;
    let logs = activity::list(&state.db_pool, &query)
        .await
        .map_err(|e| db_error("Activity log query", e))?;

    let page_size = activity::LOGS_PAGE_SIZE as u32;
    Ok(Json(LogsResponse {
        has_more: logs.len() as u32 == page_size,
        logs,
        page: query.page,
        page_size,
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct LeadParams {
    q: Option<String>,
}

#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct LeadsResponse {
    pub leads: Vec<UserProfile>,
    pub total: usize,
}

/// `GET /api/admin/leads`
#[instrument(skip_all)]
pub async fn list_leads(
    AdminUser(_admin): AdminUser,
    State(state): State<AppState>,
    Query(params): Query<LeadParams>,
) -> Result<Json<LeadsResponse>, ApiError> {
    let leads = users::list_leads(&state.db_pool, params.q.as_deref())
        .await
        .map_err(|e| db_error("Leads query", e))?;
    Ok(Json(LeadsResponse {
        total: leads.len(),
        leads,
    }))
}
