//! CRM activity log: one entry per saved field edit.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgConnection, PgPool};
use ts_rs::TS;
use uuid::Uuid;

use super::contains_pattern;
use crate::crm::ClientField;

pub const LOGS_PAGE_SIZE: i64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ActionType {
    AddComment,
    UpdateField,
}

impl ActionType {
    pub fn for_field(field: ClientField) -> Self {
        if field == ClientField::CallingComment {
            ActionType::AddComment
        } else {
            ActionType::UpdateField
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ActionType::AddComment => "add_comment",
            ActionType::UpdateField => "update_field",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow, TS)]
#[ts(export)]
pub struct ActivityLog {
    pub id: Uuid,
    pub staff_id: Uuid,
    pub staff_name: String,
    pub client_id: Uuid,
    pub client_name: String,
    pub sheet_id: Option<Uuid>,
    pub sheet_name: Option<String>,
    pub action_type: String,
    pub field_changed: Option<String>,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// A field edit to be recorded.
#[derive(Debug, Clone)]
pub struct NewActivity<'a> {
    pub staff_id: Uuid,
    pub staff_name: &'a str,
    pub client_id: Uuid,
    pub client_name: &'a str,
    pub sheet_id: Option<Uuid>,
    pub field: ClientField,
    pub old_value: Option<&'a str>,
    pub new_value: Option<&'a str>,
}

/// Insert a log entry. Takes a connection so it can join the caller's transaction.
pub async fn insert(conn: &mut PgConnection, entry: &NewActivity<'_>) -> Result<()> {
    sqlx::query(
        "INSERT INTO crm_activity_logs \
            (staff_id, staff_name, client_id, client_name, sheet_id, sheet_name, \
             action_type, field_changed, old_value, new_value) \
         VALUES ($1, $2, $3, $4, $5, \
                 (SELECT name FROM crm_sheets WHERE id = $5), \
                 $6, $7, $8, $9)",
    )
    .bind(entry.staff_id)
    .bind(entry.staff_name)
    .bind(entry.client_id)
    .bind(entry.client_name)
    .bind(entry.sheet_id)
    .bind(ActionType::for_field(entry.field).as_str())
    .bind(entry.field.column())
    .bind(entry.old_value)
    .bind(entry.new_value)
    .execute(conn)
    .await?;
    Ok(())
}

/// Filters for the admin log view. All optional; `page` is 1-based.
#[derive(Debug, Clone, Default)]
pub struct LogQuery {
    pub page: u32,
    pub sheet_id: Option<Uuid>,
    pub staff_id: Option<Uuid>,
    pub action_type: Option<ActionType>,
    pub search: Option<String>,
}

impl LogQuery {
    fn offset(&self) -> i64 {
        i64::from(self.page.max(1) - 1) * LOGS_PAGE_SIZE
    }
}

/// One page of log entries, newest first.
///
/// `search` matches staff, client, sheet, field or new value case-insensitively.
pub async fn list(pool: &PgPool, query: &LogQuery) -> Result<Vec<ActivityLog>> {
    let pattern = query
        .search
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(contains_pattern);

    let logs = sqlx::query_as::<_, ActivityLog>(
        "SELECT id, staff_id, staff_name, client_id, client_name, sheet_id, sheet_name, \
                action_type, field_changed, old_value, new_value, created_at \
         FROM crm_activity_logs \
         WHERE ($1::uuid IS NULL OR sheet_id = $1) \
           AND ($2::uuid IS NULL OR staff_id = $2) \
           AND ($3::text IS NULL OR action_type = $3) \
           AND ($4::text IS NULL \
                OR staff_name ILIKE $4 OR client_name ILIKE $4 OR sheet_name ILIKE $4 \
                OR field_changed ILIKE $4 OR new_value ILIKE $4) \
         ORDER BY created_at DESC \
         LIMIT $5 OFFSET $6",
    )
    .bind(query.sheet_id)
    .bind(query.staff_id)
    .bind(query.action_type.map(ActionType::as_str))
    .bind(pattern)
    .bind(LOGS_PAGE_SIZE)
    .bind(query.offset())
    .fetch_all(pool)
    .await?;
    Ok(logs)
}
