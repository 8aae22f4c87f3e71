//! CRM staff accounts and their sheet access.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use ts_rs::TS;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow, TS)]
#[ts(export)]
pub struct StaffMember {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow, TS)]
#[ts(export)]
pub struct CrmSheet {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
}

const STAFF_COLUMNS: &str = "id, email, name, is_active, created_at";

/// Staff record for a user, only if it is active.
pub async fn get_active(pool: &PgPool, id: Uuid) -> Result<Option<StaffMember>> {
    let staff = sqlx::query_as::<_, StaffMember>(&format!(
        "SELECT {STAFF_COLUMNS} FROM crm_staff WHERE id = $1 AND is_active"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(staff)
}

pub async fn exists(pool: &PgPool, id: Uuid) -> Result<bool> {
    let found = sqlx::query_scalar::<_, bool>("SELECT EXISTS(SELECT 1 FROM crm_staff WHERE id = $1)")
        .bind(id)
        .fetch_one(pool)
        .await?;
    Ok(found)
}

pub async fn all_ids(pool: &PgPool) -> Result<Vec<Uuid>> {
    let ids = sqlx::query_scalar::<_, Uuid>("SELECT id FROM crm_staff ORDER BY created_at")
        .fetch_all(pool)
        .await?;
    Ok(ids)
}

/// Sheet ids a staff member was granted.
pub async fn accessible_sheet_ids(pool: &PgPool, staff_id: Uuid) -> Result<Vec<Uuid>> {
    let ids = sqlx::query_scalar::<_, Uuid>(
        "SELECT sheet_id FROM crm_sheet_access WHERE staff_id = $1",
    )
    .bind(staff_id)
    .fetch_all(pool)
    .await?;
    Ok(ids)
}

/// Sheets a staff member can open, newest first.
pub async fn accessible_sheets(pool: &PgPool, staff_id: Uuid) -> Result<Vec<CrmSheet>> {
    let sheets = sqlx::query_as::<_, CrmSheet>(
        "SELECT s.id, s.name, s.description, s.created_at \
         FROM crm_sheets s \
         JOIN crm_sheet_access a ON a.sheet_id = s.id \
         WHERE a.staff_id = $1 \
         ORDER BY s.created_at DESC",
    )
    .bind(staff_id)
    .fetch_all(pool)
    .await?;
    Ok(sheets)
}

pub async fn insert(
    pool: &PgPool,
    id: Uuid,
    email: &str,
    name: &str,
    created_by: Option<Uuid>,
) -> Result<StaffMember> {
    let staff = sqlx::query_as::<_, StaffMember>(&format!(
        "INSERT INTO crm_staff (id, email, name, created_by) \
         VALUES ($1, $2, $3, $4) \
         RETURNING {STAFF_COLUMNS}"
    ))
    .bind(id)
    .bind(email)
    .bind(name)
    .bind(created_by)
    .fetch_one(pool)
    .await?;
    Ok(staff)
}

/// Update name and/or email; `None` leaves a column as is.
pub async fn update(
    pool: &PgPool,
    id: Uuid,
    name: Option<&str>,
    email: Option<&str>,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE crm_staff \
         SET name = COALESCE($2, name), email = COALESCE($3, email) \
         WHERE id = $1",
    )
    .bind(id)
    .bind(name)
    .bind(email)
    .execute(pool)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Remove the staff role and every sheet grant. The auth account is untouched.
pub async fn delete(pool: &PgPool, id: Uuid) -> Result<bool> {
    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM crm_sheet_access WHERE staff_id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    let result = sqlx::query("DELETE FROM crm_staff WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;
    Ok(result.rows_affected() > 0)
}
