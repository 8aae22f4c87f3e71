//! Admins and registered customer profiles.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use ts_rs::TS;
use uuid::Uuid;

use super::contains_pattern;

/// A registered customer, as listed on the admin leads page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow, TS)]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub name: Option<String>,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// `Some(name)` when the user is an admin; the inner name may be unset.
pub async fn admin_name(pool: &PgPool, id: Uuid) -> Result<Option<Option<String>>> {
    let row = sqlx::query_scalar::<_, Option<String>>("SELECT name FROM admins WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(row)
}

pub async fn is_admin(pool: &PgPool, id: Uuid) -> Result<bool> {
    Ok(admin_name(pool, id).await?.is_some())
}

pub async fn admin_ids(pool: &PgPool) -> Result<Vec<Uuid>> {
    let ids = sqlx::query_scalar::<_, Uuid>("SELECT id FROM admins ORDER BY created_at")
        .fetch_all(pool)
        .await?;
    Ok(ids)
}

pub async fn profile_name(pool: &PgPool, id: Uuid) -> Result<Option<String>> {
    let name = sqlx::query_scalar::<_, Option<String>>("SELECT name FROM user_profiles WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await?;
    Ok(name.flatten())
}

/// Customer profiles, newest first, excluding admins and staff.
///
/// `search` matches name or email case-insensitively, or a phone substring.
pub async fn list_leads(pool: &PgPool, search: Option<&str>) -> Result<Vec<UserProfile>> {
    let pattern = search
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(contains_pattern);
    let leads = sqlx::query_as::<_, UserProfile>(
        "SELECT p.id, p.name, p.email, p.phone, p.created_at \
         FROM user_profiles p \
         WHERE NOT EXISTS (SELECT 1 FROM admins a WHERE a.id = p.id) \
           AND NOT EXISTS (SELECT 1 FROM crm_staff s WHERE s.id = p.id) \
           AND ($1::text IS NULL \
                OR p.name ILIKE $1 OR p.email ILIKE $1 OR p.phone LIKE $1) \
         ORDER BY p.created_at DESC",
    )
    .bind(pattern)
    .fetch_all(pool)
    .await?;
    Ok(leads)
}
