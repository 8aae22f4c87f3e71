//! `crm_clients` queries and the Postgres-backed [`CrmBackend`].

use anyhow::{Result, bail};
use async_trait::async_trait;
use sqlx::PgPool;
use std::time::{Duration, Instant};
use uuid::Uuid;

use super::activity::{self, NewActivity};
use super::staff::StaffMember;
use crate::crm::session::CrmBackend;
use crate::crm::{ClientField, CrmClient, FieldKind};
use crate::utils::log_if_slow;

const SLOW_EDIT: Duration = Duration::from_millis(500);

const CLIENT_COLUMNS: &str = "id, client_name, customer_number, lead_stage, lead_type, deal_status, \
     location_category, calling_comment, admin_notes, expected_visit_date, sheet_id, created_at";

/// Rows of one sheet, newest first.
pub async fn list_by_sheet(pool: &PgPool, sheet_id: Uuid) -> Result<Vec<CrmClient>> {
    let rows = sqlx::query_as::<_, CrmClient>(&format!(
        "SELECT {CLIENT_COLUMNS} FROM crm_clients WHERE sheet_id = $1 ORDER BY created_at DESC"
    ))
    .bind(sheet_id)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<CrmClient>> {
    let row = sqlx::query_as::<_, CrmClient>(&format!(
        "SELECT {CLIENT_COLUMNS} FROM crm_clients WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Why a staff edit was not applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditRejection {
    NotFound,
    /// The row's sheet is not granted to the editing staff member.
    NoAccess,
}

/// Set one field as a staff member and record it in the activity log.
///
/// `value` must already be normalized by [`ClientField::normalize`].
pub async fn update_field_as(
    pool: &PgPool,
    staff: &StaffMember,
    sheet_ids: &[Uuid],
    client_id: Uuid,
    field: ClientField,
    value: Option<&str>,
) -> Result<Result<CrmClient, EditRejection>> {
    let start = Instant::now();
    let mut tx = pool.begin().await?;

    let before = sqlx::query_as::<_, CrmClient>(&format!(
        "SELECT {CLIENT_COLUMNS} FROM crm_clients WHERE id = $1 FOR UPDATE"
    ))
    .bind(client_id)
    .fetch_optional(&mut *tx)
    .await?;
    let Some(before) = before else {
        return Ok(Err(EditRejection::NotFound));
    };
    if !before.sheet_id.is_some_and(|s| sheet_ids.contains(&s)) {
        return Ok(Err(EditRejection::NoAccess));
    }

    // Column names come from a closed enum.
    let placeholder = match field.kind() {
        FieldKind::Date => "$2::date",
        FieldKind::Select | FieldKind::Text => "$2",
    };
    let after = sqlx::query_as::<_, CrmClient>(&format!(
        "UPDATE crm_clients SET {column} = {placeholder} WHERE id = $1 RETURNING {CLIENT_COLUMNS}",
        column = field.column(),
    ))
    .bind(client_id)
    .bind(value)
    .fetch_one(&mut *tx)
    .await?;

    let old_value = before.get_field(field);
    activity::insert(
        &mut *tx,
        &NewActivity {
            staff_id: staff.id,
            staff_name: &staff.name,
            client_id,
            client_name: &after.client_name,
            sheet_id: after.sheet_id,
            field,
            old_value: Some(old_value.as_str()).filter(|v| !v.is_empty()),
            new_value: value,
        },
    )
    .await?;

    tx.commit().await?;
    log_if_slow(start, SLOW_EDIT, "crm field update");
    Ok(Ok(after))
}

/// Grid backend for one staff member's live session.
#[derive(Clone)]
pub struct PgCrmBackend {
    pool: PgPool,
    staff: StaffMember,
    sheet_ids: Vec<Uuid>,
}

impl PgCrmBackend {
    pub fn new(pool: PgPool, staff: StaffMember, sheet_ids: Vec<Uuid>) -> Self {
        Self {
            pool,
            staff,
            sheet_ids,
        }
    }
}

#[async_trait]
impl CrmBackend for PgCrmBackend {
    async fn list_clients(&self, sheet_id: Uuid) -> Result<Vec<CrmClient>> {
        if !self.sheet_ids.contains(&sheet_id) {
            bail!("no access to sheet {sheet_id}");
        }
        list_by_sheet(&self.pool, sheet_id).await
    }

    async fn update_field(
        &self,
        client_id: Uuid,
        field: ClientField,
        value: Option<String>,
    ) -> Result<()> {
        match update_field_as(
            &self.pool,
            &self.staff,
            &self.sheet_ids,
            client_id,
            field,
            value.as_deref(),
        )
        .await?
        {
            Ok(_) => Ok(()),
            Err(EditRejection::NotFound) => bail!("client {client_id} not found"),
            Err(EditRejection::NoAccess) => bail!("no access to client {client_id}"),
        }
    }
}
