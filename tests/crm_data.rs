//! Postgres behaviour of the CRM, staff and leads queries.

mod helpers;

use ghardaar::crm::session::{CrmBackend, CrmGridSession};
use ghardaar::crm::{ClientField, LeadType};
use ghardaar::data::activity::{self, ActionType, LogQuery};
use ghardaar::data::clients::{self, EditRejection, PgCrmBackend};
use ghardaar::data::{staff, users};
use helpers::{
    MockUser, grant_sheet, insert_admin, insert_client, insert_profile, insert_sheet,
    insert_staff,
};
use sqlx::PgPool;
use uuid::Uuid;

async fn staff_member(pool: &PgPool, name: &str) -> staff::StaffMember {
    let user = MockUser::new("unused", name);
    insert_staff(pool, &user).await;
    staff::get_active(pool, user.id).await.unwrap().unwrap()
}

#[sqlx::test]
async fn field_update_is_logged_with_old_and_new_value(pool: PgPool) {
    let sheet = insert_sheet(&pool, "Baner leads").await;
    let member = staff_member(&pool, "Priya Shah").await;
    let client = insert_client(&pool, sheet, "Asha Rao").await;

    let updated = clients::update_field_as(
        &pool,
        &member,
        &[sheet],
        client.id,
        ClientField::LeadType,
        Some("hot"),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(updated.lead_type, LeadType::Hot);

    let logs = activity::list(
        &pool,
        &LogQuery {
            page: 1,
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(logs.len(), 1);
    let log = &logs[0];
    assert_eq!(log.staff_name, "Priya Shah");
    assert_eq!(log.client_name, "Asha Rao");
    assert_eq!(log.sheet_name.as_deref(), Some("Baner leads"));
    assert_eq!(log.action_type, "update_field");
    assert_eq!(log.field_changed.as_deref(), Some("lead_type"));
    assert_eq!(log.old_value.as_deref(), Some("warm"));
    assert_eq!(log.new_value.as_deref(), Some("hot"));
}

#[sqlx::test]
async fn comments_and_cleared_dates_are_logged(pool: PgPool) {
    let sheet = insert_sheet(&pool, "Wakad").await;
    let member = staff_member(&pool, "Priya Shah").await;
    let client = insert_client(&pool, sheet, "Asha Rao").await;

    for (field, value) in [
        (ClientField::CallingComment, Some("Wants 2BHK")),
        (ClientField::ExpectedVisitDate, Some("2025-04-01")),
        (ClientField::ExpectedVisitDate, None),
    ] {
        clients::update_field_as(&pool, &member, &[sheet], client.id, field, value)
            .await
            .unwrap()
            .unwrap();
    }

    let comments = activity::list(
        &pool,
        &LogQuery {
            page: 1,
            action_type: Some(ActionType::AddComment),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0].new_value.as_deref(), Some("Wants 2BHK"));

    let after = clients::get(&pool, client.id).await.unwrap().unwrap();
    assert_eq!(after.expected_visit_date, None);

    let searched = activity::list(
        &pool,
        &LogQuery {
            page: 1,
            search: Some("2025-04".into()),
            ..Default::default()
        },
    )
    .await
    .unwrap();
    assert_eq!(searched.len(), 1);
}

#[sqlx::test]
async fn edits_outside_granted_sheets_are_rejected(pool: PgPool) {
    let mine = insert_sheet(&pool, "Mine").await;
    let theirs = insert_sheet(&pool, "Theirs").await;
    let member = staff_member(&pool, "Priya Shah").await;
    let foreign = insert_client(&pool, theirs, "Ravi Kumar").await;

    let result = clients::update_field_as(
        &pool,
        &member,
        &[mine],
        foreign.id,
        ClientField::AdminNotes,
        Some("poke"),
    )
    .await
    .unwrap();
    assert_eq!(result.unwrap_err(), EditRejection::NoAccess);

    let missing = clients::update_field_as(
        &pool,
        &member,
        &[mine],
        Uuid::new_v4(),
        ClientField::AdminNotes,
        None,
    )
    .await
    .unwrap();
    assert_eq!(missing.unwrap_err(), EditRejection::NotFound);

    let logs = activity::list(&pool, &LogQuery::default()).await.unwrap();
    assert!(logs.is_empty());
}

#[sqlx::test]
async fn live_session_persists_through_postgres(pool: PgPool) {
    let sheet = insert_sheet(&pool, "Hinjewadi").await;
    let member = staff_member(&pool, "Priya Shah").await;
    let older = insert_client(&pool, sheet, "Older").await;
    let newer = insert_client(&pool, sheet, "Newer").await;

    let backend = PgCrmBackend::new(pool.clone(), member, vec![sheet]);
    let mut session = CrmGridSession::open(backend.clone(), sheet).await.unwrap();
    assert_eq!(session.grid().rows().len(), 2);
    assert!(session.grid().rows().iter().any(|r| r.id == older.id));

    session.begin_edit(newer.id, ClientField::DealStatus).unwrap();
    session.select("locked").await.unwrap();

    let stored = clients::get(&pool, newer.id).await.unwrap().unwrap();
    assert_eq!(stored.deal_status.as_str(), "locked");

    let other_sheet = insert_sheet(&pool, "Other").await;
    assert!(backend.list_clients(other_sheet).await.is_err());
}

#[sqlx::test]
async fn removing_staff_drops_grants_only(pool: PgPool) {
    let sheet = insert_sheet(&pool, "Kharadi").await;
    let member = staff_member(&pool, "Priya Shah").await;
    grant_sheet(&pool, member.id, sheet).await;
    assert_eq!(staff::accessible_sheet_ids(&pool, member.id).await.unwrap(), vec![sheet]);

    assert!(staff::delete(&pool, member.id).await.unwrap());
    assert!(!staff::exists(&pool, member.id).await.unwrap());
    assert!(staff::accessible_sheet_ids(&pool, member.id).await.unwrap().is_empty());
    assert_eq!(staff::accessible_sheets(&pool, member.id).await.unwrap().len(), 0);

    // The sheet itself survives.
    let sheets: i64 = sqlx::query_scalar("SELECT count(*) FROM crm_sheets")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(sheets, 1);
    assert!(!staff::delete(&pool, member.id).await.unwrap());
}

#[sqlx::test]
async fn leads_exclude_admins_and_staff(pool: PgPool) {
    let admin = MockUser::new("a", "Admin One");
    let worker = MockUser::new("s", "Staff One");
    insert_admin(&pool, &admin).await;
    insert_staff(&pool, &worker).await;
    insert_profile(&pool, admin.id, "AdminProfile", "9000000001").await;
    insert_profile(&pool, worker.id, "StaffProfile", "9000000002").await;
    let customer = Uuid::new_v4();
    insert_profile(&pool, customer, "Meera", "9123456789").await;

    let leads = users::list_leads(&pool, None).await.unwrap();
    assert_eq!(leads.len(), 1);
    assert_eq!(leads[0].id, customer);

    assert_eq!(users::list_leads(&pool, Some("3456")).await.unwrap().len(), 1);
    assert_eq!(users::list_leads(&pool, Some("MEERA")).await.unwrap().len(), 1);
    assert!(users::list_leads(&pool, Some("nobody")).await.unwrap().is_empty());

    assert_eq!(users::admin_ids(&pool).await.unwrap(), vec![admin.id]);
    assert!(users::is_admin(&pool, admin.id).await.unwrap());
    assert_eq!(
        users::profile_name(&pool, customer).await.unwrap().as_deref(),
        Some("Meera")
    );
}
