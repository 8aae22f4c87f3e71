#![allow(dead_code)]

use axum::extract::Query;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Json};
use axum::routing::get;
use axum::Router;
use figment::Figment;
use figment::providers::Serialized;
use ghardaar::config::Config;
use ghardaar::crm::CrmClient;
use ghardaar::state::AppState;
use serde_json::json;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// A user known to the mock auth service, addressed by bearer token.
#[derive(Debug, Clone)]
pub struct MockUser {
    pub token: String,
    pub id: Uuid,
    pub email: String,
    pub name: String,
}

impl MockUser {
    pub fn new(token: &str, name: &str) -> Self {
        Self {
            token: token.to_owned(),
            id: Uuid::new_v4(),
            email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
            name: name.to_owned(),
        }
    }

    fn json(&self) -> serde_json::Value {
        json!({
            "id": self.id,
            "email": self.email,
            "user_metadata": { "name": self.name },
        })
    }
}

/// Minimal stand-in for the hosted auth REST API.
///
/// `GET /auth/v1/user` resolves bearer tokens; `GET /auth/v1/admin/users`
/// lists every user on page 1.
pub async fn spawn_auth_server(users: Vec<MockUser>) -> String {
    let users = Arc::new(users);

    let by_token = Arc::clone(&users);
    let list = Arc::clone(&users);
    let app = Router::new()
        .route(
            "/auth/v1/user",
            get(move |headers: HeaderMap| {
                let users = Arc::clone(&by_token);
                async move {
                    let token = headers
                        .get("authorization")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.strip_prefix("Bearer "))
                        .unwrap_or_default();
                    match users.iter().find(|u| u.token == token) {
                        Some(user) => Json(user.json()).into_response(),
                        None => (
                            StatusCode::UNAUTHORIZED,
                            Json(json!({"msg": "invalid JWT"})),
                        )
                            .into_response(),
                    }
                }
            }),
        )
        .route(
            "/auth/v1/admin/users",
            get(move |Query(params): Query<HashMap<String, String>>| {
                let users = Arc::clone(&list);
                async move {
                    let page = params.get("page").map(String::as_str).unwrap_or("1");
                    let listed: Vec<_> = if page == "1" {
                        users.iter().map(MockUser::json).collect()
                    } else {
                        Vec::new()
                    };
                    Json(json!({ "users": listed }))
                }
            }),
        );

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Config with every optional integration off.
pub fn test_config(supabase_url: &str) -> Config {
    Figment::new()
        .merge(Serialized::default("database_url", "postgres://unused"))
        .merge(Serialized::default("supabase_url", supabase_url))
        .merge(Serialized::default("supabase_anon_key", "anon-key"))
        .merge(Serialized::default("supabase_service_role_key", "service-key"))
        .merge(Serialized::default("rate_limit_max_requests", 2))
        .extract()
        .unwrap()
}

pub fn test_state(pool: PgPool, supabase_url: &str) -> AppState {
    AppState::from_config(&test_config(supabase_url), pool).unwrap()
}

pub async fn insert_admin(pool: &PgPool, user: &MockUser) {
    sqlx::query("INSERT INTO admins (id, email, name) VALUES ($1, $2, $3)")
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .execute(pool)
        .await
        .unwrap();
}

pub async fn insert_staff(pool: &PgPool, user: &MockUser) {
    sqlx::query("INSERT INTO crm_staff (id, email, name) VALUES ($1, $2, $3)")
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.name)
        .execute(pool)
        .await
        .unwrap();
}

pub async fn insert_profile(pool: &PgPool, id: Uuid, name: &str, phone: &str) {
    sqlx::query("INSERT INTO user_profiles (id, name, email, phone) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind(name)
        .bind(format!("{}@example.com", name.to_lowercase()))
        .bind(phone)
        .execute(pool)
        .await
        .unwrap();
}

pub async fn insert_sheet(pool: &PgPool, name: &str) -> Uuid {
    sqlx::query_scalar("INSERT INTO crm_sheets (name) VALUES ($1) RETURNING id")
        .bind(name)
        .fetch_one(pool)
        .await
        .unwrap()
}

pub async fn grant_sheet(pool: &PgPool, staff_id: Uuid, sheet_id: Uuid) {
    sqlx::query("INSERT INTO crm_sheet_access (staff_id, sheet_id) VALUES ($1, $2)")
        .bind(staff_id)
        .bind(sheet_id)
        .execute(pool)
        .await
        .unwrap();
}

pub async fn insert_client(pool: &PgPool, sheet_id: Uuid, name: &str) -> CrmClient {
    sqlx::query_as(
        "INSERT INTO crm_clients (client_name, customer_number, sheet_id) \
         VALUES ($1, '9876543210', $2) \
         RETURNING id, client_name, customer_number, lead_stage, lead_type, deal_status, \
                   location_category, calling_comment, admin_notes, expected_visit_date, \
                   sheet_id, created_at",
    )
    .bind(name)
    .bind(sheet_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

/// Insert a listing with a price range; `None` bounds stay NULL.
pub async fn insert_property(
    pool: &PgPool,
    title: &str,
    area: &str,
    property_type: &str,
    min_price: Option<i64>,
    max_price: Option<i64>,
) -> Uuid {
    sqlx::query_scalar(
        "INSERT INTO properties (title, property_type, listing_type, city, area, min_price, max_price) \
         VALUES ($1, $2, 'sale', 'Pune', $3, $4, $5) RETURNING id",
    )
    .bind(title)
    .bind(property_type)
    .bind(area)
    .bind(min_price)
    .bind(max_price)
    .fetch_one(pool)
    .await
    .unwrap()
}
