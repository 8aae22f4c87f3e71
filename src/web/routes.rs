//! Web API router construction and shared response utilities.

use axum::{
    Router,
    http::{HeaderValue, Method, header},
    response::{IntoResponse, Json, Response},
    routing::{get, patch, post},
};
use std::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tower_http::{compression::CompressionLayer, timeout::TimeoutLayer};

use crate::state::AppState;
use crate::web::middleware::rate_limit::RateLimitLayer;
use crate::web::middleware::request_id::RequestIdLayer;
use crate::web::middleware::security_headers::SecurityHeadersLayer;
use crate::web::{admin, crm, integrations, properties, staff, status};

/// Cache-Control presets.
pub mod cache {
    /// Property search results.
    pub const SEARCH: &str = "public, max-age=60, s-maxage=300, stale-while-revalidate=120";
    /// Authenticated endpoints -- never cache.
    pub const PRIVATE: &str = "private, no-store, must-revalidate";
}

/// Wraps a JSON response with a `Cache-Control` header.
pub fn with_cache_control<T: serde::Serialize>(value: T, header: &'static str) -> Response {
    let mut response = Json(value).into_response();
    response.headers_mut().insert(
        axum::http::header::CACHE_CONTROL,
        HeaderValue::from_static(header),
    );
    response
}

/// Creates the web server router
pub fn create_router(app_state: AppState) -> Router {
    let public_router = Router::new()
        .route("/health", get(status::health))
        .route("/status", get(status::status))
        .route("/properties", get(properties::list_properties))
        .route("/properties/{id}", get(properties::get_property));

    // Quota-bound upstream APIs; gated per client before the handler runs.
    let limited_router = Router::new()
        .route(
            "/generate-description",
            post(integrations::generate_description),
        )
        .route("/log-to-sheets", post(integrations::log_to_sheets))
        .route_layer(RateLimitLayer::new(app_state.rate_limiter.clone()));

    let private_router = Router::new()
        .route("/create-staff", post(staff::create_staff))
        .route("/update-staff", post(staff::update_staff))
        .route("/delete-staff", post(staff::delete_staff))
        .route("/lookup-user", post(staff::lookup_user))
        .route("/admin/get-excluded-ids", get(admin::get_excluded_ids))
        .route("/admin/crm/logs", get(admin::list_activity_logs))
        .route("/admin/leads", get(admin::list_leads))
        .route("/crm/sheets", get(crm::list_sheets))
        .route("/crm/sheets/{sheet_id}/clients", get(crm::list_clients))
        .route("/crm/sheets/{sheet_id}/live", get(crm::live_session))
        .route("/crm/clients/{id}", patch(crm::update_client))
        .layer(axum::middleware::map_response(
            |mut resp: Response| async move {
                resp.headers_mut().insert(
                    axum::http::header::CACHE_CONTROL,
                    HeaderValue::from_static(cache::PRIVATE),
                );
                resp
            },
        ));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PATCH, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .max_age(Duration::from_secs(60 * 60));

    let router = Router::new()
        .nest(
            "/api",
            public_router.merge(limited_router).merge(private_router),
        )
        .with_state(app_state);

    router.layer((
        // Outermost: per-request ID span + severity-proportional response logging.
        RequestIdLayer,
        SecurityHeadersLayer,
        cors,
        CompressionLayer::new()
            .zstd(true)
            .br(true)
            .gzip(true)
            .quality(tower_http::CompressionLevel::Fastest),
        TimeoutLayer::new(Duration::from_secs(60)),
    ))
}
