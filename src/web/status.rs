//! Health and status handlers.

use axum::extract::State;
use axum::response::Json;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::BTreeMap;
use tracing::{trace, warn};
use ts_rs::TS;

use crate::data::health;
use crate::state::{AppState, ServiceStatus};

#[derive(Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ServiceInfo {
    name: String,
    status: ServiceStatus,
    /// Seconds since the status last changed.
    #[ts(type = "number")]
    updated_secs_ago: u64,
}

#[derive(Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct StatusResponse {
    status: ServiceStatus,
    version: String,
    commit: String,
    #[ts(type = "number | null")]
    db_latency_ms: Option<u64>,
    services: BTreeMap<String, ServiceInfo>,
}

/// Health check endpoint
pub async fn health() -> Json<Value> {
    trace!("health check requested");
    Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Overall status: any error wins, then all-disabled, otherwise active.
fn overall(services: &BTreeMap<String, ServiceInfo>) -> ServiceStatus {
    if services
        .values()
        .any(|s| matches!(s.status, ServiceStatus::Error))
    {
        ServiceStatus::Error
    } else if services
        .values()
        .all(|s| matches!(s.status, ServiceStatus::Disabled))
    {
        ServiceStatus::Disabled
    } else {
        ServiceStatus::Active
    }
}

/// Status endpoint: version, commit, and every registered service.
pub async fn status(State(state): State<AppState>) -> Json<StatusResponse> {
    let db_latency_ms = match health::ping(&state.db_pool).await {
        Ok(latency) => {
            state
                .service_statuses
                .set("database", ServiceStatus::Connected);
            Some(latency.as_millis() as u64)
        }
        Err(e) => {
            warn!(error = ?e, "Database ping failed");
            state.service_statuses.set("database", ServiceStatus::Error);
            None
        }
    };

    let services: BTreeMap<String, ServiceInfo> = state
        .service_statuses
        .all()
        .into_iter()
        .map(|(name, status, age)| {
            (
                name.clone(),
                ServiceInfo {
                    name,
                    status,
                    updated_secs_ago: age.as_secs(),
                },
            )
        })
        .collect();

    Json(StatusResponse {
        status: overall(&services),
        version: env!("CARGO_PKG_VERSION").to_string(),
        commit: env!("GIT_COMMIT_HASH").to_string(),
        db_latency_ms,
        services,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn services(statuses: &[ServiceStatus]) -> BTreeMap<String, ServiceInfo> {
        statuses
            .iter()
            .enumerate()
            .map(|(i, status)| {
                (
                    i.to_string(),
                    ServiceInfo {
                        name: i.to_string(),
                        status: status.clone(),
                        updated_secs_ago: 0,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn error_dominates() {
        let s = services(&[ServiceStatus::Active, ServiceStatus::Error]);
        assert_eq!(overall(&s), ServiceStatus::Error);
    }

    #[test]
    fn disabled_integrations_do_not_degrade() {
        let s = services(&[ServiceStatus::Connected, ServiceStatus::Disabled]);
        assert_eq!(overall(&s), ServiceStatus::Active);
        assert_eq!(
            overall(&services(&[ServiceStatus::Disabled])),
            ServiceStatus::Disabled
        );
    }
}
