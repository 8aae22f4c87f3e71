//! Application state shared by the web layer and background tasks.

use crate::config::Config;
use crate::data::changes::ChangeFeed;
use crate::integrations::gemini::GeminiClient;
use crate::integrations::sheets::{SheetsClient, SheetsConfigStatus, SheetsCredentials};
use crate::rate_limit::{RateLimiter, SharedRateLimiter};
use crate::supabase::AuthClient;
use anyhow::{Context, Result};
use dashmap::DashMap;
use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};
use ts_rs::TS;

/// Subscribers lagging further than this many row changes resnapshot.
const CHANGE_FEED_CAPACITY: usize = 256;
const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(30);

/// Health status of a service.
#[derive(Debug, Clone, Serialize, PartialEq, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ServiceStatus {
    Starting,
    Active,
    Connected,
    Disabled,
    Error,
}

/// A timestamped status entry for a service.
#[derive(Debug, Clone)]
pub struct StatusEntry {
    pub status: ServiceStatus,
    pub updated_at: Instant,
}

/// Thread-safe registry for services to self-report their health status.
#[derive(Debug, Clone, Default)]
pub struct ServiceStatusRegistry {
    inner: Arc<DashMap<String, StatusEntry>>,
}

impl ServiceStatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or updates the status for a named service.
    pub fn set(&self, name: &str, status: ServiceStatus) {
        self.inner.insert(
            name.to_owned(),
            StatusEntry {
                status,
                updated_at: Instant::now(),
            },
        );
    }

    pub fn get(&self, name: &str) -> Option<ServiceStatus> {
        self.inner.get(name).map(|entry| entry.status.clone())
    }

    /// Returns a snapshot of all service statuses with their age.
    pub fn all(&self) -> Vec<(String, ServiceStatus, Duration)> {
        self.inner
            .iter()
            .map(|entry| {
                (
                    entry.key().clone(),
                    entry.value().status.clone(),
                    entry.value().updated_at.elapsed(),
                )
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub auth: AuthClient,
    pub rate_limiter: SharedRateLimiter,
    pub gemini: Option<GeminiClient>,
    pub sheets: Option<Arc<SheetsClient>>,
    /// Which spreadsheet credentials were supplied, reported when `sheets` is absent.
    pub sheets_status: SheetsConfigStatus,
    pub change_feed: ChangeFeed,
    pub service_statuses: ServiceStatusRegistry,
}

impl AppState {
    /// Build the state and its outbound clients. Optional integrations that are
    /// not configured are left out and reported as disabled.
    pub fn from_config(config: &Config, db_pool: PgPool) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(OUTBOUND_TIMEOUT)
            .user_agent(concat!("ghardaar/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;
        let statuses = ServiceStatusRegistry::new();

        let auth = AuthClient::new(
            http.clone(),
            &config.supabase_url,
            config.supabase_anon_key.clone(),
            config.supabase_service_role_key.clone(),
        );
        statuses.set(
            "auth_admin",
            if auth.has_service_key() {
                ServiceStatus::Active
            } else {
                ServiceStatus::Disabled
            },
        );

        let gemini = config
            .gemini_api_key
            .as_deref()
            .filter(|k| !k.is_empty())
            .map(|key| GeminiClient::new(http.clone(), key.to_owned(), config.gemini_model.clone()));
        statuses.set(
            "gemini",
            if gemini.is_some() {
                ServiceStatus::Active
            } else {
                ServiceStatus::Disabled
            },
        );

        let (sheets, sheets_status) = match SheetsCredentials::from_parts(
            config.google_sheets_private_key.as_deref(),
            config.google_sheets_client_email.as_deref(),
            config.google_sheets_spreadsheet_id.as_deref(),
        ) {
            Ok(credentials) => {
                let present = SheetsConfigStatus {
                    has_private_key: true,
                    has_client_email: true,
                    has_spreadsheet_id: true,
                };
                match SheetsClient::new(http.clone(), credentials) {
                    Ok(client) => {
                        statuses.set("sheets", ServiceStatus::Active);
                        (Some(Arc::new(client)), present)
                    }
                    Err(e) => {
                        error!(error = %e, "Spreadsheet logging disabled: unusable private key");
                        statuses.set("sheets", ServiceStatus::Error);
                        (None, present)
                    }
                }
            }
            Err(status) => {
                statuses.set("sheets", ServiceStatus::Disabled);
                (None, status)
            }
        };

        info!(
            auth_admin = auth.has_service_key(),
            gemini = gemini.is_some(),
            sheets = sheets.is_some(),
            "integrations configured"
        );

        Ok(Self {
            db_pool,
            auth,
            rate_limiter: Arc::new(RateLimiter::in_memory(config.rate_limit())),
            gemini,
            sheets,
            sheets_status,
            change_feed: ChangeFeed::new(CHANGE_FEED_CAPACITY),
            service_statuses: statuses,
        })
    }
}
