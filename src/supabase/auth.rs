//! Client for the hosted auth service (GoTrue REST API).
//!
//! Token validation uses the public anon key when configured, otherwise the
//! service role key. Admin user management always needs the service role key.

use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};
use uuid::Uuid;

use crate::json::{JsonError, parse_json};

/// Page size when scanning the user list.
const USERS_PER_PAGE: u32 = 1000;
/// Upper bound on pages scanned by [`AuthClient::find_user_by_email`].
const MAX_USER_PAGES: u32 = 50;

#[derive(Debug, thiserror::Error)]
pub enum AuthApiError {
    #[error("Service role key not configured")]
    NotConfigured,
    #[error("Invalid token")]
    InvalidToken,
    #[error("{message}")]
    Api { status: u16, message: String },
    #[error("auth service request failed")]
    Http(#[from] reqwest::Error),
    #[error("unexpected auth service response: {0}")]
    Decode(#[from] JsonError),
}

/// A user as returned by the auth service.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: Option<String>,
    #[serde(default)]
    pub user_metadata: Value,
}

impl AuthUser {
    /// Non-empty string from `user_metadata`.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.user_metadata
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }
}

/// New account created by an admin.
#[derive(Debug, Clone, Serialize)]
pub struct NewUser<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub email_confirm: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_metadata: Option<Value>,
}

/// Partial account update; absent fields are left alone.
#[derive(Debug, Clone, Default, Serialize)]
pub struct UserChanges {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_metadata: Option<Value>,
}

impl UserChanges {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.password.is_none() && self.user_metadata.is_none()
    }
}

#[derive(Deserialize)]
struct UserPage {
    #[serde(default)]
    users: Vec<AuthUser>,
}

/// Error bodies come in several shapes depending on the endpoint.
#[derive(Deserialize, Default)]
struct ErrorPayload {
    msg: Option<String>,
    message: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

impl ErrorPayload {
    fn into_message(self) -> Option<String> {
        self.msg
            .or(self.message)
            .or(self.error_description)
            .or(self.error)
            .filter(|m| !m.is_empty())
    }
}

#[derive(Clone)]
pub struct AuthClient {
    http: reqwest::Client,
    base_url: String,
    anon_key: Option<String>,
    service_key: Option<String>,
}

impl AuthClient {
    pub fn new(
        http: reqwest::Client,
        base_url: &str,
        anon_key: Option<String>,
        service_key: Option<String>,
    ) -> Self {
        Self {
            http,
            base_url: base_url.trim_end_matches('/').to_owned(),
            anon_key,
            service_key,
        }
    }

    pub fn has_service_key(&self) -> bool {
        self.service_key.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}/auth/v1{path}", self.base_url)
    }

    fn admin(&self, method: Method, path: &str) -> Result<RequestBuilder, AuthApiError> {
        let key = self.service_key.as_deref().ok_or(AuthApiError::NotConfigured)?;
        Ok(self
            .http
            .request(method, self.url(path))
            .header("apikey", key)
            .bearer_auth(key))
    }

    /// Resolve a session access token to its user.
    pub async fn get_user(&self, token: &str) -> Result<AuthUser, AuthApiError> {
        let key = self
            .anon_key
            .as_deref()
            .or(self.service_key.as_deref())
            .ok_or(AuthApiError::NotConfigured)?;
        let resp = self
            .http
            .get(self.url("/user"))
            .header("apikey", key)
            .bearer_auth(token)
            .send()
            .await?;

        if matches!(
            resp.status(),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN
        ) {
            trace!(status = resp.status().as_u16(), "Rejected access token");
            return Err(AuthApiError::InvalidToken);
        }
        read_json(resp).await
    }

    /// Create an account; `email_confirm` skips the verification mail.
    pub async fn create_user(&self, user: &NewUser<'_>) -> Result<AuthUser, AuthApiError> {
        let resp = self
            .admin(Method::POST, "/admin/users")?
            .json(user)
            .send()
            .await?;
        let created: AuthUser = read_json(resp).await?;
        debug!(user_id = %created.id, "Created auth user");
        Ok(created)
    }

    pub async fn update_user(
        &self,
        id: Uuid,
        changes: &UserChanges,
    ) -> Result<AuthUser, AuthApiError> {
        let resp = self
            .admin(Method::PUT, &format!("/admin/users/{id}"))?
            .json(changes)
            .send()
            .await?;
        read_json(resp).await
    }

    pub async fn delete_user(&self, id: Uuid) -> Result<(), AuthApiError> {
        let resp = self
            .admin(Method::DELETE, &format!("/admin/users/{id}"))?
            .send()
            .await?;
        check_status(resp).await.map(|_| ())
    }

    /// One page of accounts (1-based).
    pub async fn list_users(&self, page: u32, per_page: u32) -> Result<Vec<AuthUser>, AuthApiError> {
        let resp = self
            .admin(Method::GET, "/admin/users")?
            .query(&[("page", page), ("per_page", per_page)])
            .send()
            .await?;
        let page: UserPage = read_json(resp).await?;
        Ok(page.users)
    }

    /// Find an account by email, ignoring case.
    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<AuthUser>, AuthApiError> {
        let wanted = email.trim().to_lowercase();
        for page in 1..=MAX_USER_PAGES {
            let users = self.list_users(page, USERS_PER_PAGE).await?;
            let last_page = users.len() < USERS_PER_PAGE as usize;
            if let Some(user) = users
                .into_iter()
                .find(|u| u.email.as_deref().is_some_and(|e| e.to_lowercase() == wanted))
            {
                return Ok(Some(user));
            }
            if last_page {
                break;
            }
        }
        Ok(None)
    }
}

async fn check_status(resp: Response) -> Result<String, AuthApiError> {
    let status = resp.status();
    let body = resp.text().await?;
    if status.is_success() {
        return Ok(body);
    }
    let message = parse_json::<ErrorPayload>(&body)
        .ok()
        .and_then(ErrorPayload::into_message)
        .unwrap_or_else(|| format!("auth service returned {status}"));
    Err(AuthApiError::Api {
        status: status.as_u16(),
        message,
    })
}

async fn read_json<T: DeserializeOwned>(resp: Response) -> Result<T, AuthApiError> {
    let body = check_status(resp).await?;
    Ok(parse_json(&body)?)
}
