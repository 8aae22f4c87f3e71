//! Append-only logging of signups and listings to a Google spreadsheet.
//!
//! Authenticates as a service account: a signed RS256 assertion is exchanged
//! for an access token, which is cached until shortly before it expires.

use chrono::Utc;
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};
use ts_rs::TS;

use super::error::{IntegrationError, read_body, read_json};

const SERVICE: &str = "Google Sheets";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";
const TOKEN_LIFETIME_SECS: i64 = 3600;
/// Refresh this long before the token actually expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

pub const SIGNUP_SHEET: &str = "User Signups";
pub const SIGNUP_HEADERS: &[&str] = &["Timestamp", "Name", "Email", "Phone"];

pub const PROPERTY_SHEET: &str = "Property Listings";
pub const PROPERTY_HEADERS: &[&str] = &[
    "Timestamp",
    "Title",
    "Property Type",
    "Listing Type",
    "Price",
    "Location",
    "Owner Name",
    "Owner Phone",
    "Owner Email",
];

/// Which credentials are present, reported back when logging is unavailable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SheetsConfigStatus {
    pub has_private_key: bool,
    pub has_client_email: bool,
    pub has_spreadsheet_id: bool,
}

#[derive(Debug, Clone)]
pub struct SheetsCredentials {
    pub client_email: String,
    /// PEM; literal `\n` sequences from env files are accepted.
    pub private_key: String,
    pub spreadsheet_id: String,
}

fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|s| !s.trim().is_empty())
}

impl SheetsCredentials {
    /// Build from optional settings, or report what is missing.
    pub fn from_parts(
        private_key: Option<&str>,
        client_email: Option<&str>,
        spreadsheet_id: Option<&str>,
    ) -> Result<Self, SheetsConfigStatus> {
        match (
            present(private_key),
            present(client_email),
            present(spreadsheet_id),
        ) {
            (Some(key), Some(email), Some(id)) => Ok(Self {
                client_email: email.to_owned(),
                private_key: key.replace("\\n", "\n"),
                spreadsheet_id: id.to_owned(),
            }),
            (key, email, id) => Err(SheetsConfigStatus {
                has_private_key: key.is_some(),
                has_client_email: email.is_some(),
                has_spreadsheet_id: id.is_some(),
            }),
        }
    }
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
    iss: &'a str,
    scope: &'a str,
    aud: &'a str,
    iat: i64,
    exp: i64,
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    TOKEN_LIFETIME_SECS as u64
}

struct CachedToken {
    value: String,
    refresh_at: Instant,
}

#[derive(Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Deserialize)]
struct SheetProperties {
    title: String,
}

/// Signup row as posted by the registration form.
#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export)]
pub struct SignupRow {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub timestamp: Option<String>,
}

/// Listing row as posted by the property form.
#[derive(Debug, Clone, Deserialize, TS)]
#[ts(export)]
pub struct PropertyRow {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub property_type: String,
    #[serde(default)]
    pub listing_type: String,
    #[serde(default)]
    pub price: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub owner_name: String,
    #[serde(default)]
    pub owner_phone: String,
    #[serde(default)]
    pub owner_email: String,
    pub timestamp: Option<String>,
}

fn timestamp_or_now(ts: &Option<String>) -> String {
    ts.clone()
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| Utc::now().to_rfc3339())
}

impl SignupRow {
    pub fn missing_required(&self) -> bool {
        [&self.name, &self.email, &self.phone]
            .iter()
            .any(|v| v.trim().is_empty())
    }

    fn cells(&self) -> Vec<String> {
        vec![
            timestamp_or_now(&self.timestamp),
            self.name.clone(),
            self.email.clone(),
            self.phone.clone(),
        ]
    }
}

impl PropertyRow {
    pub fn missing_required(&self) -> bool {
        self.title.trim().is_empty() || self.property_type.trim().is_empty()
    }

    fn cells(&self) -> Vec<String> {
        vec![
            timestamp_or_now(&self.timestamp),
            self.title.clone(),
            self.property_type.clone(),
            self.listing_type.clone(),
            self.price.clone(),
            self.location.clone(),
            self.owner_name.clone(),
            self.owner_phone.clone(),
            self.owner_email.clone(),
        ]
    }
}

pub struct SheetsClient {
    http: reqwest::Client,
    credentials: SheetsCredentials,
    key: EncodingKey,
    token: Mutex<Option<CachedToken>>,
}

impl SheetsClient {
    pub fn new(
        http: reqwest::Client,
        credentials: SheetsCredentials,
    ) -> Result<Self, IntegrationError> {
        let key = EncodingKey::from_rsa_pem(credentials.private_key.as_bytes())?;
        Ok(Self {
            http,
            credentials,
            key,
            token: Mutex::new(None),
        })
    }

    fn sign_assertion(&self) -> Result<String, IntegrationError> {
        let iat = Utc::now().timestamp();
        let claims = AssertionClaims {
            iss: &self.credentials.client_email,
            scope: SCOPE,
            aud: TOKEN_URL,
            iat,
            exp: iat + TOKEN_LIFETIME_SECS,
        };
        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::RS256),
            &claims,
            &self.key,
        )?)
    }

    async fn access_token(&self) -> Result<String, IntegrationError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref()
            && Instant::now() < token.refresh_at
        {
            return Ok(token.value.clone());
        }

        let assertion = self.sign_assertion()?;
        let resp = self
            .http
            .post(TOKEN_URL)
            .form(&[
                ("grant_type", "urn:ietf:params:oauth:grant-type:jwt-bearer"),
                ("assertion", assertion.as_str()),
            ])
            .send()
            .await
            .map_err(IntegrationError::http(SERVICE))?;
        let token: TokenResponse = read_json(SERVICE, resp).await?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        debug!(expires_in = token.expires_in, "Obtained service account token");
        *cached = Some(CachedToken {
            value: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    fn spreadsheet_url(&self, suffix: &str) -> String {
        format!("{SHEETS_API}/{}{suffix}", self.credentials.spreadsheet_id)
    }

    async fn sheet_titles(&self, token: &str) -> Result<Vec<String>, IntegrationError> {
        let resp = self
            .http
            .get(self.spreadsheet_url(""))
            .query(&[("fields", "sheets.properties.title")])
            .bearer_auth(token)
            .send()
            .await
            .map_err(IntegrationError::http(SERVICE))?;
        let meta: SpreadsheetMeta = read_json(SERVICE, resp).await?;
        Ok(meta.sheets.into_iter().map(|s| s.properties.title).collect())
    }

    async fn create_sheet(
        &self,
        token: &str,
        name: &str,
        headers: &[&str],
    ) -> Result<(), IntegrationError> {
        let resp = self
            .http
            .post(self.spreadsheet_url(":batchUpdate"))
            .bearer_auth(token)
            .json(&json!({ "requests": [{ "addSheet": { "properties": { "title": name } } }] }))
            .send()
            .await
            .map_err(IntegrationError::http(SERVICE))?;
        read_body(SERVICE, resp).await?;

        let range = urlencoding::encode(&format!("{name}!A1")).into_owned();
        let resp = self
            .http
            .put(self.spreadsheet_url(&format!("/values/{range}")))
            .query(&[("valueInputOption", "RAW")])
            .bearer_auth(token)
            .json(&json!({ "values": [headers] }))
            .send()
            .await
            .map_err(IntegrationError::http(SERVICE))?;
        read_body(SERVICE, resp).await?;
        info!(sheet = name, "Created log sheet");
        Ok(())
    }

    /// Create the sheet with a header row if it is missing.
    ///
    /// Failures are logged and swallowed; the append that follows reports
    /// anything that actually prevents logging.
    async fn ensure_sheet(&self, token: &str, name: &str, headers: &[&str]) {
        let result = async {
            if !self.sheet_titles(token).await?.iter().any(|t| t == name) {
                self.create_sheet(token, name, headers).await?;
            }
            Ok::<_, IntegrationError>(())
        }
        .await;
        if let Err(e) = result {
            warn!(sheet = name, error = %e, "Could not ensure log sheet exists");
        }
    }

    async fn append_row(
        &self,
        token: &str,
        name: &str,
        cells: Vec<String>,
    ) -> Result<(), IntegrationError> {
        let range = urlencoding::encode(&format!("{name}!A:Z")).into_owned();
        let resp = self
            .http
            .post(self.spreadsheet_url(&format!("/values/{range}:append")))
            .query(&[
                ("valueInputOption", "RAW"),
                ("insertDataOption", "INSERT_ROWS"),
            ])
            .bearer_auth(token)
            .json(&json!({ "values": [cells] }))
            .send()
            .await
            .map_err(IntegrationError::http(SERVICE))?;
        read_body(SERVICE, resp).await?;
        Ok(())
    }

    async fn log(&self, name: &str, headers: &[&str], cells: Vec<String>) -> Result<(), IntegrationError> {
        let token = self.access_token().await?;
        self.ensure_sheet(&token, name, headers).await;
        self.append_row(&token, name, cells).await?;
        debug!(sheet = name, "Appended row");
        Ok(())
    }

    #[instrument(skip_all)]
    pub async fn append_user_signup(&self, row: &SignupRow) -> Result<(), IntegrationError> {
        self.log(SIGNUP_SHEET, SIGNUP_HEADERS, row.cells()).await
    }

    #[instrument(skip_all)]
    pub async fn append_property_listing(&self, row: &PropertyRow) -> Result<(), IntegrationError> {
        self.log(PROPERTY_SHEET, PROPERTY_HEADERS, row.cells()).await
    }
}
