//! Listing descriptions from the Gemini `generateContent` endpoint.

use serde::Deserialize;
use serde_json::{Value, json};
use std::fmt::Write;
use tracing::{debug, instrument};
use ts_rs::TS;

use super::error::{IntegrationError, read_json};

const SERVICE: &str = "Gemini";
const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(export)]
pub struct ListingLocation {
    pub city: Option<String>,
    pub state: Option<String>,
    pub area: Option<String>,
    pub address: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(export)]
pub struct ListingFeatures {
    /// Numbers or free text ("3+").
    #[ts(type = "number | string | null")]
    pub bedrooms: Option<Value>,
    #[ts(type = "number | string | null")]
    pub bathrooms: Option<Value>,
    pub amenities: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(export)]
pub struct ProjectDetails {
    pub carpet_area: Option<String>,
    pub config: Option<String>,
    pub floors: Option<String>,
    pub possession_status: Option<String>,
}

/// What the listing form knows about a property.
#[derive(Debug, Clone, Default, Deserialize, TS)]
#[ts(export)]
pub struct ListingDetails {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub property_type: String,
    #[serde(default)]
    pub listing_type: String,
    #[serde(default)]
    pub location: ListingLocation,
    #[serde(default)]
    pub features: ListingFeatures,
    #[serde(default)]
    pub project_details: ProjectDetails,
}

fn text(value: &Option<String>) -> &str {
    value.as_deref().filter(|v| !v.is_empty()).unwrap_or("N/A")
}

fn scalar(value: &Option<Value>) -> String {
    match value {
        Some(Value::String(s)) if !s.is_empty() => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => "N/A".to_owned(),
    }
}

/// Prompt asking for a two-paragraph description plus highlights.
pub fn build_description_prompt(listing: &ListingDetails) -> String {
    let loc = &listing.location;
    let features = &listing.features;
    let project = &listing.project_details;

    let amenities = features
        .amenities
        .as_ref()
        .filter(|a| !a.is_empty())
        .map(|a| a.join(", "))
        .unwrap_or_else(|| "Standard amenities".to_owned());

    let mut prompt = String::new();
    let _ = writeln!(
        prompt,
        "Write a professional, attractive, and SEO-friendly property description for a real estate listing based on the following details:\n"
    );
    let _ = writeln!(prompt, "Property Title: {}", listing.title);
    let _ = writeln!(
        prompt,
        "Type: {} ({})",
        listing.property_type, listing.listing_type
    );
    let _ = writeln!(
        prompt,
        "Location: {}, {} ({})",
        text(&loc.city),
        text(&loc.state),
        text(&loc.area)
    );
    let _ = writeln!(prompt, "Address: {}\n", text(&loc.address));
    let _ = writeln!(prompt, "Key Features:");
    let _ = writeln!(prompt, "- Bedrooms: {}", scalar(&features.bedrooms));
    let _ = writeln!(prompt, "- Bathrooms: {}", scalar(&features.bathrooms));
    let _ = writeln!(prompt, "- Area: {}\n", text(&project.carpet_area));
    let _ = writeln!(prompt, "Amenities: {amenities}\n");

    let details: Vec<String> = [
        ("Configuration", &project.config),
        ("Floors", &project.floors),
        ("Possession", &project.possession_status),
    ]
    .into_iter()
    .filter_map(|(label, value)| {
        value
            .as_deref()
            .filter(|v| !v.is_empty())
            .map(|v| format!("- {label}: {v}"))
    })
    .collect();
    if !details.is_empty() {
        let _ = writeln!(prompt, "Project Details:\n{}\n", details.join("\n"));
    }

    prompt.push_str(
        "Tone: Professional, luxurious, and inviting.\n\
         Format: Two concise paragraphs highlighting the lifestyle and convenience, followed by a bulleted list of key highlights.\n\
         Do not include any contact placeholders or fake phone numbers.\n",
    );
    prompt
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

impl GenerateResponse {
    fn text(self) -> Option<String> {
        let content = self.candidates.into_iter().next()?.content?;
        let text: String = content.parts.into_iter().map(|p| p.text).collect();
        Some(text.trim().to_owned()).filter(|t| !t.is_empty())
    }
}

#[derive(Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiClient {
    pub fn new(http: reqwest::Client, api_key: String, model: String) -> Self {
        Self {
            http,
            api_key,
            model,
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    #[instrument(skip_all, fields(model = %self.model))]
    pub async fn generate(&self, prompt: &str) -> Result<String, IntegrationError> {
        let url = format!("{API_BASE}/models/{}:generateContent", self.model);
        let body = json!({ "contents": [{ "parts": [{ "text": prompt }] }] });
        let resp = self
            .http
            .post(url)
            .query(&[("key", self.api_key.as_str())])
            .json(&body)
            .send()
            .await
            .map_err(IntegrationError::http(SERVICE))?;

        let parsed: GenerateResponse = read_json(SERVICE, resp).await?;
        let text = parsed.text().ok_or(IntegrationError::Empty(SERVICE))?;
        debug!(chars = text.len(), "Generated text");
        Ok(text)
    }

    pub async fn describe_listing(&self, listing: &ListingDetails) -> Result<String, IntegrationError> {
        self.generate(&build_description_prompt(listing)).await
    }
}
