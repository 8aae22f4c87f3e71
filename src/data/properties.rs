//! Public property listings.

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;
use std::time::{Duration, Instant};
use ts_rs::TS;
use uuid::Uuid;

use crate::utils::log_if_slow;

const SLOW_SEARCH: Duration = Duration::from_millis(300);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow, TS)]
#[ts(export)]
pub struct Property {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub property_type: String,
    pub listing_type: String,
    #[ts(type = "number | null")]
    pub price: Option<i64>,
    #[ts(type = "number | null")]
    pub min_price: Option<i64>,
    #[ts(type = "number | null")]
    pub max_price: Option<i64>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub area: Option<String>,
    pub address: Option<String>,
    pub bedrooms: Option<i32>,
    pub bathrooms: Option<i32>,
    pub carpet_area: Option<String>,
    pub config: Option<String>,
    pub floors: Option<String>,
    pub possession_status: Option<String>,
    pub rera_no: Option<String>,
    pub amenities: Vec<String>,
    pub images: Vec<String>,
    pub featured: bool,
    pub created_at: DateTime<Utc>,
}

impl Property {
    /// Lower and upper rupee bounds, falling back to the single `price`.
    pub fn price_bounds(&self) -> (Option<u64>, Option<u64>) {
        let to_u64 = |v: Option<i64>| v.and_then(|p| u64::try_from(p).ok());
        (
            to_u64(self.min_price.or(self.price)),
            to_u64(self.max_price.or(self.price)),
        )
    }
}

const PROPERTY_COLUMNS: &str = "id, title, description, property_type, listing_type, price, \
     min_price, max_price, city, state, area, address, bedrooms, bathrooms, carpet_area, config, \
     floors, possession_status, rera_no, amenities, images, featured, created_at";

/// Listing search. Text filters match case-insensitively; price bounds keep
/// listings whose range overlaps `[min_price, max_price]`.
#[derive(Debug, Clone, Default)]
pub struct PropertySearch {
    pub city: Option<String>,
    pub area: Option<String>,
    pub property_type: Option<String>,
    pub listing_type: Option<String>,
    pub min_price: Option<u64>,
    pub max_price: Option<u64>,
    pub limit: i64,
}

/// Featured listings first, then newest.
pub async fn search(pool: &PgPool, params: &PropertySearch) -> Result<Vec<Property>> {
    let start = Instant::now();
    let bound = |v: Option<u64>| v.map(|p| i64::try_from(p).unwrap_or(i64::MAX));
    let rows = sqlx::query_as::<_, Property>(&format!(
        "SELECT {PROPERTY_COLUMNS} FROM properties \
         WHERE ($1::text IS NULL OR city ILIKE $1) \
           AND ($2::text IS NULL OR area ILIKE $2) \
           AND ($3::text IS NULL OR property_type ILIKE $3) \
           AND ($4::text IS NULL OR listing_type ILIKE $4) \
           AND ($5::bigint IS NULL OR COALESCE(max_price, price) >= $5) \
           AND ($6::bigint IS NULL OR COALESCE(min_price, price) <= $6) \
         ORDER BY featured DESC, created_at DESC \
         LIMIT $7"
    ))
    .bind(params.city.as_deref())
    .bind(params.area.as_deref())
    .bind(params.property_type.as_deref())
    .bind(params.listing_type.as_deref())
    .bind(bound(params.min_price))
    .bind(bound(params.max_price))
    .bind(params.limit)
    .fetch_all(pool)
    .await?;
    log_if_slow(start, SLOW_SEARCH, "property search");
    Ok(rows)
}

pub async fn get(pool: &PgPool, id: Uuid) -> Result<Option<Property>> {
    let row = sqlx::query_as::<_, Property>(&format!(
        "SELECT {PROPERTY_COLUMNS} FROM properties WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(row)
}

/// Other listings of the same type in the same area.
pub async fn similar(pool: &PgPool, property: &Property, limit: i64) -> Result<Vec<Property>> {
    let rows = sqlx::query_as::<_, Property>(&format!(
        "SELECT {PROPERTY_COLUMNS} FROM properties \
         WHERE area = $1 AND property_type = $2 AND id <> $3 \
         ORDER BY created_at DESC \
         LIMIT $4"
    ))
    .bind(property.area.as_deref())
    .bind(&property.property_type)
    .bind(property.id)
    .bind(limit)
    .fetch_all(pool)
    .await?;
    Ok(rows)
}
