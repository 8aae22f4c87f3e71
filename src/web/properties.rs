//! Public property search and detail.

use axum::extract::{Path, Query, State};
use axum::response::{Json, Response};
use serde::{Deserialize, Serialize};
use tracing::{instrument, trace};
use ts_rs::TS;
use uuid::Uuid;

use crate::data::properties::{self, Property, PropertySearch};
use crate::price::{PriceInput, format_price_range, parse_price_notation};
use crate::state::AppState;
use crate::web::error::{ApiError, OptionNotFoundExt, db_error};
use crate::web::{cache, with_cache_control};

const DEFAULT_LIMIT: i64 = 24;
const MAX_LIMIT: i64 = 100;
const SIMILAR_LIMIT: i64 = 4;

#[derive(Debug, Default, Deserialize)]
pub struct PropertyParams {
    city: Option<String>,
    area: Option<String>,
    property_type: Option<String>,
    listing_type: Option<String>,
    min_price: Option<String>,
    max_price: Option<String>,
    limit: Option<i64>,
}

fn text_filter(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_owned())
        .filter(|v| !v.is_empty())
}

/// Price bound in notation (`75L`, `1.5Cr`); empty means unbounded.
fn price_bound(name: &str, value: Option<&str>) -> Result<Option<u64>, ApiError> {
    match parse_price_notation(value.unwrap_or_default()) {
        PriceInput::Empty => Ok(None),
        PriceInput::Amount(amount) => Ok(Some(amount)),
        PriceInput::Invalid => Err(ApiError::bad_request(format!(
            "Invalid {name}: {}",
            value.unwrap_or_default()
        ))),
    }
}

impl PropertyParams {
    fn into_search(self) -> Result<PropertySearch, ApiError> {
        let min_price = price_bound("min_price", self.min_price.as_deref())?;
        let max_price = price_bound("max_price", self.max_price.as_deref())?;
        if let (Some(min), Some(max)) = (min_price, max_price)
            && min > max
        {
            return Err(ApiError::bad_request(
                "min_price must not exceed max_price",
            ));
        }
        Ok(PropertySearch {
            city: text_filter(self.city),
            area: text_filter(self.area),
            property_type: text_filter(self.property_type),
            listing_type: text_filter(self.listing_type),
            min_price,
            max_price,
            limit: self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        })
    }
}

/// A property with its display price.
#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct PropertyListing {
    #[serde(flatten)]
    pub property: Property,
    pub price_display: String,
}

impl From<Property> for PropertyListing {
    fn from(property: Property) -> Self {
        let (min, max) = property.price_bounds();
        Self {
            price_display: format_price_range(min, max),
            property,
        }
    }
}

#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct PropertyListResponse {
    pub properties: Vec<PropertyListing>,
    pub count: usize,
}

/// `GET /api/properties`
#[instrument(skip_all)]
pub async fn list_properties(
    State(state): State<AppState>,
    Query(params): Query<PropertyParams>,
) -> Result<Response, ApiError> {
    let search = params.into_search()?;
    let rows = properties::search(&state.db_pool, &search)
        .await
        .map_err(|e| db_error("Property search", e))?;

    trace!(count = rows.len(), ?search, "Property search");
    let properties: Vec<PropertyListing> = rows.into_iter().map(Into::into).collect();
    Ok(with_cache_control(
        PropertyListResponse {
            count: properties.len(),
            properties,
        },
        cache::SEARCH,
    ))
}

#[derive(Debug, Serialize, TS)]
#[ts(export)]
pub struct PropertyDetailResponse {
    pub property: PropertyListing,
    pub similar: Vec<PropertyListing>,
}

/// `GET /api/properties/{id}`
#[instrument(skip_all, fields(property_id = %id))]
pub async fn get_property(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PropertyDetailResponse>, ApiError> {
    let property = properties::get(&state.db_pool, id)
        .await
        .map_err(|e| db_error("Property lookup", e))?
        .or_not_found("Property", id)?;

    let similar = properties::similar(&state.db_pool, &property, SIMILAR_LIMIT)
        .await
        .map_err(|e| db_error("Similar properties", e))?;

    Ok(Json(PropertyDetailResponse {
        property: property.into(),
        similar: similar.into_iter().map(Into::into).collect(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notation_bounds_are_converted() {
        let search = PropertyParams {
            min_price: Some("75L".into()),
            max_price: Some("1.5Cr".into()),
            city: Some("  Pune ".into()),
            ..Default::default()
        }
        .into_search()
        .unwrap();
        assert_eq!(search.min_price, Some(7_500_000));
        assert_eq!(search.max_price, Some(15_000_000));
        assert_eq!(search.city.as_deref(), Some("Pune"));
        assert_eq!(search.limit, DEFAULT_LIMIT);
    }

    #[test]
    fn empty_bound_is_unbounded() {
        let search = PropertyParams {
            min_price: Some(String::new()),
            limit: Some(1000),
            ..Default::default()
        }
        .into_search()
        .unwrap();
        assert_eq!(search.min_price, None);
        assert_eq!(search.limit, MAX_LIMIT);
    }

    #[test]
    fn invalid_notation_is_rejected() {
        let err = PropertyParams {
            max_price: Some("lots".into()),
            ..Default::default()
        }
        .into_search()
        .unwrap_err();
        assert_eq!(err.message, "Invalid max_price: lots");
    }

    #[test]
    fn inverted_range_is_rejected() {
        let err = PropertyParams {
            min_price: Some("2Cr".into()),
            max_price: Some("50L".into()),
            ..Default::default()
        }
        .into_search()
        .unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
