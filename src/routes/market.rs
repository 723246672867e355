//! Market price board, produce listings and buyer inquiries

use bson::oid::ObjectId;
use chrono::NaiveDate;
use hyper::{Response, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use super::{json_response, pagination_json, FullBody, RequestContext};
use crate::db::schemas::{InquiryDoc, ListingDoc, ListingQuality};
use crate::server::AppState;
use crate::store::{ListingFilter, NewListing, Page};
use crate::types::{Result, SakhiError};

/// Most listings returned by the "my listings" view
pub const MAX_SELLER_LISTINGS: u64 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceTrend {
    Up,
    Down,
    Stable,
}

/// Reference wholesale price at one market
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketPrice {
    pub crop: &'static str,
    pub price: u32,
    pub unit: &'static str,
    pub market: &'static str,
    pub change: &'static str,
    pub trend: PriceTrend,
    pub last_updated: String,
}

/// (crop, price, unit, market, change, trend, minutes since update)
const PRICE_BOARD: [(&str, u32, &str, &str, &str, PriceTrend, i64); 5] = [
    ("coconut", 85, "piece", "Thrissur", "+5%", PriceTrend::Up, 0),
    ("paddy", 2800, "quintal", "Palakkad", "+2%", PriceTrend::Up, 120),
    ("pepper", 650, "kg", "Kochi", "-3%", PriceTrend::Down, 240),
    ("banana", 45, "dozen", "Kozhikode", "0%", PriceTrend::Stable, 60),
    ("rubber", 180, "kg", "Kottayam", "+8%", PriceTrend::Up, 30),
];

/// Price board entries matching the optional district and crop filters
pub fn market_prices(district: Option<&str>, crop: Option<&str>) -> Vec<MarketPrice> {
    let now = chrono::Utc::now();
    let district = district.map(str::to_lowercase);

    PRICE_BOARD
        .iter()
        .filter(|(c, _, _, market, ..)| {
            district
                .as_deref()
                .map_or(true, |d| market.to_lowercase().contains(d))
                && crop.map_or(true, |wanted| *c == wanted)
        })
        .map(|&(crop, price, unit, market, change, trend, minutes)| MarketPrice {
            crop,
            price,
            unit,
            market,
            change,
            trend,
            last_updated: (now - chrono::Duration::minutes(minutes)).to_rfc3339(),
        })
        .collect()
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingView {
    pub id: Option<String>,
    pub seller_id: String,
    pub crop: String,
    pub quantity: f64,
    pub unit: String,
    pub expected_price: f64,
    pub location: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub harvest_date: Option<NaiveDate>,
    pub quality: ListingQuality,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub inquiries: u64,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

impl From<&ListingDoc> for ListingView {
    fn from(listing: &ListingDoc) -> Self {
        Self {
            id: listing._id.map(|id| id.to_hex()),
            seller_id: listing.user_id.clone(),
            crop: listing.crop.clone(),
            quantity: listing.quantity,
            unit: listing.unit.clone(),
            expected_price: listing.expected_price,
            location: listing.location.clone(),
            harvest_date: listing.harvest_date,
            quality: listing.quality,
            description: listing.description.clone(),
            inquiries: listing.inquiries,
            created_at: listing.metadata.created_rfc3339(),
            updated_at: listing.metadata.updated_rfc3339(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct PriceQuery {
    pub district: Option<String>,
    pub crop: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListingQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub crop: Option<String>,
    pub district: Option<String>,
}

impl ListingQuery {
    fn filter(&self) -> ListingFilter {
        let non_empty = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        ListingFilter {
            crop: non_empty(&self.crop).map(|c| c.to_lowercase()),
            district: non_empty(&self.district),
        }
    }
}

fn listing_not_found() -> SakhiError {
    SakhiError::NotFound("Listing not found".into())
}

/// GET /api/market/prices
pub fn get_prices(ctx: &RequestContext) -> Result<Response<FullBody>> {
    let query: PriceQuery = ctx.query()?;
    let prices = market_prices(query.district.as_deref(), query.crop.as_deref());

    Ok(json_response(
        StatusCode::OK,
        &json!({ "success": true, "data": prices }),
    ))
}

/// GET /api/market/listings
pub async fn list_listings(state: &AppState, ctx: &RequestContext) -> Result<Response<FullBody>> {
    let query: ListingQuery = ctx.query()?;
    let page = Page::new(query.page.unwrap_or(1), query.limit.unwrap_or(20));

    let listings = state
        .stores
        .market
        .list_listings(&query.filter(), page)
        .await?;
    let data: Vec<ListingView> = listings.items.iter().map(ListingView::from).collect();

    Ok(json_response(
        StatusCode::OK,
        &json!({
            "success": true,
            "data": data,
            "pagination": pagination_json(page, listings.total),
        }),
    ))
}

/// POST /api/market/listings
pub async fn create_listing(state: &AppState, ctx: &RequestContext) -> Result<Response<FullBody>> {
    let listing: NewListing = ctx.json()?;
    listing.validate()?;

    let saved = state
        .stores
        .market
        .create_listing(listing.into_doc(&ctx.user_id))
        .await?;
    info!(user_id = %ctx.user_id, crop = %saved.crop, "Market listing created");

    Ok(json_response(
        StatusCode::CREATED,
        &json!({
            "success": true,
            "message": "Listing created successfully",
            "data": ListingView::from(&saved),
        }),
    ))
}

/// GET /api/market/listings/my
pub async fn my_listings(state: &AppState, ctx: &RequestContext) -> Result<Response<FullBody>> {
    let listings = state
        .stores
        .market
        .seller_listings(&ctx.user_id, MAX_SELLER_LISTINGS)
        .await?;
    let data: Vec<ListingView> = listings.iter().map(ListingView::from).collect();

    Ok(json_response(
        StatusCode::OK,
        &json!({ "success": true, "data": data }),
    ))
}

/// PUT /api/market/listings/{id}
pub async fn update_listing(
    state: &AppState,
    ctx: &RequestContext,
    id: &str,
) -> Result<Response<FullBody>> {
    let listing_id = ObjectId::parse_str(id)?;
    let update: NewListing = ctx.json()?;
    update.validate()?;

    let updated = state
        .stores
        .market
        .update_listing(&ctx.user_id, listing_id, update)
        .await?
        .ok_or_else(listing_not_found)?;

    Ok(json_response(
        StatusCode::OK,
        &json!({
            "success": true,
            "message": "Listing updated successfully",
            "data": ListingView::from(&updated),
        }),
    ))
}

/// DELETE /api/market/listings/{id}
pub async fn delete_listing(
    state: &AppState,
    ctx: &RequestContext,
    id: &str,
) -> Result<Response<FullBody>> {
    let listing_id = ObjectId::parse_str(id)?;
    if !state
        .stores
        .market
        .deactivate_listing(&ctx.user_id, listing_id)
        .await?
    {
        return Err(listing_not_found());
    }

    Ok(json_response(
        StatusCode::OK,
        &json!({ "success": true, "message": "Listing deleted successfully" }),
    ))
}

/// POST /api/market/listings/{id}/inquire
pub async fn inquire(state: &AppState, ctx: &RequestContext, id: &str) -> Result<Response<FullBody>> {
    let listing_id = ObjectId::parse_str(id)?;
    let listing = state
        .stores
        .market
        .active_listing(listing_id)
        .await?
        .ok_or_else(listing_not_found)?;

    if listing.user_id == ctx.user_id {
        return Err(SakhiError::BadRequest(
            "Cannot inquire about your own listing".into(),
        ));
    }

    state
        .stores
        .market
        .record_inquiry(InquiryDoc::pending(listing_id, &ctx.user_id, &listing.user_id))
        .await?;
    info!(user_id = %ctx.user_id, listing_id = %listing_id, "Listing inquiry sent");

    Ok(json_response(
        StatusCode::OK,
        &json!({
            "success": true,
            "message": "Inquiry sent successfully",
            "contact": { "sellerId": listing.user_id },
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_board_filters() {
        assert_eq!(market_prices(None, None).len(), PRICE_BOARD.len());

        let kochi = market_prices(Some("KOCHI"), None);
        assert_eq!(kochi.len(), 1);
        assert_eq!(kochi[0].crop, "pepper");
        assert_eq!(kochi[0].trend, PriceTrend::Down);

        assert_eq!(market_prices(None, Some("paddy"))[0].market, "Palakkad");
        assert!(market_prices(Some("Kochi"), Some("paddy")).is_empty());
    }

    #[test]
    fn test_listing_query_filter_normalizes() {
        let query = ListingQuery {
            crop: Some(" Pepper ".into()),
            district: Some("  ".into()),
            ..Default::default()
        };
        assert_eq!(
            query.filter(),
            ListingFilter {
                crop: Some("pepper".into()),
                district: None,
            }
        );
    }
}
