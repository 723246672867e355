//! Persistence collaborators
//!
//! Handlers talk to storage only through these traits so the MongoDB
//! backend can be swapped for the in-memory one (dev mode, tests).
//!
//! - [`FarmStore`]: farm profile, activities, and the eligibility snapshot
//! - [`ApplicationStore`]: scheme applications, one per (user, scheme)
//! - [`AlertStore`]: alert feed
//! - [`MarketStore`]: produce listings and buyer inquiries

pub mod memory;
pub mod mongo;

pub use memory::MemoryStore;
pub use mongo::{MongoAlertStore, MongoApplicationStore, MongoFarmStore, MongoMarketStore};

use std::collections::HashSet;
use std::sync::Arc;

use bson::oid::ObjectId;
use chrono::NaiveDate;
use serde::Deserialize;

use crate::db::schemas::{
    ActivityDoc, ActivityType, AlertDoc, AlertPriority, AlertType, ApplicationDoc, Coordinates,
    Crop, FarmDoc, InquiryDoc, LandUnit, ListingDoc, ListingQuality, Metadata, SoilType,
};
use crate::db::MongoClient;
use crate::eligibility::EligibilityContext;
use crate::types::{Result, SakhiError};

/// What the eligibility engine needs to know about a farmer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FarmSnapshot {
    pub land_size: f64,
    pub is_resident: bool,
    pub organic_certified: bool,
    pub land_certified: bool,
    pub activity_count: u64,
}

impl FarmSnapshot {
    pub fn from_farm(farm: &FarmDoc, activity_count: u64) -> Self {
        Self {
            land_size: farm.land_size,
            is_resident: farm.is_resident,
            organic_certified: farm.organic_certified,
            land_certified: farm.land_certified,
            activity_count,
        }
    }

    pub fn context(&self) -> EligibilityContext {
        EligibilityContext {
            land_size_units: self.land_size,
            is_resident: self.is_resident,
            activity_count: self.activity_count,
            is_organic_certified: self.organic_certified,
            has_land_certification: self.land_certified,
        }
    }
}

/// 1-based page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: u64,
    pub limit: u64,
}

impl Page {
    pub const MAX_LIMIT: u64 = 100;
    /// Keeps `skip()` well inside the range MongoDB accepts
    pub const MAX_PAGE: u64 = 1_000_000;

    /// Clamp to 1 ≤ page ≤ [`Self::MAX_PAGE`] and 1 ≤ limit ≤ 100
    pub fn new(page: u64, limit: u64) -> Self {
        Self {
            page: page.clamp(1, Self::MAX_PAGE),
            limit: limit.clamp(1, Self::MAX_LIMIT),
        }
    }

    pub fn skip(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }

    /// Total number of pages for `total` items
    pub fn pages(&self, total: u64) -> u64 {
        total.div_ceil(self.limit)
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new(1, 20)
    }
}

/// One page of results plus the unpaged total
#[derive(Debug, Clone)]
pub struct Paged<T> {
    pub items: Vec<T>,
    pub total: u64,
}

/// Farm profile as submitted by the client
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FarmProfile {
    pub name: String,
    pub location: String,
    pub land_size: f64,
    pub land_unit: LandUnit,
    pub current_crop: Crop,
    pub soil_type: SoilType,
    #[serde(default)]
    pub irrigation: bool,
    #[serde(default)]
    pub coordinates: Option<Coordinates>,
    #[serde(default = "default_true")]
    pub is_resident: bool,
    #[serde(default)]
    pub organic_certified: bool,
    #[serde(default)]
    pub land_certified: bool,
}

fn default_true() -> bool {
    true
}

impl FarmProfile {
    pub fn validate(&self) -> Result<()> {
        check_text("name", &self.name, 100)?;
        check_text("location", &self.location, 100)?;
        if !self.land_size.is_finite() || self.land_size <= 0.0 {
            return Err(SakhiError::BadRequest("landSize must be greater than 0".into()));
        }
        Ok(())
    }

    pub fn into_doc(self, user_id: &str) -> FarmDoc {
        FarmDoc {
            _id: None,
            metadata: Metadata::new(),
            user_id: user_id.to_string(),
            name: self.name.trim().to_string(),
            location: self.location.trim().to_string(),
            land_size: self.land_size,
            land_unit: self.land_unit,
            current_crop: self.current_crop,
            soil_type: self.soil_type,
            irrigation: self.irrigation,
            coordinates: self.coordinates,
            is_resident: self.is_resident,
            organic_certified: self.organic_certified,
            land_certified: self.land_certified,
            is_active: true,
        }
    }
}

/// Activity as submitted by the client
#[derive(Debug, Clone, Deserialize)]
pub struct NewActivity {
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub crop: String,
    #[serde(default)]
    pub notes: Option<String>,
    pub location: String,
}

impl NewActivity {
    pub fn validate(&self) -> Result<()> {
        check_text("crop", &self.crop, 50)?;
        check_text("location", &self.location, 100)?;
        if let Some(notes) = &self.notes {
            if notes.chars().count() > 500 {
                return Err(SakhiError::BadRequest("notes must be at most 500 characters".into()));
            }
        }
        Ok(())
    }

    pub fn into_doc(self, user_id: &str, farm_id: ObjectId) -> ActivityDoc {
        ActivityDoc {
            _id: None,
            metadata: Metadata::new(),
            user_id: user_id.to_string(),
            farm_id,
            activity_type: self.activity_type,
            crop: self.crop.trim().to_string(),
            notes: self.notes,
            location: self.location.trim().to_string(),
        }
    }
}

/// Market listing as submitted by the seller
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewListing {
    pub crop: String,
    pub quantity: f64,
    pub unit: String,
    #[serde(alias = "expected_price")]
    pub expected_price: f64,
    pub location: String,
    #[serde(default, alias = "harvest_date")]
    pub harvest_date: Option<NaiveDate>,
    #[serde(default)]
    pub quality: ListingQuality,
    #[serde(default)]
    pub description: Option<String>,
}

impl NewListing {
    pub fn validate(&self) -> Result<()> {
        check_text("crop", &self.crop, 50)?;
        check_text("unit", &self.unit, 20)?;
        check_text("location", &self.location, 100)?;
        check_positive("quantity", self.quantity)?;
        check_positive("expectedPrice", self.expected_price)?;
        if let Some(description) = &self.description {
            if description.chars().count() > 500 {
                return Err(SakhiError::BadRequest(
                    "description must be at most 500 characters".into(),
                ));
            }
        }
        Ok(())
    }

    pub fn into_doc(self, user_id: &str) -> ListingDoc {
        ListingDoc {
            _id: None,
            metadata: Metadata::new(),
            user_id: user_id.to_string(),
            crop: self.crop.trim().to_lowercase(),
            quantity: self.quantity,
            unit: self.unit.trim().to_string(),
            expected_price: self.expected_price,
            location: self.location.trim().to_string(),
            harvest_date: self.harvest_date,
            quality: self.quality,
            description: self.description,
            inquiries: 0,
            is_active: true,
        }
    }

    /// Overwrite the seller-editable fields of an existing listing
    pub fn apply_to(self, listing: &mut ListingDoc) {
        listing.crop = self.crop.trim().to_lowercase();
        listing.quantity = self.quantity;
        listing.unit = self.unit.trim().to_string();
        listing.expected_price = self.expected_price;
        listing.location = self.location.trim().to_string();
        listing.harvest_date = self.harvest_date;
        listing.quality = self.quality;
        listing.description = self.description;
        listing.metadata.touch();
    }
}

/// Optional filters for the public listing board
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingFilter {
    /// Exact crop name, lowercase
    pub crop: Option<String>,
    /// Case-insensitive substring of the listing location
    pub district: Option<String>,
}

impl ListingFilter {
    pub fn matches(&self, listing: &ListingDoc) -> bool {
        listing.is_active
            && !listing.metadata.is_deleted
            && self.crop.as_deref().map_or(true, |c| listing.crop == c)
            && self.district.as_deref().map_or(true, |d| {
                listing.location.to_lowercase().contains(&d.to_lowercase())
            })
    }
}

fn check_positive(field: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        return Err(SakhiError::BadRequest(format!("{} must be greater than 0", field)));
    }
    Ok(())
}

fn check_text(field: &str, value: &str, max: usize) -> Result<()> {
    let len = value.trim().chars().count();
    if len == 0 || len > max {
        return Err(SakhiError::BadRequest(format!(
            "{} must be between 1 and {} characters",
            field, max
        )));
    }
    Ok(())
}

/// Optional filters for the alert feed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlertFilter {
    pub alert_type: Option<AlertType>,
    pub priority: Option<AlertPriority>,
    pub unread_only: bool,
}

impl AlertFilter {
    pub fn matches(&self, alert: &AlertDoc) -> bool {
        alert.is_active
            && self.alert_type.map_or(true, |t| alert.alert_type == t)
            && self.priority.map_or(true, |p| alert.priority == p)
            && (!self.unread_only || !alert.is_read)
    }
}

#[async_trait::async_trait]
pub trait FarmStore: Send + Sync {
    /// Active farm profile for a user
    async fn active_farm(&self, user_id: &str) -> Result<Option<FarmDoc>>;

    /// Create the profile or replace the existing one
    async fn save_farm(&self, user_id: &str, profile: FarmProfile) -> Result<FarmDoc>;

    /// Number of non-deleted activities
    async fn count_activities(&self, user_id: &str) -> Result<u64>;

    /// Non-deleted activities, newest first
    async fn list_activities(&self, user_id: &str, page: Page) -> Result<Paged<ActivityDoc>>;

    async fn add_activity(&self, activity: ActivityDoc) -> Result<ActivityDoc>;

    /// Soft delete; false when no live activity matched
    async fn delete_activity(&self, user_id: &str, activity_id: ObjectId) -> Result<bool>;

    /// Eligibility snapshot, `None` when the user has no active farm profile
    async fn farm_snapshot(&self, user_id: &str) -> Result<Option<FarmSnapshot>> {
        let Some(farm) = self.active_farm(user_id).await? else {
            return Ok(None);
        };
        let activity_count = self.count_activities(user_id).await?;
        Ok(Some(FarmSnapshot::from_farm(&farm, activity_count)))
    }
}

#[async_trait::async_trait]
pub trait ApplicationStore: Send + Sync {
    async fn find_application(&self, user_id: &str, scheme_id: &str)
        -> Result<Option<ApplicationDoc>>;

    /// Ids of every scheme the user has applied for
    async fn applied_scheme_ids(&self, user_id: &str) -> Result<HashSet<String>>;

    /// Insert; `Conflict` if the user already applied for the scheme
    async fn insert_application(&self, application: ApplicationDoc) -> Result<ApplicationDoc>;

    /// Most recent first
    async fn list_applications(&self, user_id: &str, limit: u64) -> Result<Vec<ApplicationDoc>>;
}

#[async_trait::async_trait]
pub trait AlertStore: Send + Sync {
    /// Active alerts, most urgent then newest first
    async fn list_alerts(
        &self,
        user_id: &str,
        filter: &AlertFilter,
        page: Page,
    ) -> Result<Paged<AlertDoc>>;

    async fn unread_count(&self, user_id: &str) -> Result<u64>;

    /// False when no active alert matched
    async fn mark_read(&self, user_id: &str, alert_id: ObjectId) -> Result<bool>;

    /// Returns the number of alerts changed
    async fn mark_all_read(&self, user_id: &str) -> Result<u64>;

    async fn insert_alerts(&self, alerts: Vec<AlertDoc>) -> Result<Vec<AlertDoc>>;

    /// False when no active alert matched
    async fn deactivate_alert(&self, user_id: &str, alert_id: ObjectId) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait MarketStore: Send + Sync {
    /// Active listings from every seller, newest first
    async fn list_listings(&self, filter: &ListingFilter, page: Page) -> Result<Paged<ListingDoc>>;

    /// The seller's own active listings, newest first
    async fn seller_listings(&self, user_id: &str, limit: u64) -> Result<Vec<ListingDoc>>;

    async fn active_listing(&self, listing_id: ObjectId) -> Result<Option<ListingDoc>>;

    async fn create_listing(&self, listing: ListingDoc) -> Result<ListingDoc>;

    /// Replace the editable fields of an active listing owned by `user_id`;
    /// `None` when no such listing exists
    async fn update_listing(
        &self,
        user_id: &str,
        listing_id: ObjectId,
        update: NewListing,
    ) -> Result<Option<ListingDoc>>;

    /// False when no active listing owned by `user_id` matched
    async fn deactivate_listing(&self, user_id: &str, listing_id: ObjectId) -> Result<bool>;

    /// Record the inquiry and bump the listing's inquiry count; `Conflict`
    /// if this buyer already inquired about the listing
    async fn record_inquiry(&self, inquiry: InquiryDoc) -> Result<()>;
}

#[derive(Clone)]
enum Backend {
    Mongo(MongoClient),
    Memory,
}

/// Store handles shared by all handlers
#[derive(Clone)]
pub struct Stores {
    pub farms: Arc<dyn FarmStore>,
    pub applications: Arc<dyn ApplicationStore>,
    pub alerts: Arc<dyn AlertStore>,
    pub market: Arc<dyn MarketStore>,
    backend: Backend,
}

impl Stores {
    /// Process-local stores; data is lost on restart
    pub fn memory() -> Self {
        let store = Arc::new(MemoryStore::new());
        Self {
            farms: store.clone(),
            applications: store.clone(),
            alerts: store.clone(),
            market: store,
            backend: Backend::Memory,
        }
    }

    /// MongoDB-backed stores; creates collections and indexes
    pub async fn mongo(client: MongoClient) -> Result<Self> {
        let farms = Arc::new(MongoFarmStore::new(&client).await?);
        let applications = Arc::new(MongoApplicationStore::new(&client).await?);
        let alerts = Arc::new(MongoAlertStore::new(&client).await?);
        let market = Arc::new(MongoMarketStore::new(&client).await?);
        Ok(Self {
            farms,
            applications,
            alerts,
            market,
            backend: Backend::Mongo(client),
        })
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Mongo(_) => "mongodb",
            Backend::Memory => "memory",
        }
    }

    /// Check the backend is reachable
    pub async fn ping(&self) -> Result<()> {
        match &self.backend {
            Backend::Mongo(client) => client.ping().await,
            Backend::Memory => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_clamps() {
        assert_eq!(Page::new(0, 0), Page { page: 1, limit: 1 });
        assert_eq!(Page::new(3, 500), Page { page: 3, limit: 100 });
        assert_eq!(Page::new(3, 20).skip(), 40);
        assert_eq!(Page::new(1, 20).pages(0), 0);
        assert_eq!(Page::new(1, 20).pages(41), 3);
    }

    #[test]
    fn test_page_number_is_capped() {
        let page = Page::new(u64::MAX, 100);
        assert_eq!(page.page, Page::MAX_PAGE);
        assert_eq!(page.skip(), (Page::MAX_PAGE - 1) * 100);
        assert!(i64::try_from(page.skip()).is_ok());
    }

    #[test]
    fn test_listing_validation_and_aliases() {
        let listing: NewListing = serde_json::from_str(
            r#"{"crop": " Pepper ", "quantity": 50, "unit": "kg", "expected_price": 640,
                "location": "Wayanad", "harvest_date": "2025-01-15"}"#,
        )
        .unwrap();
        assert!(listing.validate().is_ok());
        assert_eq!(listing.quality, ListingQuality::Good);

        let doc = listing.clone().into_doc("seller");
        assert_eq!(doc.crop, "pepper");
        assert!(doc.is_active);
        assert_eq!(doc.harvest_date, NaiveDate::from_ymd_opt(2025, 1, 15));

        let free = NewListing { expected_price: 0.0, ..listing.clone() };
        assert!(matches!(free.validate(), Err(SakhiError::BadRequest(_))));
        let nowhere = NewListing { location: "".into(), ..listing };
        assert!(nowhere.validate().is_err());
    }

    #[test]
    fn test_listing_filter() {
        let listing = ListingDoc {
            crop: "pepper".into(),
            location: "Kalpetta, Wayanad".into(),
            is_active: true,
            ..Default::default()
        };
        assert!(ListingFilter::default().matches(&listing));
        assert!(ListingFilter { district: Some("wayanad".into()), ..Default::default() }
            .matches(&listing));
        assert!(!ListingFilter { crop: Some("rubber".into()), ..Default::default() }
            .matches(&listing));

        let closed = ListingDoc { is_active: false, ..listing };
        assert!(!ListingFilter::default().matches(&closed));
    }

    #[test]
    fn test_snapshot_context() {
        let farm = FarmDoc {
            land_size: 1.5,
            is_resident: true,
            organic_certified: true,
            ..Default::default()
        };
        let ctx = FarmSnapshot::from_farm(&farm, 4).context();
        assert_eq!(ctx.land_size_units, 1.5);
        assert!(ctx.is_resident);
        assert!(ctx.is_organic_certified);
        assert!(!ctx.has_land_certification);
        assert_eq!(ctx.activity_count, 4);
    }

    #[test]
    fn test_farm_profile_validation() {
        let profile: FarmProfile = serde_json::from_str(
            r#"{"name": "Thottam", "location": "Palakkad", "landSize": 0,
                "landUnit": "cents", "currentCrop": "banana", "soilType": "laterite"}"#,
        )
        .unwrap();
        assert!(matches!(profile.validate(), Err(SakhiError::BadRequest(_))));

        let profile = FarmProfile { land_size: 40.0, ..profile };
        assert!(profile.validate().is_ok());
        assert!(profile.is_resident);

        let blank = FarmProfile { name: "   ".into(), ..profile };
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_farm_profile_rejects_unknown_crop() {
        let parsed = serde_json::from_str::<FarmProfile>(
            r#"{"name": "x", "location": "y", "landSize": 1, "landUnit": "cents",
                "currentCrop": "wheat", "soilType": "laterite"}"#,
        );
        assert!(parsed.is_err());
    }

    #[test]
    fn test_alert_filter() {
        let alert = AlertDoc::new("u", AlertType::Weather, AlertPriority::High, "t", "m");
        assert!(AlertFilter::default().matches(&alert));
        assert!(!AlertFilter { alert_type: Some(AlertType::Pest), ..Default::default() }.matches(&alert));
        assert!(AlertFilter { priority: Some(AlertPriority::High), unread_only: true, ..Default::default() }
            .matches(&alert));

        let read = AlertDoc { is_read: true, ..alert };
        assert!(!AlertFilter { unread_only: true, ..Default::default() }.matches(&read));
    }
}
