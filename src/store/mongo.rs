//! MongoDB-backed stores

use std::collections::HashSet;

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::FindOptions;
use tracing::debug;

use super::{
    AlertFilter, AlertStore, ApplicationStore, FarmProfile, FarmStore, ListingFilter,
    MarketStore, NewListing, Page, Paged,
};
use crate::db::schemas::{
    ActivityDoc, AlertDoc, ApplicationDoc, FarmDoc, InquiryDoc, ListingDoc, ACTIVITY_COLLECTION,
    ALERT_COLLECTION, APPLICATION_COLLECTION, FARM_COLLECTION, INQUIRY_COLLECTION,
    LISTING_COLLECTION,
};
use crate::db::{MongoClient, MongoCollection};
use crate::types::{Result, SakhiError};

fn paged_options(sort: Document, page: Page) -> FindOptions {
    FindOptions::builder()
        .sort(sort)
        .skip(page.skip())
        .limit(i64::try_from(page.limit).unwrap_or(i64::MAX))
        .build()
}

pub struct MongoFarmStore {
    farms: MongoCollection<FarmDoc>,
    activities: MongoCollection<ActivityDoc>,
}

impl MongoFarmStore {
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        Ok(Self {
            farms: mongo.collection(FARM_COLLECTION).await?,
            activities: mongo.collection(ACTIVITY_COLLECTION).await?,
        })
    }
}

#[async_trait::async_trait]
impl FarmStore for MongoFarmStore {
    async fn active_farm(&self, user_id: &str) -> Result<Option<FarmDoc>> {
        self.farms
            .find_one(doc! { "user_id": user_id, "is_active": true })
            .await
    }

    async fn save_farm(&self, user_id: &str, profile: FarmProfile) -> Result<FarmDoc> {
        let mut farm = profile.into_doc(user_id);

        match self.farms.find_one(doc! { "user_id": user_id }).await? {
            Some(existing) => {
                let id = existing
                    ._id
                    .ok_or_else(|| SakhiError::Database("Stored farm has no _id".into()))?;

                let mut fields = bson::to_document(&farm)
                    .map_err(|e| SakhiError::Internal(format!("Failed to encode farm: {}", e)))?;
                fields.remove("_id");
                fields.remove("metadata");

                self.farms
                    .update_one(doc! { "_id": id }, doc! { "$set": fields })
                    .await?;
                debug!(user_id, "Updated farm profile");

                farm._id = Some(id);
                farm.metadata.created_at = existing.metadata.created_at;
            }
            None => {
                let id = self.farms.insert_one(farm.clone()).await?;
                debug!(user_id, "Created farm profile");
                farm._id = Some(id);
            }
        }
        Ok(farm)
    }

    async fn count_activities(&self, user_id: &str) -> Result<u64> {
        self.activities.count(doc! { "user_id": user_id }).await
    }

    async fn list_activities(&self, user_id: &str, page: Page) -> Result<Paged<ActivityDoc>> {
        let options = paged_options(doc! { "metadata.created_at": -1, "_id": -1 }, page);
        let items = self
            .activities
            .find_many(doc! { "user_id": user_id }, options)
            .await?;
        let total = self.count_activities(user_id).await?;
        Ok(Paged { items, total })
    }

    async fn add_activity(&self, mut activity: ActivityDoc) -> Result<ActivityDoc> {
        let id = self.activities.insert_one(activity.clone()).await?;
        activity._id = Some(id);
        Ok(activity)
    }

    async fn delete_activity(&self, user_id: &str, activity_id: ObjectId) -> Result<bool> {
        let result = self
            .activities
            .soft_delete(doc! { "_id": activity_id, "user_id": user_id })
            .await?;
        Ok(result.matched_count > 0)
    }
}

pub struct MongoApplicationStore {
    applications: MongoCollection<ApplicationDoc>,
}

impl MongoApplicationStore {
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        Ok(Self {
            applications: mongo.collection(APPLICATION_COLLECTION).await?,
        })
    }
}

#[async_trait::async_trait]
impl ApplicationStore for MongoApplicationStore {
    async fn find_application(
        &self,
        user_id: &str,
        scheme_id: &str,
    ) -> Result<Option<ApplicationDoc>> {
        self.applications
            .find_one(doc! { "user_id": user_id, "scheme_id": scheme_id })
            .await
    }

    async fn applied_scheme_ids(&self, user_id: &str) -> Result<HashSet<String>> {
        let applications = self
            .applications
            .find_many(doc! { "user_id": user_id }, None::<FindOptions>)
            .await?;
        Ok(applications.into_iter().map(|a| a.scheme_id).collect())
    }

    async fn insert_application(&self, mut application: ApplicationDoc) -> Result<ApplicationDoc> {
        let id = self
            .applications
            .insert_one(application.clone())
            .await
            .map_err(|e| match e {
                SakhiError::Conflict(_) => {
                    SakhiError::Conflict("Already applied for this scheme".into())
                }
                other => other,
            })?;
        application._id = Some(id);
        Ok(application)
    }

    async fn list_applications(&self, user_id: &str, limit: u64) -> Result<Vec<ApplicationDoc>> {
        let options = FindOptions::builder()
            .sort(doc! { "applied_at": -1, "_id": -1 })
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .build();
        self.applications
            .find_many(doc! { "user_id": user_id }, options)
            .await
    }
}

pub struct MongoAlertStore {
    alerts: MongoCollection<AlertDoc>,
}

impl MongoAlertStore {
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        Ok(Self {
            alerts: mongo.collection(ALERT_COLLECTION).await?,
        })
    }
}

fn to_bson<T: serde::Serialize>(value: &T) -> Result<bson::Bson> {
    bson::to_bson(value).map_err(|e| SakhiError::Internal(format!("Failed to encode filter: {}", e)))
}

/// Active, unexpired alerts for a user. The TTL monitor only runs once a
/// minute, so expiry is also checked here.
fn feed_filter(user_id: &str) -> Document {
    doc! {
        "user_id": user_id,
        "is_active": true,
        "expires_at": { "$gt": DateTime::now() },
    }
}

#[async_trait::async_trait]
impl AlertStore for MongoAlertStore {
    async fn list_alerts(
        &self,
        user_id: &str,
        filter: &AlertFilter,
        page: Page,
    ) -> Result<Paged<AlertDoc>> {
        let mut query = feed_filter(user_id);
        if let Some(alert_type) = filter.alert_type {
            query.insert("type", to_bson(&alert_type)?);
        }
        if let Some(priority) = filter.priority {
            query.insert("priority", to_bson(&priority)?);
        }
        if filter.unread_only {
            query.insert("is_read", false);
        }

        let options = paged_options(
            doc! { "priority_rank": 1, "metadata.created_at": -1, "_id": -1 },
            page,
        );
        let items = self.alerts.find_many(query.clone(), options).await?;
        let total = self.alerts.count(query).await?;
        Ok(Paged { items, total })
    }

    async fn unread_count(&self, user_id: &str) -> Result<u64> {
        let mut query = feed_filter(user_id);
        query.insert("is_read", false);
        self.alerts.count(query).await
    }

    async fn mark_read(&self, user_id: &str, alert_id: ObjectId) -> Result<bool> {
        let result = self
            .alerts
            .update_one(
                doc! { "_id": alert_id, "user_id": user_id, "is_active": true },
                doc! { "$set": { "is_read": true } },
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<u64> {
        let result = self
            .alerts
            .update_many(
                doc! { "user_id": user_id, "is_active": true, "is_read": false },
                doc! { "$set": { "is_read": true } },
            )
            .await?;
        Ok(result.modified_count)
    }

    async fn insert_alerts(&self, alerts: Vec<AlertDoc>) -> Result<Vec<AlertDoc>> {
        let mut inserted = Vec::with_capacity(alerts.len());
        for mut alert in alerts {
            let id = self.alerts.insert_one(alert.clone()).await?;
            alert._id = Some(id);
            inserted.push(alert);
        }
        Ok(inserted)
    }

    async fn deactivate_alert(&self, user_id: &str, alert_id: ObjectId) -> Result<bool> {
        let result = self
            .alerts
            .update_one(
                doc! { "_id": alert_id, "user_id": user_id, "is_active": true },
                doc! { "$set": { "is_active": false } },
            )
            .await?;
        Ok(result.matched_count > 0)
    }
}

pub struct MongoMarketStore {
    listings: MongoCollection<ListingDoc>,
    inquiries: MongoCollection<InquiryDoc>,
}

impl MongoMarketStore {
    pub async fn new(mongo: &MongoClient) -> Result<Self> {
        Ok(Self {
            listings: mongo.collection(LISTING_COLLECTION).await?,
            inquiries: mongo.collection(INQUIRY_COLLECTION).await?,
        })
    }
}

/// Escape user input for use inside a `$regex`
fn escape_regex(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if "\\.^$|?*+()[]{}".contains(c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn board_filter(filter: &ListingFilter) -> Document {
    let mut query = doc! { "is_active": true };
    if let Some(crop) = &filter.crop {
        query.insert("crop", crop.as_str());
    }
    if let Some(district) = &filter.district {
        query.insert(
            "location",
            doc! { "$regex": escape_regex(district), "$options": "i" },
        );
    }
    query
}

#[async_trait::async_trait]
impl MarketStore for MongoMarketStore {
    async fn list_listings(&self, filter: &ListingFilter, page: Page) -> Result<Paged<ListingDoc>> {
        let query = board_filter(filter);
        let options = paged_options(doc! { "metadata.created_at": -1, "_id": -1 }, page);
        let items = self.listings.find_many(query.clone(), options).await?;
        let total = self.listings.count(query).await?;
        Ok(Paged { items, total })
    }

    async fn seller_listings(&self, user_id: &str, limit: u64) -> Result<Vec<ListingDoc>> {
        let options = FindOptions::builder()
            .sort(doc! { "metadata.created_at": -1, "_id": -1 })
            .limit(i64::try_from(limit).unwrap_or(i64::MAX))
            .build();
        self.listings
            .find_many(doc! { "user_id": user_id, "is_active": true }, options)
            .await
    }

    async fn active_listing(&self, listing_id: ObjectId) -> Result<Option<ListingDoc>> {
        self.listings
            .find_one(doc! { "_id": listing_id, "is_active": true })
            .await
    }

    async fn create_listing(&self, mut listing: ListingDoc) -> Result<ListingDoc> {
        let id = self.listings.insert_one(listing.clone()).await?;
        listing._id = Some(id);
        Ok(listing)
    }

    async fn update_listing(
        &self,
        user_id: &str,
        listing_id: ObjectId,
        update: NewListing,
    ) -> Result<Option<ListingDoc>> {
        let filter = doc! { "_id": listing_id, "user_id": user_id, "is_active": true };
        let Some(mut listing) = self.listings.find_one(filter.clone()).await? else {
            return Ok(None);
        };
        update.apply_to(&mut listing);

        let mut fields = bson::to_document(&listing)
            .map_err(|e| SakhiError::Internal(format!("Failed to encode listing: {}", e)))?;
        for owned in ["_id", "metadata", "user_id", "inquiries", "is_active"] {
            fields.remove(owned);
        }
        if listing.harvest_date.is_none() {
            fields.insert("harvest_date", bson::Bson::Null);
        }
        if listing.description.is_none() {
            fields.insert("description", bson::Bson::Null);
        }

        let result = self
            .listings
            .update_one(filter, doc! { "$set": fields })
            .await?;
        Ok((result.matched_count > 0).then_some(listing))
    }

    async fn deactivate_listing(&self, user_id: &str, listing_id: ObjectId) -> Result<bool> {
        let result = self
            .listings
            .update_one(
                doc! { "_id": listing_id, "user_id": user_id, "is_active": true },
                doc! { "$set": { "is_active": false } },
            )
            .await?;
        Ok(result.matched_count > 0)
    }

    async fn record_inquiry(&self, inquiry: InquiryDoc) -> Result<()> {
        let listing_id = inquiry.listing_id;
        self.inquiries.insert_one(inquiry).await.map_err(|e| match e {
            SakhiError::Conflict(_) => {
                SakhiError::Conflict("Already inquired about this listing".into())
            }
            other => other,
        })?;

        self.listings
            .update_one(doc! { "_id": listing_id }, doc! { "$inc": { "inquiries": 1 } })
            .await?;
        debug!(listing_id = %listing_id, "Recorded listing inquiry");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_regex() {
        assert_eq!(escape_regex("Wayanad"), "Wayanad");
        assert_eq!(escape_regex("a.b*(c)"), "a\\.b\\*\\(c\\)");
    }

    #[test]
    fn test_board_filter() {
        let query = board_filter(&ListingFilter {
            crop: Some("pepper".into()),
            district: Some("Idukki".into()),
        });
        assert!(query.get_bool("is_active").unwrap());
        assert_eq!(query.get_str("crop").unwrap(), "pepper");
        let location = query.get_document("location").unwrap();
        assert_eq!(location.get_str("$options").unwrap(), "i");
    }

    #[test]
    fn test_paged_options_skip() {
        let options = paged_options(doc! { "_id": -1 }, Page::new(u64::MAX, 100));
        assert_eq!(options.skip, Some((Page::MAX_PAGE - 1) * 100));
        assert_eq!(options.limit, Some(100));
    }
}
