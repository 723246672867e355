//! In-memory stores
//!
//! Used in dev mode when MongoDB is unreachable, and by tests. Mirrors the
//! MongoDB semantics: soft deletes, one farm per user, unique
//! (user, scheme) applications and (listing, buyer) inquiries. Ordering by
//! `_id` matches insertion order.

use std::collections::HashSet;

use bson::oid::ObjectId;
use bson::DateTime;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use super::{
    AlertFilter, AlertStore, ApplicationStore, FarmProfile, FarmStore, ListingFilter,
    MarketStore, NewListing, Page, Paged,
};
use crate::db::schemas::{ActivityDoc, AlertDoc, ApplicationDoc, FarmDoc, InquiryDoc, ListingDoc};
use crate::types::{Result, SakhiError};

#[derive(Default)]
pub struct MemoryStore {
    farms: DashMap<String, FarmDoc>,
    activities: DashMap<ObjectId, ActivityDoc>,
    /// Keyed by (user_id, scheme_id)
    applications: DashMap<(String, String), ApplicationDoc>,
    alerts: DashMap<ObjectId, AlertDoc>,
    listings: DashMap<ObjectId, ListingDoc>,
    /// Keyed by (listing_id, inquirer_id)
    inquiries: DashMap<(ObjectId, String), InquiryDoc>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn live_activities(&self, user_id: &str) -> Vec<ActivityDoc> {
        self.activities
            .iter()
            .filter(|a| a.user_id == user_id && !a.metadata.is_deleted)
            .map(|a| a.value().clone())
            .collect()
    }
}

fn paginate<T>(items: Vec<T>, page: Page) -> Paged<T> {
    let total = items.len() as u64;
    let items = items
        .into_iter()
        .skip(usize::try_from(page.skip()).unwrap_or(usize::MAX))
        .take(usize::try_from(page.limit).unwrap_or(usize::MAX))
        .collect();
    Paged { items, total }
}

#[async_trait::async_trait]
impl FarmStore for MemoryStore {
    async fn active_farm(&self, user_id: &str) -> Result<Option<FarmDoc>> {
        Ok(self
            .farms
            .get(user_id)
            .filter(|f| f.is_active && !f.metadata.is_deleted)
            .map(|f| f.value().clone()))
    }

    async fn save_farm(&self, user_id: &str, profile: FarmProfile) -> Result<FarmDoc> {
        let mut doc = profile.into_doc(user_id);
        match self.farms.entry(user_id.to_string()) {
            Entry::Occupied(mut existing) => {
                doc._id = existing.get()._id;
                doc.metadata.created_at = existing.get().metadata.created_at;
                existing.insert(doc.clone());
            }
            Entry::Vacant(slot) => {
                doc._id = Some(ObjectId::new());
                slot.insert(doc.clone());
            }
        }
        Ok(doc)
    }

    async fn count_activities(&self, user_id: &str) -> Result<u64> {
        Ok(self
            .activities
            .iter()
            .filter(|a| a.user_id == user_id && !a.metadata.is_deleted)
            .count() as u64)
    }

    async fn list_activities(&self, user_id: &str, page: Page) -> Result<Paged<ActivityDoc>> {
        let mut items = self.live_activities(user_id);
        items.sort_by(|a, b| b._id.cmp(&a._id));
        Ok(paginate(items, page))
    }

    async fn add_activity(&self, mut activity: ActivityDoc) -> Result<ActivityDoc> {
        let id = ObjectId::new();
        activity._id = Some(id);
        self.activities.insert(id, activity.clone());
        Ok(activity)
    }

    async fn delete_activity(&self, user_id: &str, activity_id: ObjectId) -> Result<bool> {
        match self.activities.get_mut(&activity_id) {
            Some(mut a) if a.user_id == user_id && !a.metadata.is_deleted => {
                a.metadata.delete();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait::async_trait]
impl ApplicationStore for MemoryStore {
    async fn find_application(
        &self,
        user_id: &str,
        scheme_id: &str,
    ) -> Result<Option<ApplicationDoc>> {
        Ok(self
            .applications
            .get(&(user_id.to_string(), scheme_id.to_string()))
            .map(|a| a.value().clone()))
    }

    async fn applied_scheme_ids(&self, user_id: &str) -> Result<HashSet<String>> {
        Ok(self
            .applications
            .iter()
            .filter(|a| a.user_id == user_id)
            .map(|a| a.scheme_id.clone())
            .collect())
    }

    async fn insert_application(&self, mut application: ApplicationDoc) -> Result<ApplicationDoc> {
        let key = (application.user_id.clone(), application.scheme_id.clone());
        match self.applications.entry(key) {
            Entry::Occupied(_) => Err(SakhiError::Conflict(
                "Already applied for this scheme".into(),
            )),
            Entry::Vacant(slot) => {
                application._id = Some(ObjectId::new());
                slot.insert(application.clone());
                Ok(application)
            }
        }
    }

    async fn list_applications(&self, user_id: &str, limit: u64) -> Result<Vec<ApplicationDoc>> {
        let mut items: Vec<ApplicationDoc> = self
            .applications
            .iter()
            .filter(|a| a.user_id == user_id)
            .map(|a| a.value().clone())
            .collect();
        items.sort_by(|a, b| b.applied_at.cmp(&a.applied_at).then(b._id.cmp(&a._id)));
        items.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(items)
    }
}

#[async_trait::async_trait]
impl AlertStore for MemoryStore {
    async fn list_alerts(
        &self,
        user_id: &str,
        filter: &AlertFilter,
        page: Page,
    ) -> Result<Paged<AlertDoc>> {
        let now = DateTime::now();
        let mut items: Vec<AlertDoc> = self
            .alerts
            .iter()
            .filter(|a| a.user_id == user_id && a.expires_at > now && filter.matches(a))
            .map(|a| a.value().clone())
            .collect();
        items.sort_by(|a, b| {
            a.priority_rank
                .cmp(&b.priority_rank)
                .then(b._id.cmp(&a._id))
        });
        Ok(paginate(items, page))
    }

    async fn unread_count(&self, user_id: &str) -> Result<u64> {
        let now = DateTime::now();
        Ok(self
            .alerts
            .iter()
            .filter(|a| a.user_id == user_id && a.is_active && !a.is_read && a.expires_at > now)
            .count() as u64)
    }

    async fn mark_read(&self, user_id: &str, alert_id: ObjectId) -> Result<bool> {
        match self.alerts.get_mut(&alert_id) {
            Some(mut a) if a.user_id == user_id && a.is_active => {
                a.is_read = true;
                a.metadata.touch();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn mark_all_read(&self, user_id: &str) -> Result<u64> {
        let mut changed = 0;
        for mut a in self.alerts.iter_mut() {
            if a.user_id == user_id && a.is_active && !a.is_read {
                a.is_read = true;
                a.metadata.touch();
                changed += 1;
            }
        }
        Ok(changed)
    }

    async fn insert_alerts(&self, alerts: Vec<AlertDoc>) -> Result<Vec<AlertDoc>> {
        let mut inserted = Vec::with_capacity(alerts.len());
        for mut alert in alerts {
            let id = ObjectId::new();
            alert._id = Some(id);
            self.alerts.insert(id, alert.clone());
            inserted.push(alert);
        }
        Ok(inserted)
    }

    async fn deactivate_alert(&self, user_id: &str, alert_id: ObjectId) -> Result<bool> {
        match self.alerts.get_mut(&alert_id) {
            Some(mut a) if a.user_id == user_id && a.is_active => {
                a.is_active = false;
                a.metadata.touch();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait::async_trait]
impl MarketStore for MemoryStore {
    async fn list_listings(&self, filter: &ListingFilter, page: Page) -> Result<Paged<ListingDoc>> {
        let mut items: Vec<ListingDoc> = self
            .listings
            .iter()
            .filter(|l| filter.matches(l))
            .map(|l| l.value().clone())
            .collect();
        items.sort_by(|a, b| b._id.cmp(&a._id));
        Ok(paginate(items, page))
    }

    async fn seller_listings(&self, user_id: &str, limit: u64) -> Result<Vec<ListingDoc>> {
        let mut items: Vec<ListingDoc> = self
            .listings
            .iter()
            .filter(|l| l.user_id == user_id && l.is_active)
            .map(|l| l.value().clone())
            .collect();
        items.sort_by(|a, b| b._id.cmp(&a._id));
        items.truncate(usize::try_from(limit).unwrap_or(usize::MAX));
        Ok(items)
    }

    async fn active_listing(&self, listing_id: ObjectId) -> Result<Option<ListingDoc>> {
        Ok(self
            .listings
            .get(&listing_id)
            .filter(|l| l.is_active)
            .map(|l| l.value().clone()))
    }

    async fn create_listing(&self, mut listing: ListingDoc) -> Result<ListingDoc> {
        let id = ObjectId::new();
        listing._id = Some(id);
        self.listings.insert(id, listing.clone());
        Ok(listing)
    }

    async fn update_listing(
        &self,
        user_id: &str,
        listing_id: ObjectId,
        update: NewListing,
    ) -> Result<Option<ListingDoc>> {
        match self.listings.get_mut(&listing_id) {
            Some(mut l) if l.user_id == user_id && l.is_active => {
                update.apply_to(l.value_mut());
                Ok(Some(l.value().clone()))
            }
            _ => Ok(None),
        }
    }

    async fn deactivate_listing(&self, user_id: &str, listing_id: ObjectId) -> Result<bool> {
        match self.listings.get_mut(&listing_id) {
            Some(mut l) if l.user_id == user_id && l.is_active => {
                l.is_active = false;
                l.metadata.touch();
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_inquiry(&self, mut inquiry: InquiryDoc) -> Result<()> {
        let listing_id = inquiry.listing_id;
        match self
            .inquiries
            .entry((listing_id, inquiry.inquirer_id.clone()))
        {
            Entry::Occupied(_) => {
                return Err(SakhiError::Conflict(
                    "Already inquired about this listing".into(),
                ))
            }
            Entry::Vacant(slot) => {
                inquiry._id = Some(ObjectId::new());
                slot.insert(inquiry);
            }
        }

        if let Some(mut listing) = self.listings.get_mut(&listing_id) {
            listing.inquiries += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::schemas::{
        ActivityType, AlertPriority, AlertType, ApplicationFarmData, Crop, LandUnit,
        ListingQuality, SoilType,
    };
    use crate::store::NewActivity;
    use tokio_test::{assert_err, assert_ok};

    fn listing(crop: &str, location: &str) -> NewListing {
        NewListing {
            crop: crop.into(),
            quantity: 100.0,
            unit: "kg".into(),
            expected_price: 650.0,
            location: location.into(),
            harvest_date: None,
            quality: ListingQuality::Good,
            description: None,
        }
    }

    fn profile(land_size: f64) -> FarmProfile {
        FarmProfile {
            name: "Thottam".into(),
            location: "Thrissur".into(),
            land_size,
            land_unit: LandUnit::Hectares,
            current_crop: Crop::Paddy,
            soil_type: SoilType::Alluvial,
            irrigation: true,
            coordinates: None,
            is_resident: true,
            organic_certified: false,
            land_certified: false,
        }
    }

    fn activity(store_farm: &FarmDoc) -> ActivityDoc {
        NewActivity {
            activity_type: ActivityType::Irrigated,
            crop: "paddy".into(),
            notes: None,
            location: "Thrissur".into(),
        }
        .into_doc(&store_farm.user_id, store_farm._id.unwrap())
    }

    #[tokio::test]
    async fn test_save_farm_replaces_existing() {
        let store = MemoryStore::new();
        assert!(store.active_farm("u1").await.unwrap().is_none());

        let first = store.save_farm("u1", profile(1.5)).await.unwrap();
        let second = store.save_farm("u1", profile(3.0)).await.unwrap();
        assert_eq!(first._id, second._id);

        let farm = store.active_farm("u1").await.unwrap().unwrap();
        assert_eq!(farm.land_size, 3.0);
        assert!(store.active_farm("u2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_snapshot_counts_live_activities() {
        let store = MemoryStore::new();
        assert!(store.farm_snapshot("u1").await.unwrap().is_none());

        let farm = store.save_farm("u1", profile(1.5)).await.unwrap();
        let a = store.add_activity(activity(&farm)).await.unwrap();
        store.add_activity(activity(&farm)).await.unwrap();

        let snapshot = store.farm_snapshot("u1").await.unwrap().unwrap();
        assert_eq!(snapshot.activity_count, 2);
        assert_eq!(snapshot.land_size, 1.5);

        assert!(store.delete_activity("u1", a._id.unwrap()).await.unwrap());
        assert!(!store.delete_activity("u1", a._id.unwrap()).await.unwrap());
        assert_eq!(store.count_activities("u1").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_activities_newest_first_and_paged() {
        let store = MemoryStore::new();
        let farm = store.save_farm("u1", profile(1.0)).await.unwrap();
        let mut ids = Vec::new();
        for _ in 0..5 {
            ids.push(store.add_activity(activity(&farm)).await.unwrap()._id);
        }

        let page = store.list_activities("u1", Page::new(1, 2)).await.unwrap();
        assert_eq!(page.total, 5);
        assert_eq!(page.items.len(), 2);
        assert_eq!(page.items[0]._id, ids[4]);

        let last = store.list_activities("u1", Page::new(3, 2)).await.unwrap();
        assert_eq!(last.items.len(), 1);
        assert_eq!(last.items[0]._id, ids[0]);
    }

    #[tokio::test]
    async fn test_other_users_activity_not_deletable() {
        let store = MemoryStore::new();
        let farm = store.save_farm("u1", profile(1.0)).await.unwrap();
        let a = store.add_activity(activity(&farm)).await.unwrap();
        assert!(!store.delete_activity("u2", a._id.unwrap()).await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_application_conflicts() {
        let store = MemoryStore::new();
        let data = ApplicationFarmData {
            land_size: 1.5,
            crop: Crop::Paddy,
            location: "Thrissur".into(),
        };
        let app = ApplicationDoc::pending("u1", "pm-kisan", "PM-KISAN", data);
        assert_ok!(store.insert_application(app.clone()).await);

        let again = assert_err!(store.insert_application(app).await);
        assert!(matches!(again, SakhiError::Conflict(_)));

        let ids = store.applied_scheme_ids("u1").await.unwrap();
        assert!(ids.contains("pm-kisan"));
        assert!(store.applied_scheme_ids("u2").await.unwrap().is_empty());
        assert!(store.find_application("u1", "pm-kisan").await.unwrap().is_some());
        assert_eq!(store.list_applications("u1", 50).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_alert_feed_ordering_and_read_state() {
        let store = MemoryStore::new();
        let alerts = store
            .insert_alerts(vec![
                AlertDoc::new("u1", AlertType::Irrigation, AlertPriority::Medium, "a", "m"),
                AlertDoc::new("u1", AlertType::Weather, AlertPriority::High, "b", "m"),
                AlertDoc::new("u1", AlertType::Harvest, AlertPriority::Low, "c", "m"),
            ])
            .await
            .unwrap();

        let feed = store
            .list_alerts("u1", &AlertFilter::default(), Page::default())
            .await
            .unwrap();
        let priorities: Vec<_> = feed.items.iter().map(|a| a.priority).collect();
        assert_eq!(
            priorities,
            vec![AlertPriority::High, AlertPriority::Medium, AlertPriority::Low]
        );
        assert_eq!(store.unread_count("u1").await.unwrap(), 3);

        assert!(store.mark_read("u1", alerts[0]._id.unwrap()).await.unwrap());
        assert_eq!(store.unread_count("u1").await.unwrap(), 2);
        assert_eq!(store.mark_all_read("u1").await.unwrap(), 2);
        assert_eq!(store.unread_count("u1").await.unwrap(), 0);

        assert!(store.deactivate_alert("u1", alerts[1]._id.unwrap()).await.unwrap());
        assert!(!store.deactivate_alert("u1", alerts[1]._id.unwrap()).await.unwrap());
        let feed = store
            .list_alerts("u1", &AlertFilter::default(), Page::default())
            .await
            .unwrap();
        assert_eq!(feed.total, 2);
    }

    #[tokio::test]
    async fn test_huge_page_is_empty() {
        let store = MemoryStore::new();
        let farm = store.save_farm("u1", profile(1.0)).await.unwrap();
        store.add_activity(activity(&farm)).await.unwrap();

        let page = store
            .list_activities("u1", Page::new(u64::MAX, 100))
            .await
            .unwrap();
        assert!(page.items.is_empty());
        assert_eq!(page.total, 1);
    }

    #[tokio::test]
    async fn test_listing_board_filters_and_ownership() {
        let store = MemoryStore::new();
        let pepper = store
            .create_listing(listing("pepper", "Kalpetta, Wayanad").into_doc("seller"))
            .await
            .unwrap();
        store
            .create_listing(listing("rubber", "Kottayam").into_doc("seller"))
            .await
            .unwrap();
        store
            .create_listing(listing("pepper", "Idukki").into_doc("other"))
            .await
            .unwrap();

        let board = store
            .list_listings(&ListingFilter::default(), Page::default())
            .await
            .unwrap();
        assert_eq!(board.total, 3);
        assert_eq!(board.items[0].location, "Idukki");

        let filter = ListingFilter {
            crop: Some("pepper".into()),
            district: Some("WAYANAD".into()),
        };
        let board = store.list_listings(&filter, Page::default()).await.unwrap();
        assert_eq!(board.total, 1);
        assert_eq!(board.items[0]._id, pepper._id);

        let id = pepper._id.unwrap();
        let edit = NewListing { expected_price: 700.0, ..listing("pepper", "Wayanad") };
        assert!(store.update_listing("other", id, edit.clone()).await.unwrap().is_none());
        let updated = store.update_listing("seller", id, edit).await.unwrap().unwrap();
        assert_eq!(updated.expected_price, 700.0);
        assert_eq!(updated.user_id, "seller");

        assert!(!store.deactivate_listing("other", id).await.unwrap());
        assert!(store.deactivate_listing("seller", id).await.unwrap());
        assert!(store.active_listing(id).await.unwrap().is_none());
        assert_eq!(store.seller_listings("seller", 50).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_one_inquiry_per_buyer() {
        let store = MemoryStore::new();
        let created = store
            .create_listing(listing("banana", "Kozhikode").into_doc("seller"))
            .await
            .unwrap();
        let id = created._id.unwrap();

        assert_ok!(
            store
                .record_inquiry(InquiryDoc::pending(id, "buyer", "seller"))
                .await
        );
        let again = assert_err!(
            store
                .record_inquiry(InquiryDoc::pending(id, "buyer", "seller"))
                .await
        );
        assert!(matches!(again, SakhiError::Conflict(_)));
        assert_ok!(
            store
                .record_inquiry(InquiryDoc::pending(id, "buyer-2", "seller"))
                .await
        );

        let stored = store.active_listing(id).await.unwrap().unwrap();
        assert_eq!(stored.inquiries, 2);
    }
}
