//! Alert documents

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::{Crop, Metadata};

pub const ALERT_COLLECTION: &str = "alerts";

/// Alerts expire a week after creation
pub const ALERT_TTL_DAYS: i64 = 7;

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AlertType {
    Weather,
    Price,
    Scheme,
    Irrigation,
    Pest,
    Fertilizer,
    Harvest,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AlertPriority {
    High,
    Medium,
    Low,
}

impl AlertPriority {
    /// Sort key, most urgent first
    pub fn rank(&self) -> i32 {
        match self {
            AlertPriority::High => 1,
            AlertPriority::Medium => 2,
            AlertPriority::Low => 3,
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct AlertDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub user_id: String,
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    pub priority: AlertPriority,
    /// Stored alongside `priority` so the database can sort on it
    pub priority_rank: i32,
    pub title: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crop: Option<Crop>,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    pub expires_at: DateTime,
}

fn default_true() -> bool {
    true
}

impl AlertDoc {
    pub fn new(
        user_id: &str,
        alert_type: AlertType,
        priority: AlertPriority,
        title: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let expires = chrono::Utc::now() + chrono::Duration::days(ALERT_TTL_DAYS);
        Self {
            _id: None,
            metadata: Metadata::new(),
            user_id: user_id.to_string(),
            alert_type,
            priority,
            priority_rank: priority.rank(),
            title: title.into(),
            message: message.into(),
            location: None,
            crop: None,
            is_read: false,
            is_active: true,
            expires_at: DateTime::from_chrono(expires),
        }
    }

    pub fn at(mut self, location: &str, crop: Crop) -> Self {
        self.location = Some(location.to_string());
        self.crop = Some(crop);
        self
    }
}

impl IntoIndexes for AlertDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "user_id": 1, "is_active": 1, "priority_rank": 1, "metadata.created_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("user_feed_index".to_string())
                        .build(),
                ),
            ),
            // Expired alerts are removed by MongoDB
            (
                doc! { "expires_at": 1 },
                Some(
                    IndexOptions::builder()
                        .expire_after(std::time::Duration::from_secs(0))
                        .name("expires_at_ttl".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for AlertDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_alert_defaults() {
        let alert = AlertDoc::new("u1", AlertType::Pest, AlertPriority::Medium, "Pest Alert", "Check trees")
            .at("Kozhikode", Crop::Coconut);
        assert_eq!(alert.priority_rank, 2);
        assert!(alert.is_active);
        assert!(!alert.is_read);
        assert_eq!(alert.crop, Some(Crop::Coconut));
        assert!(alert.expires_at > DateTime::now());
    }

    #[test]
    fn test_priority_rank_orders_urgent_first() {
        let mut ps = vec![AlertPriority::Low, AlertPriority::High, AlertPriority::Medium];
        ps.sort_by_key(|p| p.rank());
        assert_eq!(ps, vec![AlertPriority::High, AlertPriority::Medium, AlertPriority::Low]);
    }
}
