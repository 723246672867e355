//! Market listing and inquiry documents
//!
//! Listings are deactivated rather than removed. Each buyer may inquire
//! about a listing once, enforced by a unique index on the inquiry.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

pub const LISTING_COLLECTION: &str = "market_listings";
pub const INQUIRY_COLLECTION: &str = "listing_inquiries";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ListingQuality {
    Premium,
    #[default]
    Good,
    Average,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum InquiryStatus {
    #[default]
    Pending,
    Contacted,
    Closed,
}

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ListingDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    /// Seller; also the contact handed to buyers who inquire
    pub user_id: String,
    pub crop: String,
    pub quantity: f64,
    pub unit: String,
    pub expected_price: f64,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub harvest_date: Option<chrono::NaiveDate>,
    #[serde(default)]
    pub quality: ListingQuality,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub inquiries: u64,
    #[serde(default)]
    pub is_active: bool,
}

impl IntoIndexes for ListingDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "is_active": 1, "crop": 1, "metadata.created_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("active_crop_index".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "user_id": 1, "is_active": 1 },
                Some(
                    IndexOptions::builder()
                        .name("seller_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ListingDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct InquiryDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub listing_id: ObjectId,
    pub inquirer_id: String,
    pub listing_owner_id: String,
    #[serde(default)]
    pub status: InquiryStatus,
}

impl InquiryDoc {
    pub fn pending(listing: ObjectId, inquirer_id: &str, owner_id: &str) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            listing_id: listing,
            inquirer_id: inquirer_id.to_string(),
            listing_owner_id: owner_id.to_string(),
            status: InquiryStatus::Pending,
        }
    }
}

impl IntoIndexes for InquiryDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "listing_id": 1, "inquirer_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("listing_inquirer_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for InquiryDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
