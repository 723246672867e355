//! Scheme application documents
//!
//! At most one application per (user, scheme), enforced by a unique index.

use bson::{doc, oid::ObjectId, DateTime, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::{Crop, Metadata};

pub const APPLICATION_COLLECTION: &str = "scheme_applications";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ApplicationStatus {
    #[default]
    Pending,
    Approved,
    Rejected,
}

/// Farm details captured at application time
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ApplicationFarmData {
    pub land_size: f64,
    pub crop: Crop,
    pub location: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ApplicationDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub user_id: String,
    pub scheme_id: String,
    pub scheme_name: String,
    pub status: ApplicationStatus,
    pub applied_at: DateTime,
    pub farm_data: ApplicationFarmData,
}

impl ApplicationDoc {
    /// New pending application stamped now
    pub fn pending(
        user_id: &str,
        scheme_id: &str,
        scheme_name: &str,
        farm_data: ApplicationFarmData,
    ) -> Self {
        Self {
            _id: None,
            metadata: Metadata::new(),
            user_id: user_id.to_string(),
            scheme_id: scheme_id.to_string(),
            scheme_name: scheme_name.to_string(),
            status: ApplicationStatus::Pending,
            applied_at: DateTime::now(),
            farm_data,
        }
    }
}

impl IntoIndexes for ApplicationDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "user_id": 1, "scheme_id": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("user_scheme_unique".to_string())
                        .build(),
                ),
            ),
            (
                doc! { "user_id": 1, "applied_at": -1 },
                Some(
                    IndexOptions::builder()
                        .name("user_applied_index".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ApplicationDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}
