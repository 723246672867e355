//! Farm profile and activity documents

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;

pub const FARM_COLLECTION: &str = "farms";
pub const ACTIVITY_COLLECTION: &str = "activities";

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LandUnit {
    #[default]
    Cents,
    Hectares,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Crop {
    #[default]
    Paddy,
    Coconut,
    Rubber,
    Banana,
    Brinjal,
    Pepper,
    Cardamom,
    Ginger,
    Turmeric,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SoilType {
    #[default]
    Laterite,
    Alluvial,
    Coastal,
    Forest,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

/// Farm profile document, one active profile per user
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct FarmDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub user_id: String,
    pub name: String,
    pub location: String,
    pub land_size: f64,
    pub land_unit: LandUnit,
    pub current_crop: Crop,
    pub soil_type: SoilType,
    #[serde(default)]
    pub irrigation: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coordinates: Option<Coordinates>,

    /// Residency in the served state; every registered farmer is assumed resident
    #[serde(default = "default_true")]
    pub is_resident: bool,
    #[serde(default)]
    pub organic_certified: bool,
    #[serde(default)]
    pub land_certified: bool,

    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl IntoIndexes for FarmDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "user_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("user_id_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for FarmDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum ActivityType {
    #[default]
    SowedSeeds,
    AppliedFertilizer,
    Irrigated,
    PestDisease,
    Weeding,
    Harvested,
}

/// Logged farm activity
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ActivityDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub user_id: String,
    pub farm_id: ObjectId,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub crop: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    pub location: String,
}

impl IntoIndexes for ActivityDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "user_id": 1, "metadata.created_at": -1 },
            Some(
                IndexOptions::builder()
                    .name("user_recent_index".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for ActivityDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_farm_defaults_when_fields_missing() {
        let raw = doc! {
            "user_id": "9876543210",
            "name": "Thottam",
            "location": "Thrissur",
            "land_size": 1.5,
            "land_unit": "hectares",
            "current_crop": "paddy",
            "soil_type": "alluvial",
        };
        let farm: FarmDoc = bson::from_document(raw).unwrap();
        assert!(farm.is_resident);
        assert!(farm.is_active);
        assert!(!farm.organic_certified);
        assert!(!farm.irrigation);
        assert_eq!(farm.land_unit, LandUnit::Hectares);
    }

    #[test]
    fn test_activity_type_wire_names() {
        assert_eq!(
            serde_json::to_string(&ActivityType::AppliedFertilizer).unwrap(),
            r#""appliedFertilizer""#
        );
        assert!(serde_json::from_str::<ActivityType>(r#""dancing""#).is_err());
    }
}
