//! Database schemas
//!
//! MongoDB document structures for farms, activities, scheme applications,
//! alerts and market listings.

mod alert;
mod application;
mod farm;
mod listing;
mod metadata;

pub use alert::{AlertDoc, AlertPriority, AlertType, ALERT_COLLECTION, ALERT_TTL_DAYS};
pub use application::{
    ApplicationDoc, ApplicationFarmData, ApplicationStatus, APPLICATION_COLLECTION,
};
pub use farm::{
    ActivityDoc, ActivityType, Coordinates, Crop, FarmDoc, LandUnit, SoilType,
    ACTIVITY_COLLECTION, FARM_COLLECTION,
};
pub use listing::{
    InquiryDoc, InquiryStatus, ListingDoc, ListingQuality, INQUIRY_COLLECTION, LISTING_COLLECTION,
};
pub use metadata::{to_rfc3339, Metadata};
