//! Common metadata for all documents
//!
//! Creation/update timestamps and the soft-delete flag.

use bson::DateTime;
use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug, Default, PartialEq)]
pub struct Metadata {
    #[serde(default)]
    pub is_deleted: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime>,
}

impl Metadata {
    /// Fresh metadata stamped with the current time
    pub fn new() -> Self {
        let now = DateTime::now();
        Self {
            is_deleted: false,
            deleted_at: None,
            updated_at: Some(now),
            created_at: Some(now),
        }
    }

    /// Creation time for API output
    pub fn created_rfc3339(&self) -> Option<String> {
        self.created_at.map(to_rfc3339)
    }

    pub fn updated_rfc3339(&self) -> Option<String> {
        self.updated_at.map(to_rfc3339)
    }

    /// Mark as deleted now
    pub fn delete(&mut self) {
        let now = DateTime::now();
        self.is_deleted = true;
        self.deleted_at = Some(now);
        self.updated_at = Some(now);
    }

    pub fn touch(&mut self) {
        self.updated_at = Some(DateTime::now());
    }
}

/// Render a BSON datetime as RFC 3339
pub fn to_rfc3339(dt: DateTime) -> String {
    dt.to_chrono().to_rfc3339()
}
