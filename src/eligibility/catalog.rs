//! Scheme catalog loading
//!
//! The catalog is read once at startup, either from the embedded default or
//! from a JSON file, and shared read-only afterwards.

use std::collections::HashSet;
use std::ops::Deref;
use std::path::Path;

use tracing::{info, warn};

use super::Scheme;
use crate::types::{Result, SakhiError};

const DEFAULT_CATALOG: &str = include_str!("schemes.json");

/// Immutable, ordered list of schemes
#[derive(Debug, Clone)]
pub struct SchemeCatalog {
    schemes: Vec<Scheme>,
}

impl SchemeCatalog {
    /// Catalog shipped with the binary
    pub fn builtin() -> Result<Self> {
        Self::from_json(DEFAULT_CATALOG)
    }

    /// Load a catalog from a JSON file
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            SakhiError::Config(format!("Failed to read scheme catalog {}: {}", path.display(), e))
        })?;
        let catalog = Self::from_json(&raw)?;
        info!("Loaded {} schemes from {}", catalog.len(), path.display());
        Ok(catalog)
    }

    /// Parse and validate a JSON array of schemes
    pub fn from_json(raw: &str) -> Result<Self> {
        let schemes: Vec<Scheme> = serde_json::from_str(raw)
            .map_err(|e| SakhiError::Config(format!("Invalid scheme catalog: {}", e)))?;
        Self::new(schemes)
    }

    pub fn new(schemes: Vec<Scheme>) -> Result<Self> {
        let mut seen = HashSet::new();
        for scheme in &schemes {
            if scheme.id.trim().is_empty() {
                return Err(SakhiError::Config("Scheme with empty id in catalog".into()));
            }
            if !seen.insert(scheme.id.as_str()) {
                return Err(SakhiError::Config(format!(
                    "Duplicate scheme id '{}' in catalog",
                    scheme.id
                )));
            }
            for tag in scheme.unknown_predicates() {
                warn!(
                    scheme = %scheme.id,
                    predicate = tag,
                    "Unknown eligibility predicate; scheme will never be eligible"
                );
            }
        }

        Ok(Self { schemes })
    }

    pub fn find(&self, id: &str) -> Option<&Scheme> {
        self.schemes.iter().find(|s| s.id == id)
    }

    pub fn schemes(&self) -> &[Scheme] {
        &self.schemes
    }
}

impl Deref for SchemeCatalog {
    type Target = [Scheme];

    fn deref(&self) -> &Self::Target {
        &self.schemes
    }
}
