//! Scheme eligibility
//!
//! Pure decision functions over an immutable scheme catalog. Nothing here
//! performs I/O or holds mutable state, so evaluation needs no locking.
//!
//! Two views:
//! - [`evaluate`]: every scheme whose predicates all hold
//! - [`with_application_status`]: the same list annotated with whether the
//!   farmer has already applied

pub mod catalog;
pub mod predicate;

pub use catalog::SchemeCatalog;
pub use predicate::{Criterion, PredicateTag, SMALL_FARMER_MAX_LAND};

use std::collections::{BTreeSet, HashSet};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Per-evaluation view of a farmer, derived from their farm snapshot
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EligibilityContext {
    pub land_size_units: f64,
    pub is_resident: bool,
    pub activity_count: u64,
    pub is_organic_certified: bool,
    pub has_land_certification: bool,
}

/// Whether a scheme is currently accepting applications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchemeStatus {
    Active,
    Closed,
}

/// Supporting document a scheme asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentTag {
    LandRecords,
    BankAccount,
    Aadhaar,
    ResidenceProof,
    FarmingCertificate,
    SowingCertificate,
    OrganicCertificate,
}

/// Assistance scheme catalog entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scheme {
    pub id: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name_ml: Option<String>,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description_ml: Option<String>,
    /// Benefit in rupees; 0 for premium-based schemes
    pub benefit_amount: u64,
    #[serde(rename = "eligibility")]
    pub eligibility_predicates: Vec<Criterion>,
    pub required_documents: BTreeSet<DocumentTag>,
    pub deadline: NaiveDate,
    pub status: SchemeStatus,
}

impl Scheme {
    /// True iff every predicate holds. An unknown tag fails the scheme.
    pub fn is_eligible(&self, ctx: &EligibilityContext) -> bool {
        self.eligibility_predicates.iter().all(|c| c.holds(ctx))
    }

    pub fn is_active(&self) -> bool {
        self.status == SchemeStatus::Active
    }

    pub fn unknown_predicates(&self) -> impl Iterator<Item = &str> {
        self.eligibility_predicates
            .iter()
            .filter(|c| !c.is_known())
            .map(|c| c.as_str())
    }
}

/// Schemes whose predicates all hold, in catalog order
pub fn evaluate<'a>(context: &EligibilityContext, catalog: &'a [Scheme]) -> Vec<&'a Scheme> {
    catalog.iter().filter(|s| s.is_eligible(context)).collect()
}

/// Annotate evaluated schemes with whether the farmer has applied; order preserved
pub fn with_application_status<'a>(
    evaluated: &[&'a Scheme],
    applied_scheme_ids: &HashSet<String>,
) -> Vec<(&'a Scheme, bool)> {
    evaluated
        .iter()
        .map(|scheme| (*scheme, applied_scheme_ids.contains(&scheme.id)))
        .collect()
}

/// Result of evaluating a possibly missing farm profile
#[derive(Debug, Clone, PartialEq)]
pub enum EligibilityOutcome<'a> {
    Eligible(Vec<&'a Scheme>),
    /// No farm profile yet; nothing can be evaluated
    SetupIncomplete,
}

impl<'a> EligibilityOutcome<'a> {
    pub fn schemes(&self) -> &[&'a Scheme] {
        match self {
            EligibilityOutcome::Eligible(schemes) => schemes,
            EligibilityOutcome::SetupIncomplete => &[],
        }
    }
}

/// Evaluate at the caller boundary, short-circuiting when there is no profile
pub fn eligible_for<'a>(
    context: Option<&EligibilityContext>,
    catalog: &'a [Scheme],
) -> EligibilityOutcome<'a> {
    match context {
        Some(ctx) => EligibilityOutcome::Eligible(evaluate(ctx, catalog)),
        None => EligibilityOutcome::SetupIncomplete,
    }
}
