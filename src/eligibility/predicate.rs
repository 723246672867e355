//! Eligibility predicates
//!
//! The predicate set is closed: catalog entries naming anything else parse
//! to [`Criterion::Unknown`], which never holds.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::EligibilityContext;

/// Small-farmer ceiling in land units (inclusive)
pub const SMALL_FARMER_MAX_LAND: f64 = 2.0;

/// Named eligibility rule
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredicateTag {
    Landowner,
    SmallFarmer,
    KeralaResident,
    ActiveFarmer,
    AllFarmers,
    OrganicFarmer,
    CertifiedLand,
}

impl PredicateTag {
    pub const ALL: [PredicateTag; 7] = [
        PredicateTag::Landowner,
        PredicateTag::SmallFarmer,
        PredicateTag::KeralaResident,
        PredicateTag::ActiveFarmer,
        PredicateTag::AllFarmers,
        PredicateTag::OrganicFarmer,
        PredicateTag::CertifiedLand,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PredicateTag::Landowner => "landowner",
            PredicateTag::SmallFarmer => "small_farmer",
            PredicateTag::KeralaResident => "kerala_resident",
            PredicateTag::ActiveFarmer => "active_farmer",
            PredicateTag::AllFarmers => "all_farmers",
            PredicateTag::OrganicFarmer => "organic_farmer",
            PredicateTag::CertifiedLand => "certified_land",
        }
    }

    /// Evaluate this rule against a farmer's context
    pub fn holds(&self, ctx: &EligibilityContext) -> bool {
        match self {
            PredicateTag::Landowner => ctx.land_size_units > 0.0,
            PredicateTag::SmallFarmer => ctx.land_size_units <= SMALL_FARMER_MAX_LAND,
            PredicateTag::KeralaResident => ctx.is_resident,
            PredicateTag::ActiveFarmer => ctx.activity_count > 0,
            PredicateTag::AllFarmers => true,
            PredicateTag::OrganicFarmer => ctx.is_organic_certified,
            PredicateTag::CertifiedLand => ctx.has_land_certification,
        }
    }
}

impl FromStr for PredicateTag {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PredicateTag::ALL
            .into_iter()
            .find(|tag| tag.as_str() == s)
            .ok_or(())
    }
}

impl fmt::Display for PredicateTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry of a scheme's eligibility list as written in the catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Criterion {
    Known(PredicateTag),
    /// Unrecognized tag; always fails
    Unknown(String),
}

impl Criterion {
    pub fn holds(&self, ctx: &EligibilityContext) -> bool {
        match self {
            Criterion::Known(tag) => tag.holds(ctx),
            Criterion::Unknown(_) => false,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Criterion::Known(_))
    }

    pub fn as_str(&self) -> &str {
        match self {
            Criterion::Known(tag) => tag.as_str(),
            Criterion::Unknown(raw) => raw,
        }
    }
}

impl From<PredicateTag> for Criterion {
    fn from(tag: PredicateTag) -> Self {
        Criterion::Known(tag)
    }
}

impl From<String> for Criterion {
    fn from(raw: String) -> Self {
        match raw.parse::<PredicateTag>() {
            Ok(tag) => Criterion::Known(tag),
            Err(()) => Criterion::Unknown(raw),
        }
    }
}

impl From<Criterion> for String {
    fn from(c: Criterion) -> Self {
        match c {
            Criterion::Known(tag) => tag.as_str().to_string(),
            Criterion::Unknown(raw) => raw,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> EligibilityContext {
        EligibilityContext {
            land_size_units: 1.0,
            is_resident: false,
            activity_count: 0,
            is_organic_certified: false,
            has_land_certification: false,
        }
    }

    #[test]
    fn test_tag_names_parse_back() {
        for tag in PredicateTag::ALL {
            assert_eq!(tag.as_str().parse::<PredicateTag>(), Ok(tag));
        }
        assert!("Landowner".parse::<PredicateTag>().is_err());
        assert!("".parse::<PredicateTag>().is_err());
    }

    #[test]
    fn test_land_predicates() {
        let mut c = ctx();
        c.land_size_units = 0.0;
        assert!(!PredicateTag::Landowner.holds(&c));
        assert!(PredicateTag::SmallFarmer.holds(&c));

        c.land_size_units = 2.0;
        assert!(PredicateTag::Landowner.holds(&c));
        assert!(PredicateTag::SmallFarmer.holds(&c));

        c.land_size_units = 2.01;
        assert!(!PredicateTag::SmallFarmer.holds(&c));
    }

    #[test]
    fn test_flag_predicates() {
        let mut c = ctx();
        assert!(!PredicateTag::KeralaResident.holds(&c));
        assert!(!PredicateTag::ActiveFarmer.holds(&c));
        assert!(!PredicateTag::OrganicFarmer.holds(&c));
        assert!(!PredicateTag::CertifiedLand.holds(&c));
        assert!(PredicateTag::AllFarmers.holds(&c));

        c.is_resident = true;
        c.activity_count = 1;
        c.is_organic_certified = true;
        c.has_land_certification = true;
        assert!(PredicateTag::KeralaResident.holds(&c));
        assert!(PredicateTag::ActiveFarmer.holds(&c));
        assert!(PredicateTag::OrganicFarmer.holds(&c));
        assert!(PredicateTag::CertifiedLand.holds(&c));
    }

    #[test]
    fn test_criterion_from_json() {
        let parsed: Vec<Criterion> =
            serde_json::from_str(r#"["landowner", "has_tractor"]"#).unwrap();
        assert_eq!(parsed[0], Criterion::Known(PredicateTag::Landowner));
        assert_eq!(parsed[1], Criterion::Unknown("has_tractor".to_string()));
        assert!(!parsed[1].holds(&ctx()));

        // Unknown tags keep their original spelling on the way out
        let out = serde_json::to_string(&parsed).unwrap();
        assert_eq!(out, r#"["landowner","has_tractor"]"#);
    }
}
