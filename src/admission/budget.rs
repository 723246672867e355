//! Route classes and their rate budgets
//!
//! Budgets are parsed from `capacity/window` strings such as `30/60`,
//! `30/60s` or `30/minute` so they can be set from CLI flags or env vars.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::Serialize;

/// Endpoint category used as the second half of the rate-limit key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RouteClass {
    /// Plain reads (profile, listings, catalog)
    Read,
    /// Cheap mutations (add activity, mark one alert read)
    Write,
    /// Sensitive or destructive mutations (apply, delete, save profile)
    Submit,
    /// Bulk generation endpoints
    Generate,
}

impl RouteClass {
    pub const ALL: [RouteClass; 4] = [
        RouteClass::Read,
        RouteClass::Write,
        RouteClass::Submit,
        RouteClass::Generate,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RouteClass::Read => "read",
            RouteClass::Write => "write",
            RouteClass::Submit => "submit",
            RouteClass::Generate => "generate",
        }
    }
}

impl fmt::Display for RouteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invalid budget configuration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BudgetError {
    #[error("rate budget capacity must be greater than zero")]
    ZeroCapacity,

    #[error("rate budget window must be at least one second")]
    ZeroWindow,

    #[error("rate budget window of {0}s exceeds the {max}s maximum", max = MAX_WINDOW_SECONDS)]
    WindowTooLong(u64),

    #[error("malformed rate budget '{0}' (expected e.g. 30/60, 30/60s or 30/minute)")]
    Malformed(String),
}

/// Longest accepted window (one day)
pub const MAX_WINDOW_SECONDS: u64 = 24 * 60 * 60;

/// Immutable per-class budget: at most `capacity` requests per window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateBudget {
    capacity: u32,
    window_seconds: u64,
}

impl RateBudget {
    pub fn new(capacity: u32, window_seconds: u64) -> Result<Self, BudgetError> {
        if capacity == 0 {
            return Err(BudgetError::ZeroCapacity);
        }
        if window_seconds == 0 {
            return Err(BudgetError::ZeroWindow);
        }
        if window_seconds > MAX_WINDOW_SECONDS {
            return Err(BudgetError::WindowTooLong(window_seconds));
        }
        Ok(Self {
            capacity,
            window_seconds,
        })
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn window_seconds(&self) -> u64 {
        self.window_seconds
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_seconds)
    }
}

impl FromStr for RateBudget {
    type Err = BudgetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || BudgetError::Malformed(s.to_string());

        let (capacity, window) = s.trim().split_once('/').ok_or_else(malformed)?;
        let capacity: u32 = capacity.trim().parse().map_err(|_| malformed())?;

        let window = window.trim();
        let window_seconds = match window {
            "second" | "sec" | "s" => 1,
            "minute" | "min" | "m" => 60,
            "hour" | "h" => 3600,
            other => other
                .strip_suffix('s')
                .unwrap_or(other)
                .parse::<u64>()
                .map_err(|_| malformed())?,
        };

        Self::new(capacity, window_seconds)
    }
}

impl fmt::Display for RateBudget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}s", self.capacity, self.window_seconds)
    }
}

/// Budget per route class, fixed at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetTable {
    pub read: RateBudget,
    pub write: RateBudget,
    pub submit: RateBudget,
    pub generate: RateBudget,
}

impl BudgetTable {
    pub fn get(&self, class: RouteClass) -> RateBudget {
        match class {
            RouteClass::Read => self.read,
            RouteClass::Write => self.write,
            RouteClass::Submit => self.submit,
            RouteClass::Generate => self.generate,
        }
    }

    /// Same budget for every class (tests and benchmarks)
    pub fn uniform(budget: RateBudget) -> Self {
        Self {
            read: budget,
            write: budget,
            submit: budget,
            generate: budget,
        }
    }
}

impl Default for BudgetTable {
    fn default() -> Self {
        Self {
            read: RateBudget { capacity: 30, window_seconds: 60 },
            write: RateBudget { capacity: 20, window_seconds: 60 },
            submit: RateBudget { capacity: 10, window_seconds: 60 },
            generate: RateBudget { capacity: 5, window_seconds: 60 },
        }
    }
}
