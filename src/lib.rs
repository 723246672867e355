//! Krishi Sakhi - farming assistant gateway
//!
//! HTTP backend for farm profiles, activity logs, alerts and government
//! assistance schemes, backed by MongoDB.
//!
//! ## Components
//!
//! - **Admission**: per-client fixed-window rate limiting by route class
//! - **Eligibility**: pure scheme eligibility over an immutable catalog
//! - **Store**: farm, application and alert persistence (MongoDB or in-memory)
//! - **Routes**: JSON API under `/api`, plus health and version probes

pub mod admission;
pub mod config;
pub mod db;
pub mod eligibility;
pub mod identity;
pub mod routes;
pub mod server;
pub mod store;
pub mod types;

pub use config::Args;
pub use server::{run, AppState};
pub use types::{Result, SakhiError};
