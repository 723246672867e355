//! Configuration for Krishi Sakhi
//!
//! CLI arguments and environment variable handling using clap.

use clap::{Parser, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::admission::{BudgetTable, RateBudget};

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Development,
    Production,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Krishi Sakhi - farming assistant gateway
#[derive(Parser, Debug, Clone)]
#[command(name = "krishi-sakhi")]
#[command(about = "Farming assistant gateway with request admission and scheme eligibility")]
pub struct Args {
    /// Unique node identifier for this instance
    #[arg(long, env = "NODE_ID", default_value_t = Uuid::new_v4())]
    pub node_id: Uuid,

    /// Address to listen on
    #[arg(long, env = "LISTEN", default_value = "0.0.0.0:8000")]
    pub listen: SocketAddr,

    /// Deployment environment; error details are only exposed in development
    #[arg(long, env = "ENVIRONMENT", value_enum, default_value = "development")]
    pub environment: Environment,

    /// Fall back to the in-memory store when MongoDB is unreachable
    #[arg(long, env = "DEV_MODE", default_value = "false")]
    pub dev_mode: bool,

    /// MongoDB connection URI
    #[arg(long, env = "MONGODB_URI", default_value = "mongodb://localhost:27017")]
    pub mongodb_uri: String,

    /// MongoDB database name
    #[arg(long, env = "MONGODB_DB", default_value = "krishi-sakhi")]
    pub mongodb_db: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value = "text")]
    pub log_format: LogFormat,

    /// JSON scheme catalog replacing the built-in one
    #[arg(long, env = "SCHEMES_FILE")]
    pub schemes_file: Option<PathBuf>,

    #[command(flatten)]
    pub budgets: BudgetArgs,

    /// Value for Access-Control-Allow-Origin
    #[arg(long, env = "ALLOWED_ORIGINS", default_value = "*")]
    pub allowed_origins: String,
}

/// Admission budgets, each `capacity/window` (e.g. `30/60`, `30/minute`)
#[derive(Parser, Debug, Clone)]
pub struct BudgetArgs {
    #[arg(long, env = "BUDGET_READ", default_value = "30/60")]
    pub budget_read: RateBudget,

    #[arg(long, env = "BUDGET_WRITE", default_value = "20/60")]
    pub budget_write: RateBudget,

    #[arg(long, env = "BUDGET_SUBMIT", default_value = "10/60")]
    pub budget_submit: RateBudget,

    #[arg(long, env = "BUDGET_GENERATE", default_value = "5/60")]
    pub budget_generate: RateBudget,

    /// Windows a key may sit idle before the sweeper evicts it
    #[arg(long, env = "ADMISSION_EVICT_AFTER_WINDOWS", default_value = "2")]
    pub evict_after_windows: u32,

    /// Seconds between eviction sweeps
    #[arg(long, env = "ADMISSION_SWEEP_SECS", default_value = "60")]
    pub sweep_secs: u64,
}

impl Args {
    pub fn is_development(&self) -> bool {
        self.environment == Environment::Development
    }

    pub fn budget_table(&self) -> BudgetTable {
        BudgetTable {
            read: self.budgets.budget_read,
            write: self.budgets.budget_write,
            submit: self.budgets.budget_submit,
            generate: self.budgets.budget_generate,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.budgets.sweep_secs)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.budgets.evict_after_windows == 0 {
            return Err("ADMISSION_EVICT_AFTER_WINDOWS must be at least 1".to_string());
        }
        if self.budgets.sweep_secs == 0 {
            return Err("ADMISSION_SWEEP_SECS must be at least 1".to_string());
        }
        if self.mongodb_db.trim().is_empty() {
            return Err("MONGODB_DB must not be empty".to_string());
        }
        if self.allowed_origins.trim().is_empty() {
            return Err("ALLOWED_ORIGINS must not be empty".to_string());
        }
        if self.dev_mode && self.environment == Environment::Production {
            return Err("DEV_MODE cannot be enabled in production".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Args {
        let mut argv = vec!["krishi-sakhi"];
        argv.extend_from_slice(args);
        Args::parse_from(argv)
    }

    #[test]
    fn test_default_budgets() {
        let args = parse(&[]);
        assert_eq!(args.budget_table(), BudgetTable::default());
        assert!(args.validate().is_ok());
    }

    #[test]
    fn test_budget_flags() {
        let args = parse(&["--budget-read", "100/minute", "--budget-generate", "1/3600s"]);
        let table = args.budget_table();
        assert_eq!(table.read.capacity(), 100);
        assert_eq!(table.read.window_seconds(), 60);
        assert_eq!(table.generate.window_seconds(), 3600);
    }

    #[test]
    fn test_rejects_zero_budget() {
        let argv = ["krishi-sakhi", "--budget-submit", "0/60"];
        assert!(Args::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_rejects_unbounded_window() {
        let argv = ["krishi-sakhi", "--budget-read", "1/18446744073709551615"];
        assert!(Args::try_parse_from(argv).is_err());
    }

    #[test]
    fn test_dev_mode_not_allowed_in_production() {
        let args = parse(&["--environment", "production", "--dev-mode"]);
        assert!(args.validate().is_err());
        assert!(!args.is_development());
    }

    #[test]
    fn test_zero_eviction_threshold_invalid() {
        let args = parse(&["--evict-after-windows", "0"]);
        assert!(args.validate().is_err());
    }
}
