//! Request admission
//!
//! Fixed-window rate limiting keyed by `(client id, route class)`. Every
//! `/api` request passes through [`AdmissionController::admit`] before its
//! handler runs; a rejection becomes a 429 with `Retry-After`.
//!
//! - [`RateBudget`] / [`BudgetTable`]: per-class capacity and window, fixed at startup
//! - [`WindowTable`]: injectable concurrent map of live windows
//! - [`Clock`]: time source, manual in tests

pub mod budget;
pub mod clock;
pub mod controller;

pub use budget::{BudgetError, BudgetTable, RateBudget, RouteClass, MAX_WINDOW_SECONDS};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use controller::{
    AdmissionController, ClientWindow, Decision, WindowKey, WindowTable,
    DEFAULT_EVICT_AFTER_WINDOWS,
};

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Spawn background task that evicts idle windows to bound memory
pub fn spawn_sweep_task(
    controller: Arc<AdmissionController>,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    info!("Admission sweep task started (every {:?})", every);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // First tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = controller.sweep();
            if removed > 0 {
                debug!(
                    removed,
                    live = controller.windows().len(),
                    "Admission sweep evicted idle windows"
                );
            }
        }
    })
}
