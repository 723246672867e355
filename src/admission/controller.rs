//! Fixed-window admission controller
//!
//! One counter per `(client id, route class)`. The check-and-increment for a
//! key runs under the DashMap shard lock for that key, so concurrent callers
//! can never both observe spare capacity and push the count past it.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;

use super::budget::{BudgetTable, RouteClass};
use super::clock::Clock;

/// Rate-limit key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    pub client_id: String,
    pub class: RouteClass,
}

/// Counter state for one key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientWindow {
    /// Requests admitted in the current window
    pub count: u32,
    /// Start of the current window
    pub window_start: Duration,
    /// Most recent check against this key, used for eviction
    pub last_seen: Duration,
}

impl ClientWindow {
    fn open(now: Duration) -> Self {
        Self {
            count: 0,
            window_start: now,
            last_seen: now,
        }
    }
}

/// Concurrency-safe table of client windows, owned by whoever builds the
/// controller and shared through an `Arc`
#[derive(Debug, Default)]
pub struct WindowTable {
    windows: DashMap<WindowKey, ClientWindow>,
}

impl WindowTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Snapshot of the window for a key
    pub fn get(&self, client_id: &str, class: RouteClass) -> Option<ClientWindow> {
        let key = WindowKey {
            client_id: client_id.to_string(),
            class,
        };
        self.windows.get(&key).map(|w| *w.value())
    }
}

/// Outcome of an admission check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    /// Request may proceed; `remaining` slots are left in this window
    Allowed { remaining: u32 },
    /// Budget exhausted until the window rolls over
    Rejected { retry_after_secs: u64 },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed { .. })
    }
}

/// Default number of idle windows after which a key is evicted
pub const DEFAULT_EVICT_AFTER_WINDOWS: u32 = 2;

/// Per-client, per-route-class request admission
pub struct AdmissionController {
    budgets: BudgetTable,
    windows: Arc<WindowTable>,
    clock: Arc<dyn Clock>,
    evict_after_windows: u32,
}

impl AdmissionController {
    pub fn new(budgets: BudgetTable, windows: Arc<WindowTable>, clock: Arc<dyn Clock>) -> Self {
        Self {
            budgets,
            windows,
            clock,
            evict_after_windows: DEFAULT_EVICT_AFTER_WINDOWS,
        }
    }

    /// Number of whole idle windows before a key may be evicted (minimum 1)
    pub fn with_eviction_threshold(mut self, windows: u32) -> Self {
        self.evict_after_windows = windows.max(1);
        self
    }

    pub fn budgets(&self) -> &BudgetTable {
        &self.budgets
    }

    pub fn windows(&self) -> &WindowTable {
        &self.windows
    }

    /// Check and consume one slot at the injected clock's current instant
    pub fn admit(&self, client_id: &str, class: RouteClass) -> Decision {
        self.check_and_consume(client_id, class, self.clock.now())
    }

    /// Check and consume one slot for `(client_id, class)` at `now`.
    ///
    /// A request arriving exactly at `window_start + window` opens a new
    /// window. Instants earlier than the current window start never move the
    /// window backwards.
    pub fn check_and_consume(&self, client_id: &str, class: RouteClass, now: Duration) -> Decision {
        let budget = self.budgets.get(class);
        let window = budget.window();
        let key = WindowKey {
            client_id: client_id.to_string(),
            class,
        };

        let mut entry = self
            .windows
            .windows
            .entry(key)
            .or_insert_with(|| ClientWindow::open(now));
        let state = entry.value_mut();

        if now >= state.window_start.saturating_add(window) {
            state.count = 0;
            state.window_start = now;
        }
        state.last_seen = state.last_seen.max(now);

        if state.count < budget.capacity() {
            state.count += 1;
            Decision::Allowed {
                remaining: budget.capacity() - state.count,
            }
        } else {
            let wait = state.window_start.saturating_add(window).saturating_sub(now);
            Decision::Rejected {
                retry_after_secs: ceil_secs(wait).max(1),
            }
        }
    }

    /// Remove windows idle for more than the eviction threshold at `now`.
    /// Returns the number of windows removed.
    pub fn evict_stale(&self, now: Duration) -> usize {
        let before = self.windows.len();
        let threshold = self.evict_after_windows;
        let budgets = self.budgets;

        self.windows.windows.retain(|key, state| {
            let idle_limit = budgets.get(key.class).window().saturating_mul(threshold);
            now < state.last_seen.saturating_add(idle_limit)
        });

        before.saturating_sub(self.windows.len())
    }

    /// Evict stale windows at the injected clock's current instant
    pub fn sweep(&self) -> usize {
        self.evict_stale(self.clock.now())
    }
}

fn ceil_secs(d: Duration) -> u64 {
    d.as_secs() + u64::from(d.subsec_nanos() > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::budget::RateBudget;
    use crate::admission::clock::ManualClock;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn controller(capacity: u32, window_seconds: u64) -> AdmissionController {
        let budget = RateBudget::new(capacity, window_seconds).unwrap();
        AdmissionController::new(
            BudgetTable::uniform(budget),
            Arc::new(WindowTable::new()),
            Arc::new(ManualClock::new()),
        )
    }

    #[test]
    fn test_window_created_lazily() {
        let ctl = controller(3, 60);
        assert!(ctl.windows().is_empty());

        ctl.check_and_consume("farmer-1", RouteClass::Read, secs(5));

        let w = ctl.windows().get("farmer-1", RouteClass::Read).unwrap();
        assert_eq!(w.count, 1);
        assert_eq!(w.window_start, secs(5));
        assert!(ctl.windows().get("farmer-1", RouteClass::Write).is_none());
    }

    #[test]
    fn test_remaining_counts_down() {
        let ctl = controller(3, 60);
        assert_eq!(
            ctl.check_and_consume("a", RouteClass::Read, secs(0)),
            Decision::Allowed { remaining: 2 }
        );
        assert_eq!(
            ctl.check_and_consume("a", RouteClass::Read, secs(0)),
            Decision::Allowed { remaining: 1 }
        );
        assert_eq!(
            ctl.check_and_consume("a", RouteClass::Read, secs(0)),
            Decision::Allowed { remaining: 0 }
        );
        assert!(!ctl.check_and_consume("a", RouteClass::Read, secs(0)).is_allowed());
    }

    #[test]
    fn test_rejection_does_not_increment() {
        let ctl = controller(1, 60);
        ctl.check_and_consume("a", RouteClass::Submit, secs(0));
        for _ in 0..10 {
            ctl.check_and_consume("a", RouteClass::Submit, secs(1));
        }
        assert_eq!(ctl.windows().get("a", RouteClass::Submit).unwrap().count, 1);
    }

    #[test]
    fn test_keys_are_isolated() {
        let ctl = controller(1, 60);
        assert!(ctl.check_and_consume("a", RouteClass::Read, secs(0)).is_allowed());
        assert!(!ctl.check_and_consume("a", RouteClass::Read, secs(0)).is_allowed());

        // Different client, same class
        assert!(ctl.check_and_consume("b", RouteClass::Read, secs(0)).is_allowed());
        // Same client, different class
        assert!(ctl.check_and_consume("a", RouteClass::Write, secs(0)).is_allowed());
    }

    #[test]
    fn test_retry_after_rounds_up() {
        let ctl = controller(1, 60);
        ctl.check_and_consume("a", RouteClass::Read, Duration::ZERO);
        let decision = ctl.check_and_consume("a", RouteClass::Read, Duration::from_millis(59_500));
        assert_eq!(decision, Decision::Rejected { retry_after_secs: 1 });

        let decision = ctl.check_and_consume("a", RouteClass::Read, Duration::from_millis(10_250));
        assert_eq!(decision, Decision::Rejected { retry_after_secs: 50 });
    }

    #[test]
    fn test_earlier_instant_does_not_move_window_back() {
        let ctl = controller(2, 60);
        ctl.check_and_consume("a", RouteClass::Read, secs(100));
        ctl.check_and_consume("a", RouteClass::Read, secs(90));

        let w = ctl.windows().get("a", RouteClass::Read).unwrap();
        assert_eq!(w.window_start, secs(100));
        assert_eq!(w.last_seen, secs(100));
        assert_eq!(w.count, 2);
    }

    #[test]
    fn test_uses_injected_clock() {
        let clock = Arc::new(ManualClock::new());
        let ctl = AdmissionController::new(
            BudgetTable::uniform(RateBudget::new(1, 60).unwrap()),
            Arc::new(WindowTable::new()),
            clock.clone(),
        );

        assert!(ctl.admit("a", RouteClass::Read).is_allowed());
        clock.advance(secs(30));
        assert_eq!(
            ctl.admit("a", RouteClass::Read),
            Decision::Rejected { retry_after_secs: 30 }
        );
        clock.advance(secs(30));
        assert!(ctl.admit("a", RouteClass::Read).is_allowed());
    }

    #[test]
    fn test_evict_stale_windows() {
        let ctl = controller(5, 60).with_eviction_threshold(2);
        ctl.check_and_consume("idle", RouteClass::Read, secs(0));
        ctl.check_and_consume("busy", RouteClass::Read, secs(0));
        ctl.check_and_consume("busy", RouteClass::Read, secs(100));

        // idle last seen at 0: evictable from 120s; busy last seen at 100
        assert_eq!(ctl.evict_stale(secs(119)), 0);
        assert_eq!(ctl.evict_stale(secs(120)), 1);
        assert!(ctl.windows().get("idle", RouteClass::Read).is_none());
        assert!(ctl.windows().get("busy", RouteClass::Read).is_some());

        assert_eq!(ctl.evict_stale(secs(220)), 1);
        assert!(ctl.windows().is_empty());
    }

    #[test]
    fn test_eviction_respects_per_class_windows() {
        let budgets = BudgetTable {
            read: RateBudget::new(10, 10).unwrap(),
            write: RateBudget::new(10, 100).unwrap(),
            submit: RateBudget::new(10, 100).unwrap(),
            generate: RateBudget::new(10, 100).unwrap(),
        };
        let ctl = AdmissionController::new(
            budgets,
            Arc::new(WindowTable::new()),
            Arc::new(ManualClock::new()),
        )
        .with_eviction_threshold(1);

        ctl.check_and_consume("a", RouteClass::Read, secs(0));
        ctl.check_and_consume("a", RouteClass::Write, secs(0));

        assert_eq!(ctl.evict_stale(secs(50)), 1);
        assert!(ctl.windows().get("a", RouteClass::Write).is_some());
    }

    #[test]
    fn test_longest_window_near_clock_limit() {
        let ctl = controller(1, crate::admission::MAX_WINDOW_SECONDS)
            .with_eviction_threshold(u32::MAX);
        let late = Duration::MAX - secs(10);

        assert!(ctl.check_and_consume("a", RouteClass::Read, late).is_allowed());
        let decision = ctl.check_and_consume("a", RouteClass::Read, late + secs(1));
        assert!(matches!(decision, Decision::Rejected { retry_after_secs } if retry_after_secs >= 1));
        assert_eq!(ctl.evict_stale(late + secs(2)), 0);
    }

    #[test]
    fn test_concurrent_callers_never_exceed_capacity() {
        let ctl = Arc::new(controller(50, 60));
        let allowed = std::sync::atomic::AtomicU32::new(0);

        std::thread::scope(|scope| {
            for _ in 0..16 {
                let ctl = Arc::clone(&ctl);
                let allowed = &allowed;
                scope.spawn(move || {
                    for _ in 0..100 {
                        if ctl.check_and_consume("shared", RouteClass::Read, secs(1)).is_allowed() {
                            allowed.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                        }
                    }
                });
            }
        });

        assert_eq!(allowed.load(std::sync::atomic::Ordering::SeqCst), 50);
        assert_eq!(ctl.windows().get("shared", RouteClass::Read).unwrap().count, 50);
    }
}
