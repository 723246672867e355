//! Admission controller behaviour through the public API

use std::sync::Arc;
use std::time::Duration;

use krishi_sakhi::admission::{
    AdmissionController, BudgetTable, Clock, Decision, ManualClock, RateBudget, RouteClass,
    WindowTable,
};

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

fn controller(capacity: u32, window: u64) -> AdmissionController {
    let budgets = BudgetTable::uniform(RateBudget::new(capacity, window).unwrap());
    AdmissionController::new(
        budgets,
        Arc::new(WindowTable::new()),
        Arc::new(ManualClock::new()),
    )
}

#[test]
fn five_per_minute_scenario() {
    let admission = controller(5, 60);

    for i in 0..5 {
        let decision = admission.check_and_consume("9876543210", RouteClass::Generate, secs(0));
        assert_eq!(decision, Decision::Allowed { remaining: 4 - i });
    }

    assert_eq!(
        admission.check_and_consume("9876543210", RouteClass::Generate, secs(10)),
        Decision::Rejected { retry_after_secs: 50 }
    );

    assert_eq!(
        admission.check_and_consume("9876543210", RouteClass::Generate, secs(61)),
        Decision::Allowed { remaining: 4 }
    );
    let window = admission
        .windows()
        .get("9876543210", RouteClass::Generate)
        .unwrap();
    assert_eq!(window.window_start, secs(61));
    assert_eq!(window.count, 1);
}

#[test]
fn never_admits_more_than_capacity_per_window() {
    for capacity in [1u32, 3, 10, 30] {
        let admission = controller(capacity, 60);
        let allowed = (0..capacity * 3)
            .map(|i| {
                // Spread calls across the first 59 seconds of the window
                let at = Duration::from_millis(u64::from(i) * 59_000 / u64::from(capacity * 3));
                admission.check_and_consume("c", RouteClass::Read, at)
            })
            .filter(Decision::is_allowed)
            .count();
        assert_eq!(allowed, capacity as usize);
    }
}

#[test]
fn boundary_instant_opens_new_window() {
    let admission = controller(1, 60);
    assert!(admission.check_and_consume("c", RouteClass::Read, secs(5)).is_allowed());
    assert!(!admission
        .check_and_consume("c", RouteClass::Read, Duration::from_millis(64_999))
        .is_allowed());
    assert!(admission.check_and_consume("c", RouteClass::Read, secs(65)).is_allowed());
}

#[test]
fn retry_after_is_at_least_one_second() {
    let admission = controller(1, 60);
    admission.check_and_consume("c", RouteClass::Submit, secs(0));
    let decision =
        admission.check_and_consume("c", RouteClass::Submit, Duration::from_millis(59_999));
    assert_eq!(decision, Decision::Rejected { retry_after_secs: 1 });
}

#[test]
fn classes_and_clients_have_independent_budgets() {
    let admission = controller(1, 60);
    assert!(admission.check_and_consume("a", RouteClass::Read, secs(0)).is_allowed());
    assert!(admission.check_and_consume("a", RouteClass::Write, secs(0)).is_allowed());
    assert!(admission.check_and_consume("b", RouteClass::Read, secs(0)).is_allowed());
    assert!(!admission.check_and_consume("a", RouteClass::Read, secs(1)).is_allowed());
    assert_eq!(admission.windows().len(), 3);
}

#[test]
fn default_budget_table_per_class() {
    let clock = Arc::new(ManualClock::new());
    let admission = AdmissionController::new(
        BudgetTable::default(),
        Arc::new(WindowTable::new()),
        clock.clone(),
    );

    let allowed = |class| {
        (0..100)
            .filter(|_| admission.admit("c", class).is_allowed())
            .count()
    };
    assert_eq!(allowed(RouteClass::Read), 30);
    assert_eq!(allowed(RouteClass::Write), 20);
    assert_eq!(allowed(RouteClass::Submit), 10);
    assert_eq!(allowed(RouteClass::Generate), 5);

    clock.advance(secs(60));
    assert_eq!(clock.now(), secs(60));
    assert!(admission.admit("c", RouteClass::Generate).is_allowed());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_tasks_share_one_budget() {
    let admission = Arc::new(controller(25, 60));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let admission = Arc::clone(&admission);
        handles.push(tokio::spawn(async move {
            let mut allowed = 0;
            for _ in 0..20 {
                if admission.admit("shared", RouteClass::Write).is_allowed() {
                    allowed += 1;
                }
                tokio::task::yield_now().await;
            }
            allowed
        }));
    }

    let mut total = 0;
    for handle in handles {
        total += handle.await.unwrap();
    }
    assert_eq!(total, 25);
}

#[test]
fn sweep_evicts_only_idle_windows() {
    let clock = Arc::new(ManualClock::new());
    let admission = AdmissionController::new(
        BudgetTable::uniform(RateBudget::new(5, 60).unwrap()),
        Arc::new(WindowTable::new()),
        clock.clone(),
    );

    admission.admit("idle", RouteClass::Read);
    clock.set(secs(100));
    admission.admit("busy", RouteClass::Read);

    clock.set(secs(120));
    assert_eq!(admission.sweep(), 1);
    assert!(admission.windows().get("idle", RouteClass::Read).is_none());
    assert!(admission.windows().get("busy", RouteClass::Read).is_some());
}
