//! Integration tests for the `forever` and `timeout` acquisition protocols

mod common;

use admission_gate::{
    unlimited, CancelCause, CancelSignal, CancelSource, Enforced, Gate, GateError,
};
use std::time::{Duration, Instant};

struct Jobs;
struct Reports;

fn run_job(_proof: &impl Enforced<Jobs>) -> &'static str {
    "ran"
}

#[compio::test]
async fn test_timeout_zero_rejects_when_full() {
    let gate = Gate::<Jobs>::new(1);
    let held = gate.forever(&CancelSignal::never()).await;
    assert!(held.is_admitted());

    let start = Instant::now();
    let err = gate
        .timeout(&CancelSignal::never(), Duration::ZERO)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        GateError::Timeout { timeout, capacity: 1 } if timeout.is_zero()
    ));
    assert!(start.elapsed() < Duration::from_millis(100));
    assert_eq!(gate.in_use(), 1);
}

#[compio::test]
async fn test_timeout_waits_full_duration_before_rejecting() {
    let gate = Gate::<Jobs>::new(1);
    let _held = gate.forever(&CancelSignal::never()).await;

    let start = Instant::now();
    let err = gate
        .timeout(&CancelSignal::never(), Duration::from_millis(50))
        .await
        .unwrap_err();

    assert!(err.is_timeout());
    assert!(start.elapsed() >= Duration::from_millis(50));
    assert!(err.to_string().contains("50ms"));
}

#[compio::test]
async fn test_timeout_succeeds_when_slot_frees_in_time() {
    let _guard = common::hang_guard(Duration::from_secs(30));
    let gate = Gate::<Jobs>::new(1);
    let held = gate.forever(&CancelSignal::never()).await;

    let releaser = compio::runtime::spawn(async move {
        compio::time::sleep(Duration::from_millis(20)).await;
        held.release();
    });

    let permit = gate
        .timeout(&CancelSignal::never(), Duration::from_secs(5))
        .await
        .unwrap();
    assert!(permit.is_admitted());
    assert_eq!(gate.in_use(), 1);

    releaser.await.unwrap();
    permit.release();
    assert_eq!(gate.in_use(), 0);
}

#[compio::test]
async fn test_forever_with_fired_signal_returns_noop_permit() {
    let gate = Gate::<Jobs>::new(1);
    let _held = gate.forever(&CancelSignal::never()).await;
    let source = CancelSource::new();
    source.cancel();

    let start = Instant::now();
    let permit = gate.forever(&source.signal()).await;

    assert!(!permit.is_admitted());
    assert!(start.elapsed() < Duration::from_millis(100));
    permit.release();
    assert_eq!(gate.in_use(), 1);
}

#[compio::test]
async fn test_forever_returns_noop_when_cancelled_mid_wait() {
    let _guard = common::hang_guard(Duration::from_secs(30));
    let gate = Gate::<Jobs>::new(1);
    let _held = gate.forever(&CancelSignal::never()).await;
    let source = CancelSource::with_timeout(Duration::from_millis(30));

    let permit = gate.forever(&source.signal()).await;

    assert!(!permit.is_admitted());
    assert!(matches!(
        source.signal().cause(),
        Some(CancelCause::DeadlineExceeded)
    ));
    drop(permit);
    assert_eq!(gate.in_use(), 1);
}

#[compio::test]
async fn test_timeout_reports_cancellation_cause() {
    let _guard = common::hang_guard(Duration::from_secs(30));
    let gate = Gate::<Jobs>::new(2);
    let _a = gate.forever(&CancelSignal::never()).await;
    let _b = gate.forever(&CancelSignal::never()).await;

    let source = CancelSource::new();
    let canceller = source.clone();
    let handle = compio::runtime::spawn(async move {
        compio::time::sleep(Duration::from_millis(10)).await;
        canceller.cancel_with(CancelCause::Other(std::sync::Arc::new(
            std::io::Error::new(std::io::ErrorKind::Interrupted, "shutdown requested"),
        )));
    });

    let err = gate
        .timeout(&source.signal(), Duration::from_secs(3600))
        .await
        .unwrap_err();
    handle.await.unwrap();

    assert!(err.is_cancelled());
    assert!(err.to_string().contains("of 2 slots"));
    assert_eq!(
        err.cancel_cause().map(ToString::to_string).as_deref(),
        Some("shutdown requested")
    );
    assert_eq!(gate.in_use(), 2);
}

#[compio::test]
async fn test_release_allows_exactly_one_more() {
    let gate = Gate::<Jobs>::new(3);
    let never = CancelSignal::never();

    let mut permits = Vec::new();
    for _ in 0..3 {
        permits.push(gate.timeout(&never, Duration::ZERO).await.unwrap());
    }
    assert!(gate.timeout(&never, Duration::ZERO).await.is_err());

    permits.pop().unwrap().release();
    assert_eq!(gate.in_use(), 2);

    permits.push(gate.timeout(&never, Duration::ZERO).await.unwrap());
    assert!(gate.timeout(&never, Duration::ZERO).await.is_err());
    assert_eq!(gate.in_use(), 3);
}

#[compio::test]
async fn test_zero_capacity_gate_admits_nobody() {
    let gate = Gate::<Jobs>::new(0);

    let err = gate
        .timeout(&CancelSignal::never(), Duration::ZERO)
        .await
        .unwrap_err();
    assert!(matches!(err, GateError::Timeout { capacity: 0, .. }));

    let source = CancelSource::with_timeout(Duration::from_millis(10));
    let permit = gate.forever(&source.signal()).await;
    assert!(!permit.is_admitted());
    assert_eq!(gate.in_use(), 0);
}

#[compio::test]
async fn test_permit_satisfies_proof_requirement() {
    let gate = Gate::<Jobs>::new(1);
    let permit = gate.forever(&CancelSignal::never()).await;

    assert_eq!(run_job(&permit), "ran");
    permit.release();
}

#[compio::test]
async fn test_unlimited_never_touches_a_gate() {
    let jobs = Gate::<Jobs>::new(1);
    let reports = Gate::<Reports>::new(1);

    let bypass = unlimited::<Jobs>();
    assert_eq!(run_job(&bypass), "ran");
    assert_eq!(run_job(&bypass), "ran");

    assert_eq!(jobs.in_use(), 0);
    assert_eq!(reports.in_use(), 0);
}

#[compio::test]
async fn test_waiters_drain_after_release() {
    let _guard = common::hang_guard(Duration::from_secs(30));
    let gate = Gate::<Jobs>::new(1);
    let held = gate.forever(&CancelSignal::never()).await;

    let mut handles = Vec::new();
    for _ in 0..5 {
        let gate = gate.clone();
        handles.push(compio::runtime::spawn(async move {
            let permit = gate.forever(&CancelSignal::never()).await;
            assert!(permit.is_admitted());
            compio::time::sleep(Duration::from_millis(1)).await;
            permit.release();
        }));
    }

    // A cancelled waiter must not swallow the wakeup meant for the others
    let impatient = gate.clone();
    let source = CancelSource::with_timeout(Duration::from_millis(5));
    let cancelled = compio::runtime::spawn(async move {
        impatient.forever(&source.signal()).await.is_admitted()
    });

    compio::time::sleep(Duration::from_millis(10)).await;
    held.release();

    for handle in handles {
        handle.await.unwrap();
    }
    assert!(!cancelled.await.unwrap());
    assert_eq!(gate.in_use(), 0);
}
