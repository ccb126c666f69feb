//! Many threads, one gate: occupancy must never exceed capacity

mod common;

use admission_gate::stress::{self, StressConfig};
use rstest::rstest;
use std::time::Duration;

#[rstest]
#[case::silent(None, Duration::from_micros(10))]
#[case::verbose(Some(Duration::from_millis(1)), Duration::from_millis(2))]
fn test_gate_holds_under_contention(#[case] stuck_timeout: Option<Duration>, #[case] hold: Duration) {
    let _guard = common::hang_guard(Duration::from_secs(60));
    let config = StressConfig {
        capacity: 10,
        callers: 1000,
        threads: 4,
        hold,
        patience: Duration::from_secs(2),
        stuck_timeout,
    };

    let report = stress::run(&config).unwrap();

    assert_eq!(report.violations, 0, "in-flight exceeded capacity");
    assert!(report.peak_in_flight <= config.capacity);
    assert!(report.peak_in_flight > 0);
    assert_eq!(report.leaked, 0, "slots left held after the run");
    assert_eq!(report.patient_failures, 0, "patient callers gave up");

    assert_ne!(report.immediate_successes, 0, "timeout(0) never succeeded");
    assert_ne!(report.immediate_timeouts, 0, "timeout(0) never failed");

    if stuck_timeout.is_some() {
        assert_ne!(report.stuck, 0, "no caller reported stuck");
        assert_eq!(report.stuck, report.unstuck, "stuck != unstuck");
    } else {
        assert_eq!(report.stuck, 0);
        assert_eq!(report.unstuck, 0);
    }
}
