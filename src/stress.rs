//! Load driver that hammers one gate from many threads
//!
//! Each OS thread runs its own compio runtime and spawns its share of the
//! callers. Callers rotate through five kinds of acquisition so that every
//! protocol competes for the same slots:
//!
//! | index % 5 | acquisition                                         |
//! |-----------|-----------------------------------------------------|
//! | 0         | `forever` with a signal that never fires            |
//! | 1         | `timeout(0)`                                        |
//! | 2         | `timeout(patience)`                                 |
//! | 3         | `timeout(1h)` under a `patience` deadline           |
//! | 4         | `forever` with an already-cancelled signal          |
//!
//! Every admitted caller bumps a shared in-flight counter, holds its permit
//! for `hold`, then releases. The peak of that counter must never exceed the
//! gate's capacity.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::{CancelSignal, CancelSource, ForeverMessaging, Gate, Permit};

/// Tag for the gate under test
pub struct StressSlots;

/// Parameters for one stress run
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Gate capacity
    pub capacity: usize,
    /// Total number of callers
    pub callers: usize,
    /// OS threads to spread the callers over
    pub threads: usize,
    /// How long an admitted caller holds its permit
    pub hold: Duration,
    /// Bound for the patient `timeout` callers
    pub patience: Duration,
    /// Report `forever` waits longer than this, if set
    pub stuck_timeout: Option<Duration>,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            capacity: 10,
            callers: 1000,
            threads: 4,
            hold: Duration::from_micros(10),
            patience: Duration::from_secs(2),
            stuck_timeout: None,
        }
    }
}

/// What a stress run observed
#[derive(Debug, Clone, Copy, Default)]
pub struct StressReport {
    /// Permits that held a slot
    pub admitted: usize,
    /// `forever` calls that returned a no-op permit
    pub not_admitted: usize,
    /// `timeout(0)` calls that got a slot
    pub immediate_successes: usize,
    /// `timeout(0)` calls that failed with a timeout
    pub immediate_timeouts: usize,
    /// Patient `timeout` calls that failed
    pub patient_failures: usize,
    /// Highest number of simultaneously admitted callers seen
    pub peak_in_flight: usize,
    /// Times an admitted caller saw more than `capacity` in flight
    pub violations: usize,
    /// Stuck callbacks fired
    pub stuck: usize,
    /// Unstuck callbacks fired
    pub unstuck: usize,
    /// Slots still held when the run finished
    pub leaked: usize,
    /// Wall-clock duration of the run
    pub elapsed: Duration,
}

#[derive(Default)]
struct Counters {
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
    violations: AtomicUsize,
    admitted: AtomicUsize,
    not_admitted: AtomicUsize,
    immediate_successes: AtomicUsize,
    immediate_timeouts: AtomicUsize,
    patient_failures: AtomicUsize,
    stuck: AtomicUsize,
    unstuck: AtomicUsize,
}

/// Run the stress scenario described in the module docs
///
/// # Errors
///
/// Returns an error if a runtime cannot be built or a worker thread panics.
pub fn run(config: &StressConfig) -> Result<StressReport> {
    let counters = Arc::new(Counters::default());
    let mut gate = Gate::<StressSlots>::new(config.capacity);

    if let Some(stuck_timeout) = config.stuck_timeout {
        let stuck = Arc::clone(&counters);
        let unstuck = Arc::clone(&counters);
        gate = gate.with_forever_messaging(
            ForeverMessaging::new(stuck_timeout)
                .on_stuck(move |_| {
                    stuck.stuck.fetch_add(1, Ordering::SeqCst);
                    warn!("Caller stuck for more than {:?}", stuck_timeout);
                })
                .on_unstuck(move |signal| {
                    unstuck.unstuck.fetch_add(1, Ordering::SeqCst);
                    info!("Caller unstuck (cancelled: {})", signal.is_cancelled());
                }),
        );
    }

    let threads = config.threads.max(1);
    let start = Instant::now();

    let workers: Vec<_> = (0..threads)
        .map(|thread_index| {
            let gate = gate.clone();
            let counters = Arc::clone(&counters);
            let config = config.clone();
            std::thread::Builder::new()
                .name(format!("stress-{thread_index}"))
                .spawn(move || -> Result<()> {
                    let runtime =
                        compio::runtime::Runtime::new().context("Failed to build runtime")?;
                    runtime.block_on(run_worker(thread_index, threads, gate, counters, config));
                    Ok(())
                })
                .context("Failed to spawn stress thread")
        })
        .collect::<Result<_>>()?;

    for worker in workers {
        worker
            .join()
            .map_err(|_| anyhow::anyhow!("Stress thread panicked"))??;
    }

    let report = StressReport {
        admitted: counters.admitted.load(Ordering::SeqCst),
        not_admitted: counters.not_admitted.load(Ordering::SeqCst),
        immediate_successes: counters.immediate_successes.load(Ordering::SeqCst),
        immediate_timeouts: counters.immediate_timeouts.load(Ordering::SeqCst),
        patient_failures: counters.patient_failures.load(Ordering::SeqCst),
        peak_in_flight: counters.peak_in_flight.load(Ordering::SeqCst),
        violations: counters.violations.load(Ordering::SeqCst),
        stuck: counters.stuck.load(Ordering::SeqCst),
        unstuck: counters.unstuck.load(Ordering::SeqCst),
        leaked: gate.in_use(),
        elapsed: start.elapsed(),
    };
    debug!("Stress report: {:?}", report);
    Ok(report)
}

async fn run_worker(
    thread_index: usize,
    threads: usize,
    gate: Gate<StressSlots>,
    counters: Arc<Counters>,
    config: StressConfig,
) {
    let mut handles = Vec::new();

    for caller in (thread_index..config.callers).step_by(threads) {
        let gate = gate.clone();
        let counters = Arc::clone(&counters);
        let config = config.clone();
        handles.push(compio::runtime::spawn(async move {
            if let Some(permit) = acquire(caller, &gate, &counters, &config).await {
                hold(permit, &counters, &config).await;
            }
        }));
    }

    for handle in handles {
        if handle.await.is_err() {
            warn!("Stress caller panicked on thread {}", thread_index);
        }
    }
}

async fn acquire(
    caller: usize,
    gate: &Gate<StressSlots>,
    counters: &Counters,
    config: &StressConfig,
) -> Option<Permit<StressSlots>> {
    let permit = match caller % 5 {
        0 => gate.forever(&CancelSignal::never()).await,
        1 => match gate.timeout(&CancelSignal::never(), Duration::ZERO).await {
            Ok(permit) => {
                counters.immediate_successes.fetch_add(1, Ordering::SeqCst);
                permit
            }
            Err(_) => {
                counters.immediate_timeouts.fetch_add(1, Ordering::SeqCst);
                return None;
            }
        },
        2 => match gate.timeout(&CancelSignal::never(), config.patience).await {
            Ok(permit) => permit,
            Err(e) => {
                warn!("Patient caller {} failed: {}", caller, e);
                counters.patient_failures.fetch_add(1, Ordering::SeqCst);
                return None;
            }
        },
        3 => {
            let deadline = CancelSource::with_timeout(config.patience);
            match gate
                .timeout(&deadline.signal(), Duration::from_secs(3600))
                .await
            {
                Ok(permit) => permit,
                Err(e) => {
                    warn!("Deadline caller {} failed: {}", caller, e);
                    counters.patient_failures.fetch_add(1, Ordering::SeqCst);
                    return None;
                }
            }
        }
        _ => {
            let source = CancelSource::new();
            source.cancel();
            gate.forever(&source.signal()).await
        }
    };

    if permit.is_admitted() {
        counters.admitted.fetch_add(1, Ordering::SeqCst);
        Some(permit)
    } else {
        counters.not_admitted.fetch_add(1, Ordering::SeqCst);
        permit.release();
        None
    }
}

async fn hold(permit: Permit<StressSlots>, counters: &Counters, config: &StressConfig) {
    let in_flight = counters.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
    counters.peak_in_flight.fetch_max(in_flight, Ordering::SeqCst);
    if in_flight > config.capacity {
        counters.violations.fetch_add(1, Ordering::SeqCst);
    }

    compio::time::sleep(config.hold).await;

    counters.in_flight.fetch_sub(1, Ordering::SeqCst);
    permit.release();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_run_stays_within_capacity() {
        let config = StressConfig {
            capacity: 3,
            callers: 50,
            threads: 2,
            hold: Duration::from_millis(1),
            ..StressConfig::default()
        };

        let report = run(&config).unwrap();

        assert_eq!(report.violations, 0);
        assert!(report.peak_in_flight <= 3);
        assert_eq!(report.patient_failures, 0);
        assert_eq!(report.leaked, 0);
        assert_eq!(
            report.admitted
                + report.not_admitted
                + report.immediate_timeouts
                + report.patient_failures,
            50
        );
    }
}
