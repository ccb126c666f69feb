//! Shared helpers for the gate integration tests

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Aborts the test process if dropped later than `duration` after creation
///
/// A gate bug usually shows up as a waiter that never wakes; this turns such a
/// hang into a prompt failure instead of a stalled CI job.
pub struct HangGuard {
    finished: Arc<AtomicBool>,
}

impl Drop for HangGuard {
    fn drop(&mut self) {
        self.finished.store(true, Ordering::SeqCst);
    }
}

pub fn hang_guard(duration: Duration) -> HangGuard {
    let finished = Arc::new(AtomicBool::new(false));
    let watched = Arc::clone(&finished);
    std::thread::spawn(move || {
        std::thread::sleep(duration);
        if !watched.load(Ordering::SeqCst) {
            eprintln!("Gate test hung for {}s. Aborting.", duration.as_secs());
            std::process::abort();
        }
    });
    HangGuard { finished }
}

/// Records when, relative to its creation, each event happened
#[derive(Clone)]
pub struct Timeline {
    start: Instant,
    events: Arc<Mutex<Vec<(&'static str, Duration)>>>,
}

impl Timeline {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            events: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn mark(&self, event: &'static str) {
        let at = self.start.elapsed();
        self.events.lock().unwrap().push((event, at));
    }

    pub fn count(&self, event: &str) -> usize {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| *name == event)
            .count()
    }

    pub fn first(&self, event: &str) -> Option<Duration> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|(name, _)| *name == event)
            .map(|(_, at)| *at)
    }
}

/// In-memory sink for a `tracing_subscriber::fmt` subscriber
#[derive(Clone, Default)]
pub struct LogCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl LogCapture {
    pub fn lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.buffer.lock().unwrap())
            .lines()
            .map(str::to_owned)
            .collect()
    }
}

impl std::io::Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.buffer.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
