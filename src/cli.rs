//! Command-line interface definitions

use anyhow::Result;
use clap::Parser;
use std::time::Duration;

use crate::stress::StressConfig;

/// Hammer an admission gate from many threads and report peak occupancy
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Maximum number of simultaneous permits
    #[arg(long, default_value = "10")]
    pub capacity: usize,

    /// Total number of callers competing for permits
    #[arg(long, default_value = "1000")]
    pub callers: usize,

    /// Number of OS threads to spread callers over (0 = auto-detect)
    #[arg(long, default_value = "0")]
    pub threads: usize,

    /// How long each admitted caller holds its permit, in microseconds
    #[arg(long, default_value = "10")]
    pub hold_us: u64,

    /// Bound for the patient `timeout` callers, in milliseconds
    #[arg(long, default_value = "2000")]
    pub patience_ms: u64,

    /// Report `forever` callers stuck longer than this many milliseconds
    #[arg(long)]
    pub stuck_timeout_ms: Option<u64>,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (suppress all output except errors)
    #[arg(short, long)]
    pub quiet: bool,
}

impl Args {
    /// Validate command-line arguments
    ///
    /// # Errors
    ///
    /// This function will return an error if:
    /// - The caller count is zero
    /// - The patience is zero (patient callers would never wait)
    /// - The stuck timeout is zero
    /// - Both --quiet and --verbose options are used
    pub fn validate(&self) -> Result<()> {
        if self.callers == 0 {
            anyhow::bail!("Caller count must be at least 1");
        }

        if self.patience_ms == 0 {
            anyhow::bail!("Patience must be greater than zero");
        }

        if self.stuck_timeout_ms == Some(0) {
            anyhow::bail!("Stuck timeout must be greater than zero when given");
        }

        if self.quiet && self.verbose > 0 {
            anyhow::bail!("Cannot use both --quiet and --verbose options");
        }

        Ok(())
    }

    /// Get the actual thread count to use
    #[must_use]
    pub fn effective_thread_count(&self) -> usize {
        if self.threads == 0 {
            num_cpus::get()
        } else {
            self.threads
        }
    }

    /// Build the stress run configuration from these arguments
    #[must_use]
    pub fn stress_config(&self) -> StressConfig {
        StressConfig {
            capacity: self.capacity,
            callers: self.callers,
            threads: self.effective_thread_count(),
            hold: Duration::from_micros(self.hold_us),
            patience: Duration::from_millis(self.patience_ms),
            stuck_timeout: self.stuck_timeout_ms.map(Duration::from_millis),
        }
    }
}
