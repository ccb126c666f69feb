//! gate-stress: load driver for the admission gate
//!
//! Spreads many competing callers over several threads, all acquiring from one
//! gate, and fails if more callers were ever admitted at once than the gate's
//! capacity allows.

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, Level};

use admission_gate::cli::Args;
use admission_gate::stress;

fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Initialize logging based on verbosity and quiet mode
    if args.quiet {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(Level::ERROR)
            .with_target(false)
            .finish();

        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(match args.verbose {
                0 => Level::WARN,
                1 => Level::INFO,
                2 => Level::DEBUG,
                _ => Level::TRACE,
            })
            .with_target(false)
            .with_thread_names(true)
            .finish();

        tracing::subscriber::set_global_default(subscriber)?;
    }

    // Validate arguments
    args.validate().context("Invalid arguments")?;

    let config = args.stress_config();
    info!("Starting gate-stress v{}", env!("CARGO_PKG_VERSION"));
    info!("Capacity: {}", config.capacity);
    info!("Callers: {}", config.callers);
    info!("Threads: {}", config.threads);
    info!("Hold: {:?}", config.hold);
    info!("Stuck timeout: {:?}", config.stuck_timeout);

    let report = stress::run(&config).context("Stress run failed")?;

    if !args.quiet {
        println!("Admitted:            {}", report.admitted);
        println!("Not admitted:        {}", report.not_admitted);
        println!(
            "timeout(0):          {} succeeded, {} timed out",
            report.immediate_successes, report.immediate_timeouts
        );
        println!("Patient failures:    {}", report.patient_failures);
        println!(
            "Peak in flight:      {} (capacity {})",
            report.peak_in_flight, config.capacity
        );
        if config.stuck_timeout.is_some() {
            println!(
                "Stuck / unstuck:     {} / {}",
                report.stuck, report.unstuck
            );
        }
        println!("Elapsed:             {:?}", report.elapsed);
    }

    if report.violations > 0 || report.leaked > 0 || report.stuck != report.unstuck {
        error!(
            "Gate misbehaved: {} capacity violations, {} leaked slots, {} stuck vs {} unstuck",
            report.violations, report.leaked, report.stuck, report.unstuck
        );
        std::process::exit(1);
    }

    Ok(())
}
