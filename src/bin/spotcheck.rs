//! Spot-checks the bijectivity of the scrambler.
//!
//! Draws random points from every band below `2^64`, scrambles them on a
//! pool of workers and verifies that no two points share an output and that
//! every output unscrambles back to its point.
//!
//! Build with: `cargo run --bin spotcheck --features cli --release -- [OPTIONS]`

use std::process::ExitCode;

use clap::Parser;
use urbit_ob::verify::{self, SpotCheck, STRATA};

/// Most failures printed before the rest are summarized.
const MAX_PRINTED_FAILURES: usize = 11;

/// CLI arguments for the spot check.
#[derive(Parser, Debug)]
#[command(name = "spotcheck", about = "Spot-check the bijectivity of the scrambler")]
struct Args {
    /// Number of spot checks to perform
    #[arg(short = 'n', long, default_value_t = 10000)]
    num_checks: u64,

    /// Number of parallel workers [default: number of CPUs]
    #[arg(long)]
    workers: Option<usize>,

    /// Print progress every 1000 checks
    #[arg(short, long)]
    verbose: bool,

    /// RNG seed for reproducibility (random if not specified)
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if args.num_checks == 0 {
        eprintln!("Number of checks must be positive");
        return ExitCode::FAILURE;
    }

    let seed = match args.seed {
        Some(seed) => seed,
        None => match verify::entropy_seed() {
            Ok(seed) => seed,
            Err(err) => {
                eprintln!("{err}");
                return ExitCode::FAILURE;
            }
        },
    };

    let check = SpotCheck::new(args.num_checks)
        .workers(args.workers.unwrap_or_else(verify::default_workers))
        .seed(seed)
        .progress_every(if args.verbose { 1000 } else { 0 });

    println!(
        "Starting spot-check with {} random values using {} workers (seed {})...",
        check.num_checks, check.workers, check.seed
    );
    if args.verbose {
        for (stratum, quota) in STRATA.iter().zip(check.quotas()) {
            eprintln!("Generating {quota} values for range {}", stratum.name);
        }
    }

    let num_checks = check.num_checks;
    let report = match check.run(|count| {
        eprintln!(
            "Progress: {}/{} ({:.1}%)",
            count,
            num_checks,
            100.0 * count as f64 / num_checks as f64
        );
    }) {
        Ok(report) => report,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::FAILURE;
        }
    };

    println!();
    println!("=== Spot Check Results ===");
    println!("Total values tested: {}", report.tested);
    println!("Time elapsed: {:?}", report.elapsed);
    println!("Values per second: {:.0}", report.rate());
    println!("Collisions found: {}", report.collisions);

    if report.is_clean() {
        println!();
        println!("All spot checks passed! No collisions or round-trip failures detected.");
        return ExitCode::SUCCESS;
    }

    println!();
    println!("!!! ERRORS FOUND: {} !!!", report.failures.len());
    for (i, failure) in report.failures.iter().take(MAX_PRINTED_FAILURES).enumerate() {
        println!("Error {}: {failure}", i + 1);
    }
    if report.failures.len() > MAX_PRINTED_FAILURES {
        println!(
            "... and {} more errors",
            report.failures.len() - MAX_PRINTED_FAILURES
        );
    }
    if report.cancelled {
        println!("Stopped early after the first collision.");
    }
    ExitCode::FAILURE
}
