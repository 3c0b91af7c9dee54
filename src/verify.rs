//! Concurrent bijectivity checks for [`fein_u64`] / [`fynd_u64`].
//!
//! Inputs are spread over a rayon pool. Every worker scrambles its input,
//! records the output in a shared collision set and checks that
//! [`fynd_u64`] brings it back. Seeing the same input map to the same output
//! twice is fine; two different inputs with one output is a collision, after
//! which workers stop picking up new inputs.
//!
//! Neither harness holds its inputs in memory. [`SpotCheck`] draws every
//! input from its own seeded stream, and [`exhaustive`] records outputs in a
//! bitset once that is smaller than a map of the range, so a full 32-bit
//! block costs 512 MiB.
//!
//! ```
//! use urbit_ob::verify::SpotCheck;
//!
//! let report = SpotCheck::new(1000).workers(2).seed(7).run(|_| {}).unwrap();
//! assert!(report.is_clean());
//! assert_eq!(report.tested, 1000);
//! ```

use std::collections::hash_map::{Entry, HashMap};
use std::fmt;
use std::ops::Range;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use rayon::ThreadPool;

use crate::{fein_u64, fynd_u64, Bijection};

/// A slice of the input space and the share of samples drawn from it.
#[derive(Clone, Debug)]
pub struct Stratum {
    pub name: &'static str,
    pub range: Range<u64>,
    pub fraction: f64,
}

const NUM_STRATA: usize = 5;

/// Sampling plan of [`SpotCheck`]: every band below `2^64` is covered, the
/// 32-bit band in three slices of growing magnitude.
pub const STRATA: [Stratum; NUM_STRATA] = [
    Stratum {
        name: "small values (< 0x10000)",
        range: 0..0x1_0000,
        fraction: 0.1,
    },
    Stratum {
        name: "low feistel (0x10000-0x1000000)",
        range: 0x1_0000..0x100_0000,
        fraction: 0.25,
    },
    Stratum {
        name: "mid feistel (0x1000000-0x10000000)",
        range: 0x100_0000..0x1000_0000,
        fraction: 0.25,
    },
    Stratum {
        name: "high feistel (0x10000000-0x100000000)",
        range: 0x1000_0000..0x1_0000_0000,
        fraction: 0.25,
    },
    Stratum {
        name: "double word (0x100000000-0xffffffffffffffff)",
        range: 0x1_0000_0000..u64::MAX,
        fraction: 0.15,
    },
];

/// Odd multiplier spreading sample indices over the seed space.
const STREAM_STRIDE: u64 = 0x9e37_79b9_7f4a_7c15;

/// Rough heap cost of one entry of the output map, in bytes.
const MAP_ENTRY_BYTES: u128 = 32;

/// A check that did not hold.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Failure {
    /// Two different inputs scrambled to the same output.
    Collision { first: u64, second: u64, output: u64 },
    /// `fynd(fein(input))` is not `input`.
    RoundTrip {
        input: u64,
        output: u64,
        recovered: u64,
    },
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Failure::Collision {
                first,
                second,
                output,
            } => write!(f, "COLLISION: {first} and {second} both encrypt to {output}"),
            Failure::RoundTrip {
                input,
                output,
                recovered,
            } => write!(f, "round-trip failed: {input} -> {output} -> {recovered}"),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("number of checks must be positive")]
    NoChecks,
    #[error("failed to build worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),
    #[error("failed to get random seed: {0}")]
    Entropy(getrandom::Error),
}

/// Outcome of a run.
#[derive(Debug)]
pub struct Report {
    /// Inputs that scrambled without collision and round-tripped.
    pub tested: u64,
    pub collisions: u64,
    pub failures: Vec<Failure>,
    pub elapsed: Duration,
    /// Set when a collision stopped the run before all inputs were seen.
    pub cancelled: bool,
}

impl Report {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty() && self.collisions == 0
    }

    /// Checked inputs per second.
    pub fn rate(&self) -> f64 {
        self.tested as f64 / self.elapsed.as_secs_f64().max(f64::MIN_POSITIVE)
    }
}

/// Random spot check across [`STRATA`].
#[derive(Clone, Debug)]
pub struct SpotCheck {
    pub num_checks: u64,
    pub workers: usize,
    pub seed: u64,
    /// Invoke the progress callback every this many checks, `0` for never.
    pub progress_every: u64,
}

impl SpotCheck {
    pub fn new(num_checks: u64) -> Self {
        Self {
            num_checks,
            workers: default_workers(),
            seed: 0,
            progress_every: 0,
        }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn progress_every(mut self, every: u64) -> Self {
        self.progress_every = every;
        self
    }

    /// Number of samples drawn from each stratum.
    pub fn quotas(&self) -> [u64; NUM_STRATA] {
        let mut quotas = STRATA.map(|s| (self.num_checks as f64 * s.fraction) as u64);
        // Rounding leftovers go to the last stratum so the total is exact.
        let assigned: u64 = quotas.iter().sum();
        quotas[NUM_STRATA - 1] += self.num_checks.saturating_sub(assigned);
        quotas
    }

    /// The `i`-th input of this check. Inputs are laid out in stratum order.
    pub fn sample(&self, i: u64) -> u64 {
        draw(&self.quotas(), self.seed, i)
    }

    pub fn run(&self, progress: impl Fn(u64) + Sync) -> Result<Report, VerifyError> {
        if self.num_checks == 0 {
            return Err(VerifyError::NoChecks);
        }
        let pool = build_pool(self.workers)?;
        let quotas = self.quotas();
        for (stratum, quota) in STRATA.iter().zip(quotas) {
            log::debug!("drawing {quota} values from {}", stratum.name);
        }
        let checker = Checker::new(Scrambler, Seen::map(), self.progress_every);
        let start = Instant::now();
        pool.install(|| {
            (0..self.num_checks)
                .into_par_iter()
                .for_each(|i| checker.check(draw(&quotas, self.seed, i), &progress));
        });
        Ok(checker.into_report(start.elapsed()))
    }
}

/// Draws input `i` from its own stream, so inputs come in any order and
/// none are kept.
fn draw(quotas: &[u64; NUM_STRATA], seed: u64, i: u64) -> u64 {
    let mut end = 0;
    let stratum = quotas
        .iter()
        .position(|&quota| {
            end += quota;
            i < end
        })
        .unwrap_or(NUM_STRATA - 1);
    let mut rng = SmallRng::seed_from_u64(seed ^ i.wrapping_mul(STREAM_STRIDE));
    rng.random_range(STRATA[stratum].range.clone())
}

/// Checks every point in `range`.
pub fn exhaustive(
    range: Range<u64>,
    workers: usize,
    progress_every: u64,
    progress: impl Fn(u64) + Sync,
) -> Result<Report, VerifyError> {
    let seen = Seen::for_range(&range);
    check_range(Scrambler, seen, range, workers, progress_every, progress)
}

/// A seed from the operating system's entropy source.
pub fn entropy_seed() -> Result<u64, VerifyError> {
    let mut buf = [0u8; 8];
    getrandom::fill(&mut buf).map_err(VerifyError::Entropy)?;
    Ok(u64::from_le_bytes(buf))
}

pub fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, |n| n.get())
}

fn build_pool(workers: usize) -> Result<ThreadPool, VerifyError> {
    Ok(rayon::ThreadPoolBuilder::new()
        .num_threads(workers)
        .build()?)
}

fn check_range<B: Bijection + Sync>(
    bijection: B,
    seen: Seen,
    range: Range<u64>,
    workers: usize,
    progress_every: u64,
    progress: impl Fn(u64) + Sync,
) -> Result<Report, VerifyError> {
    if range.is_empty() {
        return Err(VerifyError::NoChecks);
    }
    let pool = build_pool(workers)?;
    let checker = Checker::new(bijection, seen, progress_every);
    let start = Instant::now();
    pool.install(|| {
        range
            .clone()
            .into_par_iter()
            .for_each(|x| checker.check(x, &progress));
        checker.resolve(&range);
    });
    Ok(checker.into_report(start.elapsed()))
}

/// [`fein_u64`] and [`fynd_u64`] as one map on `u64`.
#[derive(Clone, Copy, Debug)]
struct Scrambler;

impl Bijection for Scrambler {
    fn apply(&self, x: u64) -> u64 {
        fein_u64(x)
    }

    fn invert(&self, y: u64) -> u64 {
        fynd_u64(y)
    }
}

/// Every output of `range`, in bits. The scrambler keeps the high 32 bits,
/// so outputs stay in the 32-bit blocks of their inputs.
fn output_span(range: &Range<u64>) -> Range<u128> {
    debug_assert!(!range.is_empty());
    let lo = u128::from(range.start >> 32) << 32;
    let hi = (u128::from((range.end - 1) >> 32) + 1) << 32;
    lo..hi
}

fn bits_pay_off(points: u128, span: &Range<u128>) -> bool {
    points * MAP_ENTRY_BYTES * 8 >= span.end - span.start
}

/// Outputs seen so far.
enum Seen {
    /// Output -> the input that produced it.
    Map(Mutex<HashMap<u64, u64>>),
    /// One bit per output. Only for inputs that never repeat.
    Bits(OutputBits),
}

enum Claim {
    Free,
    /// Another input produced the output: known for a map, not for bits.
    Taken(Option<u64>),
}

impl Seen {
    fn map() -> Self {
        Seen::Map(Mutex::new(HashMap::new()))
    }

    /// The cheaper store for the distinct points of `range`.
    fn for_range(range: &Range<u64>) -> Self {
        if range.is_empty() {
            return Seen::map();
        }
        let span = output_span(range);
        let points = u128::from(range.end - range.start);
        match usize::try_from((span.end - span.start) / 64) {
            Ok(words) if bits_pay_off(points, &span) => {
                log::debug!("tracking outputs in {words} bitset words");
                Seen::Bits(OutputBits::new(span.start as u64, words))
            }
            _ => Seen::map(),
        }
    }

    fn claim(&self, input: u64, output: u64) -> Claim {
        match self {
            Seen::Map(map) => match lock(map).entry(output) {
                Entry::Occupied(entry) if *entry.get() != input => Claim::Taken(Some(*entry.get())),
                Entry::Occupied(_) => Claim::Free,
                Entry::Vacant(entry) => {
                    entry.insert(input);
                    Claim::Free
                }
            },
            Seen::Bits(bits) => {
                if bits.mark(output) {
                    Claim::Taken(None)
                } else {
                    Claim::Free
                }
            }
        }
    }
}

/// Fixed bitset over `[base, base + 64 * words.len())`.
struct OutputBits {
    base: u64,
    words: Box<[AtomicU64]>,
}

impl OutputBits {
    fn new(base: u64, words: usize) -> Self {
        Self {
            base,
            words: (0..words).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Marks `output`, returning whether it was already marked.
    fn mark(&self, output: u64) -> bool {
        let i = output - self.base;
        let bit = 1 << (i % 64);
        self.words[(i / 64) as usize].fetch_or(bit, Ordering::Relaxed) & bit != 0
    }
}

struct Checker<B> {
    bijection: B,
    seen: Seen,
    failures: Mutex<Vec<Failure>>,
    /// `(second input, output)` of collisions whose first input is unknown.
    unresolved: Mutex<Vec<(u64, u64)>>,
    tested: AtomicU64,
    collisions: AtomicU64,
    stop: AtomicBool,
    progress_every: u64,
}

impl<B: Bijection + Sync> Checker<B> {
    fn new(bijection: B, seen: Seen, progress_every: u64) -> Self {
        Self {
            bijection,
            seen,
            failures: Mutex::new(Vec::new()),
            unresolved: Mutex::new(Vec::new()),
            tested: AtomicU64::new(0),
            collisions: AtomicU64::new(0),
            stop: AtomicBool::new(false),
            progress_every,
        }
    }

    fn check(&self, input: u64, progress: &(impl Fn(u64) + Sync)) {
        if self.stop.load(Ordering::Relaxed) {
            return;
        }
        let output = self.bijection.apply(input);

        if let Claim::Taken(first) = self.seen.claim(input, output) {
            self.collisions.fetch_add(1, Ordering::Relaxed);
            self.stop.store(true, Ordering::Relaxed);
            match first {
                Some(first) => self.fail(Failure::Collision {
                    first,
                    second: input,
                    output,
                }),
                None => lock(&self.unresolved).push((input, output)),
            }
            return;
        }

        let recovered = self.bijection.invert(output);
        if recovered != input {
            self.fail(Failure::RoundTrip {
                input,
                output,
                recovered,
            });
            return;
        }

        let tested = self.tested.fetch_add(1, Ordering::Relaxed) + 1;
        if self.progress_every > 0 && tested % self.progress_every == 0 {
            progress(tested);
        }
    }

    /// Looks up the first input of every collision flagged by a bitset.
    fn resolve(&self, range: &Range<u64>) {
        let unresolved = std::mem::take(&mut *lock(&self.unresolved));
        for (second, output) in unresolved {
            let first = range
                .clone()
                .into_par_iter()
                .find_any(|&x| x != second && self.bijection.apply(x) == output);
            match first {
                Some(first) => self.fail(Failure::Collision {
                    first,
                    second,
                    output,
                }),
                None => log::warn!("no earlier input found for {second} -> {output}"),
            }
        }
    }

    fn fail(&self, failure: Failure) {
        log::warn!("{failure}");
        lock(&self.failures).push(failure);
    }

    fn into_report(self, elapsed: Duration) -> Report {
        Report {
            tested: self.tested.into_inner(),
            collisions: self.collisions.into_inner(),
            failures: self.failures.into_inner().unwrap_or_else(PoisonError::into_inner),
            elapsed,
            cancelled: self.stop.into_inner(),
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Sends 1999 onto 7 and leaves every other point in place.
    struct Clash;

    impl Bijection for Clash {
        fn apply(&self, x: u64) -> u64 {
            if x == 1999 {
                7
            } else {
                x
            }
        }

        fn invert(&self, y: u64) -> u64 {
            y
        }
    }

    /// Identity whose inverse is off by one at 5.
    struct Skew;

    impl Bijection for Skew {
        fn apply(&self, x: u64) -> u64 {
            x
        }

        fn invert(&self, y: u64) -> u64 {
            if y == 5 {
                6
            } else {
                y
            }
        }
    }

    #[test]
    fn test_quotas_sum() {
        for n in [1, 7, 100, 10000, 12345] {
            let check = SpotCheck::new(n);
            assert_eq!(check.quotas().iter().sum::<u64>(), n);
        }
        assert_eq!(SpotCheck::new(10000).quotas(), [1000, 2500, 2500, 2500, 1500]);
    }

    #[test]
    fn test_samples_follow_strata() {
        let check = SpotCheck::new(1000).seed(3);
        let samples: Vec<u64> = (0..1000).map(|i| check.sample(i)).collect();
        let mut offset = 0;
        for (stratum, quota) in STRATA.iter().zip(check.quotas()) {
            let slice = &samples[offset..offset + quota as usize];
            assert!(slice.iter().all(|x| stratum.range.contains(x)));
            offset += quota as usize;
        }
        assert_eq!(offset, samples.len());

        // Drawing order does not matter.
        let backwards: Vec<u64> = (0..1000).rev().map(|i| check.sample(i)).collect();
        assert!(backwards.iter().rev().eq(samples.iter()));

        let other: Vec<u64> = (0..1000).map(|i| check.clone().seed(4).sample(i)).collect();
        assert_ne!(other, samples);
    }

    #[test]
    fn test_spot_check_clean() -> anyhow::Result<()> {
        let report = SpotCheck::new(10000).workers(4).seed(42).run(|_| {})?;
        assert!(report.is_clean(), "{:?}", report.failures);
        assert_eq!(report.collisions, 0);
        assert_eq!(report.tested, 10000);
        assert!(!report.cancelled);
        Ok(())
    }

    #[test]
    fn test_progress_callback() -> anyhow::Result<()> {
        let calls = AtomicU64::new(0);
        let report = SpotCheck::new(1000)
            .workers(3)
            .progress_every(100)
            .run(|_| {
                calls.fetch_add(1, Ordering::Relaxed);
            })?;
        assert_eq!(report.tested, 1000);
        assert_eq!(calls.into_inner(), 10);
        Ok(())
    }

    #[test]
    fn test_exhaustive_ranges() -> anyhow::Result<()> {
        for range in [0..0x1_0000, 0x1_0000..0x3_0000, 0xfffe_0000..0x1_0000_0000] {
            let len = range.end - range.start;
            let report = exhaustive(range, 4, 0, |_| {})?;
            assert!(report.is_clean(), "{:?}", report.failures);
            assert_eq!(report.tested, len);
        }
        Ok(())
    }

    #[test]
    fn test_output_span() {
        assert_eq!(output_span(&(0x1_0000..0x3_0000)), 0..1 << 32);
        assert_eq!(output_span(&(0..0x1_0000_0000)), 0..1 << 32);
        assert_eq!(output_span(&(0xffff_fff0..0x1_0000_0010)), 0..1 << 33);
        assert_eq!(
            output_span(&(u64::MAX - 5..u64::MAX)),
            (0xffff_ffffu128 << 32)..1 << 64
        );
    }

    #[test]
    fn test_bits_only_for_dense_ranges() {
        let block = 0..1u128 << 32;
        // The whole band needs 512 MiB as bits and far more as a map.
        assert!(bits_pay_off(0xffff_0000, &block));
        assert!(bits_pay_off(1 << 24, &block));
        assert!(!bits_pay_off(0x2_0000, &block));
        assert!(!bits_pay_off((1 << 24) - 1, &block));
    }

    #[test]
    fn test_output_bits() {
        let bits = OutputBits::new(0x1_0000_0000, 2);
        for output in [0x1_0000_0000, 0x1_0000_003f, 0x1_0000_0040, 0x1_0000_007f] {
            assert!(!bits.mark(output));
            assert!(bits.mark(output));
        }
        assert!(!bits.mark(0x1_0000_0041));
    }

    #[test]
    fn test_repeated_input_is_not_a_collision() {
        let checker = Checker::new(Scrambler, Seen::map(), 0);
        for _ in 0..3 {
            checker.check(65536, &|_| {});
        }
        let report = checker.into_report(Duration::ZERO);
        assert!(report.is_clean());
        assert_eq!(report.tested, 3);
    }

    #[test]
    fn test_collision_stops_the_run() {
        let checker = Checker::new(Scrambler, Seen::map(), 0);
        let output = fein_u64(65536);
        // Claim the output of 65536 for a different input.
        assert!(matches!(checker.seen.claim(65537, output), Claim::Free));
        checker.check(65536, &|_| {});
        checker.check(65538, &|_| {});
        let report = checker.into_report(Duration::ZERO);
        assert_eq!(report.collisions, 1);
        assert!(report.cancelled);
        assert_eq!(report.tested, 0);
        assert_eq!(
            report.failures,
            vec![Failure::Collision {
                first: 65537,
                second: 65536,
                output,
            }]
        );
    }

    #[test]
    fn test_collision_found_with_either_store() -> anyhow::Result<()> {
        for seen in [Seen::map(), Seen::Bits(OutputBits::new(0, 32))] {
            let report = check_range(Clash, seen, 0..2000, 2, 0, |_| {})?;
            assert!(!report.is_clean());
            assert_eq!(report.collisions, 1);
            assert!(report.cancelled);
            let collisions: Vec<_> = report
                .failures
                .iter()
                .filter_map(|failure| match *failure {
                    Failure::Collision {
                        first,
                        second,
                        output,
                    } => Some((first.min(second), first.max(second), output)),
                    Failure::RoundTrip { .. } => None,
                })
                .collect();
            assert_eq!(collisions, vec![(7, 1999, 7)]);
        }
        Ok(())
    }

    #[test]
    fn test_round_trip_failure() -> anyhow::Result<()> {
        let report = check_range(Skew, Seen::map(), 0..100, 2, 0, |_| {})?;
        assert_eq!(report.collisions, 0);
        assert!(!report.cancelled);
        assert_eq!(report.tested, 99);
        assert_eq!(
            report.failures,
            vec![Failure::RoundTrip {
                input: 5,
                output: 5,
                recovered: 6,
            }]
        );
        Ok(())
    }

    #[test]
    fn test_no_checks() {
        assert!(matches!(SpotCheck::new(0).run(|_| {}), Err(VerifyError::NoChecks)));
        assert!(matches!(exhaustive(5..5, 1, 0, |_| {}), Err(VerifyError::NoChecks)));
    }

    #[test]
    fn test_failure_display() {
        let failure = Failure::RoundTrip {
            input: 1,
            output: 2,
            recovered: 3,
        };
        assert_eq!(failure.to_string(), "round-trip failed: 1 -> 2 -> 3");
        let failure = Failure::Collision {
            first: 3108299008,
            second: 479733505,
            output: 9,
        };
        assert_eq!(
            failure.to_string(),
            "COLLISION: 3108299008 and 479733505 both encrypt to 9"
        );
    }
}
