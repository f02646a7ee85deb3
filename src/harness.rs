use std::hint::black_box;

use rand_chacha::rand_core::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::timer::{elapsed, CycleTimer, Timing};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Profile {
    Quick,
    Full,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Quick => "quick",
            Profile::Full => "full",
        }
    }
}

/// What the runner does when engines disagree.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mode {
    /// Record the fault, leave the case out of the totals, keep going.
    Benchmark,
    /// Stop at the first disagreement.
    Verify,
}

#[derive(Clone, Debug)]
pub struct BenchConfig {
    pub profile: Profile,
    pub seed: u64,
    pub mode: Mode,
    /// Deltas above this are reported as timer anomalies.
    pub max_plausible_cycles: u64,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            profile: Profile::Full,
            seed: 0,
            mode: Mode::Benchmark,
            max_plausible_cycles: DEFAULT_MAX_PLAUSIBLE_CYCLES,
        }
    }
}

/// Anything past 2^62 is a wrapped subtraction, not a real measurement.
pub const DEFAULT_MAX_PLAUSIBLE_CYCLES: u64 = 1 << 62;

impl BenchConfig {
    pub fn rng(&self) -> ChaCha8Rng {
        ChaCha8Rng::seed_from_u64(self.seed)
    }

    /// Cases in the seeded random corpus.
    pub fn random_cases(&self) -> usize {
        match self.profile {
            Profile::Quick => 16,
            Profile::Full => 256,
        }
    }

    /// Upper operand bound for the seeded random corpus. Kept modest so the
    /// subtractive reference stays tractable.
    pub fn random_max(&self) -> u64 {
        match self.profile {
            Profile::Quick => 10_000,
            Profile::Full => 1_000_000,
        }
    }
}

/// One timed invocation of one engine on one case.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measurement {
    pub result: u64,
    pub timing: Timing,
}

impl Measurement {
    pub fn cycles(&self) -> Option<u64> {
        self.timing.cycles()
    }
}

/// Brackets a single call of `f` with two timer reads.
pub fn measure<T: CycleTimer + ?Sized>(
    timer: &mut T,
    limit: u64,
    f: impl FnOnce() -> u64,
) -> Measurement {
    let start = timer.now();
    let result = black_box(f());
    let end = timer.now();

    Measurement {
        result,
        timing: elapsed(start, end, limit),
    }
}
