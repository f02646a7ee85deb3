//! Test corpora for the accelerator benchmark.
//!
//! Three curated sets (verification, quick, fixed), a deterministic size sweep
//! over magnitude thresholds, and a seeded random corpus. None of them can
//! yield the degenerate pair `(0, 0)`; [`OperandPair::new`] refuses it.

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::BenchError;

/// Two gcd inputs, at least one of them non-zero.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "RawPair")]
pub struct OperandPair {
    pub a: u64,
    pub b: u64,
}

#[derive(Deserialize)]
struct RawPair {
    a: u64,
    b: u64,
}

impl TryFrom<RawPair> for OperandPair {
    type Error = BenchError;

    fn try_from(raw: RawPair) -> Result<Self, Self::Error> {
        OperandPair::new(raw.a, raw.b)
    }
}

impl OperandPair {
    pub fn new(a: u64, b: u64) -> Result<Self, BenchError> {
        if a == 0 && b == 0 {
            return Err(BenchError::DegenerateInput { a, b });
        }
        Ok(Self { a, b })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestCase {
    label: String,
    operands: OperandPair,
}

impl TestCase {
    pub fn new(label: impl Into<String>, operands: OperandPair) -> Self {
        Self {
            label: label.into(),
            operands,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn operands(&self) -> OperandPair {
        self.operands
    }
}

/// Builds a case from literal operands known to be valid.
fn literal(label: &str, a: u64, b: u64) -> TestCase {
    debug_assert!(a != 0 || b != 0);
    TestCase::new(label, OperandPair { a, b })
}

/// Curated benchmark set, from small values up to the subtractive worst cases.
pub fn fixed_corpus() -> Vec<TestCase> {
    vec![
        literal("small", 48, 18),
        literal("medium", 1071, 462),
        literal("typical", 12345, 6789),
        literal("large", 999_999, 123_456),
        literal("large primes", 1_000_000_007, 999_999_937),
        literal("largest scale", 987_654_321, 123_456_789),
        literal("worst case: b = 1", 1_000_000_000, 1),
        literal("worst case: consecutive", 999_999_999, 999_999_998),
    ]
}

/// The first four fixed cases; fast enough for a smoke run.
pub fn quick_corpus() -> Vec<TestCase> {
    fixed_corpus().into_iter().take(4).collect()
}

/// Correctness checks run by the fail-fast verifier.
pub fn verification_corpus() -> Vec<TestCase> {
    vec![
        literal("basic", 48, 18),
        literal("coprime", 17, 13),
        literal("equal operands", 42, 42),
    ]
}

/// Offsets used to derive a sweep pair from a magnitude threshold.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepPolicy {
    pub up: u64,
    pub down: u64,
}

impl Default for SweepPolicy {
    fn default() -> Self {
        Self { up: 123, down: 456 }
    }
}

impl SweepPolicy {
    /// `(t + up, t - down)`, with `max(t / 2, 1)` replacing a non-positive
    /// second operand. Both operands are always strictly positive.
    pub fn pair_for(&self, threshold: u64) -> OperandPair {
        let a = threshold.saturating_add(self.up).max(1);
        let b = match threshold.checked_sub(self.down) {
            Some(b) if b > 0 => b,
            _ => (threshold / 2).max(1),
        };
        OperandPair { a, b }
    }
}

/// `10^lo ..= 10^hi`, stopping before the first power that overflows `u64`.
pub fn powers_of_ten(lo: u32, hi: u32) -> Vec<u64> {
    (lo..=hi).map_while(|e| 10u64.checked_pow(e)).collect()
}

/// Default sweep thresholds, 10^2 through 10^7.
pub fn default_thresholds() -> Vec<u64> {
    powers_of_ten(2, 7)
}

fn threshold_label(t: u64) -> String {
    let mut exp = 0u32;
    let mut n = t;
    while n >= 10 && n % 10 == 0 {
        n /= 10;
        exp += 1;
    }
    if n == 1 && exp > 0 {
        format!("size 10^{exp}")
    } else {
        format!("size {t}")
    }
}

pub fn size_sweep(thresholds: &[u64], policy: SweepPolicy) -> Vec<TestCase> {
    thresholds
        .iter()
        .map(|&t| TestCase::new(threshold_label(t), policy.pair_for(t)))
        .collect()
}

/// Seeded pseudo-random pairs with both operands in `1..=max`.
pub fn random_corpus(rng: &mut ChaCha8Rng, count: usize, max: u64) -> Vec<TestCase> {
    let max = max.max(1);
    (0..count)
        .map(|i| {
            let a = rng.gen_range(1..=max);
            let b = rng.gen_range(1..=max);
            TestCase::new(format!("random #{i}"), OperandPair { a, b })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn degenerate_pair_rejected() {
        assert!(OperandPair::new(0, 0).is_err());
        assert!(OperandPair::new(0, 5).is_ok());
    }

    #[test]
    fn degenerate_pair_rejected_on_deserialize() {
        let err = serde_json::from_str::<OperandPair>(r#"{"a":0,"b":0}"#);
        assert!(err.is_err());
        let ok: OperandPair = serde_json::from_str(r#"{"a":4,"b":6}"#).unwrap();
        assert_eq!(ok, OperandPair::new(4, 6).unwrap());
    }

    #[test]
    fn fixed_corpus_order_and_content() {
        let cases = fixed_corpus();
        assert_eq!(cases.len(), 8);
        assert_eq!(cases[0].operands(), OperandPair { a: 48, b: 18 });
        assert_eq!(cases[6].operands(), OperandPair { a: 1_000_000_000, b: 1 });
        assert_eq!(
            cases[7].operands(),
            OperandPair { a: 999_999_999, b: 999_999_998 }
        );
        assert_eq!(quick_corpus(), cases[..4].to_vec());
    }

    #[test]
    fn sweep_uses_default_offsets() {
        let cases = size_sweep(&default_thresholds(), SweepPolicy::default());
        assert_eq!(cases.len(), 6);
        // 100 - 456 is negative, so b falls back to 100 / 2.
        assert_eq!(cases[0].operands(), OperandPair { a: 223, b: 50 });
        assert_eq!(cases[1].operands(), OperandPair { a: 1123, b: 544 });
        assert_eq!(
            cases[5].operands(),
            OperandPair { a: 10_000_123, b: 9_999_544 }
        );
        assert_eq!(cases[0].label(), "size 10^2");
        assert_eq!(cases[5].label(), "size 10^7");
    }

    #[test]
    fn sweep_never_yields_zero() {
        let policy = SweepPolicy::default();
        for t in default_thresholds().into_iter().chain([0, 1, 2, 456, 457, u64::MAX]) {
            let p = policy.pair_for(t);
            assert!(p.a > 0 && p.b > 0, "threshold {t} gave {p:?}");
        }
        // Exactly at the offset the difference is zero and must be replaced.
        assert_eq!(policy.pair_for(456).b, 228);
    }

    #[test]
    fn powers_of_ten_stop_at_overflow() {
        assert_eq!(powers_of_ten(2, 4), vec![100, 1_000, 10_000]);
        assert_eq!(powers_of_ten(18, 25).len(), 2);
    }

    #[test]
    fn random_corpus_is_seeded() {
        let a = random_corpus(&mut ChaCha8Rng::seed_from_u64(7), 16, 1_000);
        let b = random_corpus(&mut ChaCha8Rng::seed_from_u64(7), 16, 1_000);
        assert_eq!(a, b);
        let in_range = |v: u64| (1..=1_000).contains(&v);
        assert!(a
            .iter()
            .all(|c| in_range(c.operands().a) && in_range(c.operands().b)));
    }
}
