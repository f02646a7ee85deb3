//! Software gcd references.
//!
//! These serve both as ground truth for the accelerator and as the cycle
//! baselines it is compared against. Every algorithm reports the number of
//! loop iterations it took alongside the value, so the benchmark can relate
//! cycle counts to the amount of work each algorithm actually did.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::corpus::OperandPair;
use crate::error::BenchError;
use crate::Engine;

/// A gcd value together with the iteration count that produced it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Traced {
    pub value: u64,
    pub steps: u64,
}

/// Selectable software reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reference {
    /// Repeated subtraction; cost grows with max(a, b) / min(a, b).
    Subtractive,
    /// Euclid's remainder algorithm; cost grows with log(min(a, b)).
    Remainder,
    /// Stein's binary algorithm (shifts and subtraction only).
    Binary,
}

impl Reference {
    /// The two baselines the original harness always compared against.
    pub const DEFAULT: [Reference; 2] = [Reference::Subtractive, Reference::Remainder];

    pub fn engine(&self) -> Engine {
        match self {
            Reference::Subtractive => Engine::Subtractive,
            Reference::Remainder => Engine::Remainder,
            Reference::Binary => Engine::Binary,
        }
    }

    pub fn compute(&self, pair: OperandPair) -> Traced {
        match self {
            Reference::Subtractive => subtractive_unchecked(pair.a, pair.b),
            Reference::Remainder => remainder_unchecked(pair.a, pair.b),
            Reference::Binary => binary_unchecked(pair.a, pair.b),
        }
    }
}

fn reject_degenerate(a: u64, b: u64) -> Result<(), BenchError> {
    if a == 0 && b == 0 {
        return Err(BenchError::DegenerateInput { a, b });
    }
    Ok(())
}

/// Subtraction-based gcd, the algorithm the accelerator implements in hardware.
///
/// Stops as soon as the operands are equal or one of them is zero. `(n, 1)`
/// therefore takes exactly `n - 1` steps.
pub fn subtractive(a: u64, b: u64) -> Result<Traced, BenchError> {
    reject_degenerate(a, b)?;
    Ok(subtractive_unchecked(a, b))
}

/// Remainder-based gcd.
pub fn remainder(a: u64, b: u64) -> Result<Traced, BenchError> {
    reject_degenerate(a, b)?;
    Ok(remainder_unchecked(a, b))
}

/// Binary (Stein) gcd.
pub fn binary(a: u64, b: u64) -> Result<Traced, BenchError> {
    reject_degenerate(a, b)?;
    Ok(binary_unchecked(a, b))
}

fn subtractive_unchecked(mut a: u64, mut b: u64) -> Traced {
    let mut steps = 0u64;
    while a != 0 && b != 0 && a != b {
        if a > b {
            a -= b;
        } else {
            b -= a;
        }
        steps += 1;
    }
    let value = if a == 0 { b } else { a };
    Traced { value, steps }
}

fn remainder_unchecked(a: u64, b: u64) -> Traced {
    // Ordering first keeps the swap step out of the iteration count.
    let (mut a, mut b) = (a.max(b), a.min(b));
    let mut steps = 0u64;
    while b != 0 && a != b {
        let r = a % b;
        a = b;
        b = r;
        steps += 1;
    }
    Traced { value: a, steps }
}

fn binary_unchecked(mut a: u64, mut b: u64) -> Traced {
    if a == 0 {
        return Traced { value: b, steps: 0 };
    }
    if b == 0 {
        return Traced { value: a, steps: 0 };
    }

    let shift = (a | b).trailing_zeros();
    a >>= a.trailing_zeros();
    let mut steps = 0u64;
    loop {
        b >>= b.trailing_zeros();
        if a > b {
            std::mem::swap(&mut a, &mut b);
        }
        b -= a;
        steps += 1;
        if b == 0 {
            break;
        }
    }
    Traced {
        value: a << shift,
        steps,
    }
}
