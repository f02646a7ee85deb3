//! The GCD accelerator as seen from the core: two custom instructions.
//!
//! `start(a, b)` latches the operands and kicks off the state machine;
//! `read()` stalls until the result is ready. [`AcceleratorProxy`] folds the
//! pair into a single synchronous call.
//!
//! There is no timeout on `read()`. If the accelerator never completes, the
//! calling thread blocks forever; a timeout would distort the cycle counts this
//! harness exists to measure.

use tracing::{debug, warn};

use crate::corpus::OperandPair;
use crate::error::BenchError;
use crate::reference::Reference;

/// RoCC funct7 selecting the operand-latching instruction.
pub const GCD_START: u32 = 0;
/// RoCC funct7 selecting the blocking result read.
pub const GCD_READ: u32 = 1;

/// Raw two-phase accelerator protocol (the `invoke_accelerator` capability).
pub trait Accelerator {
    /// Fire-and-forget operand submission.
    fn start(&mut self, a: u64, b: u64);

    /// Blocks until the outstanding request completes.
    fn read(&mut self) -> u64;

    fn name(&self) -> &'static str;
}

impl<A: Accelerator + ?Sized> Accelerator for Box<A> {
    fn start(&mut self, a: u64, b: u64) {
        (**self).start(a, b)
    }

    fn read(&mut self) -> u64 {
        (**self).read()
    }

    fn name(&self) -> &'static str {
        (**self).name()
    }
}

/// Synchronous front for an [`Accelerator`].
///
/// `compute` borrows the proxy mutably and only returns after `read`, so a
/// second `start` can never be issued while a request is in flight.
pub struct AcceleratorProxy<A> {
    inner: A,
    served: u64,
}

impl<A: Accelerator> AcceleratorProxy<A> {
    pub fn new(inner: A) -> Self {
        Self { inner, served: 0 }
    }

    pub fn compute(&mut self, pair: OperandPair) -> u64 {
        self.inner.start(pair.a, pair.b);
        let result = self.inner.read();
        self.served += 1;
        result
    }

    /// Like [`compute`](Self::compute) for unvalidated operands. `(0, 0)` is
    /// refused before anything reaches the accelerator.
    pub fn compute_raw(&mut self, a: u64, b: u64) -> Result<u64, BenchError> {
        let pair = OperandPair::new(a, b)?;
        Ok(self.compute(pair))
    }

    /// Number of completed start/read round trips.
    pub fn served(&self) -> u64 {
        self.served
    }

    pub fn name(&self) -> &'static str {
        self.inner.name()
    }

    pub fn into_inner(self) -> A {
        debug!(backend = self.inner.name(), served = self.served, "accelerator released");
        self.inner
    }
}

/// What the soft accelerator currently holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Latch {
    Idle,
    Pair(OperandPair),
    Degenerate,
}

/// Test double: latches operands and answers with a software reference.
///
/// Hardware given `(0, 0)`, or read with nothing outstanding, never answers.
/// This double panics in both cases instead of returning a made-up value.
#[derive(Clone, Debug)]
pub struct SoftAccelerator {
    algorithm: Reference,
    latch: Latch,
}

impl SoftAccelerator {
    pub fn new(algorithm: Reference) -> Self {
        Self {
            algorithm,
            latch: Latch::Idle,
        }
    }
}

impl Default for SoftAccelerator {
    fn default() -> Self {
        Self::new(Reference::Remainder)
    }
}

impl Accelerator for SoftAccelerator {
    fn start(&mut self, a: u64, b: u64) {
        if self.latch != Latch::Idle {
            warn!(a, b, "start issued while a request was still outstanding");
        }
        self.latch = match OperandPair::new(a, b) {
            Ok(pair) => Latch::Pair(pair),
            Err(_) => Latch::Degenerate,
        };
    }

    fn read(&mut self) -> u64 {
        match std::mem::replace(&mut self.latch, Latch::Idle) {
            Latch::Pair(pair) => self.algorithm.compute(pair).value,
            Latch::Degenerate => panic!("soft accelerator: gcd(0, 0) would never complete"),
            Latch::Idle => panic!("soft accelerator: read with no outstanding request"),
        }
    }

    fn name(&self) -> &'static str {
        "soft"
    }
}

/// The real RoCC accelerator on custom-0, opcode 0x0b.
#[cfg(target_arch = "riscv64")]
#[derive(Debug, Default)]
pub struct RoccAccelerator {
    _private: (),
}

#[cfg(target_arch = "riscv64")]
impl RoccAccelerator {
    pub fn new() -> Self {
        Self { _private: () }
    }
}

#[cfg(target_arch = "riscv64")]
impl Accelerator for RoccAccelerator {
    #[inline]
    fn start(&mut self, a: u64, b: u64) {
        // funct3 0b011: xs1 and xs2 set, no destination.
        // SAFETY: the instruction only transfers two registers to the coprocessor.
        unsafe {
            core::arch::asm!(
                ".insn r 0x0b, 3, {f7}, x0, {a}, {b}",
                f7 = const GCD_START,
                a = in(reg) a,
                b = in(reg) b,
                options(nostack),
            );
        }
    }

    #[inline]
    fn read(&mut self) -> u64 {
        let result: u64;
        // funct3 0b100: xd set, no sources. Stalls until the coprocessor responds.
        // SAFETY: the instruction only writes the destination register.
        unsafe {
            core::arch::asm!(
                ".insn r 0x0b, 4, {f7}, {rd}, x0, x0",
                f7 = const GCD_READ,
                rd = out(reg) result,
                options(nostack),
            );
        }
        result
    }

    fn name(&self) -> &'static str {
        "rocc"
    }
}

/// Returns the RoCC backend, or `UnsupportedBackend` off RISC-V.
#[cfg(target_arch = "riscv64")]
pub fn rocc() -> Result<Box<dyn Accelerator>, BenchError> {
    Ok(Box::new(RoccAccelerator::new()))
}

#[cfg(not(target_arch = "riscv64"))]
pub fn rocc() -> Result<Box<dyn Accelerator>, BenchError> {
    Err(BenchError::UnsupportedBackend("rocc"))
}
