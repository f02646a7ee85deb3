//! Cycle sources used to bracket each measured call.
//!
//! A "cycle" here is whatever unit the active [`CycleTimer`] counts in: real
//! core cycles for [`CycleCounter`], nanoseconds for [`InstantTimer`]. Deltas
//! are only ever compared within a single run, so the unit never mixes.

use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::error::TimerAnomaly;

/// The `read_timer` capability: a free-running, non-decreasing counter.
pub trait CycleTimer {
    fn now(&mut self) -> u64;
}

impl<T: CycleTimer + ?Sized> CycleTimer for Box<T> {
    fn now(&mut self) -> u64 {
        (**self).now()
    }
}

/// Result of one timing bracket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Timing {
    Cycles(u64),
    Anomaly(TimerAnomaly),
}

impl Timing {
    pub fn cycles(&self) -> Option<u64> {
        match self {
            Timing::Cycles(c) => Some(*c),
            Timing::Anomaly(_) => None,
        }
    }

    pub fn anomaly(&self) -> Option<TimerAnomaly> {
        match self {
            Timing::Cycles(_) => None,
            Timing::Anomaly(a) => Some(*a),
        }
    }
}

/// Turns two counter reads into a delta without ever wrapping.
pub fn elapsed(start: u64, end: u64, limit: u64) -> Timing {
    match end.checked_sub(start) {
        None => Timing::Anomaly(TimerAnomaly::Backwards { start, end }),
        Some(cycles) if cycles > limit => {
            Timing::Anomaly(TimerAnomaly::Implausible { cycles, limit })
        }
        Some(cycles) => Timing::Cycles(cycles),
    }
}

/// Portable monotonic clock counting nanoseconds since construction.
#[derive(Clone, Copy, Debug)]
pub struct InstantTimer {
    origin: Instant,
}

impl InstantTimer {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for InstantTimer {
    fn default() -> Self {
        Self::new()
    }
}

impl CycleTimer for InstantTimer {
    #[inline]
    fn now(&mut self) -> u64 {
        // u64 nanoseconds last ~584 years past the origin.
        u64::try_from(self.origin.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }
}

/// The core's own cycle counter (`rdcycle` on RISC-V, fenced `rdtsc` on x86_64).
#[derive(Clone, Copy, Debug)]
pub struct CycleCounter {
    _private: (),
}

impl CycleCounter {
    /// `None` when the target has no supported counter instruction.
    pub fn new() -> Option<Self> {
        if cfg!(any(target_arch = "riscv64", target_arch = "x86_64")) {
            Some(Self { _private: () })
        } else {
            None
        }
    }
}

impl CycleTimer for CycleCounter {
    #[inline]
    fn now(&mut self) -> u64 {
        read_cycles()
    }
}

#[cfg(target_arch = "riscv64")]
#[inline]
fn read_cycles() -> u64 {
    let cycles: u64;
    // SAFETY: rdcycle only reads the cycle CSR.
    unsafe {
        core::arch::asm!(
            "rdcycle {0}",
            out(reg) cycles,
            options(nomem, nostack, preserves_flags),
        );
    }
    cycles
}

#[cfg(target_arch = "x86_64")]
#[inline]
fn read_cycles() -> u64 {
    let lo: u32;
    let hi: u32;
    // SAFETY: LFENCE and RDTSC are always available on x86_64 and only read
    // the timestamp counter.
    unsafe {
        core::arch::asm!(
            "lfence",
            "rdtsc",
            "lfence",
            out("eax") lo,
            out("edx") hi,
            options(nomem, nostack, preserves_flags),
        );
    }
    (u64::from(hi) << 32) | u64::from(lo)
}

#[cfg(not(any(target_arch = "riscv64", target_arch = "x86_64")))]
#[inline]
fn read_cycles() -> u64 {
    // Unreachable in practice: CycleCounter::new() refuses these targets.
    0
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Replays a fixed sequence of counter values.
    pub(crate) struct ScriptedTimer(pub VecDeque<u64>);

    impl ScriptedTimer {
        pub(crate) fn new(values: impl IntoIterator<Item = u64>) -> Self {
            Self(values.into_iter().collect())
        }
    }

    impl CycleTimer for ScriptedTimer {
        fn now(&mut self) -> u64 {
            self.0.pop_front().expect("scripted timer exhausted")
        }
    }

    #[test]
    fn elapsed_forward() {
        assert_eq!(elapsed(10, 25, u64::MAX), Timing::Cycles(15));
        assert_eq!(elapsed(7, 7, 0), Timing::Cycles(0));
    }

    #[test]
    fn elapsed_backwards_is_flagged_not_wrapped() {
        let t = elapsed(u64::MAX - 3, 5, u64::MAX);
        assert_eq!(
            t,
            Timing::Anomaly(TimerAnomaly::Backwards {
                start: u64::MAX - 3,
                end: 5
            })
        );
        assert_eq!(t.cycles(), None);
    }

    #[test]
    fn elapsed_over_limit_is_flagged() {
        let t = elapsed(0, 1_000, 999);
        assert_eq!(
            t.anomaly(),
            Some(TimerAnomaly::Implausible {
                cycles: 1_000,
                limit: 999
            })
        );
    }

    #[test]
    fn instant_timer_is_monotonic() {
        let mut t = InstantTimer::new();
        let a = t.now();
        let b = t.now();
        assert!(b >= a);
    }

    #[cfg(any(target_arch = "riscv64", target_arch = "x86_64"))]
    #[test]
    fn cycle_counter_advances() {
        let mut t = CycleCounter::new().unwrap();
        let a = t.now();
        std::hint::black_box((0..1_000u64).sum::<u64>());
        let b = t.now();
        assert!(b >= a);
    }

    #[test]
    fn boxed_timer_forwards() {
        let mut t: Box<dyn CycleTimer> = Box::new(ScriptedTimer::new([3, 9]));
        assert_eq!(t.now(), 3);
        assert_eq!(t.now(), 9);
    }
}
