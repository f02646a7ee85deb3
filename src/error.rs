use std::fmt;

use serde::{Deserialize, Serialize};

use crate::corpus::OperandPair;
use crate::Engine;

#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// `gcd(0, 0)` has no defined value.
    #[error("degenerate operand pair ({a}, {b}): gcd(0, 0) is undefined")]
    DegenerateInput { a: u64, b: u64 },

    #[error("{0}")]
    ResultMismatch(MismatchFault),

    #[error("accelerator backend `{0}` is not available on this target")]
    UnsupportedBackend(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Engines disagreed on one case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MismatchFault {
    pub index: usize,
    pub label: String,
    pub operands: OperandPair,
    pub results: Vec<(Engine, u64)>,
}

/// Exit status for harness failures that are not a mismatch.
pub const HARNESS_ERROR_EXIT: u8 = 255;

impl MismatchFault {
    /// 1-based case index as a process exit status, capped below
    /// [`HARNESS_ERROR_EXIT`].
    pub fn exit_code(&self) -> u8 {
        u8::try_from(self.index.saturating_add(1))
            .unwrap_or(HARNESS_ERROR_EXIT - 1)
            .min(HARNESS_ERROR_EXIT - 1)
    }

    /// Engines whose result differs from the accelerator's (or from the first
    /// recorded engine when the accelerator is absent).
    pub fn dissenters(&self) -> Vec<Engine> {
        let Some(&(_, baseline)) = self.results.first() else {
            return Vec::new();
        };
        self.results
            .iter()
            .filter(|(_, r)| *r != baseline)
            .map(|(e, _)| *e)
            .collect()
    }
}

impl fmt::Display for MismatchFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "result mismatch in case #{} `{}` gcd({}, {}):",
            self.index, self.label, self.operands.a, self.operands.b
        )?;
        for (engine, result) in &self.results {
            write!(f, " {}={}", engine.as_str(), result)?;
        }
        Ok(())
    }
}

/// A timing bracket that could not be turned into a cycle count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TimerAnomaly {
    #[error("timer went backwards ({start} -> {end}); counter wrapped or is not monotonic")]
    Backwards { start: u64, end: u64 },

    #[error("implausible delta of {cycles} cycles (limit {limit})")]
    Implausible { cycles: u64, limit: u64 },
}
