use serde::{Deserialize, Serialize};

pub mod accel;
pub mod corpus;
pub mod error;
pub mod harness;
pub mod reference;
pub mod report;
pub mod runner;
pub mod schema;
pub mod timer;

pub use error::{BenchError, MismatchFault, TimerAnomaly};

/// One implementation of gcd under measurement.
///
/// The accelerator always runs first; references follow in the order they
/// were configured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Engine {
    /// Custom-instruction GCD accelerator.
    Accelerator,
    /// Repeated subtraction (same algorithm as the hardware state machine).
    Subtractive,
    /// Euclid's remainder algorithm.
    Remainder,
    /// Stein's binary algorithm.
    Binary,
}

impl Engine {
    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Accelerator => "accelerator",
            Engine::Subtractive => "subtractive",
            Engine::Remainder => "remainder",
            Engine::Binary => "binary",
        }
    }

    /// Short column header used by the text tables.
    pub fn short(&self) -> &'static str {
        match self {
            Engine::Accelerator => "HW",
            Engine::Subtractive => "SW-sub",
            Engine::Remainder => "SW-rem",
            Engine::Binary => "SW-bin",
        }
    }
}
