//! Runs every engine on every case, cross-checks the results and keeps the
//! cycle totals.
//!
//! Per case the runner walks `PENDING -> MEASURING(engine)... -> VALIDATED |
//! MISMATCH`, one engine at a time in declared order with the accelerator
//! first. Everything is sequential: the accelerator takes one request at a
//! time and interleaving would pollute the timings.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::accel::{Accelerator, AcceleratorProxy};
use crate::corpus::TestCase;
use crate::error::{BenchError, MismatchFault, TimerAnomaly};
use crate::harness::{measure, BenchConfig, Measurement, Mode};
use crate::reference::Reference;
use crate::timer::CycleTimer;
use crate::Engine;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaseStatus {
    Validated,
    Mismatch,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CaseOutcome {
    pub index: usize,
    pub case: TestCase,
    /// In execution order.
    pub measurements: Vec<(Engine, Measurement)>,
    pub status: CaseStatus,
}

impl CaseOutcome {
    /// True iff every engine returned the same value.
    pub fn consistent(&self) -> bool {
        let mut results = self.measurements.iter().map(|(_, m)| m.result);
        match results.next() {
            Some(first) => results.all(|r| r == first),
            None => true,
        }
    }

    pub fn measurement(&self, engine: Engine) -> Option<&Measurement> {
        self.measurements
            .iter()
            .find(|(e, _)| *e == engine)
            .map(|(_, m)| m)
    }

    pub fn anomalies(&self) -> impl Iterator<Item = (Engine, TimerAnomaly)> + '_ {
        self.measurements
            .iter()
            .filter_map(|(e, m)| m.timing.anomaly().map(|a| (*e, a)))
    }

    /// `engine` cycles over accelerator cycles for this case.
    pub fn speedup(&self, engine: Engine) -> Option<f64> {
        let accel = self.measurement(Engine::Accelerator)?.cycles()?;
        let other = self.measurement(engine)?.cycles()?;
        speedup(other, accel)
    }

    fn fault(&self) -> MismatchFault {
        MismatchFault {
            index: self.index,
            label: self.case.label().to_string(),
            operands: self.case.operands(),
            results: self
                .measurements
                .iter()
                .map(|(e, m)| (*e, m.result))
                .collect(),
        }
    }
}

/// `reference / accelerator`; `None` when the accelerator took zero cycles.
pub fn speedup(reference: u64, accelerator: u64) -> Option<f64> {
    if accelerator == 0 {
        return None;
    }
    Some(reference as f64 / accelerator as f64)
}

/// Cycle totals over the cases that may contribute to them.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub cycles: BTreeMap<Engine, u64>,
    /// Cases folded into `cycles`.
    pub validated: usize,
    pub mismatched: usize,
    /// Consistent cases left out because a timing bracket was anomalous.
    pub anomalous: usize,
}

impl Totals {
    /// Adds a finished case. Mismatched or anomalous cases contribute no cycles.
    pub fn fold(&mut self, outcome: &CaseOutcome) {
        if outcome.status == CaseStatus::Mismatch {
            self.mismatched += 1;
            return;
        }
        if outcome.anomalies().next().is_some() {
            self.anomalous += 1;
            return;
        }
        for (engine, m) in &outcome.measurements {
            if let Some(c) = m.cycles() {
                let slot = self.cycles.entry(*engine).or_default();
                *slot = slot.saturating_add(c);
            }
        }
        self.validated += 1;
    }

    pub fn cycles(&self, engine: Engine) -> u64 {
        self.cycles.get(&engine).copied().unwrap_or(0)
    }

    /// Overall `total_engine / total_accelerator`.
    pub fn speedup(&self, engine: Engine) -> Option<f64> {
        speedup(self.cycles(engine), self.cycles(Engine::Accelerator))
    }
}

/// Everything one pass over a corpus produced.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CorpusRun {
    pub outcomes: Vec<CaseOutcome>,
    pub totals: Totals,
    pub faults: Vec<MismatchFault>,
}

impl CorpusRun {
    /// Rebuilds totals and faults from finished cases, e.g. the prefix a
    /// fail-fast run got through before stopping.
    pub fn from_outcomes(outcomes: Vec<CaseOutcome>) -> Self {
        let mut totals = Totals::default();
        let mut faults = Vec::new();
        for o in &outcomes {
            totals.fold(o);
            if o.status == CaseStatus::Mismatch {
                faults.push(o.fault());
            }
        }
        Self {
            outcomes,
            totals,
            faults,
        }
    }
}

pub struct Runner<A, T> {
    proxy: AcceleratorProxy<A>,
    timer: T,
    references: Vec<Reference>,
    cfg: BenchConfig,
}

impl<A: Accelerator, T: CycleTimer> Runner<A, T> {
    pub fn new(accelerator: A, timer: T, references: Vec<Reference>, cfg: BenchConfig) -> Self {
        let mut refs: Vec<Reference> = Vec::with_capacity(references.len());
        for r in references {
            if !refs.contains(&r) {
                refs.push(r);
            }
        }
        Self {
            proxy: AcceleratorProxy::new(accelerator),
            timer,
            references: refs,
            cfg,
        }
    }

    /// Engines in execution order.
    pub fn engines(&self) -> Vec<Engine> {
        std::iter::once(Engine::Accelerator)
            .chain(self.references.iter().map(Reference::engine))
            .collect()
    }

    pub fn config(&self) -> &BenchConfig {
        &self.cfg
    }

    pub fn accelerator(&self) -> &AcceleratorProxy<A> {
        &self.proxy
    }

    pub fn run_case(&mut self, index: usize, case: &TestCase) -> CaseOutcome {
        let pair = case.operands();
        let limit = self.cfg.max_plausible_cycles;
        trace!(index, label = case.label(), "pending");

        let mut measurements = Vec::with_capacity(1 + self.references.len());

        trace!(index, engine = Engine::Accelerator.as_str(), "measuring");
        let proxy = &mut self.proxy;
        let m = measure(&mut self.timer, limit, || proxy.compute(pair));
        measurements.push((Engine::Accelerator, m));

        for r in &self.references {
            trace!(index, engine = r.engine().as_str(), "measuring");
            let m = measure(&mut self.timer, limit, || r.compute(pair).value);
            measurements.push((r.engine(), m));
        }

        let mut outcome = CaseOutcome {
            index,
            case: case.clone(),
            measurements,
            status: CaseStatus::Validated,
        };
        if !outcome.consistent() {
            outcome.status = CaseStatus::Mismatch;
        }

        for (engine, anomaly) in outcome.anomalies() {
            warn!(index, label = case.label(), engine = engine.as_str(), %anomaly, "timer anomaly");
        }
        trace!(index, status = ?outcome.status, "case finished");
        outcome
    }

    /// Runs `cases` in order.
    ///
    /// In [`Mode::Verify`] the first mismatch is returned as
    /// [`BenchError::ResultMismatch`]; in [`Mode::Benchmark`] it is recorded
    /// and the run continues.
    pub fn run(&mut self, cases: &[TestCase]) -> Result<CorpusRun, BenchError> {
        self.run_with(cases, |_| {})
    }

    /// Like [`Runner::run`], handing each case to `on_case` as soon as it
    /// finishes. The mismatching case that stops a verify run is delivered too.
    pub fn run_with(
        &mut self,
        cases: &[TestCase],
        mut on_case: impl FnMut(&CaseOutcome),
    ) -> Result<CorpusRun, BenchError> {
        let mut run = CorpusRun::default();

        for (index, case) in cases.iter().enumerate() {
            let outcome = self.run_case(index, case);
            on_case(&outcome);

            if outcome.status == CaseStatus::Mismatch {
                let fault = outcome.fault();
                if self.cfg.mode == Mode::Verify {
                    return Err(BenchError::ResultMismatch(fault));
                }
                warn!(%fault, "excluding case from totals");
                run.faults.push(fault);
            } else {
                debug!(
                    index,
                    label = case.label(),
                    result = outcome.measurements[0].1.result,
                    "validated"
                );
            }

            run.totals.fold(&outcome);
            run.outcomes.push(outcome);
        }

        info!(
            cases = cases.len(),
            validated = run.totals.validated,
            mismatched = run.totals.mismatched,
            anomalous = run.totals.anomalous,
            "corpus finished"
        );
        Ok(run)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::accel::SoftAccelerator;
    use crate::corpus::{quick_corpus, size_sweep, verification_corpus, OperandPair, SweepPolicy};
    use crate::timer::tests::ScriptedTimer;
    use crate::timer::{InstantTimer, Timing};

    /// Correct except for one poisoned operand pair.
    struct Poisoned {
        inner: SoftAccelerator,
        bad: OperandPair,
        pending: Option<(u64, u64)>,
    }

    impl Accelerator for Poisoned {
        fn start(&mut self, a: u64, b: u64) {
            self.pending = Some((a, b));
            self.inner.start(a, b);
        }

        fn read(&mut self) -> u64 {
            let value = self.inner.read();
            match self.pending.take() {
                Some((a, b)) if a == self.bad.a && b == self.bad.b => value + 1,
                _ => value,
            }
        }

        fn name(&self) -> &'static str {
            "poisoned"
        }
    }

    fn poisoned(a: u64, b: u64) -> Poisoned {
        Poisoned {
            inner: SoftAccelerator::default(),
            bad: OperandPair::new(a, b).unwrap(),
            pending: None,
        }
    }

    fn verify_cfg() -> BenchConfig {
        BenchConfig {
            mode: Mode::Verify,
            ..Default::default()
        }
    }

    #[test]
    fn accelerator_runs_first_then_references_in_order() {
        let mut runner = Runner::new(
            SoftAccelerator::default(),
            InstantTimer::new(),
            vec![Reference::Remainder, Reference::Subtractive, Reference::Remainder],
            BenchConfig::default(),
        );
        assert_eq!(
            runner.engines(),
            vec![Engine::Accelerator, Engine::Remainder, Engine::Subtractive]
        );
        let case = &verification_corpus()[0];
        let outcome = runner.run_case(0, case);
        let order: Vec<Engine> = outcome.measurements.iter().map(|(e, _)| *e).collect();
        assert_eq!(order, runner.engines());
    }

    #[test]
    fn verification_corpus_passes_with_soft_accelerator() {
        let mut runner = Runner::new(
            SoftAccelerator::default(),
            InstantTimer::new(),
            Reference::DEFAULT.to_vec(),
            verify_cfg(),
        );
        let run = runner.run(&verification_corpus()).unwrap();
        let results: Vec<u64> = run
            .outcomes
            .iter()
            .map(|o| o.measurements[0].1.result)
            .collect();
        assert_eq!(results, vec![6, 1, 42]);
        assert!(run.faults.is_empty());
        assert_eq!(runner.accelerator().served(), 3);
    }

    #[test]
    fn verify_mode_stops_at_first_mismatch() {
        let mut runner = Runner::new(
            poisoned(17, 13),
            InstantTimer::new(),
            Reference::DEFAULT.to_vec(),
            verify_cfg(),
        );
        let err = runner.run(&verification_corpus()).unwrap_err();
        match err {
            BenchError::ResultMismatch(fault) => {
                assert_eq!(fault.index, 1);
                assert_eq!(fault.label, "coprime");
                assert_eq!(fault.results[0], (Engine::Accelerator, 2));
                assert_eq!(fault.dissenters(), vec![Engine::Subtractive, Engine::Remainder]);
            }
            other => panic!("unexpected error: {other}"),
        }
        // The third case never ran.
        assert_eq!(runner.accelerator().served(), 2);
    }

    #[test]
    fn verify_mode_hands_out_cases_before_stopping() {
        let mut runner = Runner::new(
            poisoned(42, 42),
            InstantTimer::new(),
            Reference::DEFAULT.to_vec(),
            verify_cfg(),
        );
        let mut seen = Vec::new();
        let err = runner
            .run_with(&verification_corpus(), |o| seen.push(o.clone()))
            .unwrap_err();
        assert!(matches!(err, BenchError::ResultMismatch(ref f) if f.exit_code() == 3));

        let statuses: Vec<CaseStatus> = seen.iter().map(|o| o.status).collect();
        assert_eq!(
            statuses,
            vec![CaseStatus::Validated, CaseStatus::Validated, CaseStatus::Mismatch]
        );

        let partial = CorpusRun::from_outcomes(seen);
        assert_eq!(partial.totals.validated + partial.totals.anomalous, 2);
        assert_eq!(partial.totals.mismatched, 1);
        assert_eq!(partial.faults.len(), 1);
        assert_eq!(partial.faults[0].label, "equal operands");
    }

    #[test]
    fn from_outcomes_agrees_with_a_full_run() {
        let mut runner = Runner::new(
            poisoned(17, 13),
            InstantTimer::new(),
            Reference::DEFAULT.to_vec(),
            BenchConfig::default(),
        );
        let run = runner.run(&verification_corpus()).unwrap();
        let rebuilt = CorpusRun::from_outcomes(run.outcomes.clone());
        assert_eq!(rebuilt.totals, run.totals);
        assert_eq!(rebuilt.faults, run.faults);
    }

    #[test]
    fn benchmark_mode_continues_and_excludes_mismatch() {
        // Two timer reads per engine, three engines per case, three cases.
        // Every bracket is 10 cycles for the accelerator and 100/50 for references.
        let mut ticks = Vec::new();
        let mut now = 0u64;
        for _ in 0..3 {
            for delta in [10u64, 100, 50] {
                ticks.push(now);
                now += delta;
                ticks.push(now);
            }
        }
        let mut runner = Runner::new(
            poisoned(17, 13),
            ScriptedTimer::new(ticks),
            Reference::DEFAULT.to_vec(),
            BenchConfig::default(),
        );
        let run = runner.run(&verification_corpus()).unwrap();

        assert_eq!(run.outcomes.len(), 3);
        assert_eq!(run.outcomes[1].status, CaseStatus::Mismatch);
        assert!(!run.outcomes[1].consistent());
        assert_eq!(run.faults.len(), 1);
        assert_eq!(run.faults[0].index, 1);

        assert_eq!(run.totals.validated, 2);
        assert_eq!(run.totals.mismatched, 1);
        assert_eq!(run.totals.cycles(Engine::Accelerator), 20);
        assert_eq!(run.totals.cycles(Engine::Subtractive), 200);
        assert_eq!(run.totals.cycles(Engine::Remainder), 100);
        assert_eq!(run.totals.speedup(Engine::Subtractive), Some(10.0));
        assert_eq!(run.outcomes[0].speedup(Engine::Remainder), Some(5.0));
    }

    #[test]
    fn totals_equal_sum_of_validated_cases() {
        let mut runner = Runner::new(
            SoftAccelerator::default(),
            InstantTimer::new(),
            vec![Reference::Subtractive, Reference::Remainder, Reference::Binary],
            BenchConfig::default(),
        );
        let cases = size_sweep(&[100, 1_000, 10_000], SweepPolicy::default());
        let run = runner.run(&cases).unwrap();
        for engine in runner.engines() {
            let sum: u64 = run
                .outcomes
                .iter()
                .filter(|o| o.status == CaseStatus::Validated && o.anomalies().next().is_none())
                .filter_map(|o| o.measurement(engine).and_then(Measurement::cycles))
                .sum();
            assert_eq!(run.totals.cycles(engine), sum, "{engine:?}");
        }
    }

    #[test]
    fn anomalous_bracket_is_flagged_and_excluded() {
        // Accelerator bracket runs backwards; references are fine.
        let ticks = [500, 400, 0, 30, 30, 40];
        let mut runner = Runner::new(
            SoftAccelerator::default(),
            ScriptedTimer::new(ticks),
            Reference::DEFAULT.to_vec(),
            BenchConfig::default(),
        );
        let run = runner.run(&quick_corpus()[..1]).unwrap();
        let outcome = &run.outcomes[0];
        assert_eq!(outcome.status, CaseStatus::Validated);
        assert!(matches!(
            outcome.measurement(Engine::Accelerator).unwrap().timing,
            Timing::Anomaly(TimerAnomaly::Backwards { start: 500, end: 400 })
        ));
        assert_eq!(outcome.speedup(Engine::Subtractive), None);
        assert_eq!(run.totals.anomalous, 1);
        assert_eq!(run.totals.validated, 0);
        assert!(run.totals.cycles.is_empty());
    }

    #[test]
    fn zero_accelerator_cycles_has_no_ratio() {
        assert_eq!(speedup(100, 0), None);
        assert_eq!(speedup(30, 10), Some(3.0));
    }
}
