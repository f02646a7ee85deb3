//! Plain-text tables for a finished run.
//!
//! Column widths are cosmetic. Every row carries the label, both operands,
//! cycles per engine and one `engine/HW` ratio per software reference.

use std::fmt::Write;

use crate::runner::{speedup, CaseOutcome, CaseStatus, CorpusRun, Totals};
use crate::Engine;

const RULE_CHAR: char = '-';

/// Most fractional digits [`RatioStyle::FixedPoint`] prints; `u64::MAX * 10^18`
/// still fits the `u128` intermediate.
pub const MAX_DECIMALS: u32 = 18;

/// How speedup ratios are printed.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RatioStyle {
    /// `{:.2}x` from a floating-point ratio.
    #[default]
    Float,
    /// Integer arithmetic only, truncated to `decimals` places (at most
    /// [`MAX_DECIMALS`]).
    FixedPoint { decimals: u32 },
}

/// `reference / accelerator` as text, or `N/A` when the accelerator took
/// zero cycles.
pub fn format_ratio(style: RatioStyle, reference: u64, accelerator: u64) -> String {
    match style {
        RatioStyle::Float => match speedup(reference, accelerator) {
            Some(r) => format!("{r:.2}x"),
            None => "N/A".to_string(),
        },
        RatioStyle::FixedPoint { decimals } => fixed_point(reference, accelerator, decimals),
    }
}

fn fixed_point(num: u64, den: u64, decimals: u32) -> String {
    if den == 0 {
        return "N/A".to_string();
    }
    let decimals = decimals.min(MAX_DECIMALS);
    let scale = 10u128.pow(decimals);
    let scaled = u128::from(num) * scale / u128::from(den);
    let whole = scaled / scale;
    if decimals == 0 {
        return format!("{whole}x");
    }
    let frac = scaled % scale;
    format!("{whole}.{frac:0width$}x", width = decimals as usize)
}

fn references(engines: &[Engine]) -> impl Iterator<Item = Engine> + '_ {
    engines.iter().copied().filter(|e| *e != Engine::Accelerator)
}

fn cycles_cell(outcome: &CaseOutcome, engine: Engine) -> String {
    match outcome.measurement(engine) {
        Some(m) => match m.cycles() {
            Some(c) => c.to_string(),
            None => "!anomaly".to_string(),
        },
        None => "-".to_string(),
    }
}

fn ratio_cell(outcome: &CaseOutcome, engine: Engine, style: RatioStyle) -> String {
    let accel = outcome
        .measurement(Engine::Accelerator)
        .and_then(|m| m.cycles());
    let other = outcome.measurement(engine).and_then(|m| m.cycles());
    match (other, accel) {
        (Some(o), Some(a)) => format_ratio(style, o, a),
        _ => "N/A".to_string(),
    }
}

/// Renders one corpus: a row per case, then the totals block.
///
/// `key` heads the first column ("case" for curated sets, "size" for the sweep).
pub fn render_corpus(
    title: &str,
    key: &str,
    engines: &[Engine],
    run: &CorpusRun,
    style: RatioStyle,
) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "===== {title} =====");

    let mut header = format!("{key:<26} {:>12} {:>12} |", "a", "b");
    for e in engines {
        let _ = write!(header, " {:>12}", e.short());
    }
    header.push_str(" |");
    for e in references(engines) {
        let _ = write!(header, " {:>10}", format!("{}/HW", e.short()));
    }
    let rule: String = std::iter::repeat(RULE_CHAR).take(header.len()).collect();
    let _ = writeln!(out, "{header}");
    let _ = writeln!(out, "{rule}");

    for outcome in &run.outcomes {
        let pair = outcome.case.operands();
        let mut row = format!("{:<26} {:>12} {:>12} |", outcome.case.label(), pair.a, pair.b);

        if outcome.status == CaseStatus::Mismatch {
            row.push_str(" MISMATCH:");
            for (engine, m) in &outcome.measurements {
                let _ = write!(row, " {}={}", engine.as_str(), m.result);
            }
            let _ = writeln!(out, "{row}");
            continue;
        }

        for e in engines {
            let _ = write!(row, " {:>12}", cycles_cell(outcome, *e));
        }
        row.push_str(" |");
        for e in references(engines) {
            let _ = write!(row, " {:>10}", ratio_cell(outcome, e, style));
        }
        let _ = writeln!(out, "{row}");

        for (engine, anomaly) in outcome.anomalies() {
            let _ = writeln!(out, "  ! {}: {anomaly}", engine.as_str());
        }
    }

    let _ = writeln!(out, "{rule}");
    out.push_str(&render_totals(engines, &run.totals, style));
    out
}

/// Grand totals and overall ratios across validated cases.
pub fn render_totals(engines: &[Engine], totals: &Totals, style: RatioStyle) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "validated: {}  mismatched: {}  timer anomalies: {}",
        totals.validated, totals.mismatched, totals.anomalous
    );

    let mut line = String::from("total cycles:");
    for e in engines {
        let _ = write!(line, " {}={}", e.short(), totals.cycles(*e));
    }
    let _ = writeln!(out, "{line}");

    let mut line = String::from("overall speedup:");
    let accel = totals.cycles(Engine::Accelerator);
    for e in references(engines) {
        let _ = write!(
            line,
            " {}/HW={}",
            e.short(),
            format_ratio(style, totals.cycles(e), accel)
        );
    }
    let _ = writeln!(out, "{line}");
    out
}

/// Questions to read the tables against.
pub const GUIDANCE: [&str; 4] = [
    "Does the accelerator take a roughly fixed number of cycles regardless of operand size?",
    "Does software cycle count grow as the operands get larger?",
    "How does the remainder-based software compare with the accelerator?",
    "For which kinds of operands does offloading to hardware actually pay off?",
];

pub fn render_guidance() -> String {
    let mut out = String::from("Key observations:\n");
    for (i, line) in GUIDANCE.iter().enumerate() {
        let _ = writeln!(out, "{}. {line}", i + 1);
    }
    out
}
