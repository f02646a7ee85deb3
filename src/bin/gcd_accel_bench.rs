use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{anyhow, Context, Result};
use clap::error::ErrorKind;
use clap::{Parser, Subcommand, ValueEnum};
use gcd_accel_bench::accel::{self, Accelerator, SoftAccelerator};
use gcd_accel_bench::corpus::{self, SweepPolicy, TestCase};
use gcd_accel_bench::error::HARNESS_ERROR_EXIT;
use gcd_accel_bench::harness::{BenchConfig, Mode, Profile, DEFAULT_MAX_PLAUSIBLE_CYCLES};
use gcd_accel_bench::reference::Reference;
use gcd_accel_bench::report::{self, RatioStyle, MAX_DECIMALS};
use gcd_accel_bench::runner::{CaseOutcome, CaseStatus, CorpusRun, Runner};
use gcd_accel_bench::schema::{BenchReport, CorpusReport, RunMeta};
use gcd_accel_bench::timer::{CycleCounter, CycleTimer, InstantTimer};
use gcd_accel_bench::{BenchError, MismatchFault};
use tracing::{error, info};

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ProfileArg {
    Quick,
    Full,
}

impl From<ProfileArg> for Profile {
    fn from(v: ProfileArg) -> Self {
        match v {
            ProfileArg::Quick => Profile::Quick,
            ProfileArg::Full => Profile::Full,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum BackendArg {
    /// Software double answering with a reference algorithm.
    Soft,
    /// RoCC custom instructions (riscv64 only).
    Rocc,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TimerArg {
    /// Monotonic clock in nanoseconds.
    Instant,
    /// Core cycle counter (rdcycle / rdtsc).
    Cycle,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum FormatArg {
    Text,
    Json,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum RatioArg {
    Float,
    /// Integer-only fixed point.
    Fixed,
}

#[derive(clap::Args, Debug, Clone)]
struct SweepArgs {
    /// Magnitude thresholds; defaults to 10^2 through 10^7.
    #[arg(long, value_name = "N", num_args = 1.., value_delimiter = ',')]
    thresholds: Vec<u64>,

    /// Added to each threshold to form the first operand.
    #[arg(long, default_value_t = 123)]
    up: u64,

    /// Subtracted from each threshold to form the second operand.
    #[arg(long, default_value_t = 456)]
    down: u64,
}

impl SweepArgs {
    fn cases(&self) -> Vec<TestCase> {
        let thresholds = if self.thresholds.is_empty() {
            corpus::default_thresholds()
        } else {
            self.thresholds.clone()
        };
        let policy = SweepPolicy {
            up: self.up,
            down: self.down,
        };
        corpus::size_sweep(&thresholds, policy)
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Curated corpus (first four cases under --profile quick).
    Bench,

    /// Per-size table over magnitude thresholds.
    Sweep {
        #[command(flatten)]
        sweep: SweepArgs,
    },

    /// Fail-fast correctness check; exits with the 1-based index of the first
    /// mismatching case.
    Verify {
        /// Also check the curated benchmark corpus.
        #[arg(long, default_value_t = false)]
        with_fixed: bool,
    },

    /// Curated corpus followed by the size sweep.
    Suite {
        #[command(flatten)]
        sweep: SweepArgs,
    },

    /// Seeded pseudo-random pairs.
    Random {
        /// Number of pairs; default depends on --profile.
        #[arg(long, short = 'n')]
        count: Option<usize>,

        /// Largest operand; default depends on --profile.
        #[arg(long)]
        max: Option<u64>,
    },
}

#[derive(Parser, Debug)]
#[command(name = "gcd-accel-bench")]
#[command(about = "GCD accelerator verification and cycle benchmark")]
struct Args {
    #[arg(long, value_enum, default_value_t = ProfileArg::Full, global = true)]
    profile: ProfileArg,

    #[arg(long, default_value_t = 0, global = true)]
    seed: u64,

    #[arg(long, value_enum, default_value_t = BackendArg::Soft, global = true)]
    backend: BackendArg,

    /// Algorithm behind the soft backend.
    #[arg(long, value_enum, default_value_t = Reference::Remainder, global = true)]
    soft_algorithm: Reference,

    #[arg(long, value_enum, default_value_t = TimerArg::Instant, global = true)]
    timer: TimerArg,

    /// Software references to compare against, in execution order.
    #[arg(
        long,
        value_enum,
        value_delimiter = ',',
        default_values_t = Reference::DEFAULT,
        global = true
    )]
    references: Vec<Reference>,

    /// Deltas above this are reported as timer anomalies.
    #[arg(long, default_value_t = DEFAULT_MAX_PLAUSIBLE_CYCLES, global = true)]
    max_plausible_cycles: u64,

    #[arg(long, value_enum, default_value_t = FormatArg::Text, global = true)]
    format: FormatArg,

    #[arg(long, value_enum, default_value_t = RatioArg::Float, global = true)]
    ratio: RatioArg,

    /// Decimal places for --ratio fixed (0 to 18).
    #[arg(
        long,
        default_value_t = 1,
        value_parser = clap::value_parser!(u32).range(0..=i64::from(MAX_DECIMALS)),
        global = true
    )]
    decimals: u32,

    /// Also write the JSON report here.
    #[arg(long, global = true)]
    out: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, default_value = "warn", global = true)]
    log_level: String,

    #[command(subcommand)]
    cmd: Command,
}

fn now_utc_unix() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    format!("unix:{secs}")
}

fn git_sha_short() -> Option<String> {
    std::env::var("GIT_SHA")
        .ok()
        .or_else(|| std::env::var("GITHUB_SHA").ok())
        .map(|s| s.chars().take(12).collect())
}

fn init_tracing(level: &str) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn accelerator(args: &Args) -> Result<Box<dyn Accelerator>> {
    match args.backend {
        BackendArg::Soft => Ok(Box::new(SoftAccelerator::new(args.soft_algorithm))),
        BackendArg::Rocc => accel::rocc().context("selecting accelerator backend"),
    }
}

fn timer(args: &Args) -> Result<(Box<dyn CycleTimer>, &'static str)> {
    match args.timer {
        TimerArg::Instant => Ok((Box::new(InstantTimer::new()), "instant")),
        TimerArg::Cycle => {
            let counter = CycleCounter::new()
                .ok_or_else(|| anyhow!("no cycle counter instruction on this target"))?;
            Ok((Box::new(counter), "cycle"))
        }
    }
}

/// (report name, table title, first-column heading, cases)
type Plan = Vec<(&'static str, &'static str, &'static str, Vec<TestCase>)>;

fn plan(cmd: &Command, cfg: &BenchConfig) -> Plan {
    let curated = || match cfg.profile {
        Profile::Quick => ("quick", "Quick benchmark", "case", corpus::quick_corpus()),
        Profile::Full => ("fixed", "Fixed corpus benchmark", "case", corpus::fixed_corpus()),
    };
    match cmd {
        Command::Bench => vec![curated()],
        Command::Sweep { sweep } => vec![("sweep", "Size sweep", "size", sweep.cases())],
        Command::Verify { with_fixed } => {
            let mut cases = corpus::verification_corpus();
            if *with_fixed {
                cases.extend(curated().3);
            }
            vec![("verification", "Verification", "case", cases)]
        }
        Command::Suite { sweep } => vec![
            curated(),
            ("sweep", "Size sweep", "size", sweep.cases()),
        ],
        Command::Random { count, max } => {
            let mut rng = cfg.rng();
            let cases = corpus::random_corpus(
                &mut rng,
                count.unwrap_or_else(|| cfg.random_cases()),
                max.unwrap_or_else(|| cfg.random_max()),
            );
            vec![("random", "Random corpus", "case", cases)]
        }
    }
}

fn pass_line(o: &CaseOutcome) -> String {
    let pair = o.case.operands();
    format!(
        "PASS: #{} {} gcd({}, {}) = {}",
        o.index + 1,
        o.case.label(),
        pair.a,
        pair.b,
        o.measurements[0].1.result
    )
}

/// Runs the selected command. `Some(fault)` means verification stopped at a
/// mismatch; the report up to and including that case has still been emitted.
fn run(args: Args) -> Result<Option<MismatchFault>> {
    let cfg = BenchConfig {
        profile: args.profile.into(),
        seed: args.seed,
        mode: match args.cmd {
            Command::Verify { .. } => Mode::Verify,
            _ => Mode::Benchmark,
        },
        max_plausible_cycles: args.max_plausible_cycles,
    };
    let style = match args.ratio {
        RatioArg::Float => RatioStyle::Float,
        RatioArg::Fixed => RatioStyle::FixedPoint {
            decimals: args.decimals,
        },
    };

    let backend = accelerator(&args)?;
    let backend_name = backend.name();
    let (clock, timer_name) = timer(&args)?;
    let plan = plan(&args.cmd, &cfg);
    let mut runner = Runner::new(backend, clock, args.references.clone(), cfg.clone());
    let engines = runner.engines();
    info!(
        backend = backend_name,
        timer = timer_name,
        profile = cfg.profile.as_str(),
        "starting run"
    );

    // Verify results go to stdout case by case, so a later hang or mismatch
    // leaves the passing lines visible.
    let verify = cfg.mode == Mode::Verify;
    let stream = verify && matches!(args.format, FormatArg::Text);

    let mut corpora = Vec::with_capacity(plan.len());
    let mut text = String::new();
    let mut failure = None;
    for (name, title, key, cases) in plan {
        let mut finished = Vec::new();
        let result = runner.run_with(&cases, |o| {
            if stream && o.status == CaseStatus::Validated {
                println!("{}", pass_line(o));
            }
            if verify {
                finished.push(o.clone());
            }
        });
        let run: CorpusRun = match result {
            Ok(run) => run,
            Err(BenchError::ResultMismatch(fault)) => {
                match args.format {
                    FormatArg::Text => println!("FAIL: {fault}"),
                    FormatArg::Json => eprintln!("FAIL: {fault}"),
                }
                corpora.push(CorpusReport {
                    name: name.to_string(),
                    run: CorpusRun::from_outcomes(finished),
                });
                failure = Some(fault);
                break;
            }
            Err(e) => return Err(e).context("running corpus"),
        };
        if cfg.mode == Mode::Benchmark {
            text.push_str(&report::render_corpus(title, key, &engines, &run, style));
            text.push('\n');
        }
        corpora.push(CorpusReport {
            name: name.to_string(),
            run,
        });
    }
    match cfg.mode {
        Mode::Benchmark => text.push_str(&report::render_guidance()),
        Mode::Verify if failure.is_none() => {
            text.push_str("All GCD accelerator checks passed.\n");
        }
        Mode::Verify => {}
    }

    let report = BenchReport {
        run: RunMeta {
            schema_version: 1,
            bench_version: env!("CARGO_PKG_VERSION").to_string(),
            profile: cfg.profile.as_str().to_string(),
            seed: cfg.seed,
            timestamp_utc: now_utc_unix(),
            git_sha: git_sha_short(),
            accelerator: backend_name.to_string(),
            timer: timer_name.to_string(),
            engines,
        },
        corpora,
    };
    info!(
        requests = runner.accelerator().served(),
        faults = report.fault_count(),
        "run complete"
    );

    match args.format {
        FormatArg::Text => print!("{text}"),
        FormatArg::Json => println!("{}", report.to_json()?),
    }
    if let Some(out) = &args.out {
        report
            .write_json(out)
            .with_context(|| format!("writing report to {}", out.display()))?;
    }

    Ok(failure)
}

/// Status for a command line clap refused. Help and version requests succeed;
/// anything else must not collide with the 1..=254 mismatch codes.
fn usage_exit_status(kind: ErrorKind) -> u8 {
    match kind {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
        _ => HARNESS_ERROR_EXIT,
    }
}

fn exit_status(outcome: &Result<Option<MismatchFault>>) -> u8 {
    match outcome {
        Ok(None) => 0,
        Ok(Some(fault)) => fault.exit_code(),
        Err(_) => HARNESS_ERROR_EXIT,
    }
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return ExitCode::from(usage_exit_status(e.kind()));
        }
    };
    init_tracing(&args.log_level);

    let outcome = run(args);
    if let Err(err) = &outcome {
        error!("{err:#}");
    }
    ExitCode::from(exit_status(&outcome))
}
