// Clippy allows
#![allow(clippy::too_many_arguments)]

//! bixcheck: differential testing for tabix-style interval query engines.
//!
//! Usage: bixcheck <COMMAND> [OPTIONS]

use clap::{Args, Parser, Subcommand};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process;
use std::time::Duration;

use bixcheck::anchor::{read_anchors, sample_anchors, AnchorStats};
use bixcheck::config::{self, FailurePolicy, HarnessConfig, ZeroLengthPolicy};
use bixcheck::driver::{BuildStep, Driver};
use bixcheck::engine::{CandidateEngine, Engine, IntersectEngine, ReferenceEngine};
use bixcheck::error::{OracleError, Result};
use bixcheck::oracle::{Comparison, EquivalenceOracle, Mismatch};
use bixcheck::process::Invocation;
use bixcheck::window::{Window, WindowGenerator};
use bixcheck::Anchor;

/// Exit status when at least one mismatch was found.
const EXIT_MISMATCH: i32 = 1;
/// Exit status for harness errors (input, build, invocation, configuration).
const EXIT_ERROR: i32 = 2;

#[derive(Parser)]
#[command(name = "bixcheck")]
#[command(version)]
#[command(about = "Differential testing of a candidate interval query engine against tabix", long_about = None)]
struct Cli {
    /// Print progress to stderr
    #[arg(long, short = 'v', global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Engine command lines. Each is split on whitespace; no shell is used.
#[derive(Args)]
struct EngineArgs {
    /// Reference engine command (1-based inclusive regions)
    #[arg(long, default_value = "tabix")]
    reference: String,

    /// Candidate engine command (0-based half-open coordinates)
    #[arg(long)]
    candidate: String,

    /// Optional region-intersection cross-check command, e.g. "bedtools intersect"
    #[arg(long)]
    cross_check: Option<String>,

    /// Per-invocation timeout in seconds (0 disables)
    #[arg(long, default_value = "60")]
    timeout: u64,
}

impl EngineArgs {
    fn timeout(&self) -> Option<Duration> {
        (self.timeout > 0).then(|| Duration::from_secs(self.timeout))
    }
}

/// Window generation ranges.
#[derive(Args)]
struct WindowArgs {
    /// Window starts span [pos - flank, pos + flank)
    #[arg(long, default_value = "10")]
    flank: u64,

    /// Shortest window length
    #[arg(long, default_value = "1")]
    min_length: u64,

    /// Longest window length (inclusive)
    #[arg(long, default_value = "9")]
    max_length: u64,

    /// Stop reading after this many data lines
    #[arg(short = 'n', long)]
    limit: Option<usize>,

    /// Keep a random subset of this many anchors
    #[arg(long)]
    sample: Option<usize>,

    /// Random seed for --sample
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Header line marker
    #[arg(long, default_value = "#")]
    comment_char: char,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare reference and candidate over every generated window
    Run {
        /// Compressed input record file (bgzip/gzip)
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        engines: EngineArgs,

        #[command(flatten)]
        windows: WindowArgs,

        /// Build command run once before any comparison
        #[arg(long)]
        build: Option<String>,

        /// Record every mismatch instead of stopping at the first
        #[arg(long)]
        keep_going: bool,

        /// Zero-length windows: skip|query
        #[arg(long, default_value = "skip")]
        zero_length: String,

        /// Append mismatches as TSV rows to this file
        #[arg(long)]
        mismatch_log: Option<PathBuf>,

        /// Print run statistics to stderr
        #[arg(long)]
        stats: bool,
    },

    /// Compare engines on a single window
    Query {
        /// Compressed input record file (bgzip/gzip)
        #[arg(short, long)]
        input: PathBuf,

        /// Chromosome
        #[arg(short, long)]
        chrom: String,

        /// 0-based window start
        #[arg(short, long)]
        start: u64,

        /// Window end (exclusive)
        #[arg(short, long)]
        end: u64,

        #[command(flatten)]
        engines: EngineArgs,
    },

    /// Print the generated windows as BED3
    Windows {
        /// Compressed input record file (bgzip/gzip)
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        windows: WindowArgs,
    },
}

fn main() {
    let cli = Cli::parse();
    config::set_verbose(cli.verbose);

    let result = match cli.command {
        Commands::Run {
            input,
            engines,
            windows,
            build,
            keep_going,
            zero_length,
            mismatch_log,
            stats,
        } => run_harness(
            input,
            engines,
            windows,
            build,
            keep_going,
            zero_length,
            mismatch_log,
            stats,
        ),
        Commands::Query {
            input,
            chrom,
            start,
            end,
            engines,
        } => run_query(input, chrom, start, end, engines),
        Commands::Windows { input, windows } => run_windows(input, windows),
    };

    match result {
        Ok(true) => {}
        Ok(false) => process::exit(EXIT_MISMATCH),
        Err(e) => {
            eprintln!("Error: {}", e);
            process::exit(EXIT_ERROR);
        }
    }
}

fn comment_byte(c: char) -> Result<u8> {
    if c.is_ascii() {
        Ok(c as u8)
    } else {
        Err(OracleError::InvalidConfig(format!(
            "comment char must be ASCII, got '{}'",
            c
        )))
    }
}

fn harness_config(windows: &WindowArgs, timeout: Option<Duration>) -> Result<HarnessConfig> {
    Ok(HarnessConfig {
        flank: windows.flank,
        min_length: windows.min_length,
        max_length: windows.max_length,
        limit: windows.limit,
        sample: windows.sample,
        seed: windows.seed,
        timeout,
        comment_char: comment_byte(windows.comment_char)?,
        ..HarnessConfig::default()
    })
}

/// Engines built from the command line, owned for the duration of a run.
struct Engines {
    reference: ReferenceEngine,
    candidate: CandidateEngine,
    cross_check: Option<IntersectEngine>,
}

impl Engines {
    fn from_args(args: &EngineArgs) -> Result<Self> {
        let timeout = args.timeout();
        Ok(Self {
            reference: ReferenceEngine::new(Invocation::parse(&args.reference)?, timeout),
            candidate: CandidateEngine::new(Invocation::parse(&args.candidate)?, timeout),
            cross_check: args
                .cross_check
                .as_deref()
                .map(Invocation::parse)
                .transpose()?
                .map(|inv| IntersectEngine::new(inv, timeout)),
        })
    }

    fn cross_check(&self) -> Option<&dyn Engine> {
        self.cross_check.as_ref().map(|e| e as &dyn Engine)
    }
}

fn open_mismatch_log(path: &Path) -> Result<BufWriter<File>> {
    let exists = path.exists();
    let file = File::options().create(true).append(true).open(path)?;
    let mut writer = BufWriter::new(file);
    if !exists {
        writeln!(writer, "{}", Mismatch::tsv_header())?;
    }
    Ok(writer)
}

fn run_harness(
    input: PathBuf,
    engine_args: EngineArgs,
    window_args: WindowArgs,
    build: Option<String>,
    keep_going: bool,
    zero_length: String,
    mismatch_log: Option<PathBuf>,
    stats: bool,
) -> Result<bool> {
    let mut harness = harness_config(&window_args, engine_args.timeout())?;
    harness.failure_policy = if keep_going {
        FailurePolicy::Exhaustive
    } else {
        FailurePolicy::FailFast
    };
    harness.zero_length = ZeroLengthPolicy::from_str(&zero_length).ok_or_else(|| {
        OracleError::InvalidConfig(format!(
            "unknown zero-length policy '{}' (expected skip or query)",
            zero_length
        ))
    })?;

    let engines = Engines::from_args(&engine_args)?;
    let build = build
        .as_deref()
        .map(Invocation::parse)
        .transpose()?
        .map(BuildStep::new);
    let mut log = mismatch_log.as_deref().map(open_mismatch_log).transpose()?;
    let mut log_error: Option<io::Error> = None;

    let report = Driver::new(harness, &input, &engines.reference, &engines.candidate)
        .with_cross_check(engines.cross_check())
        .with_build(build)
        .run_with_observer(|mismatch| {
            eprintln!("{}\n", mismatch);
            if let Some(ref mut log) = log {
                if let Err(e) = writeln!(log, "{}", mismatch.to_tsv_row()).and_then(|_| log.flush()) {
                    log_error.get_or_insert(e);
                }
            }
        })?;

    if let Some(e) = log_error {
        return Err(OracleError::Io(e));
    }

    if stats {
        eprintln!("Anchor stats: {}", report.anchor_stats);
        eprintln!("Run stats: {}", report);
    }
    Ok(report.passed())
}

fn run_query(
    input: PathBuf,
    chrom: String,
    start: u64,
    end: u64,
    engine_args: EngineArgs,
) -> Result<bool> {
    let engines = Engines::from_args(&engine_args)?;
    let window = Window::new(chrom, start, end)?;
    // No real record seeds a hand-picked window; report its first base
    let anchor = Anchor::new(window.chrom.clone(), window.start.saturating_add(1));

    let oracle = EquivalenceOracle::new(&input, &engines.reference, &engines.candidate)
        .with_cross_check(engines.cross_check())
        .with_zero_length(ZeroLengthPolicy::Query);

    let stdout = io::stdout();
    let mut handle = stdout.lock();
    match oracle.check(&anchor, &window)? {
        Comparison::Match { count } => {
            writeln!(handle, "MATCH\t{}\t{}", window, count)?;
            Ok(true)
        }
        Comparison::Mismatch(mismatch) => {
            writeln!(
                handle,
                "MISMATCH\t{}\t{}\t{}",
                window, mismatch.reference.count, mismatch.other.count
            )?;
            eprintln!("{}", mismatch);
            Ok(false)
        }
        Comparison::Skipped => Ok(true),
    }
}

fn run_windows(input: PathBuf, window_args: WindowArgs) -> Result<bool> {
    let harness = harness_config(&window_args, None)?;
    harness.validate()?;

    let mut anchors = read_anchors(&input, harness.limit, harness.comment_char)?;
    if let Some(n) = harness.sample {
        anchors = sample_anchors(anchors, n, harness.seed);
    }
    if config::is_verbose() {
        eprintln!("Anchor stats: {}", AnchorStats::from_anchors(&anchors));
    }

    let generator = WindowGenerator::from_config(&harness);
    let stdout = io::stdout();
    let mut handle = BufWriter::new(stdout.lock());
    for anchor in &anchors {
        for window in generator.windows(anchor) {
            writeln!(handle, "{}", window)?;
        }
    }
    handle.flush()?;
    Ok(true)
}
