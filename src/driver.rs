//! Differential run driver.
//!
//! A run moves through `Init -> ReadingAnchors -> Iterating -> (Pass | Failed)
//! -> Done`, once. Each window is fully compared before the next one starts,
//! so the first failing window is always unambiguous.

use crate::anchor::{read_anchors, sample_anchors, Anchor, AnchorStats};
use crate::config::{self, FailurePolicy, HarnessConfig};
use crate::engine::Engine;
use crate::error::{OracleError, Result};
use crate::oracle::{Comparison, EquivalenceOracle, Mismatch};
use crate::process::{self, Invocation};
use crate::window::WindowGenerator;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// How many anchors between progress lines in verbose mode.
const PROGRESS_EVERY: usize = 100;

/// Driver lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverState {
    Init,
    ReadingAnchors,
    Iterating,
    Pass,
    Failed,
    Done,
}

impl fmt::Display for DriverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::ReadingAnchors => "reading-anchors",
            Self::Iterating => "iterating",
            Self::Pass => "pass",
            Self::Failed => "failed",
            Self::Done => "done",
        };
        f.write_str(name)
    }
}

/// Command that builds the candidate before any comparison runs.
#[derive(Debug, Clone)]
pub struct BuildStep {
    pub invocation: Invocation,
    pub timeout: Option<Duration>,
}

impl BuildStep {
    pub fn new(invocation: Invocation) -> Self {
        Self {
            invocation,
            timeout: None,
        }
    }

    /// Run the build; a non-zero exit aborts the run.
    pub fn run(&self) -> Result<()> {
        let output = process::run(&self.invocation, self.timeout)?;
        if !output.status.success() {
            return Err(OracleError::Build {
                command: self.invocation.to_string(),
                status: output.status,
                stderr: output.stderr_lossy(),
            });
        }
        Ok(())
    }
}

/// Summary of a finished run.
#[derive(Debug, Default)]
pub struct RunReport {
    /// Anchors that were iterated
    pub anchors: usize,
    /// Windows sent to the engines and compared
    pub compared: usize,
    /// Windows not sent to the engines
    pub skipped: usize,
    pub mismatches: Vec<Mismatch>,
    /// Per-chromosome counts of the iterated anchors
    pub anchor_stats: AnchorStats,
    /// Every state the driver entered, in order
    pub states: Vec<DriverState>,
    pub elapsed: Duration,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.mismatches.is_empty()
    }

    /// The verdict state (`Pass` or `Failed`), once iteration finished.
    pub fn verdict(&self) -> Option<DriverState> {
        self.states
            .iter()
            .copied()
            .find(|s| matches!(s, DriverState::Pass | DriverState::Failed))
    }

    fn enter(&mut self, state: DriverState) {
        if config::is_verbose() {
            eprintln!("bixcheck: {}", state);
        }
        self.states.push(state);
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: anchors={} compared={} skipped={} mismatches={} elapsed={:.2}s",
            if self.passed() { "PASS" } else { "FAIL" },
            self.anchors,
            self.compared,
            self.skipped,
            self.mismatches.len(),
            self.elapsed.as_secs_f64()
        )
    }
}

/// Runs the reference and candidate over every window of every anchor.
pub struct Driver<'a> {
    config: HarnessConfig,
    input: PathBuf,
    reference: &'a dyn Engine,
    candidate: &'a dyn Engine,
    cross_check: Option<&'a dyn Engine>,
    build: Option<BuildStep>,
}

impl<'a> Driver<'a> {
    pub fn new(
        config: HarnessConfig,
        input: impl AsRef<Path>,
        reference: &'a dyn Engine,
        candidate: &'a dyn Engine,
    ) -> Self {
        Self {
            config,
            input: input.as_ref().to_path_buf(),
            reference,
            candidate,
            cross_check: None,
            build: None,
        }
    }

    pub fn with_cross_check(mut self, engine: Option<&'a dyn Engine>) -> Self {
        self.cross_check = engine;
        self
    }

    pub fn with_build(mut self, build: Option<BuildStep>) -> Self {
        self.build = build;
        self
    }

    /// Run to completion.
    pub fn run(&self) -> Result<RunReport> {
        self.run_with_observer(|_| {})
    }

    /// Run to completion, calling `on_mismatch` as each mismatch is found.
    ///
    /// Harness errors abort immediately under either failure policy; the
    /// window being checked is counted neither as compared nor as skipped.
    pub fn run_with_observer<F>(&self, mut on_mismatch: F) -> Result<RunReport>
    where
        F: FnMut(&Mismatch),
    {
        let started = Instant::now();
        let mut report = RunReport::default();

        report.enter(DriverState::Init);
        self.config.validate()?;
        if let Some(ref build) = self.build {
            build.run()?;
        }

        report.enter(DriverState::ReadingAnchors);
        let anchors = self.read_anchors()?;
        report.anchors = anchors.len();
        report.anchor_stats = AnchorStats::from_anchors(&anchors);

        report.enter(DriverState::Iterating);
        self.iterate(&anchors, &mut report, &mut on_mismatch)?;

        report.enter(if report.passed() {
            DriverState::Pass
        } else {
            DriverState::Failed
        });
        report.enter(DriverState::Done);
        report.elapsed = started.elapsed();
        Ok(report)
    }

    fn read_anchors(&self) -> Result<Vec<Anchor>> {
        let anchors = read_anchors(&self.input, self.config.limit, self.config.comment_char)?;
        Ok(match self.config.sample {
            Some(n) => sample_anchors(anchors, n, self.config.seed),
            None => anchors,
        })
    }

    fn iterate<F>(&self, anchors: &[Anchor], report: &mut RunReport, on_mismatch: &mut F) -> Result<()>
    where
        F: FnMut(&Mismatch),
    {
        let generator = WindowGenerator::from_config(&self.config);
        let oracle = EquivalenceOracle::new(&self.input, self.reference, self.candidate)
            .with_cross_check(self.cross_check)
            .with_zero_length(self.config.zero_length);

        for (i, anchor) in anchors.iter().enumerate() {
            for window in generator.windows(anchor) {
                match oracle.check(anchor, &window)? {
                    Comparison::Match { .. } => report.compared += 1,
                    Comparison::Skipped => report.skipped += 1,
                    Comparison::Mismatch(mismatch) => {
                        report.compared += 1;
                        on_mismatch(mismatch.as_ref());
                        report.mismatches.push(*mismatch);
                        if self.config.failure_policy == FailurePolicy::FailFast {
                            return Ok(());
                        }
                    }
                }
            }

            if config::is_verbose() && (i + 1) % PROGRESS_EVERY == 0 {
                eprintln!(
                    "bixcheck: {}/{} anchors, {} windows compared",
                    i + 1,
                    anchors.len(),
                    report.compared
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ZeroLengthPolicy;
    use crate::oracle::tests::FakeEngine;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn gz_file(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        let mut enc = GzEncoder::new(Vec::new(), Compression::default());
        enc.write_all(content.as_bytes()).unwrap();
        file.write_all(&enc.finish().unwrap()).unwrap();
        file.flush().unwrap();
        file
    }

    fn small_config() -> HarnessConfig {
        HarnessConfig {
            flank: 2,
            min_length: 1,
            max_length: 3,
            timeout: None,
            ..HarnessConfig::default()
        }
    }

    const RECORDS: &str = "#CHROM\tPOS\n1\t1000\n1\t1002\n2\t50\n";
    const POSITIONS: &[(&str, u64)] = &[("1", 1000), ("1", 1002), ("2", 50)];

    #[test]
    fn test_all_windows_match() {
        let input = gz_file(RECORDS);
        let reference = FakeEngine::new("reference", POSITIONS);
        let candidate = FakeEngine::new("candidate", POSITIONS);

        let report = Driver::new(small_config(), input.path(), &reference, &candidate)
            .run()
            .unwrap();
        assert!(report.passed());
        assert_eq!(report.anchors, 3);
        assert_eq!(report.compared, 3 * 4 * 3);
        assert_eq!(report.skipped, 0);
        assert_eq!(report.anchor_stats.to_string(), "anchors=3 chroms=2 1=2 2=1");
        assert_eq!(
            report.states,
            vec![
                DriverState::Init,
                DriverState::ReadingAnchors,
                DriverState::Iterating,
                DriverState::Pass,
                DriverState::Done
            ]
        );
        assert_eq!(report.verdict(), Some(DriverState::Pass));
    }

    #[test]
    fn test_fail_fast_stops_at_first_mismatch() {
        let input = gz_file(RECORDS);
        let reference = FakeEngine::new("reference", POSITIONS);
        // Candidate misses the second record
        let candidate = FakeEngine::new("candidate", &[("1", 1000), ("2", 50)]);

        let mut seen = Vec::new();
        let report = Driver::new(small_config(), input.path(), &reference, &candidate)
            .run_with_observer(|m| seen.push(m.clone()))
            .unwrap();
        assert!(!report.passed());
        assert_eq!(report.mismatches.len(), 1);
        assert_eq!(seen, report.mismatches);
        assert_eq!(report.verdict(), Some(DriverState::Failed));

        // [999, 1002) is the first window reaching position 1002
        let m = &report.mismatches[0];
        assert_eq!(m.anchor_pos, 1000);
        assert_eq!((m.start, m.end), (999, 1002));
        assert_eq!(m.reference.count, 2);
        assert_eq!(m.other.count, 1);
        assert_eq!(candidate.calls.get(), report.compared);
    }

    #[test]
    fn test_exhaustive_collects_all_mismatches() {
        let input = gz_file(RECORDS);
        let reference = FakeEngine::new("reference", POSITIONS);
        let candidate = FakeEngine::new("candidate", &[("1", 1000), ("2", 50)]);
        let config = HarnessConfig {
            failure_policy: FailurePolicy::Exhaustive,
            ..small_config()
        };

        let report = Driver::new(config, input.path(), &reference, &candidate)
            .run()
            .unwrap();
        assert_eq!(report.compared, 36);
        assert!(report.mismatches.len() > 1);
        assert!(report.mismatches.iter().all(|m| m.chrom == "1"));
    }

    #[test]
    fn test_comment_only_input_passes() {
        let input = gz_file("##fileformat=VCFv4.2\n#CHROM\tPOS\n");
        let reference = FakeEngine::new("reference", &[]);
        let candidate = FakeEngine::new("candidate", &[]);

        let report = Driver::new(small_config(), input.path(), &reference, &candidate)
            .run()
            .unwrap();
        assert!(report.passed());
        assert_eq!(report.anchors, 0);
        assert_eq!(report.compared, 0);
        assert_eq!(reference.calls.get(), 0);
    }

    #[test]
    fn test_engine_error_aborts_run() {
        let input = gz_file(RECORDS);
        let reference = FakeEngine::new("reference", POSITIONS);
        let mut candidate = FakeEngine::new("candidate", POSITIONS);
        candidate.fail = true;

        let result = Driver::new(small_config(), input.path(), &reference, &candidate).run();
        assert!(result.is_err());
        assert_eq!(candidate.calls.get(), 1);
    }

    #[test]
    fn test_malformed_input_aborts_before_queries() {
        let input = gz_file("1\t1000\n1\tnot-a-number\n");
        let reference = FakeEngine::new("reference", POSITIONS);
        let candidate = FakeEngine::new("candidate", POSITIONS);

        let err = Driver::new(small_config(), input.path(), &reference, &candidate)
            .run()
            .unwrap_err();
        assert!(matches!(err, OracleError::Parse { line: 2, .. }));
        assert_eq!(reference.calls.get(), 0);
    }

    #[test]
    fn test_limit_and_zero_length_skip() {
        let input = gz_file(RECORDS);
        let reference = FakeEngine::new("reference", POSITIONS);
        let candidate = FakeEngine::new("candidate", POSITIONS);
        let config = HarnessConfig {
            limit: Some(1),
            min_length: 0,
            max_length: 1,
            zero_length: ZeroLengthPolicy::Skip,
            ..small_config()
        };

        let report = Driver::new(config, input.path(), &reference, &candidate)
            .run()
            .unwrap();
        assert_eq!(report.anchors, 1);
        assert_eq!(report.skipped, 4);
        assert_eq!(report.compared, 4);
    }

    #[test]
    fn test_invalid_config_rejected_at_init() {
        let input = gz_file(RECORDS);
        let reference = FakeEngine::new("reference", POSITIONS);
        let candidate = FakeEngine::new("candidate", POSITIONS);
        let config = HarnessConfig {
            min_length: 4,
            max_length: 1,
            ..small_config()
        };

        let err = Driver::new(config, input.path(), &reference, &candidate)
            .run()
            .unwrap_err();
        assert!(matches!(err, OracleError::InvalidConfig(_)));
    }

    #[cfg(unix)]
    #[test]
    fn test_build_failure_aborts() {
        let input = gz_file(RECORDS);
        let reference = FakeEngine::new("reference", POSITIONS);
        let candidate = FakeEngine::new("candidate", POSITIONS);
        let build = BuildStep::new(Invocation::parse("sh -c").unwrap().arg("exit 1"));

        let err = Driver::new(small_config(), input.path(), &reference, &candidate)
            .with_build(Some(build))
            .run()
            .unwrap_err();
        assert!(matches!(err, OracleError::Build { .. }));
        assert_eq!(reference.calls.get(), 0);
    }
}
