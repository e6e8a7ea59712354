//! Cardinality equivalence check for a single window.
//!
//! The oracle queries every engine with the same [`Window`] and compares
//! record counts against the reference. A disagreement is a verdict, not an
//! error: it is returned as [`Comparison::Mismatch`] with everything needed
//! to rerun the failing query by hand.

use crate::anchor::Anchor;
use crate::config::ZeroLengthPolicy;
use crate::engine::{Engine, QueryResult};
use crate::error::Result;
use crate::window::Window;
use memchr::memchr_iter;
use std::fmt;
use std::path::{Path, PathBuf};

/// Count records in engine output.
///
/// Empty output is zero records, not one empty line.
#[inline]
pub fn count_lines(text: &str) -> usize {
    let text = text.trim_end();
    if text.is_empty() {
        0
    } else {
        memchr_iter(b'\n', text.as_bytes()).count() + 1
    }
}

/// What one engine reported for a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Observation {
    pub engine: String,
    pub command: String,
    pub count: usize,
}

impl Observation {
    /// Record what `engine` returned, with its pasteable reproduction command.
    fn new(engine: &dyn Engine, file: &Path, window: &Window, result: &QueryResult) -> Self {
        Self {
            engine: result.engine.clone(),
            command: engine.reproduction(file, window),
            count: result.line_count(),
        }
    }

    fn write_line(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}: {} record(s) via `{}`", self.engine, self.count, self.command)
    }
}

/// Reproduction context for a cardinality disagreement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub file: PathBuf,
    pub chrom: String,
    /// 1-based position of the anchor the window was derived from
    pub anchor_pos: u64,
    pub start: u64,
    pub end: u64,
    pub reference: Observation,
    /// The engine that disagreed with the reference
    pub other: Observation,
    /// The candidate's agreeing answer when `other` is the cross-check
    pub candidate: Option<Observation>,
}

impl Mismatch {
    /// Column names matching [`Mismatch::to_tsv_row`].
    pub fn tsv_header() -> &'static str {
        "#file\tchrom\tanchor\tstart\tend\treference_count\tengine\tengine_count\tcommand\tcandidate_command"
    }

    /// One tab-separated line for machine consumption.
    pub fn to_tsv_row(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.file.display(),
            self.chrom,
            self.anchor_pos,
            self.start,
            self.end,
            self.reference.count,
            self.other.engine,
            self.other.count,
            self.other.command,
            self.candidate_observation().command
        )
    }

    /// What the candidate reported, whichever engine disagreed.
    pub fn candidate_observation(&self) -> &Observation {
        self.candidate.as_ref().unwrap_or(&self.other)
    }
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== Cardinality mismatch ===")?;
        writeln!(f, "File: {}", self.file.display())?;
        writeln!(f, "Chromosome: {}", self.chrom)?;
        writeln!(f, "Anchor: {}", self.anchor_pos)?;
        writeln!(f, "Window: [{}, {}) (0-based, half-open)", self.start, self.end)?;
        self.reference.write_line(f)?;
        self.other.write_line(f)?;
        if let Some(ref candidate) = self.candidate {
            candidate.write_line(f)?;
        }
        writeln!(f)?;
        writeln!(f, "To reproduce:")?;
        writeln!(f, "  {}", self.other.command)?;
        if let Some(ref candidate) = self.candidate {
            writeln!(f, "  {}", candidate.command)?;
        }
        write!(f, "  {}", self.reference.command)
    }
}

/// Outcome of checking one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Comparison {
    /// All engines agreed on this many records
    Match { count: usize },
    Mismatch(Box<Mismatch>),
    /// Not sent to any engine (zero-length window under the skip policy)
    Skipped,
}

/// Compares a candidate (and optionally a cross-check engine) against the
/// reference, window by window.
pub struct EquivalenceOracle<'a> {
    file: &'a Path,
    reference: &'a dyn Engine,
    candidate: &'a dyn Engine,
    cross_check: Option<&'a dyn Engine>,
    zero_length: ZeroLengthPolicy,
}

impl<'a> EquivalenceOracle<'a> {
    pub fn new(file: &'a Path, reference: &'a dyn Engine, candidate: &'a dyn Engine) -> Self {
        Self {
            file,
            reference,
            candidate,
            cross_check: None,
            zero_length: ZeroLengthPolicy::Skip,
        }
    }

    pub fn with_cross_check(mut self, engine: Option<&'a dyn Engine>) -> Self {
        self.cross_check = engine;
        self
    }

    pub fn with_zero_length(mut self, policy: ZeroLengthPolicy) -> Self {
        self.zero_length = policy;
        self
    }

    /// Query every engine for `window` and compare counts.
    ///
    /// Engine failures propagate as errors and are never counted as either
    /// a match or a mismatch.
    pub fn check(&self, anchor: &Anchor, window: &Window) -> Result<Comparison> {
        if window.is_empty() && self.zero_length == ZeroLengthPolicy::Skip {
            return Ok(Comparison::Skipped);
        }

        let reference = self.observe(self.reference, window)?;
        let candidate = self.observe(self.candidate, window)?;
        if candidate.count != reference.count {
            return Ok(self.mismatch(anchor, window, reference, candidate, None));
        }

        if let Some(engine) = self.cross_check {
            let other = self.observe(engine, window)?;
            if other.count != reference.count {
                return Ok(self.mismatch(anchor, window, reference, other, Some(candidate)));
            }
        }

        Ok(Comparison::Match {
            count: reference.count,
        })
    }

    fn observe(&self, engine: &dyn Engine, window: &Window) -> Result<Observation> {
        let result = engine.query(self.file, window)?;
        Ok(Observation::new(engine, self.file, window, &result))
    }

    fn mismatch(
        &self,
        anchor: &Anchor,
        window: &Window,
        reference: Observation,
        other: Observation,
        candidate: Option<Observation>,
    ) -> Comparison {
        Comparison::Mismatch(Box::new(Mismatch {
            file: self.file.to_path_buf(),
            chrom: window.chrom.clone(),
            anchor_pos: anchor.pos,
            start: window.start,
            end: window.end,
            reference,
            other,
            candidate,
        }))
    }
}
