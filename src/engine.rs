//! Adapters for the interval query engines under comparison.
//!
//! Every adapter answers the same question, "which records overlap this
//! 0-based half-open window", but each tool is invoked with its own
//! argument order and coordinate convention. That translation stays inside
//! the adapter that needs it.

use crate::error::Result;
use crate::oracle::count_lines;
use crate::process::{self, Invocation};
use crate::window::Window;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

/// Raw output of one engine query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    pub engine: String,
    /// Command line that produced the output
    pub command: String,
    /// Stdout with trailing whitespace trimmed
    pub stdout: String,
}

impl QueryResult {
    /// Number of result records.
    pub fn line_count(&self) -> usize {
        count_lines(&self.stdout)
    }
}

/// A query engine that can be asked for the records overlapping a window.
pub trait Engine {
    /// Short label used in reports.
    fn name(&self) -> &str;

    /// Per-invocation timeout.
    fn timeout(&self) -> Option<Duration>;

    /// The exact command that [`Engine::query`] runs for this window.
    fn invocation(&self, file: &Path, window: &Window) -> Invocation;

    /// A shell command line that reruns this query by hand.
    fn reproduction(&self, file: &Path, window: &Window) -> String {
        self.invocation(file, window).to_string()
    }

    /// Run one query in a fresh process and capture its output.
    fn query(&self, file: &Path, window: &Window) -> Result<QueryResult> {
        let invocation = self.invocation(file, window);
        let output = process::run_checked(&invocation, self.timeout())?;
        Ok(QueryResult {
            engine: self.name().to_string(),
            command: invocation.to_string(),
            stdout: output.stdout_trimmed(),
        })
    }
}

/// tabix-style reference: `<tool> <file> <chrom>:<start+1>-<end>`.
///
/// The tool takes 1-based inclusive regions, so the window start is shifted
/// by one here and nowhere else.
#[derive(Debug, Clone)]
pub struct ReferenceEngine {
    base: Invocation,
    timeout: Option<Duration>,
}

impl ReferenceEngine {
    pub fn new(base: Invocation, timeout: Option<Duration>) -> Self {
        Self { base, timeout }
    }

    /// Format a window as a 1-based inclusive region string.
    pub fn region(window: &Window) -> String {
        let mut buf = itoa::Buffer::new();
        let mut region = String::with_capacity(window.chrom.len() + 24);
        region.push_str(&window.chrom);
        region.push(':');
        region.push_str(buf.format(u128::from(window.start) + 1));
        region.push('-');
        region.push_str(buf.format(window.end));
        region
    }
}

impl Engine for ReferenceEngine {
    fn name(&self) -> &str {
        "reference"
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn invocation(&self, file: &Path, window: &Window) -> Invocation {
        self.base
            .clone()
            .arg(file.to_string_lossy())
            .arg(Self::region(window))
    }
}

/// Candidate under test: `<binary> <file> <chrom> <start> <end>`, 0-based
/// half-open, coordinates passed through unchanged.
#[derive(Debug, Clone)]
pub struct CandidateEngine {
    base: Invocation,
    timeout: Option<Duration>,
}

impl CandidateEngine {
    pub fn new(base: Invocation, timeout: Option<Duration>) -> Self {
        Self { base, timeout }
    }
}

impl Engine for CandidateEngine {
    fn name(&self) -> &str {
        "candidate"
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn invocation(&self, file: &Path, window: &Window) -> Invocation {
        let mut buf = itoa::Buffer::new();
        let start = buf.format(window.start).to_string();
        let end = buf.format(window.end).to_string();
        self.base
            .clone()
            .arg(file.to_string_lossy())
            .arg(window.chrom.as_str())
            .arg(start)
            .arg(end)
    }
}

/// bedtools-style cross-check: `<tool> -a <file> -b <region.bed>`.
///
/// The region file holds one BED3 line and exists only for the duration of
/// a single query.
#[derive(Debug, Clone)]
pub struct IntersectEngine {
    base: Invocation,
    timeout: Option<Duration>,
}

impl IntersectEngine {
    pub fn new(base: Invocation, timeout: Option<Duration>) -> Self {
        Self { base, timeout }
    }

    fn invocation_with_region(&self, file: &Path, region_file: &Path) -> Invocation {
        self.base
            .clone()
            .arg("-a")
            .arg(file.to_string_lossy())
            .arg("-b")
            .arg(region_file.to_string_lossy())
    }
}

impl Engine for IntersectEngine {
    fn name(&self) -> &str {
        "intersect"
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Reported command; the real region path is a fresh temp file per query.
    fn invocation(&self, file: &Path, _window: &Window) -> Invocation {
        self.invocation_with_region(file, Path::new("region.bed"))
    }

    /// The region file is gone by the time anyone reads a report, so the
    /// region is piped in on stdin instead.
    fn reproduction(&self, file: &Path, window: &Window) -> String {
        let mut buf = itoa::Buffer::new();
        let region = Invocation::new("printf")
            .arg("%s\\t%s\\t%s\\n")
            .arg(window.chrom.as_str())
            .arg(buf.format(window.start))
            .arg(buf.format(window.end));
        format!(
            "{} | {}",
            region,
            self.invocation_with_region(file, Path::new("stdin"))
        )
    }

    fn query(&self, file: &Path, window: &Window) -> Result<QueryResult> {
        // Removed when dropped, on every return path
        let mut region = tempfile::Builder::new()
            .prefix("bixcheck-region-")
            .suffix(".bed")
            .tempfile()?;
        writeln!(region, "{}", window)?;
        region.flush()?;

        let invocation = self.invocation_with_region(file, region.path());
        let output = process::run_checked(&invocation, self.timeout)?;
        Ok(QueryResult {
            engine: self.name().to_string(),
            command: invocation.to_string(),
            stdout: output.stdout_trimmed(),
        })
    }
}
