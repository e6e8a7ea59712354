//! Runtime configuration for a differential run.
//!
//! Process-wide diagnostics verbosity lives in an atomic so any module can
//! check it without threading a flag through every call. Everything that
//! changes the meaning of a run lives in [`HarnessConfig`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::{OracleError, Result};
use crate::window::WindowGenerator;

/// Global flag for progress diagnostics on stderr.
static VERBOSE: AtomicBool = AtomicBool::new(false);

/// Enable or disable progress diagnostics.
///
/// Set once at startup, before the driver runs.
#[inline]
pub fn set_verbose(enabled: bool) {
    VERBOSE.store(enabled, Ordering::Release);
}

/// Check if progress diagnostics are enabled.
#[inline]
pub fn is_verbose() -> bool {
    VERBOSE.load(Ordering::Acquire)
}

/// Default comment marker for header lines.
pub const DEFAULT_COMMENT_CHAR: u8 = b'#';

/// Largest record position accepted from input, and the largest flank or
/// window length. Keeps `pos + flank + max_length` inside a `u64`.
pub const MAX_POSITION: u64 = 1 << 62;

/// Default per-invocation timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// What the driver does after a mismatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop at the first mismatch
    #[default]
    FailFast,
    /// Record every mismatch and keep going
    Exhaustive,
}

/// How zero-length windows (start == end) are treated.
///
/// Neither engine convention defines a zero-length query cleanly: the
/// reference would receive an inverted 1-based range (`s+1-s`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZeroLengthPolicy {
    /// Never send zero-length windows to an engine; count them as skipped
    #[default]
    Skip,
    /// Send them to every engine and compare like any other window
    Query,
}

impl ZeroLengthPolicy {
    /// Parse policy from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "skip" => Some(Self::Skip),
            "query" => Some(Self::Query),
            _ => None,
        }
    }
}

/// Settings for one harness run.
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    /// Offsets span `[pos - flank, pos + flank)` around each anchor
    pub flank: u64,
    /// Shortest window length (inclusive)
    pub min_length: u64,
    /// Longest window length (inclusive)
    pub max_length: u64,
    /// Stop reading after this many data lines
    pub limit: Option<usize>,
    /// Randomly keep this many anchors (in file order)
    pub sample: Option<usize>,
    /// Seed for anchor sampling
    pub seed: u64,
    /// Kill an engine process after this long; `None` waits forever
    pub timeout: Option<Duration>,
    pub failure_policy: FailurePolicy,
    pub zero_length: ZeroLengthPolicy,
    /// First byte of header lines
    pub comment_char: u8,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            flank: 10,
            min_length: 1,
            max_length: 9,
            limit: None,
            sample: None,
            seed: 42,
            timeout: Some(DEFAULT_TIMEOUT),
            failure_policy: FailurePolicy::FailFast,
            zero_length: ZeroLengthPolicy::Skip,
            comment_char: DEFAULT_COMMENT_CHAR,
        }
    }
}

impl HarnessConfig {
    /// Reject settings that cannot produce a meaningful run.
    pub fn validate(&self) -> Result<()> {
        WindowGenerator::from_config(self).validate()?;
        if self.limit == Some(0) {
            return Err(OracleError::InvalidConfig(
                "limit must be at least 1".to_string(),
            ));
        }
        if self.timeout.is_some_and(|t| t.is_zero()) {
            return Err(OracleError::InvalidConfig(
                "timeout must be positive (omit it to disable)".to_string(),
            ));
        }
        Ok(())
    }
}
