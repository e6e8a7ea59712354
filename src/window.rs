//! Query windows and their generation around anchors.

use crate::anchor::Anchor;
use crate::config::{HarnessConfig, MAX_POSITION};
use crate::error::{OracleError, Result};
use std::fmt;

/// A query interval in 0-based, half-open coordinates (BED convention).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Window {
    pub chrom: String,
    pub start: u64,
    pub end: u64,
}

impl Window {
    /// Create a window, rejecting `start > end`.
    pub fn new(chrom: impl Into<String>, start: u64, end: u64) -> Result<Self> {
        let chrom = chrom.into();
        if start > end {
            return Err(OracleError::InvalidWindow { chrom, start, end });
        }
        Ok(Self { chrom, start, end })
    }

    /// Returns the length of the window.
    #[inline]
    pub fn len(&self) -> u64 {
        self.end - self.start
    }

    /// Returns true if the window covers no bases.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Check whether a 1-based single-base position falls in the window.
    #[inline]
    pub fn contains_pos1(&self, pos: u64) -> bool {
        pos > self.start && pos <= self.end
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}\t{}\t{}", self.chrom, self.start, self.end)
    }
}

/// Produces the windows tested around each anchor.
///
/// Start offsets cover `[pos - flank, pos + flank)` and lengths cover
/// `min_length..=max_length`. Offsets are the outer loop. Zero-length
/// windows are emitted when `min_length` is 0; deciding whether to query
/// them is left to the oracle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowGenerator {
    pub flank: u64,
    pub min_length: u64,
    pub max_length: u64,
}

impl Default for WindowGenerator {
    fn default() -> Self {
        Self::from_config(&HarnessConfig::default())
    }
}

impl WindowGenerator {
    pub fn new(flank: u64, min_length: u64, max_length: u64) -> Self {
        Self {
            flank,
            min_length,
            max_length,
        }
    }

    pub fn from_config(config: &HarnessConfig) -> Self {
        Self {
            flank: config.flank,
            min_length: config.min_length,
            max_length: config.max_length,
        }
    }

    /// Reject ranges that produce no windows or cannot be represented.
    pub fn validate(&self) -> Result<()> {
        if self.min_length > self.max_length {
            return Err(OracleError::InvalidConfig(format!(
                "min length ({}) > max length ({})",
                self.min_length, self.max_length
            )));
        }
        if self.flank == 0 {
            return Err(OracleError::InvalidConfig(
                "flank must be at least 1".to_string(),
            ));
        }
        if self.flank > MAX_POSITION || self.max_length > MAX_POSITION {
            return Err(OracleError::InvalidConfig(format!(
                "flank and max length must not exceed {}",
                MAX_POSITION
            )));
        }
        Ok(())
    }

    /// Windows emitted for an anchor far enough from position 0.
    pub fn count_per_anchor(&self) -> u64 {
        let lengths = self
            .max_length
            .saturating_add(1)
            .saturating_sub(self.min_length);
        self.flank.saturating_mul(2).saturating_mul(lengths)
    }

    /// Iterate the windows around one anchor.
    ///
    /// Offsets below zero are dropped rather than clamped, so every window
    /// in the sequence is distinct. The sequence stops early rather than
    /// emit a window whose end does not fit in a `u64`.
    pub fn windows<'a>(&self, anchor: &'a Anchor) -> Windows<'a> {
        let first = anchor.pos.saturating_sub(self.flank);
        Windows {
            chrom: &anchor.chrom,
            offset: first,
            offset_end: anchor.pos.saturating_add(self.flank),
            length: self.min_length,
            min_length: self.min_length,
            max_length: self.max_length,
        }
    }
}

/// Deterministic window sequence for one anchor.
#[derive(Debug, Clone)]
pub struct Windows<'a> {
    chrom: &'a str,
    offset: u64,
    offset_end: u64,
    length: u64,
    min_length: u64,
    max_length: u64,
}

impl Iterator for Windows<'_> {
    type Item = Window;

    fn next(&mut self) -> Option<Window> {
        if self.offset >= self.offset_end || self.min_length > self.max_length {
            return None;
        }
        let Some(end) = self.offset.checked_add(self.length) else {
            self.offset = self.offset_end;
            return None;
        };
        let window = Window {
            chrom: self.chrom.to_string(),
            start: self.offset,
            end,
        };
        if self.length == self.max_length {
            self.length = self.min_length;
            self.offset += 1;
        } else {
            self.length += 1;
        }
        Some(window)
    }
}
