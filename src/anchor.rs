//! Streaming anchor reader for gzip-compressed, tab-delimited record files.
//!
//! Each data line contributes one [`Anchor`]: the chromosome from field 1
//! and the 1-based position from field 2. Header lines are skipped. POS 0
//! (telomeric records) is accepted.

use crate::config::{DEFAULT_COMMENT_CHAR, MAX_POSITION};
use crate::error::{OracleError, Result};
use flate2::read::MultiGzDecoder;
use memchr::memchr;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rustc_hash::FxHashMap;
use std::fmt;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

/// A (chromosome, position) pair taken from a real input record.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Anchor {
    pub chrom: String,
    /// 1-based record position
    pub pos: u64,
}

impl Anchor {
    #[inline]
    pub fn new(chrom: impl Into<String>, pos: u64) -> Self {
        Self {
            chrom: chrom.into(),
            pos,
        }
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chrom, self.pos)
    }
}

/// A streaming anchor reader.
pub struct AnchorReader<R: Read> {
    reader: BufReader<R>,
    line_number: usize,
    data_lines: usize,
    limit: Option<usize>,
    comment_char: u8,
    buffer: Vec<u8>,
}

impl AnchorReader<MultiGzDecoder<File>> {
    /// Open a gzip or bgzip file.
    ///
    /// bgzip output is a series of gzip members, so the multi-member
    /// decoder is used; plain single-member gzip decodes the same way.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Ok(Self::new(MultiGzDecoder::new(file)))
    }
}

impl<R: Read> AnchorReader<R> {
    /// Create a reader over already-decompressed text.
    pub fn new(reader: R) -> Self {
        Self {
            reader: BufReader::new(reader),
            line_number: 0,
            data_lines: 0,
            limit: None,
            comment_char: DEFAULT_COMMENT_CHAR,
            buffer: Vec::with_capacity(1024),
        }
    }

    /// Stop after `limit` data lines. Header lines do not count.
    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }

    /// Use a different header marker than `#`.
    pub fn with_comment_char(mut self, comment_char: u8) -> Self {
        self.comment_char = comment_char;
        self
    }

    /// Read the next anchor.
    pub fn read_anchor(&mut self) -> Result<Option<Anchor>> {
        if self.limit.is_some_and(|limit| self.data_lines >= limit) {
            return Ok(None);
        }

        loop {
            self.buffer.clear();
            let bytes_read = self.reader.read_until(b'\n', &mut self.buffer)?;
            if bytes_read == 0 {
                return Ok(None);
            }
            self.line_number += 1;

            let line = trim_line_end(&self.buffer);
            if line.is_empty() || line[0] == self.comment_char {
                continue;
            }

            self.data_lines += 1;
            return parse_anchor(line, self.line_number).map(Some);
        }
    }

    /// Number of data lines consumed so far.
    pub fn data_lines(&self) -> usize {
        self.data_lines
    }

    /// Get an iterator over all anchors.
    pub fn anchors(self) -> AnchorIter<R> {
        AnchorIter { reader: self }
    }
}

#[inline]
fn trim_line_end(line: &[u8]) -> &[u8] {
    let mut end = line.len();
    while end > 0 && (line[end - 1] == b'\n' || line[end - 1] == b'\r') {
        end -= 1;
    }
    &line[..end]
}

/// Parse the first two fields of a data line.
fn parse_anchor(line: &[u8], line_number: usize) -> Result<Anchor> {
    let tab1 = memchr(b'\t', line).ok_or_else(|| OracleError::Parse {
        line: line_number,
        message: "Expected at least 2 tab-delimited fields, got 1".to_string(),
    })?;
    let chrom = &line[..tab1];
    if chrom.is_empty() {
        return Err(OracleError::Parse {
            line: line_number,
            message: "Empty chromosome field".to_string(),
        });
    }

    let rest = &line[tab1 + 1..];
    let pos_field = &rest[..memchr(b'\t', rest).unwrap_or(rest.len())];
    let pos_text = String::from_utf8_lossy(pos_field);
    let pos: u64 = pos_text.parse().map_err(|_| OracleError::Parse {
        line: line_number,
        message: format!("Invalid position: '{}'", pos_text),
    })?;
    if pos > MAX_POSITION {
        return Err(OracleError::Parse {
            line: line_number,
            message: format!("Position {} exceeds maximum {}", pos, MAX_POSITION),
        });
    }

    let chrom = std::str::from_utf8(chrom).map_err(|_| OracleError::Parse {
        line: line_number,
        message: "Chromosome is not valid UTF-8".to_string(),
    })?;

    Ok(Anchor::new(chrom, pos))
}

/// Iterator over anchors.
pub struct AnchorIter<R: Read> {
    reader: AnchorReader<R>,
}

impl<R: Read> Iterator for AnchorIter<R> {
    type Item = Result<Anchor>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.reader.read_anchor() {
            Ok(Some(anchor)) => Some(Ok(anchor)),
            Ok(None) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

/// Read all anchors from a gzip file, stopping after `limit` data lines.
pub fn read_anchors<P: AsRef<Path>>(
    path: P,
    limit: Option<usize>,
    comment_char: u8,
) -> Result<Vec<Anchor>> {
    AnchorReader::from_path(path)?
        .with_limit(limit)
        .with_comment_char(comment_char)
        .anchors()
        .collect()
}

/// Parse anchors from uncompressed text (useful for testing).
pub fn parse_anchors(content: &str) -> Result<Vec<Anchor>> {
    AnchorReader::new(content.as_bytes()).anchors().collect()
}

/// Keep a reproducible random subset of `n` anchors, in their original order.
pub fn sample_anchors(anchors: Vec<Anchor>, n: usize, seed: u64) -> Vec<Anchor> {
    if n >= anchors.len() {
        return anchors;
    }
    let mut rng = SmallRng::seed_from_u64(seed);
    let mut keep = rand::seq::index::sample(&mut rng, anchors.len(), n).into_vec();
    keep.sort_unstable();

    let mut keep = keep.into_iter().peekable();
    anchors
        .into_iter()
        .enumerate()
        .filter_map(|(i, anchor)| {
            if keep.peek() == Some(&i) {
                keep.next();
                Some(anchor)
            } else {
                None
            }
        })
        .collect()
}

/// Per-chromosome anchor counts, in first-seen order.
#[derive(Debug, Default)]
pub struct AnchorStats {
    counts: FxHashMap<String, usize>,
    order: Vec<String>,
}

impl AnchorStats {
    pub fn from_anchors(anchors: &[Anchor]) -> Self {
        let mut stats = Self::default();
        for anchor in anchors {
            match stats.counts.get_mut(&anchor.chrom) {
                Some(count) => *count += 1,
                None => {
                    stats.order.push(anchor.chrom.clone());
                    stats.counts.insert(anchor.chrom.clone(), 1);
                }
            }
        }
        stats
    }

    /// Number of anchors on a chromosome.
    pub fn count(&self, chrom: &str) -> usize {
        self.counts.get(chrom).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn chromosomes(&self) -> &[String] {
        &self.order
    }
}

impl fmt::Display for AnchorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "anchors={} chroms={}", self.total(), self.order.len())?;
        for chrom in &self.order {
            write!(f, " {}={}", chrom, self.count(chrom))?;
        }
        Ok(())
    }
}
