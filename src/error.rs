//! Harness error taxonomy.
//!
//! Every variant here aborts a run. Cardinality mismatches are not errors:
//! they are verdicts, reported through [`crate::oracle::Comparison`].

use std::io;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// Errors that stop the harness before or during comparisons.
#[derive(Error, Debug)]
pub enum OracleError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid window {chrom}:{start}-{end}: start is greater than end")]
    InvalidWindow { chrom: String, start: u64, end: u64 },

    #[error("Build failed ({status}): {command}\n{stderr}")]
    Build {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Failed to start `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: io::Error,
    },

    #[error("Command exited with {status}: {command}\n{stderr}")]
    Invocation {
        command: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("Command timed out after {}s: {command}", .timeout.as_secs_f64())]
    Timeout { command: String, timeout: Duration },
}

impl OracleError {
    /// True for failures raised by starting or running an engine process.
    pub fn is_invocation_error(&self) -> bool {
        matches!(
            self,
            OracleError::Spawn { .. } | OracleError::Invocation { .. } | OracleError::Timeout { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, OracleError>;
