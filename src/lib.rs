// Clippy allows for the whole crate
#![allow(clippy::should_implement_trait)]

//! bixcheck: differential testing for tabix-style interval query engines.
//!
//! Anchors are read from a compressed record file, a dense set of query
//! windows is generated around each one, and every window is sent to a
//! trusted reference engine and to the candidate under test. The two must
//! return the same number of records.
//!
//! # Features
//!
//! - **Boundary-dense windows**: offsets and lengths vary around real record positions
//! - **Coordinate translation**: each engine adapter owns its own convention
//! - **Reproducible failures**: every mismatch carries the exact failing command
//!
//! # Example
//!
//! ```rust,no_run
//! use bixcheck::config::HarnessConfig;
//! use bixcheck::driver::Driver;
//! use bixcheck::engine::{CandidateEngine, ReferenceEngine};
//! use bixcheck::process::Invocation;
//!
//! let config = HarnessConfig::default();
//! let reference = ReferenceEngine::new(Invocation::new("tabix"), config.timeout);
//! let candidate = CandidateEngine::new(Invocation::new("./main"), config.timeout);
//!
//! let report = Driver::new(config, "calls.vcf.gz", &reference, &candidate)
//!     .run()
//!     .unwrap();
//! assert!(report.passed(), "{}", report);
//! ```

pub mod anchor;
pub mod config;
pub mod driver;
pub mod engine;
pub mod error;
pub mod oracle;
pub mod process;
pub mod window;

// Re-export commonly used types
pub use anchor::{read_anchors, Anchor, AnchorReader};
pub use driver::{Driver, RunReport};
pub use error::{OracleError, Result};
pub use oracle::{Comparison, EquivalenceOracle, Mismatch};
pub use window::{Window, WindowGenerator};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::anchor::{read_anchors, Anchor, AnchorReader};
    pub use crate::config::{FailurePolicy, HarnessConfig, ZeroLengthPolicy};
    pub use crate::driver::{BuildStep, Driver, DriverState, RunReport};
    pub use crate::engine::{CandidateEngine, Engine, IntersectEngine, ReferenceEngine};
    pub use crate::oracle::{count_lines, Comparison, EquivalenceOracle, Mismatch};
    pub use crate::process::Invocation;
    pub use crate::window::{Window, WindowGenerator};
}
