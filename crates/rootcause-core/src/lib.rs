//! Ingest diagnostic context for one issue from an external tracker CLI,
//! trace the failure upstream to its root cause, classify it, and report.
//!
//! Pipeline: [`fetcher`] → [`parser`] → [`tracer`] → [`classifier`] → [`report`],
//! wired together in [`analyze`].

pub mod analyze;
pub mod classifier;
pub mod config;
pub mod error;
pub mod fetcher;
pub mod io;
pub mod issue;
pub mod parser;
pub mod paths;
pub mod report;
pub mod rules;
pub mod signals;
pub mod tracer;
pub mod types;

pub use analyze::{analyze, analyze_raw, analyze_with};
pub use error::{FetchError, ParseError, Result, RootCauseError};
