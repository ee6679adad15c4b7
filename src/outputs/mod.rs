//! Report writers.
//!
//! - [`json`]: serializes a run's report to a file or stdout

pub mod json;
