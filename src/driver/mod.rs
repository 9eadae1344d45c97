//! Command line handling, program loading and execution
pub mod error;
pub mod eval;
pub mod options;
pub mod source;
pub mod statistics;
