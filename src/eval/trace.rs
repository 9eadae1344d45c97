//! Execution tracing
//!
//! The machine reports each instruction it executes, the results of
//! evaluation and changes to keyword settings. Indentation follows
//! block nesting: THEN and ELSE open two levels, SELECT and DO one.

use std::fmt;

use log::{info, trace};

use crate::common::sourcemap::Smid;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceRecord {
    Instruction {
        indent: usize,
        smid: Smid,
        keyword: &'static str,
    },
    Result {
        indent: usize,
        value: String,
    },
    Setting {
        name: &'static str,
        value: String,
    },
}

impl fmt::Display for TraceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceRecord::Instruction {
                indent,
                smid,
                keyword,
            } => write!(
                f,
                "{:>6} *-* {}{}",
                smid.to_string(),
                "  ".repeat(*indent),
                keyword
            ),
            TraceRecord::Result { indent, value } => {
                write!(f, "       >>> {}\"{}\"", "  ".repeat(*indent), value)
            }
            TraceRecord::Setting { name, value } => write!(f, "       >K> {} {}", name, value),
        }
    }
}

pub trait Tracer {
    /// Whether records are wanted at all (avoids formatting results)
    fn enabled(&self) -> bool {
        true
    }

    fn record(&mut self, record: TraceRecord);

    /// Some implementations may keep a capture of records
    fn records(&self) -> &[TraceRecord] {
        &[]
    }
}

#[derive(Default)]
pub struct NullTracer;

impl Tracer for NullTracer {
    fn enabled(&self) -> bool {
        false
    }

    fn record(&mut self, _: TraceRecord) {}
}

/// Writes instruction records at `info` and results at `trace`
#[derive(Default)]
pub struct LogTracer;

impl Tracer for LogTracer {
    fn enabled(&self) -> bool {
        log::log_enabled!(log::Level::Info)
    }

    fn record(&mut self, record: TraceRecord) {
        match record {
            TraceRecord::Result { .. } => trace!("{}", record),
            _ => info!("{}", record),
        }
    }
}

/// A tracer for testing that captures records
#[derive(Default)]
pub struct CapturingTracer {
    records: Vec<TraceRecord>,
}

impl Tracer for CapturingTracer {
    fn record(&mut self, record: TraceRecord) {
        self.records.push(record)
    }

    fn records(&self) -> &[TraceRecord] {
        &self.records
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_instruction_indentation() {
        let record = TraceRecord::Instruction {
            indent: 2,
            smid: Smid::from(4),
            keyword: "SAY",
        };
        assert_eq!(record.to_string(), "   [4] *-*     SAY");
    }

    #[test]
    pub fn test_null_tracer_is_disabled() {
        assert!(!NullTracer.enabled());
        let mut capture = CapturingTracer::default();
        capture.record(TraceRecord::Setting {
            name: "DIGITS",
            value: "5".to_string(),
        });
        assert_eq!(capture.records().len(), 1);
    }
}
