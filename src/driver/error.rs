//! Overall high-level error type for oryx
use crate::common::sourcemap::SourceMap;
use crate::eval::error::ExecutionError;
use crate::eval::memory::heap::HeapError;
use crate::syntax::error::ParseError;
use codespan_reporting::diagnostic::Diagnostic;
use codespan_reporting::files;
use std::fmt::Display;
use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OryxError {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error(transparent)]
    Execution(#[from] ExecutionError),
    #[error(transparent)]
    Heap(#[from] HeapError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Files(#[from] files::Error),
    #[error("path {0} could not be read")]
    FileCouldNotBeRead(String),
    #[error("envelope {0} contains no package")]
    EmptyEnvelope(String),
    #[error("no program specified")]
    NoProgram,
}

fn default_diagnostic<E>(e: &E) -> Diagnostic<usize>
where
    E: Display,
{
    Diagnostic::error().with_message(format!("{}", e))
}

impl OryxError {
    /// Convert to a diagnostic
    pub fn to_diagnostic(&self, source_map: &SourceMap) -> Diagnostic<usize> {
        match self {
            OryxError::Parse(e) => e.to_diagnostic(source_map),
            OryxError::Execution(e) => e.to_diagnostic(source_map),
            e => default_diagnostic(e),
        }
    }

    /// The runtime error, if this is one
    pub fn execution_error(&self) -> Option<&ExecutionError> {
        match self {
            OryxError::Execution(e) => Some(e),
            _ => None,
        }
    }
}
