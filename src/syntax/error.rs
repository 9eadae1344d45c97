use crate::{
    common::sourcemap::SourceMap,
    eval::{code::builder::BuildError, memory::heap::HeapError},
    syntax::span::HasSpan,
};
use codespan::{ByteIndex, Span};
use codespan_reporting::diagnostic::{Diagnostic, Label};
use thiserror::Error;

/// An error in the source text, located by file and span
#[derive(Eq, PartialEq, Debug, Clone, Error)]
pub enum SyntaxError {
    #[error("unexpected character {1} found in input")]
    UnexpectedCharacter(usize, char, ByteIndex),
    #[error("unmatched quote in string literal")]
    UnterminatedString(usize, Span),
    #[error("unmatched comment delimiter")]
    UnterminatedComment(usize, Span),
    #[error("expression expected")]
    ExpectedExpression(usize, Span),
    #[error("{2} expected")]
    ExpectedToken(usize, Span, &'static str),
    #[error("unexpected {2}")]
    UnexpectedToken(usize, Span, String),
    #[error("{2} is not a valid variable name")]
    InvalidVariable(usize, Span, String),
    #[error("clause is neither an instruction, an assignment nor a message")]
    UnsupportedClause(usize, Span),
    #[error("unknown directive {2}")]
    UnknownDirective(usize, Span, String),
    #[error("{2} directive cannot be followed by code")]
    CodeAfterDirective(usize, Span, &'static str),
    #[error("{2} directive requires a preceding class directive")]
    MethodOutsideClass(usize, Span, &'static str),
}

impl HasSpan for SyntaxError {
    fn span(&self) -> Span {
        use self::SyntaxError::*;

        match *self {
            UnexpectedCharacter(_f, _c, i) => Span::new(i, i),
            UnterminatedString(_f, s) => s,
            UnterminatedComment(_f, s) => s,
            ExpectedExpression(_f, s) => s,
            ExpectedToken(_f, s, _) => s,
            UnexpectedToken(_f, s, _) => s,
            InvalidVariable(_f, s, _) => s,
            UnsupportedClause(_f, s) => s,
            UnknownDirective(_f, s, _) => s,
            CodeAfterDirective(_f, s, _) => s,
            MethodOutsideClass(_f, s, _) => s,
        }
    }
}

impl SyntaxError {
    pub fn file_id(&self) -> usize {
        use self::SyntaxError::*;

        match *self {
            UnexpectedCharacter(f, _, _) => f,
            UnterminatedString(f, _) => f,
            UnterminatedComment(f, _) => f,
            ExpectedExpression(f, _) => f,
            ExpectedToken(f, _, _) => f,
            UnexpectedToken(f, _, _) => f,
            InvalidVariable(f, _, _) => f,
            UnsupportedClause(f, _) => f,
            UnknownDirective(f, _, _) => f,
            CodeAfterDirective(f, _, _) => f,
            MethodOutsideClass(f, _, _) => f,
        }
    }

    pub fn to_diagnostic(&self) -> Diagnostic<usize> {
        Diagnostic::error()
            .with_message(format!("{}", self))
            .with_labels(vec![Label::primary(self.file_id(), self.span())])
    }
}

/// Everything that can go wrong turning source text into a package
#[derive(Debug, Error)]
pub enum ParseError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Build(#[from] BuildError),
    #[error(transparent)]
    Heap(#[from] HeapError),
}

impl ParseError {
    pub fn to_diagnostic(&self, source_map: &SourceMap) -> Diagnostic<usize> {
        match self {
            ParseError::Syntax(e) => e.to_diagnostic(),
            ParseError::Build(e) => source_map.diagnostic(e),
            ParseError::Heap(e) => Diagnostic::error().with_message(format!("{}", e)),
        }
    }
}
