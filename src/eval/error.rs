//! Execution errors
//!
//! Runtime conditions carry the language's `major.minor` error code
//! and the SMID of the clause that raised them.
use crate::common::sourcemap::{HasSmid, Smid, SourceMap};
use crate::eval::memory::heap::HeapError;
use crate::eval::memory::object::ObjRef;
use codespan_reporting::diagnostic::Diagnostic;
use std::fmt;
use thiserror::Error;

/// Compute the Levenshtein edit distance between two strings.
///
/// This is a simple dynamic programming implementation suitable for
/// short names in error messages.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let b_len = b.chars().count();
    if a.is_empty() {
        return b_len;
    }
    if b.is_empty() {
        return a.chars().count();
    }

    let mut prev_row: Vec<usize> = (0..=b_len).collect();
    let mut curr_row = vec![0; b_len + 1];

    for (i, a_ch) in a.chars().enumerate() {
        curr_row[0] = i + 1;
        for (j, b_ch) in b.chars().enumerate() {
            let cost = if a_ch == b_ch { 0 } else { 1 };
            curr_row[j + 1] = (prev_row[j] + cost)
                .min(prev_row[j + 1] + 1)
                .min(curr_row[j] + 1);
        }
        std::mem::swap(&mut prev_row, &mut curr_row);
    }

    prev_row[b_len]
}

/// Find similar names from a list of candidates, closest first.
pub fn suggest_similar(target: &str, candidates: &[String], max_distance: usize) -> Vec<String> {
    let mut scored: Vec<(usize, &String)> = candidates
        .iter()
        .map(|c| (levenshtein_distance(target, c), c))
        .filter(|(d, _)| *d > 0 && *d <= max_distance)
        .collect();
    scored.sort();
    scored.into_iter().take(3).map(|(_, s)| s.clone()).collect()
}

fn with_suggestions(message: String, suggestions: &[String]) -> String {
    match suggestions {
        [] => message,
        [one] => format!("{}\n  help: did you mean {}?", message, one),
        many => format!("{}\n  help: did you mean one of {}?", message, many.join(", ")),
    }
}

fn format_not_found(name: &str, suggestions: &[String]) -> String {
    with_suggestions(format!("could not find routine \"{}\"", name), suggestions)
}

fn format_unknown_method(receiver: &str, message: &str, suggestions: &[String]) -> String {
    with_suggestions(
        format!(
            "object \"{}\" does not understand message \"{}\"",
            receiver, message
        ),
        suggestions,
    )
}

/// The language-level `major.minor` error number
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorCode {
    pub major: u16,
    pub minor: u16,
}

impl ErrorCode {
    pub const fn new(major: u16, minor: u16) -> Self {
        ErrorCode { major, minor }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Debug, Error, Clone)]
pub enum ExecutionError {
    /// wrapped with the activation trace, innermost first
    #[error("{0}")]
    Traced(Box<ExecutionError>, Vec<Smid>),
    /// Not a condition: unwinds every activation to the program
    #[error("EXIT")]
    Exit(Option<ObjRef>),
    #[error("logical value must be exactly 0 or 1; found \"{1}\"")]
    InvalidIfValue(Smid, String),
    #[error("WHEN value must be exactly 0 or 1; found \"{1}\"")]
    InvalidWhenValue(Smid, String),
    #[error("logical operand must be exactly 0 or 1; found \"{1}\"")]
    InvalidLogicalValue(Smid, String),
    #[error("{}", format_not_found(.1, .2))]
    RoutineNotFound(Smid, String, Vec<String>),
    #[error("no data returned from function \"{1}\"")]
    NoFunctionResult(Smid, String),
    #[error("no data returned from method \"{1}\"")]
    NoMessageResult(Smid, String),
    #[error("{}", format_unknown_method(.1, .2, .3))]
    UnknownMethod(Smid, String, String, Vec<String>),
    #[error("\"{1}\" is not a valid scope override for \"{2}\"")]
    InvalidScopeOverride(Smid, String, String),
    #[error("bad arithmetic conversion: \"{1}\" is not a number")]
    BadArithmetic(Smid, String),
    #[error("arithmetic overflow; divisor must not be zero")]
    DivisionByZero(Smid),
    #[error("NUMERIC DIGITS value \"{1}\" must be a positive whole number")]
    InvalidDigits(Smid, String),
    #[error("NUMERIC FUZZ value \"{1}\" must be zero or a positive whole number")]
    InvalidFuzz(Smid, String),
    #[error("NUMERIC DIGITS {1} must be greater than NUMERIC FUZZ {2}")]
    DigitsNotAboveFuzz(Smid, usize, usize),
    #[error("NUMERIC FUZZ {1} must be less than NUMERIC DIGITS {2}")]
    FuzzNotBelowDigits(Smid, usize, usize),
    #[error("NUMERIC FORM value \"{1}\" must be ENGINEERING or SCIENTIFIC")]
    InvalidForm(Smid, String),
    #[error("incorrect call to routine {1}: {2}")]
    IncorrectCall(Smid, String, String),
    #[error("EXPOSE is only valid in a method")]
    ExposeOutsideMethod(Smid),
    #[error("code not valid for execution: {1}")]
    InvalidCode(Smid, String),
    #[error("control stack full: more than {1} nested calls")]
    ControlStackFull(Smid, usize),
    #[error("evaluation stack underflow")]
    StackUnderflow(Smid),
    #[error(transparent)]
    Heap(#[from] HeapError),
}

impl HasSmid for ExecutionError {
    fn smid(&self) -> Smid {
        match self {
            ExecutionError::Traced(e, _) => e.smid(),
            ExecutionError::InvalidIfValue(s, _)
            | ExecutionError::InvalidWhenValue(s, _)
            | ExecutionError::InvalidLogicalValue(s, _)
            | ExecutionError::RoutineNotFound(s, _, _)
            | ExecutionError::NoFunctionResult(s, _)
            | ExecutionError::NoMessageResult(s, _)
            | ExecutionError::UnknownMethod(s, _, _, _)
            | ExecutionError::InvalidScopeOverride(s, _, _)
            | ExecutionError::BadArithmetic(s, _)
            | ExecutionError::DivisionByZero(s)
            | ExecutionError::InvalidDigits(s, _)
            | ExecutionError::InvalidFuzz(s, _)
            | ExecutionError::DigitsNotAboveFuzz(s, _, _)
            | ExecutionError::FuzzNotBelowDigits(s, _, _)
            | ExecutionError::InvalidForm(s, _)
            | ExecutionError::IncorrectCall(s, _, _)
            | ExecutionError::ExposeOutsideMethod(s)
            | ExecutionError::InvalidCode(s, _)
            | ExecutionError::StackUnderflow(s)
            | ExecutionError::ControlStackFull(s, _) => *s,
            ExecutionError::Exit(_) | ExecutionError::Heap(_) => Smid::default(),
        }
    }
}

impl ExecutionError {
    /// The language error number of this condition
    pub fn code(&self) -> ErrorCode {
        match self {
            ExecutionError::Traced(e, _) => e.code(),
            ExecutionError::Exit(_) => ErrorCode::new(0, 0),
            ExecutionError::InvalidIfValue(..) => ErrorCode::new(34, 1),
            ExecutionError::InvalidWhenValue(..) => ErrorCode::new(34, 2),
            ExecutionError::InvalidLogicalValue(..) => ErrorCode::new(34, 6),
            ExecutionError::RoutineNotFound(..) => ErrorCode::new(43, 1),
            ExecutionError::NoFunctionResult(..) => ErrorCode::new(44, 1),
            ExecutionError::NoMessageResult(..) => ErrorCode::new(44, 2),
            ExecutionError::UnknownMethod(..) => ErrorCode::new(97, 1),
            ExecutionError::InvalidScopeOverride(..) => ErrorCode::new(98, 1),
            ExecutionError::BadArithmetic(..) => ErrorCode::new(41, 1),
            ExecutionError::DivisionByZero(..) => ErrorCode::new(42, 3),
            ExecutionError::InvalidDigits(..) => ErrorCode::new(26, 5),
            ExecutionError::InvalidFuzz(..) => ErrorCode::new(26, 6),
            ExecutionError::DigitsNotAboveFuzz(..) => ErrorCode::new(33, 1),
            ExecutionError::FuzzNotBelowDigits(..) => ErrorCode::new(33, 2),
            ExecutionError::InvalidForm(..) => ErrorCode::new(33, 3),
            ExecutionError::IncorrectCall(..) => ErrorCode::new(40, 1),
            ExecutionError::ExposeOutsideMethod(..) => ErrorCode::new(17, 1),
            ExecutionError::ControlStackFull(..) => ErrorCode::new(11, 1),
            ExecutionError::InvalidCode(..) | ExecutionError::StackUnderflow(..) => {
                ErrorCode::new(49, 1)
            }
            ExecutionError::Heap(HeapError::Exhausted(_)) => ErrorCode::new(5, 1),
            ExecutionError::Heap(_) => ErrorCode::new(49, 1),
        }
    }

    /// Strip any trace wrapper
    pub fn root(&self) -> &ExecutionError {
        match self {
            ExecutionError::Traced(e, _) => e.root(),
            e => e,
        }
    }

    pub fn is_exit(&self) -> bool {
        matches!(self.root(), ExecutionError::Exit(_))
    }

    /// Wrap with an activation trace unless already traced
    pub fn traced(self, trace: Vec<Smid>) -> Self {
        match self {
            e @ (ExecutionError::Traced(..) | ExecutionError::Exit(_)) => e,
            e => ExecutionError::Traced(Box::new(e), trace),
        }
    }

    pub fn to_diagnostic(&self, source_map: &SourceMap) -> Diagnostic<usize> {
        source_map
            .diagnostic(self)
            .with_code(format!("Error {}", self.code()))
    }

    /// Access activation trace if present
    pub fn activation_trace(&self) -> Option<&[Smid]> {
        if let ExecutionError::Traced(_, trace) = self {
            Some(trace)
        } else {
            None
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_levenshtein() {
        assert_eq!(levenshtein_distance("LENGTH", "LENGHT"), 2);
        assert_eq!(levenshtein_distance("", "ABC"), 3);
        assert_eq!(levenshtein_distance("SAME", "SAME"), 0);
    }

    #[test]
    pub fn test_suggestions_in_message() {
        let candidates = vec!["REVERSE".to_string(), "LENGTH".to_string()];
        let err = ExecutionError::RoutineNotFound(
            Smid::default(),
            "REVERS".to_string(),
            suggest_similar("REVERS", &candidates, 2),
        );
        assert_eq!(
            err.to_string(),
            "could not find routine \"REVERS\"\n  help: did you mean REVERSE?"
        );
    }

    #[test]
    pub fn test_codes_survive_tracing() {
        let err = ExecutionError::InvalidWhenValue(Smid::default(), "2".to_string())
            .traced(vec![Smid::default()]);
        assert_eq!(err.code().to_string(), "34.2");
        assert!(err.activation_trace().is_some());
        assert!(ExecutionError::Exit(None).traced(vec![]).is_exit());
    }
}
