use codespan::Span;
use codespan_reporting::{
    diagnostic::{Diagnostic, Label},
    files::SimpleFiles,
};
use std::fmt::Display;
use std::num::NonZeroU32;
use std::{fmt, ops::Range};

/// A handle that points to a source location in a source map.
///
/// Instructions and expressions carry a SMID rather than a span so
/// that heap nodes stay small and flatten to a single word.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Smid(Option<NonZeroU32>);

impl From<u32> for Smid {
    fn from(n: u32) -> Self {
        Smid(NonZeroU32::new(n))
    }
}

impl Display for Smid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        match self.0 {
            Some(n) => write!(f, "[{}]", n),
            None => write!(f, "[?]"),
        }
    }
}

impl Smid {
    fn new(index: usize) -> Smid {
        Smid(NonZeroU32::new(index as u32 + 1))
    }

    pub fn is_valid(&self) -> bool {
        self.0.is_some()
    }

    /// Index into the source map, if valid
    pub fn index(self) -> Option<usize> {
        self.0.map(|n| (n.get() - 1) as usize)
    }

    /// Raw encoding used in envelopes (zero is the invalid SMID)
    pub fn raw(self) -> u32 {
        self.0.map_or(0, NonZeroU32::get)
    }
}

#[cfg(test)]
impl Smid {
    pub fn fake(index: usize) -> Smid {
        Smid::new(index)
    }
}

/// Anything that has a SMID identifying a source location.
pub trait HasSmid {
    fn smid(&self) -> Smid;
}

/// Source information to associate with a syntax element
///
/// Synthetic locations (builtin classes, inline programs) carry an
/// annotation instead of a file co-ordinate.
pub struct SourceInfo {
    pub file: Option<usize>,
    /// Byte span
    pub span: Option<Span>,
    /// Text annotation (e.g. routine name)
    pub annotation: Option<String>,
}

/// Store all source info...
#[derive(Default)]
pub struct SourceMap {
    source: Vec<SourceInfo>,
}

impl SourceMap {
    pub fn new() -> Self {
        SourceMap::default()
    }

    /// Add a new source info and get a SMID referencing it
    pub fn add(&mut self, file: usize, span: Span) -> Smid {
        let smid = Smid::new(self.source.len());
        self.source.push(SourceInfo {
            file: Some(file),
            span: Some(span),
            annotation: None,
        });
        smid
    }

    /// Add a notional location which has no concrete file co-ordinate
    pub fn add_synthetic<T: AsRef<str>>(&mut self, annotation: T) -> Smid {
        let smid = Smid::new(self.source.len());
        self.source.push(SourceInfo {
            file: None,
            span: None,
            annotation: Some(annotation.as_ref().to_string()),
        });
        smid
    }

    pub fn len(&self) -> usize {
        self.source.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source.is_empty()
    }

    fn info(&self, smid: Smid) -> Option<&SourceInfo> {
        smid.index().and_then(|i| self.source.get(i))
    }

    /// Retrieve the SourceInfo for something that has a SMID
    pub fn source_info(&self, item: &dyn HasSmid) -> Option<&SourceInfo> {
        self.info(item.smid())
    }

    /// Create a default diagnostic for an error with a SMID
    pub fn diagnostic<E>(&self, error: &E) -> Diagnostic<usize>
    where
        E: HasSmid + Display,
    {
        let diag = Diagnostic::error().with_message(format!("{}", error));

        if let Some(&SourceInfo {
            file: Some(file),
            span: Some(span),
            ..
        }) = self.source_info(error)
        {
            diag.with_labels(vec![Label::primary(file, span)])
        } else {
            diag
        }
    }

    /// Format an activation trace, innermost first
    pub fn format_trace(&self, trace: &[Smid], files: &SimpleFiles<String, String>) -> String {
        let elements: Vec<_> = trace
            .iter()
            .filter_map(|smid| {
                self.info(*smid).and_then(|info| {
                    info.annotation
                        .as_deref()
                        .or_else(|| {
                            info.file
                                .and_then(|id| files.get(id).ok())
                                .and_then(|file| {
                                    info.span
                                        .and_then(|span| file.source().get(Range::from(span)))
                                })
                        })
                        .map(|text| format!("- {}", text.trim()))
                })
            })
            .collect();

        elements.as_slice().join("\n")
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    struct Located(Smid);

    impl HasSmid for Located {
        fn smid(&self) -> Smid {
            self.0
        }
    }

    impl Display for Located {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "located")
        }
    }

    #[test]
    pub fn test_raw_round_trip() {
        let mut map = SourceMap::new();
        let smid = map.add_synthetic("x");
        assert_eq!(Smid::from(smid.raw()), smid);
        assert_eq!(Smid::from(0).raw(), 0);
        assert!(!Smid::default().is_valid());
    }

    #[test]
    pub fn test_format_trace() {
        let mut files = SimpleFiles::new();
        let file = files.add("t.rex".to_string(), "say 'hi'\ncall foo".to_string());
        let mut map = SourceMap::new();
        let a = map.add(file, Span::new(9, 17));
        let b = map.add_synthetic("routine FOO");
        assert_eq!(
            map.format_trace(&[b, a], &files),
            "- routine FOO\n- call foo"
        );
    }

    #[test]
    pub fn test_diagnostic_labels() {
        let mut map = SourceMap::new();
        let smid = map.add(0, Span::new(0, 3));
        let diag = map.diagnostic(&Located(smid));
        assert_eq!(diag.labels.len(), 1);
        let diag = map.diagnostic(&Located(Smid::default()));
        assert!(diag.labels.is_empty());
    }
}
