use crate::common::sourcemap::SourceMap;
use crate::driver::{error::OryxError, options::Source};
use crate::eval::memory::{heap::Heap, object::ObjRef};
use crate::syntax::parser::parse_package;
use codespan_reporting::diagnostic::Diagnostic;
use codespan_reporting::files::SimpleFiles;
use codespan_reporting::term::emit;
use codespan_reporting::term::termcolor::{ColorChoice, NoColor, StandardStream};
use log::{debug, error};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// A loader for program text that keeps the text for error reporting
/// and parses it into packages.
pub struct SourceLoader {
    /// Map sources to file ids
    sources: HashMap<String, usize>,
    /// Access to source file text
    files: SimpleFiles<String, String>,
    /// SourceMap for references to source locations across all files
    source_map: SourceMap,
}

impl Default for SourceLoader {
    fn default() -> Self {
        SourceLoader {
            sources: HashMap::default(),
            files: SimpleFiles::new(),
            source_map: SourceMap::default(),
        }
    }
}

impl SourceLoader {
    /// Load the text of a source, returning its file id
    pub fn load(&mut self, source: &Source) -> Result<usize, OryxError> {
        let key = match source {
            Source::File(path) => path.to_string_lossy().to_string(),
            Source::Cli(text) => format!("[cli]{}", text),
        };
        if let Some(id) = self.sources.get(&key) {
            return Ok(*id);
        }

        let text = match source {
            Source::File(path) => read_file(path)?,
            Source::Cli(text) => text.to_string(),
        };
        let id = self.load_text(source.to_string(), text);
        self.sources.insert(key, id);
        Ok(id)
    }

    /// Add text under a name (without caching by source)
    pub fn load_text(&mut self, name: String, text: String) -> usize {
        debug!("loaded {} ({} bytes)", name, text.len());
        self.files.add(name, text)
    }

    /// Parse a loaded file into a package on the heap
    pub fn parse(&mut self, heap: &Heap, file_id: usize) -> Result<ObjRef, OryxError> {
        let file = self.files.get(file_id)?;
        let name = package_name(file.name());
        Ok(parse_package(
            heap,
            &mut self.source_map,
            file_id,
            file.source(),
            &name,
        )?)
    }

    pub fn source_map(&self) -> &SourceMap {
        &self.source_map
    }

    pub fn files(&self) -> &SimpleFiles<String, String> {
        &self.files
    }

    /// Print a diagnostic to stderr
    pub fn diagnose_to_stderr(&self, diag: &Diagnostic<usize>) {
        let writer = StandardStream::stderr(ColorChoice::Auto);
        let config = codespan_reporting::term::Config::default();
        if let Err(e) = emit(&mut writer.lock(), &config, &self.files, diag) {
            error!("could not render diagnostic: {}", e);
        };
    }

    pub fn diagnose_to_string(&self, diag: &Diagnostic<usize>) -> String {
        let mut s: Vec<u8> = Vec::new();
        {
            let mut writer = NoColor::new(&mut s);
            let config = codespan_reporting::term::Config::default();
            if let Err(e) = emit(&mut writer, &config, &self.files, diag) {
                error!("could not render diagnostic: {}", e);
            }
        }
        String::from_utf8_lossy(&s).into_owned()
    }
}

/// Package name for a file: its stem, uppercased
fn package_name(name: &str) -> String {
    Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().to_uppercase())
        .unwrap_or_else(|| name.to_uppercase())
}

fn read_file(path: &Path) -> Result<String, OryxError> {
    fs::read_to_string(path)
        .map_err(|_| OryxError::FileCouldNotBeRead(path.to_string_lossy().to_string()))
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::eval::memory::heap::Heap;
    use crate::syntax::error::ParseError;
    use std::path::PathBuf;

    #[test]
    pub fn test_package_names() {
        assert_eq!(package_name("tests/harness/hello.rex"), "HELLO");
        assert_eq!(package_name("[cli]"), "[CLI]");
    }

    #[test]
    pub fn test_sources_are_loaded_once() {
        let mut loader = SourceLoader::default();
        let a = loader.load(&Source::Cli("say 1".to_string())).unwrap();
        let b = loader.load(&Source::Cli("say 1".to_string())).unwrap();
        let c = loader.load(&Source::Cli("say 2".to_string())).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    pub fn test_missing_file() {
        let mut loader = SourceLoader::default();
        let source = Source::File(PathBuf::from("no/such/file.rex"));
        assert!(matches!(
            loader.load(&source),
            Err(OryxError::FileCouldNotBeRead(_))
        ));
    }

    #[test]
    pub fn test_parse_error_renders_location() {
        let mut loader = SourceLoader::default();
        let id = loader.load(&Source::Cli("say 'unfinished".to_string())).unwrap();
        let heap = Heap::new();
        let error = loader.parse(&heap, id).unwrap_err();
        assert!(matches!(error, OryxError::Parse(ParseError::Syntax(_))));
        let text = loader.diagnose_to_string(&error.to_diagnostic(loader.source_map()));
        assert!(text.contains("unmatched quote"));
        assert!(text.contains("[cli]"));
    }
}
