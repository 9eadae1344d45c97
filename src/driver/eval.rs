//! Run programs, export them to envelopes and run them back from
//! envelopes
use crate::{
    driver::{
        error::OryxError,
        options::{Mode, OryxOptions, Source},
        source::SourceLoader,
    },
    eval::{
        emit::{Emitter, NullEmitter, StdoutEmitter, WriteEmitter},
        machine::vm::Machine,
        memory::{envelope::Envelope, object::ObjRef},
    },
};
use codespan_reporting::{
    diagnostic::Diagnostic,
    term::{self, termcolor::NoColor},
};
use log::{debug, error};
use serde_json::json;
use std::{fs, io::Write, path::Path, time::Instant};

use super::statistics::Statistics;

/// Run whatever the options ask for
pub fn run(opt: &OryxOptions, loader: SourceLoader) -> (Result<i32, OryxError>, Statistics) {
    let mut stats = Statistics::default();
    let mut executor = Executor::new(loader);
    let result = executor.execute(opt, &mut stats);
    (result, stats)
}

pub struct Executor<'a> {
    /// Program text and source locations
    loader: SourceLoader,

    /// Overriden output stream
    out: Option<Box<dyn Write + 'a>>,

    /// Error stream
    err: Option<Box<dyn Write + 'a>>,
}

impl<'a> Executor<'a> {
    pub fn new(loader: SourceLoader) -> Self {
        Executor {
            loader,
            out: None,
            err: None,
        }
    }

    /// Provide override streams to capture the output to stdout and stderr
    pub fn capture_output(&mut self, out: Box<dyn Write + 'a>, err: Box<dyn Write + 'a>) {
        self.out = Some(out);
        self.err = Some(err);
    }

    pub fn loader(&self) -> &SourceLoader {
        &self.loader
    }

    /// Execute the mode selected by the options, reporting any error
    /// as a diagnostic. Returns the process exit code.
    pub fn execute(
        &mut self,
        opt: &OryxOptions,
        stats: &mut Statistics,
    ) -> Result<i32, OryxError> {
        let result = match opt.mode() {
            Mode::Run { source, args } => self.run_source(opt, source, args, stats),
            Mode::Export {
                source,
                output,
                hex,
            } => self.export(opt, source, output, *hex, stats),
            Mode::Import {
                envelope,
                info,
                args,
            } => self.import(opt, envelope, *info, args, stats),
            Mode::Usage => Err(OryxError::NoProgram),
        };
        self.diagnose(result)
    }

    fn run_source(
        &mut self,
        opt: &OryxOptions,
        source: &Source,
        args: &[String],
        stats: &mut Statistics,
    ) -> Result<i32, OryxError> {
        let file_id = self.loader.load(source)?;
        let mut machine = Machine::new(emitter(&mut self.out), opt.settings().clone())?;

        let package = {
            let t = Instant::now();
            let package = self.loader.parse(machine.heap(), file_id)?;
            stats.timings_mut().record("parse", t.elapsed());
            package
        };

        run_machine(&mut machine, package, args, stats)
    }

    fn export(
        &mut self,
        opt: &OryxOptions,
        source: &Source,
        output: &Path,
        hex: bool,
        stats: &mut Statistics,
    ) -> Result<i32, OryxError> {
        let file_id = self.loader.load(source)?;
        let machine = Machine::new(Box::new(NullEmitter), opt.settings().clone())?;

        let t = Instant::now();
        let package = self.loader.parse(machine.heap(), file_id)?;
        stats.timings_mut().record("parse", t.elapsed());

        let t = Instant::now();
        let envelope = Envelope::flatten(machine.heap(), &[package])?;
        stats.timings_mut().record("flatten", t.elapsed());

        let header = envelope.header();
        debug!(
            "envelope: {} objects, {} body bytes, {} external references",
            header.object_count, header.body_len, header.extern_count
        );

        fs::write(output, envelope.as_bytes())?;

        if hex {
            let dump = envelope.hex_dump();
            match self.out.as_mut() {
                Some(out) => writeln!(out, "{}", dump)?,
                None => println!("{}", dump),
            }
        }
        Ok(0)
    }

    fn import(
        &mut self,
        opt: &OryxOptions,
        path: &Path,
        info: bool,
        args: &[String],
        stats: &mut Statistics,
    ) -> Result<i32, OryxError> {
        let bytes = fs::read(path)
            .map_err(|_| OryxError::FileCouldNotBeRead(path.to_string_lossy().to_string()))?;
        let envelope = Envelope::from_bytes(bytes)?;

        if info {
            let header = envelope.header();
            let description = json!({
                "roots": header.root_count,
                "objects": header.object_count,
                "body_bytes": header.body_len,
                "external_references": header.extern_count,
            });
            match self.out.as_mut() {
                Some(out) => writeln!(out, "{}", description)?,
                None => println!("{}", description),
            }
            return Ok(0);
        }

        let mut machine = Machine::new(emitter(&mut self.out), opt.settings().clone())?;
        let t = Instant::now();
        let roots = envelope.restore(machine.heap())?;
        stats.timings_mut().record("restore", t.elapsed());

        let package = roots
            .first()
            .copied()
            .ok_or_else(|| OryxError::EmptyEnvelope(path.to_string_lossy().to_string()))?;
        run_machine(&mut machine, package, args, stats)
    }

    /// Print any errors as diagnoses
    fn diagnose(&mut self, result: Result<i32, OryxError>) -> Result<i32, OryxError> {
        match result {
            Err(e) => {
                let mut diagnostic = e.to_diagnostic(self.loader.source_map());

                if let Some(trace) = e.execution_error().and_then(|x| x.activation_trace()) {
                    let activation_trace = self
                        .loader
                        .source_map()
                        .format_trace(trace, self.loader.files());
                    diagnostic =
                        diagnostic.with_notes(vec![format!("activation trace:\n{}", activation_trace)]);
                }

                self.diagnose_to_stderr(&diagnostic);
                Err(e)
            }
            Ok(code) => Ok(code),
        }
    }

    fn diagnose_to_stderr(&mut self, diag: &Diagnostic<usize>) {
        match self.err {
            None => self.loader.diagnose_to_stderr(diag),
            Some(ref mut err) => {
                let config = term::Config::default();
                if let Err(e) = term::emit(
                    &mut NoColor::new(err.as_mut()),
                    &config,
                    self.loader.files(),
                    diag,
                ) {
                    error!("could not render diagnostic: {}", e);
                }
            }
        }
    }
}

/// Write program output to the override stream if there is one
fn emitter<'w, 'a: 'w>(out: &'w mut Option<Box<dyn Write + 'a>>) -> Box<dyn Emitter + 'w> {
    match out.as_mut() {
        Some(out) => Box::new(WriteEmitter::new(out)),
        None => Box::new(StdoutEmitter),
    }
}

/// Run a loaded package, capturing the machine's metrics and turning
/// any EXIT value into an exit code
fn run_machine(
    machine: &mut Machine,
    package: ObjRef,
    args: &[String],
    stats: &mut Statistics,
) -> Result<i32, OryxError> {
    let args: Vec<Option<&str>> = args.iter().map(|a| Some(a.as_str())).collect();

    let t = Instant::now();
    let outcome = machine.run_package(package, &args);
    stats.timings_mut().record("execute", t.elapsed());
    stats.capture(machine);

    match outcome? {
        Some(value) => {
            let text = machine.text(value)?;
            Ok(text.trim().parse::<i32>().unwrap_or(0))
        }
        None => Ok(0),
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::{cell::RefCell, rc::Rc};

    /// A writer sharing its buffer so tests can read it afterwards
    #[derive(Clone, Default)]
    struct Shared(Rc<RefCell<Vec<u8>>>);

    impl Write for Shared {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().write(buf)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Shared {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.borrow()).into_owned()
        }
    }

    fn execute(args: &[&str]) -> (Result<i32, OryxError>, String, String) {
        let mut cli = vec!["oryx"];
        cli.extend_from_slice(args);
        let opt = OryxOptions::from_arg_list(cli).unwrap();
        let out = Shared::default();
        let err = Shared::default();
        let mut executor = Executor::new(SourceLoader::default());
        executor.capture_output(Box::new(out.clone()), Box::new(err.clone()));
        let mut stats = Statistics::default();
        let result = executor.execute(&opt, &mut stats);
        (result, out.text(), err.text())
    }

    #[test]
    pub fn test_run_cli_text() {
        let (result, out, _) = execute(&["-e", "say 'hello' 'world'"]);
        assert_eq!(result.unwrap(), 0);
        assert_eq!(out, "hello world\n");
    }

    #[test]
    pub fn test_exit_code() {
        let (result, out, _) = execute(&["-e", "say 1\nexit 3\nsay 2"]);
        assert_eq!(result.unwrap(), 3);
        assert_eq!(out, "1\n");
    }

    #[test]
    pub fn test_arguments_reach_program() {
        let (result, out, _) = execute(&["-e", "use arg a, b\nsay b a", "x", "y"]);
        assert_eq!(result.unwrap(), 0);
        assert_eq!(out, "y x\n");
    }

    #[test]
    pub fn test_runtime_error_is_diagnosed() {
        let (result, _, err) = execute(&["-e", "say 1 / 0"]);
        assert!(matches!(result, Err(OryxError::Execution(_))));
        assert!(err.contains("error"));
    }

    #[test]
    pub fn test_syntax_error_is_diagnosed() {
        let (result, _, err) = execute(&["-e", "say 'open"]);
        assert!(matches!(result, Err(OryxError::Parse(_))));
        assert!(err.contains("unmatched quote"));
    }

    #[test]
    pub fn test_no_program() {
        let (result, _, err) = execute(&[]);
        assert!(matches!(result, Err(OryxError::NoProgram)));
        assert!(err.contains("no program specified"));
    }
}
