//! Run the harness programs through the driver and compare their
//! output
use oryx::driver::{
    error::OryxError, eval::Executor, options::OryxOptions, source::SourceLoader,
    statistics::Statistics,
};
use std::{cell::RefCell, fs, io::Write, path::PathBuf, rc::Rc};

/// A writer sharing its buffer so the test can read it afterwards
#[derive(Clone, Default)]
struct Shared(Rc<RefCell<Vec<u8>>>);

impl Write for Shared {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.borrow_mut().extend_from_slice(buf);
        Ok(buf.len())
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

struct Outcome {
    result: Result<i32, OryxError>,
    out: String,
    err: String,
    stats: Statistics,
}

fn harness(filename: &str) -> String {
    format!("harness/test/{filename}")
}

/// Run the command line (without the program name)
fn oryx(args: &[&str]) -> Outcome {
    let mut cli = vec!["oryx"];
    cli.extend_from_slice(args);
    let opt = OryxOptions::from_arg_list(cli).unwrap();

    let out = Shared::default();
    let err = Shared::default();
    let mut stats = Statistics::default();
    let result = {
        let mut executor = Executor::new(SourceLoader::default());
        executor.capture_output(Box::new(out.clone()), Box::new(err.clone()));
        executor.execute(&opt, &mut stats)
    };

    Outcome {
        result,
        out: out.text(),
        err: err.text(),
        stats,
    }
}

/// Run a harness program and check its output against the
/// accompanying .out file
fn run_test(name: &str) {
    let program = harness(&format!("{name}.rex"));
    let expected = fs::read_to_string(harness(&format!("{name}.out"))).unwrap();
    let outcome = oryx(&[&program]);
    assert_eq!(outcome.err, "");
    assert_eq!(outcome.result.unwrap(), 0);
    assert_eq!(outcome.out, expected);
}

#[test]
pub fn test_harness_001() {
    run_test("001_say");
}

#[test]
pub fn test_harness_002() {
    run_test("002_if");
}

#[test]
pub fn test_harness_003() {
    run_test("003_select");
}

#[test]
pub fn test_harness_004() {
    run_test("004_calls");
}

#[test]
pub fn test_harness_005() {
    run_test("005_classes");
}

#[test]
pub fn test_harness_006() {
    run_test("006_numeric");
}

#[test]
pub fn test_settings_guard() {
    let outcome = oryx(&[&harness("007_settings_guard.rex")]);
    let error = outcome.result.unwrap_err();
    let code = error.execution_error().map(|e| e.code().to_string());
    assert_eq!(code.as_deref(), Some("33.1"));
    assert_eq!(outcome.out, "");
    assert!(outcome.err.contains("007_settings_guard.rex"));
}

#[test]
pub fn test_external_call_site_searches_once() {
    let outcome = oryx(&[&harness("004_calls.rex")]);
    assert_eq!(outcome.result.unwrap(), 0);
    assert_eq!(outcome.stats.resolution_searches(), 1);
    assert!(outcome.stats.ticks() > 0);
}

#[test]
pub fn test_otherwise_runs_once() {
    let outcome = oryx(&[
        "-e",
        "select case 'z'\n when 'a' then say 'a'\n otherwise say 'other'\nend\nsay 'after'",
    ]);
    assert_eq!(outcome.result.unwrap(), 0);
    assert_eq!(outcome.out, "other\nafter\n");
}

#[test]
pub fn test_exit_value_becomes_exit_code() {
    let outcome = oryx(&["-e", "use arg n\nexit n + 1", "4"]);
    assert_eq!(outcome.result.unwrap(), 5);
}

#[test]
pub fn test_activation_trace_in_diagnostic() {
    let outcome = oryx(&["-e", "call f\nexit\nf:\n  say 1 / 0"]);
    assert!(matches!(outcome.result, Err(OryxError::Execution(_))));
    assert!(outcome.err.contains("activation trace"));
}

#[test]
pub fn test_envelope_export_and_import() {
    let dir = std::env::temp_dir();
    let envelope = dir.join(format!("oryx-harness-{}.orx", std::process::id()));
    let envelope_arg = envelope.to_string_lossy().to_string();

    let export = oryx(&["export", &harness("005_classes.rex"), "-o", &envelope_arg]);
    assert_eq!(export.result.unwrap(), 0);
    assert!(PathBuf::from(&envelope).exists());

    let info = oryx(&["import", &envelope_arg, "--info"]);
    assert_eq!(info.result.unwrap(), 0);
    let description: serde_json::Value = serde_json::from_str(info.out.trim()).unwrap();
    assert_eq!(description["roots"], serde_json::json!(1));
    assert!(description["objects"].as_u64().unwrap() > 0);

    let run = oryx(&["import", &envelope_arg]);
    assert_eq!(run.result.unwrap(), 0);
    let expected = fs::read_to_string(harness("005_classes.out")).unwrap();
    assert_eq!(run.out, expected);

    fs::remove_file(&envelope).unwrap();
}

/// Export a harness program to an envelope, run the envelope and
/// check its output against the accompanying .out file
fn run_exported(name: &str) {
    let envelope = std::env::temp_dir().join(format!("oryx-{}-{}.orx", name, std::process::id()));
    let envelope_arg = envelope.to_string_lossy().to_string();

    let export = oryx(&["export", &harness(&format!("{name}.rex")), "-o", &envelope_arg]);
    assert_eq!(export.result.unwrap(), 0);

    let run = oryx(&["import", &envelope_arg]);
    fs::remove_file(&envelope).unwrap();
    assert_eq!(run.err, "");
    assert_eq!(run.result.unwrap(), 0);
    let expected = fs::read_to_string(harness(&format!("{name}.out"))).unwrap();
    assert_eq!(run.out, expected);
}

#[test]
pub fn test_exported_if() {
    run_exported("002_if");
}

#[test]
pub fn test_exported_select() {
    run_exported("003_select");
}

#[test]
pub fn test_missing_program_file() {
    let outcome = oryx(&["harness/test/no_such_program.rex"]);
    assert!(matches!(
        outcome.result,
        Err(OryxError::FileCouldNotBeRead(_))
    ));
    assert!(outcome.err.contains("could not be read"));
}
