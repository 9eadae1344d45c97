//! Command line argument handling with clap v4 and subcommands.

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::eval::machine::vm::MachineSettings;

/// oryx - runs programs written in an object-oriented REXX dialect
#[derive(Parser, Debug, Clone)]
#[command(name = "oryx")]
#[command(about = "Runs programs written in an object-oriented REXX dialect")]
#[command(version)]
pub struct OryxCli {
    /// Program text to run instead of a file
    #[arg(short = 'e', long = "eval")]
    pub evaluate: Option<String>,

    #[command(flatten)]
    pub machine: MachineArgs,

    /// Print metrics to stderr before exiting
    #[arg(short = 'S', long = "statistics", global = true)]
    pub statistics: bool,

    /// Print statistics as JSON rather than text
    #[arg(long = "json-statistics", global = true)]
    pub json_statistics: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Program file (used when no subcommand specified)
    #[arg(value_name = "FILE")]
    pub file: Option<PathBuf>,

    /// Arguments passed to the program
    #[arg(value_name = "ARGS", trailing_var_arg = true)]
    pub args: Vec<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Run a program file (default)
    Run(RunArgs),
    /// Parse a program and write its package as an envelope
    Export(ExportArgs),
    /// Restore a package from an envelope and run it
    Import(ImportArgs),
}

/// Settings for the machine which runs the program
#[derive(Args, Debug, Clone, Default)]
pub struct MachineArgs {
    /// Trace executed instructions to the log
    #[arg(long = "trace", global = true)]
    pub trace: bool,

    /// KiB allocated between garbage collections
    #[arg(long = "heap-limit-kib", global = true)]
    pub heap_limit_kib: Option<usize>,

    /// Dump heap summaries at each collection
    #[arg(long = "dump-heap", global = true)]
    pub dump_heap: bool,
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Program file
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Arguments passed to the program
    #[arg(value_name = "ARGS", trailing_var_arg = true)]
    pub args: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ExportArgs {
    /// Program file
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Envelope file to write
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Print a hex dump of the envelope
    #[arg(long = "hex")]
    pub hex: bool,
}

#[derive(Args, Debug, Clone)]
pub struct ImportArgs {
    /// Envelope file to read
    #[arg(value_name = "ENVELOPE")]
    pub envelope: PathBuf,

    /// Describe the envelope instead of running it
    #[arg(long = "info")]
    pub info: bool,

    /// Arguments passed to the program
    #[arg(value_name = "ARGS", trailing_var_arg = true)]
    pub args: Vec<String>,
}

/// Where program text comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    File(PathBuf),
    /// Text given on the command line
    Cli(String),
}

impl std::fmt::Display for Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Source::File(path) => write!(f, "{}", path.display()),
            Source::Cli(_) => write!(f, "[cli]"),
        }
    }
}

/// What the command line asks for
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    Run {
        source: Source,
        args: Vec<String>,
    },
    Export {
        source: Source,
        output: PathBuf,
        hex: bool,
    },
    Import {
        envelope: PathBuf,
        info: bool,
        args: Vec<String>,
    },
    /// Nothing to run
    Usage,
}

/// Processed command line options
#[derive(Debug, Clone)]
pub struct OryxOptions {
    mode: Mode,
    settings: MachineSettings,
    statistics: bool,
    json_statistics: bool,
}

impl From<OryxCli> for OryxOptions {
    fn from(cli: OryxCli) -> Self {
        let mode = match cli.command {
            Some(Commands::Run(run)) => Mode::Run {
                source: Source::File(run.file),
                args: run.args,
            },
            Some(Commands::Export(export)) => Mode::Export {
                source: Source::File(export.file),
                output: export.output,
                hex: export.hex,
            },
            Some(Commands::Import(import)) => Mode::Import {
                envelope: import.envelope,
                info: import.info,
                args: import.args,
            },
            None => match (cli.evaluate, cli.file) {
                (Some(text), file) => {
                    let mut args: Vec<String> = file
                        .map(|f| f.to_string_lossy().to_string())
                        .into_iter()
                        .collect();
                    args.extend(cli.args);
                    Mode::Run {
                        source: Source::Cli(text),
                        args,
                    }
                }
                (None, Some(file)) => Mode::Run {
                    source: Source::File(file),
                    args: cli.args,
                },
                (None, None) => Mode::Usage,
            },
        };

        let settings = MachineSettings {
            trace: cli.machine.trace,
            dump_heap: cli.machine.dump_heap,
            heap_limit: cli.machine.heap_limit_kib.map(|kib| kib * 1024),
            ..MachineSettings::default()
        };

        OryxOptions {
            mode,
            settings,
            statistics: cli.statistics || cli.json_statistics,
            json_statistics: cli.json_statistics,
        }
    }
}

impl OryxOptions {
    /// Parse the process command line
    pub fn from_args() -> Self {
        OryxCli::parse().into()
    }

    /// Parse an explicit argument list (first item is the program
    /// name)
    pub fn from_arg_list<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        OryxCli::try_parse_from(args).map(OryxOptions::from)
    }

    pub fn mode(&self) -> &Mode {
        &self.mode
    }

    pub fn settings(&self) -> &MachineSettings {
        &self.settings
    }

    pub fn statistics(&self) -> bool {
        self.statistics
    }

    pub fn json_statistics(&self) -> bool {
        self.json_statistics
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_run_file_with_args() {
        let opt = OryxOptions::from_arg_list(["oryx", "prog.rex", "a", "b"]).unwrap();
        assert_eq!(
            opt.mode(),
            &Mode::Run {
                source: Source::File(PathBuf::from("prog.rex")),
                args: vec!["a".to_string(), "b".to_string()],
            }
        );
        assert!(!opt.statistics());
    }

    #[test]
    pub fn test_eval_text() {
        let opt = OryxOptions::from_arg_list(["oryx", "-e", "say 1", "--trace"]).unwrap();
        assert_eq!(
            opt.mode(),
            &Mode::Run {
                source: Source::Cli("say 1".to_string()),
                args: vec![],
            }
        );
        assert!(opt.settings().trace);
    }

    #[test]
    pub fn test_machine_settings() {
        let opt =
            OryxOptions::from_arg_list(["oryx", "--heap-limit-kib", "64", "--dump-heap", "-S", "x.rex"])
                .unwrap();
        assert_eq!(opt.settings().heap_limit, Some(64 * 1024));
        assert!(opt.settings().dump_heap);
        assert!(opt.statistics());
    }

    #[test]
    pub fn test_export_and_import() {
        let opt = OryxOptions::from_arg_list(["oryx", "export", "p.rex", "-o", "p.orx"]).unwrap();
        assert_eq!(
            opt.mode(),
            &Mode::Export {
                source: Source::File(PathBuf::from("p.rex")),
                output: PathBuf::from("p.orx"),
                hex: false,
            }
        );

        let opt = OryxOptions::from_arg_list(["oryx", "import", "p.orx", "--info"]).unwrap();
        assert_eq!(
            opt.mode(),
            &Mode::Import {
                envelope: PathBuf::from("p.orx"),
                info: true,
                args: vec![],
            }
        );
    }

    #[test]
    pub fn test_settings_before_and_after_subcommand() {
        for cli in [
            vec!["oryx", "--heap-limit-kib", "8", "-S", "run", "p.rex", "x"],
            vec!["oryx", "run", "--heap-limit-kib", "8", "-S", "p.rex", "x"],
        ] {
            let opt = OryxOptions::from_arg_list(cli).unwrap();
            assert_eq!(
                opt.mode(),
                &Mode::Run {
                    source: Source::File(PathBuf::from("p.rex")),
                    args: vec!["x".to_string()],
                }
            );
            assert_eq!(opt.settings().heap_limit, Some(8 * 1024));
            assert!(opt.statistics());
        }
    }

    #[test]
    pub fn test_no_program() {
        let opt = OryxOptions::from_arg_list(["oryx"]).unwrap();
        assert_eq!(opt.mode(), &Mode::Usage);
    }
}
