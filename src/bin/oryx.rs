extern crate oryx;

use std::process;

use oryx::driver::eval;
use oryx::driver::options::OryxOptions;
use oryx::driver::source::SourceLoader;
use oryx::driver::statistics::Statistics;

pub fn main() {
    env_logger::init();

    let opt = OryxOptions::from_args();

    // errors have already been reported as diagnostics
    let (result, statistics) = eval::run(&opt, SourceLoader::default());
    match result {
        Ok(code) => exit(&opt, code, &statistics),
        Err(_) => exit(&opt, 1, &statistics),
    }
}

/// Optionally dump stats to stderr then exit
pub fn exit(opts: &OryxOptions, code: i32, stats: &Statistics) {
    if opts.json_statistics() {
        eprintln!("{}", stats.to_json());
    } else if opts.statistics() {
        eprintln!();
        eprintln!("~~~~~~~~~~");
        eprintln!("STATISTICS");
        eprintln!("~~~~~~~~~~");
        eprintln!();
        eprintln!("{stats}");
    }
    process::exit(code)
}
