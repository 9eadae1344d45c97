//! Envelope flattening and restoring benchmarks

use oryx::{
    common::sourcemap::SourceMap,
    eval::{
        emit::NullEmitter,
        machine::vm::{Machine, MachineSettings},
        memory::envelope::Envelope,
    },
    syntax::parse_package,
};

use criterion::{criterion_group, criterion_main, Criterion};

const PROGRAM: &str = "
call greet 'world'
say double(21)
exit

greet:
  use arg who
  say 'hello' who
  return

::routine double public
  use arg n
  return n * 2

::class point
::attribute x
::attribute y
::method sum
  return self~x + self~y
";

fn machine() -> Machine<'static> {
    Machine::new(Box::new(NullEmitter), MachineSettings::default()).unwrap()
}

pub fn criterion_benchmark(c: &mut Criterion) {
    let source = machine();
    let mut source_map = SourceMap::new();
    let package = parse_package(source.heap(), &mut source_map, 0, PROGRAM, "BENCH").unwrap();
    let envelope = Envelope::flatten(source.heap(), &[package]).unwrap();
    let bytes = envelope.as_bytes().to_vec();

    c.bench_function("flatten_package", |b| {
        b.iter(|| Envelope::flatten(source.heap(), &[package]).unwrap())
    });
    c.bench_function("read_envelope", |b| {
        b.iter(|| Envelope::from_bytes(bytes.clone()).unwrap())
    });
    c.bench_function("restore_package", |b| {
        let target = machine();
        b.iter(|| envelope.restore(target.heap()).unwrap())
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
