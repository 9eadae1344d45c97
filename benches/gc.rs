//! Collector benchmarks

use oryx::{
    common::sourcemap::SourceMap,
    eval::{
        emit::NullEmitter,
        machine::vm::{Machine, MachineSettings},
        memory::heap::Heap,
    },
    syntax::parse_package,
};

use criterion::{black_box, criterion_group, criterion_main, Criterion};

/// A program rebinding one variable many times
fn assignments(count: usize) -> String {
    (0..count)
        .map(|i| format!("s = 'item' {}\n", i))
        .collect()
}

/// A program sending many messages to one instance
fn counter(count: usize) -> String {
    let mut text = String::from("c = .counter~new\nc~value = 0\n");
    for _ in 0..count {
        text.push_str("c~bump\n");
    }
    text.push_str("say c~value\n::class counter\n::attribute value\n::method bump\n  self~value = self~value + 1\n");
    text
}

/// Allocate strings nothing refers to
fn garbage(heap: &Heap, count: usize) {
    for i in 0..count {
        heap.string(format!("garbage {}", i)).unwrap();
    }
}

fn machine() -> Machine<'static> {
    Machine::new(Box::new(NullEmitter), MachineSettings::default()).unwrap()
}

fn run(text: &str, settings: MachineSettings) {
    let mut machine = Machine::new(Box::new(NullEmitter), settings).unwrap();
    let mut source_map = SourceMap::new();
    let package = parse_package(machine.heap(), &mut source_map, 0, text, "BENCH").unwrap();
    machine.run_package(package, &[]).unwrap();
}

pub fn criterion_benchmark(c: &mut Criterion) {
    c.bench_function("collect_bootstrapped_heap", |b| {
        let mut machine = machine();
        b.iter(|| machine.collect().unwrap())
    });
    c.bench_function("collect_garbage_1000", |b| {
        let mut machine = machine();
        b.iter(|| {
            garbage(machine.heap(), black_box(1000));
            machine.collect().unwrap()
        })
    });
    let looping = assignments(200);
    c.bench_function("assignments_without_collection", |b| {
        b.iter(|| run(&looping, MachineSettings::default()))
    });
    c.bench_function("assignments_with_small_heap_limit", |b| {
        let settings = MachineSettings {
            heap_limit: Some(16 * 1024),
            ..MachineSettings::default()
        };
        b.iter(|| run(&looping, settings.clone()))
    });
    let messages = counter(50);
    c.bench_function("counter_messages", |b| {
        b.iter(|| run(&messages, MachineSettings::default()))
    });
}

criterion_group!(benches, criterion_benchmark);
criterion_main!(benches);
