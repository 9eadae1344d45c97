//! Capture and report statistics for optimisation

use std::{fmt::Display, time::Duration};

use indexmap::IndexMap;
use itertools::Itertools;
use serde_json::{json, Value};

use crate::eval::{
    machine::{metrics::Clock, vm::Machine},
    memory::heap::HeapStats,
};

#[derive(Default, Debug)]
pub struct Timings {
    timings: IndexMap<String, Duration>,
}

impl Timings {
    pub fn record<T: AsRef<str>>(&mut self, name: T, elapsed: Duration) {
        self.timings.insert(name.as_ref().to_string(), elapsed);
    }

    pub fn merge(&mut self, other: Timings) {
        self.timings.extend(other.timings);
    }

    /// Record the time a machine's thread spent in each occupation
    pub fn record_clock(&mut self, clock: &Clock) {
        for (occupation, elapsed) in clock.report() {
            self.record(occupation.to_string(), elapsed);
        }
    }

    pub fn get(&self, name: &str) -> Option<Duration> {
        self.timings.get(name).copied()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.timings
                .iter()
                .map(|(k, v)| (k.clone(), json!(v.as_secs_f64())))
                .collect(),
        )
    }
}

impl Display for Timings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let width = self.timings.keys().map(|k| k.len()).max().unwrap_or(0) + 1;
        let rows = self
            .timings
            .iter()
            .map(|(k, v)| format!("{:width$}: {:14.9}s", k, v.as_secs_f64(), width = width))
            .join("\n");
        writeln!(f, "{}", rows)
    }
}

/// The statistics captured during a run
#[derive(Default, Debug)]
pub struct Statistics {
    machine_ticks: u64,
    machine_allocs: u64,
    max_stack: usize,
    resolution_searches: u64,
    collections: u64,
    heap: HeapStats,
    timings: Timings,
}

impl Statistics {
    pub fn set_ticks(&mut self, ticks: u64) {
        self.machine_ticks = ticks;
    }

    pub fn set_allocs(&mut self, allocs: u64) {
        self.machine_allocs = allocs;
    }

    pub fn set_max_stack(&mut self, max_stack: usize) {
        self.max_stack = max_stack;
    }

    pub fn ticks(&self) -> u64 {
        self.machine_ticks
    }

    pub fn resolution_searches(&self) -> u64 {
        self.resolution_searches
    }

    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    pub fn timings_mut(&mut self) -> &mut Timings {
        &mut self.timings
    }

    /// Capture the metrics of a machine at the end of its run
    pub fn capture(&mut self, machine: &Machine) {
        let metrics = machine.metrics();
        self.set_ticks(metrics.ticks());
        self.set_allocs(metrics.allocs());
        self.set_max_stack(metrics.max_stack());
        self.resolution_searches = metrics.resolution_searches();
        self.collections = metrics.collections();
        self.heap = machine.heap_stats();
        self.timings.record_clock(machine.clock());
    }

    pub fn merge(&mut self, other: Statistics) {
        self.machine_ticks += other.machine_ticks;
        self.machine_allocs += other.machine_allocs;
        self.max_stack = self.max_stack.max(other.max_stack);
        self.resolution_searches += other.resolution_searches;
        self.collections += other.collections;
        self.timings.merge(other.timings);
    }

    pub fn to_json(&self) -> Value {
        json!({
            "ticks": self.machine_ticks,
            "allocs": self.machine_allocs,
            "max_stack": self.max_stack,
            "resolution_searches": self.resolution_searches,
            "collections": self.collections,
            "heap": {
                "objects_allocated": self.heap.objects_allocated,
                "bytes_allocated": self.heap.bytes_allocated,
                "live_objects": self.heap.live_objects,
                "live_bytes": self.heap.live_bytes,
                "objects_reclaimed": self.heap.objects_reclaimed,
                "bytes_reclaimed": self.heap.bytes_reclaimed,
            },
            "timings": self.timings.to_json(),
        })
    }
}

impl Display for Statistics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Machine Ticks       : {:10}", self.machine_ticks)?;
        writeln!(f, "Machine Allocs      : {:10}", self.machine_allocs)?;
        writeln!(f, "Max Stack           : {:10}", self.max_stack)?;
        writeln!(f, "Resolution Searches : {:10}", self.resolution_searches)?;
        writeln!(f, "Collections         : {:10}", self.collections)?;
        writeln!(f, "Live Bytes          : {:10}", self.heap.live_bytes)?;
        writeln!(f)?;
        writeln!(f, "{}", self.timings)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_timings_render_in_insertion_order() {
        let mut timings = Timings::default();
        timings.record("parse", Duration::from_millis(5));
        timings.record("execute", Duration::from_millis(20));
        let text = format!("{}", timings);
        let parse = text.find("parse").unwrap();
        let execute = text.find("execute").unwrap();
        assert!(parse < execute);
        assert_eq!(timings.to_json()["parse"], json!(0.005));
    }

    #[test]
    pub fn test_empty_timings_render() {
        assert_eq!(format!("{}", Timings::default()), "\n");
    }

    #[test]
    pub fn test_statistics_json() {
        let mut stats = Statistics::default();
        stats.set_ticks(12);
        stats.set_max_stack(3);
        let value = stats.to_json();
        assert_eq!(value["ticks"], json!(12));
        assert_eq!(value["max_stack"], json!(3));
        assert!(value["heap"]["live_bytes"].is_number());
    }
}
