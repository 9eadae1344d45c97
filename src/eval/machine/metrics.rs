//! Machine metrics

use std::cmp::max;
use std::fmt;
use std::time::{Duration, Instant};

/// Record some metrics as we execute code
#[derive(Default, Debug, Clone)]
pub struct Metrics {
    ticks: u64,
    allocs: u64,
    max_stack: usize,
    resolution_searches: u64,
    collections: u64,
}

impl Metrics {
    pub fn tick(&mut self) {
        self.ticks += 1;
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn alloc(&mut self, count: usize) {
        self.allocs += count as u64;
    }

    pub fn allocs(&self) -> u64 {
        self.allocs
    }

    pub fn stack(&mut self, size: usize) {
        self.max_stack = max(self.max_stack, size);
    }

    pub fn max_stack(&self) -> usize {
        self.max_stack
    }

    /// Count a full external search for a function call target
    pub fn resolution_search(&mut self) {
        self.resolution_searches += 1;
    }

    pub fn resolution_searches(&self) -> u64 {
        self.resolution_searches
    }

    pub fn collection(&mut self) {
        self.collections += 1;
    }

    pub fn collections(&self) -> u64 {
        self.collections
    }
}

/// What the (single) machine thread is currently doing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ThreadOccupation {
    Initialisation,
    Mutator,
    CollectorMark,
    CollectorSweep,
}

impl ThreadOccupation {
    const ALL: [ThreadOccupation; 4] = [
        ThreadOccupation::Initialisation,
        ThreadOccupation::Mutator,
        ThreadOccupation::CollectorMark,
        ThreadOccupation::CollectorSweep,
    ];

    fn slot(self) -> usize {
        self as usize
    }
}

impl fmt::Display for ThreadOccupation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ThreadOccupation::Initialisation => "initialisation",
            ThreadOccupation::Mutator => "mutator",
            ThreadOccupation::CollectorMark => "collector-mark",
            ThreadOccupation::CollectorSweep => "collector-sweep",
        };
        write!(f, "{}", name)
    }
}

/// Accumulates wall time spent in each occupation
#[derive(Debug, Clone)]
pub struct Clock {
    current: ThreadOccupation,
    since: Instant,
    totals: [Duration; 4],
}

impl Default for Clock {
    fn default() -> Self {
        Clock {
            current: ThreadOccupation::Initialisation,
            since: Instant::now(),
            totals: [Duration::ZERO; 4],
        }
    }
}

impl Clock {
    /// Charge time so far to the current occupation and switch
    pub fn switch(&mut self, occupation: ThreadOccupation) -> ThreadOccupation {
        let now = Instant::now();
        self.totals[self.current.slot()] += now - self.since;
        self.since = now;
        std::mem::replace(&mut self.current, occupation)
    }

    pub fn current(&self) -> ThreadOccupation {
        self.current
    }

    /// Total time charged to an occupation (excluding any running
    /// interval)
    pub fn total(&self, occupation: ThreadOccupation) -> Duration {
        self.totals[occupation.slot()]
    }

    pub fn report(&self) -> Vec<(ThreadOccupation, Duration)> {
        ThreadOccupation::ALL
            .iter()
            .map(|o| (*o, self.total(*o)))
            .collect()
    }
}
