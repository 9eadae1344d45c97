//! The execution machine
//!
//! A machine owns one heap, the list of active activations and the
//! packages it has loaded. Each activation runs its instruction chain
//! to completion; calls push a new activation and run it
//! synchronously.

use indexmap::IndexMap;
use log::debug;

use crate::{
    common::sourcemap::{HasSmid, Smid},
    eval::{
        code::package::Routine,
        emit::{Emitter, Event, NullEmitter},
        error::ExecutionError,
        memory::{
            collect::{self, CollectionReport, Roots},
            heap::{Heap, HeapStats},
            mutator::{Mutator, MutatorHeapView},
            object::{HeapObject, ObjRef},
        },
        trace::{LogTracer, NullTracer, TraceRecord, Tracer},
    },
};

use super::{
    activation::{Activation, NumericSettings, DEFAULT_DIGITS},
    classes::{Bootstrap, WellKnown},
    metrics::{Clock, Metrics, ThreadOccupation},
};

/// A library routine supplied by the host, operating on string
/// values
pub type HostFunction = fn(&[Option<String>]) -> Result<Option<String>, String>;

pub const DEFAULT_MAX_DEPTH: usize = 256;

#[derive(Debug, Clone)]
pub struct MachineSettings {
    /// Record executed instructions through the log-backed tracer
    pub trace: bool,
    /// Dump heap summaries at each collection
    pub dump_heap: bool,
    /// Bytes allocated between collections
    pub heap_limit: Option<usize>,
    pub digits: usize,
    /// Maximum nesting of activations
    pub max_depth: usize,
}

impl Default for MachineSettings {
    fn default() -> Self {
        MachineSettings {
            trace: false,
            dump_heap: false,
            heap_limit: None,
            digits: DEFAULT_DIGITS,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// The part of a machine the collector scans for roots
#[derive(Default)]
pub struct MachineState {
    pub(crate) activations: Vec<Activation>,
    pub(crate) packages: Vec<ObjRef>,
    pub(crate) host_routines: IndexMap<String, (ObjRef, HostFunction)>,
}

impl Roots for MachineState {
    fn roots(&self, out: &mut Vec<ObjRef>) {
        out.extend_from_slice(&self.packages);
        out.extend(self.host_routines.values().map(|(r, _)| *r));
        for activation in &self.activations {
            activation.roots(out);
        }
    }
}

/// GC roots (outside heap, pointing in) are:
/// - loaded packages and host routines
/// - every activation (stack, variables, arguments, receiver)
/// - the heap's shared singletons and interned literals
pub struct Machine<'a> {
    pub(crate) heap: Heap,
    pub(crate) state: MachineState,
    pub(crate) known: WellKnown,
    pub(crate) emitter: Box<dyn Emitter + 'a>,
    pub(crate) tracer: Box<dyn Tracer + 'a>,
    pub(crate) settings: MachineSettings,
    pub(crate) metrics: Metrics,
    pub(crate) clock: Clock,
}

impl<'a> Machine<'a> {
    /// Construct a machine with a fresh, bootstrapped heap
    pub fn new(
        emitter: Box<dyn Emitter + 'a>,
        settings: MachineSettings,
    ) -> Result<Self, ExecutionError> {
        let heap = settings
            .heap_limit
            .map(Heap::with_limit)
            .unwrap_or_default();
        Self::with_heap(heap, emitter, settings)
    }

    /// Construct a machine over an existing heap, bootstrapping it if
    /// necessary
    pub fn with_heap(
        heap: Heap,
        emitter: Box<dyn Emitter + 'a>,
        settings: MachineSettings,
    ) -> Result<Self, ExecutionError> {
        let mut clock = Clock::default();
        clock.switch(ThreadOccupation::Initialisation);

        let known = Bootstrap.run(&MutatorHeapView::new(&heap), ())?;
        let tracer: Box<dyn Tracer + 'a> = if settings.trace {
            Box::new(LogTracer)
        } else {
            Box::new(NullTracer)
        };

        let mut state = MachineState::default();
        state.activations.push(Activation::host(NumericSettings::with_digits(
            settings.digits,
        )));

        Ok(Machine {
            heap,
            state,
            known,
            emitter,
            tracer,
            settings,
            metrics: Metrics::default(),
            clock,
        })
    }

    /// Access the heap for allocation
    pub fn heap(&self) -> &Heap {
        &self.heap
    }

    /// Access the metrics (ticks, allocs, etc.)
    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    /// Get heap statistics
    pub fn heap_stats(&self) -> HeapStats {
        self.heap.stats()
    }

    /// Return clock for access to GC timings
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn known(&self) -> WellKnown {
        self.known
    }

    pub fn set_tracer(&mut self, tracer: Box<dyn Tracer + 'a>) {
        self.tracer = tracer;
    }

    pub fn trace_records(&self) -> &[TraceRecord] {
        self.tracer.records()
    }

    /// Apply a mutation which needs heap access
    pub fn mutate<I, O, M>(&self, mutator: M, input: I) -> Result<O, ExecutionError>
    where
        M: Mutator<Input = I, Output = O>,
    {
        let view = MutatorHeapView::new(&self.heap);
        mutator.run(&view, input)
    }

    /// Make a package's public routines visible to external search
    pub fn load(&mut self, package: ObjRef) -> Result<(), ExecutionError> {
        self.heap.get(package)?.package()?;
        if !self.state.packages.contains(&package) {
            self.state.packages.push(package);
        }
        Ok(())
    }

    /// Register a host library routine, found last by external search
    pub fn register_host_routine(
        &mut self,
        name: &str,
        function: HostFunction,
    ) -> Result<ObjRef, ExecutionError> {
        let name = name.to_uppercase();
        let routine = self.heap.alloc(HeapObject::Routine(Routine::host(&name)))?;
        self.heap
            .register_singleton(&format!("ROUTINE:{}", name), routine)?;
        self.state.host_routines.insert(name, (routine, function));
        Ok(routine)
    }

    pub(crate) fn host_function(&self, name: &str) -> Option<HostFunction> {
        self.state.host_routines.get(name).map(|(_, f)| *f)
    }

    /// Run a package's main code as a program
    pub fn run_package(
        &mut self,
        package: ObjRef,
        args: &[Option<&str>],
    ) -> Result<Option<ObjRef>, ExecutionError> {
        self.clock.switch(ThreadOccupation::Mutator);
        self.load(package)?;
        let entry = self.heap.get(package)?.package()?.main();

        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(match arg {
                Some(text) => Some(self.new_string(*text)?),
                None => None,
            });
        }

        let activation = Activation::program(
            package,
            entry,
            values,
            NumericSettings::with_digits(self.settings.digits),
        );

        self.emitter.stream_start();
        let outcome = match self.run_activation(Smid::default(), activation) {
            Err(ExecutionError::Exit(value)) => Ok(value),
            other => other,
        };
        self.emitter.stream_end();
        self.clock.switch(ThreadOccupation::Initialisation);
        outcome
    }

    /// Push an activation, run it to completion and return its result
    pub(crate) fn run_activation(
        &mut self,
        smid: Smid,
        activation: Activation,
    ) -> Result<Option<ObjRef>, ExecutionError> {
        // the host activation at the base is not a call
        if self.state.activations.len().saturating_sub(1) > self.settings.max_depth {
            return Err(ExecutionError::ControlStackFull(
                smid,
                self.settings.max_depth,
            ));
        }
        self.state.activations.push(activation);
        let outcome = self.run_top();
        let finished = self.state.activations.pop();
        outcome?;
        Ok(finished.and_then(|a| a.result()))
    }

    fn run_top(&mut self) -> Result<(), ExecutionError> {
        loop {
            let activation = self.activation()?;
            if activation.is_finished() {
                return Ok(());
            }
            let next = match activation.next() {
                Some(next) => next,
                None => return Ok(()),
            };

            if self.heap.policy_requires_collection() {
                self.collect()?;
                self.clock.switch(ThreadOccupation::Mutator);
            }

            self.step(next)?;
        }
    }

    /// Execute one instruction of the innermost activation
    fn step(&mut self, r: ObjRef) -> Result<(), ExecutionError> {
        self.metrics.tick();
        let cell = self.heap.get(r)?;
        let instruction = cell.instruction()?;
        let smid = instruction.smid();
        self.activation_mut()?
            .enter(r, smid, instruction.next());
        self.metrics.stack(self.state.activations.len());

        self.execute(instruction).map_err(|e| {
            let trace = self.activation_trace();
            e.traced(trace)
        })
    }

    /// Source locations of the active clauses, innermost first
    pub fn activation_trace(&self) -> Vec<Smid> {
        self.state
            .activations
            .iter()
            .rev()
            .map(Activation::smid)
            .filter(Smid::is_valid)
            .collect()
    }

    /// Collect garbage now
    pub fn collect(&mut self) -> Result<CollectionReport, ExecutionError> {
        let report = collect::collect(
            &self.state,
            &mut self.heap,
            &mut self.clock,
            self.settings.dump_heap,
        )?;
        self.metrics.collection();
        Ok(report)
    }

    pub(crate) fn activation(&self) -> Result<&Activation, ExecutionError> {
        self.state
            .activations
            .last()
            .ok_or_else(|| ExecutionError::InvalidCode(Smid::default(), "no activation".into()))
    }

    pub(crate) fn activation_mut(&mut self) -> Result<&mut Activation, ExecutionError> {
        self.state
            .activations
            .last_mut()
            .ok_or_else(|| ExecutionError::InvalidCode(Smid::default(), "no activation".into()))
    }

    /// Numeric settings of the innermost activation
    pub fn settings(&self) -> NumericSettings {
        self.activation()
            .map(Activation::settings)
            .unwrap_or_else(|_| NumericSettings::with_digits(self.settings.digits))
    }

    pub(crate) fn current_args(&self) -> Result<Vec<Option<ObjRef>>, ExecutionError> {
        Ok(self.activation()?.args().to_vec())
    }

    /// Allocate a runtime string
    pub fn new_string<S: Into<String>>(&mut self, text: S) -> Result<ObjRef, ExecutionError> {
        self.metrics.alloc(1);
        Ok(self.heap.string(text)?)
    }

    /// The string value of any object
    pub fn text(&self, r: ObjRef) -> Result<String, ExecutionError> {
        let cell = self.heap.get(r)?;
        Ok(match cell.body() {
            HeapObject::Str(s) => s.as_str().to_string(),
            HeapObject::Class(c) => format!("The {} class", c.name()),
            HeapObject::Instance(_) if r == self.known.nil => "The NIL object".to_string(),
            HeapObject::Instance(i) => {
                let class = self.heap.get(i.class())?;
                with_article(class.class()?.name())
            }
            other => with_article(&other.kind_name().to_uppercase()),
        })
    }

    /// The class of any object
    pub fn class_of(&self, r: ObjRef) -> Result<ObjRef, ExecutionError> {
        let cell = self.heap.get(r)?;
        Ok(match cell.body() {
            HeapObject::Str(_) => self.known.string,
            HeapObject::Class(_) => self.known.class,
            HeapObject::Instance(i) => i.class(),
            _ => self.known.object,
        })
    }

    /// Logical value: identity with the boolean singletons first,
    /// then `"1"`/`"0"` ignoring surrounding blanks
    pub fn logical(&self, value: ObjRef) -> Result<Option<bool>, ExecutionError> {
        if value == self.known.true_ {
            return Ok(Some(true));
        }
        if value == self.known.false_ {
            return Ok(Some(false));
        }
        let cell = self.heap.get(value)?;
        Ok(match cell.body() {
            HeapObject::Str(s) => match s.as_str().trim_matches(' ') {
                "1" => Some(true),
                "0" => Some(false),
                _ => None,
            },
            _ => None,
        })
    }

    pub(crate) fn trace(&mut self, record: TraceRecord) {
        if self.tracer.enabled() {
            self.tracer.record(record)
        }
    }

    pub(crate) fn trace_result(&mut self, value: ObjRef) -> Result<(), ExecutionError> {
        if self.tracer.enabled() {
            let indent = self.activation()?.indent();
            let value = self.text(value)?;
            self.tracer.record(TraceRecord::Result { indent, value });
        }
        Ok(())
    }

    pub(crate) fn emit_line(&mut self, text: &str) {
        self.emitter.line(text)
    }

    /// Recover the emitter after a run
    pub fn take_emitter(&mut self) -> Box<dyn Emitter + 'a> {
        let mut ret: Box<dyn Emitter + 'a> = Box::new(NullEmitter);
        std::mem::swap(&mut ret, &mut self.emitter);
        ret
    }

    pub fn captures(&self) -> &[Event] {
        self.emitter.captures()
    }

    pub(crate) fn log_search(&self, smid: Smid, name: &str, found: bool) {
        debug!(
            "resolution search for {} at {}: {}",
            name,
            smid,
            if found { "found" } else { "not found" }
        );
    }
}

fn with_article(name: &str) -> String {
    match name.chars().next() {
        Some('A' | 'E' | 'I' | 'O' | 'U') => format!("an {}", name),
        _ => format!("a {}", name),
    }
}
