//! Emitting program output

use std::io::Write;

use log::warn;

/// Machine events for rendering output
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum Event {
    /// Emitted before all output
    OutputStreamStart,
    /// Emitted after all output
    OutputStreamEnd,
    /// A line written by SAY
    OutputLine(String),
}

/// Trait via which machines emit events
pub trait Emitter {
    /// Emit an `Event`
    fn emit(&mut self, event: Event);

    /// Some implementations may keep a buffer or capture of events
    fn captures(&self) -> &[Event] {
        &[]
    }

    /// Output a stream start event
    fn stream_start(&mut self) {
        self.emit(Event::OutputStreamStart);
    }

    /// Output a stream end event
    fn stream_end(&mut self) {
        self.emit(Event::OutputStreamEnd);
    }

    /// Output a line of text
    fn line(&mut self, text: &str) {
        self.emit(Event::OutputLine(text.to_string()))
    }
}

/// A trivial emitter which does nothing
#[derive(Default)]
pub struct NullEmitter;

impl Emitter for NullEmitter {
    fn emit(&mut self, _event: Event) {}
}

/// Writes lines to stdout
#[derive(Default)]
pub struct StdoutEmitter;

impl Emitter for StdoutEmitter {
    fn emit(&mut self, event: Event) {
        if let Event::OutputLine(text) = event {
            println!("{}", text)
        }
    }
}

/// Writes lines to any output stream
pub struct WriteEmitter<W: Write> {
    out: W,
}

impl<W: Write> WriteEmitter<W> {
    pub fn new(out: W) -> Self {
        WriteEmitter { out }
    }
}

impl<W: Write> Emitter for WriteEmitter<W> {
    fn emit(&mut self, event: Event) {
        let result = match event {
            Event::OutputLine(text) => writeln!(self.out, "{}", text),
            Event::OutputStreamEnd => self.out.flush(),
            Event::OutputStreamStart => Ok(()),
        };
        if let Err(e) = result {
            warn!("failed to write output: {}", e);
        }
    }
}

/// An emitter for testing that captures events
#[derive(Default)]
pub struct CapturingEmitter {
    events: Vec<Event>,
}

impl Emitter for CapturingEmitter {
    fn emit(&mut self, event: Event) {
        self.events.push(event);
    }

    fn captures(&self) -> &[Event] {
        self.events.as_slice()
    }
}

/// The output lines among captured events
pub fn lines(events: &[Event]) -> Vec<String> {
    events
        .iter()
        .filter_map(|e| match e {
            Event::OutputLine(text) => Some(text.clone()),
            _ => None,
        })
        .collect()
}
