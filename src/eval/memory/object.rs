//! Managed object identity and the heap object variants
//!
//! Every heap entity is a [`HeapObject`] held in a [`HeapCell`]
//! together with its [`AllocHeader`]. References between objects are
//! [`ObjRef`] handles rather than pointers.

use std::{
    cell::Cell,
    fmt::{self, Display},
    mem::size_of,
};

use crate::eval::{
    code::{
        instruction::Instruction,
        package::{Package, Routine},
    },
    expr::expression::Expression,
    machine::classes::{ClassObject, Instance, Method},
};

use super::{header::AllocHeader, heap::HeapError, string::HeapString};

/// Identity of a managed object
///
/// The sequence number distinguishes successive occupants of a slot
/// so a reference that outlives its target is detected on use.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjRef {
    index: u32,
    seq: u32,
}

impl ObjRef {
    pub(crate) fn new(index: u32, seq: u32) -> Self {
        ObjRef { index, seq }
    }

    pub fn index(self) -> usize {
        self.index as usize
    }

    pub fn seq(self) -> u32 {
        self.seq
    }
}

impl Display for ObjRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}:{}", self.index, self.seq)
    }
}

/// Size of one reference slot
pub const REF_SIZE: usize = size_of::<ObjRef>();

/// Footprint of a fixed-size object
pub const BASE_SIZE: usize = size_of::<AllocHeader>() + size_of::<HeapObject>();

/// Footprint of an object with `slots` trailing reference slots
///
/// The base object already accounts for one slot.
pub const fn variable_footprint(slots: usize) -> usize {
    if slots == 0 {
        BASE_SIZE
    } else {
        BASE_SIZE + (slots - 1) * REF_SIZE
    }
}

/// A write-once reference used for back-patched links and late
/// bound associations
#[derive(Debug, Default)]
pub struct Link(Cell<Option<ObjRef>>);

impl Link {
    pub fn new(target: Option<ObjRef>) -> Self {
        Link(Cell::new(target))
    }

    pub fn to(target: ObjRef) -> Self {
        Link::new(Some(target))
    }

    pub fn get(&self) -> Option<ObjRef> {
        self.0.get()
    }

    pub fn is_set(&self) -> bool {
        self.0.get().is_some()
    }

    /// Set the link, returning false if already set
    pub fn set(&self, target: ObjRef) -> bool {
        if self.is_set() {
            false
        } else {
            self.0.set(Some(target));
            true
        }
    }
}

/// Receives the reference slots of an object during traversal
pub trait EdgeSink {
    /// Called once for every reference slot, including empty ones
    fn edge(&mut self, target: Option<ObjRef>);
}

impl<F> EdgeSink for F
where
    F: FnMut(Option<ObjRef>),
{
    fn edge(&mut self, target: Option<ObjRef>) {
        self(target)
    }
}

/// Declares the owned references of an object kind
///
/// This single declaration drives collection, census, consistency
/// checking and envelope export. Slots must be reported in the same
/// order that the kind's envelope encoding writes them.
pub trait Trace {
    fn trace(&self, edges: &mut dyn EdgeSink);
}

impl Trace for Link {
    fn trace(&self, edges: &mut dyn EdgeSink) {
        edges.edge(self.get())
    }
}

impl Trace for [Option<ObjRef>] {
    fn trace(&self, edges: &mut dyn EdgeSink) {
        for slot in self {
            edges.edge(*slot)
        }
    }
}

impl Trace for [ObjRef] {
    fn trace(&self, edges: &mut dyn EdgeSink) {
        for slot in self {
            edges.edge(Some(*slot))
        }
    }
}

/// Collect the slots of an object in trace order
pub fn edges_of<T: Trace + ?Sized>(object: &T) -> Vec<Option<ObjRef>> {
    let mut out = vec![];
    object.trace(&mut |e: Option<ObjRef>| out.push(e));
    out
}

/// Everything that can live in the heap
#[derive(Debug)]
pub enum HeapObject {
    /// Placeholder for a slot reserved during restore
    Reserved,
    Str(HeapString),
    Instruction(Instruction),
    Expression(Expression),
    Class(ClassObject),
    Instance(Instance),
    Method(Method),
    Routine(Routine),
    Package(Package),
}

impl HeapObject {
    pub fn kind_name(&self) -> &'static str {
        match self {
            HeapObject::Reserved => "reserved",
            HeapObject::Str(_) => "string",
            HeapObject::Instruction(_) => "instruction",
            HeapObject::Expression(_) => "expression",
            HeapObject::Class(_) => "class",
            HeapObject::Instance(_) => "instance",
            HeapObject::Method(_) => "method",
            HeapObject::Routine(_) => "routine",
            HeapObject::Package(_) => "package",
        }
    }

    /// Exact footprint in bytes
    ///
    /// Method tables and object variables grow after construction and
    /// are accounted as part of the base.
    pub fn footprint(&self) -> usize {
        match self {
            HeapObject::Str(s) => BASE_SIZE + s.len(),
            HeapObject::Instruction(i) => variable_footprint(i.slot_count()),
            HeapObject::Expression(e) => variable_footprint(e.slot_count()),
            HeapObject::Package(p) => variable_footprint(p.slot_count()),
            _ => BASE_SIZE,
        }
    }
}

impl Trace for HeapObject {
    fn trace(&self, edges: &mut dyn EdgeSink) {
        match self {
            HeapObject::Reserved | HeapObject::Str(_) => {}
            HeapObject::Instruction(i) => i.trace(edges),
            HeapObject::Expression(e) => e.trace(edges),
            HeapObject::Class(c) => c.trace(edges),
            HeapObject::Instance(i) => i.trace(edges),
            HeapObject::Method(m) => m.trace(edges),
            HeapObject::Routine(r) => r.trace(edges),
            HeapObject::Package(p) => p.trace(edges),
        }
    }
}

/// A heap slot's contents: header and body
#[derive(Debug)]
pub struct HeapCell {
    header: AllocHeader,
    body: HeapObject,
}

macro_rules! accessor {
    ($name:ident, $variant:ident, $ty:ty, $expected:literal) => {
        pub fn $name(&self) -> Result<&$ty, HeapError> {
            match &self.body {
                HeapObject::$variant(v) => Ok(v),
                other => Err(HeapError::UnexpectedKind {
                    expected: $expected,
                    found: other.kind_name(),
                }),
            }
        }
    };
}

impl HeapCell {
    pub fn new(body: HeapObject) -> Self {
        HeapCell {
            header: AllocHeader::new(body.footprint()),
            body,
        }
    }

    pub fn header(&self) -> &AllocHeader {
        &self.header
    }

    pub fn body(&self) -> &HeapObject {
        &self.body
    }

    accessor!(string, Str, HeapString, "string");
    accessor!(instruction, Instruction, Instruction, "instruction");
    accessor!(expression, Expression, Expression, "expression");
    accessor!(class, Class, ClassObject, "class");
    accessor!(instance, Instance, Instance, "instance");
    accessor!(method, Method, Method, "method");
    accessor!(routine, Routine, Routine, "routine");
    accessor!(package, Package, Package, "package");
}
