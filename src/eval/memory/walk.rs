//! Generalized marking
//!
//! A traversal of everything reachable from a set of roots that
//! stamps each object with a fresh generation and hands it to a
//! visitor exactly once. Collection is one visitor; census,
//! consistency checking and envelope enumeration are others. All of
//! them see the edge set declared by [`Trace`].

use indexmap::IndexMap;

use super::{
    heap::{Heap, HeapError},
    object::{HeapCell, ObjRef, Trace},
};

/// Whether a traversal should continue through an object's edges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Descend {
    Edges,
    Stop,
}

pub trait HeapVisitor {
    fn visit(&mut self, r: ObjRef, cell: &HeapCell) -> Result<Descend, HeapError>;
}

/// Visit every object reachable from `roots` once, depth first in
/// edge order, returning the number visited
///
/// An explicit work list keeps deep and cyclic graphs off the native
/// stack. Empty slots are skipped.
pub fn walk(
    heap: &Heap,
    roots: &[ObjRef],
    visitor: &mut dyn HeapVisitor,
) -> Result<usize, HeapError> {
    let generation = heap.next_generation();
    let mut pending: Vec<ObjRef> = roots.iter().rev().copied().collect();
    let mut edges: Vec<ObjRef> = vec![];
    let mut visited = 0;

    while let Some(r) = pending.pop() {
        let cell = heap.get(r)?;
        if !cell.header().stamp(generation) {
            continue;
        }
        visited += 1;

        if visitor.visit(r, &cell)? == Descend::Edges {
            edges.clear();
            cell.body().trace(&mut |e: Option<ObjRef>| {
                if let Some(target) = e {
                    edges.push(target)
                }
            });
            pending.extend(edges.iter().rev());
        }
    }

    Ok(visited)
}

/// Visitor that descends everywhere and does nothing else
pub struct Marker;

impl HeapVisitor for Marker {
    fn visit(&mut self, _: ObjRef, _: &HeapCell) -> Result<Descend, HeapError> {
        Ok(Descend::Edges)
    }
}

/// Count reachable objects and bytes per kind
#[derive(Debug, Default)]
pub struct Census {
    pub objects: IndexMap<&'static str, usize>,
    pub bytes: usize,
    /// Number of visits, which must equal the number of distinct
    /// reachable objects
    pub visits: usize,
}

impl HeapVisitor for Census {
    fn visit(&mut self, _: ObjRef, cell: &HeapCell) -> Result<Descend, HeapError> {
        *self.objects.entry(cell.body().kind_name()).or_insert(0) += 1;
        self.bytes += cell.header().footprint();
        self.visits += 1;
        Ok(Descend::Edges)
    }
}

/// Check every reachable reference is live and every footprint
/// matches its body
#[derive(Debug, Default)]
pub struct ConsistencyCheck {
    pub checked: usize,
}

impl HeapVisitor for ConsistencyCheck {
    fn visit(&mut self, r: ObjRef, cell: &HeapCell) -> Result<Descend, HeapError> {
        if cell.header().footprint() != cell.body().footprint() {
            return Err(HeapError::Inconsistent(format!(
                "footprint of {} does not match its {} body",
                r,
                cell.body().kind_name()
            )));
        }
        self.checked += 1;
        Ok(Descend::Edges)
    }
}

/// Take a census of everything reachable from roots
pub fn census(heap: &Heap, roots: &[ObjRef]) -> Result<Census, HeapError> {
    let mut census = Census::default();
    walk(heap, roots, &mut census)?;
    Ok(census)
}
