//! Collector support
//!
//! Collection is a [`walk`] from the roots with a visitor that
//! descends everywhere, followed by a sweep of every ordinary object
//! the walk did not stamp.

use log::debug;

use crate::eval::machine::metrics::{Clock, ThreadOccupation};

use super::{
    heap::{Heap, HeapError},
    object::ObjRef,
    walk::{walk, Marker},
};

/// Anything that can enumerate collection roots
pub trait Roots {
    fn roots(&self, out: &mut Vec<ObjRef>);
}

impl Roots for [ObjRef] {
    fn roots(&self, out: &mut Vec<ObjRef>) {
        out.extend_from_slice(self)
    }
}

impl Roots for Vec<ObjRef> {
    fn roots(&self, out: &mut Vec<ObjRef>) {
        out.extend_from_slice(self)
    }
}

/// Outcome of a single collection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CollectionReport {
    pub marked: usize,
    pub reclaimed_objects: usize,
    pub reclaimed_bytes: usize,
}

pub fn collect(
    roots: &dyn Roots,
    heap: &mut Heap,
    clock: &mut Clock,
    dump_heap: bool,
) -> Result<CollectionReport, HeapError> {
    if dump_heap {
        eprintln!("GC!");
    }

    let resume = clock.switch(ThreadOccupation::CollectorMark);

    let mut all = heap.permanent_roots();
    roots.roots(&mut all);
    debug!("collecting from {} roots", all.len());

    let marked = walk(heap, &all, &mut Marker)?;
    let generation = heap.generation();

    if dump_heap {
        eprintln!("Heap after mark:\n\n{:?}", heap)
    }

    clock.switch(ThreadOccupation::CollectorSweep);

    let (reclaimed_objects, reclaimed_bytes) = heap.sweep(generation);
    heap.note_collection(marked);

    if dump_heap {
        eprintln!("Heap after sweep:\n\n{:?}", heap)
    }

    clock.switch(resume);

    debug!(
        "collection marked {} and reclaimed {} objects",
        marked, reclaimed_objects
    );

    Ok(CollectionReport {
        marked,
        reclaimed_objects,
        reclaimed_bytes,
    })
}

#[cfg(test)]
pub mod tests {
    use std::iter::repeat_with;

    use crate::{
        common::sourcemap::Smid,
        eval::{
            code::instruction::{Instruction, InstructionKind},
            memory::object::HeapObject,
        },
    };

    use super::*;

    fn say(heap: &Heap, value: Option<ObjRef>) -> ObjRef {
        heap.alloc(HeapObject::Instruction(Instruction::new(
            Smid::default(),
            InstructionKind::Say { value },
        )))
        .unwrap()
    }

    #[test]
    pub fn test_simple_collection() {
        let mut heap = Heap::new();
        let mut clock = Clock::default();

        clock.switch(ThreadOccupation::Mutator);

        // A bunch of garbage...
        let garbage = repeat_with(|| heap.string("garbage").unwrap())
            .take(1024)
            .collect::<Vec<_>>();

        let kept = heap.string("kept").unwrap();
        let root = say(&heap, None);
        assert!(heap
            .get(root)
            .unwrap()
            .instruction()
            .unwrap()
            .chain(say(&heap, Some(kept))));

        let report = collect(&vec![root], &mut heap, &mut clock, false).unwrap();

        assert_eq!(report.marked, 3);
        assert_eq!(report.reclaimed_objects, 1024);
        assert!(heap.contains(kept));
        assert!(garbage.iter().all(|g| !heap.contains(*g)));
        assert_eq!(heap.live_objects(), 3);
        assert_eq!(clock.current(), ThreadOccupation::Mutator);
    }

    #[test]
    pub fn test_shared_objects_survive_without_roots() {
        let mut heap = Heap::new();
        let mut clock = Clock::default();
        let one = heap.intern("1").unwrap();
        let report = collect(&vec![], &mut heap, &mut clock, false).unwrap();
        assert_eq!(report.marked, 1);
        assert!(heap.contains(one));
    }

    #[test]
    pub fn test_cyclic_garbage_is_reclaimed() {
        let mut heap = Heap::new();
        let mut clock = Clock::default();
        let a = say(&heap, None);
        let b = say(&heap, None);
        heap.get(a).unwrap().instruction().unwrap().chain(b);
        heap.get(b).unwrap().instruction().unwrap().chain(a);
        let report = collect(&vec![], &mut heap, &mut clock, false).unwrap();
        assert_eq!(report.reclaimed_objects, 2);
        assert_eq!(heap.stats().collections, 1);
    }
}
