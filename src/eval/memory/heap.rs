//! The object heap
//!
//! An arena of slots addressed by [`ObjRef`]. Cells are reference
//! counted so that a caller may hold a cell while allocating; the
//! collector alone decides when a slot is emptied.

use std::cell::{Cell, RefCell};
use std::fmt::{self, Debug, Display};
use std::rc::Rc;

use indexmap::IndexMap;
use log::debug;
use thiserror::Error;

use super::{
    object::{HeapCell, HeapObject, ObjRef},
    string::HeapString,
};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HeapError {
    #[error("reference {0} does not identify a live object")]
    Dangling(ObjRef),
    #[error("expected {expected} but found {found}")]
    UnexpectedKind {
        expected: &'static str,
        found: &'static str,
    },
    #[error("heap exhausted after {0} slots")]
    Exhausted(usize),
    #[error("slot {0} was not reserved")]
    NotReserved(ObjRef),
    #[error("no shared object registered as {0}")]
    UnknownShared(SharedKey),
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),
    #[error("heap inconsistency: {0}")]
    Inconsistent(String),
}

/// Key under which a shared object is known to every heap
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum SharedKey {
    /// An interned literal string
    Literal(String),
    /// A named singleton such as `.TRUE` or a builtin class
    Singleton(String),
}

impl Display for SharedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SharedKey::Literal(text) => write!(f, "literal '{}'", text),
            SharedKey::Singleton(name) => write!(f, ".{}", name),
        }
    }
}

#[derive(Debug, Default, Clone)]
pub struct HeapStats {
    /// Objects allocated since heap creation
    pub objects_allocated: usize,
    /// Bytes allocated since heap creation
    pub bytes_allocated: usize,
    /// Objects currently occupying slots
    pub live_objects: usize,
    /// Bytes currently occupying slots
    pub live_bytes: usize,
    /// Objects reclaimed by all collections
    pub objects_reclaimed: usize,
    /// Bytes reclaimed by all collections
    pub bytes_reclaimed: usize,
    /// Number of collections performed
    pub collections: usize,
    /// Objects visited by the most recent mark
    pub last_mark_visits: usize,
    /// Bytes allocated since the last collection
    pub bytes_since_collection: usize,
}

struct Slot {
    seq: u32,
    cell: Option<Rc<HeapCell>>,
}

pub struct Heap {
    slots: RefCell<Vec<Slot>>,
    free: RefCell<Vec<u32>>,
    /// Generation of the most recent traversal
    generation: Cell<u32>,
    /// Bytes allocated between collections before policy demands one
    limit: Option<usize>,
    stats: RefCell<HeapStats>,
    interned: RefCell<IndexMap<String, ObjRef>>,
    singletons: RefCell<IndexMap<String, ObjRef>>,
    shared: RefCell<IndexMap<ObjRef, SharedKey>>,
}

impl Default for Heap {
    fn default() -> Self {
        Heap::new()
    }
}

impl Heap {
    pub fn new() -> Self {
        Heap {
            slots: RefCell::new(vec![]),
            free: RefCell::new(vec![]),
            generation: Cell::new(0),
            limit: None,
            stats: RefCell::new(HeapStats::default()),
            interned: RefCell::new(IndexMap::new()),
            singletons: RefCell::new(IndexMap::new()),
            shared: RefCell::new(IndexMap::new()),
        }
    }

    pub fn with_limit(limit_bytes: usize) -> Self {
        Heap {
            limit: Some(limit_bytes),
            ..Heap::new()
        }
    }

    /// Allocate an object, recording its exact footprint
    pub fn alloc(&self, body: HeapObject) -> Result<ObjRef, HeapError> {
        let cell = Rc::new(HeapCell::new(body));
        let footprint = cell.header().footprint();

        let mut slots = self.slots.borrow_mut();
        let reused = self.free.borrow_mut().pop();
        let r = match reused {
            Some(index) if (index as usize) < slots.len() => {
                let slot = &mut slots[index as usize];
                slot.seq = slot.seq.wrapping_add(1);
                slot.cell = Some(cell);
                ObjRef::new(index, slot.seq)
            }
            _ => {
                let index =
                    u32::try_from(slots.len()).map_err(|_| HeapError::Exhausted(slots.len()))?;
                slots.push(Slot {
                    seq: 0,
                    cell: Some(cell),
                });
                ObjRef::new(index, 0)
            }
        };

        let mut stats = self.stats.borrow_mut();
        stats.objects_allocated += 1;
        stats.bytes_allocated += footprint;
        stats.live_objects += 1;
        stats.live_bytes += footprint;
        stats.bytes_since_collection += footprint;
        Ok(r)
    }

    /// Retrieve the cell for a live reference
    pub fn get(&self, r: ObjRef) -> Result<Rc<HeapCell>, HeapError> {
        self.slots
            .borrow()
            .get(r.index())
            .filter(|slot| slot.seq == r.seq())
            .and_then(|slot| slot.cell.clone())
            .ok_or(HeapError::Dangling(r))
    }

    pub fn contains(&self, r: ObjRef) -> bool {
        self.get(r).is_ok()
    }

    /// Reserve a slot whose content will be supplied later by `fill`
    pub fn reserve(&self) -> Result<ObjRef, HeapError> {
        self.alloc(HeapObject::Reserved)
    }

    /// Supply the content of a reserved slot
    pub fn fill(&self, r: ObjRef, body: HeapObject) -> Result<Rc<HeapCell>, HeapError> {
        let current = self.get(r)?;
        if !matches!(current.body(), HeapObject::Reserved) {
            return Err(HeapError::NotReserved(r));
        }
        let cell = Rc::new(HeapCell::new(body));
        let growth = cell
            .header()
            .footprint()
            .saturating_sub(current.header().footprint());

        if let Some(slot) = self.slots.borrow_mut().get_mut(r.index()) {
            slot.cell = Some(cell.clone());
        }

        let mut stats = self.stats.borrow_mut();
        stats.bytes_allocated += growth;
        stats.live_bytes += growth;
        stats.bytes_since_collection += growth;
        Ok(cell)
    }

    /// Allocate a fresh (not interned) string
    pub fn string<S: Into<String>>(&self, text: S) -> Result<ObjRef, HeapError> {
        self.alloc(HeapObject::Str(HeapString::from(text.into())))
    }

    /// Return the shared string for a literal, creating it if needed
    pub fn intern(&self, text: &str) -> Result<ObjRef, HeapError> {
        if let Some(r) = self.interned.borrow().get(text) {
            return Ok(*r);
        }
        let r = self.string(text)?;
        self.get(r)?.header().set_shared();
        self.interned.borrow_mut().insert(text.to_string(), r);
        self.shared
            .borrow_mut()
            .insert(r, SharedKey::Literal(text.to_string()));
        Ok(r)
    }

    /// Register a named singleton, which becomes a permanent root
    pub fn register_singleton(&self, name: &str, r: ObjRef) -> Result<(), HeapError> {
        self.get(r)?.header().set_shared();
        self.singletons.borrow_mut().insert(name.to_string(), r);
        self.shared
            .borrow_mut()
            .entry(r)
            .or_insert_with(|| SharedKey::Singleton(name.to_string()));
        Ok(())
    }

    pub fn singleton(&self, name: &str) -> Option<ObjRef> {
        self.singletons.borrow().get(name).copied()
    }

    pub fn singletons(&self) -> Vec<(String, ObjRef)> {
        self.singletons
            .borrow()
            .iter()
            .map(|(k, v)| (k.clone(), *v))
            .collect()
    }

    /// Key of a shared object (None for ordinary objects)
    pub fn shared_key(&self, r: ObjRef) -> Option<SharedKey> {
        self.shared.borrow().get(&r).cloned()
    }

    /// Find (or for literals, create) the shared object for a key
    pub fn resolve_shared(&self, key: &SharedKey) -> Result<ObjRef, HeapError> {
        match key {
            SharedKey::Literal(text) => self.intern(text),
            SharedKey::Singleton(name) => self
                .singleton(name)
                .ok_or_else(|| HeapError::UnknownShared(key.clone())),
        }
    }

    /// Shared objects survive every collection
    pub fn permanent_roots(&self) -> Vec<ObjRef> {
        self.shared.borrow().keys().copied().collect()
    }

    /// Begin a new traversal, returning its generation
    pub fn next_generation(&self) -> u32 {
        let mut next = self.generation.get().wrapping_add(1);
        if next == 0 {
            next = 1;
        }
        self.generation.set(next);
        next
    }

    pub fn generation(&self) -> u32 {
        self.generation.get()
    }

    /// Reclaim every ordinary object not stamped with `generation`,
    /// returning objects and bytes reclaimed
    pub fn sweep(&mut self, generation: u32) -> (usize, usize) {
        let mut objects = 0;
        let mut bytes = 0;
        let slots = self.slots.get_mut();
        let free = self.free.get_mut();

        for (index, slot) in slots.iter_mut().enumerate() {
            let garbage = slot.cell.as_ref().map_or(false, |cell| {
                !cell.header().is_shared() && !cell.header().is_stamped(generation)
            });
            if garbage {
                if let Some(cell) = slot.cell.take() {
                    objects += 1;
                    bytes += cell.header().footprint();
                }
                free.push(index as u32);
            }
        }

        let stats = self.stats.get_mut();
        stats.objects_reclaimed += objects;
        stats.bytes_reclaimed += bytes;
        stats.live_objects -= objects;
        stats.live_bytes -= bytes;
        debug!("sweep reclaimed {} objects ({} bytes)", objects, bytes);
        (objects, bytes)
    }

    /// Record completion of a collection
    pub(crate) fn note_collection(&mut self, visited: usize) {
        let stats = self.stats.get_mut();
        stats.collections += 1;
        stats.last_mark_visits = visited;
        stats.bytes_since_collection = 0;
    }

    pub fn stats(&self) -> HeapStats {
        self.stats.borrow().clone()
    }

    pub fn live_objects(&self) -> usize {
        self.stats.borrow().live_objects
    }

    /// Every live object in slot order
    pub fn objects(&self) -> Vec<(ObjRef, Rc<HeapCell>)> {
        self.slots
            .borrow()
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| {
                slot.cell
                    .as_ref()
                    .map(|cell| (ObjRef::new(index as u32, slot.seq), cell.clone()))
            })
            .collect()
    }

    pub fn policy_requires_collection(&self) -> bool {
        match self.limit {
            Some(limit) => self.stats.borrow().bytes_since_collection >= limit,
            None => false,
        }
    }
}

impl Debug for Heap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (r, cell) in self.objects() {
            let header = cell.header();
            writeln!(
                f,
                "{:>10} {:<12} {:>6}{}{}",
                r.to_string(),
                cell.body().kind_name(),
                header.footprint(),
                if header.is_shared() { " shared" } else { "" },
                if header.is_frozen() { " frozen" } else { "" },
            )?;
        }
        Ok(())
    }
}
