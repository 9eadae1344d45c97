//! Flatten and restore of object subgraphs
//!
//! An envelope is a relocatable byte image of everything reachable
//! from a set of roots. Layout (all integers little-endian):
//!
//! ```text
//! header   magic "ORXE" | version u16 | flags u16 | roots u32
//!          | objects u32 | body length u32 | externs u32
//! offsets  objects × u32   body offset of each object
//! roots    roots × ref
//! body     objects in discovery order
//! externs  externs × (kind u8 | length u32 | utf-8 key)
//! ```
//!
//! A ref is five bytes: a tag (0 null, 1 body offset, 2 extern index)
//! and a u32 operand. Shared objects (interned literals, singletons)
//! are never copied; they are written as extern keys and resolved
//! against the target heap on restore.

use std::collections::HashMap;

use indexmap::IndexSet;
use log::debug;
use pretty_hex::pretty_hex;

use crate::common::sourcemap::Smid;

#[cfg(debug_assertions)]
use super::object::edges_of;
use super::{
    heap::{Heap, HeapError, SharedKey},
    object::{HeapCell, HeapObject, Link, ObjRef},
    string::HeapString,
    walk::{walk, Descend, HeapVisitor},
};

pub const MAGIC: &[u8; 4] = b"ORXE";
pub const VERSION: u16 = 1;

const HEADER_LEN: usize = 24;
const REF_LEN: usize = 5;

const TAG_NULL: u8 = 0;
const TAG_LOCAL: u8 = 1;
const TAG_EXTERN: u8 = 2;

const KEY_LITERAL: u8 = 0;
const KEY_SINGLETON: u8 = 1;

const FLAG_FROZEN: u8 = 1;

fn malformed<S: Into<String>>(message: S) -> HeapError {
    HeapError::MalformedEnvelope(message.into())
}

fn to_u32(n: usize) -> Result<u32, HeapError> {
    u32::try_from(n).map_err(|_| malformed(format!("{} exceeds envelope limits", n)))
}

/// Encoding of one object kind into an envelope body
///
/// Reference slots must be written in the order the kind's
/// [`Trace`](super::object::Trace) implementation reports them.
pub trait Flatten: Sized {
    fn flatten(&self, out: &mut EnvelopeWriter) -> Result<(), HeapError>;
    fn restore(input: &mut EnvelopeReader) -> Result<Self, HeapError>;
}

/// Enumerates export candidates; shared objects are excluded and
/// not descended
struct Exporter<'h> {
    heap: &'h Heap,
    order: Vec<ObjRef>,
}

impl HeapVisitor for Exporter<'_> {
    fn visit(&mut self, r: ObjRef, _: &HeapCell) -> Result<Descend, HeapError> {
        if self.heap.shared_key(r).is_some() {
            Ok(Descend::Stop)
        } else {
            self.order.push(r);
            Ok(Descend::Edges)
        }
    }
}

pub struct EnvelopeWriter<'h> {
    heap: &'h Heap,
    ordinals: HashMap<ObjRef, u32>,
    externs: IndexSet<SharedKey>,
    body: Vec<u8>,
    /// (position in body, ordinal of target) awaiting offsets
    fixups: Vec<(usize, u32)>,
    /// References written for the object in progress
    written: Vec<Option<ObjRef>>,
}

impl<'h> EnvelopeWriter<'h> {
    fn new(heap: &'h Heap, order: &[ObjRef]) -> Self {
        EnvelopeWriter {
            heap,
            ordinals: order
                .iter()
                .enumerate()
                .map(|(i, r)| (*r, i as u32))
                .collect(),
            externs: IndexSet::new(),
            body: vec![],
            fixups: vec![],
            written: vec![],
        }
    }

    pub fn u8(&mut self, value: u8) {
        self.body.push(value)
    }

    pub fn bool(&mut self, value: bool) {
        self.u8(value as u8)
    }

    pub fn u32(&mut self, value: u32) {
        self.body.extend_from_slice(&value.to_le_bytes())
    }

    pub fn len(&mut self, value: usize) -> Result<(), HeapError> {
        self.u32(to_u32(value)?);
        Ok(())
    }

    pub fn str(&mut self, value: &str) -> Result<(), HeapError> {
        self.len(value.len())?;
        self.body.extend_from_slice(value.as_bytes());
        Ok(())
    }

    pub fn names(&mut self, names: &[String]) -> Result<(), HeapError> {
        self.len(names.len())?;
        for name in names {
            self.str(name)?;
        }
        Ok(())
    }

    pub fn smid(&mut self, smid: Smid) {
        self.u32(smid.raw())
    }

    fn extern_index(&mut self, key: SharedKey) -> Result<u32, HeapError> {
        let (index, _) = self.externs.insert_full(key);
        to_u32(index)
    }

    /// Write a reference slot
    pub fn reference(&mut self, target: Option<ObjRef>) -> Result<(), HeapError> {
        self.written.push(target);
        match target {
            None => {
                self.u8(TAG_NULL);
                self.u32(0);
            }
            Some(r) => {
                if let Some(key) = self.heap.shared_key(r) {
                    let index = self.extern_index(key)?;
                    self.u8(TAG_EXTERN);
                    self.u32(index);
                } else {
                    let ordinal = *self.ordinals.get(&r).ok_or_else(|| {
                        HeapError::Inconsistent(format!("{} was not enumerated for export", r))
                    })?;
                    self.u8(TAG_LOCAL);
                    self.fixups.push((self.body.len(), ordinal));
                    self.u32(0);
                }
            }
        }
        Ok(())
    }

    pub fn link(&mut self, link: &Link) -> Result<(), HeapError> {
        self.reference(link.get())
    }

    /// Write a counted sequence of reference slots
    pub fn references(&mut self, slots: &[Option<ObjRef>]) -> Result<(), HeapError> {
        self.len(slots.len())?;
        for slot in slots {
            self.reference(*slot)?;
        }
        Ok(())
    }

    /// Replace ordinals by body offsets
    fn patch(&mut self, offsets: &[u32]) -> Result<(), HeapError> {
        for (position, ordinal) in &self.fixups {
            let offset = offsets
                .get(*ordinal as usize)
                .ok_or_else(|| malformed("fixup beyond object table"))?;
            self.body[*position..*position + 4].copy_from_slice(&offset.to_le_bytes());
        }
        Ok(())
    }

    /// Encode a root reference once offsets are known
    fn root(&mut self, r: ObjRef, offsets: &[u32], out: &mut Vec<u8>) -> Result<(), HeapError> {
        if let Some(key) = self.heap.shared_key(r) {
            out.push(TAG_EXTERN);
            out.extend_from_slice(&self.extern_index(key)?.to_le_bytes());
        } else {
            let offset = self
                .ordinals
                .get(&r)
                .and_then(|ordinal| offsets.get(*ordinal as usize))
                .ok_or_else(|| HeapError::Inconsistent(format!("root {} not exported", r)))?;
            out.push(TAG_LOCAL);
            out.extend_from_slice(&offset.to_le_bytes());
        }
        Ok(())
    }
}

pub struct EnvelopeReader<'a> {
    body: &'a [u8],
    pos: usize,
    locals: HashMap<u32, ObjRef>,
    externs: Vec<ObjRef>,
}

impl<'a> EnvelopeReader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], HeapError> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|end| *end <= self.body.len())
            .ok_or_else(|| malformed("unexpected end of body"))?;
        let bytes = &self.body[self.pos..end];
        self.pos = end;
        Ok(bytes)
    }

    pub fn u8(&mut self) -> Result<u8, HeapError> {
        Ok(self.take(1)?[0])
    }

    pub fn bool(&mut self) -> Result<bool, HeapError> {
        match self.u8()? {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(malformed(format!("invalid boolean {}", b))),
        }
    }

    pub fn u32(&mut self) -> Result<u32, HeapError> {
        read_u32(self.take(4)?)
    }

    pub fn len(&mut self) -> Result<usize, HeapError> {
        Ok(self.u32()? as usize)
    }

    pub fn str(&mut self) -> Result<String, HeapError> {
        let len = self.len()?;
        let bytes = self.take(len)?;
        String::from_utf8(bytes.to_vec()).map_err(|_| malformed("invalid utf-8 string"))
    }

    pub fn names(&mut self) -> Result<Vec<String>, HeapError> {
        let count = self.len()?;
        (0..count).map(|_| self.str()).collect()
    }

    pub fn smid(&mut self) -> Result<Smid, HeapError> {
        Ok(Smid::from(self.u32()?))
    }

    pub fn reference(&mut self) -> Result<Option<ObjRef>, HeapError> {
        let tag = self.u8()?;
        let operand = self.u32()?;
        decode_ref(tag, operand, &self.locals, &self.externs)
    }

    /// Read a reference that must not be null
    pub fn required(&mut self) -> Result<ObjRef, HeapError> {
        self.reference()?
            .ok_or_else(|| malformed("null in required reference slot"))
    }

    pub fn link(&mut self) -> Result<Link, HeapError> {
        Ok(Link::new(self.reference()?))
    }

    pub fn references(&mut self) -> Result<Vec<Option<ObjRef>>, HeapError> {
        let count = self.len()?;
        (0..count).map(|_| self.reference()).collect()
    }
}

fn read_u32(bytes: &[u8]) -> Result<u32, HeapError> {
    <[u8; 4]>::try_from(bytes)
        .map(u32::from_le_bytes)
        .map_err(|_| malformed("truncated integer"))
}

fn decode_ref(
    tag: u8,
    operand: u32,
    locals: &HashMap<u32, ObjRef>,
    externs: &[ObjRef],
) -> Result<Option<ObjRef>, HeapError> {
    match tag {
        TAG_NULL => Ok(None),
        TAG_LOCAL => locals
            .get(&operand)
            .copied()
            .map(Some)
            .ok_or_else(|| malformed(format!("no object at body offset {}", operand))),
        TAG_EXTERN => externs
            .get(operand as usize)
            .copied()
            .map(Some)
            .ok_or_else(|| malformed(format!("no extern key {}", operand))),
        _ => Err(malformed(format!("invalid reference tag {}", tag))),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub root_count: usize,
    pub object_count: usize,
    pub body_len: usize,
    pub extern_count: usize,
}

impl EnvelopeHeader {
    fn offsets_start(&self) -> usize {
        HEADER_LEN
    }

    fn roots_start(&self) -> usize {
        self.offsets_start() + 4 * self.object_count
    }

    fn body_start(&self) -> usize {
        self.roots_start() + REF_LEN * self.root_count
    }

    fn externs_start(&self) -> usize {
        self.body_start() + self.body_len
    }
}

/// A flattened subgraph
#[derive(Clone, PartialEq, Eq)]
pub struct Envelope {
    bytes: Vec<u8>,
    header: EnvelopeHeader,
}

impl std::fmt::Debug for Envelope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Envelope({:?}, {} bytes)", self.header, self.bytes.len())
    }
}

impl Envelope {
    /// Copy everything reachable from roots into an envelope
    pub fn flatten(heap: &Heap, roots: &[ObjRef]) -> Result<Envelope, HeapError> {
        let mut exporter = Exporter { heap, order: vec![] };
        walk(heap, roots, &mut exporter)?;
        let order = exporter.order;

        let mut writer = EnvelopeWriter::new(heap, &order);
        let mut offsets = Vec::with_capacity(order.len());

        for r in &order {
            let cell = heap.get(*r)?;
            offsets.push(to_u32(writer.body.len())?);
            writer.written.clear();
            writer.u8(if cell.header().is_frozen() {
                FLAG_FROZEN
            } else {
                0
            });
            cell.body().flatten(&mut writer)?;

            #[cfg(debug_assertions)]
            debug_assert_eq!(
                writer.written,
                edges_of(cell.body()),
                "encoding of {} disagrees with its traced edges",
                cell.body().kind_name()
            );
        }

        writer.patch(&offsets)?;

        let mut root_table = Vec::with_capacity(REF_LEN * roots.len());
        for r in roots {
            writer.root(*r, &offsets, &mut root_table)?;
        }

        let header = EnvelopeHeader {
            root_count: roots.len(),
            object_count: order.len(),
            body_len: writer.body.len(),
            extern_count: writer.externs.len(),
        };

        let mut bytes = Vec::with_capacity(header.externs_start());
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(&VERSION.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        for n in [
            header.root_count,
            header.object_count,
            header.body_len,
            header.extern_count,
        ] {
            bytes.extend_from_slice(&to_u32(n)?.to_le_bytes());
        }
        for offset in &offsets {
            bytes.extend_from_slice(&offset.to_le_bytes());
        }
        bytes.extend_from_slice(&root_table);
        bytes.extend_from_slice(&writer.body);
        for key in &writer.externs {
            let (kind, text) = match key {
                SharedKey::Literal(text) => (KEY_LITERAL, text),
                SharedKey::Singleton(name) => (KEY_SINGLETON, name),
            };
            bytes.push(kind);
            bytes.extend_from_slice(&to_u32(text.len())?.to_le_bytes());
            bytes.extend_from_slice(text.as_bytes());
        }

        debug!(
            "flattened {} objects ({} body bytes, {} externs)",
            header.object_count, header.body_len, header.extern_count
        );

        Ok(Envelope { bytes, header })
    }

    /// Validate and wrap envelope bytes
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Envelope, HeapError> {
        if bytes.len() < HEADER_LEN || &bytes[0..4] != MAGIC {
            return Err(malformed("not an envelope"));
        }
        let version = u16::from_le_bytes([bytes[4], bytes[5]]);
        if version != VERSION {
            return Err(malformed(format!("unsupported version {}", version)));
        }
        let field = |n: usize| read_u32(&bytes[8 + 4 * n..12 + 4 * n]).map(|v| v as usize);
        let header = EnvelopeHeader {
            root_count: field(0)?,
            object_count: field(1)?,
            body_len: field(2)?,
            extern_count: field(3)?,
        };
        if bytes.len() < header.externs_start() {
            return Err(malformed("envelope shorter than its header declares"));
        }
        Ok(Envelope { bytes, header })
    }

    pub fn header(&self) -> EnvelopeHeader {
        self.header
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn body(&self) -> &[u8] {
        &self.bytes[self.header.body_start()..self.header.externs_start()]
    }

    pub fn hex_dump(&self) -> String {
        pretty_hex(&self.bytes)
    }

    fn extern_keys(&self) -> Result<Vec<SharedKey>, HeapError> {
        let mut reader = EnvelopeReader {
            body: &self.bytes[self.header.externs_start()..],
            pos: 0,
            locals: HashMap::new(),
            externs: vec![],
        };
        (0..self.header.extern_count)
            .map(|_| {
                let kind = reader.u8()?;
                let text = reader.str()?;
                match kind {
                    KEY_LITERAL => Ok(SharedKey::Literal(text)),
                    KEY_SINGLETON => Ok(SharedKey::Singleton(text)),
                    k => Err(malformed(format!("invalid extern kind {}", k))),
                }
            })
            .collect()
    }

    /// Rebuild the subgraph in `heap`, returning the new roots
    ///
    /// Every object slot is reserved first so that a single pass over
    /// the body can resolve forward references and cycles.
    pub fn restore(&self, heap: &Heap) -> Result<Vec<ObjRef>, HeapError> {
        let header = self.header;

        let externs = self
            .extern_keys()?
            .iter()
            .map(|key| heap.resolve_shared(key))
            .collect::<Result<Vec<_>, _>>()?;

        let offsets = self.bytes[header.offsets_start()..header.roots_start()]
            .chunks(4)
            .map(read_u32)
            .collect::<Result<Vec<_>, _>>()?;

        let slots = (0..header.object_count)
            .map(|_| heap.reserve())
            .collect::<Result<Vec<_>, _>>()?;

        let locals: HashMap<u32, ObjRef> = offsets.iter().copied().zip(slots.iter().copied()).collect();

        let mut reader = EnvelopeReader {
            body: self.body(),
            pos: 0,
            locals,
            externs,
        };

        for (offset, slot) in offsets.iter().zip(slots.iter()) {
            if reader.pos != *offset as usize {
                return Err(malformed(format!(
                    "object at {} found where offset table expects {}",
                    reader.pos, offset
                )));
            }
            let flags = reader.u8()?;
            let body = HeapObject::restore(&mut reader)?;
            let cell = heap.fill(*slot, body)?;
            if flags & FLAG_FROZEN != 0 {
                cell.header().freeze();
            }
        }

        if reader.pos != header.body_len {
            return Err(malformed("trailing bytes in body"));
        }

        let roots = self.bytes[header.roots_start()..header.body_start()]
            .chunks(REF_LEN)
            .map(|chunk| {
                decode_ref(chunk[0], read_u32(&chunk[1..])?, &reader.locals, &reader.externs)?
                    .ok_or_else(|| malformed("null root"))
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!("restored {} objects", header.object_count);
        Ok(roots)
    }
}

const KIND_STRING: u8 = 1;
const KIND_INSTRUCTION: u8 = 2;
const KIND_EXPRESSION: u8 = 3;
const KIND_CLASS: u8 = 4;
const KIND_INSTANCE: u8 = 5;
const KIND_METHOD: u8 = 6;
const KIND_ROUTINE: u8 = 7;
const KIND_PACKAGE: u8 = 8;

impl Flatten for HeapString {
    fn flatten(&self, out: &mut EnvelopeWriter) -> Result<(), HeapError> {
        out.str(self.as_str())
    }

    fn restore(input: &mut EnvelopeReader) -> Result<Self, HeapError> {
        Ok(HeapString::from(input.str()?))
    }
}

impl Flatten for HeapObject {
    fn flatten(&self, out: &mut EnvelopeWriter) -> Result<(), HeapError> {
        match self {
            HeapObject::Reserved => {
                return Err(HeapError::Inconsistent(
                    "reserved slot reachable during flatten".to_string(),
                ))
            }
            HeapObject::Str(s) => {
                out.u8(KIND_STRING);
                s.flatten(out)
            }
            HeapObject::Instruction(i) => {
                out.u8(KIND_INSTRUCTION);
                i.flatten(out)
            }
            HeapObject::Expression(e) => {
                out.u8(KIND_EXPRESSION);
                e.flatten(out)
            }
            HeapObject::Class(c) => {
                out.u8(KIND_CLASS);
                c.flatten(out)
            }
            HeapObject::Instance(i) => {
                out.u8(KIND_INSTANCE);
                i.flatten(out)
            }
            HeapObject::Method(m) => {
                out.u8(KIND_METHOD);
                m.flatten(out)
            }
            HeapObject::Routine(r) => {
                out.u8(KIND_ROUTINE);
                r.flatten(out)
            }
            HeapObject::Package(p) => {
                out.u8(KIND_PACKAGE);
                p.flatten(out)
            }
        }
    }

    fn restore(input: &mut EnvelopeReader) -> Result<Self, HeapError> {
        Ok(match input.u8()? {
            KIND_STRING => HeapObject::Str(Flatten::restore(input)?),
            KIND_INSTRUCTION => HeapObject::Instruction(Flatten::restore(input)?),
            KIND_EXPRESSION => HeapObject::Expression(Flatten::restore(input)?),
            KIND_CLASS => HeapObject::Class(Flatten::restore(input)?),
            KIND_INSTANCE => HeapObject::Instance(Flatten::restore(input)?),
            KIND_METHOD => HeapObject::Method(Flatten::restore(input)?),
            KIND_ROUTINE => HeapObject::Routine(Flatten::restore(input)?),
            KIND_PACKAGE => HeapObject::Package(Flatten::restore(input)?),
            k => return Err(malformed(format!("invalid object kind {}", k))),
        })
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::common::sourcemap::SourceMap;
    use crate::eval::{
        code::instruction::{Instruction, InstructionKind},
        emit::{lines, CapturingEmitter},
        machine::vm::{Machine, MachineSettings},
        memory::walk::census,
    };
    use crate::syntax::parse_package;

    fn say(heap: &Heap, value: Option<ObjRef>) -> ObjRef {
        heap.alloc(HeapObject::Instruction(Instruction::new(
            Smid::from(7),
            InstructionKind::Say { value },
        )))
        .unwrap()
    }

    /// a -> b -> c -> a with b holding a shared literal and c an
    /// omitted value
    fn cyclic(heap: &Heap) -> ObjRef {
        let literal = heap.intern("hello").unwrap();
        let local = heap.string("local").unwrap();
        let a = say(heap, Some(local));
        let b = say(heap, Some(literal));
        let c = say(heap, None);
        let next = |from: ObjRef, to: ObjRef| heap.get(from).unwrap().instruction().unwrap().chain(to);
        assert!(next(a, b) && next(b, c) && next(c, a));
        heap.get(b).unwrap().header().freeze();
        a
    }

    #[test]
    pub fn test_round_trip_is_byte_identical() {
        let source = Heap::new();
        let root = cyclic(&source);
        let first = Envelope::flatten(&source, &[root]).unwrap();
        assert_eq!(first.header().object_count, 4);
        assert_eq!(first.header().extern_count, 1);

        let target = Heap::new();
        let roots = first.restore(&target).unwrap();
        let second = Envelope::flatten(&target, &roots).unwrap();
        assert_eq!(first.body(), second.body());
        assert_eq!(first.as_bytes(), second.as_bytes());
    }

    #[test]
    pub fn test_restore_preserves_cycles_and_flags() {
        let source = Heap::new();
        let root = cyclic(&source);
        let envelope = Envelope::flatten(&source, &[root]).unwrap();

        let target = Heap::new();
        let roots = envelope.restore(&target).unwrap();
        let a = roots[0];
        let b = target.get(a).unwrap().instruction().unwrap().next().unwrap();
        let c = target.get(b).unwrap().instruction().unwrap().next().unwrap();
        assert_eq!(target.get(c).unwrap().instruction().unwrap().next(), Some(a));
        assert!(target.get(b).unwrap().header().is_frozen());
        assert!(!target.get(a).unwrap().header().is_frozen());

        match target.get(b).unwrap().instruction().unwrap().kind() {
            InstructionKind::Say { value: Some(v) } => {
                assert_eq!(*v, target.intern("hello").unwrap())
            }
            other => panic!("unexpected {:?}", other),
        }
        match target.get(c).unwrap().instruction().unwrap().kind() {
            InstructionKind::Say { value } => assert_eq!(*value, None),
            other => panic!("unexpected {:?}", other),
        }

        let before = census(&source, &[root]).unwrap();
        let after = census(&target, &roots).unwrap();
        assert_eq!(before.objects, after.objects);
    }

    const STRUCTURED: &str = "\
x = 3
if x > 2 then say 'big'
else say 'small'
select
  when x = 1 then say 'one'
  otherwise
    do
      say twice(x)
    end
end
exit
::routine twice
  use arg n
  return n * 2
";

    fn machine() -> Machine<'static> {
        Machine::new(Box::new(CapturingEmitter::default()), MachineSettings::default()).unwrap()
    }

    #[test]
    pub fn test_parsed_package_survives_round_trip() {
        let mut source = machine();
        let mut map = SourceMap::new();
        let package = parse_package(source.heap(), &mut map, 0, STRUCTURED, "test").unwrap();
        source.run_package(package, &[]).unwrap();
        assert_eq!(lines(source.captures()), vec!["big", "6"]);
        assert_eq!(source.metrics().resolution_searches(), 1);

        let first = Envelope::flatten(source.heap(), &[package]).unwrap();

        let mut target = machine();
        let roots = first.restore(target.heap()).unwrap();
        let second = Envelope::flatten(target.heap(), &roots).unwrap();
        assert_eq!(first.as_bytes(), second.as_bytes());

        let before = census(source.heap(), &[package]).unwrap();
        let after = census(target.heap(), &roots).unwrap();
        assert_eq!(before.objects, after.objects);
        assert_eq!(before.bytes, after.bytes);
        assert_eq!(before.visits, after.visits);

        // block links arrive back-patched and the call site arrives
        // already resolved
        target.run_package(roots[0], &[]).unwrap();
        assert_eq!(lines(target.captures()), vec!["big", "6"]);
        assert_eq!(target.metrics().resolution_searches(), 0);
    }

    #[test]
    pub fn test_shared_root_is_external() {
        let heap = Heap::new();
        let literal = heap.intern("x").unwrap();
        let envelope = Envelope::flatten(&heap, &[literal]).unwrap();
        assert_eq!(envelope.header().object_count, 0);
        assert_eq!(envelope.restore(&heap).unwrap(), vec![literal]);
    }

    #[test]
    pub fn test_unknown_singleton_fails_restore() {
        let source = Heap::new();
        let nil = source.string("nil").unwrap();
        source.register_singleton("NIL", nil).unwrap();
        let root = say(&source, Some(nil));
        let envelope = Envelope::flatten(&source, &[root]).unwrap();
        assert!(matches!(
            envelope.restore(&Heap::new()),
            Err(HeapError::UnknownShared(_))
        ));
    }

    #[test]
    pub fn test_rejects_bad_magic_and_truncation() {
        assert!(Envelope::from_bytes(b"nope".to_vec()).is_err());

        let heap = Heap::new();
        let root = say(&heap, None);
        let bytes = Envelope::flatten(&heap, &[root]).unwrap().into_bytes();
        assert!(Envelope::from_bytes(bytes.clone()).is_ok());
        assert!(Envelope::from_bytes(bytes[..bytes.len() - 1].to_vec()).is_err());
    }

    #[test]
    pub fn test_hex_dump_starts_with_magic() {
        let heap = Heap::new();
        let root = say(&heap, None);
        let dump = Envelope::flatten(&heap, &[root]).unwrap().hex_dump();
        assert!(dump.contains("4f 52 58 45"));
    }
}
