//! Packages and routines
//!
//! A package is the unit a program file compiles to: its main code,
//! the `::ROUTINE`s and the `::CLASS`es it defines. Routines and
//! methods point back at their package through a link set when the
//! package itself is allocated.

use indexmap::IndexMap;

use crate::{
    common::sourcemap::Smid,
    eval::{
        machine::classes::{ClassObject, Method, MethodKind},
        memory::{
            envelope::{EnvelopeReader, EnvelopeWriter, Flatten},
            heap::{Heap, HeapError},
            object::{EdgeSink, HeapObject, Link, ObjRef, Trace},
        },
    },
};

use super::builder::{BuildError, CodeBlock};

#[derive(Debug)]
pub enum RoutineBody {
    Code { entry: Option<ObjRef>, package: Link },
    /// Implemented by the host and found by name in the machine's
    /// library
    Host,
}

#[derive(Debug)]
pub struct Routine {
    name: String,
    public: bool,
    body: RoutineBody,
}

impl Routine {
    pub fn code(name: &str, public: bool, entry: Option<ObjRef>) -> Self {
        Routine {
            name: name.to_uppercase(),
            public,
            body: RoutineBody::Code {
                entry,
                package: Link::default(),
            },
        }
    }

    pub fn host(name: &str) -> Self {
        Routine {
            name: name.to_uppercase(),
            public: true,
            body: RoutineBody::Host,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn body(&self) -> &RoutineBody {
        &self.body
    }

    pub fn attach(&self, package: ObjRef) -> bool {
        match &self.body {
            RoutineBody::Code { package: link, .. } => link.set(package),
            RoutineBody::Host => false,
        }
    }
}

impl Trace for Routine {
    fn trace(&self, edges: &mut dyn EdgeSink) {
        if let RoutineBody::Code { entry, package } = &self.body {
            edges.edge(*entry);
            package.trace(edges);
        }
    }
}

impl Flatten for Routine {
    fn flatten(&self, out: &mut EnvelopeWriter) -> Result<(), HeapError> {
        out.str(&self.name)?;
        out.bool(self.public);
        match &self.body {
            RoutineBody::Code { entry, package } => {
                out.u8(0);
                out.reference(*entry)?;
                out.link(package)
            }
            RoutineBody::Host => {
                out.u8(1);
                Ok(())
            }
        }
    }

    fn restore(input: &mut EnvelopeReader) -> Result<Self, HeapError> {
        let name = input.str()?;
        let public = input.bool()?;
        let body = match input.u8()? {
            0 => RoutineBody::Code {
                entry: input.reference()?,
                package: input.link()?,
            },
            1 => RoutineBody::Host,
            k => {
                return Err(HeapError::MalformedEnvelope(format!(
                    "invalid routine body {}",
                    k
                )))
            }
        };
        Ok(Routine { name, public, body })
    }
}

#[derive(Debug)]
pub struct Package {
    name: String,
    main: Option<ObjRef>,
    routines: Box<[ObjRef]>,
    classes: Box<[ObjRef]>,
}

impl Package {
    pub fn new(
        name: &str,
        main: Option<ObjRef>,
        routines: Vec<ObjRef>,
        classes: Vec<ObjRef>,
    ) -> Self {
        Package {
            name: name.to_string(),
            main,
            routines: routines.into_boxed_slice(),
            classes: classes.into_boxed_slice(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Entry instruction of the main code
    pub fn main(&self) -> Option<ObjRef> {
        self.main
    }

    pub fn routines(&self) -> &[ObjRef] {
        &self.routines
    }

    pub fn classes(&self) -> &[ObjRef] {
        &self.classes
    }

    pub fn slot_count(&self) -> usize {
        1 + self.routines.len() + self.classes.len()
    }
}

impl Trace for Package {
    fn trace(&self, edges: &mut dyn EdgeSink) {
        edges.edge(self.main);
        self.routines.trace(edges);
        self.classes.trace(edges);
    }
}

impl Flatten for Package {
    fn flatten(&self, out: &mut EnvelopeWriter) -> Result<(), HeapError> {
        out.str(&self.name)?;
        out.reference(self.main)?;
        out.len(self.routines.len())?;
        for r in self.routines.iter() {
            out.reference(Some(*r))?;
        }
        out.len(self.classes.len())?;
        for c in self.classes.iter() {
            out.reference(Some(*c))?;
        }
        Ok(())
    }

    fn restore(input: &mut EnvelopeReader) -> Result<Self, HeapError> {
        let name = input.str()?;
        let main = input.reference()?;
        let routines = (0..input.len()?)
            .map(|_| input.required())
            .collect::<Result<Vec<_>, _>>()?;
        let classes = (0..input.len()?)
            .map(|_| input.required())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Package::new(&name, main, routines, classes))
    }
}

struct PendingClass {
    class: ObjRef,
    superclass: Option<String>,
    smid: Smid,
}

/// Assembles the sections of one source file into a package
pub struct PackageBuilder<'guard> {
    heap: &'guard Heap,
    name: String,
    main: Option<ObjRef>,
    routines: IndexMap<String, ObjRef>,
    classes: IndexMap<String, PendingClass>,
    owners: Vec<ObjRef>,
}

impl<'guard> PackageBuilder<'guard> {
    pub fn new(heap: &'guard Heap, name: &str) -> Self {
        PackageBuilder {
            heap,
            name: name.to_string(),
            main: None,
            routines: IndexMap::new(),
            classes: IndexMap::new(),
            owners: vec![],
        }
    }

    pub fn main(&mut self, block: CodeBlock) {
        self.main = block.entry;
    }

    /// Add a routine; the first definition of a name wins
    pub fn routine(
        &mut self,
        name: &str,
        public: bool,
        block: CodeBlock,
    ) -> Result<ObjRef, BuildError> {
        let r = self
            .heap
            .alloc(HeapObject::Routine(Routine::code(name, public, block.entry)))?;
        self.owners.push(r);
        self.routines.entry(name.to_uppercase()).or_insert(r);
        Ok(r)
    }

    /// Begin a class, naming its superclass which is resolved when the
    /// package is finished
    pub fn class(
        &mut self,
        smid: Smid,
        name: &str,
        superclass: Option<&str>,
    ) -> Result<ObjRef, BuildError> {
        let key = name.to_uppercase();
        if self.classes.contains_key(&key) {
            return Err(BuildError::DuplicateClass(smid, key));
        }
        let class = self
            .heap
            .alloc(HeapObject::Class(ClassObject::new(&key, None)))?;
        self.classes.insert(
            key,
            PendingClass {
                class,
                superclass: superclass.map(str::to_uppercase),
                smid,
            },
        );
        Ok(class)
    }

    fn define(&mut self, class: ObjRef, message: &str, kind: MethodKind) -> Result<ObjRef, BuildError> {
        let message = message.to_uppercase();
        let method = self.heap.alloc(HeapObject::Method(Method::new(
            message.clone(),
            Some(class),
            kind,
        )))?;
        self.heap.get(class)?.class()?.define(&message, method);
        Ok(method)
    }

    pub fn method(
        &mut self,
        class: ObjRef,
        name: &str,
        block: CodeBlock,
    ) -> Result<ObjRef, BuildError> {
        let method = self.define(
            class,
            name,
            MethodKind::Code {
                entry: block.entry,
                package: Link::default(),
            },
        )?;
        self.owners.push(method);
        Ok(method)
    }

    /// Define the getter `NAME` and setter `NAME=` of an attribute
    pub fn attribute(&mut self, class: ObjRef, name: &str) -> Result<(), BuildError> {
        let variable = name.to_uppercase();
        self.define(class, &variable, MethodKind::Getter(variable.clone()))?;
        self.define(
            class,
            &format!("{}=", variable),
            MethodKind::Setter(variable.clone()),
        )?;
        Ok(())
    }

    fn resolve_superclass(&self, pending: &PendingClass) -> Result<ObjRef, BuildError> {
        let name = pending
            .superclass
            .as_deref()
            .unwrap_or(crate::eval::machine::classes::OBJECT_CLASS);
        if let Some(local) = self.classes.get(name) {
            return Ok(local.class);
        }
        match self.heap.singleton(name) {
            Some(r) if self.heap.get(r)?.class().is_ok() => Ok(r),
            _ => Err(BuildError::UnknownClass(pending.smid, name.to_string())),
        }
    }

    /// Allocate the package and attach every routine and method to it
    pub fn finish(self) -> Result<ObjRef, BuildError> {
        for pending in self.classes.values() {
            let superclass = self.resolve_superclass(pending)?;
            if superclass == pending.class {
                return Err(BuildError::UnknownClass(
                    pending.smid,
                    self.heap.get(superclass)?.class()?.name().to_string(),
                ));
            }
            self.heap.get(pending.class)?.class()?.set_superclass(superclass);
        }

        let package = self.heap.alloc(HeapObject::Package(Package::new(
            &self.name,
            self.main,
            self.routines.values().copied().collect(),
            self.classes.values().map(|c| c.class).collect(),
        )))?;

        for owner in &self.owners {
            let cell = self.heap.get(*owner)?;
            match cell.body() {
                HeapObject::Routine(r) => {
                    r.attach(package);
                }
                HeapObject::Method(m) => {
                    m.attach(package);
                }
                _ => {}
            }
        }
        self.heap.get(package)?.header().freeze();
        Ok(package)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::eval::{
        machine::classes::Bootstrap,
        memory::{
            mutator::{Mutator, MutatorHeapView},
            object::edges_of,
        },
    };
    use indexmap::IndexMap;

    fn empty() -> CodeBlock {
        CodeBlock {
            entry: None,
            labels: IndexMap::new(),
            instructions: 0,
        }
    }

    #[test]
    pub fn test_routines_attach_to_package() {
        let heap = Heap::new();
        let mut builder = PackageBuilder::new(&heap, "test");
        let r = builder.routine("double", true, empty()).unwrap();
        let package = builder.finish().unwrap();

        let cell = heap.get(r).unwrap();
        let routine = cell.routine().unwrap();
        assert_eq!(routine.name(), "DOUBLE");
        assert_eq!(edges_of(routine), vec![None, Some(package)]);
        assert_eq!(heap.get(package).unwrap().package().unwrap().routines(), &[r]);
    }

    #[test]
    pub fn test_superclass_resolved_late() {
        let heap = Heap::new();
        let known = Bootstrap.run(&MutatorHeapView::new(&heap), ()).unwrap();
        let mut builder = PackageBuilder::new(&heap, "test");
        let child = builder.class(Smid::default(), "child", Some("parent")).unwrap();
        let parent = builder.class(Smid::default(), "parent", None).unwrap();
        builder.attribute(parent, "size").unwrap();
        builder.finish().unwrap();

        let superclass = |c: ObjRef| heap.get(c).unwrap().class().unwrap().superclass();
        assert_eq!(superclass(child), Some(parent));
        assert_eq!(superclass(parent), Some(known.object));
        let cell = heap.get(parent).unwrap();
        assert_eq!(
            cell.class().unwrap().method_names(),
            vec!["SIZE".to_string(), "SIZE=".to_string()]
        );
    }

    #[test]
    pub fn test_unknown_superclass() {
        let heap = Heap::new();
        Bootstrap.run(&MutatorHeapView::new(&heap), ()).unwrap();
        let mut builder = PackageBuilder::new(&heap, "test");
        builder.class(Smid::default(), "orphan", Some("missing")).unwrap();
        assert!(matches!(
            builder.finish(),
            Err(BuildError::UnknownClass(_, name)) if name == "MISSING"
        ));
    }
}
