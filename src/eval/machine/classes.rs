//! Runtime object model: classes, instances and methods
//!
//! Builtin classes are created once per heap by [`Bootstrap`] and
//! registered as shared singletons so that envelopes refer to them
//! by name rather than copying them.

use std::cell::RefCell;

use indexmap::IndexMap;

use crate::eval::{
    error::ExecutionError,
    memory::{
        envelope::{EnvelopeReader, EnvelopeWriter, Flatten},
        heap::{Heap, HeapError},
        mutator::{Mutator, MutatorHeapView},
        object::{EdgeSink, HeapObject, Link, ObjRef, Trace},
    },
};

/// Methods implemented by the machine itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeMethod {
    ObjectClass,
    ObjectString,
    ObjectIdentical,
    ObjectStrictIdentical,
    ObjectName,
    ObjectIsA,
    StringLength,
    StringReverse,
    StringUpper,
    StringLower,
    StringWords,
    StringSubstr,
    StringConcat,
    ClassNew,
    ClassName,
    ClassSuperclass,
    ClassId,
}

impl NativeMethod {
    pub const ALL: [NativeMethod; 17] = [
        NativeMethod::ObjectClass,
        NativeMethod::ObjectString,
        NativeMethod::ObjectIdentical,
        NativeMethod::ObjectStrictIdentical,
        NativeMethod::ObjectName,
        NativeMethod::ObjectIsA,
        NativeMethod::StringLength,
        NativeMethod::StringReverse,
        NativeMethod::StringUpper,
        NativeMethod::StringLower,
        NativeMethod::StringWords,
        NativeMethod::StringSubstr,
        NativeMethod::StringConcat,
        NativeMethod::ClassNew,
        NativeMethod::ClassName,
        NativeMethod::ClassSuperclass,
        NativeMethod::ClassId,
    ];

    /// The message name the method is installed under
    pub fn message(self) -> &'static str {
        match self {
            NativeMethod::ObjectClass => "CLASS",
            NativeMethod::ObjectString => "STRING",
            NativeMethod::ObjectIdentical => "=",
            NativeMethod::ObjectStrictIdentical => "==",
            NativeMethod::ObjectName => "OBJECTNAME",
            NativeMethod::ObjectIsA => "ISA",
            NativeMethod::StringLength => "LENGTH",
            NativeMethod::StringReverse => "REVERSE",
            NativeMethod::StringUpper => "UPPER",
            NativeMethod::StringLower => "LOWER",
            NativeMethod::StringWords => "WORDS",
            NativeMethod::StringSubstr => "SUBSTR",
            NativeMethod::StringConcat => "||",
            NativeMethod::ClassNew => "NEW",
            NativeMethod::ClassName => "NAME",
            NativeMethod::ClassSuperclass => "SUPERCLASS",
            NativeMethod::ClassId => "ID",
        }
    }

    /// Name of the builtin class that defines this method
    pub fn owner(self) -> &'static str {
        use NativeMethod::*;
        match self {
            ObjectClass | ObjectString | ObjectIdentical | ObjectStrictIdentical | ObjectName
            | ObjectIsA => OBJECT_CLASS,
            StringLength | StringReverse | StringUpper | StringLower | StringWords
            | StringSubstr | StringConcat => STRING_CLASS,
            ClassNew | ClassName | ClassSuperclass | ClassId => CLASS_CLASS,
        }
    }

    fn code(self) -> u8 {
        // ALL is in declaration order
        self as u8
    }

    fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }
}

pub const OBJECT_CLASS: &str = "OBJECT";
pub const CLASS_CLASS: &str = "CLASS";
pub const STRING_CLASS: &str = "STRING";
pub const NIL: &str = "NIL";
pub const TRUE: &str = "TRUE";
pub const FALSE: &str = "FALSE";

#[derive(Debug)]
pub enum MethodKind {
    Native(NativeMethod),
    /// Source-defined method body
    Code {
        entry: Option<ObjRef>,
        package: Link,
    },
    /// `::ATTRIBUTE` getter of the named object variable
    Getter(String),
    /// `::ATTRIBUTE` setter (`NAME=`)
    Setter(String),
}

#[derive(Debug)]
pub struct Method {
    name: String,
    /// The class defining the method
    scope: Link,
    kind: MethodKind,
}

impl Method {
    pub fn new(name: String, scope: Option<ObjRef>, kind: MethodKind) -> Self {
        Method {
            name,
            scope: Link::new(scope),
            kind,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn scope(&self) -> Option<ObjRef> {
        self.scope.get()
    }

    pub fn kind(&self) -> &MethodKind {
        &self.kind
    }

    /// Record the package of a source-defined method
    pub fn attach(&self, package: ObjRef) -> bool {
        match &self.kind {
            MethodKind::Code { package: link, .. } => link.set(package),
            _ => false,
        }
    }
}

impl Trace for Method {
    fn trace(&self, edges: &mut dyn EdgeSink) {
        self.scope.trace(edges);
        if let MethodKind::Code { entry, package } = &self.kind {
            edges.edge(*entry);
            package.trace(edges);
        }
    }
}

impl Flatten for Method {
    fn flatten(&self, out: &mut EnvelopeWriter) -> Result<(), HeapError> {
        out.str(&self.name)?;
        out.link(&self.scope)?;
        match &self.kind {
            MethodKind::Native(native) => {
                out.u8(0);
                out.u8(native.code());
            }
            MethodKind::Code { entry, package } => {
                out.u8(1);
                out.reference(*entry)?;
                out.link(package)?;
            }
            MethodKind::Getter(name) => {
                out.u8(2);
                out.str(name)?;
            }
            MethodKind::Setter(name) => {
                out.u8(3);
                out.str(name)?;
            }
        }
        Ok(())
    }

    fn restore(input: &mut EnvelopeReader) -> Result<Self, HeapError> {
        let name = input.str()?;
        let scope = input.link()?;
        let kind = match input.u8()? {
            0 => {
                let code = input.u8()?;
                MethodKind::Native(NativeMethod::from_code(code).ok_or_else(|| {
                    HeapError::MalformedEnvelope(format!("invalid native method {}", code))
                })?)
            }
            1 => MethodKind::Code {
                entry: input.reference()?,
                package: input.link()?,
            },
            2 => MethodKind::Getter(input.str()?),
            3 => MethodKind::Setter(input.str()?),
            k => {
                return Err(HeapError::MalformedEnvelope(format!(
                    "invalid method kind {}",
                    k
                )))
            }
        };
        Ok(Method { name, scope, kind })
    }
}

/// A class object with its method table
#[derive(Debug)]
pub struct ClassObject {
    name: String,
    superclass: Link,
    methods: RefCell<IndexMap<String, ObjRef>>,
}

impl ClassObject {
    pub fn new(name: &str, superclass: Option<ObjRef>) -> Self {
        ClassObject {
            name: name.to_uppercase(),
            superclass: Link::new(superclass),
            methods: RefCell::new(IndexMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn superclass(&self) -> Option<ObjRef> {
        self.superclass.get()
    }

    /// Source classes name their superclass before it may exist
    pub fn set_superclass(&self, superclass: ObjRef) -> bool {
        self.superclass.set(superclass)
    }

    /// Install a method; later definitions replace earlier ones
    pub fn define(&self, message: &str, method: ObjRef) {
        self.methods.borrow_mut().insert(message.to_uppercase(), method);
    }

    /// Look up a method defined directly by this class
    pub fn method(&self, message: &str) -> Option<ObjRef> {
        self.methods.borrow().get(message).copied()
    }

    pub fn method_names(&self) -> Vec<String> {
        self.methods.borrow().keys().cloned().collect()
    }
}

impl Trace for ClassObject {
    fn trace(&self, edges: &mut dyn EdgeSink) {
        self.superclass.trace(edges);
        for method in self.methods.borrow().values() {
            edges.edge(Some(*method));
        }
    }
}

impl Flatten for ClassObject {
    fn flatten(&self, out: &mut EnvelopeWriter) -> Result<(), HeapError> {
        out.str(&self.name)?;
        out.link(&self.superclass)?;
        let methods = self.methods.borrow();
        out.len(methods.len())?;
        for (message, method) in methods.iter() {
            out.str(message)?;
            out.reference(Some(*method))?;
        }
        Ok(())
    }

    fn restore(input: &mut EnvelopeReader) -> Result<Self, HeapError> {
        let name = input.str()?;
        let superclass = input.link()?;
        let count = input.len()?;
        let mut methods = IndexMap::with_capacity(count);
        for _ in 0..count {
            let message = input.str()?;
            methods.insert(message, input.required()?);
        }
        Ok(ClassObject {
            name,
            superclass,
            methods: RefCell::new(methods),
        })
    }
}

/// An instance of a source-defined class or `.Object`
#[derive(Debug)]
pub struct Instance {
    class: ObjRef,
    variables: RefCell<IndexMap<String, ObjRef>>,
}

impl Instance {
    pub fn new(class: ObjRef) -> Self {
        Instance {
            class,
            variables: RefCell::new(IndexMap::new()),
        }
    }

    pub fn class(&self) -> ObjRef {
        self.class
    }

    pub fn variable(&self, name: &str) -> Option<ObjRef> {
        self.variables.borrow().get(name).copied()
    }

    pub fn set_variable(&self, name: &str, value: ObjRef) {
        self.variables.borrow_mut().insert(name.to_string(), value);
    }

    pub fn drop_variable(&self, name: &str) {
        self.variables.borrow_mut().shift_remove(name);
    }
}

impl Trace for Instance {
    fn trace(&self, edges: &mut dyn EdgeSink) {
        edges.edge(Some(self.class));
        for value in self.variables.borrow().values() {
            edges.edge(Some(*value));
        }
    }
}

impl Flatten for Instance {
    fn flatten(&self, out: &mut EnvelopeWriter) -> Result<(), HeapError> {
        out.reference(Some(self.class))?;
        let variables = self.variables.borrow();
        out.len(variables.len())?;
        for (name, value) in variables.iter() {
            out.str(name)?;
            out.reference(Some(*value))?;
        }
        Ok(())
    }

    fn restore(input: &mut EnvelopeReader) -> Result<Self, HeapError> {
        let class = input.required()?;
        let count = input.len()?;
        let mut variables = IndexMap::with_capacity(count);
        for _ in 0..count {
            let name = input.str()?;
            variables.insert(name, input.required()?);
        }
        Ok(Instance {
            class,
            variables: RefCell::new(variables),
        })
    }
}

/// Shared objects every machine needs at hand
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WellKnown {
    pub object: ObjRef,
    pub class: ObjRef,
    pub string: ObjRef,
    pub nil: ObjRef,
    pub true_: ObjRef,
    pub false_: ObjRef,
}

impl WellKnown {
    /// Find the builtins of a heap that has already been bootstrapped
    pub fn lookup(heap: &Heap) -> Option<Self> {
        Some(WellKnown {
            object: heap.singleton(OBJECT_CLASS)?,
            class: heap.singleton(CLASS_CLASS)?,
            string: heap.singleton(STRING_CLASS)?,
            nil: heap.singleton(NIL)?,
            true_: heap.singleton(TRUE)?,
            false_: heap.singleton(FALSE)?,
        })
    }

    pub fn boolean(&self, value: bool) -> ObjRef {
        if value {
            self.true_
        } else {
            self.false_
        }
    }
}

/// Creates builtin classes, their native methods and the logical
/// singletons
pub struct Bootstrap;

impl Bootstrap {
    fn class(
        view: &MutatorHeapView,
        name: &str,
        superclass: Option<ObjRef>,
    ) -> Result<ObjRef, HeapError> {
        let class = view.alloc(HeapObject::Class(ClassObject::new(name, superclass)))?;
        view.heap().register_singleton(name, class)?;
        Ok(class)
    }
}

impl Mutator for Bootstrap {
    type Input = ();
    type Output = WellKnown;

    fn run(&self, view: &MutatorHeapView, _: ()) -> Result<WellKnown, ExecutionError> {
        let heap = view.heap();
        if let Some(known) = WellKnown::lookup(heap) {
            return Ok(known);
        }

        let object = Self::class(view, OBJECT_CLASS, None)?;
        let class = Self::class(view, CLASS_CLASS, Some(object))?;
        let string = Self::class(view, STRING_CLASS, Some(object))?;

        for native in NativeMethod::ALL {
            let owner = match native.owner() {
                OBJECT_CLASS => object,
                CLASS_CLASS => class,
                _ => string,
            };
            let method = view.alloc(HeapObject::Method(Method::new(
                native.message().to_string(),
                Some(owner),
                MethodKind::Native(native),
            )))?;
            heap.get(owner)?.class()?.define(native.message(), method);
        }

        let nil = view.alloc(HeapObject::Instance(Instance::new(object)))?;
        heap.register_singleton(NIL, nil)?;
        let true_ = heap.intern("1")?;
        heap.register_singleton(TRUE, true_)?;
        let false_ = heap.intern("0")?;
        heap.register_singleton(FALSE, false_)?;

        Ok(WellKnown {
            object,
            class,
            string,
            nil,
            true_,
            false_,
        })
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::eval::memory::{envelope::Envelope, object::edges_of};

    fn bootstrap(heap: &Heap) -> WellKnown {
        Bootstrap.run(&MutatorHeapView::new(heap), ()).unwrap()
    }

    #[test]
    pub fn test_bootstrap_is_idempotent() {
        let heap = Heap::new();
        let first = bootstrap(&heap);
        let objects = heap.live_objects();
        assert_eq!(bootstrap(&heap), first);
        assert_eq!(heap.live_objects(), objects);
    }

    #[test]
    pub fn test_builtin_hierarchy() {
        let heap = Heap::new();
        let known = bootstrap(&heap);
        let string = heap.get(known.string).unwrap();
        let string = string.class().unwrap();
        assert_eq!(string.superclass(), Some(known.object));
        assert!(string.method("LENGTH").is_some());
        assert!(string.method("NEW").is_none());
        assert_eq!(heap.shared_key(known.true_), heap.shared_key(heap.intern("1").unwrap()));
    }

    #[test]
    pub fn test_native_codes_are_stable() {
        for (i, native) in NativeMethod::ALL.iter().enumerate() {
            assert_eq!(native.code() as usize, i);
            assert_eq!(NativeMethod::from_code(i as u8), Some(*native));
        }
    }

    #[test]
    pub fn test_instance_traces_class_then_variables() {
        let heap = Heap::new();
        let known = bootstrap(&heap);
        let value = heap.string("v").unwrap();
        let instance = Instance::new(known.object);
        instance.set_variable("A", value);
        assert_eq!(edges_of(&instance), vec![Some(known.object), Some(value)]);
    }

    #[test]
    pub fn test_user_class_round_trips_with_external_superclass() {
        let heap = Heap::new();
        let known = bootstrap(&heap);
        let account = heap
            .alloc(HeapObject::Class(ClassObject::new("account", Some(known.object))))
            .unwrap();
        let getter = heap
            .alloc(HeapObject::Method(Method::new(
                "BALANCE".to_string(),
                Some(account),
                MethodKind::Getter("BALANCE".to_string()),
            )))
            .unwrap();
        heap.get(account).unwrap().class().unwrap().define("BALANCE", getter);

        let envelope = Envelope::flatten(&heap, &[account]).unwrap();
        assert_eq!(envelope.header().object_count, 2);

        let target = Heap::new();
        let target_known = bootstrap(&target);
        let roots = envelope.restore(&target).unwrap();
        let restored = target.get(roots[0]).unwrap();
        let restored = restored.class().unwrap();
        assert_eq!(restored.name(), "ACCOUNT");
        assert_eq!(restored.superclass(), Some(target_known.object));
        assert_eq!(restored.method_names(), vec!["BALANCE".to_string()]);
    }
}
