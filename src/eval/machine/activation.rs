//! Activations: the execution context of one running unit
//!
//! An activation owns its evaluation stack and next-instruction
//! pointer. Internal calls share the variable pool of their caller;
//! routine and method activations start with a fresh pool.

use std::{cell::RefCell, fmt, rc::Rc};

use indexmap::{IndexMap, IndexSet};

use crate::{common::sourcemap::Smid, eval::memory::object::ObjRef};

use super::stack::EvalStack;

pub const DEFAULT_DIGITS: usize = 9;
pub const DEFAULT_FUZZ: usize = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NumericForm {
    #[default]
    Scientific,
    Engineering,
}

impl fmt::Display for NumericForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NumericForm::Scientific => write!(f, "SCIENTIFIC"),
            NumericForm::Engineering => write!(f, "ENGINEERING"),
        }
    }
}

/// NUMERIC DIGITS, FUZZ and FORM
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumericSettings {
    pub digits: usize,
    pub fuzz: usize,
    pub form: NumericForm,
}

impl Default for NumericSettings {
    fn default() -> Self {
        NumericSettings {
            digits: DEFAULT_DIGITS,
            fuzz: DEFAULT_FUZZ,
            form: NumericForm::default(),
        }
    }
}

impl NumericSettings {
    pub fn with_digits(digits: usize) -> Self {
        NumericSettings {
            digits,
            ..Default::default()
        }
    }
}

/// An open SELECT or DO at runtime
#[derive(Debug, Clone)]
pub enum Block {
    Select {
        /// Indentation to restore when the construct terminates
        indent: usize,
        /// Value of `SELECT CASE expr`
        case: Option<ObjRef>,
    },
    Do {
        indent: usize,
    },
}

impl Block {
    pub fn indent(&self) -> usize {
        match self {
            Block::Select { indent, .. } | Block::Do { indent } => *indent,
        }
    }
}

/// Variable pool, shared between a caller and its internal calls
pub type Variables = Rc<RefCell<IndexMap<String, ObjRef>>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationKind {
    /// Evaluations requested by the host
    Host,
    Program,
    Internal,
    Routine,
    Method { receiver: ObjRef, scope: ObjRef },
}

#[derive(Debug)]
pub struct Activation {
    kind: ActivationKind,
    package: Option<ObjRef>,
    /// The instruction to execute next
    next: Option<ObjRef>,
    /// The instruction being executed
    current: Option<ObjRef>,
    smid: Smid,
    stack: EvalStack,
    variables: Variables,
    exposed: IndexSet<String>,
    args: Vec<Option<ObjRef>>,
    settings: NumericSettings,
    indent: usize,
    blocks: Vec<Block>,
    result: Option<ObjRef>,
    returned: bool,
}

impl Activation {
    fn new(
        kind: ActivationKind,
        package: Option<ObjRef>,
        entry: Option<ObjRef>,
        args: Vec<Option<ObjRef>>,
        variables: Variables,
        settings: NumericSettings,
    ) -> Self {
        Activation {
            kind,
            package,
            next: entry,
            current: None,
            smid: Smid::default(),
            stack: EvalStack::default(),
            variables,
            exposed: IndexSet::new(),
            args,
            settings,
            indent: 0,
            blocks: vec![],
            result: None,
            returned: false,
        }
    }

    pub fn host(settings: NumericSettings) -> Self {
        Self::new(
            ActivationKind::Host,
            None,
            None,
            vec![],
            Variables::default(),
            settings,
        )
    }

    pub fn program(
        package: ObjRef,
        entry: Option<ObjRef>,
        args: Vec<Option<ObjRef>>,
        settings: NumericSettings,
    ) -> Self {
        Self::new(
            ActivationKind::Program,
            Some(package),
            entry,
            args,
            Variables::default(),
            settings,
        )
    }

    /// An internal call shares the caller's variables, receiver and a
    /// copy of its settings
    pub fn internal(caller: &Activation, label: ObjRef, args: Vec<Option<ObjRef>>) -> Self {
        let mut activation = Self::new(
            ActivationKind::Internal,
            caller.package,
            Some(label),
            args,
            caller.variables.clone(),
            caller.settings,
        );
        activation.exposed = caller.exposed.clone();
        if let ActivationKind::Method { receiver, scope } = caller.kind {
            activation.kind = ActivationKind::Method { receiver, scope };
        }
        activation
    }

    pub fn routine(
        package: Option<ObjRef>,
        entry: Option<ObjRef>,
        args: Vec<Option<ObjRef>>,
        settings: NumericSettings,
    ) -> Self {
        Self::new(
            ActivationKind::Routine,
            package,
            entry,
            args,
            Variables::default(),
            settings,
        )
    }

    pub fn method(
        receiver: ObjRef,
        scope: ObjRef,
        package: Option<ObjRef>,
        entry: Option<ObjRef>,
        args: Vec<Option<ObjRef>>,
        settings: NumericSettings,
    ) -> Self {
        Self::new(
            ActivationKind::Method { receiver, scope },
            package,
            entry,
            args,
            Variables::default(),
            settings,
        )
    }

    pub fn kind(&self) -> ActivationKind {
        self.kind
    }

    pub fn receiver(&self) -> Option<ObjRef> {
        match self.kind {
            ActivationKind::Method { receiver, .. } => Some(receiver),
            _ => None,
        }
    }

    /// The class defining the running method
    pub fn scope(&self) -> Option<ObjRef> {
        match self.kind {
            ActivationKind::Method { scope, .. } => Some(scope),
            _ => None,
        }
    }

    pub fn package(&self) -> Option<ObjRef> {
        self.package
    }

    pub fn next(&self) -> Option<ObjRef> {
        self.next
    }

    pub fn set_next(&mut self, next: Option<ObjRef>) {
        self.next = next
    }

    /// Begin executing an instruction; `next` defaults to its successor
    pub fn enter(&mut self, instruction: ObjRef, smid: Smid, next: Option<ObjRef>) {
        self.current = Some(instruction);
        self.smid = smid;
        self.next = next;
    }

    pub fn smid(&self) -> Smid {
        self.smid
    }

    pub fn stack(&self) -> &EvalStack {
        &self.stack
    }

    pub fn stack_mut(&mut self) -> &mut EvalStack {
        &mut self.stack
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

    pub fn is_exposed(&self, name: &str) -> bool {
        self.exposed.contains(name)
    }

    pub fn expose(&mut self, name: &str) {
        self.exposed.insert(name.to_string());
    }

    pub fn args(&self) -> &[Option<ObjRef>] {
        &self.args
    }

    pub fn settings(&self) -> NumericSettings {
        self.settings
    }

    pub fn settings_mut(&mut self) -> &mut NumericSettings {
        &mut self.settings
    }

    pub fn indent(&self) -> usize {
        self.indent
    }

    pub fn indent_by(&mut self, levels: usize) {
        self.indent += levels
    }

    pub fn outdent_by(&mut self, levels: usize) {
        self.indent = self.indent.saturating_sub(levels)
    }

    pub fn open_block(&mut self, block: Block) {
        self.blocks.push(block)
    }

    /// Close the innermost block, restoring its indentation
    pub fn close_block(&mut self) -> Option<Block> {
        let block = self.blocks.pop()?;
        self.indent = block.indent();
        Some(block)
    }

    pub fn innermost_block(&self) -> Option<&Block> {
        self.blocks.last()
    }

    /// Finish with an optional result
    pub fn finish(&mut self, result: Option<ObjRef>) {
        self.result = result;
        self.returned = true;
        self.next = None;
    }

    pub fn result(&self) -> Option<ObjRef> {
        self.result
    }

    pub fn is_finished(&self) -> bool {
        self.returned || self.next.is_none()
    }

    /// Every reference this activation keeps alive
    pub fn roots(&self, out: &mut Vec<ObjRef>) {
        if let ActivationKind::Method { receiver, scope } = self.kind {
            out.push(receiver);
            out.push(scope);
        }
        out.extend(self.package);
        out.extend(self.next);
        out.extend(self.current);
        out.extend(self.result);
        out.extend(self.args.iter().flatten().copied());
        out.extend(self.stack.values());
        out.extend(self.variables.borrow().values().copied());
        for block in &self.blocks {
            if let Block::Select { case: Some(v), .. } = block {
                out.push(*v);
            }
        }
    }
}
