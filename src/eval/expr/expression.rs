//! Expression nodes
//!
//! Function calls carry two write-once memo cells filled the first
//! time the call site is resolved. Message sends carry their verb in
//! final form (an assignment send's trailing `=` is added by the
//! parser).

use std::cell::OnceCell;

use crate::{
    common::sourcemap::{HasSmid, Smid},
    eval::memory::{
        envelope::{EnvelopeReader, EnvelopeWriter, Flatten},
        heap::HeapError,
        object::{EdgeSink, ObjRef, Trace},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    IntegerDivide,
    Remainder,
    Power,
    /// `||`
    Concat,
    /// Concatenation with an intervening blank
    BlankConcat,
    /// Concatenation by abuttal
    Abut,
    Equal,
    NotEqual,
    Greater,
    Less,
    GreaterEqual,
    LessEqual,
    StrictEqual,
    StrictNotEqual,
    StrictGreater,
    StrictLess,
    And,
    Or,
    Xor,
}

impl BinaryOp {
    const ALL: [BinaryOp; 23] = [
        BinaryOp::Add,
        BinaryOp::Subtract,
        BinaryOp::Multiply,
        BinaryOp::Divide,
        BinaryOp::IntegerDivide,
        BinaryOp::Remainder,
        BinaryOp::Power,
        BinaryOp::Concat,
        BinaryOp::BlankConcat,
        BinaryOp::Abut,
        BinaryOp::Equal,
        BinaryOp::NotEqual,
        BinaryOp::Greater,
        BinaryOp::Less,
        BinaryOp::GreaterEqual,
        BinaryOp::LessEqual,
        BinaryOp::StrictEqual,
        BinaryOp::StrictNotEqual,
        BinaryOp::StrictGreater,
        BinaryOp::StrictLess,
        BinaryOp::And,
        BinaryOp::Or,
        BinaryOp::Xor,
    ];

    /// The operator as a message name
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Subtract => "-",
            BinaryOp::Multiply => "*",
            BinaryOp::Divide => "/",
            BinaryOp::IntegerDivide => "%",
            BinaryOp::Remainder => "//",
            BinaryOp::Power => "**",
            BinaryOp::Concat => "||",
            BinaryOp::BlankConcat => " ",
            BinaryOp::Abut => "",
            BinaryOp::Equal => "=",
            BinaryOp::NotEqual => "\\=",
            BinaryOp::Greater => ">",
            BinaryOp::Less => "<",
            BinaryOp::GreaterEqual => ">=",
            BinaryOp::LessEqual => "<=",
            BinaryOp::StrictEqual => "==",
            BinaryOp::StrictNotEqual => "\\==",
            BinaryOp::StrictGreater => ">>",
            BinaryOp::StrictLess => "<<",
            BinaryOp::And => "&",
            BinaryOp::Or => "|",
            BinaryOp::Xor => "&&",
        }
    }

    fn code(self) -> u8 {
        self as u8
    }

    fn from_code(code: u8) -> Result<Self, HeapError> {
        BinaryOp::ALL
            .get(code as usize)
            .copied()
            .ok_or_else(|| HeapError::MalformedEnvelope(format!("invalid operator {}", code)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrefixOp {
    Minus,
    Plus,
    Not,
}

impl PrefixOp {
    pub fn symbol(self) -> &'static str {
        match self {
            PrefixOp::Minus => "-",
            PrefixOp::Plus => "+",
            PrefixOp::Not => "\\",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Special {
    SelfRef,
    Super,
}

#[derive(Debug)]
pub struct FunctionCall {
    name: String,
    quoted: bool,
    builtin: Option<usize>,
    args: Box<[Option<ObjRef>]>,
    resolved_internal_label: OnceCell<ObjRef>,
    resolved_external_routine: OnceCell<ObjRef>,
}

impl FunctionCall {
    pub fn new(name: String, quoted: bool, builtin: Option<usize>, args: Vec<Option<ObjRef>>) -> Self {
        FunctionCall {
            name,
            quoted,
            builtin,
            args: args.into_boxed_slice(),
            resolved_internal_label: OnceCell::new(),
            resolved_external_routine: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Quoted names bypass internal label resolution
    pub fn is_quoted(&self) -> bool {
        self.quoted
    }

    pub fn builtin(&self) -> Option<usize> {
        self.builtin
    }

    pub fn args(&self) -> &[Option<ObjRef>] {
        &self.args
    }

    pub fn internal_label(&self) -> Option<ObjRef> {
        self.resolved_internal_label.get().copied()
    }

    pub fn external_routine(&self) -> Option<ObjRef> {
        self.resolved_external_routine.get().copied()
    }

    /// Memoize the label this call resolves to (first write wins)
    pub fn resolve_internal(&self, label: ObjRef) -> bool {
        self.resolved_internal_label.set(label).is_ok()
    }

    /// Memoize the routine this call resolves to (first write wins)
    pub fn resolve_external(&self, routine: ObjRef) -> bool {
        self.resolved_external_routine.set(routine).is_ok()
    }
}

#[derive(Debug)]
pub struct MessageSend {
    target: ObjRef,
    verb: String,
    scope: Option<ObjRef>,
    args: Box<[Option<ObjRef>]>,
    cascade: bool,
}

impl MessageSend {
    pub fn new(
        target: ObjRef,
        verb: String,
        scope: Option<ObjRef>,
        args: Vec<Option<ObjRef>>,
        cascade: bool,
    ) -> Self {
        MessageSend {
            target,
            verb,
            scope,
            args: args.into_boxed_slice(),
            cascade,
        }
    }

    pub fn target(&self) -> ObjRef {
        self.target
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn scope(&self) -> Option<ObjRef> {
        self.scope
    }

    pub fn args(&self) -> &[Option<ObjRef>] {
        &self.args
    }

    /// `~~` sends yield the target rather than the result
    pub fn is_cascade(&self) -> bool {
        self.cascade
    }
}

#[derive(Debug)]
pub enum ExpressionKind {
    Literal(ObjRef),
    Variable(String),
    /// `.name`
    Environment(String),
    Special(Special),
    Binary {
        op: BinaryOp,
        left: ObjRef,
        right: ObjRef,
    },
    Prefix {
        op: PrefixOp,
        operand: ObjRef,
    },
    FunctionCall(FunctionCall),
    MessageSend(MessageSend),
}

#[derive(Debug)]
pub struct Expression {
    smid: Smid,
    kind: ExpressionKind,
}

impl HasSmid for Expression {
    fn smid(&self) -> Smid {
        self.smid
    }
}

impl Expression {
    pub fn new(smid: Smid, kind: ExpressionKind) -> Self {
        Expression { smid, kind }
    }

    pub fn kind(&self) -> &ExpressionKind {
        &self.kind
    }

    /// Number of trailing argument slots
    pub fn slot_count(&self) -> usize {
        match &self.kind {
            ExpressionKind::FunctionCall(call) => call.args().len(),
            ExpressionKind::MessageSend(send) => send.args().len(),
            _ => 1,
        }
    }

    pub fn as_function_call(&self) -> Option<&FunctionCall> {
        match &self.kind {
            ExpressionKind::FunctionCall(call) => Some(call),
            _ => None,
        }
    }

    pub fn as_message_send(&self) -> Option<&MessageSend> {
        match &self.kind {
            ExpressionKind::MessageSend(send) => Some(send),
            _ => None,
        }
    }
}

impl Trace for Expression {
    fn trace(&self, edges: &mut dyn EdgeSink) {
        match &self.kind {
            ExpressionKind::Literal(value) => edges.edge(Some(*value)),
            ExpressionKind::Variable(_)
            | ExpressionKind::Environment(_)
            | ExpressionKind::Special(_) => {}
            ExpressionKind::Binary { left, right, .. } => {
                edges.edge(Some(*left));
                edges.edge(Some(*right));
            }
            ExpressionKind::Prefix { operand, .. } => edges.edge(Some(*operand)),
            ExpressionKind::FunctionCall(call) => {
                call.args().trace(edges);
                edges.edge(call.internal_label());
                edges.edge(call.external_routine());
            }
            ExpressionKind::MessageSend(send) => {
                edges.edge(Some(send.target));
                edges.edge(send.scope);
                send.args().trace(edges);
            }
        }
    }
}

impl Flatten for Expression {
    fn flatten(&self, out: &mut EnvelopeWriter) -> Result<(), HeapError> {
        out.smid(self.smid);
        match &self.kind {
            ExpressionKind::Literal(value) => {
                out.u8(0);
                out.reference(Some(*value))?;
            }
            ExpressionKind::Variable(name) => {
                out.u8(1);
                out.str(name)?;
            }
            ExpressionKind::Environment(name) => {
                out.u8(2);
                out.str(name)?;
            }
            ExpressionKind::Special(special) => {
                out.u8(3);
                out.u8(*special as u8);
            }
            ExpressionKind::Binary { op, left, right } => {
                out.u8(4);
                out.u8(op.code());
                out.reference(Some(*left))?;
                out.reference(Some(*right))?;
            }
            ExpressionKind::Prefix { op, operand } => {
                out.u8(5);
                out.u8(*op as u8);
                out.reference(Some(*operand))?;
            }
            ExpressionKind::FunctionCall(call) => {
                out.u8(6);
                out.str(&call.name)?;
                out.bool(call.quoted);
                match call.builtin {
                    Some(index) => {
                        out.bool(true);
                        out.len(index)?;
                    }
                    None => out.bool(false),
                }
                out.references(call.args())?;
                out.reference(call.internal_label())?;
                out.reference(call.external_routine())?;
            }
            ExpressionKind::MessageSend(send) => {
                out.u8(7);
                out.str(&send.verb)?;
                out.bool(send.cascade);
                out.reference(Some(send.target))?;
                out.reference(send.scope)?;
                out.references(send.args())?;
            }
        }
        Ok(())
    }

    fn restore(input: &mut EnvelopeReader) -> Result<Self, HeapError> {
        let smid = input.smid()?;
        let kind = match input.u8()? {
            0 => ExpressionKind::Literal(input.required()?),
            1 => ExpressionKind::Variable(input.str()?),
            2 => ExpressionKind::Environment(input.str()?),
            3 => ExpressionKind::Special(match input.u8()? {
                0 => Special::SelfRef,
                1 => Special::Super,
                s => {
                    return Err(HeapError::MalformedEnvelope(format!(
                        "invalid special variable {}",
                        s
                    )))
                }
            }),
            4 => ExpressionKind::Binary {
                op: BinaryOp::from_code(input.u8()?)?,
                left: input.required()?,
                right: input.required()?,
            },
            5 => ExpressionKind::Prefix {
                op: match input.u8()? {
                    0 => PrefixOp::Minus,
                    1 => PrefixOp::Plus,
                    2 => PrefixOp::Not,
                    p => {
                        return Err(HeapError::MalformedEnvelope(format!(
                            "invalid prefix operator {}",
                            p
                        )))
                    }
                },
                operand: input.required()?,
            },
            6 => {
                let name = input.str()?;
                let quoted = input.bool()?;
                let builtin = if input.bool()? {
                    Some(input.len()?)
                } else {
                    None
                };
                let call = FunctionCall::new(name, quoted, builtin, input.references()?);
                if let Some(label) = input.reference()? {
                    call.resolve_internal(label);
                }
                if let Some(routine) = input.reference()? {
                    call.resolve_external(routine);
                }
                ExpressionKind::FunctionCall(call)
            }
            7 => {
                let verb = input.str()?;
                let cascade = input.bool()?;
                let target = input.required()?;
                let scope = input.reference()?;
                let args = input.references()?;
                ExpressionKind::MessageSend(MessageSend::new(target, verb, scope, args, cascade))
            }
            k => {
                return Err(HeapError::MalformedEnvelope(format!(
                    "invalid expression kind {}",
                    k
                )))
            }
        };
        Ok(Expression { smid, kind })
    }
}
