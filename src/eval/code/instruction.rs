//! Instruction nodes
//!
//! Each instruction is a managed object linked to its successor by
//! `next`. Block structure is expressed through back-patched links
//! that the builder sets exactly once while parsing and that are
//! frozen once the enclosing block closes.

use crate::{
    common::sourcemap::{HasSmid, Smid},
    eval::memory::{
        envelope::{EnvelopeReader, EnvelopeWriter, Flatten},
        heap::HeapError,
        object::{EdgeSink, Link, ObjRef, Trace},
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IfKind {
    If,
    When,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThenKind {
    Then,
    WhenThen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndIfKind {
    EndIf,
    EndElse,
    EndWhen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormOption {
    /// Restore the default (scientific)
    Default,
    Scientific,
    Engineering,
    /// `FORM VALUE expr`
    Value(ObjRef),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NumericOption {
    /// `NUMERIC DIGITS [expr]`; no expression restores the default
    Digits(Option<ObjRef>),
    Fuzz(Option<ObjRef>),
    Form(FormOption),
}

/// Which back-patched link of an instruction to address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkField {
    ElseLocation,
    ElseEnd,
    End,
    Otherwise,
}

#[derive(Debug)]
pub enum InstructionKind {
    Nop,
    Label {
        name: String,
    },
    Say {
        value: Option<ObjRef>,
    },
    Assignment {
        name: String,
        value: ObjRef,
    },
    /// A message send evaluated for effect
    Message {
        send: ObjRef,
    },
    /// `target~name = value`
    MessageAssignment {
        send: ObjRef,
        value: ObjRef,
    },
    Call {
        call: ObjRef,
    },
    Return {
        value: Option<ObjRef>,
    },
    Exit {
        value: Option<ObjRef>,
    },
    UseArg {
        names: Vec<String>,
    },
    Expose {
        names: Vec<String>,
    },
    Numeric(NumericOption),
    /// IF or (plain) WHEN
    If {
        subtype: IfKind,
        condition: ObjRef,
        else_location: Link,
    },
    /// WHEN within SELECT CASE
    CaseWhen {
        candidates: Box<[ObjRef]>,
        else_location: Link,
    },
    Then {
        subtype: ThenKind,
        parent: Link,
    },
    Else {
        parent: Link,
    },
    EndIf {
        subtype: EndIfKind,
        parent: Link,
        else_end: Link,
    },
    Select {
        case: Option<ObjRef>,
        end: Link,
        otherwise: Link,
    },
    Otherwise {
        parent: Link,
    },
    Do {
        end: Link,
    },
    End {
        parent: Link,
    },
}

impl InstructionKind {
    pub fn keyword(&self) -> &'static str {
        match self {
            InstructionKind::Nop => "NOP",
            InstructionKind::Label { .. } => "LABEL",
            InstructionKind::Say { .. } => "SAY",
            InstructionKind::Assignment { .. } => "ASSIGNMENT",
            InstructionKind::Message { .. } => "MESSAGE",
            InstructionKind::MessageAssignment { .. } => "MESSAGE ASSIGNMENT",
            InstructionKind::Call { .. } => "CALL",
            InstructionKind::Return { .. } => "RETURN",
            InstructionKind::Exit { .. } => "EXIT",
            InstructionKind::UseArg { .. } => "USE ARG",
            InstructionKind::Expose { .. } => "EXPOSE",
            InstructionKind::Numeric(_) => "NUMERIC",
            InstructionKind::If {
                subtype: IfKind::If,
                ..
            } => "IF",
            InstructionKind::If { .. } | InstructionKind::CaseWhen { .. } => "WHEN",
            InstructionKind::Then { .. } => "THEN",
            InstructionKind::Else { .. } => "ELSE",
            InstructionKind::EndIf { .. } => "END",
            InstructionKind::Select { .. } => "SELECT",
            InstructionKind::Otherwise { .. } => "OTHERWISE",
            InstructionKind::Do { .. } => "DO",
            InstructionKind::End { .. } => "END",
        }
    }
}

#[derive(Debug)]
pub struct Instruction {
    smid: Smid,
    next: Link,
    kind: InstructionKind,
}

impl HasSmid for Instruction {
    fn smid(&self) -> Smid {
        self.smid
    }
}

impl Instruction {
    pub fn new(smid: Smid, kind: InstructionKind) -> Self {
        Instruction {
            smid,
            next: Link::default(),
            kind,
        }
    }

    pub fn kind(&self) -> &InstructionKind {
        &self.kind
    }

    pub fn next(&self) -> Option<ObjRef> {
        self.next.get()
    }

    /// Set the linear successor, returning false if already set
    pub fn chain(&self, next: ObjRef) -> bool {
        self.next.set(next)
    }

    /// Number of trailing reference slots
    pub fn slot_count(&self) -> usize {
        match &self.kind {
            InstructionKind::CaseWhen { candidates, .. } => candidates.len(),
            _ => 1,
        }
    }

    /// Address a back-patched link
    pub fn link(&self, field: LinkField) -> Option<&Link> {
        match (&self.kind, field) {
            (InstructionKind::If { else_location, .. }, LinkField::ElseLocation)
            | (InstructionKind::CaseWhen { else_location, .. }, LinkField::ElseLocation) => {
                Some(else_location)
            }
            (InstructionKind::EndIf { else_end, .. }, LinkField::ElseEnd) => Some(else_end),
            (InstructionKind::Select { end, .. }, LinkField::End)
            | (InstructionKind::Do { end }, LinkField::End) => Some(end),
            (InstructionKind::Select { otherwise, .. }, LinkField::Otherwise) => Some(otherwise),
            _ => None,
        }
    }

    /// Parent link of a closer or continuation
    pub fn parent(&self) -> Option<ObjRef> {
        match &self.kind {
            InstructionKind::Then { parent, .. }
            | InstructionKind::Else { parent }
            | InstructionKind::EndIf { parent, .. }
            | InstructionKind::Otherwise { parent }
            | InstructionKind::End { parent } => parent.get(),
            _ => None,
        }
    }

    /// Links that must be set before the instruction can execute
    pub fn required_links(&self) -> Vec<(&'static str, &Link)> {
        match &self.kind {
            InstructionKind::If { else_location, .. }
            | InstructionKind::CaseWhen { else_location, .. } => {
                vec![("else location", else_location)]
            }
            InstructionKind::Then { parent, .. }
            | InstructionKind::Else { parent }
            | InstructionKind::Otherwise { parent }
            | InstructionKind::End { parent } => vec![("parent", parent)],
            InstructionKind::EndIf {
                subtype: EndIfKind::EndWhen,
                parent,
                else_end,
            } => vec![("parent", parent), ("else end", else_end)],
            InstructionKind::EndIf { parent, .. } => vec![("parent", parent)],
            InstructionKind::Select { end, .. } | InstructionKind::Do { end } => {
                vec![("end", end)]
            }
            _ => vec![],
        }
    }
}

impl Trace for Instruction {
    fn trace(&self, edges: &mut dyn EdgeSink) {
        self.next.trace(edges);
        match &self.kind {
            InstructionKind::Nop
            | InstructionKind::Label { .. }
            | InstructionKind::UseArg { .. }
            | InstructionKind::Expose { .. } => {}
            InstructionKind::Say { value }
            | InstructionKind::Return { value }
            | InstructionKind::Exit { value } => edges.edge(*value),
            InstructionKind::Assignment { value, .. } => edges.edge(Some(*value)),
            InstructionKind::Message { send } => edges.edge(Some(*send)),
            InstructionKind::MessageAssignment { send, value } => {
                edges.edge(Some(*send));
                edges.edge(Some(*value));
            }
            InstructionKind::Call { call } => edges.edge(Some(*call)),
            InstructionKind::Numeric(option) => match option {
                NumericOption::Digits(value) | NumericOption::Fuzz(value) => edges.edge(*value),
                NumericOption::Form(FormOption::Value(value)) => edges.edge(Some(*value)),
                NumericOption::Form(_) => {}
            },
            InstructionKind::If {
                condition,
                else_location,
                ..
            } => {
                edges.edge(Some(*condition));
                else_location.trace(edges);
            }
            InstructionKind::CaseWhen {
                candidates,
                else_location,
            } => {
                candidates[..].trace(edges);
                else_location.trace(edges);
            }
            InstructionKind::Then { parent, .. }
            | InstructionKind::Else { parent }
            | InstructionKind::Otherwise { parent }
            | InstructionKind::End { parent } => parent.trace(edges),
            InstructionKind::EndIf {
                parent, else_end, ..
            } => {
                parent.trace(edges);
                else_end.trace(edges);
            }
            InstructionKind::Select {
                case,
                end,
                otherwise,
            } => {
                edges.edge(*case);
                end.trace(edges);
                otherwise.trace(edges);
            }
            InstructionKind::Do { end } => end.trace(edges),
        }
    }
}

const IF: u8 = 0;
const WHEN: u8 = 1;

fn if_kind(tag: u8) -> Result<IfKind, HeapError> {
    match tag {
        IF => Ok(IfKind::If),
        WHEN => Ok(IfKind::When),
        t => Err(HeapError::MalformedEnvelope(format!("invalid IF subtype {}", t))),
    }
}

fn then_kind(tag: u8) -> Result<ThenKind, HeapError> {
    match tag {
        0 => Ok(ThenKind::Then),
        1 => Ok(ThenKind::WhenThen),
        t => Err(HeapError::MalformedEnvelope(format!("invalid THEN subtype {}", t))),
    }
}

fn end_if_kind(tag: u8) -> Result<EndIfKind, HeapError> {
    match tag {
        0 => Ok(EndIfKind::EndIf),
        1 => Ok(EndIfKind::EndElse),
        2 => Ok(EndIfKind::EndWhen),
        t => Err(HeapError::MalformedEnvelope(format!("invalid END subtype {}", t))),
    }
}

impl Flatten for Instruction {
    fn flatten(&self, out: &mut EnvelopeWriter) -> Result<(), HeapError> {
        out.smid(self.smid);
        out.link(&self.next)?;
        match &self.kind {
            InstructionKind::Nop => out.u8(0),
            InstructionKind::Label { name } => {
                out.u8(1);
                out.str(name)?;
            }
            InstructionKind::Say { value } => {
                out.u8(2);
                out.reference(*value)?;
            }
            InstructionKind::Assignment { name, value } => {
                out.u8(3);
                out.str(name)?;
                out.reference(Some(*value))?;
            }
            InstructionKind::Message { send } => {
                out.u8(4);
                out.reference(Some(*send))?;
            }
            InstructionKind::MessageAssignment { send, value } => {
                out.u8(5);
                out.reference(Some(*send))?;
                out.reference(Some(*value))?;
            }
            InstructionKind::Call { call } => {
                out.u8(6);
                out.reference(Some(*call))?;
            }
            InstructionKind::Return { value } => {
                out.u8(7);
                out.reference(*value)?;
            }
            InstructionKind::Exit { value } => {
                out.u8(8);
                out.reference(*value)?;
            }
            InstructionKind::UseArg { names } => {
                out.u8(9);
                out.names(names)?;
            }
            InstructionKind::Expose { names } => {
                out.u8(10);
                out.names(names)?;
            }
            InstructionKind::Numeric(option) => {
                out.u8(11);
                match option {
                    NumericOption::Digits(value) => {
                        out.u8(0);
                        out.reference(*value)?;
                    }
                    NumericOption::Fuzz(value) => {
                        out.u8(1);
                        out.reference(*value)?;
                    }
                    NumericOption::Form(FormOption::Default) => out.u8(2),
                    NumericOption::Form(FormOption::Scientific) => out.u8(3),
                    NumericOption::Form(FormOption::Engineering) => out.u8(4),
                    NumericOption::Form(FormOption::Value(value)) => {
                        out.u8(5);
                        out.reference(Some(*value))?;
                    }
                }
            }
            InstructionKind::If {
                subtype,
                condition,
                else_location,
            } => {
                out.u8(12);
                out.u8(match subtype {
                    IfKind::If => IF,
                    IfKind::When => WHEN,
                });
                out.reference(Some(*condition))?;
                out.link(else_location)?;
            }
            InstructionKind::CaseWhen {
                candidates,
                else_location,
            } => {
                out.u8(13);
                let slots: Vec<_> = candidates.iter().map(|c| Some(*c)).collect();
                out.references(&slots)?;
                out.link(else_location)?;
            }
            InstructionKind::Then { subtype, parent } => {
                out.u8(14);
                out.u8(*subtype as u8);
                out.link(parent)?;
            }
            InstructionKind::Else { parent } => {
                out.u8(15);
                out.link(parent)?;
            }
            InstructionKind::EndIf {
                subtype,
                parent,
                else_end,
            } => {
                out.u8(16);
                out.u8(*subtype as u8);
                out.link(parent)?;
                out.link(else_end)?;
            }
            InstructionKind::Select {
                case,
                end,
                otherwise,
            } => {
                out.u8(17);
                out.reference(*case)?;
                out.link(end)?;
                out.link(otherwise)?;
            }
            InstructionKind::Otherwise { parent } => {
                out.u8(18);
                out.link(parent)?;
            }
            InstructionKind::Do { end } => {
                out.u8(19);
                out.link(end)?;
            }
            InstructionKind::End { parent } => {
                out.u8(20);
                out.link(parent)?;
            }
        }
        Ok(())
    }

    fn restore(input: &mut EnvelopeReader) -> Result<Self, HeapError> {
        let smid = input.smid()?;
        let next = input.link()?;
        let kind = match input.u8()? {
            0 => InstructionKind::Nop,
            1 => InstructionKind::Label { name: input.str()? },
            2 => InstructionKind::Say {
                value: input.reference()?,
            },
            3 => InstructionKind::Assignment {
                name: input.str()?,
                value: input.required()?,
            },
            4 => InstructionKind::Message {
                send: input.required()?,
            },
            5 => InstructionKind::MessageAssignment {
                send: input.required()?,
                value: input.required()?,
            },
            6 => InstructionKind::Call {
                call: input.required()?,
            },
            7 => InstructionKind::Return {
                value: input.reference()?,
            },
            8 => InstructionKind::Exit {
                value: input.reference()?,
            },
            9 => InstructionKind::UseArg {
                names: input.names()?,
            },
            10 => InstructionKind::Expose {
                names: input.names()?,
            },
            11 => InstructionKind::Numeric(match input.u8()? {
                0 => NumericOption::Digits(input.reference()?),
                1 => NumericOption::Fuzz(input.reference()?),
                2 => NumericOption::Form(FormOption::Default),
                3 => NumericOption::Form(FormOption::Scientific),
                4 => NumericOption::Form(FormOption::Engineering),
                5 => NumericOption::Form(FormOption::Value(input.required()?)),
                t => {
                    return Err(HeapError::MalformedEnvelope(format!(
                        "invalid NUMERIC option {}",
                        t
                    )))
                }
            }),
            12 => InstructionKind::If {
                subtype: if_kind(input.u8()?)?,
                condition: input.required()?,
                else_location: input.link()?,
            },
            13 => {
                let candidates = input
                    .references()?
                    .into_iter()
                    .map(|c| {
                        c.ok_or_else(|| {
                            HeapError::MalformedEnvelope("null WHEN candidate".to_string())
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                InstructionKind::CaseWhen {
                    candidates: candidates.into_boxed_slice(),
                    else_location: input.link()?,
                }
            }
            14 => InstructionKind::Then {
                subtype: then_kind(input.u8()?)?,
                parent: input.link()?,
            },
            15 => InstructionKind::Else {
                parent: input.link()?,
            },
            16 => InstructionKind::EndIf {
                subtype: end_if_kind(input.u8()?)?,
                parent: input.link()?,
                else_end: input.link()?,
            },
            17 => InstructionKind::Select {
                case: input.reference()?,
                end: input.link()?,
                otherwise: input.link()?,
            },
            18 => InstructionKind::Otherwise {
                parent: input.link()?,
            },
            19 => InstructionKind::Do { end: input.link()? },
            20 => InstructionKind::End {
                parent: input.link()?,
            },
            t => {
                return Err(HeapError::MalformedEnvelope(format!(
                    "invalid instruction kind {}",
                    t
                )))
            }
        };
        Ok(Instruction { smid, next, kind })
    }
}
