//! Single-pass construction of instruction graphs
//!
//! The parser hands clauses to a [`CodeBuilder`] in source order. Block
//! openers wait on a pending-control stack; closers are synthesised
//! when the instruction governed by a THEN or ELSE is complete, and
//! back-patch the links of the instructions they close. Each link is
//! set exactly once and an instruction is frozen as soon as its last
//! link is known.

use indexmap::IndexMap;
use thiserror::Error;

use crate::{
    common::sourcemap::{HasSmid, Smid},
    eval::memory::{
        heap::{Heap, HeapError},
        mutator::MutatorHeapView,
        object::{Link, ObjRef},
    },
};

use super::instruction::{EndIfKind, IfKind, InstructionKind, LinkField, ThenKind};

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BuildError {
    #[error("THEN expected")]
    ThenExpected(Smid),
    #[error("THEN has no corresponding IF or WHEN clause")]
    UnexpectedThen(Smid),
    #[error("ELSE has no corresponding THEN clause")]
    UnexpectedElse(Smid),
    #[error("WHEN has no corresponding SELECT")]
    UnexpectedWhen(Smid),
    #[error("OTHERWISE has no corresponding SELECT")]
    UnexpectedOtherwise(Smid),
    #[error("END has no corresponding DO or SELECT")]
    UnexpectedEnd(Smid),
    #[error("WHEN or OTHERWISE expected in SELECT")]
    WhenExpected(Smid),
    #[error("SELECT requires at least one WHEN")]
    SelectWithoutWhen(Smid),
    #[error("WHEN in SELECT CASE requires candidate values")]
    CaseWhenMismatch(Smid),
    #[error("instruction expected after {1}")]
    IncompleteClause(Smid, &'static str),
    #[error("incomplete {1} block")]
    Unclosed(Smid, &'static str),
    #[error("link already patched")]
    AlreadyPatched(Smid),
    #[error("cannot patch frozen instruction")]
    Frozen(Smid),
    #[error("instruction has no {1} link")]
    Unlinked(Smid, &'static str),
    #[error("class {1} is not defined")]
    UnknownClass(Smid, String),
    #[error("class {1} is defined more than once")]
    DuplicateClass(Smid, String),
    #[error(transparent)]
    Heap(#[from] HeapError),
}

impl HasSmid for BuildError {
    fn smid(&self) -> Smid {
        match self {
            BuildError::ThenExpected(s)
            | BuildError::UnexpectedThen(s)
            | BuildError::UnexpectedElse(s)
            | BuildError::UnexpectedWhen(s)
            | BuildError::UnexpectedOtherwise(s)
            | BuildError::UnexpectedEnd(s)
            | BuildError::WhenExpected(s)
            | BuildError::SelectWithoutWhen(s)
            | BuildError::CaseWhenMismatch(s)
            | BuildError::IncompleteClause(s, _)
            | BuildError::Unclosed(s, _)
            | BuildError::AlreadyPatched(s)
            | BuildError::Frozen(s)
            | BuildError::Unlinked(s, _)
            | BuildError::UnknownClass(s, _)
            | BuildError::DuplicateClass(s, _) => *s,
            BuildError::Heap(_) => Smid::default(),
        }
    }
}

/// An entry on the pending-control stack
#[derive(Debug)]
enum Pending {
    /// IF or WHEN awaiting its THEN
    Opener(ObjRef, Smid),
    /// THEN awaiting the instruction it governs
    Then(ObjRef, Smid),
    /// IF construct complete but for a possible ELSE
    ThenDone(ObjRef),
    /// ELSE awaiting the instruction it governs
    Else(ObjRef, Smid),
    Select {
        select: ObjRef,
        smid: Smid,
        case: bool,
        endwhens: Vec<ObjRef>,
        otherwise: bool,
    },
    Do(ObjRef, Smid),
}

impl Pending {
    fn describe(&self) -> (Smid, &'static str) {
        match self {
            Pending::Opener(_, smid) => (*smid, "IF"),
            Pending::Then(_, smid) => (*smid, "THEN"),
            Pending::ThenDone(_) => (Smid::default(), "IF"),
            Pending::Else(_, smid) => (*smid, "ELSE"),
            Pending::Select { smid, .. } => (*smid, "SELECT"),
            Pending::Do(_, smid) => (*smid, "DO"),
        }
    }
}

/// The product of building one executable unit
#[derive(Debug, Clone)]
pub struct CodeBlock {
    pub entry: Option<ObjRef>,
    pub labels: IndexMap<String, ObjRef>,
    pub instructions: usize,
}

pub struct CodeBuilder<'guard> {
    view: MutatorHeapView<'guard>,
    control: Vec<Pending>,
    first: Option<ObjRef>,
    last: Option<ObjRef>,
    count: usize,
    labels: IndexMap<String, ObjRef>,
    call_sites: Vec<ObjRef>,
}

impl<'guard> CodeBuilder<'guard> {
    pub fn new(heap: &'guard Heap) -> Self {
        CodeBuilder {
            view: MutatorHeapView::new(heap),
            control: vec![],
            first: None,
            last: None,
            count: 0,
            labels: IndexMap::new(),
            call_sites: vec![],
        }
    }

    pub fn view(&self) -> MutatorHeapView<'guard> {
        self.view
    }

    fn top(&self) -> Option<&Pending> {
        self.control.last()
    }

    fn freeze(&self, r: ObjRef) -> Result<(), BuildError> {
        self.view.heap().get(r)?.header().freeze();
        Ok(())
    }

    /// Set a back-patched link exactly once
    fn patch(&self, node: ObjRef, field: LinkField, target: ObjRef) -> Result<(), BuildError> {
        let cell = self.view.heap().get(node)?;
        let instruction = cell.instruction()?;
        let smid = instruction.smid();
        if cell.header().is_frozen() {
            return Err(BuildError::Frozen(smid));
        }
        let link = instruction.link(field).ok_or(BuildError::Unlinked(smid, "patchable"))?;
        if link.set(target) {
            Ok(())
        } else {
            Err(BuildError::AlreadyPatched(smid))
        }
    }

    fn append(&mut self, smid: Smid, kind: InstructionKind) -> Result<ObjRef, BuildError> {
        let r = self.view.instruction(smid, kind)?;
        if let Some(last) = self.last {
            let cell = self.view.heap().get(last)?;
            if !cell.instruction()?.chain(r) {
                return Err(BuildError::AlreadyPatched(smid));
            }
        } else {
            self.first = Some(r);
        }
        self.last = Some(r);
        self.count += 1;
        Ok(r)
    }

    /// Every new clause first closes an IF that turned out to have no
    /// ELSE
    fn begin_clause(&mut self) -> Result<(), BuildError> {
        if let Some(Pending::ThenDone(endif)) = self.top() {
            let endif = *endif;
            self.control.pop();
            self.freeze(endif)?;
            self.complete()?;
        }
        Ok(())
    }

    /// Reject an ordinary instruction where the grammar demands
    /// something specific
    fn expect_instruction(&self, smid: Smid) -> Result<(), BuildError> {
        match self.top() {
            Some(Pending::Opener(..)) => Err(BuildError::ThenExpected(smid)),
            Some(Pending::Select {
                otherwise: false, ..
            }) => Err(BuildError::WhenExpected(smid)),
            _ => Ok(()),
        }
    }

    /// An instruction has just completed: close any THEN or ELSE
    /// waiting on it
    fn complete(&mut self) -> Result<(), BuildError> {
        loop {
            match self.top() {
                Some(Pending::Then(then, smid)) => {
                    let (then, smid) = (*then, *smid);
                    self.control.pop();

                    let cell = self.view.heap().get(then)?;
                    let (subtype, opener) = match cell.instruction()?.kind() {
                        InstructionKind::Then { subtype, parent } => (*subtype, parent.get()),
                        _ => return Err(BuildError::UnexpectedThen(smid)),
                    };
                    let opener = opener.ok_or(BuildError::Unlinked(smid, "parent"))?;

                    let closer = match subtype {
                        ThenKind::Then => EndIfKind::EndIf,
                        ThenKind::WhenThen => EndIfKind::EndWhen,
                    };
                    let endif = self.append(
                        smid,
                        InstructionKind::EndIf {
                            subtype: closer,
                            parent: Link::to(then),
                            else_end: Link::default(),
                        },
                    )?;
                    self.patch(opener, LinkField::ElseLocation, endif)?;
                    self.freeze(opener)?;
                    self.freeze(then)?;

                    if closer == EndIfKind::EndWhen {
                        return match self.control.last_mut() {
                            Some(Pending::Select { endwhens, .. }) => {
                                endwhens.push(endif);
                                Ok(())
                            }
                            _ => Err(BuildError::UnexpectedWhen(smid)),
                        };
                    }
                    self.control.push(Pending::ThenDone(endif));
                    return Ok(());
                }
                Some(Pending::Else(else_, smid)) => {
                    let (else_, smid) = (*else_, *smid);
                    self.control.pop();

                    let endif = self
                        .view
                        .heap()
                        .get(else_)?
                        .instruction()?
                        .parent()
                        .ok_or(BuildError::Unlinked(smid, "parent"))?;
                    let endelse = self.append(
                        smid,
                        InstructionKind::EndIf {
                            subtype: EndIfKind::EndElse,
                            parent: Link::to(else_),
                            else_end: Link::default(),
                        },
                    )?;
                    self.patch(endif, LinkField::ElseEnd, endelse)?;
                    self.freeze(endif)?;
                    self.freeze(else_)?;
                    self.freeze(endelse)?;
                }
                _ => return Ok(()),
            }
        }
    }

    /// Add an instruction with no block structure
    pub fn instruction(&mut self, smid: Smid, kind: InstructionKind) -> Result<ObjRef, BuildError> {
        self.begin_clause()?;
        self.expect_instruction(smid)?;
        let r = self.append(smid, kind)?;
        self.freeze(r)?;
        self.complete()?;
        Ok(r)
    }

    /// Add a label; the first definition of a name wins
    pub fn label(&mut self, smid: Smid, name: &str) -> Result<ObjRef, BuildError> {
        let name = name.to_uppercase();
        let r = self.instruction(
            smid,
            InstructionKind::Label {
                name: name.clone(),
            },
        )?;
        self.labels.entry(name).or_insert(r);
        Ok(r)
    }

    /// Record a function-call expression for label resolution
    pub fn call_site(&mut self, call: ObjRef) {
        self.call_sites.push(call)
    }

    pub fn if_(&mut self, smid: Smid, condition: ObjRef) -> Result<ObjRef, BuildError> {
        self.begin_clause()?;
        self.expect_instruction(smid)?;
        let r = self.append(
            smid,
            InstructionKind::If {
                subtype: IfKind::If,
                condition,
                else_location: Link::default(),
            },
        )?;
        self.control.push(Pending::Opener(r, smid));
        Ok(r)
    }

    pub fn then_(&mut self, smid: Smid) -> Result<ObjRef, BuildError> {
        let opener = match self.top() {
            Some(Pending::Opener(opener, _)) => *opener,
            _ => return Err(BuildError::UnexpectedThen(smid)),
        };
        self.control.pop();

        let subtype = match self.view.heap().get(opener)?.instruction()?.kind() {
            InstructionKind::If {
                subtype: IfKind::If,
                ..
            } => ThenKind::Then,
            _ => ThenKind::WhenThen,
        };
        let r = self.append(
            smid,
            InstructionKind::Then {
                subtype,
                parent: Link::to(opener),
            },
        )?;
        self.control.push(Pending::Then(r, smid));
        Ok(r)
    }

    pub fn else_(&mut self, smid: Smid) -> Result<ObjRef, BuildError> {
        let endif = match self.top() {
            Some(Pending::ThenDone(endif)) => *endif,
            Some(Pending::Then(..)) => return Err(BuildError::IncompleteClause(smid, "THEN")),
            Some(Pending::Else(..)) => return Err(BuildError::IncompleteClause(smid, "ELSE")),
            _ => return Err(BuildError::UnexpectedElse(smid)),
        };
        self.control.pop();
        let r = self.append(
            smid,
            InstructionKind::Else {
                parent: Link::to(endif),
            },
        )?;
        self.control.push(Pending::Else(r, smid));
        Ok(r)
    }

    pub fn select(&mut self, smid: Smid, case: Option<ObjRef>) -> Result<ObjRef, BuildError> {
        self.begin_clause()?;
        self.expect_instruction(smid)?;
        let r = self.append(
            smid,
            InstructionKind::Select {
                case,
                end: Link::default(),
                otherwise: Link::default(),
            },
        )?;
        self.control.push(Pending::Select {
            select: r,
            smid,
            case: case.is_some(),
            endwhens: vec![],
            otherwise: false,
        });
        Ok(r)
    }

    fn expect_when(&self, smid: Smid, candidates: bool) -> Result<(), BuildError> {
        match self.top() {
            Some(Pending::Select {
                otherwise: false,
                case,
                ..
            }) => {
                if *case == candidates {
                    Ok(())
                } else {
                    Err(BuildError::CaseWhenMismatch(smid))
                }
            }
            Some(Pending::Opener(..)) => Err(BuildError::ThenExpected(smid)),
            Some(Pending::Then(..)) => Err(BuildError::IncompleteClause(smid, "THEN")),
            _ => Err(BuildError::UnexpectedWhen(smid)),
        }
    }

    /// WHEN in a plain SELECT
    pub fn when(&mut self, smid: Smid, condition: ObjRef) -> Result<ObjRef, BuildError> {
        self.begin_clause()?;
        self.expect_when(smid, false)?;
        let r = self.append(
            smid,
            InstructionKind::If {
                subtype: IfKind::When,
                condition,
                else_location: Link::default(),
            },
        )?;
        self.control.push(Pending::Opener(r, smid));
        Ok(r)
    }

    /// WHEN in SELECT CASE with its candidate values
    pub fn case_when(&mut self, smid: Smid, candidates: Vec<ObjRef>) -> Result<ObjRef, BuildError> {
        self.begin_clause()?;
        self.expect_when(smid, true)?;
        let r = self.append(
            smid,
            InstructionKind::CaseWhen {
                candidates: candidates.into_boxed_slice(),
                else_location: Link::default(),
            },
        )?;
        self.control.push(Pending::Opener(r, smid));
        Ok(r)
    }

    pub fn otherwise(&mut self, smid: Smid) -> Result<ObjRef, BuildError> {
        self.begin_clause()?;
        let select = match self.top() {
            Some(Pending::Select {
                select,
                endwhens,
                otherwise: false,
                ..
            }) => {
                if endwhens.is_empty() {
                    return Err(BuildError::SelectWithoutWhen(smid));
                }
                *select
            }
            Some(Pending::Opener(..)) => return Err(BuildError::ThenExpected(smid)),
            Some(Pending::Then(..)) => return Err(BuildError::IncompleteClause(smid, "THEN")),
            _ => return Err(BuildError::UnexpectedOtherwise(smid)),
        };
        let r = self.append(
            smid,
            InstructionKind::Otherwise {
                parent: Link::to(select),
            },
        )?;
        self.patch(select, LinkField::Otherwise, r)?;
        self.freeze(r)?;
        if let Some(Pending::Select { otherwise, .. }) = self.control.last_mut() {
            *otherwise = true;
        }
        Ok(r)
    }

    pub fn do_(&mut self, smid: Smid) -> Result<ObjRef, BuildError> {
        self.begin_clause()?;
        self.expect_instruction(smid)?;
        let r = self.append(
            smid,
            InstructionKind::Do {
                end: Link::default(),
            },
        )?;
        self.control.push(Pending::Do(r, smid));
        Ok(r)
    }

    /// END of a DO group or SELECT
    pub fn end_(&mut self, smid: Smid) -> Result<ObjRef, BuildError> {
        self.begin_clause()?;
        match self.control.pop() {
            Some(Pending::Do(group, _)) => {
                let end = self.append(
                    smid,
                    InstructionKind::End {
                        parent: Link::to(group),
                    },
                )?;
                self.patch(group, LinkField::End, end)?;
                self.freeze(group)?;
                self.freeze(end)?;
                self.complete()?;
                Ok(end)
            }
            Some(Pending::Select {
                select, endwhens, ..
            }) => {
                if endwhens.is_empty() {
                    return Err(BuildError::SelectWithoutWhen(smid));
                }
                let end = self.append(
                    smid,
                    InstructionKind::End {
                        parent: Link::to(select),
                    },
                )?;
                self.patch(select, LinkField::End, end)?;
                for endwhen in endwhens {
                    self.patch(endwhen, LinkField::ElseEnd, end)?;
                    self.freeze(endwhen)?;
                }
                self.freeze(select)?;
                self.freeze(end)?;
                self.complete()?;
                Ok(end)
            }
            Some(Pending::Then(_, _)) => Err(BuildError::IncompleteClause(smid, "THEN")),
            Some(Pending::Else(_, _)) => Err(BuildError::IncompleteClause(smid, "ELSE")),
            Some(Pending::Opener(_, _)) => Err(BuildError::ThenExpected(smid)),
            Some(Pending::ThenDone(_)) | None => Err(BuildError::UnexpectedEnd(smid)),
        }
    }

    /// Close the unit, resolve call sites against labels and verify
    /// every required link
    pub fn finish(mut self) -> Result<CodeBlock, BuildError> {
        self.begin_clause()?;
        if let Some(pending) = self.top() {
            let (smid, what) = pending.describe();
            return Err(BuildError::Unclosed(smid, what));
        }

        for site in &self.call_sites {
            let cell = self.view.heap().get(*site)?;
            if let Some(call) = cell.expression()?.as_function_call() {
                if call.is_quoted() {
                    continue;
                }
                if let Some(label) = self.labels.get(call.name()) {
                    call.resolve_internal(*label);
                }
            }
        }

        verify(self.view.heap(), self.first)?;

        Ok(CodeBlock {
            entry: self.first,
            labels: self.labels,
            instructions: self.count,
        })
    }
}

/// Check every instruction on the chain from `entry` is frozen and
/// has its required links
pub fn verify(heap: &Heap, entry: Option<ObjRef>) -> Result<usize, BuildError> {
    let mut current = entry;
    let mut count = 0;
    while let Some(r) = current {
        let cell = heap.get(r)?;
        let instruction = cell.instruction()?;
        for (name, link) in instruction.required_links() {
            if !link.is_set() {
                return Err(BuildError::Unlinked(instruction.smid(), name));
            }
        }
        if !cell.header().is_frozen() {
            return Err(BuildError::Unclosed(
                instruction.smid(),
                instruction.kind().keyword(),
            ));
        }
        count += 1;
        current = instruction.next();
    }
    Ok(count)
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::eval::code::instruction::Instruction;

    fn literal(builder: &CodeBuilder, text: &str) -> ObjRef {
        builder.view().literal(text).unwrap()
    }

    fn say(builder: &mut CodeBuilder, text: &str) -> ObjRef {
        let value = literal(builder, text);
        builder
            .instruction(Smid::default(), InstructionKind::Say { value: Some(value) })
            .unwrap()
    }

    fn with_instruction<T>(heap: &Heap, r: ObjRef, f: impl FnOnce(&Instruction) -> T) -> T {
        let cell = heap.get(r).unwrap();
        f(cell.instruction().unwrap())
    }

    fn link(heap: &Heap, r: ObjRef, field: LinkField) -> Option<ObjRef> {
        with_instruction(heap, r, |i| i.link(field).and_then(|l| l.get()))
    }

    fn next(heap: &Heap, r: ObjRef) -> Option<ObjRef> {
        with_instruction(heap, r, |i| i.next())
    }

    fn keywords(heap: &Heap, entry: Option<ObjRef>) -> Vec<&'static str> {
        let mut out = vec![];
        let mut current = entry;
        while let Some(r) = current {
            with_instruction(heap, r, |i| out.push(i.kind().keyword()));
            current = next(heap, r);
        }
        out
    }

    #[test]
    pub fn test_if_then_else_links() {
        let heap = Heap::new();
        let mut builder = CodeBuilder::new(&heap);
        let condition = literal(&builder, "0");
        let if_ = builder.if_(Smid::default(), condition).unwrap();
        let then = builder.then_(Smid::default()).unwrap();
        say(&mut builder, "A");
        let else_ = builder.else_(Smid::default()).unwrap();
        say(&mut builder, "B");
        let block = builder.finish().unwrap();

        assert_eq!(
            keywords(&heap, block.entry),
            vec!["IF", "THEN", "SAY", "END", "ELSE", "SAY", "END"]
        );

        let endif = link(&heap, if_, LinkField::ElseLocation).unwrap();
        assert_eq!(next(&heap, endif), Some(else_));
        assert_eq!(with_instruction(&heap, endif, |i| i.parent()), Some(then));
        assert_eq!(with_instruction(&heap, else_, |i| i.parent()), Some(endif));

        let endelse = link(&heap, endif, LinkField::ElseEnd).unwrap();
        assert!(matches!(
            with_instruction(&heap, endelse, |i| match i.kind() {
                InstructionKind::EndIf { subtype, .. } => Some(*subtype),
                _ => None,
            }),
            Some(EndIfKind::EndElse)
        ));
        assert_eq!(verify(&heap, block.entry).unwrap(), 7);
    }

    #[test]
    pub fn test_if_without_else_closes_at_next_clause() {
        let heap = Heap::new();
        let mut builder = CodeBuilder::new(&heap);
        let condition = literal(&builder, "1");
        let if_ = builder.if_(Smid::default(), condition).unwrap();
        builder.then_(Smid::default()).unwrap();
        say(&mut builder, "A");
        let after = say(&mut builder, "after");
        builder.finish().unwrap();

        let endif = link(&heap, if_, LinkField::ElseLocation).unwrap();
        assert_eq!(next(&heap, endif), Some(after));
        assert_eq!(link(&heap, endif, LinkField::ElseEnd), None);
        assert!(heap.get(endif).unwrap().header().is_frozen());
    }

    #[test]
    pub fn test_else_binds_to_nearest_if() {
        let heap = Heap::new();
        let mut builder = CodeBuilder::new(&heap);
        let c = literal(&builder, "1");
        let outer = builder.if_(Smid::default(), c).unwrap();
        builder.then_(Smid::default()).unwrap();
        let inner = builder.if_(Smid::default(), c).unwrap();
        builder.then_(Smid::default()).unwrap();
        say(&mut builder, "x");
        let inner_else = builder.else_(Smid::default()).unwrap();
        say(&mut builder, "y");
        let outer_else = builder.else_(Smid::default()).unwrap();
        say(&mut builder, "z");
        builder.finish().unwrap();

        let inner_endif = link(&heap, inner, LinkField::ElseLocation).unwrap();
        let outer_endif = link(&heap, outer, LinkField::ElseLocation).unwrap();
        assert_eq!(next(&heap, inner_endif), Some(inner_else));
        assert_eq!(next(&heap, outer_endif), Some(outer_else));
    }

    #[test]
    pub fn test_select_links() {
        let heap = Heap::new();
        let mut builder = CodeBuilder::new(&heap);
        let c = literal(&builder, "0");
        let select = builder.select(Smid::default(), None).unwrap();
        let w1 = builder.when(Smid::default(), c).unwrap();
        builder.then_(Smid::default()).unwrap();
        say(&mut builder, "one");
        let w2 = builder.when(Smid::default(), c).unwrap();
        builder.then_(Smid::default()).unwrap();
        say(&mut builder, "two");
        let otherwise = builder.otherwise(Smid::default()).unwrap();
        say(&mut builder, "other");
        let end = builder.end_(Smid::default()).unwrap();
        let block = builder.finish().unwrap();

        let endwhen1 = link(&heap, w1, LinkField::ElseLocation).unwrap();
        assert_eq!(next(&heap, endwhen1), Some(w2));
        assert_eq!(link(&heap, endwhen1, LinkField::ElseEnd), Some(end));
        let endwhen2 = link(&heap, w2, LinkField::ElseLocation).unwrap();
        assert_eq!(next(&heap, endwhen2), Some(otherwise));
        assert_eq!(link(&heap, select, LinkField::End), Some(end));
        assert_eq!(link(&heap, select, LinkField::Otherwise), Some(otherwise));
        assert!(verify(&heap, block.entry).is_ok());
    }

    #[test]
    pub fn test_nested_do_in_then() {
        let heap = Heap::new();
        let mut builder = CodeBuilder::new(&heap);
        let c = literal(&builder, "1");
        let if_ = builder.if_(Smid::default(), c).unwrap();
        builder.then_(Smid::default()).unwrap();
        let group = builder.do_(Smid::default()).unwrap();
        say(&mut builder, "a");
        say(&mut builder, "b");
        let end = builder.end_(Smid::default()).unwrap();
        let else_ = builder.else_(Smid::default()).unwrap();
        say(&mut builder, "c");
        builder.finish().unwrap();

        assert_eq!(link(&heap, group, LinkField::End), Some(end));
        let endif = link(&heap, if_, LinkField::ElseLocation).unwrap();
        assert_eq!(next(&heap, end), Some(endif));
        assert_eq!(next(&heap, endif), Some(else_));
    }

    #[test]
    pub fn test_construction_errors() {
        let heap = Heap::new();

        let mut builder = CodeBuilder::new(&heap);
        assert_eq!(
            builder.else_(Smid::default()).unwrap_err(),
            BuildError::UnexpectedElse(Smid::default())
        );

        let mut builder = CodeBuilder::new(&heap);
        let c = literal(&builder, "1");
        builder.if_(Smid::default(), c).unwrap();
        let value = literal(&builder, "x");
        assert_eq!(
            builder
                .instruction(Smid::default(), InstructionKind::Say { value: Some(value) })
                .unwrap_err(),
            BuildError::ThenExpected(Smid::default())
        );

        let mut builder = CodeBuilder::new(&heap);
        builder.do_(Smid::default()).unwrap();
        say(&mut builder, "a");
        assert!(matches!(
            builder.finish().unwrap_err(),
            BuildError::Unclosed(_, "DO")
        ));

        let mut builder = CodeBuilder::new(&heap);
        assert_eq!(
            builder.end_(Smid::default()).unwrap_err(),
            BuildError::UnexpectedEnd(Smid::default())
        );

        let mut builder = CodeBuilder::new(&heap);
        builder.select(Smid::default(), None).unwrap();
        assert_eq!(
            builder.end_(Smid::default()).unwrap_err(),
            BuildError::SelectWithoutWhen(Smid::default())
        );
    }

    #[test]
    pub fn test_frozen_links_cannot_be_patched() {
        let heap = Heap::new();
        let mut builder = CodeBuilder::new(&heap);
        let group = builder.do_(Smid::default()).unwrap();
        say(&mut builder, "a");
        let end = builder.end_(Smid::default()).unwrap();
        assert_eq!(
            builder.patch(group, LinkField::End, end).unwrap_err(),
            BuildError::Frozen(Smid::default())
        );
    }

    #[test]
    pub fn test_labels_resolve_call_sites() {
        let heap = Heap::new();
        let mut builder = CodeBuilder::new(&heap);
        let view = builder.view();
        let plain = view.function_call(Smid::default(), "SUB", false, None, vec![]).unwrap();
        let quoted = view.function_call(Smid::default(), "SUB", true, None, vec![]).unwrap();
        builder.call_site(plain);
        builder.call_site(quoted);
        builder
            .instruction(Smid::default(), InstructionKind::Call { call: plain })
            .unwrap();
        builder.instruction(Smid::default(), InstructionKind::Exit { value: None }).unwrap();
        let label = builder.label(Smid::default(), "sub").unwrap();
        builder.finish().unwrap();

        let internal = |r: ObjRef| {
            heap.get(r)
                .unwrap()
                .expression()
                .unwrap()
                .as_function_call()
                .unwrap()
                .internal_label()
        };
        assert_eq!(internal(plain), Some(label));
        assert_eq!(internal(quoted), None);
    }
}
