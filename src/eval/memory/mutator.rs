//! Support mutator access to heap and machine

use crate::{
    common::sourcemap::Smid,
    eval::{
        code::instruction::{Instruction, InstructionKind},
        error::ExecutionError,
        expr::expression::{
            BinaryOp, Expression, ExpressionKind, FunctionCall, MessageSend, PrefixOp, Special,
        },
    },
};

use super::{
    heap::{Heap, HeapError},
    object::{HeapObject, ObjRef},
};

/// A view onto the heap for code that needs mutator access (as
/// opposed to collector access)
///
/// MutatorHeapView provides the means of allocation and convenience
/// constructors for allocating instruction and expression nodes
#[derive(Copy, Clone)]
pub struct MutatorHeapView<'guard> {
    heap: &'guard Heap,
}

impl<'guard> MutatorHeapView<'guard> {
    pub fn new(heap: &'guard Heap) -> Self {
        MutatorHeapView { heap }
    }

    pub fn heap(&self) -> &'guard Heap {
        self.heap
    }

    pub fn alloc(&self, object: HeapObject) -> Result<ObjRef, HeapError> {
        self.heap.alloc(object)
    }

    /// A fresh (unshared) string
    pub fn string<S: Into<String>>(&self, text: S) -> Result<ObjRef, HeapError> {
        self.heap.string(text)
    }

    pub fn instruction(&self, smid: Smid, kind: InstructionKind) -> Result<ObjRef, HeapError> {
        self.alloc(HeapObject::Instruction(Instruction::new(smid, kind)))
    }

    pub fn expression(&self, smid: Smid, kind: ExpressionKind) -> Result<ObjRef, HeapError> {
        self.alloc(HeapObject::Expression(Expression::new(smid, kind)))
    }

    /// A literal expression over an interned string
    pub fn literal(&self, text: &str) -> Result<ObjRef, HeapError> {
        self.literal_at(Smid::default(), text)
    }

    pub fn literal_at(&self, smid: Smid, text: &str) -> Result<ObjRef, HeapError> {
        let value = self.heap.intern(text)?;
        self.expression(smid, ExpressionKind::Literal(value))
    }

    pub fn variable(&self, smid: Smid, name: &str) -> Result<ObjRef, HeapError> {
        self.expression(smid, ExpressionKind::Variable(name.to_uppercase()))
    }

    /// `.name` lookup
    pub fn environment(&self, smid: Smid, name: &str) -> Result<ObjRef, HeapError> {
        self.expression(smid, ExpressionKind::Environment(name.to_uppercase()))
    }

    pub fn special(&self, smid: Smid, special: Special) -> Result<ObjRef, HeapError> {
        self.expression(smid, ExpressionKind::Special(special))
    }

    pub fn binary(
        &self,
        smid: Smid,
        op: BinaryOp,
        left: ObjRef,
        right: ObjRef,
    ) -> Result<ObjRef, HeapError> {
        self.expression(smid, ExpressionKind::Binary { op, left, right })
    }

    pub fn prefix(&self, smid: Smid, op: PrefixOp, operand: ObjRef) -> Result<ObjRef, HeapError> {
        self.expression(smid, ExpressionKind::Prefix { op, operand })
    }

    pub fn function_call(
        &self,
        smid: Smid,
        name: &str,
        quoted: bool,
        builtin: Option<usize>,
        args: Vec<Option<ObjRef>>,
    ) -> Result<ObjRef, HeapError> {
        self.expression(
            smid,
            ExpressionKind::FunctionCall(FunctionCall::new(
                name.to_string(),
                quoted,
                builtin,
                args,
            )),
        )
    }

    pub fn message_send(
        &self,
        smid: Smid,
        target: ObjRef,
        verb: &str,
        scope: Option<ObjRef>,
        args: Vec<Option<ObjRef>>,
        cascade: bool,
    ) -> Result<ObjRef, HeapError> {
        self.expression(
            smid,
            ExpressionKind::MessageSend(MessageSend::new(
                target,
                verb.to_uppercase(),
                scope,
                args,
                cascade,
            )),
        )
    }
}

/// Implement mutator to get access to the heap as a mutator
pub trait Mutator: Sized {
    type Input;
    type Output;

    fn run(
        &self,
        view: &MutatorHeapView,
        input: Self::Input,
    ) -> Result<Self::Output, ExecutionError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_literals_share_interned_value() {
        let heap = Heap::new();
        let view = MutatorHeapView::new(&heap);
        let a = view.literal("x").unwrap();
        let b = view.literal("x").unwrap();
        assert_ne!(a, b);

        let value = |r: ObjRef| match heap.get(r).unwrap().expression().unwrap().kind() {
            ExpressionKind::Literal(v) => *v,
            _ => panic!("expected literal"),
        };
        assert_eq!(value(a), value(b));
    }

    #[test]
    pub fn test_message_verb_is_uppercased() {
        let heap = Heap::new();
        let view = MutatorHeapView::new(&heap);
        let target = view.literal("abc").unwrap();
        let send = view
            .message_send(Smid::default(), target, "length", None, vec![], false)
            .unwrap();
        let cell = heap.get(send).unwrap();
        assert_eq!(
            cell.expression().unwrap().as_message_send().unwrap().verb(),
            "LENGTH"
        );
    }
}
