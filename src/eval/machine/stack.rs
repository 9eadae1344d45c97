//! The evaluation stack of an activation

use crate::eval::memory::object::ObjRef;

/// A growable stack of values; `None` is the placeholder pushed for
/// an omitted argument
#[derive(Debug, Default, Clone)]
pub struct EvalStack {
    slots: Vec<Option<ObjRef>>,
}

impl EvalStack {
    pub fn depth(&self) -> usize {
        self.slots.len()
    }

    pub fn push(&mut self, value: ObjRef) {
        self.slots.push(Some(value))
    }

    pub fn push_omitted(&mut self) {
        self.slots.push(None)
    }

    pub fn pop(&mut self) -> Option<Option<ObjRef>> {
        self.slots.pop()
    }

    /// Inspect the value `n` places below the top
    pub fn peek(&self, n: usize) -> Option<Option<ObjRef>> {
        self.slots.len().checked_sub(n + 1).map(|i| self.slots[i])
    }

    /// Copy the topmost `count` slots, deepest first
    pub fn top(&self, count: usize) -> Option<&[Option<ObjRef>]> {
        self.slots
            .len()
            .checked_sub(count)
            .map(|start| &self.slots[start..])
    }

    /// Discard everything above `depth`
    pub fn truncate(&mut self, depth: usize) {
        self.slots.truncate(depth)
    }

    pub fn values(&self) -> impl Iterator<Item = ObjRef> + '_ {
        self.slots.iter().flatten().copied()
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;

    #[test]
    pub fn test_top_and_truncate() {
        let mut stack = EvalStack::default();
        let a = ObjRef::new(1, 0);
        let b = ObjRef::new(2, 0);
        stack.push(a);
        stack.push_omitted();
        stack.push(b);
        assert_eq!(stack.top(2), Some(&[None, Some(b)][..]));
        assert_eq!(stack.peek(2), Some(Some(a)));
        assert_eq!(stack.top(4), None);
        assert_eq!(stack.values().count(), 2);
        stack.truncate(1);
        assert_eq!(stack.depth(), 1);
        assert_eq!(stack.pop(), Some(Some(a)));
        assert_eq!(stack.pop(), None);
    }
}
