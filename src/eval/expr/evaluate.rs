//! Expression evaluation against the activation's stack
//!
//! Evaluating any expression leaves the stack exactly one slot deeper
//! than at entry. On error the stack is truncated back to the entry
//! depth before the error propagates.

use std::cmp::Ordering;

use crate::{
    common::sourcemap::{HasSmid, Smid},
    eval::{
        error::ExecutionError,
        machine::vm::Machine,
        memory::object::ObjRef,
    },
};

use super::{
    arith::{self, ArithmeticError},
    expression::{BinaryOp, ExpressionKind, PrefixOp, Special},
};

impl<'a> Machine<'a> {
    pub(crate) fn depth(&self) -> Result<usize, ExecutionError> {
        Ok(self.activation()?.stack().depth())
    }

    pub(crate) fn push(&mut self, value: ObjRef) -> Result<(), ExecutionError> {
        self.activation_mut()?.stack_mut().push(value);
        Ok(())
    }

    pub(crate) fn push_omitted(&mut self) -> Result<(), ExecutionError> {
        self.activation_mut()?.stack_mut().push_omitted();
        Ok(())
    }

    pub(crate) fn truncate(&mut self, depth: usize) -> Result<(), ExecutionError> {
        self.activation_mut()?.stack_mut().truncate(depth);
        Ok(())
    }

    /// The value on top of the stack
    pub(crate) fn top(&self, smid: Smid) -> Result<ObjRef, ExecutionError> {
        self.activation()?
            .stack()
            .peek(0)
            .flatten()
            .ok_or(ExecutionError::StackUnderflow(smid))
    }

    pub(crate) fn pop(&mut self, smid: Smid) -> Result<ObjRef, ExecutionError> {
        self.activation_mut()?
            .stack_mut()
            .pop()
            .flatten()
            .ok_or(ExecutionError::StackUnderflow(smid))
    }

    /// The `count` topmost slots, deepest first
    pub(crate) fn top_slots(
        &self,
        smid: Smid,
        count: usize,
    ) -> Result<Vec<Option<ObjRef>>, ExecutionError> {
        self.activation()?
            .stack()
            .top(count)
            .map(<[Option<ObjRef>]>::to_vec)
            .ok_or(ExecutionError::StackUnderflow(smid))
    }

    /// Evaluate an expression, returning its value with the stack as
    /// it was
    pub fn evaluate(&mut self, expr: ObjRef) -> Result<ObjRef, ExecutionError> {
        self.push_expression(expr)?;
        self.pop(Smid::default())
    }

    /// Evaluate an expression leaving its value on the stack
    pub(crate) fn push_expression(&mut self, expr: ObjRef) -> Result<(), ExecutionError> {
        let depth = self.depth()?;
        match self.eval_onto_stack(expr) {
            Ok(()) => {
                debug_assert_eq!(self.depth()?, depth + 1);
                let depth = self.depth()?;
                self.metrics.stack(depth);
                Ok(())
            }
            Err(e) => {
                self.truncate(depth)?;
                Err(e)
            }
        }
    }

    /// Push argument values left to right, omitted ones as the
    /// placeholder
    pub(crate) fn push_arguments(&mut self, args: &[Option<ObjRef>]) -> Result<(), ExecutionError> {
        for arg in args {
            match arg {
                Some(expr) => self.push_expression(*expr)?,
                None => self.push_omitted()?,
            }
        }
        Ok(())
    }

    fn eval_onto_stack(&mut self, expr: ObjRef) -> Result<(), ExecutionError> {
        let cell = self.heap.get(expr)?;
        let expression = cell.expression()?;
        let smid = expression.smid();

        match expression.kind() {
            ExpressionKind::Literal(value) => self.push(*value),
            ExpressionKind::Variable(name) => {
                let value = self.variable_value(name)?;
                self.push(value)
            }
            ExpressionKind::Environment(name) => {
                let value = self.environment_value(name)?;
                self.push(value)
            }
            ExpressionKind::Special(special) => {
                let value = self.special_value(*special)?;
                self.push(value)
            }
            ExpressionKind::Binary { op, left, right } => {
                let depth = self.depth()?;
                self.push_expression(*left)?;
                self.push_expression(*right)?;
                let r = self.pop(smid)?;
                let l = self.top(smid)?;
                let value = self.binary(smid, *op, l, r)?;
                self.truncate(depth)?;
                self.push(value)
            }
            ExpressionKind::Prefix { op, operand } => {
                let depth = self.depth()?;
                self.push_expression(*operand)?;
                let v = self.top(smid)?;
                let value = self.prefix(smid, *op, v)?;
                self.truncate(depth)?;
                self.push(value)
            }
            ExpressionKind::FunctionCall(call) => self.call_function(smid, call),
            ExpressionKind::MessageSend(send) => self.send_message(smid, send),
        }
    }

    /// Value of a simple variable; an unset variable is its own name
    pub(crate) fn variable_value(&mut self, name: &str) -> Result<ObjRef, ExecutionError> {
        let activation = self.activation()?;
        if activation.is_exposed(name) {
            if let Some(receiver) = activation.receiver() {
                let cell = self.heap.get(receiver)?;
                if let Some(value) = cell.instance()?.variable(name) {
                    return Ok(value);
                }
                return Ok(self.heap.intern(name)?);
            }
        }
        match activation.variable(name) {
            Some(value) => Ok(value),
            None => Ok(self.heap.intern(name)?),
        }
    }

    pub(crate) fn assign(&mut self, name: &str, value: ObjRef) -> Result<(), ExecutionError> {
        let activation = self.activation()?;
        if activation.is_exposed(name) {
            if let Some(receiver) = activation.receiver() {
                self.heap.get(receiver)?.instance()?.set_variable(name, value);
                return Ok(());
            }
        }
        activation.set_variable(name, value);
        Ok(())
    }

    pub(crate) fn drop_variable(&mut self, name: &str) -> Result<(), ExecutionError> {
        let activation = self.activation()?;
        if activation.is_exposed(name) {
            if let Some(receiver) = activation.receiver() {
                self.heap.get(receiver)?.instance()?.drop_variable(name);
                return Ok(());
            }
        }
        activation.drop_variable(name);
        Ok(())
    }

    /// `.name`: classes of the running package, then of loaded
    /// packages, then shared singletons
    fn environment_value(&mut self, name: &str) -> Result<ObjRef, ExecutionError> {
        let mut packages: Vec<ObjRef> = self.activation()?.package().into_iter().collect();
        packages.extend(self.state.packages.iter().copied());

        for package in packages {
            let cell = self.heap.get(package)?;
            for class in cell.package()?.classes() {
                if self.heap.get(*class)?.class()?.name() == name {
                    return Ok(*class);
                }
            }
        }

        match self.heap.singleton(name) {
            Some(value) => Ok(value),
            None => self.new_string(format!(".{}", name)),
        }
    }

    fn special_value(&self, special: Special) -> Result<ObjRef, ExecutionError> {
        let activation = self.activation()?;
        match special {
            Special::SelfRef => Ok(activation.receiver().unwrap_or(self.known.nil)),
            Special::Super => match activation.scope() {
                Some(scope) => Ok(self
                    .heap
                    .get(scope)?
                    .class()?
                    .superclass()
                    .unwrap_or(self.known.nil)),
                None => Ok(self.known.nil),
            },
        }
    }

    fn arithmetic(
        &mut self,
        smid: Smid,
        left: &str,
        right: &str,
        f: fn(f64, f64) -> Result<f64, ArithmeticError>,
    ) -> Result<ObjRef, ExecutionError> {
        let outcome = arith::numeric_operands(left, right).and_then(|(l, r)| f(l, r));
        match outcome {
            Ok(n) => {
                let text = arith::format_number(n, &self.settings());
                self.new_string(text)
            }
            Err(ArithmeticError::NotANumber(0)) => {
                Err(ExecutionError::BadArithmetic(smid, left.to_string()))
            }
            Err(ArithmeticError::NotANumber(_)) => {
                Err(ExecutionError::BadArithmetic(smid, right.to_string()))
            }
            Err(ArithmeticError::DivisionByZero) => Err(ExecutionError::DivisionByZero(smid)),
        }
    }

    fn logical_operand(&self, smid: Smid, value: ObjRef) -> Result<bool, ExecutionError> {
        match self.logical(value)? {
            Some(b) => Ok(b),
            None => Err(ExecutionError::InvalidLogicalValue(smid, self.text(value)?)),
        }
    }

    fn binary(
        &mut self,
        smid: Smid,
        op: BinaryOp,
        left: ObjRef,
        right: ObjRef,
    ) -> Result<ObjRef, ExecutionError> {
        if matches!(op, BinaryOp::And | BinaryOp::Or | BinaryOp::Xor) {
            let l = self.logical_operand(smid, left)?;
            let r = self.logical_operand(smid, right)?;
            let value = match op {
                BinaryOp::And => l && r,
                BinaryOp::Or => l || r,
                _ => l != r,
            };
            return Ok(self.known.boolean(value));
        }

        let l = self.text(left)?;
        let r = self.text(right)?;
        let settings = self.settings();
        let known = self.known;
        let boolean = |b: bool| -> Result<ObjRef, ExecutionError> { Ok(known.boolean(b)) };

        match op {
            BinaryOp::Add => self.arithmetic(smid, &l, &r, arith::add),
            BinaryOp::Subtract => self.arithmetic(smid, &l, &r, arith::subtract),
            BinaryOp::Multiply => self.arithmetic(smid, &l, &r, arith::multiply),
            BinaryOp::Divide => self.arithmetic(smid, &l, &r, arith::divide),
            BinaryOp::IntegerDivide => self.arithmetic(smid, &l, &r, arith::integer_divide),
            BinaryOp::Remainder => self.arithmetic(smid, &l, &r, arith::remainder),
            BinaryOp::Power => self.arithmetic(smid, &l, &r, arith::power),
            BinaryOp::Concat | BinaryOp::Abut => self.new_string(l + &r),
            BinaryOp::BlankConcat => self.new_string(format!("{} {}", l, r)),
            BinaryOp::Equal => boolean(arith::compare(&l, &r, &settings) == Ordering::Equal),
            BinaryOp::NotEqual => boolean(arith::compare(&l, &r, &settings) != Ordering::Equal),
            BinaryOp::Greater => boolean(arith::compare(&l, &r, &settings) == Ordering::Greater),
            BinaryOp::Less => boolean(arith::compare(&l, &r, &settings) == Ordering::Less),
            BinaryOp::GreaterEqual => {
                boolean(arith::compare(&l, &r, &settings) != Ordering::Less)
            }
            BinaryOp::LessEqual => {
                boolean(arith::compare(&l, &r, &settings) != Ordering::Greater)
            }
            BinaryOp::StrictEqual => boolean(l == r),
            BinaryOp::StrictNotEqual => boolean(l != r),
            BinaryOp::StrictGreater => {
                boolean(arith::strict_compare(&l, &r) == Ordering::Greater)
            }
            BinaryOp::StrictLess => boolean(arith::strict_compare(&l, &r) == Ordering::Less),
            BinaryOp::And | BinaryOp::Or | BinaryOp::Xor => {
                Err(ExecutionError::InvalidCode(smid, op.symbol().to_string()))
            }
        }
    }

    fn prefix(&mut self, smid: Smid, op: PrefixOp, value: ObjRef) -> Result<ObjRef, ExecutionError> {
        match op {
            PrefixOp::Not => {
                let b = self.logical_operand(smid, value)?;
                Ok(self.known.boolean(!b))
            }
            PrefixOp::Minus => {
                let text = self.text(value)?;
                self.arithmetic(smid, "0", &text, arith::subtract)
            }
            PrefixOp::Plus => {
                let text = self.text(value)?;
                self.arithmetic(smid, "0", &text, arith::add)
            }
        }
    }
}
