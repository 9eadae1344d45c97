//! Instruction execution
//!
//! The step loop has already advanced the activation to the
//! instruction's linear successor; branching instructions overwrite
//! that with a jump to the successor of a back-patched target.

use crate::{
    common::sourcemap::{HasSmid, Smid},
    eval::{
        error::ExecutionError,
        expr::arith::parse_whole,
        machine::{
            activation::{ActivationKind, Block, NumericForm, DEFAULT_DIGITS, DEFAULT_FUZZ},
            vm::Machine,
        },
        memory::object::ObjRef,
        trace::TraceRecord,
    },
};

use super::instruction::{
    EndIfKind, FormOption, IfKind, Instruction, InstructionKind, NumericOption,
};

impl<'a> Machine<'a> {
    pub(crate) fn execute(&mut self, instruction: &Instruction) -> Result<(), ExecutionError> {
        let smid = instruction.smid();
        if self.tracer.enabled() {
            let indent = self.activation()?.indent();
            self.trace(TraceRecord::Instruction {
                indent,
                smid,
                keyword: instruction.kind().keyword(),
            });
        }

        match instruction.kind() {
            InstructionKind::Nop
            | InstructionKind::Label { .. }
            | InstructionKind::Otherwise { .. } => {}
            InstructionKind::Say { value } => {
                let text = match value {
                    Some(expr) => {
                        let v = self.evaluate(*expr)?;
                        self.trace_result(v)?;
                        self.text(v)?
                    }
                    None => String::new(),
                };
                self.emit_line(&text);
            }
            InstructionKind::Assignment { name, value } => {
                let v = self.evaluate(*value)?;
                self.trace_result(v)?;
                self.assign(name, v)?;
            }
            InstructionKind::Message { send } => self.message_clause(smid, *send)?,
            InstructionKind::MessageAssignment { send, value } => {
                self.assign_message(smid, *send, *value)?
            }
            InstructionKind::Call { call } => {
                let cell = self.heap.get(*call)?;
                let call = cell.expression()?.as_function_call().ok_or_else(|| {
                    ExecutionError::InvalidCode(smid, "function call expected".to_string())
                })?;
                self.call_instruction(smid, call)?;
            }
            InstructionKind::Return { value } => {
                let value = self.optional_value(*value)?;
                self.activation_mut()?.finish(value);
            }
            InstructionKind::Exit { value } => {
                let value = self.optional_value(*value)?;
                return Err(ExecutionError::Exit(value));
            }
            InstructionKind::UseArg { names } => {
                let args = self.current_args()?;
                for (i, name) in names.iter().enumerate() {
                    match args.get(i).copied().flatten() {
                        Some(value) => self.assign(name, value)?,
                        None => self.drop_variable(name)?,
                    }
                }
            }
            InstructionKind::Expose { names } => {
                let activation = self.activation_mut()?;
                if !matches!(activation.kind(), ActivationKind::Method { .. }) {
                    return Err(ExecutionError::ExposeOutsideMethod(smid));
                }
                for name in names {
                    activation.expose(name);
                }
            }
            InstructionKind::Numeric(option) => self.numeric(smid, *option)?,
            InstructionKind::If {
                subtype,
                condition,
                else_location,
            } => {
                let value = self.evaluate(*condition)?;
                self.trace_result(value)?;
                match self.logical(value)? {
                    Some(true) => {}
                    Some(false) => self.jump_past(smid, else_location.get())?,
                    None => {
                        let text = self.text(value)?;
                        return Err(match subtype {
                            IfKind::If => ExecutionError::InvalidIfValue(smid, text),
                            IfKind::When => ExecutionError::InvalidWhenValue(smid, text),
                        });
                    }
                }
            }
            InstructionKind::CaseWhen {
                candidates,
                else_location,
            } => {
                if !self.case_matches(smid, candidates)? {
                    self.jump_past(smid, else_location.get())?;
                }
            }
            InstructionKind::Then { .. } | InstructionKind::Else { .. } => {
                self.activation_mut()?.indent_by(2);
            }
            InstructionKind::EndIf {
                subtype, else_end, ..
            } => match subtype {
                EndIfKind::EndWhen => {
                    self.activation_mut()?.close_block();
                    self.jump_past(smid, else_end.get())?;
                }
                EndIfKind::EndIf => {
                    self.activation_mut()?.outdent_by(2);
                    if let Some(endelse) = else_end.get() {
                        self.jump_past(smid, Some(endelse))?;
                    }
                }
                EndIfKind::EndElse => self.activation_mut()?.outdent_by(2),
            },
            InstructionKind::Select { case, .. } => {
                let case = match case {
                    Some(expr) => {
                        let v = self.evaluate(*expr)?;
                        self.trace_result(v)?;
                        Some(v)
                    }
                    None => None,
                };
                let activation = self.activation_mut()?;
                let indent = activation.indent();
                activation.open_block(Block::Select { indent, case });
                activation.indent_by(1);
            }
            InstructionKind::Do { .. } => {
                let activation = self.activation_mut()?;
                let indent = activation.indent();
                activation.open_block(Block::Do { indent });
                activation.indent_by(1);
            }
            InstructionKind::End { .. } => {
                self.activation_mut()?.close_block();
            }
        }

        debug_assert_eq!(self.depth()?, 0, "stack not empty after {}", instruction.kind().keyword());
        Ok(())
    }

    fn optional_value(&mut self, expr: Option<ObjRef>) -> Result<Option<ObjRef>, ExecutionError> {
        match expr {
            Some(expr) => {
                let v = self.evaluate(expr)?;
                self.trace_result(v)?;
                Ok(Some(v))
            }
            None => Ok(None),
        }
    }

    /// Continue at the successor of a back-patched target
    fn jump_past(&mut self, smid: Smid, target: Option<ObjRef>) -> Result<(), ExecutionError> {
        let target = target
            .ok_or_else(|| ExecutionError::InvalidCode(smid, "unset branch target".to_string()))?;
        let next = self.heap.get(target)?.instruction()?.next();
        self.activation_mut()?.set_next(next);
        Ok(())
    }

    /// Compare candidates in order with the governing CASE value,
    /// stopping at the first strict match
    fn case_matches(&mut self, smid: Smid, candidates: &[ObjRef]) -> Result<bool, ExecutionError> {
        let case = match self.activation()?.innermost_block() {
            Some(Block::Select { case: Some(case), .. }) => *case,
            _ => {
                return Err(ExecutionError::InvalidCode(
                    smid,
                    "WHEN outside SELECT CASE".to_string(),
                ))
            }
        };
        let expected = self.text(case)?;
        for candidate in candidates {
            let value = self.evaluate(*candidate)?;
            if self.text(value)? == expected {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn numeric(&mut self, smid: Smid, option: NumericOption) -> Result<(), ExecutionError> {
        let settings = self.activation()?.settings();
        match option {
            NumericOption::Digits(expr) => {
                let digits = match expr {
                    None => DEFAULT_DIGITS,
                    Some(expr) => {
                        let text = self.evaluate_text(expr)?;
                        match parse_whole(&text) {
                            Some(n) if n > 0 => n as usize,
                            _ => return Err(ExecutionError::InvalidDigits(smid, text)),
                        }
                    }
                };
                if digits <= settings.fuzz {
                    return Err(ExecutionError::DigitsNotAboveFuzz(smid, digits, settings.fuzz));
                }
                self.activation_mut()?.settings_mut().digits = digits;
                self.trace(TraceRecord::Setting {
                    name: "DIGITS",
                    value: digits.to_string(),
                });
            }
            NumericOption::Fuzz(expr) => {
                let fuzz = match expr {
                    None => DEFAULT_FUZZ,
                    Some(expr) => {
                        let text = self.evaluate_text(expr)?;
                        match parse_whole(&text) {
                            Some(n) if n >= 0 => n as usize,
                            _ => return Err(ExecutionError::InvalidFuzz(smid, text)),
                        }
                    }
                };
                if fuzz >= settings.digits {
                    return Err(ExecutionError::FuzzNotBelowDigits(smid, fuzz, settings.digits));
                }
                self.activation_mut()?.settings_mut().fuzz = fuzz;
                self.trace(TraceRecord::Setting {
                    name: "FUZZ",
                    value: fuzz.to_string(),
                });
            }
            NumericOption::Form(form) => {
                let form = match form {
                    FormOption::Default | FormOption::Scientific => NumericForm::Scientific,
                    FormOption::Engineering => NumericForm::Engineering,
                    FormOption::Value(expr) => {
                        let text = self.evaluate_text(expr)?;
                        match text.trim_matches(' ').to_uppercase().as_str() {
                            "SCIENTIFIC" => NumericForm::Scientific,
                            "ENGINEERING" => NumericForm::Engineering,
                            _ => return Err(ExecutionError::InvalidForm(smid, text)),
                        }
                    }
                };
                self.activation_mut()?.settings_mut().form = form;
                self.trace(TraceRecord::Setting {
                    name: "FORM",
                    value: form.to_string(),
                });
            }
        }
        Ok(())
    }

    fn evaluate_text(&mut self, expr: ObjRef) -> Result<String, ExecutionError> {
        let value = self.evaluate(expr)?;
        self.trace_result(value)?;
        self.text(value)
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::eval::{
        code::{
            builder::{CodeBlock, CodeBuilder},
            package::PackageBuilder,
        },
        emit::{lines, CapturingEmitter},
        expr::expression::BinaryOp,
        machine::vm::MachineSettings,
        trace::CapturingTracer,
    };

    fn machine() -> Machine<'static> {
        let mut m =
            Machine::new(Box::new(CapturingEmitter::default()), MachineSettings::default()).unwrap();
        m.set_tracer(Box::new(CapturingTracer::default()));
        m
    }

    fn say(builder: &mut CodeBuilder, text: &str) {
        let value = builder.view().literal(text).unwrap();
        builder
            .instruction(Smid::default(), InstructionKind::Say { value: Some(value) })
            .unwrap();
    }

    fn run(m: &mut Machine, block: CodeBlock) -> Result<Vec<String>, ExecutionError> {
        let mut package = PackageBuilder::new(m.heap(), "test");
        package.main(block);
        let package = package.finish().unwrap();
        m.run_package(package, &[])?;
        Ok(lines(m.captures()))
    }

    fn indents(m: &Machine) -> Vec<usize> {
        m.trace_records()
            .iter()
            .filter_map(|r| match r {
                TraceRecord::Instruction { indent, .. } => Some(*indent),
                _ => None,
            })
            .collect()
    }

    #[test]
    pub fn test_false_condition_takes_else() {
        let mut m = machine();
        let heap = m.heap();
        let mut builder = CodeBuilder::new(heap);
        let view = builder.view();
        let one = view.literal("1").unwrap();
        let two = view.literal("2").unwrap();
        let condition = view.binary(Smid::default(), BinaryOp::Equal, one, two).unwrap();
        builder.if_(Smid::default(), condition).unwrap();
        builder.then_(Smid::default()).unwrap();
        say(&mut builder, "A");
        builder.else_(Smid::default()).unwrap();
        say(&mut builder, "B");
        say(&mut builder, "C");

        let block = builder.finish().unwrap();

        assert_eq!(run(&mut m, block).unwrap(), vec!["B", "C"]);
        // IF, ELSE, SAY, END(else), SAY
        assert_eq!(indents(&m), vec![0, 0, 2, 2, 0]);
    }

    #[test]
    pub fn test_true_condition_skips_else() {
        let mut m = machine();
        let heap = m.heap();
        let mut builder = CodeBuilder::new(heap);
        let condition = builder.view().literal(" 1 ").unwrap();
        builder.if_(Smid::default(), condition).unwrap();
        builder.then_(Smid::default()).unwrap();
        say(&mut builder, "A");
        builder.else_(Smid::default()).unwrap();
        say(&mut builder, "B");
        say(&mut builder, "C");

        let block = builder.finish().unwrap();

        assert_eq!(run(&mut m, block).unwrap(), vec!["A", "C"]);
        assert_eq!(indents(&m), vec![0, 0, 2, 2, 0]);
    }

    #[test]
    pub fn test_invalid_condition() {
        let mut m = machine();
        let heap = m.heap();
        let mut builder = CodeBuilder::new(heap);
        let condition = builder.view().literal("yes").unwrap();
        builder.if_(Smid::default(), condition).unwrap();
        builder.then_(Smid::default()).unwrap();
        say(&mut builder, "A");
        let block = builder.finish().unwrap();
        let err = run(&mut m, block).unwrap_err();
        assert_eq!(err.code().to_string(), "34.1");
        assert!(err.activation_trace().is_some());
    }

    #[test]
    pub fn test_select_case_otherwise_runs_once() {
        let mut m = machine();
        let heap = m.heap();
        let mut builder = CodeBuilder::new(heap);
        let view = builder.view();
        let v = view.literal("c").unwrap();
        let a = view.literal("a").unwrap();
        let b = view.literal("b").unwrap();
        builder.select(Smid::default(), Some(v)).unwrap();
        builder.case_when(Smid::default(), vec![a]).unwrap();
        builder.then_(Smid::default()).unwrap();
        say(&mut builder, "A");
        builder.case_when(Smid::default(), vec![b]).unwrap();
        builder.then_(Smid::default()).unwrap();
        say(&mut builder, "B");
        builder.otherwise(Smid::default()).unwrap();
        say(&mut builder, "other");
        builder.end_(Smid::default()).unwrap();
        say(&mut builder, "after");

        let block = builder.finish().unwrap();

        assert_eq!(run(&mut m, block).unwrap(), vec!["other", "after"]);
        // SELECT, WHEN, WHEN, OTHERWISE, SAY, END, SAY
        assert_eq!(indents(&m), vec![0, 1, 1, 1, 1, 1, 0]);
    }

    #[test]
    pub fn test_matched_when_skips_rest() {
        let mut m = machine();
        let heap = m.heap();
        let mut builder = CodeBuilder::new(heap);
        let view = builder.view();
        let t = view.literal("1").unwrap();
        let f = view.literal("0").unwrap();
        builder.select(Smid::default(), None).unwrap();
        builder.when(Smid::default(), f).unwrap();
        builder.then_(Smid::default()).unwrap();
        say(&mut builder, "first");
        builder.when(Smid::default(), t).unwrap();
        builder.then_(Smid::default()).unwrap();
        say(&mut builder, "second");
        builder.otherwise(Smid::default()).unwrap();
        say(&mut builder, "other");
        builder.end_(Smid::default()).unwrap();
        say(&mut builder, "after");

        let block = builder.finish().unwrap();

        assert_eq!(run(&mut m, block).unwrap(), vec!["second", "after"]);
        let last = *indents(&m).last().unwrap();
        assert_eq!(last, 0);
    }

    #[test]
    pub fn test_unmatched_select_falls_through() {
        let mut m = machine();
        let heap = m.heap();
        let mut builder = CodeBuilder::new(heap);
        let f = builder.view().literal("0").unwrap();
        builder.select(Smid::default(), None).unwrap();
        builder.when(Smid::default(), f).unwrap();
        builder.then_(Smid::default()).unwrap();
        say(&mut builder, "never");
        builder.end_(Smid::default()).unwrap();
        say(&mut builder, "after");

        let block = builder.finish().unwrap();

        assert_eq!(run(&mut m, block).unwrap(), vec!["after"]);
    }

    #[test]
    pub fn test_numeric_settings_guard() {
        let mut m = machine();
        let heap = m.heap();
        let mut builder = CodeBuilder::new(heap);
        let view = builder.view();
        let five = view.literal("5").unwrap();
        let digits = view
            .function_call(Smid::default(), "DIGITS", false, crate::eval::machine::builtins::lookup("DIGITS"), vec![])
            .unwrap();
        builder
            .instruction(Smid::default(), InstructionKind::Numeric(NumericOption::Fuzz(Some(five))))
            .unwrap();
        builder
            .instruction(Smid::default(), InstructionKind::Say { value: Some(digits) })
            .unwrap();
        builder
            .instruction(
                Smid::default(),
                InstructionKind::Numeric(NumericOption::Digits(Some(five))),
            )
            .unwrap();

        let block = builder.finish().unwrap();

        let err = run(&mut m, block).unwrap_err();
        assert_eq!(err.code().to_string(), "33.1");
        assert_eq!(lines(m.captures()), vec!["9"]);
        assert!(m.trace_records().contains(&TraceRecord::Setting {
            name: "FUZZ",
            value: "5".to_string()
        }));
    }

    #[test]
    pub fn test_exit_ends_program_with_value() {
        let mut m = machine();
        let heap = m.heap();
        let mut builder = CodeBuilder::new(heap);
        let value = builder.view().literal("7").unwrap();
        builder
            .instruction(Smid::default(), InstructionKind::Exit { value: Some(value) })
            .unwrap();
        say(&mut builder, "unreached");
        let block = builder.finish().unwrap();
        let mut package = PackageBuilder::new(m.heap(), "test");
        package.main(block);
        let package = package.finish().unwrap();

        let result = m.run_package(package, &[]).unwrap().unwrap();
        assert_eq!(m.text(result).unwrap(), "7");
        assert!(lines(m.captures()).is_empty());
    }

    #[test]
    pub fn test_expose_outside_method() {
        let mut m = machine();
        let heap = m.heap();
        let mut builder = CodeBuilder::new(heap);
        builder
            .instruction(
                Smid::default(),
                InstructionKind::Expose {
                    names: vec!["X".to_string()],
                },
            )
            .unwrap();
        let block = builder.finish().unwrap();
        assert_eq!(run(&mut m, block).unwrap_err().code().to_string(), "17.1");
    }
}
