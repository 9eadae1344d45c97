//! Function-call resolution and dispatch
//!
//! A call site resolves once: an internal label filled at parse time,
//! then a builtin chosen by the parser, then a full external search
//! whose success is memoized on the call site.

use crate::{
    common::sourcemap::Smid,
    eval::{
        code::package::RoutineBody,
        error::{suggest_similar, ExecutionError},
        machine::{activation::Activation, builtins, vm::Machine},
        memory::object::ObjRef,
    },
};

use super::expression::FunctionCall;

impl<'a> Machine<'a> {
    /// Evaluate a function call, leaving its (required) result
    pub(crate) fn call_function(
        &mut self,
        smid: Smid,
        call: &FunctionCall,
    ) -> Result<(), ExecutionError> {
        let depth = self.depth()?;
        let result = self.call_with_arguments(smid, call)?;
        self.truncate(depth)?;
        match result {
            Some(value) => self.push(value),
            None => Err(ExecutionError::NoFunctionResult(
                smid,
                call.name().to_string(),
            )),
        }
    }

    /// Evaluate arguments onto the stack and invoke; the arguments
    /// stay on the stack (and so stay rooted) until the caller
    /// truncates
    pub(crate) fn call_with_arguments(
        &mut self,
        smid: Smid,
        call: &FunctionCall,
    ) -> Result<Option<ObjRef>, ExecutionError> {
        self.push_arguments(call.args())?;
        let args = self.top_slots(smid, call.args().len())?;
        self.invoke_call(smid, call, args)
    }

    pub(crate) fn invoke_call(
        &mut self,
        smid: Smid,
        call: &FunctionCall,
        args: Vec<Option<ObjRef>>,
    ) -> Result<Option<ObjRef>, ExecutionError> {
        if let Some(label) = call.internal_label() {
            return self.call_internal(smid, label, args);
        }
        if let Some(routine) = call.external_routine() {
            return self.call_routine(smid, call.name(), routine, args);
        }
        if let Some(index) = call.builtin() {
            let builtin = builtins::BUILTINS.get(index).ok_or_else(|| {
                ExecutionError::InvalidCode(smid, format!("no builtin {}", index))
            })?;
            return (builtin.function)(self, smid, &args).map(Some);
        }

        self.metrics.resolution_search();
        match self.find_routine(call.name())? {
            Some(routine) => {
                self.log_search(smid, call.name(), true);
                call.resolve_external(routine);
                self.call_routine(smid, call.name(), routine, args)
            }
            None => {
                self.log_search(smid, call.name(), false);
                let candidates = self.visible_routine_names()?;
                Err(ExecutionError::RoutineNotFound(
                    smid,
                    call.name().to_string(),
                    suggest_similar(call.name(), &candidates, 2),
                ))
            }
        }
    }

    /// The unit's own routines, then public routines of loaded
    /// packages, then host library routines
    pub(crate) fn find_routine(&self, name: &str) -> Result<Option<ObjRef>, ExecutionError> {
        let own = self.activation()?.package();
        if let Some(package) = own {
            if let Some(r) = self.package_routine(package, name, false)? {
                return Ok(Some(r));
            }
        }
        for package in &self.state.packages {
            if Some(*package) == own {
                continue;
            }
            if let Some(r) = self.package_routine(*package, name, true)? {
                return Ok(Some(r));
            }
        }
        Ok(self.state.host_routines.get(name).map(|(r, _)| *r))
    }

    fn package_routine(
        &self,
        package: ObjRef,
        name: &str,
        public_only: bool,
    ) -> Result<Option<ObjRef>, ExecutionError> {
        let cell = self.heap.get(package)?;
        for r in cell.package()?.routines() {
            let routine = self.heap.get(*r)?;
            let routine = routine.routine()?;
            if routine.name() == name && (routine.is_public() || !public_only) {
                return Ok(Some(*r));
            }
        }
        Ok(None)
    }

    fn visible_routine_names(&self) -> Result<Vec<String>, ExecutionError> {
        let mut names = builtins::names();
        let mut packages: Vec<ObjRef> = self.activation()?.package().into_iter().collect();
        packages.extend(self.state.packages.iter().copied());
        for package in packages {
            let cell = self.heap.get(package)?;
            for r in cell.package()?.routines() {
                names.push(self.heap.get(*r)?.routine()?.name().to_string());
            }
        }
        names.extend(self.state.host_routines.keys().cloned());
        Ok(names)
    }

    /// Call a label in the current unit; the callee shares variables
    pub(crate) fn call_internal(
        &mut self,
        smid: Smid,
        label: ObjRef,
        args: Vec<Option<ObjRef>>,
    ) -> Result<Option<ObjRef>, ExecutionError> {
        let activation = Activation::internal(self.activation()?, label, args);
        self.run_activation(smid, activation)
    }

    pub(crate) fn call_routine(
        &mut self,
        smid: Smid,
        name: &str,
        routine: ObjRef,
        args: Vec<Option<ObjRef>>,
    ) -> Result<Option<ObjRef>, ExecutionError> {
        let cell = self.heap.get(routine)?;
        match cell.routine()?.body() {
            RoutineBody::Code { entry, package } => {
                let activation =
                    Activation::routine(package.get(), *entry, args, self.settings());
                self.run_activation(smid, activation)
            }
            RoutineBody::Host => {
                let function = self.host_function(cell.routine()?.name()).ok_or_else(|| {
                    ExecutionError::RoutineNotFound(smid, name.to_string(), vec![])
                })?;
                let mut values = Vec::with_capacity(args.len());
                for arg in &args {
                    values.push(match arg {
                        Some(r) => Some(self.text(*r)?),
                        None => None,
                    });
                }
                match function(&values) {
                    Ok(Some(text)) => self.new_string(text).map(Some),
                    Ok(None) => Ok(None),
                    Err(message) => Err(ExecutionError::IncorrectCall(
                        smid,
                        name.to_string(),
                        message,
                    )),
                }
            }
        }
    }

    /// The CALL instruction: a missing result drops `RESULT`
    pub(crate) fn call_instruction(
        &mut self,
        smid: Smid,
        call: &FunctionCall,
    ) -> Result<(), ExecutionError> {
        let depth = self.depth()?;
        let result = self.call_with_arguments(smid, call)?;
        self.truncate(depth)?;
        match result {
            Some(value) => self.assign("RESULT", value),
            None => self.drop_variable("RESULT"),
        }
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::eval::{
        code::{
            builder::CodeBuilder,
            instruction::InstructionKind,
            package::PackageBuilder,
        },
        emit::NullEmitter,
        machine::vm::MachineSettings,
        memory::mutator::MutatorHeapView,
    };

    fn machine() -> Machine<'static> {
        Machine::new(Box::new(NullEmitter), MachineSettings::default()).unwrap()
    }

    /// A package with `::ROUTINE TWICE` returning `ARG(1) || ARG(1)`
    fn library(m: &Machine, public: bool) -> ObjRef {
        let heap = m.heap();
        let mut builder = CodeBuilder::new(heap);
        let view = builder.view();
        let one = view.literal("1").unwrap();
        let arg = view
            .function_call(Smid::default(), "ARG", false, builtins::lookup("ARG"), vec![Some(one)])
            .unwrap();
        let twice = view
            .binary(
                Smid::default(),
                crate::eval::expr::expression::BinaryOp::Concat,
                arg,
                arg,
            )
            .unwrap();
        builder
            .instruction(Smid::default(), InstructionKind::Return { value: Some(twice) })
            .unwrap();
        let block = builder.finish().unwrap();

        let mut package = PackageBuilder::new(heap, "library");
        package.routine("twice", public, block).unwrap();
        package.finish().unwrap()
    }

    #[test]
    pub fn test_external_resolution_is_memoized() {
        let mut m = machine();
        let lib = library(&m, true);
        m.load(lib).unwrap();

        let view = MutatorHeapView::new(m.heap());
        let x = view.literal("ab").unwrap();
        let call = view
            .function_call(Smid::default(), "TWICE", false, None, vec![Some(x)])
            .unwrap();

        for _ in 0..2 {
            let v = m.evaluate(call).unwrap();
            assert_eq!(m.text(v).unwrap(), "abab");
        }
        assert_eq!(m.metrics().resolution_searches(), 1);
        let cell = m.heap().get(call).unwrap();
        assert!(cell.expression().unwrap().as_function_call().unwrap().external_routine().is_some());
    }

    #[test]
    pub fn test_private_routines_are_not_exported() {
        let mut m = machine();
        let lib = library(&m, false);
        m.load(lib).unwrap();

        let view = MutatorHeapView::new(m.heap());
        let call = view
            .function_call(Smid::default(), "TWICE", false, None, vec![])
            .unwrap();
        let err = m.evaluate(call).unwrap_err();
        assert_eq!(err.code().to_string(), "43.1");
    }

    #[test]
    pub fn test_not_found_suggests_builtins() {
        let mut m = machine();
        let view = MutatorHeapView::new(m.heap());
        let call = view
            .function_call(Smid::default(), "LENGHT", false, None, vec![])
            .unwrap();
        match m.evaluate(call).unwrap_err() {
            ExecutionError::RoutineNotFound(_, name, suggestions) => {
                assert_eq!(name, "LENGHT");
                assert_eq!(suggestions, vec!["LENGTH".to_string()]);
            }
            e => panic!("unexpected error {:?}", e),
        }
    }

    #[test]
    pub fn test_host_routines_are_found_last() {
        fn shout(args: &[Option<String>]) -> Result<Option<String>, String> {
            match args.first() {
                Some(Some(s)) => Ok(Some(s.to_uppercase())),
                _ => Err("argument required".to_string()),
            }
        }

        let mut m = machine();
        m.register_host_routine("shout", shout).unwrap();
        let view = MutatorHeapView::new(m.heap());
        let hi = view.literal("hi").unwrap();
        let call = view
            .function_call(Smid::default(), "SHOUT", false, None, vec![Some(hi)])
            .unwrap();
        let bare = view
            .function_call(Smid::default(), "SHOUT", false, None, vec![None])
            .unwrap();
        let v = m.evaluate(call).unwrap();
        assert_eq!(m.text(v).unwrap(), "HI");
        assert_eq!(m.evaluate(bare).unwrap_err().code().to_string(), "40.1");
    }

    #[test]
    pub fn test_missing_function_result() {
        let mut m = machine();
        let heap = m.heap();
        let mut builder = CodeBuilder::new(heap);
        builder
            .instruction(Smid::default(), InstructionKind::Return { value: None })
            .unwrap();
        let block = builder.finish().unwrap();
        let mut package = PackageBuilder::new(heap, "p");
        package.routine("nothing", true, block).unwrap();
        let p = package.finish().unwrap();
        m.load(p).unwrap();

        let view = MutatorHeapView::new(m.heap());
        let call = view
            .function_call(Smid::default(), "NOTHING", false, None, vec![])
            .unwrap();
        let depth = m.depth().unwrap();
        assert_eq!(m.evaluate(call).unwrap_err().code().to_string(), "44.1");
        assert_eq!(m.depth().unwrap(), depth);
    }
}
