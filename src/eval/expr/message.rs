//! Message sends
//!
//! Method lookup starts at the receiver's class, or at the scope
//! override when one is given, and walks superclasses. The target
//! and arguments stay on the sender's stack until the send completes;
//! the scope's slot is discarded once it has been checked.

use crate::{
    common::sourcemap::Smid,
    eval::{
        error::{suggest_similar, ExecutionError},
        machine::{
            activation::Activation,
            builtins,
            classes::{Instance, MethodKind, NativeMethod},
            vm::Machine,
        },
        memory::object::{HeapObject, ObjRef},
    },
};

use super::expression::MessageSend;

impl<'a> Machine<'a> {
    /// Evaluate a message term, leaving its value (or its target
    /// for a cascade)
    pub(crate) fn send_message(
        &mut self,
        smid: Smid,
        send: &MessageSend,
    ) -> Result<(), ExecutionError> {
        let depth = self.depth()?;
        let outcome = self.dispatch(smid, send, None);
        self.truncate(depth)?;
        let (target, result) = outcome?;

        if send.is_cascade() {
            return self.push(target);
        }
        match result {
            Some(value) => self.push(value),
            None => Err(ExecutionError::NoMessageResult(
                smid,
                send.verb().to_string(),
            )),
        }
    }

    /// A message instruction: the value of the term becomes `RESULT`
    pub(crate) fn message_clause(&mut self, smid: Smid, send: ObjRef) -> Result<(), ExecutionError> {
        let cell = self.heap.get(send)?;
        let send = message_send(smid, cell.expression()?.as_message_send())?;

        let depth = self.depth()?;
        let outcome = self.dispatch(smid, send, None);
        self.truncate(depth)?;
        let (target, result) = outcome?;

        let result = if send.is_cascade() {
            Some(target)
        } else {
            result
        };
        match result {
            Some(value) => self.assign("RESULT", value),
            None => self.drop_variable("RESULT"),
        }
    }

    /// `target~name = value`: the value is passed before any
    /// arguments and any result is discarded
    pub(crate) fn assign_message(
        &mut self,
        smid: Smid,
        send: ObjRef,
        value: ObjRef,
    ) -> Result<(), ExecutionError> {
        let cell = self.heap.get(send)?;
        let send = message_send(smid, cell.expression()?.as_message_send())?;

        let depth = self.depth()?;
        let outcome = self.dispatch(smid, send, Some(value));
        self.truncate(depth)?;
        outcome.map(|_| ())
    }

    /// Evaluate target, scope, optional assigned value and arguments
    /// onto the stack and send
    fn dispatch(
        &mut self,
        smid: Smid,
        send: &MessageSend,
        value: Option<ObjRef>,
    ) -> Result<(ObjRef, Option<ObjRef>), ExecutionError> {
        self.push_expression(send.target())?;
        let target = self.top(smid)?;

        let scope = match send.scope() {
            Some(expr) => {
                self.push_expression(expr)?;
                let scope = self.pop(smid)?;
                self.check_scope(smid, target, scope)?;
                Some(scope)
            }
            None => None,
        };

        let mut args = Vec::with_capacity(send.args().len() + 1);
        if let Some(expr) = value {
            self.push_expression(expr)?;
            args.push(Some(self.top(smid)?));
        }
        self.push_arguments(send.args())?;
        args.extend(self.top_slots(smid, send.args().len())?);

        let result = self.send(smid, target, send.verb(), scope, args)?;
        Ok((target, result))
    }

    /// Send a message to an evaluated receiver
    pub fn send(
        &mut self,
        smid: Smid,
        receiver: ObjRef,
        message: &str,
        scope: Option<ObjRef>,
        args: Vec<Option<ObjRef>>,
    ) -> Result<Option<ObjRef>, ExecutionError> {
        let start = match scope {
            Some(scope) => {
                self.check_scope(smid, receiver, scope)?;
                scope
            }
            None => self.class_of(receiver)?,
        };

        match self.find_method(start, message)? {
            Some(method) => self.invoke_method(smid, receiver, method, args),
            None => {
                let candidates = self.method_names(start)?;
                Err(ExecutionError::UnknownMethod(
                    smid,
                    self.text(receiver)?,
                    message.to_string(),
                    suggest_similar(message, &candidates, 2),
                ))
            }
        }
    }

    /// A scope override must be a class in the receiver's hierarchy
    fn check_scope(&self, smid: Smid, receiver: ObjRef, scope: ObjRef) -> Result<(), ExecutionError> {
        let class = self.class_of(receiver)?;
        if self.heap.get(scope)?.class().is_ok() && self.is_ancestor(class, scope)? {
            Ok(())
        } else {
            Err(ExecutionError::InvalidScopeOverride(
                smid,
                self.text(scope)?,
                self.text(receiver)?,
            ))
        }
    }

    /// Search a class and its superclasses for a method
    pub(crate) fn find_method(
        &self,
        class: ObjRef,
        message: &str,
    ) -> Result<Option<ObjRef>, ExecutionError> {
        let mut current = Some(class);
        while let Some(c) = current {
            let cell = self.heap.get(c)?;
            let class = cell.class()?;
            if let Some(method) = class.method(message) {
                return Ok(Some(method));
            }
            current = class.superclass();
        }
        Ok(None)
    }

    /// Whether `ancestor` is `class` or one of its superclasses
    pub(crate) fn is_ancestor(&self, class: ObjRef, ancestor: ObjRef) -> Result<bool, ExecutionError> {
        let mut current = Some(class);
        while let Some(c) = current {
            if c == ancestor {
                return Ok(true);
            }
            current = self.heap.get(c)?.class()?.superclass();
        }
        Ok(false)
    }

    fn method_names(&self, class: ObjRef) -> Result<Vec<String>, ExecutionError> {
        let mut names = vec![];
        let mut current = Some(class);
        while let Some(c) = current {
            let cell = self.heap.get(c)?;
            names.extend(cell.class()?.method_names());
            current = cell.class()?.superclass();
        }
        Ok(names)
    }

    pub(crate) fn invoke_method(
        &mut self,
        smid: Smid,
        receiver: ObjRef,
        method: ObjRef,
        args: Vec<Option<ObjRef>>,
    ) -> Result<Option<ObjRef>, ExecutionError> {
        let cell = self.heap.get(method)?;
        let method = cell.method()?;
        match method.kind() {
            MethodKind::Native(native) => self.run_native(smid, *native, receiver, &args).map(Some),
            MethodKind::Code { entry, package } => {
                let scope = method.scope().unwrap_or(self.known.object);
                let activation = Activation::method(
                    receiver,
                    scope,
                    package.get(),
                    *entry,
                    args,
                    self.settings(),
                );
                self.run_activation(smid, activation)
            }
            MethodKind::Getter(variable) => {
                let value = match self.heap.get(receiver)?.body() {
                    HeapObject::Instance(i) => i.variable(variable),
                    _ => None,
                };
                match value {
                    Some(value) => Ok(Some(value)),
                    None => Ok(Some(self.heap.intern(variable)?)),
                }
            }
            MethodKind::Setter(variable) => {
                let value = native_arg(smid, method.name(), &args, 0)?;
                let receiver = self.heap.get(receiver)?;
                receiver.instance()?.set_variable(variable, value);
                Ok(None)
            }
        }
    }

    fn run_native(
        &mut self,
        smid: Smid,
        native: NativeMethod,
        receiver: ObjRef,
        args: &[Option<ObjRef>],
    ) -> Result<ObjRef, ExecutionError> {
        let name = native.message();
        match native {
            NativeMethod::ObjectClass => self.class_of(receiver),
            NativeMethod::ObjectString | NativeMethod::ObjectName => {
                let text = self.text(receiver)?;
                self.new_string(text)
            }
            NativeMethod::ObjectIdentical | NativeMethod::ObjectStrictIdentical => {
                let other = native_arg(smid, name, args, 0)?;
                Ok(self.known.boolean(receiver == other))
            }
            NativeMethod::ObjectIsA => {
                let class = native_arg(smid, name, args, 0)?;
                if self.heap.get(class)?.class().is_err() {
                    return Err(ExecutionError::IncorrectCall(
                        smid,
                        name.to_string(),
                        format!("argument 1 must be a class; found \"{}\"", self.text(class)?),
                    ));
                }
                let own = self.class_of(receiver)?;
                Ok(self.known.boolean(self.is_ancestor(own, class)?))
            }
            NativeMethod::StringLength => {
                let text = self.text(receiver)?;
                self.new_string(text.chars().count().to_string())
            }
            NativeMethod::StringReverse => {
                let text = self.text(receiver)?;
                self.new_string(text.chars().rev().collect::<String>())
            }
            NativeMethod::StringUpper => {
                let text = self.text(receiver)?;
                self.new_string(text.to_uppercase())
            }
            NativeMethod::StringLower => {
                let text = self.text(receiver)?;
                self.new_string(text.to_lowercase())
            }
            NativeMethod::StringWords => {
                let text = self.text(receiver)?;
                self.new_string(text.split_whitespace().count().to_string())
            }
            NativeMethod::StringSubstr => {
                let text = self.text(receiver)?;
                let result = builtins::substr_args(self, smid, &text, args)?;
                self.new_string(result)
            }
            NativeMethod::StringConcat => {
                let other = native_arg(smid, name, args, 0)?;
                let joined = self.text(receiver)? + &self.text(other)?;
                self.new_string(joined)
            }
            NativeMethod::ClassNew => self.instantiate(smid, receiver, args),
            NativeMethod::ClassName | NativeMethod::ClassId => {
                let name = self.heap.get(receiver)?.class()?.name().to_string();
                self.new_string(name)
            }
            NativeMethod::ClassSuperclass => Ok(self
                .heap
                .get(receiver)?
                .class()?
                .superclass()
                .unwrap_or(self.known.nil)),
        }
    }

    /// `NEW`: strings are made from their first argument; other
    /// classes get an instance which is sent `INIT` when defined
    fn instantiate(
        &mut self,
        smid: Smid,
        class: ObjRef,
        args: &[Option<ObjRef>],
    ) -> Result<ObjRef, ExecutionError> {
        if class == self.known.string {
            let text = match args.first().copied().flatten() {
                Some(r) => self.text(r)?,
                None => String::new(),
            };
            return self.new_string(text);
        }

        self.heap.get(class)?.class()?;
        self.metrics.alloc(1);
        let instance = self.heap.alloc(HeapObject::Instance(Instance::new(class)))?;

        // rooted on the stack while INIT runs
        let depth = self.depth()?;
        self.push(instance)?;
        let outcome = match self.find_method(class, "INIT")? {
            Some(init) => self.invoke_method(smid, instance, init, args.to_vec()).map(|_| ()),
            None => Ok(()),
        };
        self.truncate(depth)?;
        outcome.map(|_| instance)
    }
}

fn message_send(smid: Smid, send: Option<&MessageSend>) -> Result<&MessageSend, ExecutionError> {
    send.ok_or_else(|| ExecutionError::InvalidCode(smid, "message send expected".to_string()))
}

fn native_arg(
    smid: Smid,
    name: &str,
    args: &[Option<ObjRef>],
    i: usize,
) -> Result<ObjRef, ExecutionError> {
    args.get(i).copied().flatten().ok_or_else(|| {
        ExecutionError::IncorrectCall(smid, name.to_string(), format!("missing argument {}", i + 1))
    })
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::common::sourcemap::SourceMap;
    use crate::syntax::parse_package;
    use crate::eval::{
        code::{builder::CodeBuilder, instruction::InstructionKind, package::PackageBuilder},
        emit::NullEmitter,
        expr::expression::Special,
        machine::vm::MachineSettings,
        memory::mutator::MutatorHeapView,
    };

    fn machine() -> Machine<'static> {
        Machine::new(Box::new(NullEmitter), MachineSettings::default()).unwrap()
    }

    fn eval_text(m: &mut Machine, expr: ObjRef) -> String {
        let v = m.evaluate(expr).unwrap();
        m.text(v).unwrap()
    }

    #[test]
    pub fn test_new_restores_stack_depth() {
        let mut m = machine();
        let mut map = SourceMap::new();
        let text = "::class point\n::attribute x\n::method init\n  use arg v\n  self~x = v";
        let package = parse_package(m.heap(), &mut map, 0, text, "test").unwrap();
        m.load(package).unwrap();
        let class = m.heap().get(package).unwrap().package().unwrap().classes()[0];
        let seven = m.new_string("7").unwrap();

        let depth = m.depth().unwrap();
        let point = m
            .send(Smid::default(), class, "NEW", None, vec![Some(seven)])
            .unwrap()
            .unwrap();
        assert_eq!(m.depth().unwrap(), depth);
        let x = m.send(Smid::default(), point, "X", None, vec![]).unwrap().unwrap();
        assert_eq!(m.text(x).unwrap(), "7");

        let object = m.known().object;
        m.send(Smid::default(), object, "NEW", None, vec![]).unwrap();
        assert_eq!(m.depth().unwrap(), depth);
    }

    #[test]
    pub fn test_cascade_yields_target() {
        let mut m = machine();
        let view = MutatorHeapView::new(m.heap());
        let abc = view.literal("abc").unwrap();
        let plain = view
            .message_send(Smid::default(), abc, "length", None, vec![], false)
            .unwrap();
        let cascade = view
            .message_send(Smid::default(), abc, "length", None, vec![], true)
            .unwrap();

        let depth = m.depth().unwrap();
        m.push_expression(plain).unwrap();
        assert_eq!(m.depth().unwrap(), depth + 1);
        let v = m.pop(Smid::default()).unwrap();
        assert_eq!(m.text(v).unwrap(), "3");

        m.push_expression(cascade).unwrap();
        assert_eq!(m.depth().unwrap(), depth + 1);
        let v = m.pop(Smid::default()).unwrap();
        assert_eq!(m.text(v).unwrap(), "abc");
    }

    #[test]
    pub fn test_scope_override() {
        let mut m = machine();
        let view = MutatorHeapView::new(m.heap());
        let abc = view.literal("abc").unwrap();
        let object = view.environment(Smid::default(), "object").unwrap();
        let class = view.environment(Smid::default(), "class").unwrap();
        let inherited = view
            .message_send(Smid::default(), abc, "string", Some(object), vec![], false)
            .unwrap();
        let skipped = view
            .message_send(Smid::default(), abc, "length", Some(object), vec![], false)
            .unwrap();
        let foreign = view
            .message_send(Smid::default(), abc, "string", Some(class), vec![], false)
            .unwrap();

        assert_eq!(eval_text(&mut m, inherited), "abc");
        assert_eq!(m.evaluate(skipped).unwrap_err().code().to_string(), "97.1");
        let depth = m.depth().unwrap();
        assert_eq!(m.evaluate(foreign).unwrap_err().code().to_string(), "98.1");
        assert_eq!(m.depth().unwrap(), depth);
    }

    #[test]
    pub fn test_unknown_method_suggests() {
        let mut m = machine();
        let view = MutatorHeapView::new(m.heap());
        let abc = view.literal("abc").unwrap();
        let send = view
            .message_send(Smid::default(), abc, "lenght", None, vec![], false)
            .unwrap();
        match m.evaluate(send).unwrap_err() {
            ExecutionError::UnknownMethod(_, receiver, message, suggestions) => {
                assert_eq!(receiver, "abc");
                assert_eq!(message, "LENGHT");
                assert_eq!(suggestions, vec!["LENGTH".to_string()]);
            }
            e => panic!("unexpected error {:?}", e),
        }
    }

    #[test]
    pub fn test_string_methods() {
        let mut m = machine();
        let view = MutatorHeapView::new(m.heap());
        let text = view.literal("the quick fox").unwrap();
        let five = view.literal("5").unwrap();
        let three = view.literal("3").unwrap();
        let words = view
            .message_send(Smid::default(), text, "words", None, vec![], false)
            .unwrap();
        let substr = view
            .message_send(
                Smid::default(),
                text,
                "substr",
                None,
                vec![Some(five), Some(three)],
                false,
            )
            .unwrap();
        let upper = view
            .message_send(Smid::default(), substr, "upper", None, vec![], false)
            .unwrap();
        assert_eq!(eval_text(&mut m, words), "3");
        assert_eq!(eval_text(&mut m, upper), "QUI");
    }

    /// `::CLASS COUNTER` with `::ATTRIBUTE VALUE` and `::METHOD ME`
    /// returning SELF
    fn counter(m: &Machine) -> ObjRef {
        let heap = m.heap();
        let mut body = CodeBuilder::new(heap);
        let me = body.view().special(Smid::default(), Special::SelfRef).unwrap();
        body.instruction(Smid::default(), InstructionKind::Return { value: Some(me) })
            .unwrap();
        let body = body.finish().unwrap();

        let mut package = PackageBuilder::new(heap, "counter");
        let class = package.class(Smid::default(), "counter", None).unwrap();
        package.attribute(class, "value").unwrap();
        package.method(class, "me", body).unwrap();
        package.finish().unwrap()
    }

    #[test]
    pub fn test_instances_and_attributes() {
        let mut m = machine();
        let package = counter(&m);
        m.load(package).unwrap();

        let view = MutatorHeapView::new(m.heap());
        let five = view.literal("5").unwrap();
        let class = view.environment(Smid::default(), "counter").unwrap();
        let new = view
            .message_send(Smid::default(), class, "new", None, vec![], false)
            .unwrap();
        let unset = view
            .message_send(Smid::default(), new, "value", None, vec![], false)
            .unwrap();
        let set = view
            .message_send(Smid::default(), new, "value=", None, vec![Some(five)], true)
            .unwrap();
        let me = view
            .message_send(Smid::default(), set, "me", None, vec![], false)
            .unwrap();
        let get = view
            .message_send(Smid::default(), me, "value", None, vec![], false)
            .unwrap();
        let setter_value = view
            .message_send(Smid::default(), new, "value=", None, vec![Some(five)], false)
            .unwrap();

        assert_eq!(eval_text(&mut m, unset), "VALUE");
        assert_eq!(eval_text(&mut m, get), "5");
        assert_eq!(eval_text(&mut m, new), "a COUNTER");
        assert_eq!(
            m.evaluate(setter_value).unwrap_err().code().to_string(),
            "44.2"
        );
    }

    #[test]
    pub fn test_class_methods() {
        let mut m = machine();
        let package = counter(&m);
        m.load(package).unwrap();

        let view = MutatorHeapView::new(m.heap());
        let class = view.environment(Smid::default(), "counter").unwrap();
        let object = view.environment(Smid::default(), "object").unwrap();
        let superclass = view
            .message_send(Smid::default(), class, "superclass", None, vec![], false)
            .unwrap();
        let new = view
            .message_send(Smid::default(), class, "new", None, vec![], false)
            .unwrap();
        let isa = view
            .message_send(Smid::default(), new, "isa", None, vec![Some(object)], false)
            .unwrap();
        let name = view
            .message_send(Smid::default(), class, "id", None, vec![], false)
            .unwrap();

        assert_eq!(eval_text(&mut m, superclass), "The OBJECT class");
        assert_eq!(eval_text(&mut m, isa), "1");
        assert_eq!(eval_text(&mut m, name), "COUNTER");
    }
}
