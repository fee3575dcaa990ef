//! Call dispatch: closures, builtins, classes, and bound methods.

use std::cell::RefCell;
use std::rc::Rc;

use crate::builtins::Builtin;
use crate::error::RuntimeError;
use crate::value::{Class, Closure, Instance, Value};
use crate::vm::vm::{CallFrame, Vm, FRAMES_MAX, STACK_MAX};

impl Vm {
    /// Dispatch OP_CALL: the callee sits below `argc` arguments.
    pub(super) fn call_value(&mut self, argc: usize, line: usize) -> Result<(), RuntimeError> {
        let callee_index = self.stack.len() - 1 - argc;
        let callee = self.stack[callee_index].clone();

        match callee {
            Value::Closure(closure) => self.call_closure(closure, argc, false, line),
            Value::Builtin(builtin) => self.call_builtin(builtin, argc, line),
            Value::Class(class) => self.call_class(class, argc, line),
            Value::BoundMethod(bound) => {
                let receiver = Value::Instance(bound.receiver.clone());
                self.call_with_receiver(bound.method.clone(), receiver, argc, line)
            }
            _ => Err(RuntimeError::NotCallable { line }),
        }
    }

    /// Push a frame for a closure whose arguments (and, for methods, the
    /// receiver) are already on the stack. The base pointer lands on the
    /// first of those slots; the remaining local slots are reserved above
    /// the arguments.
    pub(super) fn call_closure(
        &mut self,
        closure: Rc<Closure>,
        argc: usize,
        has_receiver: bool,
        line: usize,
    ) -> Result<(), RuntimeError> {
        let expected = closure.function.num_parameters as usize;
        if argc != expected {
            return Err(RuntimeError::WrongArity {
                expected,
                got: argc,
                line,
            });
        }
        if self.frames.len() >= FRAMES_MAX {
            return Err(RuntimeError::FrameOverflow { line });
        }

        let occupied = argc + has_receiver as usize;
        let bp = self.stack.len() - occupied;
        for _ in occupied..closure.function.num_locals as usize {
            self.push(Value::Nil, line)?;
        }

        self.frames.push(CallFrame { closure, ip: 0, bp });
        Ok(())
    }

    /// Call a method closure on a receiver: the receiver is inserted
    /// between the callee slot and the arguments so it becomes local 0
    /// (`this`), and the callee slot below it is dropped on return.
    pub(super) fn call_with_receiver(
        &mut self,
        method: Rc<Closure>,
        receiver: Value,
        argc: usize,
        line: usize,
    ) -> Result<(), RuntimeError> {
        if self.stack.len() >= STACK_MAX {
            return Err(RuntimeError::StackOverflow { line });
        }
        let insert_at = self.stack.len() - argc;
        self.stack.insert(insert_at, receiver);
        self.call_closure(method, argc, true, line)
    }

    /// Builtins run natively: pop callee and arguments, push the result.
    fn call_builtin(
        &mut self,
        builtin: &'static Builtin,
        argc: usize,
        line: usize,
    ) -> Result<(), RuntimeError> {
        let args_start = self.stack.len() - argc;
        let args = self.stack.split_off(args_start);
        self.stack.pop();

        let result = (builtin.func)(&mut *self.out, &args)
            .map_err(|message| RuntimeError::Builtin { message, line })?;
        self.push(result, line)
    }

    /// Calling a class makes an instance. The instance replaces the class
    /// in the callee slot; if the class (chain) has an `init` method it
    /// runs as a bound method and returns the receiver, otherwise the
    /// arguments are dropped.
    fn call_class(
        &mut self,
        class: Rc<RefCell<Class>>,
        argc: usize,
        line: usize,
    ) -> Result<(), RuntimeError> {
        let callee_index = self.stack.len() - 1 - argc;
        let instance = Rc::new(RefCell::new(Instance::new(class.clone())));
        self.stack[callee_index] = Value::Instance(instance.clone());

        let initializer = class.borrow().find_method("init");
        match initializer {
            Some(initializer) => {
                self.call_with_receiver(initializer, Value::Instance(instance), argc, line)
            }
            None => {
                self.stack.truncate(self.stack.len() - argc);
                Ok(())
            }
        }
    }
}
