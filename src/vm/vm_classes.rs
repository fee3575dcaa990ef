//! Property access, method binding, and super dispatch.

use std::rc::Rc;

use crate::error::RuntimeError;
use crate::value::{BoundMethod, Value};
use crate::vm::vm::Vm;

impl Vm {
    /// OP_GET_PROPERTY: replace the instance on top with the field value,
    /// a bound method, or the result of a getter. A class operand reads
    /// its static methods.
    pub(super) fn op_get_property(&mut self, line: usize) -> Result<(), RuntimeError> {
        let index = self.read_u8() as usize;
        let name = self.constant_string(index, line)?;
        let target = self.peek(0).clone();

        match target {
            Value::Instance(instance) => {
                if let Some(value) = instance.borrow().fields.get(name.as_str()) {
                    let value = value.clone();
                    *self.top_mut() = value;
                    return Ok(());
                }

                let class = instance.borrow().class.clone();

                if let Some(getter) = class.borrow().find_getter(&name) {
                    // The instance on top doubles as the callee slot the
                    // return sequence drops; a second copy becomes the
                    // receiver in local 0.
                    self.push(Value::Instance(instance.clone()), line)?;
                    return self.call_closure(getter, 0, true, line);
                }

                if let Some(method) = class.borrow().find_method(&name) {
                    *self.top_mut() = Value::BoundMethod(Rc::new(BoundMethod {
                        receiver: instance,
                        method,
                    }));
                    return Ok(());
                }

                Err(RuntimeError::UndefinedProperty {
                    name: name.to_string(),
                    line,
                })
            }
            Value::Class(class) => {
                if let Some(method) = class.borrow().find_static(&name) {
                    *self.top_mut() = Value::Closure(method);
                    return Ok(());
                }
                Err(RuntimeError::UndefinedProperty {
                    name: name.to_string(),
                    line,
                })
            }
            _ => Err(RuntimeError::NotAnInstance { line }),
        }
    }

    /// OP_SET_PROPERTY: stack is [instance, value]; the field is written,
    /// the instance popped, the value left as the expression's result.
    pub(super) fn op_set_property(&mut self, line: usize) -> Result<(), RuntimeError> {
        let index = self.read_u8() as usize;
        let name = self.constant_string(index, line)?;
        let value = self.pop();
        let target = self.pop();

        match target {
            Value::Instance(instance) => {
                instance
                    .borrow_mut()
                    .fields
                    .insert(name.to_string(), value.clone());
                self.push(value, line)
            }
            _ => Err(RuntimeError::NotAnInstance { line }),
        }
    }

    /// OP_GET_SUPER: stack is [receiver, superclass]; the named method is
    /// looked up in the superclass chain and bound to the receiver.
    pub(super) fn op_get_super(&mut self, line: usize) -> Result<(), RuntimeError> {
        let index = self.read_u16() as usize;
        let name = self.constant_string(index, line)?;

        let superclass = match self.pop() {
            Value::Class(superclass) => superclass,
            _ => return Err(RuntimeError::corrupt("super lookup target is not a class", line)),
        };
        let receiver = match self.peek(0) {
            Value::Instance(instance) => instance.clone(),
            _ => return Err(RuntimeError::corrupt("super receiver is not an instance", line)),
        };

        let method = superclass.borrow().find_method(&name).ok_or_else(|| {
            RuntimeError::UndefinedProperty {
                name: name.to_string(),
                line,
            }
        })?;

        *self.top_mut() = Value::BoundMethod(Rc::new(BoundMethod { receiver, method }));
        Ok(())
    }

    pub(super) fn top_mut(&mut self) -> &mut Value {
        self.stack.last_mut().expect("value stack underflow")
    }
}
