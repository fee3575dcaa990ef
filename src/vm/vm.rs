//! The bytecode virtual machine: a stack-based dispatch loop over call
//! frames.

use std::cell::RefCell;
use std::io::{self, Write};
use std::rc::Rc;

use indexmap::IndexMap;

use crate::error::RuntimeError;
use crate::value::{format_number, values_equal, Class, Closure, HashPair, Value};
use crate::vm::compiler::Bytecode;
use crate::vm::opcode::Op;

/// Value stack capacity.
pub const STACK_MAX: usize = 2048;
/// Maximum call nesting depth.
pub const FRAMES_MAX: usize = 64;
/// Globals array size; global symbol indices are 16-bit.
pub const GLOBALS_MAX: usize = 1 << 16;

/// One in-flight invocation: the closure being executed, its instruction
/// pointer, and where its locals start on the value stack.
pub struct CallFrame {
    pub closure: Rc<Closure>,
    pub ip: usize,
    pub bp: usize,
}

pub struct Vm {
    pub(super) constants: Vec<Value>,
    /// Slots are `None` until their OP_DEFINE_GLOBAL executes, which is
    /// how reading a variable before its definition ran is caught.
    pub(super) globals: Vec<Option<Value>>,
    pub(super) stack: Vec<Value>,
    pub(super) frames: Vec<CallFrame>,
    pub(super) out: Box<dyn Write>,
    /// Byte offset of the instruction currently executing in the
    /// innermost frame; kept for the stack trace.
    op_offset: usize,
}

impl Vm {
    pub fn new() -> Self {
        Self::with_output(Box::new(io::stdout()))
    }

    /// A VM writing builtin output to the given sink (tests capture it).
    pub fn with_output(out: Box<dyn Write>) -> Self {
        Self {
            constants: Vec::new(),
            globals: vec![None; GLOBALS_MAX],
            stack: Vec::with_capacity(STACK_MAX),
            frames: Vec::with_capacity(FRAMES_MAX),
            out,
            op_offset: 0,
        }
    }

    /// Execute a compiled program to completion. Globals survive across
    /// runs (the REPL relies on that); the value and frame stacks are
    /// reset per run.
    pub fn run(&mut self, bytecode: Bytecode) -> Result<(), RuntimeError> {
        self.constants = bytecode.constants;
        self.stack.clear();
        self.frames.clear();

        let closure = Rc::new(Closure::new(bytecode.main, Vec::new()));
        self.frames.push(CallFrame {
            closure,
            ip: 0,
            bp: 0,
        });

        self.dispatch()
    }

    fn dispatch(&mut self) -> Result<(), RuntimeError> {
        loop {
            let (op, line) = {
                let frame = self.frames.last().expect("at least one frame");
                let chunk = &frame.closure.function.chunk;
                if frame.ip >= chunk.len() {
                    if self.frames.len() == 1 {
                        // Top-level code runs off the end of its
                        // instructions; that is the halt condition.
                        return Ok(());
                    }
                    return Err(RuntimeError::corrupt("function ended without return", 0));
                }
                let byte = chunk.code[frame.ip];
                let line = chunk.get_line(frame.ip);
                match Op::from_byte(byte) {
                    Some(op) => (op, line),
                    None => {
                        return Err(RuntimeError::corrupt(
                            format!("invalid opcode {}", byte),
                            line,
                        ));
                    }
                }
            };

            self.op_offset = self.frames.last().expect("frame").ip;
            self.frames.last_mut().expect("frame").ip += 1;

            match op {
                Op::Constant => {
                    let index = self.read_u16() as usize;
                    let value = self
                        .constants
                        .get(index)
                        .cloned()
                        .ok_or_else(|| RuntimeError::corrupt("constant index out of range", line))?;
                    self.push(value, line)?;
                }
                Op::Nil => self.push(Value::Nil, line)?,
                Op::True => self.push(Value::Bool(true), line)?,
                Op::False => self.push(Value::Bool(false), line)?,
                Op::Pop => {
                    self.pop();
                }

                Op::Negate => {
                    let value = self.pop();
                    match value {
                        Value::Number(n) => self.push(Value::Number(-n), line)?,
                        other => {
                            return Err(RuntimeError::type_mismatch(
                                format!("Operand must be a number, got {}", other.type_name()),
                                line,
                            ));
                        }
                    }
                }
                Op::Not => {
                    let value = self.pop();
                    self.push(Value::Bool(!value.is_truthy()), line)?;
                }

                Op::Add => {
                    let b = self.pop();
                    let a = self.pop();
                    let result = match (&a, &b) {
                        (Value::Number(x), Value::Number(y)) => Value::Number(x + y),
                        (Value::String(x), Value::String(y)) => {
                            Value::string(format!("{}{}", x, y))
                        }
                        // A number next to a string coerces via its
                        // display form
                        (Value::String(x), Value::Number(y)) => {
                            Value::string(format!("{}{}", x, format_number(*y)))
                        }
                        (Value::Number(x), Value::String(y)) => {
                            Value::string(format!("{}{}", format_number(*x), y))
                        }
                        _ => {
                            return Err(RuntimeError::type_mismatch(
                                format!("Cannot add {} and {}", a.type_name(), b.type_name()),
                                line,
                            ));
                        }
                    };
                    self.push(result, line)?;
                }
                Op::Subtract => {
                    let (a, b) = self.pop_numbers("subtract", line)?;
                    self.push(Value::Number(a - b), line)?;
                }
                Op::Multiply => {
                    let (a, b) = self.pop_numbers("multiply", line)?;
                    self.push(Value::Number(a * b), line)?;
                }
                Op::Divide => {
                    let (a, b) = self.pop_numbers("divide", line)?;
                    if b == 0.0 {
                        return Err(RuntimeError::DivisionByZero { line });
                    }
                    self.push(Value::Number(a / b), line)?;
                }

                Op::Equal => {
                    let b = self.pop();
                    let a = self.pop();
                    self.push(Value::Bool(values_equal(&a, &b)), line)?;
                }
                Op::Greater => {
                    let b = self.pop();
                    let a = self.pop();
                    let result = self.compare(&a, &b, line)?;
                    self.push(Value::Bool(result == std::cmp::Ordering::Greater), line)?;
                }
                Op::Less => {
                    let b = self.pop();
                    let a = self.pop();
                    let result = self.compare(&a, &b, line)?;
                    self.push(Value::Bool(result == std::cmp::Ordering::Less), line)?;
                }

                Op::DefineGlobal => {
                    let index = self.read_u16() as usize;
                    let value = self.pop();
                    self.globals[index] = Some(value);
                }
                Op::SetGlobal => {
                    let index = self.read_u16() as usize;
                    let value = self.peek(0).clone();
                    self.globals[index] = Some(value);
                }
                Op::GetGlobal => {
                    let index = self.read_u16() as usize;
                    let value = self.globals[index]
                        .clone()
                        .ok_or(RuntimeError::UninitializedVariable { line })?;
                    self.push(value, line)?;
                }

                Op::DefineLocal | Op::SetLocal => {
                    let slot = self.read_u8() as usize;
                    let value = if op == Op::DefineLocal {
                        self.pop()
                    } else {
                        self.peek(0).clone()
                    };
                    let bp = self.frames.last().expect("frame").bp;
                    self.stack[bp + slot] = value;
                }
                Op::GetLocal => {
                    let slot = self.read_u8() as usize;
                    let bp = self.frames.last().expect("frame").bp;
                    let value = self.stack[bp + slot].clone();
                    self.push(value, line)?;
                }

                Op::GetBuiltin => {
                    let index = self.read_u8() as usize;
                    let builtin = crate::builtins::BUILTINS
                        .get(index)
                        .ok_or_else(|| RuntimeError::corrupt("builtin index out of range", line))?;
                    self.push(Value::Builtin(builtin), line)?;
                }
                Op::GetUpvalue => {
                    let index = self.read_u8() as usize;
                    let value = {
                        let frame = self.frames.last().expect("frame");
                        frame.closure.upvalues.borrow()[index].clone()
                    };
                    self.push(value, line)?;
                }
                Op::SetUpvalue => {
                    let index = self.read_u8() as usize;
                    let value = self.peek(0).clone();
                    let frame = self.frames.last().expect("frame");
                    frame.closure.upvalues.borrow_mut()[index] = value;
                }

                Op::Jump => {
                    let offset = self.read_u16() as usize;
                    self.frames.last_mut().expect("frame").ip += offset;
                }
                Op::JumpIfFalse => {
                    let offset = self.read_u16() as usize;
                    // Peek only; the branch's OP_POP removes the operand
                    if !self.peek(0).is_truthy() {
                        self.frames.last_mut().expect("frame").ip += offset;
                    }
                }
                Op::Loop => {
                    let offset = self.read_u16() as usize;
                    self.frames.last_mut().expect("frame").ip -= offset;
                }

                Op::Call => {
                    let argc = self.read_u8() as usize;
                    self.call_value(argc, line)?;
                }
                Op::Closure => {
                    let function_index = self.read_u16() as usize;
                    let upvalue_count = self.read_u8() as usize;

                    let function = match self.constants.get(function_index) {
                        Some(Value::Function(function)) => function.clone(),
                        _ => {
                            return Err(RuntimeError::corrupt(
                                "closure operand is not a function constant",
                                line,
                            ));
                        }
                    };

                    // The captured values were pushed in capture order;
                    // pop them back into place.
                    let mut upvalues = Vec::with_capacity(upvalue_count);
                    for _ in 0..upvalue_count {
                        upvalues.push(self.pop());
                    }
                    upvalues.reverse();

                    let closure = Closure::new(function, upvalues);
                    self.push(Value::Closure(Rc::new(closure)), line)?;
                }
                Op::Return => {
                    let result = self.pop();
                    let frame = self.frames.pop().expect("frame");
                    if self.frames.is_empty() {
                        return Ok(());
                    }
                    // Drop the frame's locals and the callee slot below bp
                    self.stack.truncate(frame.bp - 1);
                    self.push(result, line)?;
                }

                Op::Class => {
                    let index = self.read_u16() as usize;
                    let fresh = match self.constants.get(index) {
                        Some(Value::Class(template)) => Class::new(template.borrow().name.clone()),
                        _ => {
                            return Err(RuntimeError::corrupt(
                                "class operand is not a class constant",
                                line,
                            ));
                        }
                    };
                    self.push(Value::Class(Rc::new(RefCell::new(fresh))), line)?;
                }
                Op::Inherit => {
                    let superclass = match self.pop() {
                        Value::Class(superclass) => superclass,
                        other => {
                            return Err(RuntimeError::type_mismatch(
                                format!("Superclass must be a class, got {}", other.type_name()),
                                line,
                            ));
                        }
                    };
                    match self.pop() {
                        Value::Class(class) => {
                            class.borrow_mut().superclass = Some(superclass);
                        }
                        _ => {
                            return Err(RuntimeError::corrupt("inherit target is not a class", line));
                        }
                    }
                }
                Op::Method | Op::StaticMethod | Op::Getter => {
                    let index = self.read_u16() as usize;
                    let name = self.constant_string(index, line)?;
                    let closure = match self.pop() {
                        Value::Closure(closure) => closure,
                        _ => return Err(RuntimeError::corrupt("method is not a closure", line)),
                    };
                    let class = match self.peek(0) {
                        Value::Class(class) => class.clone(),
                        _ => return Err(RuntimeError::corrupt("method target is not a class", line)),
                    };
                    let mut class = class.borrow_mut();
                    let table = match op {
                        Op::Method => &mut class.methods,
                        Op::StaticMethod => &mut class.statics,
                        _ => &mut class.getters,
                    };
                    table.insert(name.to_string(), closure);
                }

                Op::GetProperty => self.op_get_property(line)?,
                Op::SetProperty => self.op_set_property(line)?,
                Op::GetSuper => self.op_get_super(line)?,

                Op::Array => {
                    let count = self.read_u16() as usize;
                    let start = self.stack.len() - count;
                    let elements = self.stack.split_off(start);
                    self.push(Value::Array(Rc::new(RefCell::new(elements))), line)?;
                }
                Op::Hash => {
                    let count = self.read_u16() as usize;
                    let start = self.stack.len() - count * 2;
                    let flat = self.stack.split_off(start);
                    let mut entries = IndexMap::with_capacity(count);
                    let mut iter = flat.into_iter();
                    while let (Some(key), Some(value)) = (iter.next(), iter.next()) {
                        let hash_key =
                            key.hash_key()
                                .ok_or_else(|| RuntimeError::UnusableHashKey {
                                    type_name: key.type_name(),
                                    line,
                                })?;
                        entries.insert(hash_key, HashPair { key, value });
                    }
                    self.push(Value::Hash(Rc::new(RefCell::new(entries))), line)?;
                }
                Op::Index => {
                    let index = self.pop();
                    let object = self.pop();
                    let result = self.index_value(&object, &index, line)?;
                    self.push(result, line)?;
                }
            }
        }
    }

    fn index_value(
        &self,
        object: &Value,
        index: &Value,
        line: usize,
    ) -> Result<Value, RuntimeError> {
        match object {
            Value::Array(elements) => {
                let n = match index {
                    Value::Number(n) => *n,
                    other => {
                        return Err(RuntimeError::type_mismatch(
                            format!("Array index must be a number, got {}", other.type_name()),
                            line,
                        ));
                    }
                };
                // Fractional or out-of-range indices read as nil
                if n.fract() != 0.0 || n < 0.0 {
                    return Ok(Value::Nil);
                }
                let elements = elements.borrow();
                Ok(elements.get(n as usize).cloned().unwrap_or(Value::Nil))
            }
            Value::Hash(entries) => {
                let key = index
                    .hash_key()
                    .ok_or_else(|| RuntimeError::UnusableHashKey {
                        type_name: index.type_name(),
                        line,
                    })?;
                Ok(entries
                    .borrow()
                    .get(&key)
                    .map(|pair| pair.value.clone())
                    .unwrap_or(Value::Nil))
            }
            other => Err(RuntimeError::type_mismatch(
                format!("Cannot index {}", other.type_name()),
                line,
            )),
        }
    }

    fn compare(
        &self,
        a: &Value,
        b: &Value,
        line: usize,
    ) -> Result<std::cmp::Ordering, RuntimeError> {
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => {
                Ok(x.partial_cmp(y).unwrap_or(std::cmp::Ordering::Equal))
            }
            (Value::String(x), Value::String(y)) => Ok(x.cmp(y)),
            _ => Err(RuntimeError::type_mismatch(
                format!("Cannot compare {} and {}", a.type_name(), b.type_name()),
                line,
            )),
        }
    }

    fn pop_numbers(&mut self, what: &str, line: usize) -> Result<(f64, f64), RuntimeError> {
        let b = self.pop();
        let a = self.pop();
        match (&a, &b) {
            (Value::Number(x), Value::Number(y)) => Ok((*x, *y)),
            _ => Err(RuntimeError::type_mismatch(
                format!(
                    "Cannot {} {} and {}",
                    what,
                    a.type_name(),
                    b.type_name()
                ),
                line,
            )),
        }
    }

    // --- Stack and operand helpers ---

    pub(super) fn push(&mut self, value: Value, line: usize) -> Result<(), RuntimeError> {
        if self.stack.len() >= STACK_MAX {
            return Err(RuntimeError::StackOverflow { line });
        }
        self.stack.push(value);
        Ok(())
    }

    pub(super) fn pop(&mut self) -> Value {
        self.stack.pop().expect("value stack underflow")
    }

    pub(super) fn peek(&self, distance: usize) -> &Value {
        &self.stack[self.stack.len() - 1 - distance]
    }

    pub(super) fn read_u8(&mut self) -> u8 {
        let frame = self.frames.last_mut().expect("frame");
        let value = frame.closure.function.chunk.read_u8(frame.ip);
        frame.ip += 1;
        value
    }

    pub(super) fn read_u16(&mut self) -> u16 {
        let frame = self.frames.last_mut().expect("frame");
        let value = frame.closure.function.chunk.read_u16(frame.ip);
        frame.ip += 2;
        value
    }

    pub(super) fn constant_string(
        &self,
        index: usize,
        line: usize,
    ) -> Result<Rc<String>, RuntimeError> {
        match self.constants.get(index) {
            Some(Value::String(s)) => Ok(s.clone()),
            _ => Err(RuntimeError::corrupt("name constant is not a string", line)),
        }
    }

    /// The call-frame stack rendered innermost first: the opcode about to
    /// execute, its source line, and the function name.
    pub fn stack_trace(&self) -> String {
        let mut out = String::new();
        for (i, frame) in self.frames.iter().enumerate().rev() {
            let chunk = &frame.closure.function.chunk;
            if chunk.is_empty() {
                continue;
            }

            let offset = if i == self.frames.len() - 1 {
                self.op_offset
            } else {
                frame.ip
            };
            let offset = offset.min(chunk.len() - 1);

            let op_name = Op::from_byte(chunk.code[offset])
                .map(|op| op.definition().name)
                .unwrap_or("OP_UNKNOWN");
            let name = if frame.closure.function.name.is_empty() {
                if i == 0 {
                    "<script>"
                } else {
                    "<fn>"
                }
            } else {
                frame.closure.function.name.as_str()
            };
            out.push_str(&format!(
                "[line {}] in {} ({})\n",
                chunk.get_line(offset),
                name,
                op_name
            ));
        }
        out
    }
}

impl Default for Vm {
    fn default() -> Self {
        Self::new()
    }
}
