//! Class declaration compilation: method layout, inheritance, and super.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use crate::ast::{ClassDecl, MethodKind};
use crate::error::CompileError;
use crate::value::{Class, Value};
use crate::vm::compiler::{Compiler, FunctionKind};
use crate::vm::opcode::Op;
use crate::vm::symbol::SymbolTable;

impl Compiler {
    /// Layout: OP_CLASS pushes a fresh class shaped from the compile-time
    /// template, the name is bound, the optional superclass is stored
    /// under the synthetic `super` binding and wired in with OP_INHERIT,
    /// then the class is loaded once and each member closure is attached
    /// with OP_METHOD / OP_STATIC_METHOD / OP_GETTER before a final pop.
    pub(super) fn compile_class_decl(
        &mut self,
        declaration: &ClassDecl,
        line: usize,
    ) -> Result<(), CompileError> {
        // Instance methods and getters share a namespace; statics have
        // their own.
        let mut instance_names = HashSet::new();
        let mut static_names = HashSet::new();
        for method in &declaration.methods {
            let names = if method.kind == MethodKind::Static {
                &mut static_names
            } else {
                &mut instance_names
            };
            if !names.insert(method.name.as_str()) {
                return Err(CompileError::DuplicateMethod {
                    class: declaration.name.clone(),
                    name: method.name.clone(),
                    line: method.line,
                });
            }
        }

        let symbol = self.define_variable(&declaration.name, line)?;

        let template = Value::Class(Rc::new(RefCell::new(Class::new(&declaration.name))));
        let class_index = self.make_constant(template, line)?;
        self.emit(Op::Class, line, &[class_index as usize]);
        self.emit_define(&symbol, line);

        if let Some(super_name) = &declaration.superclass {
            let resolved = SymbolTable::resolve(&self.symbols, super_name)
                .ok_or_else(|| CompileError::undefined_identifier(super_name, line))?;

            // Bind the superclass under the keyword name; method bodies
            // reach it through ordinary resolution (and capture it as an
            // upvalue when nested).
            let super_symbol = self.define_variable("super", line)?;
            self.emit_get(&resolved, line);
            self.emit_define(&super_symbol, line);

            self.emit_get(&symbol, line);
            self.emit_get(&super_symbol, line);
            self.emit(Op::Inherit, line, &[]);
        }

        if declaration.methods.is_empty() {
            return Ok(());
        }

        self.emit_get(&symbol, line);
        for method in &declaration.methods {
            let kind = match method.kind {
                MethodKind::Instance if method.name == "init" => FunctionKind::Initializer,
                MethodKind::Instance | MethodKind::Getter => FunctionKind::Method,
                MethodKind::Static => FunctionKind::Function,
            };
            self.compile_function(&method.name, &method.params, &method.body, kind, method.line)?;

            let name_index = self.string_constant(&method.name, method.line)?;
            let op = match method.kind {
                MethodKind::Instance => Op::Method,
                MethodKind::Static => Op::StaticMethod,
                MethodKind::Getter => Op::Getter,
            };
            self.emit(op, method.line, &[name_index as usize]);
        }
        self.emit(Op::Pop, line, &[]);

        Ok(())
    }

    /// `super.name`: push the receiver, push the superclass (through the
    /// synthetic binding), and let OP_GET_SUPER bind the method.
    pub(super) fn compile_super(&mut self, method: &str, line: usize) -> Result<(), CompileError> {
        let this_symbol = SymbolTable::resolve(&self.symbols, "this")
            .ok_or(CompileError::SuperOutsideClass { line })?;
        let super_symbol = SymbolTable::resolve(&self.symbols, "super")
            .ok_or(CompileError::SuperOutsideClass { line })?;

        self.emit_get(&this_symbol, line);
        self.emit_get(&super_symbol, line);
        let name_index = self.string_constant(method, line)?;
        self.emit(Op::GetSuper, line, &[name_index as usize]);
        Ok(())
    }
}
