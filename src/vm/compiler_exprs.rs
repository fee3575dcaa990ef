//! Expression compilation.

use crate::ast::{BinaryOp, Expr, ExprKind, LogicalOp, UnaryOp};
use crate::error::CompileError;
use crate::value::Value;
use crate::vm::compiler::{Compiler, FunctionKind};
use crate::vm::opcode::Op;
use crate::vm::symbol::{Symbol, SymbolScope, SymbolTable};

impl Compiler {
    pub(super) fn compile_expr(&mut self, expr: &Expr) -> Result<(), CompileError> {
        let line = expr.line;
        match &expr.kind {
            ExprKind::NumberLiteral(n) => {
                let index = self.make_constant(Value::Number(*n), line)?;
                self.emit(Op::Constant, line, &[index as usize]);
            }
            ExprKind::StringLiteral(s) => {
                let index = self.string_constant(s, line)?;
                self.emit(Op::Constant, line, &[index as usize]);
            }
            ExprKind::BoolLiteral(true) => self.emit(Op::True, line, &[]),
            ExprKind::BoolLiteral(false) => self.emit(Op::False, line, &[]),
            ExprKind::NilLiteral => self.emit(Op::Nil, line, &[]),

            ExprKind::Identifier(name) => {
                let symbol = SymbolTable::resolve(&self.symbols, name)
                    .ok_or_else(|| CompileError::undefined_identifier(name, line))?;
                self.emit_get(&symbol, line);
            }

            ExprKind::Grouping(inner) => self.compile_expr(inner)?,

            ExprKind::Unary { operator, operand } => {
                self.compile_expr(operand)?;
                match operator {
                    UnaryOp::Negate => self.emit(Op::Negate, line, &[]),
                    UnaryOp::Not => self.emit(Op::Not, line, &[]),
                }
            }

            ExprKind::Binary {
                left,
                operator,
                right,
            } => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                match operator {
                    BinaryOp::Add => self.emit(Op::Add, line, &[]),
                    BinaryOp::Subtract => self.emit(Op::Subtract, line, &[]),
                    BinaryOp::Multiply => self.emit(Op::Multiply, line, &[]),
                    BinaryOp::Divide => self.emit(Op::Divide, line, &[]),
                    BinaryOp::Equal => self.emit(Op::Equal, line, &[]),
                    BinaryOp::NotEqual => {
                        self.emit(Op::Equal, line, &[]);
                        self.emit(Op::Not, line, &[]);
                    }
                    BinaryOp::Less => self.emit(Op::Less, line, &[]),
                    BinaryOp::Greater => self.emit(Op::Greater, line, &[]),
                    // a <= b  ==  !(a > b), and the mirror for >=
                    BinaryOp::LessEqual => {
                        self.emit(Op::Greater, line, &[]);
                        self.emit(Op::Not, line, &[]);
                    }
                    BinaryOp::GreaterEqual => {
                        self.emit(Op::Less, line, &[]);
                        self.emit(Op::Not, line, &[]);
                    }
                }
            }

            ExprKind::Logical {
                left,
                operator,
                right,
            } => match operator {
                LogicalOp::And => {
                    self.compile_expr(left)?;
                    let end_jump = self.emit_jump(Op::JumpIfFalse, line);
                    self.emit(Op::Pop, line, &[]);
                    self.compile_expr(right)?;
                    self.patch_jump(end_jump, line)?;
                }
                LogicalOp::Or => {
                    self.compile_expr(left)?;
                    let else_jump = self.emit_jump(Op::JumpIfFalse, line);
                    let end_jump = self.emit_jump(Op::Jump, line);
                    self.patch_jump(else_jump, line)?;
                    self.emit(Op::Pop, line, &[]);
                    self.compile_expr(right)?;
                    self.patch_jump(end_jump, line)?;
                }
            },

            ExprKind::Ternary {
                condition,
                then_branch,
                else_branch,
            } => {
                self.compile_expr(condition)?;
                let else_jump = self.emit_jump(Op::JumpIfFalse, line);
                self.emit(Op::Pop, line, &[]);
                self.compile_expr(then_branch)?;
                let end_jump = self.emit_jump(Op::Jump, line);
                self.patch_jump(else_jump, line)?;
                self.emit(Op::Pop, line, &[]);
                self.compile_expr(else_branch)?;
                self.patch_jump(end_jump, line)?;
            }

            ExprKind::Assign { name, value } => {
                let symbol = SymbolTable::resolve(&self.symbols, name)
                    .ok_or_else(|| CompileError::undefined_identifier(name, line))?;
                if symbol.scope == SymbolScope::Builtin {
                    return Err(CompileError::AssignToBuiltin {
                        name: name.clone(),
                        line,
                    });
                }
                self.compile_expr(value)?;
                // SET peeks: the assigned value stays as the expression's value
                match symbol.scope {
                    SymbolScope::Global => {
                        self.emit(Op::SetGlobal, line, &[symbol.index as usize]);
                    }
                    SymbolScope::Local => self.emit(Op::SetLocal, line, &[symbol.index as usize]),
                    SymbolScope::Upvalue => {
                        self.emit(Op::SetUpvalue, line, &[symbol.index as usize]);
                    }
                    SymbolScope::Builtin => unreachable!("rejected above"),
                }
            }

            ExprKind::Get { object, name } => {
                self.compile_expr(object)?;
                let index = self.property_constant(name, line)?;
                self.emit(Op::GetProperty, line, &[index as usize]);
            }

            ExprKind::Set {
                object,
                name,
                value,
            } => {
                self.compile_expr(object)?;
                self.compile_expr(value)?;
                let index = self.property_constant(name, line)?;
                self.emit(Op::SetProperty, line, &[index as usize]);
            }

            ExprKind::Call { callee, arguments } => {
                self.compile_expr(callee)?;
                for argument in arguments {
                    self.compile_expr(argument)?;
                }
                self.emit(Op::Call, line, &[arguments.len()]);
            }

            ExprKind::This => {
                let symbol = SymbolTable::resolve(&self.symbols, "this")
                    .ok_or(CompileError::ThisOutsideClass { line })?;
                self.emit_get(&symbol, line);
            }

            ExprKind::Super { method } => self.compile_super(method, line)?,

            ExprKind::Function(literal) => {
                self.compile_function(
                    literal.name.as_deref().unwrap_or(""),
                    &literal.params,
                    &literal.body,
                    FunctionKind::Function,
                    line,
                )?;
            }

            ExprKind::Array(elements) => {
                for element in elements {
                    self.compile_expr(element)?;
                }
                self.emit(Op::Array, line, &[elements.len()]);
            }

            ExprKind::Hash(pairs) => {
                for (key, value) in pairs {
                    self.compile_expr(key)?;
                    self.compile_expr(value)?;
                }
                self.emit(Op::Hash, line, &[pairs.len()]);
            }

            ExprKind::Index { object, index } => {
                self.compile_expr(object)?;
                self.compile_expr(index)?;
                self.emit(Op::Index, line, &[]);
            }
        }
        Ok(())
    }

    /// Emit the read opcode matching a resolved symbol's scope.
    pub(super) fn emit_get(&mut self, symbol: &Symbol, line: usize) {
        let index = symbol.index as usize;
        match symbol.scope {
            SymbolScope::Global => self.emit(Op::GetGlobal, line, &[index]),
            SymbolScope::Local => self.emit(Op::GetLocal, line, &[index]),
            SymbolScope::Builtin => self.emit(Op::GetBuiltin, line, &[index]),
            SymbolScope::Upvalue => self.emit(Op::GetUpvalue, line, &[index]),
        }
    }
}
