//! AST-to-bytecode compiler.
//!
//! Single pass: walks the AST once, emitting byte-encoded instructions into
//! the current compilation scope. A scope is pushed per function being
//! compiled; the constant pool is shared across all of them. Variable
//! resolution happens here, so the VM only ever sees indices.

use std::cell::RefCell;
use std::rc::Rc;

use crate::ast::{FunctionDecl, Program, Stmt, StmtKind};
use crate::builtins::BUILTINS;
use crate::error::CompileError;
use crate::value::{CompiledFunction, Value};
use crate::vm::chunk::Chunk;
use crate::vm::opcode::Op;
use crate::vm::symbol::{Symbol, SymbolScope, SymbolTable};

/// The output of compilation: the top-level function plus the constant
/// pool every nested function shares.
#[derive(Debug)]
pub struct Bytecode {
    pub main: Rc<CompiledFunction>,
    pub constants: Vec<Value>,
}

/// What kind of function the current scope is compiling. Lifted to compile
/// time so return placement and initializer rules are checked statically.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum FunctionKind {
    Script,
    Function,
    Method,
    Initializer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopKind {
    While,
    For,
}

/// Per-loop bookkeeping: where the loop starts and which forward jumps
/// still need their targets.
struct LoopContext {
    kind: LoopKind,
    start: usize,
    break_jumps: Vec<usize>,
    continue_jumps: Vec<usize>,
}

/// One function being compiled: its instruction buffer, what kind of
/// function it is, and the loops currently open inside it.
pub(super) struct CompileScope {
    chunk: Chunk,
    kind: FunctionKind,
    last_op: Option<Op>,
    loops: Vec<LoopContext>,
}

impl CompileScope {
    fn new(kind: FunctionKind) -> Self {
        Self {
            chunk: Chunk::new(),
            kind,
            last_op: None,
            loops: Vec::new(),
        }
    }
}

pub struct Compiler {
    scopes: Vec<CompileScope>,
    pub(super) symbols: Rc<RefCell<SymbolTable>>,
    constants: Vec<Value>,
}

impl Compiler {
    /// A fresh compiler with every builtin pre-registered.
    pub fn new() -> Self {
        let symbols = SymbolTable::new();
        for builtin in BUILTINS {
            symbols.borrow_mut().define_builtin(builtin.name);
        }
        Self::with_state(symbols, Vec::new())
    }

    /// A compiler continuing from existing state (the REPL threads its
    /// symbol table and constant pool through every line).
    pub fn with_state(symbols: Rc<RefCell<SymbolTable>>, constants: Vec<Value>) -> Self {
        Self {
            scopes: vec![CompileScope::new(FunctionKind::Script)],
            symbols,
            constants,
        }
    }

    /// Compile a program. Top-level code becomes the nameless main
    /// function; it ends without OP_RETURN and the VM halts when its ip
    /// passes the end.
    pub fn compile(mut self, program: &Program) -> Result<Bytecode, CompileError> {
        for stmt in &program.statements {
            self.compile_stmt(stmt)?;
        }

        let scope = self.scopes.pop().expect("script scope");
        let main = CompiledFunction {
            chunk: scope.chunk,
            num_locals: 0,
            num_parameters: 0,
            name: String::new(),
        };
        Ok(Bytecode {
            main: Rc::new(main),
            constants: self.constants,
        })
    }

    // --- Emit helpers ---

    fn scope(&mut self) -> &mut CompileScope {
        self.scopes.last_mut().expect("at least one scope")
    }

    pub(super) fn emit(&mut self, op: Op, line: usize, operands: &[usize]) {
        let scope = self.scope();
        scope.chunk.write(op, line, operands);
        scope.last_op = Some(op);
    }

    pub(super) fn current_offset(&self) -> usize {
        self.scopes.last().expect("at least one scope").chunk.len()
    }

    /// Append a value to the shared pool and return its 16-bit index.
    /// Strings and numbers are deduplicated.
    pub(super) fn make_constant(&mut self, value: Value, line: usize) -> Result<u16, CompileError> {
        let existing = match &value {
            Value::String(s) => self.constants.iter().position(
                |c| matches!(c, Value::String(e) if e.as_str() == s.as_str()),
            ),
            Value::Number(n) => self
                .constants
                .iter()
                .position(|c| matches!(c, Value::Number(e) if e == n)),
            _ => None,
        };
        if let Some(index) = existing {
            return Ok(index as u16);
        }

        if self.constants.len() > u16::MAX as usize {
            return Err(CompileError::TooManyConstants { line });
        }
        self.constants.push(value);
        Ok((self.constants.len() - 1) as u16)
    }

    pub(super) fn string_constant(&mut self, s: &str, line: usize) -> Result<u16, CompileError> {
        self.make_constant(Value::string(s), line)
    }

    /// Property-name operands are a single byte, so the name must land in
    /// the first 256 pool slots (string dedup keeps this from triggering
    /// in practice).
    pub(super) fn property_constant(&mut self, name: &str, line: usize) -> Result<u8, CompileError> {
        let index = self.string_constant(name, line)?;
        if index > u8::MAX as u16 {
            return Err(CompileError::TooManyConstants { line });
        }
        Ok(index as u8)
    }

    /// Emit a jump with a 0xFFFF placeholder; returns the operand offset
    /// for patching.
    pub(super) fn emit_jump(&mut self, op: Op, line: usize) -> usize {
        self.emit(op, line, &[0xffff]);
        self.current_offset() - 2
    }

    /// Point a previously emitted jump at the current offset.
    pub(super) fn patch_jump(&mut self, operand_offset: usize, line: usize) -> Result<(), CompileError> {
        let delta = self.current_offset() - operand_offset - 2;
        if delta > u16::MAX as usize {
            return Err(CompileError::JumpTooLarge { line });
        }
        self.scope().chunk.patch_u16(operand_offset, delta as u16);
        Ok(())
    }

    /// Emit a backward jump to `loop_start`. The operand is the positive
    /// distance from the ip after the operand back to the target.
    pub(super) fn emit_loop(&mut self, loop_start: usize, line: usize) -> Result<(), CompileError> {
        let offset = self.current_offset() - loop_start + Op::Loop.width();
        if offset > u16::MAX as usize {
            return Err(CompileError::JumpTooLarge { line });
        }
        self.emit(Op::Loop, line, &[offset]);
        Ok(())
    }

    // --- Scope management ---

    fn enter_function_scope(&mut self, kind: FunctionKind) {
        self.scopes.push(CompileScope::new(kind));
        self.symbols = SymbolTable::new_enclosed(self.symbols.clone());
    }

    /// Pop the function scope, yielding its instructions, how many local
    /// slots its frame needs, and the symbols it captured.
    fn leave_function_scope(&mut self) -> (Chunk, u16, Vec<Symbol>) {
        let scope = self.scopes.pop().expect("function scope");
        let table = self.symbols.clone();
        let outer = table.borrow().outer.clone().expect("enclosing table");
        self.symbols = outer;

        let num_locals = table.borrow().num_definitions;
        let upvalues = table.borrow().upvalues.clone();
        (scope.chunk, num_locals, upvalues)
    }

    fn enter_block_scope(&mut self) {
        self.symbols = SymbolTable::new_block(self.symbols.clone());
    }

    /// Pop the block table, folding its definition count back into the
    /// enclosing table so sibling scopes keep allocating fresh slots.
    fn leave_block_scope(&mut self) {
        let inner = self.symbols.clone();
        let outer = inner.borrow().outer.clone().expect("enclosing table");
        let count = inner.borrow().num_definitions;
        {
            let mut outer_ref = outer.borrow_mut();
            outer_ref.num_definitions = outer_ref.num_definitions.max(count);
        }
        self.symbols = outer;
    }

    pub(super) fn define_variable(&mut self, name: &str, line: usize) -> Result<Symbol, CompileError> {
        let symbol = self.symbols.borrow_mut().define(name);
        if symbol.scope == SymbolScope::Local && symbol.index > u8::MAX as u16 {
            return Err(CompileError::TooManyLocals { line });
        }
        Ok(symbol)
    }

    /// Emit the binding opcode for a freshly defined name.
    pub(super) fn emit_define(&mut self, symbol: &Symbol, line: usize) {
        match symbol.scope {
            SymbolScope::Global => {
                self.emit(Op::DefineGlobal, line, &[symbol.index as usize]);
            }
            SymbolScope::Local => {
                self.emit(Op::DefineLocal, line, &[symbol.index as usize]);
            }
            SymbolScope::Builtin | SymbolScope::Upvalue => {
                unreachable!("define targets are globals or locals")
            }
        }
    }

    // --- Statements ---

    pub(super) fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        let line = stmt.line;
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.compile_expr(expr)?;
                self.emit(Op::Pop, line, &[]);
            }
            StmtKind::Var { name, initializer } => {
                if self.symbols.borrow().resolve_inner(name).is_some() {
                    return Err(CompileError::redefinition(name, line));
                }
                let symbol = self.define_variable(name, line)?;

                match initializer {
                    Some(expr) => self.compile_expr(expr)?,
                    None => self.emit(Op::Nil, line, &[]),
                }
                self.emit_define(&symbol, line);
            }
            StmtKind::Block(statements) => {
                self.enter_block_scope();
                for statement in statements {
                    self.compile_stmt(statement)?;
                }
                self.leave_block_scope();
            }
            StmtKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                self.compile_expr(condition)?;
                let else_jump = self.emit_jump(Op::JumpIfFalse, line);
                self.emit(Op::Pop, line, &[]);
                self.compile_stmt(then_branch)?;
                let end_jump = self.emit_jump(Op::Jump, line);

                self.patch_jump(else_jump, line)?;
                self.emit(Op::Pop, line, &[]);
                if let Some(else_branch) = else_branch {
                    self.compile_stmt(else_branch)?;
                }
                self.patch_jump(end_jump, line)?;
            }
            StmtKind::While { condition, body } => {
                let loop_start = self.current_offset();
                self.scope().loops.push(LoopContext {
                    kind: LoopKind::While,
                    start: loop_start,
                    break_jumps: Vec::new(),
                    continue_jumps: Vec::new(),
                });

                self.compile_expr(condition)?;
                let exit_jump = self.emit_jump(Op::JumpIfFalse, line);
                self.emit(Op::Pop, line, &[]);
                self.compile_stmt(body)?;
                self.emit_loop(loop_start, line)?;
                self.patch_jump(exit_jump, line)?;
                self.emit(Op::Pop, line, &[]);

                let context = self.scope().loops.pop().expect("while context");
                for jump in context.break_jumps {
                    self.patch_jump(jump, line)?;
                }
            }
            StmtKind::For {
                initializer,
                condition,
                increment,
                body,
            } => {
                self.compile_for(
                    initializer.as_deref(),
                    condition.as_ref(),
                    increment.as_ref(),
                    body,
                    line,
                )?;
            }
            StmtKind::Return(value) => {
                if self.scopes.len() == 1 {
                    return Err(CompileError::TopLevelReturn { line });
                }
                let kind = self.scope().kind;
                match (kind, value) {
                    (FunctionKind::Initializer, Some(_)) => {
                        return Err(CompileError::ReturnFromInitializer { line });
                    }
                    (FunctionKind::Initializer, None) => {
                        self.emit(Op::GetLocal, line, &[0]);
                    }
                    (_, Some(expr)) => self.compile_expr(expr)?,
                    (_, None) => self.emit(Op::Nil, line, &[]),
                }
                self.emit(Op::Return, line, &[]);
            }
            StmtKind::Break => {
                if self.scope().loops.is_empty() {
                    return Err(CompileError::NotInLoop {
                        keyword: "break",
                        line,
                    });
                }
                let jump = self.emit_jump(Op::Jump, line);
                self.scope()
                    .loops
                    .last_mut()
                    .expect("loop context")
                    .break_jumps
                    .push(jump);
            }
            StmtKind::Continue => {
                let context = match self.scope().loops.last() {
                    None => {
                        return Err(CompileError::NotInLoop {
                            keyword: "continue",
                            line,
                        });
                    }
                    Some(context) => (context.kind, context.start),
                };
                match context {
                    // A while loop's continue target is already behind us
                    (LoopKind::While, start) => self.emit_loop(start, line)?,
                    // A for loop's target is the increment, patched later
                    (LoopKind::For, _) => {
                        let jump = self.emit_jump(Op::Jump, line);
                        self.scope()
                            .loops
                            .last_mut()
                            .expect("loop context")
                            .continue_jumps
                            .push(jump);
                    }
                }
            }
            StmtKind::Function(declaration) => {
                self.compile_function_decl(declaration, line)?;
            }
            StmtKind::Class(declaration) => {
                self.compile_class_decl(declaration, line)?;
            }
        }
        Ok(())
    }

    fn compile_for(
        &mut self,
        initializer: Option<&Stmt>,
        condition: Option<&crate::ast::Expr>,
        increment: Option<&crate::ast::Expr>,
        body: &Stmt,
        line: usize,
    ) -> Result<(), CompileError> {
        // The initializer's variable lives in its own scope
        self.enter_block_scope();

        if let Some(initializer) = initializer {
            self.compile_stmt(initializer)?;
        }

        let loop_start = self.current_offset();
        self.scope().loops.push(LoopContext {
            kind: LoopKind::For,
            start: loop_start,
            break_jumps: Vec::new(),
            continue_jumps: Vec::new(),
        });

        let exit_jump = match condition {
            Some(condition) => {
                self.compile_expr(condition)?;
                let jump = self.emit_jump(Op::JumpIfFalse, line);
                self.emit(Op::Pop, line, &[]);
                Some(jump)
            }
            None => None,
        };

        self.compile_stmt(body)?;

        // continue lands here, just before the increment
        let continue_jumps = std::mem::take(
            &mut self
                .scope()
                .loops
                .last_mut()
                .expect("for context")
                .continue_jumps,
        );
        for jump in continue_jumps {
            self.patch_jump(jump, line)?;
        }

        if let Some(increment) = increment {
            self.compile_expr(increment)?;
            self.emit(Op::Pop, line, &[]);
        }

        self.emit_loop(loop_start, line)?;

        if let Some(exit_jump) = exit_jump {
            self.patch_jump(exit_jump, line)?;
            self.emit(Op::Pop, line, &[]);
        }

        let context = self.scope().loops.pop().expect("for context");
        for jump in context.break_jumps {
            self.patch_jump(jump, line)?;
        }

        self.leave_block_scope();
        Ok(())
    }

    fn compile_function_decl(
        &mut self,
        declaration: &FunctionDecl,
        line: usize,
    ) -> Result<(), CompileError> {
        // The name is bound before the body compiles so recursion resolves
        let symbol = self.define_variable(&declaration.name, line)?;
        self.compile_function(
            &declaration.name,
            &declaration.params,
            &declaration.body,
            FunctionKind::Function,
            line,
        )?;
        self.emit_define(&symbol, line);
        Ok(())
    }

    /// Compile a function body into its own scope and emit the closure
    /// construction: the captured values are pushed below OP_CLOSURE so
    /// the VM snapshots them at creation time.
    pub(super) fn compile_function(
        &mut self,
        name: &str,
        params: &[String],
        body: &[Stmt],
        kind: FunctionKind,
        line: usize,
    ) -> Result<(), CompileError> {
        self.enter_function_scope(kind);

        if matches!(kind, FunctionKind::Method | FunctionKind::Initializer) {
            self.symbols.borrow_mut().define("this");
        }
        for param in params {
            self.define_variable(param, line)?;
        }

        for stmt in body {
            self.compile_stmt(stmt)?;
        }

        if self.scope().last_op != Some(Op::Return) {
            if kind == FunctionKind::Initializer {
                self.emit(Op::GetLocal, line, &[0]);
            } else {
                self.emit(Op::Nil, line, &[]);
            }
            self.emit(Op::Return, line, &[]);
        }

        let (chunk, num_locals, upvalues) = self.leave_function_scope();
        let function = CompiledFunction {
            chunk,
            num_locals,
            num_parameters: params.len() as u8,
            name: name.to_string(),
        };
        let function_index = self.make_constant(Value::Function(Rc::new(function)), line)?;

        for upvalue in &upvalues {
            match upvalue.scope {
                SymbolScope::Local => self.emit(Op::GetLocal, line, &[upvalue.index as usize]),
                SymbolScope::Upvalue => self.emit(Op::GetUpvalue, line, &[upvalue.index as usize]),
                SymbolScope::Global | SymbolScope::Builtin => {
                    unreachable!("globals and builtins are never captured")
                }
            }
        }
        self.emit(
            Op::Closure,
            line,
            &[function_index as usize, upvalues.len()],
        );
        Ok(())
    }
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new()
    }
}
