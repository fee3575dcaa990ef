//! Lume: a small dynamically-typed, class-based scripting language.
//!
//! The pipeline is lexer → parser → single-pass bytecode compiler →
//! stack-based virtual machine. Closures capture by-value snapshots of
//! enclosing locals, classes carry method tables with single inheritance,
//! and method calls bind `this` through bound-method values.

pub mod ast;
pub mod builtins;
pub mod error;
pub mod lexer;
pub mod parser;
pub mod repl;
pub mod value;
pub mod vm;

use error::LumeError;
use lexer::Scanner;
use parser::Parser;
use vm::{Bytecode, Compiler, Vm};

/// Scan, parse, and compile a source string.
///
/// Lex and parse errors are accumulated and reported together; the
/// compiler stops at its first error.
pub fn compile_source(source: &str) -> Result<Bytecode, LumeError> {
    let (tokens, lex_errors) = Scanner::new(source).scan_tokens();
    if !lex_errors.is_empty() {
        return Err(LumeError::Lex(lex_errors));
    }

    let mut parser = Parser::new(tokens);
    let program = parser.parse();
    if !parser.errors().is_empty() {
        return Err(LumeError::Parse(parser.into_errors()));
    }

    Ok(Compiler::new().compile(&program)?)
}

/// Compile and execute a source string, writing builtin output to stdout.
pub fn run(source: &str) -> Result<(), LumeError> {
    let bytecode = compile_source(source)?;
    let mut vm = Vm::new();
    Ok(vm.run(bytecode)?)
}
