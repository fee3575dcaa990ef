//! Interactive prompt.
//!
//! Reads one line at a time until a blank line (or EOF). The symbol
//! table, constant pool, and VM globals persist across lines, so
//! definitions from earlier lines stay visible.

use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use crate::builtins::BUILTINS;
use crate::lexer::Scanner;
use crate::parser::Parser;
use crate::value::Value;
use crate::vm::symbol::SymbolTable;
use crate::vm::{Compiler, Vm};

const PROMPT: &str = ">> ";

pub fn run() {
    let mut editor = match DefaultEditor::new() {
        Ok(editor) => editor,
        Err(error) => {
            eprintln!("Could not start the prompt: {}", error);
            return;
        }
    };

    let symbols = SymbolTable::new();
    for builtin in BUILTINS {
        symbols.borrow_mut().define_builtin(builtin.name);
    }
    let mut constants: Vec<Value> = Vec::new();
    let mut vm = Vm::new();

    loop {
        match editor.readline(PROMPT) {
            Ok(line) => {
                if line.trim().is_empty() {
                    break;
                }
                let _ = editor.add_history_entry(&line);
                eval_line(&line, &symbols, &mut constants, &mut vm);
            }
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(error) => {
                eprintln!("{}", error);
                break;
            }
        }
    }
}

fn eval_line(
    line: &str,
    symbols: &std::rc::Rc<std::cell::RefCell<SymbolTable>>,
    constants: &mut Vec<Value>,
    vm: &mut Vm,
) {
    let (tokens, lex_errors) = Scanner::new(line).scan_tokens();
    if !lex_errors.is_empty() {
        for error in lex_errors {
            eprintln!("{}", error);
        }
        return;
    }

    let mut parser = Parser::new(tokens);
    let program = parser.parse();
    if !parser.errors().is_empty() {
        for error in parser.errors() {
            eprintln!("{}", error);
        }
        return;
    }

    let compiler = Compiler::with_state(symbols.clone(), constants.clone());
    match compiler.compile(&program) {
        Ok(bytecode) => {
            *constants = bytecode.constants.clone();
            if let Err(error) = vm.run(bytecode) {
                eprintln!("{}", error);
                eprint!("{}", vm.stack_trace());
            }
        }
        Err(error) => eprintln!("{}", error),
    }
}
