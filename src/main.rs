//! Lume CLI: run a script file, or start the REPL with no arguments.

use std::env;
use std::fs;
use std::process;

use lume::error::LumeError;
use lume::vm::Vm;

fn main() {
    let args: Vec<String> = env::args().collect();
    match args.len() {
        1 => lume::repl::run(),
        2 => run_file(&args[1]),
        _ => {
            eprintln!("Usage: lume [script]");
            process::exit(64);
        }
    }
}

fn run_file(path: &str) {
    let source = match fs::read_to_string(path) {
        Ok(source) => source,
        Err(error) => {
            eprintln!("Could not read '{}': {}", path, error);
            process::exit(74);
        }
    };

    let bytecode = match lume::compile_source(&source) {
        Ok(bytecode) => bytecode,
        Err(error) => {
            eprintln!("{}", error);
            process::exit(65);
        }
    };

    let mut vm = Vm::new();
    if let Err(error) = vm.run(bytecode) {
        eprintln!("{}", LumeError::Runtime(error));
        eprint!("{}", vm.stack_trace());
        process::exit(70);
    }
}
