//! Compiler tests: emitted bytecode, jump patching, and compile errors.

use std::collections::HashSet;

use crate::error::CompileError;
use crate::lexer::Scanner;
use crate::parser::Parser;
use crate::value::Value;
use crate::vm::chunk::Chunk;
use crate::vm::compiler::{Bytecode, Compiler};
use crate::vm::opcode::Op;

fn compile(source: &str) -> Bytecode {
    let (tokens, lex_errors) = Scanner::new(source).scan_tokens();
    assert!(lex_errors.is_empty(), "lex errors: {:?}", lex_errors);
    let mut parser = Parser::new(tokens);
    let program = parser.parse();
    assert!(
        parser.errors().is_empty(),
        "parse errors: {:?}",
        parser.errors()
    );
    Compiler::new().compile(&program).expect("compile error")
}

fn compile_err(source: &str) -> CompileError {
    let (tokens, _) = Scanner::new(source).scan_tokens();
    let mut parser = Parser::new(tokens);
    let program = parser.parse();
    assert!(
        parser.errors().is_empty(),
        "parse errors: {:?}",
        parser.errors()
    );
    Compiler::new()
        .compile(&program)
        .expect_err("expected a compile error")
}

/// Assemble the expected byte sequence through the same encoder.
fn assemble(instructions: &[(Op, &[usize])]) -> Vec<u8> {
    let mut chunk = Chunk::new();
    for (op, operands) in instructions {
        chunk.write(*op, 1, operands);
    }
    chunk.code
}

/// Decode a chunk back into opcodes using the registry widths.
fn opcode_sequence(chunk: &Chunk) -> Vec<Op> {
    let mut ops = Vec::new();
    let mut offset = 0;
    while offset < chunk.len() {
        let op = Op::from_byte(chunk.code[offset]).expect("valid opcode");
        ops.push(op);
        offset += op.width();
    }
    ops
}

/// The set of valid instruction start offsets, plus the end offset.
fn opcode_boundaries(chunk: &Chunk) -> HashSet<usize> {
    let mut boundaries = HashSet::new();
    let mut offset = 0;
    while offset < chunk.len() {
        boundaries.insert(offset);
        let op = Op::from_byte(chunk.code[offset]).expect("valid opcode");
        offset += op.width();
    }
    boundaries.insert(chunk.len());
    boundaries
}

/// Net stack effect of a straight-line chunk (panics on control flow).
fn net_stack_effect(chunk: &Chunk) -> i64 {
    let mut effect = 0i64;
    let mut offset = 0;
    while offset < chunk.len() {
        let op = Op::from_byte(chunk.code[offset]).expect("valid opcode");
        effect += match op {
            Op::Constant
            | Op::Nil
            | Op::True
            | Op::False
            | Op::GetGlobal
            | Op::GetLocal
            | Op::GetBuiltin
            | Op::GetUpvalue
            | Op::Class => 1,
            Op::Pop
            | Op::Add
            | Op::Subtract
            | Op::Multiply
            | Op::Divide
            | Op::Equal
            | Op::Greater
            | Op::Less
            | Op::DefineGlobal
            | Op::DefineLocal
            | Op::SetProperty
            | Op::GetSuper
            | Op::Index
            | Op::Method
            | Op::StaticMethod
            | Op::Getter => -1,
            Op::Negate | Op::Not | Op::SetGlobal | Op::SetLocal | Op::SetUpvalue
            | Op::GetProperty => 0,
            Op::Inherit => -2,
            Op::Call => -(chunk.read_u8(offset + 1) as i64),
            Op::Closure => 1 - chunk.read_u8(offset + 3) as i64,
            Op::Array => 1 - chunk.read_u16(offset + 1) as i64,
            Op::Hash => 1 - 2 * chunk.read_u16(offset + 1) as i64,
            Op::Jump | Op::JumpIfFalse | Op::Loop | Op::Return => {
                panic!("not a straight-line chunk")
            }
        };
        offset += op.width();
    }
    effect
}

#[test]
fn arithmetic_expression_statement() {
    let bytecode = compile("1 + 2;");
    assert_eq!(
        bytecode.main.chunk.code,
        assemble(&[
            (Op::Constant, &[0]),
            (Op::Constant, &[1]),
            (Op::Add, &[]),
            (Op::Pop, &[]),
        ])
    );
    assert!(matches!(bytecode.constants[0], Value::Number(n) if n == 1.0));
    assert!(matches!(bytecode.constants[1], Value::Number(n) if n == 2.0));
}

#[test]
fn number_constants_are_deduplicated() {
    let bytecode = compile("1 + 1;");
    assert_eq!(
        bytecode.main.chunk.code,
        assemble(&[
            (Op::Constant, &[0]),
            (Op::Constant, &[0]),
            (Op::Add, &[]),
            (Op::Pop, &[]),
        ])
    );
    assert_eq!(bytecode.constants.len(), 1);
}

#[test]
fn string_constants_are_deduplicated() {
    let bytecode = compile("var a = \"x\"; var b = \"x\";");
    let strings = bytecode
        .constants
        .iter()
        .filter(|c| matches!(c, Value::String(_)))
        .count();
    assert_eq!(strings, 1);
}

#[test]
fn comparison_rewrites() {
    // <= is GREATER then NOT; != is EQUAL then NOT
    let bytecode = compile("1 <= 2;");
    assert_eq!(
        opcode_sequence(&bytecode.main.chunk),
        vec![Op::Constant, Op::Constant, Op::Greater, Op::Not, Op::Pop]
    );

    let bytecode = compile("1 != 2;");
    assert_eq!(
        opcode_sequence(&bytecode.main.chunk),
        vec![Op::Constant, Op::Constant, Op::Equal, Op::Not, Op::Pop]
    );

    let bytecode = compile("1 >= 2;");
    assert_eq!(
        opcode_sequence(&bytecode.main.chunk),
        vec![Op::Constant, Op::Constant, Op::Less, Op::Not, Op::Pop]
    );
}

#[test]
fn global_define_and_get() {
    let bytecode = compile("var a = 1; a;");
    assert_eq!(
        bytecode.main.chunk.code,
        assemble(&[
            (Op::Constant, &[0]),
            (Op::DefineGlobal, &[0]),
            (Op::GetGlobal, &[0]),
            (Op::Pop, &[]),
        ])
    );
}

#[test]
fn var_without_initializer_defaults_to_nil() {
    let bytecode = compile("var a;");
    assert_eq!(
        bytecode.main.chunk.code,
        assemble(&[(Op::Nil, &[]), (Op::DefineGlobal, &[0])])
    );
}

#[test]
fn assignment_peeks_and_statement_pops() {
    let bytecode = compile("var a = 1; a = 2;");
    assert_eq!(
        opcode_sequence(&bytecode.main.chunk),
        vec![
            Op::Constant,
            Op::DefineGlobal,
            Op::Constant,
            Op::SetGlobal,
            Op::Pop,
        ]
    );
}

#[test]
fn if_else_shape_and_patched_offsets() {
    let bytecode = compile("if (true) { 1; } else { 2; }");
    assert_eq!(
        bytecode.main.chunk.code,
        assemble(&[
            (Op::True, &[]),
            (Op::JumpIfFalse, &[8]),
            (Op::Pop, &[]),
            (Op::Constant, &[0]),
            (Op::Pop, &[]),
            (Op::Jump, &[5]),
            (Op::Pop, &[]),
            (Op::Constant, &[1]),
            (Op::Pop, &[]),
        ])
    );
}

#[test]
fn while_loop_shape() {
    let bytecode = compile("while (true) { 1; }");
    assert_eq!(
        bytecode.main.chunk.code,
        assemble(&[
            (Op::True, &[]),
            (Op::JumpIfFalse, &[8]),
            (Op::Pop, &[]),
            (Op::Constant, &[0]),
            (Op::Pop, &[]),
            (Op::Loop, &[12]),
            (Op::Pop, &[]),
        ])
    );
}

#[test]
fn every_jump_lands_on_an_opcode_boundary() {
    let source = "\
        var total = 0;\n\
        for (var i = 0; i < 10; i = i + 1) {\n\
          if (i == 2) { continue; }\n\
          if (total > 5 and i > 1) { break; }\n\
          total = total + (i ? i : 1);\n\
        }\n\
        while (total > 0) { total = total - 1; }\n";
    let bytecode = compile(source);
    let chunk = &bytecode.main.chunk;
    let boundaries = opcode_boundaries(chunk);

    let mut offset = 0;
    let mut checked = 0;
    while offset < chunk.len() {
        let op = Op::from_byte(chunk.code[offset]).expect("valid opcode");
        let after = offset + op.width();
        match op {
            Op::Jump | Op::JumpIfFalse => {
                let delta = chunk.read_u16(offset + 1) as usize;
                assert!(boundaries.contains(&(after + delta)), "bad jump target");
                checked += 1;
            }
            Op::Loop => {
                let delta = chunk.read_u16(offset + 1) as usize;
                assert!(boundaries.contains(&(after - delta)), "bad loop target");
                checked += 1;
            }
            _ => {}
        }
        offset = after;
    }
    assert!(checked >= 6, "expected several jumps, found {}", checked);
}

#[test]
fn statements_are_stack_neutral() {
    let sources = [
        "1 + 2 * 3;",
        "var a = 5;",
        "var a = 1; a = 7;",
        "print(1, 2);",
        "var xs = {1, 2, 3};",
        "var h = [\"k\": 1];",
        "var a = {1}; a[0];",
        "function f(x) { return x; }",
        "var s = \"a\" + \"b\";",
    ];
    for source in sources {
        let bytecode = compile(source);
        assert_eq!(
            net_stack_effect(&bytecode.main.chunk),
            0,
            "statement left residue: {}",
            source
        );
    }
}

#[test]
fn function_declaration_emits_closure_then_binds() {
    let bytecode = compile("function five() { return 5; }");
    assert_eq!(
        bytecode.main.chunk.code,
        assemble(&[(Op::Closure, &[1, 0]), (Op::DefineGlobal, &[0])])
    );

    let function = match &bytecode.constants[1] {
        Value::Function(function) => function,
        other => panic!("expected function constant, got {:?}", other),
    };
    assert_eq!(function.name, "five");
    assert_eq!(function.num_parameters, 0);
    assert_eq!(
        function.chunk.code,
        assemble(&[(Op::Constant, &[0]), (Op::Return, &[])])
    );
}

#[test]
fn function_body_gets_implicit_nil_return() {
    let bytecode = compile("function noop() { 1; }");
    let function = match &bytecode.constants[1] {
        Value::Function(function) => function,
        other => panic!("expected function constant, got {:?}", other),
    };
    assert_eq!(
        opcode_sequence(&function.chunk),
        vec![Op::Constant, Op::Pop, Op::Nil, Op::Return]
    );
}

#[test]
fn parameters_become_locals() {
    let bytecode = compile("function add(a, b) { return a + b; }");
    let function = match bytecode
        .constants
        .iter()
        .find(|c| matches!(c, Value::Function(_)))
        .expect("function constant")
    {
        Value::Function(function) => function.clone(),
        _ => unreachable!(),
    };
    assert_eq!(function.num_parameters, 2);
    assert_eq!(function.num_locals, 2);
    assert_eq!(
        function.chunk.code,
        assemble(&[
            (Op::GetLocal, &[0]),
            (Op::GetLocal, &[1]),
            (Op::Add, &[]),
            (Op::Return, &[]),
        ])
    );
}

#[test]
fn closures_capture_enclosing_locals() {
    let bytecode = compile(
        "function outer() {\n\
           var x = 1;\n\
           function inner() { return x; }\n\
           return inner;\n\
         }",
    );

    let functions: Vec<_> = bytecode
        .constants
        .iter()
        .filter_map(|c| match c {
            Value::Function(f) => Some(f.clone()),
            _ => None,
        })
        .collect();

    let inner = functions.iter().find(|f| f.name == "inner").unwrap();
    assert_eq!(
        inner.chunk.code,
        assemble(&[(Op::GetUpvalue, &[0]), (Op::Return, &[])])
    );

    // outer pushes the captured local right below OP_CLOSURE
    let outer = functions.iter().find(|f| f.name == "outer").unwrap();
    let ops = opcode_sequence(&outer.chunk);
    let closure_at = ops.iter().position(|op| *op == Op::Closure).unwrap();
    assert_eq!(ops[closure_at - 1], Op::GetLocal);
    // x and inner
    assert_eq!(outer.num_locals, 2);
}

#[test]
fn builtins_resolve_to_the_builtin_pool() {
    let bytecode = compile("print(1);");
    assert_eq!(
        bytecode.main.chunk.code,
        assemble(&[
            (Op::GetBuiltin, &[0]),
            (Op::Constant, &[0]),
            (Op::Call, &[1]),
            (Op::Pop, &[]),
        ])
    );
}

#[test]
fn class_declaration_shape() {
    let bytecode = compile("class A { m() { return 1; } }");
    assert_eq!(
        opcode_sequence(&bytecode.main.chunk),
        vec![
            Op::Class,
            Op::DefineGlobal,
            Op::GetGlobal,
            Op::Closure,
            Op::Method,
            Op::Pop,
        ]
    );
}

#[test]
fn class_with_superclass_wires_inherit() {
    let bytecode = compile("class A {} class B extends A { m() { return 1; } }");
    let ops = opcode_sequence(&bytecode.main.chunk);
    let inherit_at = ops.iter().position(|op| *op == Op::Inherit).unwrap();
    // class and superclass are loaded right before OP_INHERIT
    assert_eq!(ops[inherit_at - 2], Op::GetGlobal);
    assert_eq!(ops[inherit_at - 1], Op::GetGlobal);
    assert!(ops.contains(&Op::Method));
}

#[test]
fn super_expression_compiles_to_get_super() {
    let bytecode = compile(
        "class A { m() { return 1; } }\n\
         class B extends A { m() { return super.m(); } }",
    );
    let method = bytecode
        .constants
        .iter()
        .filter_map(|c| match c {
            Value::Function(f) if f.name == "m" => Some(f.clone()),
            _ => None,
        })
        .find(|f| opcode_sequence(&f.chunk).contains(&Op::GetSuper))
        .expect("subclass method uses OP_GET_SUPER");
    let ops = opcode_sequence(&method.chunk);
    let at = ops.iter().position(|op| *op == Op::GetSuper).unwrap();
    // receiver then superclass are pushed first
    assert_eq!(ops[at - 2], Op::GetLocal);
    assert!(matches!(ops[at - 1], Op::GetGlobal | Op::GetUpvalue));
}

#[test]
fn line_info_follows_statements() {
    let bytecode = compile("1;\n2;");
    let chunk = &bytecode.main.chunk;
    assert_eq!(chunk.get_line(0), 1); // first constant
    assert_eq!(chunk.get_line(3), 1); // its pop
    assert_eq!(chunk.get_line(4), 2); // second constant
}

#[test]
fn redefinition_in_same_scope_is_rejected() {
    assert!(matches!(
        compile_err("var a = 1; var a = 2;"),
        CompileError::Redefinition { .. }
    ));
}

#[test]
fn shadowing_in_a_block_is_allowed() {
    compile("var a = 1; { var a = 2; }");
}

#[test]
fn undefined_identifier_is_rejected() {
    assert!(matches!(
        compile_err("missing;"),
        CompileError::UndefinedIdentifier { .. }
    ));
    assert!(matches!(
        compile_err("missing = 1;"),
        CompileError::UndefinedIdentifier { .. }
    ));
}

#[test]
fn top_level_return_is_rejected() {
    assert!(matches!(
        compile_err("return 1;"),
        CompileError::TopLevelReturn { .. }
    ));
}

#[test]
fn break_and_continue_need_a_loop() {
    assert!(matches!(
        compile_err("break;"),
        CompileError::NotInLoop { keyword: "break", .. }
    ));
    assert!(matches!(
        compile_err("continue;"),
        CompileError::NotInLoop { keyword: "continue", .. }
    ));
    // ...even inside a function nested in a loop body
    assert!(matches!(
        compile_err("while (true) { function f() { break; } }"),
        CompileError::NotInLoop { .. }
    ));
}

#[test]
fn this_and_super_need_a_class() {
    assert!(matches!(
        compile_err("this;"),
        CompileError::ThisOutsideClass { .. }
    ));
    assert!(matches!(
        compile_err("function f() { return this; }"),
        CompileError::ThisOutsideClass { .. }
    ));
    assert!(matches!(
        compile_err("class A { m() { return super.m(); } }"),
        CompileError::SuperOutsideClass { .. }
    ));
}

#[test]
fn duplicate_methods_are_rejected() {
    assert!(matches!(
        compile_err("class A { m() { return 1; } m() { return 2; } }"),
        CompileError::DuplicateMethod { .. }
    ));
    // a getter clashes with an instance method of the same name
    assert!(matches!(
        compile_err("class A { m() { return 1; } m { return 2; } }"),
        CompileError::DuplicateMethod { .. }
    ));
    // statics are their own namespace
    compile("class A { m() { return 1; } static m() { return 2; } }");
}

#[test]
fn initializer_cannot_return_a_value() {
    assert!(matches!(
        compile_err("class A { init() { return 1; } }"),
        CompileError::ReturnFromInitializer { .. }
    ));
    // a bare return is allowed and yields the receiver
    compile("class A { init() { return; } }");
}

#[test]
fn assigning_to_a_builtin_is_rejected() {
    assert!(matches!(
        compile_err("print = 1;"),
        CompileError::AssignToBuiltin { .. }
    ));
}

#[test]
fn initializer_implicitly_returns_the_receiver() {
    let bytecode = compile("class A { init() { this.x = 1; } }");
    let init = match bytecode
        .constants
        .iter()
        .find(|c| matches!(c, Value::Function(f) if f.name == "init"))
        .expect("init constant")
    {
        Value::Function(function) => function.clone(),
        _ => unreachable!(),
    };
    let ops = opcode_sequence(&init.chunk);
    assert_eq!(
        &ops[ops.len() - 2..],
        &[Op::GetLocal, Op::Return],
        "init ends by returning local 0"
    );
}
