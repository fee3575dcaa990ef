//! Registry-driven bytecode disassembler for debug output.

use crate::value::Value;
use crate::vm::chunk::Chunk;
use crate::vm::compiler::Bytecode;
use crate::vm::opcode::Op;

/// Disassemble a whole program: the top-level code followed by every
/// function in the constant pool.
pub fn disassemble_bytecode(bytecode: &Bytecode) -> String {
    let mut out = String::new();
    disassemble_chunk(&bytecode.main.chunk, &bytecode.constants, "<script>", &mut out);

    for constant in &bytecode.constants {
        if let Value::Function(function) = constant {
            out.push('\n');
            disassemble_chunk(
                &function.chunk,
                &bytecode.constants,
                function.display_name(),
                &mut out,
            );
        }
    }
    out
}

fn disassemble_chunk(chunk: &Chunk, constants: &[Value], name: &str, out: &mut String) {
    out.push_str(&format!("== {} ==\n", name));

    let mut offset = 0;
    while offset < chunk.len() {
        offset = disassemble_instruction(chunk, constants, offset, out);
    }
}

/// Render one instruction and return the offset of the next one.
fn disassemble_instruction(
    chunk: &Chunk,
    constants: &[Value],
    offset: usize,
    out: &mut String,
) -> usize {
    out.push_str(&format!("{:04} ", offset));

    let line = chunk.get_line(offset);
    if offset > 0 && chunk.get_line(offset - 1) == line {
        out.push_str("   | ");
    } else {
        out.push_str(&format!("{:4} ", line));
    }

    let byte = chunk.code[offset];
    let Some(op) = Op::from_byte(byte) else {
        out.push_str(&format!("?? {}\n", byte));
        return offset + 1;
    };
    let definition = op.definition();
    out.push_str(&format!("{:<18}", definition.name));

    let mut operand_offset = offset + 1;
    let mut operands = Vec::new();
    for width in definition.operand_widths {
        let operand = match width {
            2 => chunk.read_u16(operand_offset) as usize,
            _ => chunk.read_u8(operand_offset) as usize,
        };
        out.push_str(&format!(" {}", operand));
        operands.push(operand);
        operand_offset += width;
    }

    if let Some(annotation) = annotate(op, &operands, constants) {
        out.push_str(&format!(" ({})", annotation));
    }

    out.push('\n');
    operand_offset
}

/// For opcodes whose first operand indexes the constant pool, show the
/// constant itself.
fn annotate(op: Op, operands: &[usize], constants: &[Value]) -> Option<String> {
    let index = match op {
        Op::Constant
        | Op::Closure
        | Op::Class
        | Op::Method
        | Op::StaticMethod
        | Op::Getter
        | Op::GetProperty
        | Op::SetProperty
        | Op::GetSuper => operands.first().copied()?,
        _ => return None,
    };

    constants.get(index).map(|constant| match constant {
        Value::String(s) => format!("\"{}\"", s),
        other => other.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use crate::lexer::Scanner;
    use crate::parser::Parser;
    use crate::vm::compiler::Compiler;

    use super::*;

    fn compile(source: &str) -> Bytecode {
        let (tokens, _) = Scanner::new(source).scan_tokens();
        let mut parser = Parser::new(tokens);
        let program = parser.parse();
        Compiler::new().compile(&program).expect("compiles")
    }

    #[test]
    fn renders_offsets_mnemonics_and_constants() {
        let bytecode = compile("1 + 2;");
        let listing = disassemble_bytecode(&bytecode);
        assert!(listing.starts_with("== <script> ==\n"));

        let first = listing.lines().nth(1).unwrap();
        assert!(first.starts_with("0000 "), "line: {}", first);
        assert!(first.contains("OP_CONSTANT"), "line: {}", first);
        assert!(first.ends_with("(1)"), "line: {}", first);
        assert!(listing.contains("OP_ADD"));
        assert!(listing.contains("OP_POP"));
    }

    #[test]
    fn repeated_lines_render_as_bars() {
        let bytecode = compile("1 + 2;");
        let listing = disassemble_bytecode(&bytecode);
        assert!(listing.contains("   | "));
    }

    #[test]
    fn functions_in_the_pool_are_listed() {
        let bytecode = compile("function f() { return 1; }");
        let listing = disassemble_bytecode(&bytecode);
        assert!(listing.contains("== f =="));
        assert!(listing.contains("OP_RETURN"));
        assert!(listing.contains("OP_CLOSURE"));
    }
}
