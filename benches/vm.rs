//! Benchmarks for the compile + execute pipeline.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use lume::vm::Vm;

const FIB_RECURSIVE: &str = "\
function fib(n) {
  if (n < 2) { return n; }
  return fib(n - 2) + fib(n - 1);
}
fib(18);
";

const FIB_ITERATIVE: &str = "\
var a = 0;
var b = 1;
for (var i = 0; i < 500; i = i + 1) {
  var next = a + b;
  a = b;
  b = next;
}
";

/// Parse source into bytecode.
fn compile(source: &str) -> lume::vm::Bytecode {
    lume::compile_source(source).expect("compile error")
}

/// Compile and execute, discarding any builtin output.
fn compile_and_run(source: &str) {
    let bytecode = compile(source);
    let mut vm = Vm::with_output(Box::new(std::io::sink()));
    vm.run(bytecode).expect("runtime error");
}

fn fib_recursive(c: &mut Criterion) {
    c.bench_function("vm_fib_recursive", |b| {
        b.iter(|| compile_and_run(black_box(FIB_RECURSIVE)))
    });
}

fn fib_iterative(c: &mut Criterion) {
    c.bench_function("vm_fib_iterative", |b| {
        b.iter(|| compile_and_run(black_box(FIB_ITERATIVE)))
    });
}

fn compile_only(c: &mut Criterion) {
    c.bench_function("compile_fib_recursive", |b| {
        b.iter(|| compile(black_box(FIB_RECURSIVE)))
    });
}

criterion_group!(benches, fib_recursive, fib_iterative, compile_only);
criterion_main!(benches);
