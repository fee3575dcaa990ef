//! Builtin functions, registered by index at compiler startup.
//!
//! The compiler reserves a builtin symbol for each entry in registration
//! order, so `BUILTINS[i]` is what `OP_GET_BUILTIN i` pushes.

use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::value::{format_number, Value};

/// Signature of a native function: the VM's output writer plus the
/// argument slice. Errors become runtime errors at the call site.
pub type BuiltinFn = fn(&mut dyn Write, &[Value]) -> Result<Value, String>;

/// A registered builtin.
#[derive(Debug)]
pub struct Builtin {
    pub name: &'static str,
    pub func: BuiltinFn,
}

pub static BUILTINS: &[Builtin] = &[
    Builtin {
        name: "print",
        func: builtin_print,
    },
    Builtin {
        name: "clock",
        func: builtin_clock,
    },
    Builtin {
        name: "len",
        func: builtin_len,
    },
    Builtin {
        name: "str",
        func: builtin_str,
    },
    Builtin {
        name: "type",
        func: builtin_type,
    },
    Builtin {
        name: "push",
        func: builtin_push,
    },
];

/// Writes each argument's display form on its own line; returns nil.
fn builtin_print(out: &mut dyn Write, args: &[Value]) -> Result<Value, String> {
    for arg in args {
        writeln!(out, "{}", arg).map_err(|e| format!("print failed: {}", e))?;
    }
    Ok(Value::Nil)
}

/// Seconds since the Unix epoch, as a number.
fn builtin_clock(_out: &mut dyn Write, args: &[Value]) -> Result<Value, String> {
    if !args.is_empty() {
        return Err(format!("clock takes no arguments, got {}", args.len()));
    }
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| format!("clock failed: {}", e))?;
    Ok(Value::Number(now.as_secs_f64()))
}

/// Length of a string (bytes), array (elements), or hash (entries).
fn builtin_len(_out: &mut dyn Write, args: &[Value]) -> Result<Value, String> {
    if args.len() != 1 {
        return Err(format!("len takes 1 argument, got {}", args.len()));
    }
    match &args[0] {
        Value::String(s) => Ok(Value::Number(s.len() as f64)),
        Value::Array(elements) => Ok(Value::Number(elements.borrow().len() as f64)),
        Value::Hash(entries) => Ok(Value::Number(entries.borrow().len() as f64)),
        other => Err(format!(
            "len does not support {} ({})",
            other.type_name(),
            format_value_brief(other)
        )),
    }
}

/// The display form of a value, as a string.
fn builtin_str(_out: &mut dyn Write, args: &[Value]) -> Result<Value, String> {
    if args.len() != 1 {
        return Err(format!("str takes 1 argument, got {}", args.len()));
    }
    Ok(Value::string(args[0].to_string()))
}

/// The name of a value's type.
fn builtin_type(_out: &mut dyn Write, args: &[Value]) -> Result<Value, String> {
    if args.len() != 1 {
        return Err(format!("type takes 1 argument, got {}", args.len()));
    }
    Ok(Value::string(args[0].type_name()))
}

/// Append a value to an array in place; returns the array.
fn builtin_push(_out: &mut dyn Write, args: &[Value]) -> Result<Value, String> {
    if args.len() != 2 {
        return Err(format!("push takes 2 arguments, got {}", args.len()));
    }
    match &args[0] {
        Value::Array(elements) => {
            elements.borrow_mut().push(args[1].clone());
            Ok(args[0].clone())
        }
        other => Err(format!("push expects an array, got {}", other.type_name())),
    }
}

fn format_value_brief(value: &Value) -> String {
    match value {
        Value::Number(n) => format_number(*n),
        other => other.to_string(),
    }
}
