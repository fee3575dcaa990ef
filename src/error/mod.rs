//! Error types for all pipeline phases.
//!
//! Lexing and parsing accumulate errors and keep going; compilation and
//! execution stop at the first error. Every error carries the 1-based
//! source line it was detected on.

use thiserror::Error;

/// Lexer errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LexError {
    #[error("[line {line}] Error: Unexpected character '{ch}'")]
    UnexpectedCharacter { ch: char, line: usize },

    #[error("[line {line}] Error: Unterminated string")]
    UnterminatedString { line: usize },
}

impl LexError {
    pub fn unexpected_character(ch: char, line: usize) -> Self {
        Self::UnexpectedCharacter { ch, line }
    }

    pub fn unterminated_string(line: usize) -> Self {
        Self::UnterminatedString { line }
    }

    pub fn line(&self) -> usize {
        match self {
            Self::UnexpectedCharacter { line, .. } => *line,
            Self::UnterminatedString { line } => *line,
        }
    }
}

/// Parser errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("[line {line}] Error: Expected {expected}, got '{found}'")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: usize,
    },

    #[error("[line {line}] Error: Expected expression")]
    ExpectedExpression { line: usize },

    #[error("[line {line}] Error: Invalid assignment target")]
    InvalidAssignmentTarget { line: usize },

    #[error("[line {line}] Error: Can't have more than 255 arguments")]
    TooManyArguments { line: usize },

    #[error("[line {line}] Error: Can't have more than 255 parameters")]
    TooManyParameters { line: usize },

    #[error("[line {line}] Error: A class can't inherit from itself")]
    SelfInheritance { line: usize },

    #[error("[line {line}] Error: Invalid method declaration")]
    InvalidMethodDeclaration { line: usize },

    #[error("[line {line}] Error: Invalid number '{lexeme}'")]
    InvalidNumber { lexeme: String, line: usize },
}

impl ParseError {
    pub fn unexpected_token(
        expected: impl Into<String>,
        found: impl Into<String>,
        line: usize,
    ) -> Self {
        Self::UnexpectedToken {
            expected: expected.into(),
            found: found.into(),
            line,
        }
    }

    pub fn expected_expression(line: usize) -> Self {
        Self::ExpectedExpression { line }
    }

    pub fn invalid_assignment_target(line: usize) -> Self {
        Self::InvalidAssignmentTarget { line }
    }

    pub fn line(&self) -> usize {
        match self {
            Self::UnexpectedToken { line, .. } => *line,
            Self::ExpectedExpression { line } => *line,
            Self::InvalidAssignmentTarget { line } => *line,
            Self::TooManyArguments { line } => *line,
            Self::TooManyParameters { line } => *line,
            Self::SelfInheritance { line } => *line,
            Self::InvalidMethodDeclaration { line } => *line,
            Self::InvalidNumber { line, .. } => *line,
        }
    }
}

/// Bytecode compilation errors. The compiler halts on the first one.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CompileError {
    #[error("[line {line}] Error: Already a variable named '{name}' in this scope")]
    Redefinition { name: String, line: usize },

    #[error("[line {line}] Error: Undefined identifier '{name}'")]
    UndefinedIdentifier { name: String, line: usize },

    #[error("[line {line}] Error: Can't return from top-level code")]
    TopLevelReturn { line: usize },

    #[error("[line {line}] Error: Can't return a value from an initializer")]
    ReturnFromInitializer { line: usize },

    #[error("[line {line}] Error: Too much code to jump over")]
    JumpTooLarge { line: usize },

    #[error("[line {line}] Error: Duplicate method '{name}' in class '{class}'")]
    DuplicateMethod {
        class: String,
        name: String,
        line: usize,
    },

    #[error("[line {line}] Error: Can't use 'this' outside of a class")]
    ThisOutsideClass { line: usize },

    #[error("[line {line}] Error: Can't use 'super' outside of a class with a superclass")]
    SuperOutsideClass { line: usize },

    #[error("[line {line}] Error: Can't use '{keyword}' outside of a loop")]
    NotInLoop { keyword: &'static str, line: usize },

    #[error("[line {line}] Error: Can't assign to builtin '{name}'")]
    AssignToBuiltin { name: String, line: usize },

    #[error("[line {line}] Error: Too many constants in one program")]
    TooManyConstants { line: usize },

    #[error("[line {line}] Error: Too many local variables in function")]
    TooManyLocals { line: usize },
}

impl CompileError {
    pub fn redefinition(name: impl Into<String>, line: usize) -> Self {
        Self::Redefinition {
            name: name.into(),
            line,
        }
    }

    pub fn undefined_identifier(name: impl Into<String>, line: usize) -> Self {
        Self::UndefinedIdentifier {
            name: name.into(),
            line,
        }
    }

    pub fn line(&self) -> usize {
        match self {
            Self::Redefinition { line, .. } => *line,
            Self::UndefinedIdentifier { line, .. } => *line,
            Self::TopLevelReturn { line } => *line,
            Self::ReturnFromInitializer { line } => *line,
            Self::JumpTooLarge { line } => *line,
            Self::DuplicateMethod { line, .. } => *line,
            Self::ThisOutsideClass { line } => *line,
            Self::SuperOutsideClass { line } => *line,
            Self::NotInLoop { line, .. } => *line,
            Self::AssignToBuiltin { line, .. } => *line,
            Self::TooManyConstants { line } => *line,
            Self::TooManyLocals { line } => *line,
        }
    }
}

/// Runtime errors. The VM halts on the first one and leaves its call-frame
/// stack intact so a trace can be printed.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RuntimeError {
    #[error("[line {line}] Error: {message}")]
    TypeMismatch { message: String, line: usize },

    #[error("[line {line}] Error: Division by zero")]
    DivisionByZero { line: usize },

    #[error("[line {line}] Error: Variable is not initialized")]
    UninitializedVariable { line: usize },

    #[error("[line {line}] Error: Expected {expected} arguments but got {got}")]
    WrongArity {
        expected: usize,
        got: usize,
        line: usize,
    },

    #[error("[line {line}] Error: Can only call functions and classes")]
    NotCallable { line: usize },

    #[error("[line {line}] Error: Only instances have properties")]
    NotAnInstance { line: usize },

    #[error("[line {line}] Error: Undefined property '{name}'")]
    UndefinedProperty { name: String, line: usize },

    #[error("[line {line}] Error: Unusable as hash key: {type_name}")]
    UnusableHashKey {
        type_name: &'static str,
        line: usize,
    },

    #[error("[line {line}] Error: Stack overflow")]
    StackOverflow { line: usize },

    #[error("[line {line}] Error: Frame overflow (call nesting too deep)")]
    FrameOverflow { line: usize },

    #[error("[line {line}] Error: {message}")]
    Builtin { message: String, line: usize },

    #[error("[line {line}] Error: Corrupt bytecode: {message}")]
    CorruptBytecode { message: String, line: usize },
}

impl RuntimeError {
    pub fn type_mismatch(message: impl Into<String>, line: usize) -> Self {
        Self::TypeMismatch {
            message: message.into(),
            line,
        }
    }

    pub fn corrupt(message: impl Into<String>, line: usize) -> Self {
        Self::CorruptBytecode {
            message: message.into(),
            line,
        }
    }

    pub fn line(&self) -> usize {
        match self {
            Self::TypeMismatch { line, .. } => *line,
            Self::DivisionByZero { line } => *line,
            Self::UninitializedVariable { line } => *line,
            Self::WrongArity { line, .. } => *line,
            Self::NotCallable { line } => *line,
            Self::NotAnInstance { line } => *line,
            Self::UndefinedProperty { line, .. } => *line,
            Self::UnusableHashKey { line, .. } => *line,
            Self::StackOverflow { line } => *line,
            Self::FrameOverflow { line } => *line,
            Self::Builtin { line, .. } => *line,
            Self::CorruptBytecode { line, .. } => *line,
        }
    }
}

/// A unified error for the whole pipeline. Lexing and parsing report every
/// error they collected; compilation and execution report the first.
#[derive(Debug, Error)]
pub enum LumeError {
    #[error("{}", format_list(.0))]
    Lex(Vec<LexError>),

    #[error("{}", format_list(.0))]
    Parse(Vec<ParseError>),

    #[error("{0}")]
    Compile(#[from] CompileError),

    #[error("{0}")]
    Runtime(#[from] RuntimeError),
}

fn format_list(errors: &[impl std::fmt::Display]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}
