//! Expression AST nodes.

use crate::ast::stmt::Stmt;

/// An expression with the source line of its originating token.
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    pub kind: ExprKind,
    pub line: usize,
}

impl Expr {
    pub fn new(kind: ExprKind, line: usize) -> Self {
        Self { kind, line }
    }
}

/// All expression variants.
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Number literal: 42, 3.75
    NumberLiteral(f64),
    /// String literal: "hello"
    StringLiteral(String),
    /// Boolean literal: true, false
    BoolLiteral(bool),
    /// Nil literal
    NilLiteral,

    /// Variable reference: foo
    Identifier(String),

    /// Grouping: (expr)
    Grouping(Box<Expr>),

    /// Unary operation: -x, !x
    Unary {
        operator: UnaryOp,
        operand: Box<Expr>,
    },

    /// Binary operation: a + b
    Binary {
        left: Box<Expr>,
        operator: BinaryOp,
        right: Box<Expr>,
    },

    /// Short-circuiting logical operation: a and b, a or b
    Logical {
        left: Box<Expr>,
        operator: LogicalOp,
        right: Box<Expr>,
    },

    /// Conditional expression: cond ? then : else
    Ternary {
        condition: Box<Expr>,
        then_branch: Box<Expr>,
        else_branch: Box<Expr>,
    },

    /// Assignment to a variable: x = expr
    Assign { name: String, value: Box<Expr> },

    /// Property read: obj.name
    Get { object: Box<Expr>, name: String },

    /// Property write: obj.name = expr
    Set {
        object: Box<Expr>,
        name: String,
        value: Box<Expr>,
    },

    /// Call: callee(args)
    Call {
        callee: Box<Expr>,
        arguments: Vec<Expr>,
    },

    /// this reference
    This,

    /// super.method reference
    Super { method: String },

    /// Function literal: function [name](params) { body }
    Function(FunctionLiteral),

    /// Array literal: {e1, e2, ...}
    Array(Vec<Expr>),

    /// Hash literal: [k1: v1, k2: v2, ...]
    Hash(Vec<(Expr, Expr)>),

    /// Index read: obj[index]
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
    },
}

/// An anonymous (optionally named) function expression.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionLiteral {
    pub name: Option<String>,
    pub params: Vec<String>,
    pub body: Vec<Stmt>,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BinaryOp::Add => write!(f, "+"),
            BinaryOp::Subtract => write!(f, "-"),
            BinaryOp::Multiply => write!(f, "*"),
            BinaryOp::Divide => write!(f, "/"),
            BinaryOp::Equal => write!(f, "=="),
            BinaryOp::NotEqual => write!(f, "!="),
            BinaryOp::Less => write!(f, "<"),
            BinaryOp::LessEqual => write!(f, "<="),
            BinaryOp::Greater => write!(f, ">"),
            BinaryOp::GreaterEqual => write!(f, ">="),
        }
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Negate,
    Not,
}

impl std::fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnaryOp::Negate => write!(f, "-"),
            UnaryOp::Not => write!(f, "!"),
        }
    }
}

/// Logical operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}
