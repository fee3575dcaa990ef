//! Abstract syntax tree produced by the parser.

pub mod expr;
pub mod stmt;

pub use expr::{BinaryOp, Expr, ExprKind, FunctionLiteral, LogicalOp, UnaryOp};
pub use stmt::{ClassDecl, FunctionDecl, MethodDecl, MethodKind, Program, Stmt, StmtKind};
