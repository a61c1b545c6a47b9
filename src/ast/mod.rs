//! Typed syntax tree consumed by the compiler.
//!
//! The front end (lexer, parser, type checker) lives outside this crate; it hands
//! over one `Program` per compilation unit. Every node derives serde traits so the
//! tree can also arrive as JSON.

pub mod expr;
pub mod path;
pub mod pattern;
pub mod stmt;

pub use expr::{AssignTarget, BinaryOp, Expr, ExprKind, MapEntry, SwitchCase, UnaryOp};
pub use path::NamespacePath;
pub use pattern::{Literal, MapPatternEntry, Pattern, PatternKind, RestElement, SequenceKind};
pub use stmt::{
    AliasEntry, AttributeEntry, AttributeKind, MethodDecl, NamespaceDecl, NamespaceKind,
    Parameter, Program, Stmt, StmtKind, UsingEntry, VariableDecl,
};
