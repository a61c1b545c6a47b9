//! Expression AST nodes.

use serde::{Deserialize, Serialize};

use crate::ast::path::NamespacePath;
use crate::ast::pattern::Pattern;
use crate::ast::stmt::{Parameter, Stmt};
use crate::span::Span;

/// An expression in the AST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expr {
    pub kind: ExprKind,
    pub span: Span,
}

impl Expr {
    pub fn new(kind: ExprKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Expressions whose value is their only effect.
    pub fn is_pure(&self) -> bool {
        matches!(
            self.kind,
            ExprKind::Nil
                | ExprKind::True
                | ExprKind::False
                | ExprKind::SelfValue
                | ExprKind::Int(_)
                | ExprKind::Float(_)
                | ExprKind::String(_)
                | ExprKind::Symbol(_)
                | ExprKind::Identifier(_)
                | ExprKind::InstanceVariable(_)
                | ExprKind::Constant(_)
        )
    }
}

/// A `key => value` pair in a map literal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapEntry {
    pub key: Expr,
    pub value: Expr,
}

/// One `case pattern then ...` arm of a switch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwitchCase {
    pub pattern: Pattern,
    pub body: Vec<Stmt>,
    pub span: Span,
}

/// Left-hand side of an assignment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AssignTarget {
    /// `foo = ...`
    Local(String),
    /// `@foo = ...`
    InstanceVariable(String),
}

/// All expression variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprKind {
    Nil,
    True,
    False,
    /// `self`
    SelfValue,
    /// Integer literal: 42
    Int(i64),
    /// Float literal: 3.14
    Float(f64),
    /// String literal: "hello"
    String(String),
    /// Symbol literal: :foo
    Symbol(String),

    /// List literal: [1, 2]
    List(Vec<Expr>),
    /// Tuple literal: %[1, 2]
    Tuple(Vec<Expr>),
    /// Map literal: { a => 1 }
    Map(Vec<MapEntry>),

    /// Local variable reference: foo
    Identifier(String),
    /// Instance variable reference: @foo
    InstanceVariable(String),
    /// Constant lookup: Foo::Bar
    Constant(NamespacePath),

    /// Assignment, optionally compound: a = b, a += b
    Assign {
        target: AssignTarget,
        operator: Option<BinaryOp>,
        value: Box<Expr>,
    },

    /// Binary operation: a + b
    Binary {
        operator: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    /// Unary operation: -a, !a
    Unary { operator: UnaryOp, operand: Box<Expr> },

    /// Short-circuit and: a && b
    LogicalAnd { left: Box<Expr>, right: Box<Expr> },

    /// Short-circuit or: a || b
    LogicalOr { left: Box<Expr>, right: Box<Expr> },

    /// Block expression: do ... end
    Do(Vec<Stmt>),

    /// Conditional expression: if cond then ... else ... end
    If {
        condition: Box<Expr>,
        then_branch: Vec<Stmt>,
        else_branch: Option<Vec<Stmt>>,
    },

    /// Pattern switch: switch x case [a, 1] then ... else ... end
    Switch {
        subject: Box<Expr>,
        cases: Vec<SwitchCase>,
        else_branch: Option<Vec<Stmt>>,
    },

    /// Closure literal: |a, b| -> a + b
    Closure {
        params: Vec<Parameter>,
        body: Vec<Stmt>,
    },

    /// Method call with an explicit receiver: foo.bar(1)
    MethodCall {
        receiver: Box<Expr>,
        name: String,
        arguments: Vec<Expr>,
    },

    /// Method call on `self`: bar(1)
    SelfCall { name: String, arguments: Vec<Expr> },

    /// Calling a callable value: f.(1)
    Call {
        callee: Box<Expr>,
        arguments: Vec<Expr>,
    },

    /// Subscript: list[0]
    Subscript { receiver: Box<Expr>, index: Box<Expr> },

    /// Instantiation: Foo(1, 2)
    New {
        class: NamespacePath,
        arguments: Vec<Expr>,
    },

    /// Raise an error value: throw expr
    Raise(Box<Expr>),
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Negate,
    Not,
}
