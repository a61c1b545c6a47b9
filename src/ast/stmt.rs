//! Statement AST nodes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::expr::Expr;
use crate::ast::path::NamespacePath;
use crate::ast::pattern::Pattern;
use crate::span::Span;

/// A statement in the AST.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
}

impl Stmt {
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Statement variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StmtKind {
    /// Expression statement
    Expression(Expr),

    /// Return statement: return expr
    Return(Option<Expr>),

    /// While loop: while cond do ... end
    While { condition: Expr, body: Vec<Stmt> },

    /// Variable declaration: var x: Int = 1, val y = 2
    Variable(VariableDecl),

    /// Destructuring declaration: var [1, a] = list
    PatternVariable {
        pattern: Pattern,
        mutable: bool,
        initializer: Expr,
    },

    /// Constant declaration: const Foo: Int = 3
    Constant {
        name: String,
        type_annotation: Option<String>,
        value: Expr,
    },

    /// module / class / mixin / interface declaration
    Namespace(NamespaceDecl),

    /// singleton ... end
    Singleton(Vec<Stmt>),

    /// def foo(a, b = 1) ... end
    Method(MethodDecl),

    /// sig foo(a: Int): String
    MethodSignature { name: String, params: Vec<Parameter> },

    /// getter / setter / attr
    Attribute {
        kind: AttributeKind,
        entries: Vec<AttributeEntry>,
    },

    /// alias new_name = old_name, ...
    Alias(Vec<AliasEntry>),

    /// Instance variable declaration: var @foo: Int
    InstanceVariable {
        name: String,
        type_annotation: Option<String>,
    },

    /// include Foo, Bar
    Include(Vec<NamespacePath>),

    /// using Foo::Bar, Baz as Q, Qux::*
    Using(Vec<UsingEntry>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VariableDecl {
    pub name: String,
    /// `var` when true, `val` otherwise.
    pub mutable: bool,
    pub type_annotation: Option<String>,
    pub initializer: Option<Expr>,
}

/// The four kinds of namespace declarations share one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NamespaceKind {
    Module,
    Class,
    Mixin,
    Interface,
}

impl NamespaceKind {
    pub fn name(self) -> &'static str {
        match self {
            NamespaceKind::Module => "module",
            NamespaceKind::Class => "class",
            NamespaceKind::Mixin => "mixin",
            NamespaceKind::Interface => "interface",
        }
    }

    /// Operand byte of `DEF_NAMESPACE`.
    pub fn tag(self) -> u8 {
        match self {
            NamespaceKind::Module => 0,
            NamespaceKind::Class => 1,
            NamespaceKind::Mixin => 2,
            NamespaceKind::Interface => 3,
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(NamespaceKind::Module),
            1 => Some(NamespaceKind::Class),
            2 => Some(NamespaceKind::Mixin),
            3 => Some(NamespaceKind::Interface),
            _ => None,
        }
    }
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamespaceDecl {
    pub kind: NamespaceKind,
    pub path: NamespacePath,
    /// `< Parent`; only classes may carry one.
    pub superclass: Option<NamespacePath>,
    pub body: Vec<Stmt>,
}

/// Function parameter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub default: Option<Expr>,
    pub type_annotation: Option<String>,
    pub span: Span,
}

impl Parameter {
    pub fn required(name: impl Into<String>, span: Span) -> Self {
        Self {
            name: name.into(),
            default: None,
            type_annotation: None,
            span,
        }
    }

    pub fn optional(name: impl Into<String>, default: Expr, span: Span) -> Self {
        Self {
            name: name.into(),
            default: Some(default),
            type_annotation: None,
            span,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDecl {
    pub name: String,
    pub params: Vec<Parameter>,
    pub body: Vec<Stmt>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeKind {
    Getter,
    Setter,
    /// Both getter and setter.
    Accessor,
}

impl AttributeKind {
    pub fn keyword(self) -> &'static str {
        match self {
            AttributeKind::Getter => "getter",
            AttributeKind::Setter => "setter",
            AttributeKind::Accessor => "attr",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeEntry {
    pub name: String,
    pub type_annotation: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AliasEntry {
    pub new_name: String,
    pub old_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum UsingEntry {
    /// `using A::B` or `using A::B as C`
    Constant {
        path: NamespacePath,
        alias: Option<String>,
    },
    /// `using A::*`
    AllConstants(NamespacePath),
}

/// A complete compilation unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub statements: Vec<Stmt>,
    #[serde(default)]
    pub span: Span,
}

impl Program {
    pub fn new(statements: Vec<Stmt>) -> Self {
        let span = match (statements.first(), statements.last()) {
            (Some(first), Some(last)) => first.span.join(last.span),
            _ => Span::default(),
        };
        Self { statements, span }
    }
}
