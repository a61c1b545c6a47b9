//! Which declarations are legal where.

use std::fmt;

use crate::ast::NamespaceKind;

/// The construct whose body is being compiled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Context {
    TopLevel,
    /// Directly inside a namespace body. `valid` is false when the namespace
    /// itself was declared somewhere illegal.
    Namespace { kind: NamespaceKind, valid: bool },
    Singleton { owner: NamespaceKind, valid: bool },
    /// Method, closure and block bodies.
    Body,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Declaration {
    Method,
    Signature,
    Getter,
    Setter,
    Accessor,
    Alias,
    Singleton,
    Namespace(NamespaceKind),
    InstanceVariable,
    Include,
    Constant,
}

impl Declaration {
    /// Plural noun used in diagnostics.
    pub fn noun(self) -> &'static str {
        match self {
            Declaration::Method => "methods",
            Declaration::Signature => "method signatures",
            Declaration::Getter => "getters",
            Declaration::Setter => "setters",
            Declaration::Accessor => "attribute accessors",
            Declaration::Alias => "aliases",
            Declaration::Singleton => "singleton blocks",
            Declaration::Namespace(NamespaceKind::Module) => "modules",
            Declaration::Namespace(NamespaceKind::Class) => "classes",
            Declaration::Namespace(NamespaceKind::Mixin) => "mixins",
            Declaration::Namespace(NamespaceKind::Interface) => "interfaces",
            Declaration::InstanceVariable => "instance variables",
            Declaration::Include => "includes",
            Declaration::Constant => "constants",
        }
    }
}

impl Context {
    pub fn permits(self, declaration: Declaration) -> bool {
        use Context::*;
        use NamespaceKind::*;

        match declaration {
            Declaration::Method => match self {
                TopLevel => true,
                Namespace { kind, valid } => valid && kind != Interface,
                Singleton { valid, .. } => valid,
                Body => false,
            },
            Declaration::Signature => matches!(
                self,
                Namespace {
                    kind: Interface,
                    valid: true
                }
            ),
            Declaration::Getter
            | Declaration::Setter
            | Declaration::Accessor
            | Declaration::InstanceVariable => match self {
                Namespace { kind, valid } => valid && matches!(kind, Class | Mixin),
                Singleton { valid, .. } => valid,
                TopLevel | Body => false,
            },
            Declaration::Alias => match self {
                Namespace { kind, valid } => valid && kind != Interface,
                Singleton { valid, .. } => valid,
                TopLevel | Body => false,
            },
            Declaration::Singleton => match self {
                Namespace { kind, valid } => valid && matches!(kind, Class | Module | Mixin),
                TopLevel | Singleton { .. } | Body => false,
            },
            Declaration::Include => match self {
                Namespace { kind, valid } => valid && matches!(kind, Class | Mixin),
                TopLevel | Singleton { .. } | Body => false,
            },
            Declaration::Namespace(_) | Declaration::Constant => match self {
                TopLevel => true,
                Namespace { valid, .. } => valid,
                Singleton { .. } | Body => false,
            },
        }
    }
}

impl fmt::Display for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Context::TopLevel => f.write_str("at the top level"),
            Context::Namespace {
                kind: NamespaceKind::Interface,
                valid: true,
            } => f.write_str("in an interface"),
            Context::Namespace { kind, valid: true } => write!(f, "in a {}", kind),
            Context::Singleton { valid: true, .. } => f.write_str("in a singleton block"),
            Context::Namespace { valid: false, .. } | Context::Singleton { valid: false, .. } => {
                f.write_str("in this context")
            }
            Context::Body => f.write_str("in a method or block body"),
        }
    }
}
