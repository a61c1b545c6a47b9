//! Diagnostics produced while compiling a unit, and the crate-level error type.

use std::fmt;

use crate::span::{Location, Span};
use thiserror::Error;

/// Problems that prevent a unit from producing bytecode.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("undefined local `{0}`")]
    UndefinedLocal(String),

    #[error("cannot access uninitialised local `{0}`")]
    UninitialisedLocal(String),

    #[error("cannot reassign a val: `{0}`")]
    ImmutableAssignment(String),

    #[error("cannot redeclare local `{0}` in the same scope")]
    RedeclaredLocal(String),

    #[error("duplicated parameter `{0}`")]
    DuplicateParameter(String),

    #[error("required parameter `{0}` cannot follow optional parameters")]
    RequiredAfterOptional(String),

    #[error("undefined constant `{0}`")]
    UndefinedConstant(String),

    #[error("ambiguous constant `{name}`, imported from both `{first}` and `{second}`")]
    AmbiguousConstant {
        name: String,
        first: String,
        second: String,
    },

    #[error("cannot redeclare constant `{0}`")]
    ConstantRedefinition(String),

    #[error("`{0}` is not a namespace")]
    NotANamespace(String),

    #[error("cannot redeclare {found} `{path}` as a {expected}")]
    NamespaceKindMismatch {
        path: String,
        expected: String,
        found: String,
    },

    #[error("{kind} `{path}` cannot have a superclass")]
    SuperclassOnNonClass { path: String, kind: String },

    #[error("superclass mismatch in `{path}`, expected `{existing}`, got `{given}`")]
    SuperclassMismatch {
        path: String,
        existing: String,
        given: String,
    },

    #[error("`{superclass}` is a {kind} and cannot be the superclass of `{path}`")]
    InvalidSuperclass {
        path: String,
        superclass: String,
        kind: String,
    },

    #[error("cannot include {kind} `{included}` in `{path}`, only mixins can be included")]
    IncludeNonMixin {
        path: String,
        included: String,
        kind: String,
    },

    #[error("circular superclass chain through `{0}`")]
    CircularInheritance(String),

    #[error("cannot add instance variables to `{class}` which already has a subclass `{subclass}`")]
    IvarsOnSubclassedClass { class: String, subclass: String },

    #[error("instance variables of `{0}` were changed by another unit during compilation")]
    ConcurrentLayoutChange(String),

    #[error("undefined instance variable `@{0}`")]
    UndefinedInstanceVariable(String),

    #[error("cannot use instance variables in this context")]
    InstanceVariablesUnavailable,

    #[error("cannot declare {construct} {context}")]
    IllegalConstruct { construct: String, context: String },

    #[error("too many local variables in one function")]
    TooManyLocals,

    #[error("too many constants in one function")]
    TooManyConstants,

    #[error("too many captured variables in one closure")]
    TooManyUpvalues,

    #[error("too many arguments in one call")]
    TooManyArguments,

    #[error("too many elements in one literal")]
    TooManyElements,

    #[error("too much code to jump over")]
    JumpTooLarge,
}

impl CompileError {
    pub fn illegal(construct: impl Into<String>, context: impl Into<String>) -> Self {
        Self::IllegalConstruct {
            construct: construct.into(),
            context: context.into(),
        }
    }

    pub fn undefined_constant(path: impl fmt::Display) -> Self {
        Self::UndefinedConstant(path.to_string())
    }

    pub fn kind_mismatch(
        path: impl Into<String>,
        expected: impl Into<String>,
        found: impl Into<String>,
    ) -> Self {
        Self::NamespaceKindMismatch {
            path: path.into(),
            expected: expected.into(),
            found: found.into(),
        }
    }
}

/// Advisories that never suppress output.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileWarning {
    #[error("unused expression value")]
    UnusedValue,

    #[error("unreachable code")]
    UnreachableCode,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Failure,
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Failure => f.write_str("failure"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticKind {
    Failure(CompileError),
    Warning(CompileWarning),
}

/// One located message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub location: Location,
}

impl Diagnostic {
    pub fn severity(&self) -> Severity {
        match self.kind {
            DiagnosticKind::Failure(_) => Severity::Failure,
            DiagnosticKind::Warning(_) => Severity::Warning,
        }
    }

    pub fn message(&self) -> String {
        match &self.kind {
            DiagnosticKind::Failure(err) => err.to_string(),
            DiagnosticKind::Warning(warn) => warn.to_string(),
        }
    }

    pub fn span(&self) -> Span {
        self.location.span
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}: {}", self.location, self.severity(), self.message())
    }
}

/// Ordered list of diagnostics for one compilation unit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_failure(&mut self, error: CompileError, location: Location) {
        self.entries.push(Diagnostic {
            kind: DiagnosticKind::Failure(error),
            location,
        });
    }

    pub fn push_warning(&mut self, warning: CompileWarning, location: Location) {
        self.entries.push(Diagnostic {
            kind: DiagnosticKind::Warning(warning),
            location,
        });
    }

    pub fn has_failures(&self) -> bool {
        self.entries
            .iter()
            .any(|d| d.severity() == Severity::Failure)
    }

    pub fn failures(&self) -> impl Iterator<Item = &CompileError> {
        self.entries.iter().filter_map(|d| match &d.kind {
            DiagnosticKind::Failure(err) => Some(err),
            DiagnosticKind::Warning(_) => None,
        })
    }

    pub fn warnings(&self) -> impl Iterator<Item = &CompileWarning> {
        self.entries.iter().filter_map(|d| match &d.kind {
            DiagnosticKind::Warning(warn) => Some(warn),
            DiagnosticKind::Failure(_) => None,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Crate-level error for the driver.
#[derive(Debug, Error)]
pub enum BasaltError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid syntax tree: {0}")]
    Json(#[from] serde_json::Error),

    #[error("compilation failed with {failures} failure(s)")]
    Compile { failures: usize },
}
