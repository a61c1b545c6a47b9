//! Destructuring patterns used by declarations and switch cases.

use serde::{Deserialize, Serialize};

use crate::span::Span;

/// A pattern node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pattern {
    pub kind: PatternKind,
    pub span: Span,
}

impl Pattern {
    pub fn new(kind: PatternKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Literal values that can appear in patterns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Nil,
    True,
    False,
    Int(i64),
    Float(f64),
    String(String),
    Symbol(String),
}

/// Whether a sequence pattern expects a list or a tuple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SequenceKind {
    List,
    Tuple,
}

/// A `*rest` element inside a sequence pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RestElement {
    /// Number of positional subpatterns written before the rest element.
    pub position: usize,
    /// `None` for a bare `*`.
    pub binding: Option<String>,
}

/// One `key => pattern` entry of a map pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapPatternEntry {
    pub key: Literal,
    pub pattern: Pattern,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PatternKind {
    /// `_`
    Wildcard,
    /// `name`
    Binding(String),
    /// `1`, `"foo"`, `:bar`, `nil`
    Literal(Literal),
    /// `[a, 1, *rest]` or `%[a, b]`
    Sequence {
        kind: SequenceKind,
        elements: Vec<Pattern>,
        rest: Option<RestElement>,
    },
    /// `{ :a => x, "b" => 2 }`
    Map(Vec<MapPatternEntry>),
}
