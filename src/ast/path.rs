//! Constant paths as written in source: `Foo::Bar`, `::Std::List`.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A possibly-absolute sequence of constant name segments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NamespacePath {
    pub segments: Vec<String>,
    /// `true` for paths written with a leading `::`.
    #[serde(default)]
    pub absolute: bool,
}

impl NamespacePath {
    pub fn relative<S: Into<String>>(segments: impl IntoIterator<Item = S>) -> Self {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
            absolute: false,
        }
    }

    pub fn absolute<S: Into<String>>(segments: impl IntoIterator<Item = S>) -> Self {
        Self {
            segments: segments.into_iter().map(Into::into).collect(),
            absolute: true,
        }
    }

    /// Parse `A::B` or `::A::B`. Empty segments are dropped.
    pub fn parse(text: &str) -> Self {
        let absolute = text.starts_with("::");
        let segments = text
            .split("::")
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        Self { segments, absolute }
    }

    pub fn first(&self) -> Option<&str> {
        self.segments.first().map(String::as_str)
    }

    pub fn last(&self) -> Option<&str> {
        self.segments.last().map(String::as_str)
    }
}

impl fmt::Display for NamespacePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.absolute {
            f.write_str("::")?;
        }
        f.write_str(&self.segments.join("::"))
    }
}
