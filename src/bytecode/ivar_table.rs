//! Ordered instance-variable layouts.

use std::fmt;

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

/// Maps instance variable names to storage slots. The slot of a name is its
/// insertion position, so inherited entries keep their offsets when a subclass
/// appends its own.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IvarIndexTable {
    names: IndexSet<String>,
}

impl IvarIndexTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Slot of `name`, appending it at the end when missing.
    pub fn insert(&mut self, name: &str) -> usize {
        match self.names.get_index_of(name) {
            Some(index) => index,
            None => self.names.insert_full(name.to_string()).0,
        }
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.names.get_index_of(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.names.iter().enumerate().map(|(i, n)| (n.as_str(), i))
    }

    /// True when every entry of `other` sits at the same slot here.
    pub fn extends(&self, other: &IvarIndexTable) -> bool {
        other.iter().all(|(name, index)| self.index_of(name) == Some(index))
    }
}

impl<S: AsRef<str>> FromIterator<S> for IvarIndexTable {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut table = Self::new();
        for name in iter {
            table.insert(name.as_ref());
        }
        table
    }
}

impl fmt::Display for IvarIndexTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IvarIndices{{")?;
        for (i, (name, index)) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}: {}", name, index)?;
        }
        write!(f, "}}")
    }
}
