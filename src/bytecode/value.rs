//! Constant pool entries.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::bytecode::function::CompiledFunction;
use crate::bytecode::ivar_table::IvarIndexTable;

/// A value stored in a function's constant pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Nil,
    SmallInt(i64),
    Float(f64),
    String(String),
    Symbol(String),
    IvarIndices(IvarIndexTable),
    Function(Box<CompiledFunction>),
}

/// Identity used to de-duplicate pool entries. Functions and ivar tables have none.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueKey {
    Nil,
    Int(i64),
    Float(u64),
    String(String),
    Symbol(String),
}

impl Value {
    pub fn symbol(name: impl Into<String>) -> Self {
        Value::Symbol(name.into())
    }

    pub fn dedupe_key(&self) -> Option<ValueKey> {
        match self {
            Value::Nil => Some(ValueKey::Nil),
            Value::SmallInt(n) => Some(ValueKey::Int(*n)),
            Value::Float(f) => Some(ValueKey::Float(f.to_bits())),
            Value::String(s) => Some(ValueKey::String(s.clone())),
            Value::Symbol(s) => Some(ValueKey::Symbol(s.clone())),
            Value::IvarIndices(_) | Value::Function(_) => None,
        }
    }

    pub fn as_function(&self) -> Option<&CompiledFunction> {
        match self {
            Value::Function(func) => Some(func.as_ref()),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            Value::Symbol(s) => Some(s.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::SmallInt(n) => write!(f, "{}", n),
            Value::Float(x) => write!(f, "{:?}", x),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Symbol(s) => write!(f, ":{}", s),
            Value::IvarIndices(table) => write!(f, "{}", table),
            Value::Function(func) => write!(f, "<function: {}>", func.name),
        }
    }
}
