//! The unit of compiled code.

use serde::{Deserialize, Serialize};

use crate::bytecode::line_table::LineTable;
use crate::bytecode::value::Value;
use crate::span::Location;

/// Bytecode, constants and metadata of one function. Nested functions live in the
/// constant pool of their parent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledFunction {
    pub name: String,
    pub instructions: Vec<u8>,
    pub location: Location,
    pub line_table: LineTable,
    pub constants: Vec<Value>,
    pub required_params: usize,
    pub optional_params: usize,
    pub upvalue_count: usize,
}

impl CompiledFunction {
    /// Functions stored directly in this function's pool.
    pub fn nested_functions(&self) -> impl Iterator<Item = &CompiledFunction> {
        self.constants.iter().filter_map(Value::as_function)
    }

    /// First nested function called `name`, searching depth-first.
    pub fn find(&self, name: &str) -> Option<&CompiledFunction> {
        if self.name == name {
            return Some(self);
        }
        self.nested_functions().find_map(|f| f.find(name))
    }

    /// Visit this function and every nested one, parents first.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a CompiledFunction)) {
        visit(self);
        for nested in self.nested_functions() {
            nested.walk(visit);
        }
    }
}
