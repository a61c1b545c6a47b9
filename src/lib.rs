//! Basalt: bytecode compiler for a class-based language with modules, mixins,
//! closures and destructuring patterns.
//!
//! This is the library root that exports all modules.
//!
//! # Pipeline
//!
//! A front end hands over a typed syntax tree (`ast::Program`) per compilation
//! unit. The compiler turns it into a tree of `CompiledFunction`s for a stack VM
//! and a list of diagnostics. Units share a `NamespaceRegistry`, so classes
//! declared by one unit can be reopened or subclassed by the next.

// Allow some clippy lints that are stylistic and not critical
#![allow(clippy::module_inception)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::type_complexity)]

pub mod ast;
pub mod bytecode;
pub mod compiler;
pub mod error;
pub mod span;

pub use bytecode::{disassemble, CompiledFunction};
pub use compiler::{compile, CompileOutput, CompilerOptions, NamespaceRegistry};
pub use error::{BasaltError, Diagnostic, Diagnostics};

use std::fs;
use std::path::Path;

/// Read a JSON-encoded syntax tree and compile it.
pub fn compile_file(
    path: &Path,
    options: &CompilerOptions,
    registry: &NamespaceRegistry,
) -> Result<CompileOutput, BasaltError> {
    let source = fs::read_to_string(path)?;
    let program: ast::Program = serde_json::from_str(&source)?;
    Ok(compile(&program, options, registry))
}
