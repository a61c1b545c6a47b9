//! Output model of the compiler: the instruction set, constant pool values,
//! line tables and compiled functions, plus a disassembler.
//!
//! # Architecture
//!
//! - `opcode`: opcode definitions and operand encoding families
//! - `value`: constant pool entries
//! - `ivar_table`: ordered instance variable layouts
//! - `line_table`: run-length byte to line mapping
//! - `function`: `CompiledFunction`, the unit handed to the VM
//! - `disassembler`: debug output for bytecode inspection

pub mod disassembler;
pub mod function;
pub mod ivar_table;
pub mod line_table;
pub mod opcode;
pub mod value;

pub use disassembler::disassemble;
pub use function::CompiledFunction;
pub use ivar_table::IvarIndexTable;
pub use line_table::{LineSpan, LineTable};
pub use opcode::{Encoding, IndexedFamily, OpCode};
pub use value::{Value, ValueKey};
