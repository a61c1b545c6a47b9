//! Capture descriptors of a closure.

use crate::bytecode::opcode::{CLOSURE_TERMINATOR, UPVALUE_LOCAL_FLAG, UPVALUE_LONG_INDEX_FLAG};
use crate::error::CompileError;

const MAX_UPVALUES: usize = u16::MAX as usize;

/// Where the VM copies a captured variable from when it creates the closure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpvalueSource {
    /// A slot of the directly enclosing activation.
    ParentLocal(usize),
    /// An upvalue of the directly enclosing closure.
    ParentUpvalue(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpvalueDescriptor {
    pub name: String,
    pub source: UpvalueSource,
    pub mutable: bool,
}

/// Descriptors of one function, in first-capture order.
#[derive(Debug, Clone, Default)]
pub struct UpvalueList {
    descriptors: Vec<UpvalueDescriptor>,
}

impl UpvalueList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of the descriptor for `source`, adding one on first capture.
    pub fn capture(
        &mut self,
        name: &str,
        source: UpvalueSource,
        mutable: bool,
    ) -> Result<usize, CompileError> {
        if let Some(index) = self.descriptors.iter().position(|d| d.source == source) {
            return Ok(index);
        }
        if self.descriptors.len() > MAX_UPVALUES {
            return Err(CompileError::TooManyUpvalues);
        }
        self.descriptors.push(UpvalueDescriptor {
            name: name.to_string(),
            source,
            mutable,
        });
        Ok(self.descriptors.len() - 1)
    }

    pub fn find(&self, name: &str) -> Option<usize> {
        self.descriptors.iter().position(|d| d.name == name)
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Operand bytes following the function index of a `CLOSURE` instruction.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.descriptors.len() * 2 + 1);
        for descriptor in &self.descriptors {
            let (mut flags, index) = match descriptor.source {
                UpvalueSource::ParentLocal(slot) => (UPVALUE_LOCAL_FLAG, slot),
                UpvalueSource::ParentUpvalue(index) => (0, index),
            };
            match u8::try_from(index) {
                Ok(short) => {
                    out.push(flags);
                    out.push(short);
                }
                Err(_) => {
                    flags |= UPVALUE_LONG_INDEX_FLAG;
                    out.push(flags);
                    out.extend_from_slice(&(index as u16).to_be_bytes());
                }
            }
        }
        out.push(CLOSURE_TERMINATOR);
        out
    }
}
