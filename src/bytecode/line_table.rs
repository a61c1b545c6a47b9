//! Run-length mapping from instructions to source lines. Operand bytes
//! belong to their opcode and are not counted.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSpan {
    pub line: usize,
    /// Number of consecutive instructions emitted for `line`.
    pub instruction_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineTable {
    pub entries: Vec<LineSpan>,
}

impl LineTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attribute `count` more instructions to `line`, extending the last run when it matches.
    pub fn record(&mut self, line: usize, count: usize) {
        if count == 0 {
            return;
        }
        match self.entries.last_mut() {
            Some(last) if last.line == line => last.instruction_count += count,
            _ => self.entries.push(LineSpan {
                line,
                instruction_count: count,
            }),
        }
    }

    /// Attribute `count` instructions inserted before everything else.
    pub fn prepend(&mut self, line: usize, count: usize) {
        if count == 0 {
            return;
        }
        match self.entries.first_mut() {
            Some(first) if first.line == line => first.instruction_count += count,
            _ => self.entries.insert(
                0,
                LineSpan {
                    line,
                    instruction_count: count,
                },
            ),
        }
    }

    pub fn total(&self) -> usize {
        self.entries.iter().map(|e| e.instruction_count).sum()
    }

    /// Source line of the instruction at position `index`.
    pub fn line_at(&self, index: usize) -> Option<usize> {
        let mut end = 0;
        for entry in &self.entries {
            end += entry.instruction_count;
            if index < end {
                return Some(entry.line);
            }
        }
        None
    }
}
