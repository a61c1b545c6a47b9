//! Scope management for local slot allocation during compilation.

use std::ops::Range;

use log::trace;

use crate::error::CompileError;

/// Highest slot index an operand can address.
pub const MAX_SLOT: usize = u16::MAX as usize;

/// A local variable tracked during compilation.
#[derive(Debug, Clone)]
pub struct LocalBinding {
    pub name: String,
    pub slot: usize,
    pub initialized: bool,
    /// `var` vs `val`
    pub mutable: bool,
    /// Captured by a closure; closed when its scope ends.
    pub captured: bool,
    /// Compiler-generated temporary, never found by name.
    pub hidden: bool,
}

#[derive(Debug, Default)]
struct Scope {
    locals: Vec<LocalBinding>,
    base: usize,
}

/// Slots handed back when a scope ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleasedScope {
    pub slots: Range<usize>,
    /// Captured slots in declaration order.
    pub captured: Vec<usize>,
}

/// Lexical scopes of one function. Slot 0 holds the receiver; locals start at 1.
#[derive(Debug)]
pub struct ScopeStack {
    scopes: Vec<Scope>,
    watermark: usize,
    high_water: usize,
}

impl Default for ScopeStack {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeStack {
    pub fn new() -> Self {
        Self {
            scopes: vec![Scope {
                locals: Vec::new(),
                base: 1,
            }],
            watermark: 1,
            high_water: 1,
        }
    }

    pub fn enter_scope(&mut self) {
        self.scopes.push(Scope {
            locals: Vec::new(),
            base: self.watermark,
        });
    }

    /// Close the innermost scope, lowering the watermark to where it began.
    pub fn exit_scope(&mut self) -> ReleasedScope {
        let Some(scope) = self.scopes.pop() else {
            return ReleasedScope {
                slots: self.watermark..self.watermark,
                captured: Vec::new(),
            };
        };
        let released = ReleasedScope {
            slots: scope.base..self.watermark,
            captured: scope
                .locals
                .iter()
                .filter(|l| l.captured)
                .map(|l| l.slot)
                .collect(),
        };
        trace!(
            "scope exit: released slots {:?}, closing {:?}",
            released.slots,
            released.captured
        );
        self.watermark = scope.base;
        released
    }

    /// Declare `name` in the innermost scope and give it the next free slot.
    pub fn declare(&mut self, name: &str, mutable: bool) -> Result<usize, CompileError> {
        let redeclared = self
            .scopes
            .last()
            .is_some_and(|s| s.locals.iter().any(|l| !l.hidden && l.name == name));
        if redeclared {
            return Err(CompileError::RedeclaredLocal(name.to_string()));
        }
        self.allocate(name, mutable, false)
    }

    /// Reserve an unnamed slot for a compiler temporary.
    pub fn declare_hidden(&mut self, purpose: &str) -> Result<usize, CompileError> {
        let slot = self.allocate(purpose, false, true)?;
        self.mark_initialized(slot);
        Ok(slot)
    }

    fn allocate(&mut self, name: &str, mutable: bool, hidden: bool) -> Result<usize, CompileError> {
        let slot = self.watermark;
        if slot > MAX_SLOT {
            return Err(CompileError::TooManyLocals);
        }
        self.watermark += 1;
        self.high_water = self.high_water.max(self.watermark);
        let binding = LocalBinding {
            name: name.to_string(),
            slot,
            initialized: false,
            mutable,
            captured: false,
            hidden,
        };
        self.innermost_mut().locals.push(binding);
        Ok(slot)
    }

    /// Innermost visible binding called `name`.
    pub fn lookup(&self, name: &str) -> Option<&LocalBinding> {
        self.scopes
            .iter()
            .rev()
            .flat_map(|s| s.locals.iter().rev())
            .find(|l| !l.hidden && l.name == name)
    }

    fn binding_mut(&mut self, slot: usize) -> Option<&mut LocalBinding> {
        self.scopes
            .iter_mut()
            .rev()
            .flat_map(|s| s.locals.iter_mut().rev())
            .find(|l| l.slot == slot)
    }

    pub fn mark_initialized(&mut self, slot: usize) {
        if let Some(binding) = self.binding_mut(slot) {
            binding.initialized = true;
        }
    }

    pub fn mark_captured(&mut self, slot: usize) {
        if let Some(binding) = self.binding_mut(slot) {
            binding.captured = true;
        }
    }

    /// Number of slots ever in use at once, excluding the receiver.
    pub fn local_count(&self) -> usize {
        self.high_water - 1
    }

    fn innermost_mut(&mut self) -> &mut Scope {
        if self.scopes.is_empty() {
            self.scopes.push(Scope {
                locals: Vec::new(),
                base: self.watermark,
            });
        }
        let last = self.scopes.len() - 1;
        &mut self.scopes[last]
    }
}
