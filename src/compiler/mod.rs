//! AST-to-bytecode compiler.
//!
//! A unit goes through four steps: namespace and constant collection, superclass
//! and include linking, instance variable layout, and a single code generation
//! walk. Problems are recorded as diagnostics and the walk carries on with a
//! placeholder, so one run reports every independent failure.
//!
//! The root function of a unit runs the hoisted `<namespaceDefinitions>`,
//! `<ivarIndices>` and `<methodDefinitions>` functions before its own statements.

pub mod context;
pub mod declarations;
pub mod ivars;
pub mod namespaces;
pub mod registry;
pub mod scope;
pub mod upvalues;

mod expressions;
mod methods;
mod patterns;
mod statements;

#[cfg(test)]
mod test_vm;
#[cfg(test)]
mod tests;

use std::sync::Arc;

use ahash::{AHashMap, AHashSet};
use log::{debug, trace};

use crate::ast::{NamespaceKind, Program};
use crate::bytecode::opcode::{self, Encoding, IndexedFamily, OpCode};
use crate::bytecode::{CompiledFunction, LineTable, Value, ValueKey};
use crate::error::{CompileError, CompileWarning, Diagnostics};
use crate::span::{Location, Span};

use context::Context;
use declarations::{UnitDeclarations, UnitView};
use ivars::IvarLayouts;
use namespaces::Resolver;
use registry::{RegistrySnapshot, ROOT};
use scope::ScopeStack;
use upvalues::{UpvalueList, UpvalueSource};

pub use registry::NamespaceRegistry;

/// Knobs of a single compilation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Stamped into every location.
    pub file: String,
    /// Name of the root function.
    pub main_name: String,
    pub warn_unused_values: bool,
    pub warn_unreachable_code: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            file: "<input>".to_string(),
            main_name: "<main>".to_string(),
            warn_unused_values: true,
            warn_unreachable_code: true,
        }
    }
}

impl CompilerOptions {
    pub fn for_file(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            ..Self::default()
        }
    }
}

/// Result of compiling one unit. `function` is `None` when any failure was reported.
#[derive(Debug)]
pub struct CompileOutput {
    pub function: Option<CompiledFunction>,
    pub diagnostics: Diagnostics,
}

impl CompileOutput {
    pub fn is_success(&self) -> bool {
        self.function.is_some()
    }
}

/// Compile `program` against the current state of `registry`. On success the
/// namespaces the unit declared are published to the registry.
pub fn compile(
    program: &Program,
    options: &CompilerOptions,
    registry: &NamespaceRegistry,
) -> CompileOutput {
    compile_against(program, options, registry, registry.snapshot())
}

/// Compile against `snapshot`, which may be older than the registry by the time
/// the unit is published.
fn compile_against(
    program: &Program,
    options: &CompilerOptions,
    registry: &NamespaceRegistry,
    snapshot: Arc<RegistrySnapshot>,
) -> CompileOutput {
    let mut diagnostics = Diagnostics::new();

    let mut unit =
        declarations::collect(&program.statements, &snapshot, &options.file, &mut diagnostics);
    declarations::link(
        &program.statements,
        &mut unit,
        &snapshot,
        &options.file,
        &mut diagnostics,
    );
    let layouts = ivars::compute(&unit, &snapshot, &options.file, &mut diagnostics);

    let mut compiler = Compiler::new(options, &snapshot, unit, layouts, diagnostics);
    let function = compiler.compile_unit(program);
    let Compiler {
        mut diagnostics,
        unit,
        layouts,
        ..
    } = compiler;

    if diagnostics.has_failures() {
        debug!(
            "{}: {} failure(s), no output",
            options.file,
            diagnostics.failures().count()
        );
        return CompileOutput {
            function: None,
            diagnostics,
        };
    }

    let published = registry.publish(|next| {
        let conflicts = unit.publish_conflicts(&snapshot, next, &layouts);
        if !conflicts.is_empty() {
            return Err(conflicts);
        }
        unit.publish_into(&snapshot, next, &layouts);
        Ok(())
    });
    if let Err(conflicts) = published {
        debug!(
            "{}: {} conflict(s) with units published meanwhile",
            options.file,
            conflicts.len()
        );
        for (error, span) in conflicts {
            diagnostics.push_failure(error, Location::new(&options.file, span));
        }
        return CompileOutput {
            function: None,
            diagnostics,
        };
    }
    CompileOutput {
        function: Some(function),
        diagnostics,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FunctionKind {
    Main,
    Method,
    Closure,
    NamespaceBody,
    Definitions,
}

/// How instance variables are reached from the function being compiled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum IvarAccess {
    /// Slots of a known layout.
    Fixed { namespace: String, singleton: bool },
    /// Names looked up in the receiver's class at run time (mixin methods).
    ByName { namespace: String },
    Forbidden,
}

/// A function under construction.
#[derive(Debug)]
pub(crate) struct FunctionState {
    name: String,
    kind: FunctionKind,
    span: Span,
    code: Vec<u8>,
    line_table: LineTable,
    constants: Vec<Value>,
    constant_indices: AHashMap<ValueKey, usize>,
    scopes: ScopeStack,
    upvalues: UpvalueList,
    ivars: IvarAccess,
    required_params: usize,
    optional_params: usize,
}

impl FunctionState {
    fn new(name: impl Into<String>, kind: FunctionKind, ivars: IvarAccess, span: Span) -> Self {
        let mut constant_indices = AHashMap::new();
        constant_indices.insert(ValueKey::Nil, 0);
        Self {
            name: name.into(),
            kind,
            span,
            code: Vec::new(),
            line_table: LineTable::new(),
            constants: vec![Value::Nil],
            constant_indices,
            scopes: ScopeStack::new(),
            upvalues: UpvalueList::new(),
            ivars,
            required_params: 0,
            optional_params: 0,
        }
    }

    fn captures_enclosing(&self) -> bool {
        self.kind == FunctionKind::Closure
    }

    /// Append one whole instruction, opcode first.
    fn push_instruction(&mut self, bytes: &[u8], line: usize) {
        self.code.extend_from_slice(bytes);
        self.line_table.record(line, 1);
    }

    /// Append an operand byte to the instruction already started.
    fn push_operand(&mut self, byte: u8) {
        self.code.push(byte);
    }

    fn add_constant(&mut self, value: Value) -> Result<usize, CompileError> {
        let key = value.dedupe_key();
        if let Some(index) = key.as_ref().and_then(|k| self.constant_indices.get(k)) {
            return Ok(*index);
        }
        let index = self.constants.len();
        if index > u16::MAX as usize {
            return Err(CompileError::TooManyConstants);
        }
        self.constants.push(value);
        if let Some(key) = key {
            self.constant_indices.insert(key, index);
        }
        Ok(index)
    }

    /// Insert `count` already-encoded instructions before everything emitted so far.
    fn prepend(&mut self, bytes: &[u8], count: usize, line: usize) {
        self.code.splice(0..0, bytes.iter().copied());
        self.line_table.prepend(line, count);
    }

    fn into_function(mut self, file: &str) -> (CompiledFunction, UpvalueList) {
        let params = self.required_params + self.optional_params;
        let locals = self.scopes.local_count();
        if locals > params {
            if let Some(encoding) = opcode::PREP_LOCALS.select(locals - params) {
                self.prepend(&encode(encoding), 1, self.span.line);
            }
        }
        debug!(
            "compiled `{}`: {} bytes, {} constants, {} locals, {} upvalues",
            self.name,
            self.code.len(),
            self.constants.len(),
            locals,
            self.upvalues.len()
        );
        let function = CompiledFunction {
            name: self.name,
            instructions: self.code,
            location: Location::new(file, self.span),
            line_table: self.line_table,
            constants: self.constants,
            required_params: self.required_params,
            optional_params: self.optional_params,
            upvalue_count: self.upvalues.len(),
        };
        (function, self.upvalues)
    }
}

/// Bytes of one indexed instruction.
fn encode(encoding: Encoding) -> Vec<u8> {
    match encoding {
        Encoding::Dedicated(op) => vec![op as u8],
        Encoding::Short(op, index) => vec![op as u8, index],
        Encoding::Long(op, index) => {
            let [high, low] = index.to_be_bytes();
            vec![op as u8, high, low]
        }
    }
}

/// A local or captured variable as seen from the current function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Variable {
    Local {
        slot: usize,
        mutable: bool,
        initialized: bool,
    },
    Upvalue {
        index: usize,
        mutable: bool,
        initialized: bool,
    },
}

/// A namespace the unit creates or reopens, in first-declaration order.
#[derive(Debug, Clone)]
pub(crate) struct NamespaceRecord {
    full_name: String,
    parent: String,
    name: String,
    kind: NamespaceKind,
    span: Span,
}

/// The compiler: transforms one unit's AST into bytecode.
pub(crate) struct Compiler<'a> {
    options: &'a CompilerOptions,
    snapshot: &'a RegistrySnapshot,
    unit: UnitDeclarations,
    layouts: IvarLayouts,
    diagnostics: Diagnostics,
    /// The function being compiled.
    current: FunctionState,
    /// Functions whose compilation is suspended, outermost first.
    enclosing: Vec<FunctionState>,
    /// Accumulates `DEF_METHOD` and friends for the whole unit.
    method_definitions: FunctionState,
    namespace_records: Vec<NamespaceRecord>,
    recorded: AHashSet<String>,
    /// Enclosing namespaces, `Root` first.
    nesting: Vec<String>,
    resolver: Resolver,
    contexts: Vec<Context>,
}

impl<'a> Compiler<'a> {
    fn new(
        options: &'a CompilerOptions,
        snapshot: &'a RegistrySnapshot,
        unit: UnitDeclarations,
        layouts: IvarLayouts,
        diagnostics: Diagnostics,
    ) -> Self {
        let span = Span::default();
        Self {
            options,
            snapshot,
            unit,
            layouts,
            diagnostics,
            current: FunctionState::new(
                options.main_name.clone(),
                FunctionKind::Main,
                IvarAccess::Forbidden,
                span,
            ),
            enclosing: Vec::new(),
            method_definitions: FunctionState::new(
                "<methodDefinitions>",
                FunctionKind::Definitions,
                IvarAccess::Forbidden,
                span,
            ),
            namespace_records: Vec::new(),
            recorded: AHashSet::new(),
            nesting: vec![ROOT.to_string()],
            resolver: Resolver::new(),
            contexts: vec![Context::TopLevel],
        }
    }

    fn compile_unit(&mut self, program: &Program) -> CompiledFunction {
        self.current.span = program.span;
        self.method_definitions.span = program.span;
        let end = Span::at(program.span.end_line, program.span.end_column);

        self.compile_statements(&program.statements);
        self.emit(OpCode::Nil, end);
        self.emit(OpCode::Return, end);

        let hoisted = [
            self.build_namespace_definitions(program.span),
            self.build_ivar_indices(program.span),
            self.build_method_definitions(end),
        ];
        let mut prologue = Vec::new();
        let mut count = 0;
        for function in hoisted.into_iter().flatten() {
            let index = self.add_constant(Value::Function(Box::new(function)), program.span);
            if let Some(encoding) = opcode::LOAD_VALUE.select(index) {
                prologue.extend(encode(encoding));
                prologue.push(OpCode::Exec as u8);
                prologue.push(OpCode::Pop as u8);
                count += 3;
            }
        }
        self.current.prepend(&prologue, count, program.span.line);

        let main = std::mem::replace(
            &mut self.current,
            FunctionState::new("", FunctionKind::Main, IvarAccess::Forbidden, program.span),
        );
        main.into_function(&self.options.file).0
    }

    // --- Diagnostics ---

    fn fail(&mut self, error: CompileError, span: Span) {
        self.diagnostics
            .push_failure(error, Location::new(self.options.file.as_str(), span));
    }

    fn warn(&mut self, warning: CompileWarning, span: Span) {
        self.diagnostics
            .push_warning(warning, Location::new(self.options.file.as_str(), span));
    }

    fn view(&self) -> UnitView<'_> {
        UnitView {
            unit: &self.unit,
            snapshot: self.snapshot,
        }
    }

    fn context(&self) -> Context {
        self.contexts.last().copied().unwrap_or(Context::TopLevel)
    }

    fn current_namespace(&self) -> String {
        self.nesting
            .last()
            .cloned()
            .unwrap_or_else(|| ROOT.to_string())
    }

    // --- Emission ---

    fn emit(&mut self, op: OpCode, span: Span) {
        self.current.push_instruction(&[op as u8], span.line);
    }

    /// Operand of the instruction just emitted.
    fn emit_byte(&mut self, byte: u8) {
        self.current.push_operand(byte);
    }

    fn emit_u16(&mut self, value: u16) {
        for byte in value.to_be_bytes() {
            self.current.push_operand(byte);
        }
    }

    /// The one place that picks between dedicated, 8-bit and 16-bit forms.
    fn emit_indexed(&mut self, family: &IndexedFamily, index: usize, span: Span) {
        match family.select(index) {
            Some(encoding) => self.current.push_instruction(&encode(encoding), span.line),
            None => {
                let error = match family.short {
                    OpCode::GetLocal8
                    | OpCode::SetLocal8
                    | OpCode::CloseUpvalue8
                    | OpCode::PrepLocals8 => CompileError::TooManyLocals,
                    OpCode::GetUpvalue8 | OpCode::SetUpvalue8 => CompileError::TooManyUpvalues,
                    OpCode::NewList8 | OpCode::NewTuple8 | OpCode::NewMap8 => {
                        CompileError::TooManyElements
                    }
                    _ => CompileError::TooManyConstants,
                };
                self.fail(error, span);
            }
        }
    }

    fn add_constant(&mut self, value: Value, span: Span) -> usize {
        match self.current.add_constant(value) {
            Ok(index) => index,
            Err(error) => {
                self.fail(error, span);
                0
            }
        }
    }

    fn emit_value(&mut self, value: Value, span: Span) {
        let index = self.add_constant(value, span);
        self.emit_indexed(&opcode::LOAD_VALUE, index, span);
    }

    fn emit_symbol(&mut self, name: &str, span: Span) {
        self.emit_value(Value::symbol(name), span);
    }

    /// Placeholder for a value that could not be compiled.
    fn emit_placeholder(&mut self, span: Span) {
        self.emit(OpCode::LoadValue0, span);
    }

    fn emit_get_const(&mut self, full_name: &str, span: Span) {
        let index = self.add_constant(Value::symbol(full_name), span);
        self.emit_indexed(&opcode::GET_CONST, index, span);
    }

    fn emit_int(&mut self, value: i64, span: Span) {
        if let Some(op) = opcode::small_int(value) {
            self.emit(op, span);
        } else if let Ok(byte) = i8::try_from(value) {
            self.emit(OpCode::LoadInt8, span);
            self.emit_byte(byte as u8);
        } else {
            self.emit_value(Value::SmallInt(value), span);
        }
    }

    /// Emit a forward jump with a placeholder distance; returns the operand offset.
    fn emit_jump(&mut self, op: OpCode, span: Span) -> usize {
        self.emit(op, span);
        let at = self.current.code.len();
        self.emit_u16(0xFFFF);
        at
    }

    /// Point the jump whose operand sits at `at` to the current end of code.
    fn patch_jump(&mut self, at: usize, span: Span) {
        let distance = self.current.code.len() - (at + 2);
        match u16::try_from(distance) {
            Ok(distance) => {
                let [high, low] = distance.to_be_bytes();
                self.current.code[at] = high;
                self.current.code[at + 1] = low;
            }
            Err(_) => self.fail(CompileError::JumpTooLarge, span),
        }
    }

    fn emit_loop(&mut self, start: usize, span: Span) {
        self.emit(OpCode::Loop, span);
        let distance = self.current.code.len() + 2 - start;
        match u16::try_from(distance) {
            Ok(distance) => self.emit_u16(distance),
            Err(_) => {
                self.fail(CompileError::JumpTooLarge, span);
                self.emit_u16(0);
            }
        }
    }

    // --- Scopes ---

    fn enter_scope(&mut self) {
        self.current.scopes.enter_scope();
        self.resolver.push_frame();
    }

    fn exit_scope(&mut self, span: Span) {
        let released = self.current.scopes.exit_scope();
        for slot in released.captured {
            self.emit_indexed(&opcode::CLOSE_UPVALUE, slot, span);
        }
        self.resolver.pop_frame();
    }

    /// Declare a local in the innermost scope, reporting redeclarations.
    fn declare_local(&mut self, name: &str, mutable: bool, span: Span) -> Option<usize> {
        match self.current.scopes.declare(name, mutable) {
            Ok(slot) => Some(slot),
            Err(error) => {
                self.fail(error, span);
                None
            }
        }
    }

    fn declare_hidden(&mut self, purpose: &str, span: Span) -> Option<usize> {
        match self.current.scopes.declare_hidden(purpose) {
            Ok(slot) => Some(slot),
            Err(error) => {
                self.fail(error, span);
                None
            }
        }
    }

    // --- Functions ---

    fn start_function(
        &mut self,
        name: impl Into<String>,
        kind: FunctionKind,
        ivars: IvarAccess,
        span: Span,
    ) {
        let state = FunctionState::new(name, kind, ivars, span);
        let parent = std::mem::replace(&mut self.current, state);
        self.enclosing.push(parent);
        self.resolver.push_frame();
    }

    /// Finish the current function and resume its parent.
    fn finish_function(&mut self) -> (CompiledFunction, UpvalueList) {
        let parent = self.enclosing.pop().unwrap_or_else(|| {
            FunctionState::new(
                self.options.main_name.clone(),
                FunctionKind::Main,
                IvarAccess::Forbidden,
                Span::default(),
            )
        });
        let finished = std::mem::replace(&mut self.current, parent);
        self.resolver.pop_frame();
        finished.into_function(&self.options.file)
    }

    /// Run `emit` with the unit's method definition function as the target.
    fn with_method_definitions(&mut self, emit: impl FnOnce(&mut Self)) {
        std::mem::swap(&mut self.current, &mut self.method_definitions);
        emit(self);
        std::mem::swap(&mut self.current, &mut self.method_definitions);
    }

    // --- Variables ---

    fn function_at(&mut self, depth: usize) -> &mut FunctionState {
        if depth >= self.enclosing.len() {
            &mut self.current
        } else {
            &mut self.enclosing[depth]
        }
    }

    fn resolve_variable(&mut self, name: &str, span: Span) -> Option<Variable> {
        if let Some(binding) = self.current.scopes.lookup(name) {
            return Some(Variable::Local {
                slot: binding.slot,
                mutable: binding.mutable,
                initialized: binding.initialized,
            });
        }
        match self.resolve_upvalue(self.enclosing.len(), name) {
            Ok(found) => found,
            Err(error) => {
                self.fail(error, span);
                None
            }
        }
    }

    /// Capture `name` into the function at `depth` from the functions around it.
    fn resolve_upvalue(
        &mut self,
        depth: usize,
        name: &str,
    ) -> Result<Option<Variable>, CompileError> {
        if depth == 0 || !self.function_at(depth).captures_enclosing() {
            return Ok(None);
        }
        let parent = depth - 1;
        let binding = self
            .function_at(parent)
            .scopes
            .lookup(name)
            .map(|b| (b.slot, b.mutable, b.initialized));

        if let Some((slot, mutable, initialized)) = binding {
            self.function_at(parent).scopes.mark_captured(slot);
            let index = self.function_at(depth).upvalues.capture(
                name,
                UpvalueSource::ParentLocal(slot),
                mutable,
            )?;
            trace!("captured `{}` from parent slot {} as upvalue {}", name, slot, index);
            return Ok(Some(Variable::Upvalue {
                index,
                mutable,
                initialized,
            }));
        }

        match self.resolve_upvalue(parent, name)? {
            Some(Variable::Upvalue {
                index: outer,
                mutable,
                initialized,
            }) => {
                let index = self.function_at(depth).upvalues.capture(
                    name,
                    UpvalueSource::ParentUpvalue(outer),
                    mutable,
                )?;
                trace!("captured `{}` from parent upvalue {} as {}", name, outer, index);
                Ok(Some(Variable::Upvalue {
                    index,
                    mutable,
                    initialized,
                }))
            }
            _ => Ok(None),
        }
    }
}
