//! Expression compilation.

use ahash::AHashSet;

use crate::ast::{AssignTarget, BinaryOp, Expr, ExprKind, MapEntry, NamespacePath, Parameter, Stmt, UnaryOp};
use crate::bytecode::opcode::{self, IndexedFamily, OpCode};
use crate::bytecode::{IvarIndexTable, Value};
use crate::compiler::context::Context;
use crate::compiler::{Compiler, FunctionKind, IvarAccess, Variable};
use crate::error::CompileError;
use crate::span::Span;

/// How an instance variable is addressed.
enum IvarOperand {
    Slot(usize),
    /// Pool index of the name symbol.
    Name(usize),
}

impl Compiler<'_> {
    pub(super) fn compile_expression(&mut self, expr: &Expr) {
        let span = expr.span;
        match &expr.kind {
            ExprKind::Nil => self.emit(OpCode::Nil, span),
            ExprKind::True => self.emit(OpCode::True, span),
            ExprKind::False => self.emit(OpCode::False, span),
            ExprKind::SelfValue => self.emit(OpCode::SelfValue, span),
            ExprKind::Int(value) => self.emit_int(*value, span),
            ExprKind::Float(value) => self.emit_value(Value::Float(*value), span),
            ExprKind::String(value) => self.emit_value(Value::String(value.clone()), span),
            ExprKind::Symbol(name) => self.emit_symbol(name, span),

            ExprKind::List(items) => self.compile_sequence(items, &opcode::NEW_LIST, span),
            ExprKind::Tuple(items) => self.compile_sequence(items, &opcode::NEW_TUPLE, span),
            ExprKind::Map(entries) => self.compile_map(entries, span),

            ExprKind::Identifier(name) => self.compile_variable_get(name, span),
            ExprKind::InstanceVariable(name) => self.compile_ivar_get(name, span),
            ExprKind::Constant(path) => self.compile_constant_get(path, span),

            ExprKind::Assign {
                target,
                operator,
                value,
            } => self.compile_assignment(target, *operator, value, span),

            ExprKind::Binary {
                operator,
                left,
                right,
            } => {
                self.compile_expression(left);
                self.compile_expression(right);
                self.emit(binary_opcode(*operator), span);
            }
            ExprKind::Unary { operator, operand } => {
                self.compile_expression(operand);
                let op = match operator {
                    UnaryOp::Negate => OpCode::Negate,
                    UnaryOp::Not => OpCode::Not,
                };
                self.emit(op, span);
            }
            ExprKind::LogicalAnd { left, right } => {
                self.compile_short_circuit(left, right, OpCode::JumpUnlessNp, span)
            }
            ExprKind::LogicalOr { left, right } => {
                self.compile_short_circuit(left, right, OpCode::JumpIfNp, span)
            }

            ExprKind::Do(body) => self.compile_scoped_block(body, span),
            ExprKind::If {
                condition,
                then_branch,
                else_branch,
            } => self.compile_if(condition, then_branch, else_branch.as_deref(), span),
            ExprKind::Switch {
                subject,
                cases,
                else_branch,
            } => self.compile_switch(subject, cases, else_branch.as_deref(), span),
            ExprKind::Closure { params, body } => self.compile_closure(params, body, span),

            ExprKind::MethodCall {
                receiver,
                name,
                arguments,
            } => {
                self.compile_expression(receiver);
                self.compile_arguments(arguments);
                self.emit_call(&opcode::CALL_METHOD, name, arguments.len(), span);
            }
            ExprKind::SelfCall { name, arguments } => {
                self.compile_arguments(arguments);
                self.emit_call(&opcode::CALL_SELF, name, arguments.len(), span);
            }
            ExprKind::Call { callee, arguments } => {
                self.compile_expression(callee);
                self.compile_arguments(arguments);
                self.emit(OpCode::Call, span);
                self.emit_argument_count(arguments.len(), span);
            }
            ExprKind::Subscript { receiver, index } => {
                self.compile_expression(receiver);
                self.compile_expression(index);
                self.emit(OpCode::Subscript, span);
            }
            ExprKind::New { class, arguments } => {
                self.compile_constant_get(class, span);
                self.compile_arguments(arguments);
                self.emit(OpCode::Instantiate8, span);
                self.emit_argument_count(arguments.len(), span);
            }
            ExprKind::Raise(error) => {
                self.compile_expression(error);
                self.emit(OpCode::Throw, span);
            }
        }
    }

    fn compile_sequence(&mut self, items: &[Expr], family: &IndexedFamily, span: Span) {
        for item in items {
            self.compile_expression(item);
        }
        self.emit_indexed(family, items.len(), span);
    }

    fn compile_map(&mut self, entries: &[MapEntry], span: Span) {
        for entry in entries {
            self.compile_expression(&entry.key);
            self.compile_expression(&entry.value);
        }
        self.emit_indexed(&opcode::NEW_MAP, entries.len(), span);
    }

    fn compile_arguments(&mut self, arguments: &[Expr]) {
        for argument in arguments {
            self.compile_expression(argument);
        }
    }

    fn emit_argument_count(&mut self, count: usize, span: Span) {
        let count = match u8::try_from(count) {
            Ok(count) => count,
            Err(_) => {
                self.fail(CompileError::TooManyArguments, span);
                u8::MAX
            }
        };
        self.emit_byte(count);
    }

    /// `CALL_METHOD`/`CALL_SELF`: name index, then the argument count.
    fn emit_call(&mut self, family: &IndexedFamily, name: &str, argc: usize, span: Span) {
        let index = self.add_constant(Value::symbol(name), span);
        self.emit_indexed(family, index, span);
        self.emit_argument_count(argc, span);
    }

    fn compile_short_circuit(&mut self, left: &Expr, right: &Expr, jump: OpCode, span: Span) {
        self.compile_expression(left);
        let end = self.emit_jump(jump, span);
        self.emit(OpCode::Pop, span);
        self.compile_expression(right);
        self.patch_jump(end, span);
    }

    fn compile_if(
        &mut self,
        condition: &Expr,
        then_branch: &[Stmt],
        else_branch: Option<&[Stmt]>,
        span: Span,
    ) {
        self.compile_expression(condition);
        let otherwise = self.emit_jump(OpCode::JumpUnless, span);
        self.compile_scoped_block(then_branch, span);
        let end = self.emit_jump(OpCode::Jump, span);
        self.patch_jump(otherwise, span);
        match else_branch {
            Some(body) => self.compile_scoped_block(body, span),
            None => self.emit(OpCode::Nil, span),
        }
        self.patch_jump(end, span);
    }

    // --- Variables ---

    fn compile_variable_get(&mut self, name: &str, span: Span) {
        match self.resolve_variable(name, span) {
            Some(Variable::Local {
                slot, initialized, ..
            }) => {
                if !initialized {
                    self.fail(CompileError::UninitialisedLocal(name.to_string()), span);
                }
                self.emit_indexed(&opcode::GET_LOCAL, slot, span);
            }
            Some(Variable::Upvalue {
                index, initialized, ..
            }) => {
                if !initialized {
                    self.fail(CompileError::UninitialisedLocal(name.to_string()), span);
                }
                self.emit_indexed(&opcode::GET_UPVALUE, index, span);
            }
            None => {
                self.fail(CompileError::UndefinedLocal(name.to_string()), span);
                self.emit_placeholder(span);
            }
        }
    }

    fn compile_constant_get(&mut self, path: &NamespacePath, span: Span) {
        let resolved = self.resolver.resolve(path, &self.nesting, &self.view());
        match resolved {
            Ok(full_name) => self.emit_get_const(&full_name, span),
            Err(error) => {
                self.fail(error, span);
                self.emit_placeholder(span);
            }
        }
    }

    fn compile_assignment(
        &mut self,
        target: &AssignTarget,
        operator: Option<BinaryOp>,
        value: &Expr,
        span: Span,
    ) {
        match target {
            AssignTarget::Local(name) => self.compile_local_assignment(name, operator, value, span),
            AssignTarget::InstanceVariable(name) => {
                let operand = self.ivar_operand(name, span);
                if let Some(op) = operator {
                    self.emit_ivar_get(operand.as_ref(), span);
                    self.compile_expression(value);
                    self.emit(binary_opcode(op), span);
                } else {
                    self.compile_expression(value);
                }
                match operand {
                    Some(IvarOperand::Slot(slot)) => self.emit_indexed(&opcode::SET_IVAR, slot, span),
                    Some(IvarOperand::Name(index)) => {
                        self.emit_indexed(&opcode::SET_IVAR_NAME, index, span)
                    }
                    None => {}
                }
            }
        }
    }

    fn compile_local_assignment(
        &mut self,
        name: &str,
        operator: Option<BinaryOp>,
        value: &Expr,
        span: Span,
    ) {
        let Some(variable) = self.resolve_variable(name, span) else {
            self.fail(CompileError::UndefinedLocal(name.to_string()), span);
            self.compile_expression(value);
            return;
        };

        let (mutable, initialized, is_local) = match variable {
            Variable::Local {
                mutable,
                initialized,
                ..
            } => (mutable, initialized, true),
            Variable::Upvalue {
                mutable,
                initialized,
                ..
            } => (mutable, initialized, false),
        };
        // A `val` declared without an initializer takes exactly one assignment,
        // in its own function.
        let first_assignment = is_local && !initialized && operator.is_none();
        if !mutable && !first_assignment {
            self.fail(CompileError::ImmutableAssignment(name.to_string()), span);
        }

        if let Some(op) = operator {
            if !initialized {
                self.fail(CompileError::UninitialisedLocal(name.to_string()), span);
            }
            self.emit_variable_get(variable, span);
            self.compile_expression(value);
            self.emit(binary_opcode(op), span);
        } else {
            self.compile_expression(value);
        }

        match variable {
            Variable::Local { slot, .. } => {
                self.emit_indexed(&opcode::SET_LOCAL, slot, span);
                self.current.scopes.mark_initialized(slot);
            }
            Variable::Upvalue { index, .. } => {
                self.emit_indexed(&opcode::SET_UPVALUE, index, span)
            }
        }
    }

    fn emit_variable_get(&mut self, variable: Variable, span: Span) {
        match variable {
            Variable::Local { slot, .. } => self.emit_indexed(&opcode::GET_LOCAL, slot, span),
            Variable::Upvalue { index, .. } => self.emit_indexed(&opcode::GET_UPVALUE, index, span),
        }
    }

    // --- Instance variables ---

    fn ivar_table(&self, namespace: &str, singleton: bool) -> Option<&IvarIndexTable> {
        self.layouts.table(namespace, singleton).or_else(|| {
            self.snapshot.namespace(namespace).map(|info| {
                if singleton {
                    &info.singleton_ivars
                } else {
                    &info.ivars
                }
            })
        })
    }

    fn ivar_operand(&mut self, name: &str, span: Span) -> Option<IvarOperand> {
        match self.current.ivars.clone() {
            IvarAccess::Fixed {
                namespace,
                singleton,
            } => {
                let slot = self
                    .ivar_table(&namespace, singleton)
                    .and_then(|table| table.index_of(name));
                if slot.is_none() {
                    self.fail(CompileError::UndefinedInstanceVariable(name.to_string()), span);
                }
                slot.map(IvarOperand::Slot)
            }
            IvarAccess::ByName { namespace } => {
                let declared = self
                    .ivar_table(&namespace, false)
                    .is_some_and(|table| table.contains(name));
                if !declared {
                    self.fail(CompileError::UndefinedInstanceVariable(name.to_string()), span);
                    return None;
                }
                let index = self.add_constant(Value::symbol(name), span);
                Some(IvarOperand::Name(index))
            }
            IvarAccess::Forbidden => {
                self.fail(CompileError::InstanceVariablesUnavailable, span);
                None
            }
        }
    }

    fn emit_ivar_get(&mut self, operand: Option<&IvarOperand>, span: Span) {
        match operand {
            Some(IvarOperand::Slot(slot)) => self.emit_indexed(&opcode::GET_IVAR, *slot, span),
            Some(IvarOperand::Name(index)) => {
                self.emit_indexed(&opcode::GET_IVAR_NAME, *index, span)
            }
            None => self.emit_placeholder(span),
        }
    }

    fn compile_ivar_get(&mut self, name: &str, span: Span) {
        let operand = self.ivar_operand(name, span);
        self.emit_ivar_get(operand.as_ref(), span);
    }

    // --- Functions ---

    /// Declare parameters in order and emit the default-value prologue.
    pub(super) fn compile_parameters(&mut self, params: &[Parameter]) {
        let mut seen = AHashSet::new();
        let mut seen_optional = false;
        let mut defaults = Vec::new();

        for param in params {
            let slot = if seen.insert(param.name.as_str()) {
                self.declare_local(&param.name, true, param.span)
            } else {
                self.fail(CompileError::DuplicateParameter(param.name.clone()), param.span);
                self.declare_hidden(&param.name, param.span)
            };
            if let Some(slot) = slot {
                self.current.scopes.mark_initialized(slot);
            }

            match &param.default {
                Some(default) => {
                    seen_optional = true;
                    self.current.optional_params += 1;
                    if let Some(slot) = slot {
                        defaults.push((slot, default, param.span));
                    }
                }
                None => {
                    if seen_optional {
                        self.fail(
                            CompileError::RequiredAfterOptional(param.name.clone()),
                            param.span,
                        );
                    }
                    self.current.required_params += 1;
                }
            }
        }

        for (slot, default, span) in defaults {
            self.emit_indexed(&opcode::GET_LOCAL, slot, span);
            let skip = self.emit_jump(OpCode::JumpUnlessUndef, span);
            self.compile_expression(default);
            self.emit_indexed(&opcode::SET_LOCAL, slot, span);
            self.emit(OpCode::Pop, span);
            self.patch_jump(skip, span);
        }
    }

    fn compile_closure(&mut self, params: &[Parameter], body: &[Stmt], span: Span) {
        let ivars = self.current.ivars.clone();
        self.start_function("<closure>", FunctionKind::Closure, ivars, span);
        self.contexts.push(Context::Body);
        self.compile_parameters(params);
        self.compile_block_value(body, span);
        self.emit(OpCode::Return, Span::at(span.end_line, span.end_column));
        self.contexts.pop();
        let (function, upvalues) = self.finish_function();

        let index = self.add_constant(Value::Function(Box::new(function)), span);
        self.emit(OpCode::Closure, span);
        self.emit_u16(u16::try_from(index).unwrap_or(0));
        for byte in upvalues.encode() {
            self.emit_byte(byte);
        }
    }
}

pub(super) fn binary_opcode(operator: BinaryOp) -> OpCode {
    match operator {
        BinaryOp::Add => OpCode::Add,
        BinaryOp::Subtract => OpCode::Subtract,
        BinaryOp::Multiply => OpCode::Multiply,
        BinaryOp::Divide => OpCode::Divide,
        BinaryOp::Modulo => OpCode::Modulo,
        BinaryOp::Equal => OpCode::Equal,
        BinaryOp::NotEqual => OpCode::NotEqual,
        BinaryOp::Less => OpCode::Less,
        BinaryOp::LessEqual => OpCode::LessEqual,
        BinaryOp::Greater => OpCode::Greater,
        BinaryOp::GreaterEqual => OpCode::GreaterEqual,
    }
}
