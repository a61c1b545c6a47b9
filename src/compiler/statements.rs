//! Statement compilation.

use crate::ast::{Expr, ExprKind, Stmt, StmtKind, VariableDecl};
use crate::bytecode::opcode::{self, OpCode};
use crate::bytecode::Value;
use crate::compiler::context::{Context, Declaration};
use crate::compiler::Compiler;
use crate::error::{CompileError, CompileWarning};
use crate::span::Span;

impl Compiler<'_> {
    /// Compile `statements` for their effects. Returns true when the sequence
    /// ends in a `return`.
    pub(super) fn compile_statements(&mut self, statements: &[Stmt]) -> bool {
        let mut returned = false;
        let mut warned = false;
        for stmt in statements {
            if returned && !warned && produces_code(stmt) {
                if self.options.warn_unreachable_code {
                    self.warn(CompileWarning::UnreachableCode, stmt.span);
                }
                warned = true;
            }
            self.compile_statement(stmt);
            if matches!(stmt.kind, StmtKind::Return(_)) {
                returned = true;
            }
        }
        returned
    }

    /// Compile `statements` leaving the value of the last one on the stack,
    /// or `nil` when it is not an expression.
    pub(super) fn compile_block_value(&mut self, statements: &[Stmt], span: Span) {
        match statements.split_last() {
            Some((
                Stmt {
                    kind: StmtKind::Expression(expr),
                    span: last_span,
                },
                init,
            )) => {
                if self.compile_statements(init) && self.options.warn_unreachable_code {
                    self.warn(CompileWarning::UnreachableCode, *last_span);
                }
                self.compile_expression(expr);
            }
            _ => {
                self.compile_statements(statements);
                self.emit(OpCode::Nil, span);
            }
        }
    }

    /// A block with its own scope, as in `do`, `if` and `while`.
    pub(super) fn compile_scoped_block(&mut self, statements: &[Stmt], span: Span) {
        self.enter_scope();
        self.contexts.push(Context::Body);
        self.compile_block_value(statements, span);
        self.contexts.pop();
        self.exit_scope(span);
    }

    fn compile_statement(&mut self, stmt: &Stmt) {
        let span = stmt.span;
        match &stmt.kind {
            StmtKind::Expression(expr) => {
                self.compile_expression(expr);
                if expr.is_pure() && self.options.warn_unused_values {
                    self.warn(CompileWarning::UnusedValue, expr.span);
                }
                self.emit(OpCode::Pop, span);
            }
            StmtKind::Return(value) => {
                match value {
                    Some(value) => self.compile_expression(value),
                    None => self.emit(OpCode::Nil, span),
                }
                self.emit(OpCode::Return, span);
            }
            StmtKind::While { condition, body } => self.compile_while(condition, body, span),
            StmtKind::Variable(decl) => self.compile_variable(decl, span),
            StmtKind::PatternVariable {
                pattern,
                mutable,
                initializer,
            } => self.compile_pattern_declaration(pattern, *mutable, initializer, span),
            StmtKind::Constant { name, value, .. } => self.compile_constant(name, value, span),
            StmtKind::Namespace(decl) => self.compile_namespace(decl, span),
            StmtKind::Singleton(body) => self.compile_singleton(body, span),
            StmtKind::Method(decl) => self.compile_method(decl, span),
            StmtKind::MethodSignature { .. } => {
                self.check_declaration(Declaration::Signature, span);
            }
            StmtKind::Attribute { kind, entries } => self.compile_attribute(*kind, entries, span),
            StmtKind::Alias(entries) => self.compile_alias(entries, span),
            StmtKind::InstanceVariable { .. } => {
                self.check_declaration(Declaration::InstanceVariable, span);
            }
            StmtKind::Include(_) => {
                self.check_declaration(Declaration::Include, span);
            }
            StmtKind::Using(entries) => self.compile_using(entries, span),
        }
    }

    /// Report `declaration` when the current context does not allow it.
    pub(super) fn check_declaration(&mut self, declaration: Declaration, span: Span) -> bool {
        let context = self.context();
        if context.permits(declaration) {
            return true;
        }
        self.fail(
            CompileError::illegal(declaration.noun(), context.to_string()),
            span,
        );
        false
    }

    fn compile_while(&mut self, condition: &Expr, body: &[Stmt], span: Span) {
        let start = self.current.code.len();
        self.compile_expression(condition);
        let exit = self.emit_jump(OpCode::JumpUnless, span);

        self.enter_scope();
        self.contexts.push(Context::Body);
        self.compile_statements(body);
        self.contexts.pop();
        self.exit_scope(span);

        self.emit_loop(start, span);
        self.patch_jump(exit, span);
    }

    fn compile_variable(&mut self, decl: &VariableDecl, span: Span) {
        // The initializer cannot see the variable it initializes.
        if let Some(initializer) = &decl.initializer {
            self.compile_expression(initializer);
        }
        let slot = self.declare_local(&decl.name, decl.mutable, span);
        if decl.initializer.is_none() {
            return;
        }
        match slot {
            Some(slot) => {
                self.emit_indexed(&opcode::SET_LOCAL, slot, span);
                self.emit(OpCode::Pop, span);
                self.current.scopes.mark_initialized(slot);
            }
            None => self.emit(OpCode::Pop, span),
        }
    }

    fn compile_constant(&mut self, name: &str, value: &Expr, span: Span) {
        if !self.check_declaration(Declaration::Constant, span) {
            self.compile_expression(value);
            self.emit(OpCode::Pop, span);
            return;
        }
        let namespace = self.current_namespace();
        self.emit_get_const(&namespace, span);
        self.emit_symbol(name, span);
        match static_literal(value) {
            Some(literal) => self.emit_value(literal, value.span),
            None => self.compile_expression(value),
        }
        self.emit(OpCode::DefConst, span);
    }
}

/// Literals a constant keeps in the pool.
fn static_literal(expr: &Expr) -> Option<Value> {
    match &expr.kind {
        ExprKind::Nil => Some(Value::Nil),
        ExprKind::Int(n) => Some(Value::SmallInt(*n)),
        ExprKind::Float(f) => Some(Value::Float(*f)),
        ExprKind::String(s) => Some(Value::String(s.clone())),
        ExprKind::Symbol(s) => Some(Value::Symbol(s.clone())),
        _ => None,
    }
}

fn produces_code(stmt: &Stmt) -> bool {
    matches!(
        stmt.kind,
        StmtKind::Expression(_)
            | StmtKind::Return(_)
            | StmtKind::While { .. }
            | StmtKind::Variable(_)
            | StmtKind::PatternVariable { .. }
    )
}
