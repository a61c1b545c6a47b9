//! Destructuring patterns.
//!
//! A pattern compiles to a check that leaves `true` or `false` on the stack,
//! binding names as it goes. Each failing test jumps to one shared branch that
//! pushes `false`. The subject always sits in a hidden local so every test can
//! reload it.

use crate::ast::{Expr, Literal, Pattern, PatternKind, RestElement, SequenceKind, Stmt, SwitchCase};
use crate::bytecode::opcode::{self, OpCode};
use crate::bytecode::Value;
use crate::compiler::context::Context;
use crate::compiler::registry::{LIST, MAP, PATTERN_NOT_MATCHED_ERROR, TUPLE};
use crate::compiler::Compiler;
use crate::error::CompileError;
use crate::span::Span;

const VAR_MISMATCH: &str =
    "assigned value does not match the pattern defined in variable declaration";
const VAL_MISMATCH: &str = "assigned value does not match the pattern defined in value declaration";

/// Where the value a sub-pattern tests comes from.
#[derive(Debug, Clone)]
enum Source<'p> {
    Slot(usize),
    /// `subject[index]`; negative indices count from the end.
    Element { subject: usize, index: i64 },
    /// `subject[key]`
    Entry { subject: usize, key: &'p Literal },
}

impl Compiler<'_> {
    /// `var [1, a] = value` / `val {name: n} = value`
    pub(super) fn compile_pattern_declaration(
        &mut self,
        pattern: &Pattern,
        mutable: bool,
        initializer: &Expr,
        span: Span,
    ) {
        self.compile_expression(initializer);
        let Some(subject) = self.declare_hidden("pattern subject", span) else {
            self.emit(OpCode::Pop, span);
            return;
        };
        self.emit_indexed(&opcode::SET_LOCAL, subject, span);
        self.emit(OpCode::Pop, span);

        self.compile_pattern_test(pattern, subject, mutable);
        let matched = self.emit_jump(OpCode::JumpIf, span);
        self.emit_get_const(PATTERN_NOT_MATCHED_ERROR, span);
        let message = if mutable { VAR_MISMATCH } else { VAL_MISMATCH };
        self.emit_value(Value::String(message.to_string()), span);
        self.emit(OpCode::Instantiate8, span);
        self.emit_byte(1);
        self.emit(OpCode::Throw, span);
        self.patch_jump(matched, span);
    }

    pub(super) fn compile_switch(
        &mut self,
        subject: &Expr,
        cases: &[SwitchCase],
        else_branch: Option<&[Stmt]>,
        span: Span,
    ) {
        self.enter_scope();
        self.compile_expression(subject);
        let slot = self.declare_hidden("switch subject", span);
        match slot {
            Some(slot) => {
                self.emit_indexed(&opcode::SET_LOCAL, slot, span);
                self.emit(OpCode::Pop, span);
            }
            None => self.emit(OpCode::Pop, span),
        }

        let mut ends = Vec::new();
        for case in cases {
            self.enter_scope();
            self.contexts.push(Context::Body);
            match slot {
                Some(slot) => self.compile_pattern_test(&case.pattern, slot, false),
                None => self.emit(OpCode::False, case.span),
            }
            let next = self.emit_jump(OpCode::JumpUnless, case.span);
            self.compile_block_value(&case.body, case.span);
            self.contexts.pop();
            self.exit_scope(case.span);
            ends.push(self.emit_jump(OpCode::Jump, case.span));
            self.patch_jump(next, case.span);
        }

        match else_branch {
            Some(body) => self.compile_scoped_block(body, span),
            None => self.emit(OpCode::Nil, span),
        }
        for end in ends {
            self.patch_jump(end, span);
        }
        self.exit_scope(span);
    }

    /// Leaves a boolean: whether the value in `subject` matches `pattern`.
    fn compile_pattern_test(&mut self, pattern: &Pattern, subject: usize, mutable: bool) {
        let span = pattern.span;
        let mut failures = Vec::new();
        self.compile_pattern_checks(pattern, Source::Slot(subject), mutable, &mut failures);
        self.emit(OpCode::True, span);
        if failures.is_empty() {
            return;
        }
        let end = self.emit_jump(OpCode::Jump, span);
        for failure in failures {
            self.patch_jump(failure, span);
        }
        self.emit(OpCode::False, span);
        self.patch_jump(end, span);
    }

    fn emit_source(&mut self, source: &Source<'_>, span: Span) {
        match source {
            Source::Slot(slot) => self.emit_indexed(&opcode::GET_LOCAL, *slot, span),
            Source::Element { subject, index } => {
                self.emit_indexed(&opcode::GET_LOCAL, *subject, span);
                self.emit_int(*index, span);
                self.emit(OpCode::Subscript, span);
            }
            Source::Entry { subject, key } => {
                self.emit_indexed(&opcode::GET_LOCAL, *subject, span);
                self.emit_literal(key, span);
                self.emit(OpCode::Subscript, span);
            }
        }
    }

    /// A slot holding the source value, copying it into a temporary if needed.
    fn materialize(&mut self, source: Source<'_>, span: Span) -> Option<usize> {
        if let Source::Slot(slot) = source {
            return Some(slot);
        }
        let slot = self.declare_hidden("pattern element", span)?;
        self.emit_source(&source, span);
        self.emit_indexed(&opcode::SET_LOCAL, slot, span);
        self.emit(OpCode::Pop, span);
        Some(slot)
    }

    fn emit_literal(&mut self, literal: &Literal, span: Span) {
        match literal {
            Literal::Nil => self.emit(OpCode::Nil, span),
            Literal::True => self.emit(OpCode::True, span),
            Literal::False => self.emit(OpCode::False, span),
            Literal::Int(value) => self.emit_int(*value, span),
            Literal::Float(value) => self.emit_value(Value::Float(*value), span),
            Literal::String(value) => self.emit_value(Value::String(value.clone()), span),
            Literal::Symbol(name) => self.emit_symbol(name, span),
        }
    }

    /// Pop a boolean and record a jump to the failure branch when it is false.
    fn fail_unless(&mut self, failures: &mut Vec<usize>, span: Span) {
        failures.push(self.emit_jump(OpCode::JumpUnless, span));
    }

    fn bind(&mut self, name: &str, source: &Source<'_>, mutable: bool, span: Span) {
        self.emit_source(source, span);
        match self.declare_local(name, mutable, span) {
            Some(slot) => {
                self.emit_indexed(&opcode::SET_LOCAL, slot, span);
                self.emit(OpCode::Pop, span);
                self.current.scopes.mark_initialized(slot);
            }
            None => self.emit(OpCode::Pop, span),
        }
    }

    fn compile_pattern_checks<'p>(
        &mut self,
        pattern: &'p Pattern,
        source: Source<'p>,
        mutable: bool,
        failures: &mut Vec<usize>,
    ) {
        let span = pattern.span;
        match &pattern.kind {
            PatternKind::Wildcard => {}
            PatternKind::Binding(name) => self.bind(name, &source, mutable, span),
            PatternKind::Literal(literal) => {
                self.emit_source(&source, span);
                self.emit_literal(literal, span);
                self.emit(OpCode::Equal, span);
                self.fail_unless(failures, span);
            }
            PatternKind::Sequence {
                kind,
                elements,
                rest,
            } => {
                let Some(subject) = self.materialize(source, span) else {
                    return;
                };
                self.compile_sequence_checks(
                    *kind,
                    elements,
                    rest.as_ref(),
                    subject,
                    mutable,
                    failures,
                    span,
                );
            }
            PatternKind::Map(entries) => {
                let Some(subject) = self.materialize(source, span) else {
                    return;
                };
                self.emit_indexed(&opcode::GET_LOCAL, subject, span);
                self.emit_get_const(MAP, span);
                self.emit(OpCode::IsA, span);
                self.fail_unless(failures, span);

                for entry in entries {
                    let at = entry.pattern.span;
                    self.emit_indexed(&opcode::GET_LOCAL, subject, at);
                    self.emit_literal(&entry.key, at);
                    self.emit(OpCode::HasKey, at);
                    self.fail_unless(failures, at);
                    let source = Source::Entry {
                        subject,
                        key: &entry.key,
                    };
                    self.compile_pattern_checks(&entry.pattern, source, mutable, failures);
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn compile_sequence_checks(
        &mut self,
        kind: SequenceKind,
        elements: &[Pattern],
        rest: Option<&RestElement>,
        subject: usize,
        mutable: bool,
        failures: &mut Vec<usize>,
        span: Span,
    ) {
        let class = match kind {
            SequenceKind::List => LIST,
            SequenceKind::Tuple => TUPLE,
        };
        self.emit_indexed(&opcode::GET_LOCAL, subject, span);
        self.emit_get_const(class, span);
        self.emit(OpCode::IsA, span);
        self.fail_unless(failures, span);

        let count = elements.len();
        self.emit_indexed(&opcode::GET_LOCAL, subject, span);
        self.emit(OpCode::Len, span);
        self.emit_int(count as i64, span);
        self.emit(
            if rest.is_some() {
                OpCode::GreaterEqual
            } else {
                OpCode::Equal
            },
            span,
        );
        self.fail_unless(failures, span);

        let leading = rest.map_or(count, |rest| rest.position.min(count));
        let trailing = count - leading;
        for (position, element) in elements.iter().enumerate() {
            let index = if position < leading {
                position as i64
            } else {
                position as i64 - count as i64
            };
            let source = Source::Element { subject, index };
            self.compile_pattern_checks(element, source, mutable, failures);
        }

        if let Some(RestElement {
            binding: Some(name),
            ..
        }) = rest
        {
            let (Ok(start), Ok(end)) = (u8::try_from(leading), u8::try_from(trailing)) else {
                self.fail(CompileError::TooManyElements, span);
                return;
            };
            self.emit_indexed(&opcode::GET_LOCAL, subject, span);
            self.emit(OpCode::Slice, span);
            self.emit_byte(start);
            self.emit_byte(end);
            match self.declare_local(name, mutable, span) {
                Some(slot) => {
                    self.emit_indexed(&opcode::SET_LOCAL, slot, span);
                    self.emit(OpCode::Pop, span);
                    self.current.scopes.mark_initialized(slot);
                }
                None => self.emit(OpCode::Pop, span),
            }
        }
    }
}
