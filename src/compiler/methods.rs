//! Namespace and member declarations, and the hoisted definition functions.
//!
//! Method, attribute and alias definitions of a whole unit are collected into
//! `<methodDefinitions>`; namespace creation, superclass links and includes go
//! into `<namespaceDefinitions>`; layouts into `<ivarIndices>`. A namespace body
//! only gets its own function, run by `INIT_NAMESPACE`, when it has statements
//! that do something at declaration time.

use log::debug;

use crate::ast::{
    AliasEntry, AttributeEntry, AttributeKind, MethodDecl, NamespaceDecl, NamespaceKind, Stmt,
    StmtKind, UsingEntry,
};
use crate::bytecode::{CompiledFunction, OpCode, Value};
use crate::compiler::context::{Context, Declaration};
use crate::compiler::namespaces::declaration_target;
use crate::compiler::registry::OBJECT;
use crate::compiler::{Compiler, FunctionKind, FunctionState, IvarAccess, NamespaceRecord};
use crate::span::Span;

/// The namespace a member definition lands on.
#[derive(Debug, Clone)]
struct DefinitionTarget {
    namespace: String,
    singleton: bool,
    ivars: IvarAccess,
}

impl Compiler<'_> {
    fn definition_target(&self) -> Option<DefinitionTarget> {
        let namespace = self.current_namespace();
        let target = match self.context() {
            Context::TopLevel => DefinitionTarget {
                namespace: OBJECT.to_string(),
                singleton: false,
                ivars: IvarAccess::Forbidden,
            },
            Context::Namespace { kind, .. } => match kind {
                NamespaceKind::Class => DefinitionTarget {
                    ivars: IvarAccess::Fixed {
                        namespace: namespace.clone(),
                        singleton: false,
                    },
                    namespace,
                    singleton: false,
                },
                NamespaceKind::Mixin => DefinitionTarget {
                    ivars: IvarAccess::ByName {
                        namespace: namespace.clone(),
                    },
                    namespace,
                    singleton: false,
                },
                NamespaceKind::Module => DefinitionTarget {
                    ivars: IvarAccess::Fixed {
                        namespace: namespace.clone(),
                        singleton: true,
                    },
                    namespace,
                    singleton: true,
                },
                NamespaceKind::Interface => return None,
            },
            Context::Singleton { .. } => DefinitionTarget {
                ivars: IvarAccess::Fixed {
                    namespace: namespace.clone(),
                    singleton: true,
                },
                namespace,
                singleton: true,
            },
            Context::Body => return None,
        };
        Some(target)
    }

    fn emit_definition_target(&mut self, target: &DefinitionTarget, span: Span) {
        self.emit_get_const(&target.namespace, span);
        if target.singleton {
            self.emit(OpCode::GetSingleton, span);
        }
    }

    // --- Namespaces ---

    pub(super) fn compile_namespace(&mut self, decl: &NamespaceDecl, span: Span) {
        let legal = self.check_declaration(Declaration::Namespace(decl.kind), span);

        let target = declaration_target(&decl.path, &self.nesting, &self.view()).ok();
        let declared = target.as_ref().and_then(|(parent, full_name)| {
            let ns = self.unit.namespace(full_name)?;
            (ns.kind == decl.kind).then(|| (parent.clone(), full_name.clone(), ns.name.clone()))
        });
        // Collection already reported why a legal declaration is missing.
        let full_name = match (&declared, &target) {
            (Some((_, full_name, _)), _) | (None, Some((_, full_name))) => full_name.clone(),
            (None, None) => self.current_namespace(),
        };

        if let (true, Some((parent, full_name, name))) = (legal, &declared) {
            if self.recorded.insert(full_name.clone()) {
                self.namespace_records.push(NamespaceRecord {
                    full_name: full_name.clone(),
                    parent: parent.clone(),
                    name: name.clone(),
                    kind: decl.kind,
                    span,
                });
            }
        }

        self.nesting.push(full_name.clone());
        self.contexts.push(Context::Namespace {
            kind: decl.kind,
            valid: legal,
        });
        self.start_function(
            format!("<namespace: {}>", full_name),
            FunctionKind::NamespaceBody,
            IvarAccess::Fixed {
                namespace: full_name.clone(),
                singleton: true,
            },
            span,
        );
        self.compile_statements(&decl.body);
        let end = Span::at(span.end_line, span.end_column);
        self.emit(OpCode::Nil, end);
        self.emit(OpCode::Return, end);
        let (body, _) = self.finish_function();
        self.contexts.pop();
        self.nesting.pop();

        if legal && declared.is_some() && decl.body.iter().any(runs_at_declaration) {
            self.emit_get_const(&full_name, span);
            self.emit_value(Value::Function(Box::new(body)), span);
            self.emit(OpCode::InitNamespace, span);
        }
    }

    pub(super) fn compile_singleton(&mut self, body: &[Stmt], span: Span) {
        let legal = self.check_declaration(Declaration::Singleton, span);
        let owner = match self.context() {
            Context::Namespace { kind, .. } | Context::Singleton { owner: kind, .. } => kind,
            Context::TopLevel | Context::Body => NamespaceKind::Class,
        };
        self.enter_scope();
        self.contexts.push(Context::Singleton {
            owner,
            valid: legal,
        });
        self.compile_statements(body);
        self.contexts.pop();
        self.exit_scope(span);
    }

    // --- Members ---

    pub(super) fn compile_method(&mut self, decl: &MethodDecl, span: Span) {
        let legal = self.check_declaration(Declaration::Method, span);
        let target = if legal { self.definition_target() } else { None };
        let ivars = match &target {
            Some(target) => target.ivars.clone(),
            None => self.current.ivars.clone(),
        };

        self.start_function(decl.name.clone(), FunctionKind::Method, ivars, span);
        self.contexts.push(Context::Body);
        self.compile_parameters(&decl.params);
        self.compile_block_value(&decl.body, span);
        self.emit(OpCode::Return, Span::at(span.end_line, span.end_column));
        self.contexts.pop();
        let (function, _) = self.finish_function();

        if let Some(target) = target {
            self.with_method_definitions(|compiler| {
                compiler.emit_definition_target(&target, span);
                compiler.emit_value(Value::Function(Box::new(function)), span);
                compiler.emit_symbol(&decl.name, span);
                compiler.emit(OpCode::DefMethod, span);
            });
        }
    }

    pub(super) fn compile_attribute(
        &mut self,
        kind: AttributeKind,
        entries: &[AttributeEntry],
        span: Span,
    ) {
        let declaration = match kind {
            AttributeKind::Getter => Declaration::Getter,
            AttributeKind::Setter => Declaration::Setter,
            AttributeKind::Accessor => Declaration::Accessor,
        };
        if !self.check_declaration(declaration, span) {
            return;
        }
        let Some(target) = self.definition_target() else {
            return;
        };
        let definitions: &[OpCode] = match kind {
            AttributeKind::Getter => &[OpCode::DefGetter],
            AttributeKind::Setter => &[OpCode::DefSetter],
            AttributeKind::Accessor => &[OpCode::DefGetter, OpCode::DefSetter],
        };
        self.with_method_definitions(|compiler| {
            for entry in entries {
                for &op in definitions {
                    compiler.emit_definition_target(&target, span);
                    compiler.emit_symbol(&entry.name, span);
                    compiler.emit(op, span);
                }
            }
        });
    }

    pub(super) fn compile_alias(&mut self, entries: &[AliasEntry], span: Span) {
        if !self.check_declaration(Declaration::Alias, span) {
            return;
        }
        let Some(target) = self.definition_target() else {
            return;
        };
        self.with_method_definitions(|compiler| {
            for entry in entries {
                compiler.emit_definition_target(&target, span);
                compiler.emit_symbol(&entry.new_name, span);
                compiler.emit_symbol(&entry.old_name, span);
                compiler.emit(OpCode::DefMethodAlias, span);
            }
        });
    }

    pub(super) fn compile_using(&mut self, entries: &[UsingEntry], span: Span) {
        for entry in entries {
            match entry {
                UsingEntry::Constant { path, alias } => {
                    let resolved = self.resolver.resolve(path, &self.nesting, &self.view());
                    match resolved {
                        Ok(full_name) => {
                            if let Some(name) = alias.as_deref().or(path.last()) {
                                self.resolver.add_alias(name, &full_name);
                            }
                        }
                        Err(error) => self.fail(error, span),
                    }
                }
                UsingEntry::AllConstants(path) => {
                    let resolved =
                        self.resolver
                            .resolve_namespace(path, &self.nesting, &self.view());
                    match resolved {
                        Ok((full_name, _)) => self.resolver.add_wildcard(&full_name),
                        Err(error) => self.fail(error, span),
                    }
                }
            }
        }
    }

    // --- Hoisted functions ---

    pub(super) fn build_namespace_definitions(&mut self, span: Span) -> Option<CompiledFunction> {
        if self.namespace_records.is_empty() {
            return None;
        }
        self.start_function(
            "<namespaceDefinitions>",
            FunctionKind::Definitions,
            IvarAccess::Forbidden,
            span,
        );

        let records = std::mem::take(&mut self.namespace_records);
        for record in &records {
            self.emit_get_const(&record.parent, record.span);
            self.emit_symbol(&record.name, record.span);
            self.emit(OpCode::DefNamespace, record.span);
            self.emit_byte(record.kind.tag());
        }

        let links: Vec<(String, Option<String>, Vec<String>, Span)> = self
            .unit
            .namespaces
            .values()
            .filter(|ns| self.recorded.contains(&ns.full_name))
            .map(|ns| {
                let superclass = ns.superclass.clone().filter(|_| ns.sets_superclass);
                let span = ns.superclass_span.unwrap_or(ns.span);
                (ns.full_name.clone(), superclass, ns.mixins.clone(), span)
            })
            .collect();
        for (full_name, superclass, mixins, span) in links {
            if let Some(superclass) = superclass {
                self.emit_get_const(&full_name, span);
                self.emit_get_const(&superclass, span);
                self.emit(OpCode::SetSuperclass, span);
            }
            for mixin in mixins {
                self.emit_get_const(&full_name, span);
                self.emit_get_const(&mixin, span);
                self.emit(OpCode::Include, span);
            }
        }
        self.namespace_records = records;

        self.emit(OpCode::Nil, span);
        self.emit(OpCode::Return, span);
        Some(self.finish_function().0)
    }

    pub(super) fn build_ivar_indices(&mut self, span: Span) -> Option<CompiledFunction> {
        if self.layouts.changes.is_empty() {
            return None;
        }
        self.start_function(
            "<ivarIndices>",
            FunctionKind::Definitions,
            IvarAccess::Forbidden,
            span,
        );
        let changes = self.layouts.changes.clone();
        for change in changes {
            let table = self.layouts.table(&change.namespace, change.singleton).cloned();
            let Some(table) = table else {
                continue;
            };
            let at = self
                .unit
                .namespace(&change.namespace)
                .map_or(span, |ns| ns.span);
            self.emit_get_const(&change.namespace, at);
            if change.singleton {
                self.emit(OpCode::GetSingleton, at);
            }
            self.emit_value(Value::IvarIndices(table), at);
            self.emit(OpCode::DefIvars, at);
        }
        self.emit(OpCode::Nil, span);
        self.emit(OpCode::Return, span);
        Some(self.finish_function().0)
    }

    pub(super) fn build_method_definitions(&mut self, span: Span) -> Option<CompiledFunction> {
        if self.method_definitions.code.is_empty() {
            return None;
        }
        self.with_method_definitions(|compiler| {
            compiler.emit(OpCode::Nil, span);
            compiler.emit(OpCode::Return, span);
        });
        let state = std::mem::replace(
            &mut self.method_definitions,
            FunctionState::new(
                "<methodDefinitions>",
                FunctionKind::Definitions,
                IvarAccess::Forbidden,
                span,
            ),
        );
        debug!("hoisting method definitions of {}", self.options.file);
        Some(state.into_function(&self.options.file).0)
    }
}

/// Whether a namespace body statement does anything when the declaration runs.
fn runs_at_declaration(stmt: &Stmt) -> bool {
    match &stmt.kind {
        StmtKind::Expression(_)
        | StmtKind::Return(_)
        | StmtKind::While { .. }
        | StmtKind::Variable(_)
        | StmtKind::PatternVariable { .. }
        | StmtKind::Constant { .. } => true,
        StmtKind::Namespace(decl) => decl.body.iter().any(runs_at_declaration),
        StmtKind::Singleton(body) => body.iter().any(runs_at_declaration),
        StmtKind::Method(_)
        | StmtKind::MethodSignature { .. }
        | StmtKind::Attribute { .. }
        | StmtKind::Alias(_)
        | StmtKind::InstanceVariable { .. }
        | StmtKind::Include(_)
        | StmtKind::Using(_) => false,
    }
}
