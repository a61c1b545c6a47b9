//! Declaration passes run before code generation.
//!
//! Collection records every namespace and constant a unit declares, so that
//! forward references and self references resolve without backpatching.
//! Linking then resolves superclasses and includes and records where each
//! namespace gets its instance variables from.

use ahash::{AHashMap, AHashSet};
use indexmap::{IndexMap, IndexSet};
use log::debug;

use crate::ast::{NamespaceDecl, NamespaceKind, NamespacePath, Stmt, StmtKind, UsingEntry};
use crate::bytecode::IvarIndexTable;
use crate::compiler::ivars::IvarLayouts;
use crate::compiler::namespaces::{declaration_target, ConstantKind, ConstantLookup, Resolver};
use crate::compiler::registry::{member_name, NamespaceInfo, RegistrySnapshot, OBJECT, ROOT};
use crate::error::{CompileError, Diagnostics};
use crate::span::{Location, Span};

/// `Root::Foo::Bar` as users write it: `Foo::Bar`.
pub fn display_name(full_name: &str) -> &str {
    full_name
        .strip_prefix("Root::")
        .unwrap_or(full_name)
}

/// Where an instance variable of a namespace comes from, in body order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IvarContribution {
    Include(String),
    Declare(String, Span),
}

/// A namespace declared or reopened by the unit being compiled.
#[derive(Debug, Clone)]
pub struct UnitNamespace {
    pub full_name: String,
    pub parent: String,
    pub name: String,
    pub kind: NamespaceKind,
    /// Already known to the registry before this unit.
    pub registered: bool,
    pub superclass: Option<String>,
    /// The unit links the superclass itself (`SET_SUPERCLASS`).
    pub sets_superclass: bool,
    pub superclass_span: Option<Span>,
    /// Mixins included by this unit, in order.
    pub mixins: Vec<String>,
    pub ivar_contributions: Vec<IvarContribution>,
    pub singleton_ivars: Vec<(String, Span)>,
    pub span: Span,
}

#[derive(Debug, Default)]
pub struct UnitDeclarations {
    pub namespaces: IndexMap<String, UnitNamespace>,
    constants: AHashSet<String>,
    members: AHashMap<String, IndexSet<String>>,
}

impl UnitDeclarations {
    pub fn namespace(&self, full_name: &str) -> Option<&UnitNamespace> {
        self.namespaces.get(full_name)
    }

    fn add_member(&mut self, parent: &str, name: &str) {
        self.members
            .entry(parent.to_string())
            .or_default()
            .insert(name.to_string());
    }

    /// Namespaces of this unit that another unit changed incompatibly after
    /// `base` was taken. `current` is the registry state about to be replaced.
    pub fn publish_conflicts(
        &self,
        base: &RegistrySnapshot,
        current: &RegistrySnapshot,
        layouts: &IvarLayouts,
    ) -> Vec<(CompileError, Span)> {
        let mut conflicts = Vec::new();
        let empty = IvarIndexTable::new();
        for (full_name, ns) in &self.namespaces {
            let before = base.namespace(full_name);
            let Some(now) = current.namespace(full_name) else {
                continue;
            };
            if before == Some(now) {
                continue;
            }
            let path = display_name(full_name).to_string();
            if now.kind != ns.kind {
                let error = CompileError::kind_mismatch(path, ns.kind.name(), now.kind.name());
                conflicts.push((error, ns.span));
                continue;
            }
            if let (Some(ours), Some(theirs)) = (&ns.superclass, &now.superclass) {
                if ours != theirs {
                    let error = CompileError::SuperclassMismatch {
                        path,
                        existing: display_name(theirs).to_string(),
                        given: display_name(ours).to_string(),
                    };
                    conflicts.push((error, ns.superclass_span.unwrap_or(ns.span)));
                    continue;
                }
            }
            let tables = [
                (
                    layouts.instance(full_name),
                    before.map_or(&empty, |info| &info.ivars),
                    &now.ivars,
                ),
                (
                    layouts.singleton(full_name),
                    before.map_or(&empty, |info| &info.singleton_ivars),
                    &now.singleton_ivars,
                ),
            ];
            let clash = tables.iter().any(|(ours, before, now)| {
                matches!(ours, Some(ours) if ours != before && ours != now) && before != now
            });
            if clash {
                conflicts.push((CompileError::ConcurrentLayoutChange(path), ns.span));
            }
        }
        conflicts
    }

    /// Copy everything this unit declared into `snapshot`. Layouts the unit
    /// left as they were in `base` are not written back.
    pub fn publish_into(
        &self,
        base: &RegistrySnapshot,
        snapshot: &mut RegistrySnapshot,
        layouts: &IvarLayouts,
    ) {
        let empty = IvarIndexTable::new();
        for (full_name, ns) in &self.namespaces {
            let before = base.namespace(full_name);
            let mut info = snapshot
                .namespace(full_name)
                .cloned()
                .unwrap_or_else(|| NamespaceInfo::new(ns.kind, None));
            info.kind = ns.kind;
            info.superclass = ns.superclass.clone();
            for mixin in &ns.mixins {
                if !info.mixins.contains(mixin) {
                    info.mixins.push(mixin.clone());
                }
            }
            if let Some(table) = layouts.instance(full_name) {
                if table != before.map_or(&empty, |info| &info.ivars) {
                    info.ivars = table.clone();
                }
            }
            if let Some(table) = layouts.singleton(full_name) {
                if table != before.map_or(&empty, |info| &info.singleton_ivars) {
                    info.singleton_ivars = table.clone();
                }
            }
            snapshot.insert(full_name, info);
        }
        for (namespace, members) in &self.members {
            if let Some(info) = snapshot.namespace_mut(namespace) {
                info.members.extend(members.iter().cloned());
            }
        }
    }
}

/// Constants visible to a unit: its own declarations over the registry snapshot.
pub struct UnitView<'a> {
    pub unit: &'a UnitDeclarations,
    pub snapshot: &'a RegistrySnapshot,
}

impl ConstantLookup for UnitView<'_> {
    fn constant(&self, full_name: &str) -> Option<ConstantKind> {
        if let Some(ns) = self.unit.namespaces.get(full_name) {
            return Some(ConstantKind::Namespace(ns.kind));
        }
        if self.unit.constants.contains(full_name) {
            return Some(ConstantKind::Value);
        }
        self.snapshot.constant(full_name)
    }
}

/// Record the namespaces and constants of `statements`.
pub fn collect(
    statements: &[Stmt],
    snapshot: &RegistrySnapshot,
    file: &str,
    diagnostics: &mut Diagnostics,
) -> UnitDeclarations {
    let mut collector = Collector {
        unit: UnitDeclarations::default(),
        snapshot,
        file,
        diagnostics,
        nesting: vec![ROOT.to_string()],
    };
    collector.statements(statements);
    debug!(
        "collected {} namespaces and {} constants",
        collector.unit.namespaces.len(),
        collector.unit.constants.len()
    );
    collector.unit
}

struct Collector<'a> {
    unit: UnitDeclarations,
    snapshot: &'a RegistrySnapshot,
    file: &'a str,
    diagnostics: &'a mut Diagnostics,
    nesting: Vec<String>,
}

impl Collector<'_> {
    fn fail(&mut self, error: CompileError, span: Span) {
        self.diagnostics
            .push_failure(error, Location::new(self.file, span));
    }

    fn statements(&mut self, statements: &[Stmt]) {
        for stmt in statements {
            match &stmt.kind {
                StmtKind::Namespace(decl) => self.namespace(decl, stmt.span),
                StmtKind::Constant { name, .. } => self.constant(name, stmt.span),
                _ => {}
            }
        }
    }

    fn namespace(&mut self, decl: &NamespaceDecl, span: Span) {
        let view = UnitView {
            unit: &self.unit,
            snapshot: self.snapshot,
        };
        let (parent, full_name) = match declaration_target(&decl.path, &self.nesting, &view) {
            Ok(target) => target,
            Err(error) => {
                self.fail(error, span);
                return;
            }
        };

        match view.constant(&full_name) {
            Some(ConstantKind::Value) => {
                self.fail(
                    CompileError::ConstantRedefinition(display_name(&full_name).to_string()),
                    span,
                );
                return;
            }
            Some(ConstantKind::Namespace(existing)) if existing != decl.kind => {
                self.fail(
                    CompileError::kind_mismatch(
                        display_name(&full_name),
                        decl.kind.name(),
                        existing.name(),
                    ),
                    span,
                );
                return;
            }
            Some(ConstantKind::Namespace(_)) => {
                if !self.unit.namespaces.contains_key(&full_name) {
                    let superclass = self
                        .snapshot
                        .namespace(&full_name)
                        .and_then(|info| info.superclass.clone());
                    self.insert(decl.kind, &parent, &full_name, true, superclass, span);
                }
            }
            None => {
                self.insert(decl.kind, &parent, &full_name, false, None, span);
                if let Some(name) = decl.path.last() {
                    self.unit.add_member(&parent, name);
                }
            }
        }

        self.nesting.push(full_name);
        self.statements(&decl.body);
        self.nesting.pop();
    }

    fn insert(
        &mut self,
        kind: NamespaceKind,
        parent: &str,
        full_name: &str,
        registered: bool,
        superclass: Option<String>,
        span: Span,
    ) {
        let name = full_name
            .rsplit_once("::")
            .map(|(_, name)| name)
            .unwrap_or(full_name);
        self.unit.namespaces.insert(
            full_name.to_string(),
            UnitNamespace {
                full_name: full_name.to_string(),
                parent: parent.to_string(),
                name: name.to_string(),
                kind,
                registered,
                superclass,
                sets_superclass: false,
                superclass_span: None,
                mixins: Vec::new(),
                ivar_contributions: Vec::new(),
                singleton_ivars: Vec::new(),
                span,
            },
        );
    }

    fn constant(&mut self, name: &str, span: Span) {
        let parent = self
            .nesting
            .last()
            .cloned()
            .unwrap_or_else(|| ROOT.to_string());
        let full_name = member_name(&parent, name);
        let view = UnitView {
            unit: &self.unit,
            snapshot: self.snapshot,
        };
        if view.constant(&full_name).is_some() {
            self.fail(
                CompileError::ConstantRedefinition(display_name(&full_name).to_string()),
                span,
            );
            return;
        }
        self.unit.constants.insert(full_name);
        self.unit.add_member(&parent, name);
    }
}

/// Resolve superclasses and includes, and record ivar contributions.
pub fn link(
    statements: &[Stmt],
    unit: &mut UnitDeclarations,
    snapshot: &RegistrySnapshot,
    file: &str,
    diagnostics: &mut Diagnostics,
) {
    let mut linker = Linker {
        unit,
        snapshot,
        file,
        diagnostics,
        nesting: vec![ROOT.to_string()],
        resolver: Resolver::new(),
    };
    linker.top_level(statements);
    linker.check_cycles();
    for ns in linker.unit.namespaces.values_mut() {
        if ns.kind == NamespaceKind::Class && ns.superclass.is_none() {
            ns.superclass = Some(OBJECT.to_string());
        }
    }
}

struct Linker<'a> {
    unit: &'a mut UnitDeclarations,
    snapshot: &'a RegistrySnapshot,
    file: &'a str,
    diagnostics: &'a mut Diagnostics,
    nesting: Vec<String>,
    resolver: Resolver,
}

impl Linker<'_> {
    fn fail(&mut self, error: CompileError, span: Span) {
        self.diagnostics
            .push_failure(error, Location::new(self.file, span));
    }

    fn view(&self) -> UnitView<'_> {
        UnitView {
            unit: &*self.unit,
            snapshot: self.snapshot,
        }
    }

    fn top_level(&mut self, statements: &[Stmt]) {
        for stmt in statements {
            match &stmt.kind {
                StmtKind::Namespace(decl) => self.namespace(decl, stmt.span),
                StmtKind::Using(entries) => self.using(entries),
                _ => {}
            }
        }
    }

    fn using(&mut self, entries: &[UsingEntry]) {
        for entry in entries {
            match entry {
                UsingEntry::Constant { path, alias } => {
                    let resolved = self.resolver.resolve(path, &self.nesting, &self.view());
                    if let (Ok(full), Some(name)) = (resolved, alias.as_deref().or(path.last())) {
                        self.resolver.add_alias(name, &full);
                    }
                }
                UsingEntry::AllConstants(path) => {
                    let resolved = self
                        .resolver
                        .resolve_namespace(path, &self.nesting, &self.view());
                    if let Ok((full, _)) = resolved {
                        self.resolver.add_wildcard(&full);
                    }
                }
            }
        }
    }

    fn namespace(&mut self, decl: &NamespaceDecl, span: Span) {
        let Ok((_, full_name)) = declaration_target(&decl.path, &self.nesting, &self.view())
        else {
            return;
        };
        if self
            .unit
            .namespace(&full_name)
            .map_or(true, |ns| ns.kind != decl.kind)
        {
            return;
        }

        if let Some(path) = &decl.superclass {
            if decl.kind != NamespaceKind::Class {
                self.fail(
                    CompileError::SuperclassOnNonClass {
                        path: display_name(&full_name).to_string(),
                        kind: decl.kind.name().to_string(),
                    },
                    span,
                );
            } else {
                let resolved = self
                    .resolver
                    .resolve_namespace(path, &self.nesting, &self.view());
                match resolved {
                    Err(error) => self.fail(error, span),
                    Ok((superclass, kind)) if kind != NamespaceKind::Class => self.fail(
                        CompileError::InvalidSuperclass {
                            path: display_name(&full_name).to_string(),
                            superclass: display_name(&superclass).to_string(),
                            kind: kind.name().to_string(),
                        },
                        span,
                    ),
                    Ok((superclass, _)) => self.set_superclass(&full_name, superclass, span),
                }
            }
        }

        self.resolver.push_frame();
        self.nesting.push(full_name.clone());
        self.body(&decl.body, &full_name, decl.kind);
        self.nesting.pop();
        self.resolver.pop_frame();
    }

    fn set_superclass(&mut self, full_name: &str, superclass: String, span: Span) {
        let Some(ns) = self.unit.namespaces.get_mut(full_name) else {
            return;
        };
        match &ns.superclass {
            None => {
                ns.superclass = Some(superclass);
                ns.sets_superclass = true;
                ns.superclass_span = Some(span);
            }
            Some(existing) if *existing != superclass => {
                let error = CompileError::SuperclassMismatch {
                    path: display_name(full_name).to_string(),
                    existing: display_name(existing).to_string(),
                    given: display_name(&superclass).to_string(),
                };
                self.fail(error, span);
            }
            Some(_) => {}
        }
    }

    fn body(&mut self, statements: &[Stmt], full_name: &str, kind: NamespaceKind) {
        use NamespaceKind::*;

        let holds_instances = matches!(kind, Class | Mixin);
        for stmt in statements {
            match &stmt.kind {
                StmtKind::Namespace(decl) => self.namespace(decl, stmt.span),
                StmtKind::Using(entries) => self.using(entries),
                StmtKind::Include(paths) if holds_instances => {
                    for path in paths {
                        self.include(full_name, path, stmt.span);
                    }
                }
                StmtKind::InstanceVariable { name, .. } if holds_instances => {
                    self.contribute(full_name, IvarContribution::Declare(name.clone(), stmt.span));
                }
                StmtKind::Attribute { entries, .. } if holds_instances => {
                    for entry in entries {
                        self.contribute(
                            full_name,
                            IvarContribution::Declare(entry.name.clone(), stmt.span),
                        );
                    }
                }
                StmtKind::Singleton(body) if matches!(kind, Class | Module | Mixin) => {
                    self.singleton(body, full_name);
                }
                _ => {}
            }
        }
    }

    fn singleton(&mut self, statements: &[Stmt], full_name: &str) {
        self.resolver.push_frame();
        for stmt in statements {
            match &stmt.kind {
                StmtKind::Using(entries) => self.using(entries),
                StmtKind::InstanceVariable { name, .. } => {
                    self.singleton_ivar(full_name, name, stmt.span);
                }
                StmtKind::Attribute { entries, .. } => {
                    for entry in entries {
                        self.singleton_ivar(full_name, &entry.name, stmt.span);
                    }
                }
                _ => {}
            }
        }
        self.resolver.pop_frame();
    }

    fn include(&mut self, full_name: &str, path: &NamespacePath, span: Span) {
        let resolved = self
            .resolver
            .resolve_namespace(path, &self.nesting, &self.view());
        match resolved {
            Err(error) => self.fail(error, span),
            Ok((mixin, kind)) if kind != NamespaceKind::Mixin => self.fail(
                CompileError::IncludeNonMixin {
                    path: display_name(full_name).to_string(),
                    included: display_name(&mixin).to_string(),
                    kind: kind.name().to_string(),
                },
                span,
            ),
            Ok((mixin, _)) => {
                if let Some(ns) = self.unit.namespaces.get_mut(full_name) {
                    if !ns.mixins.contains(&mixin) {
                        ns.mixins.push(mixin.clone());
                    }
                    ns.ivar_contributions.push(IvarContribution::Include(mixin));
                }
            }
        }
    }

    fn contribute(&mut self, full_name: &str, contribution: IvarContribution) {
        if let Some(ns) = self.unit.namespaces.get_mut(full_name) {
            ns.ivar_contributions.push(contribution);
        }
    }

    fn singleton_ivar(&mut self, full_name: &str, name: &str, span: Span) {
        if let Some(ns) = self.unit.namespaces.get_mut(full_name) {
            ns.singleton_ivars.push((name.to_string(), span));
        }
    }

    fn superclass_of(&self, class: &str) -> Option<String> {
        match self.unit.namespaces.get(class) {
            Some(ns) => ns.superclass.clone(),
            None => self
                .snapshot
                .namespace(class)
                .and_then(|info| info.superclass.clone()),
        }
    }

    /// Report classes that are their own ancestor and cut the offending link.
    fn check_cycles(&mut self) {
        let classes: Vec<String> = self
            .unit
            .namespaces
            .values()
            .filter(|ns| ns.kind == NamespaceKind::Class)
            .map(|ns| ns.full_name.clone())
            .collect();

        for class in classes {
            let mut seen = AHashSet::new();
            let mut current = self.superclass_of(&class);
            let mut cyclic = false;
            while let Some(ancestor) = current {
                if ancestor == class {
                    cyclic = true;
                    break;
                }
                if !seen.insert(ancestor.clone()) {
                    break;
                }
                current = self.superclass_of(&ancestor);
            }
            if !cyclic {
                continue;
            }
            let Some(ns) = self.unit.namespaces.get_mut(&class) else {
                continue;
            };
            let span = ns.superclass_span.unwrap_or(ns.span);
            ns.superclass = Some(OBJECT.to_string());
            ns.sets_superclass = false;
            self.fail(
                CompileError::CircularInheritance(display_name(&class).to_string()),
                span,
            );
        }
    }
}
