//! Instance variable layouts of the namespaces a unit touches.
//!
//! A class starts from its superclass's layout (or its own registered layout
//! when reopened) and appends the variables of included mixins and its own
//! declarations in body order, so inherited offsets never move.

use ahash::{AHashMap, AHashSet};
use log::debug;

use crate::ast::NamespaceKind;
use crate::bytecode::IvarIndexTable;
use crate::compiler::declarations::{display_name, IvarContribution, UnitDeclarations};
use crate::compiler::registry::RegistrySnapshot;
use crate::error::{CompileError, Diagnostics};
use crate::span::{Location, Span};

/// A namespace whose layout grew in this unit and must be registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutChange {
    pub namespace: String,
    pub singleton: bool,
}

#[derive(Debug, Default)]
pub struct IvarLayouts {
    instance: AHashMap<String, IvarIndexTable>,
    singleton: AHashMap<String, IvarIndexTable>,
    /// In declaration order.
    pub changes: Vec<LayoutChange>,
}

impl IvarLayouts {
    pub fn instance(&self, namespace: &str) -> Option<&IvarIndexTable> {
        self.instance.get(namespace)
    }

    pub fn singleton(&self, namespace: &str) -> Option<&IvarIndexTable> {
        self.singleton.get(namespace)
    }

    pub fn table(&self, namespace: &str, singleton: bool) -> Option<&IvarIndexTable> {
        if singleton {
            self.singleton(namespace)
        } else {
            self.instance(namespace)
        }
    }
}

pub fn compute(
    unit: &UnitDeclarations,
    snapshot: &RegistrySnapshot,
    file: &str,
    diagnostics: &mut Diagnostics,
) -> IvarLayouts {
    let mut builder = LayoutBuilder {
        unit,
        snapshot,
        layouts: IvarLayouts::default(),
        visiting: AHashSet::new(),
    };
    let mut failures = Vec::new();

    for ns in unit.namespaces.values() {
        let holds_instances = matches!(ns.kind, NamespaceKind::Class | NamespaceKind::Mixin);
        if holds_instances {
            let (table, base) = builder.instance_table(&ns.full_name);
            if table.len() > base {
                builder.layouts.changes.push(LayoutChange {
                    namespace: ns.full_name.clone(),
                    singleton: false,
                });
                let first_new = ns.ivar_contributions.iter().find_map(|c| match c {
                    IvarContribution::Declare(_, span) => Some(*span),
                    IvarContribution::Include(_) => None,
                });
                let span = first_new.unwrap_or(ns.span);
                failures.extend(builder.frozen_layout(&ns.full_name, ns.registered, span));
            }
        }
        if ns.kind != NamespaceKind::Interface {
            let (table, base) = builder.singleton_table(&ns.full_name);
            if table.len() > base {
                builder.layouts.changes.push(LayoutChange {
                    namespace: ns.full_name.clone(),
                    singleton: true,
                });
                let first_new = ns.singleton_ivars.first().map(|(_, span)| *span);
                let span = first_new.unwrap_or(ns.span);
                failures.extend(builder.frozen_layout(&ns.full_name, ns.registered, span));
            }
        }
    }

    for (error, span) in failures {
        diagnostics.push_failure(error, Location::new(file, span));
    }
    debug!("{} ivar layouts changed", builder.layouts.changes.len());
    builder.layouts
}

struct LayoutBuilder<'a> {
    unit: &'a UnitDeclarations,
    snapshot: &'a RegistrySnapshot,
    layouts: IvarLayouts,
    visiting: AHashSet<(String, bool)>,
}

impl LayoutBuilder<'_> {
    /// Registered classes with registered subclasses cannot grow.
    fn frozen_layout(
        &self,
        class: &str,
        registered: bool,
        span: Span,
    ) -> Option<(CompileError, Span)> {
        if !registered {
            return None;
        }
        let subclass = self.snapshot.subclasses_of(class).next()?;
        Some((
            CompileError::IvarsOnSubclassedClass {
                class: display_name(class).to_string(),
                subclass: display_name(subclass).to_string(),
            },
            span,
        ))
    }

    /// Final instance table of `namespace` and the size it started from.
    fn instance_table(&mut self, namespace: &str) -> (IvarIndexTable, usize) {
        let unit = self.unit;
        let Some(ns) = unit.namespace(namespace) else {
            let table = self
                .snapshot
                .namespace(namespace)
                .map(|info| info.ivars.clone())
                .unwrap_or_default();
            let len = table.len();
            return (table, len);
        };
        if let Some(table) = self.layouts.instance.get(namespace).cloned() {
            let base = self.instance_base(namespace).len();
            return (table, base);
        }
        let key = (namespace.to_string(), false);
        if !self.visiting.insert(key.clone()) {
            return (IvarIndexTable::new(), 0);
        }

        let base = self.instance_base(namespace);
        let base_len = base.len();
        let mut table = base;
        for contribution in &ns.ivar_contributions {
            match contribution {
                IvarContribution::Include(mixin) => {
                    let (mixin_table, _) = self.instance_table(mixin);
                    for (name, _) in mixin_table.iter() {
                        table.insert(name);
                    }
                }
                IvarContribution::Declare(name, _) => {
                    table.insert(name);
                }
            }
        }

        self.visiting.remove(&key);
        self.layouts
            .instance
            .insert(namespace.to_string(), table.clone());
        (table, base_len)
    }

    fn instance_base(&mut self, namespace: &str) -> IvarIndexTable {
        let unit = self.unit;
        let Some(ns) = unit.namespace(namespace) else {
            return IvarIndexTable::new();
        };
        if ns.registered {
            return self
                .snapshot
                .namespace(namespace)
                .map(|info| info.ivars.clone())
                .unwrap_or_default();
        }
        match (&ns.kind, &ns.superclass) {
            (NamespaceKind::Class, Some(superclass)) => self.instance_table(superclass).0,
            _ => IvarIndexTable::new(),
        }
    }

    fn singleton_table(&mut self, namespace: &str) -> (IvarIndexTable, usize) {
        let unit = self.unit;
        let Some(ns) = unit.namespace(namespace) else {
            let table = self
                .snapshot
                .namespace(namespace)
                .map(|info| info.singleton_ivars.clone())
                .unwrap_or_default();
            let len = table.len();
            return (table, len);
        };
        if let Some(table) = self.layouts.singleton.get(namespace).cloned() {
            let base = self.singleton_base(namespace).len();
            return (table, base);
        }
        let key = (namespace.to_string(), true);
        if !self.visiting.insert(key.clone()) {
            return (IvarIndexTable::new(), 0);
        }

        let base = self.singleton_base(namespace);
        let base_len = base.len();
        let mut table = base;
        for (name, _) in &ns.singleton_ivars {
            table.insert(name);
        }

        self.visiting.remove(&key);
        self.layouts
            .singleton
            .insert(namespace.to_string(), table.clone());
        (table, base_len)
    }

    fn singleton_base(&mut self, namespace: &str) -> IvarIndexTable {
        let unit = self.unit;
        let Some(ns) = unit.namespace(namespace) else {
            return IvarIndexTable::new();
        };
        if ns.registered {
            return self
                .snapshot
                .namespace(namespace)
                .map(|info| info.singleton_ivars.clone())
                .unwrap_or_default();
        }
        match (&ns.kind, &ns.superclass) {
            (NamespaceKind::Class, Some(superclass)) => self.singleton_table(superclass).0,
            _ => IvarIndexTable::new(),
        }
    }
}
