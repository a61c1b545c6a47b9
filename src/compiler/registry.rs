//! Namespaces known across compilation units.
//!
//! Units compile against an immutable snapshot; a unit that compiles without
//! failures publishes what it declared by swapping in a new snapshot.

use std::sync::Arc;

use ahash::AHashMap;
use indexmap::IndexSet;
use log::info;
use parking_lot::RwLock;

use crate::ast::NamespaceKind;
use crate::bytecode::IvarIndexTable;
use crate::compiler::namespaces::{ConstantKind, ConstantLookup};

pub const ROOT: &str = "Root";
pub const STD: &str = "Root::Std";
pub const OBJECT: &str = "Root::Std::Object";
pub const LIST: &str = "Root::Std::List";
pub const TUPLE: &str = "Root::Std::Tuple";
pub const MAP: &str = "Root::Std::Map";
pub const PATTERN_NOT_MATCHED_ERROR: &str = "Root::Std::PatternNotMatchedError";

/// Join a namespace's full name and a member name.
pub fn member_name(namespace: &str, name: &str) -> String {
    format!("{}::{}", namespace, name)
}

#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceInfo {
    pub kind: NamespaceKind,
    pub superclass: Option<String>,
    pub mixins: Vec<String>,
    pub ivars: IvarIndexTable,
    pub singleton_ivars: IvarIndexTable,
    /// Short names of nested namespaces and constants.
    pub members: IndexSet<String>,
}

impl NamespaceInfo {
    pub fn new(kind: NamespaceKind, superclass: Option<&str>) -> Self {
        Self {
            kind,
            superclass: superclass.map(str::to_string),
            mixins: Vec::new(),
            ivars: IvarIndexTable::new(),
            singleton_ivars: IvarIndexTable::new(),
            members: IndexSet::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    namespaces: AHashMap<String, NamespaceInfo>,
}

impl RegistrySnapshot {
    /// `Root` and the parts of `Std` the compiler refers to.
    pub fn prelude() -> Self {
        let mut snapshot = Self::default();
        snapshot.insert(ROOT, NamespaceInfo::new(NamespaceKind::Module, None));
        snapshot.declare(ROOT, "Std", NamespaceInfo::new(NamespaceKind::Module, None));
        snapshot.declare(STD, "Value", NamespaceInfo::new(NamespaceKind::Class, None));
        snapshot.declare(
            STD,
            "Object",
            NamespaceInfo::new(NamespaceKind::Class, Some("Root::Std::Value")),
        );
        for name in [
            "Int", "Float", "String", "Symbol", "Nil", "Bool", "List", "Tuple", "Map", "Error",
        ] {
            snapshot.declare(STD, name, NamespaceInfo::new(NamespaceKind::Class, Some(OBJECT)));
        }
        snapshot.declare(
            STD,
            "PatternNotMatchedError",
            NamespaceInfo::new(NamespaceKind::Class, Some("Root::Std::Error")),
        );
        snapshot.declare(STD, "Kernel", NamespaceInfo::new(NamespaceKind::Module, None));
        snapshot
    }

    fn declare(&mut self, parent: &str, name: &str, info: NamespaceInfo) {
        if let Some(parent) = self.namespaces.get_mut(parent) {
            parent.members.insert(name.to_string());
        }
        self.insert(&member_name(parent, name), info);
    }

    pub fn insert(&mut self, full_name: &str, info: NamespaceInfo) {
        self.namespaces.insert(full_name.to_string(), info);
    }

    pub fn namespace(&self, full_name: &str) -> Option<&NamespaceInfo> {
        self.namespaces.get(full_name)
    }

    pub fn namespace_mut(&mut self, full_name: &str) -> Option<&mut NamespaceInfo> {
        self.namespaces.get_mut(full_name)
    }

    /// Names of registered classes whose superclass is `class`.
    pub fn subclasses_of<'a>(&'a self, class: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.namespaces
            .iter()
            .filter(move |(_, info)| info.superclass.as_deref() == Some(class))
            .map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.namespaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }
}

impl ConstantLookup for RegistrySnapshot {
    fn constant(&self, full_name: &str) -> Option<ConstantKind> {
        if let Some(info) = self.namespaces.get(full_name) {
            return Some(ConstantKind::Namespace(info.kind));
        }
        let (parent, name) = full_name.rsplit_once("::")?;
        self.namespaces
            .get(parent)
            .filter(|info| info.members.contains(name))
            .map(|_| ConstantKind::Value)
    }
}

/// Shared, read-mostly registry. Cheap to read from many threads at once.
#[derive(Debug)]
pub struct NamespaceRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
}

impl Default for NamespaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl NamespaceRegistry {
    pub fn new() -> Self {
        Self::with_snapshot(RegistrySnapshot::prelude())
    }

    pub fn with_snapshot(snapshot: RegistrySnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        Arc::clone(&self.current.read())
    }

    /// Apply `update` to a copy of the current snapshot and swap it in. The
    /// write lock is held throughout, so `update` can check the latest state
    /// and refuse by returning an error, leaving the registry unchanged.
    pub fn publish<E>(
        &self,
        update: impl FnOnce(&mut RegistrySnapshot) -> Result<(), E>,
    ) -> Result<(), E> {
        let mut guard = self.current.write();
        let mut next = RegistrySnapshot::clone(&guard);
        update(&mut next)?;
        info!(
            "registry updated: {} -> {} namespaces",
            guard.len(),
            next.len()
        );
        *guard = Arc::new(next);
        Ok(())
    }
}
