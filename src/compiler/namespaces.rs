//! Constant path resolution.
//!
//! A relative path is looked up through, in order: `using` imports from the
//! innermost lexical frame outwards, the enclosing namespaces from the innermost
//! outwards, and finally `Std`.

use log::trace;

use crate::ast::{NamespaceKind, NamespacePath};
use crate::compiler::registry::{member_name, ROOT, STD};
use crate::error::CompileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstantKind {
    Namespace(NamespaceKind),
    Value,
}

/// Read access to every constant visible to a unit, by fully-qualified name.
pub trait ConstantLookup {
    fn constant(&self, full_name: &str) -> Option<ConstantKind>;

    fn namespace_kind(&self, full_name: &str) -> Option<NamespaceKind> {
        match self.constant(full_name)? {
            ConstantKind::Namespace(kind) => Some(kind),
            ConstantKind::Value => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Import {
    /// `using A::B as C` makes `C` mean `Root::A::B`.
    Named { name: String, target: String },
    /// `using A::*`
    Wildcard { namespace: String },
}

#[derive(Debug, Clone, Default)]
struct AliasFrame {
    imports: Vec<Import>,
}

/// Stack of `using` frames, one per lexical scope.
#[derive(Debug, Clone)]
pub struct Resolver {
    frames: Vec<AliasFrame>,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new()
    }
}

impl Resolver {
    pub fn new() -> Self {
        Self {
            frames: vec![AliasFrame::default()],
        }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(AliasFrame::default());
    }

    pub fn pop_frame(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    fn innermost(&mut self) -> &mut AliasFrame {
        if self.frames.is_empty() {
            self.frames.push(AliasFrame::default());
        }
        let last = self.frames.len() - 1;
        &mut self.frames[last]
    }

    pub fn add_alias(&mut self, name: &str, target: &str) {
        self.innermost().imports.push(Import::Named {
            name: name.to_string(),
            target: target.to_string(),
        });
    }

    pub fn add_wildcard(&mut self, namespace: &str) {
        self.innermost().imports.push(Import::Wildcard {
            namespace: namespace.to_string(),
        });
    }

    /// Resolve `path` to a fully-qualified constant name. `nesting` lists the
    /// enclosing namespaces from `Root` inwards.
    pub fn resolve(
        &self,
        path: &NamespacePath,
        nesting: &[String],
        lookup: &dyn ConstantLookup,
    ) -> Result<String, CompileError> {
        let Some((head, rest)) = path.segments.split_first() else {
            return Ok(ROOT.to_string());
        };
        let resolved = if path.absolute {
            descend(member_name(ROOT, head), rest, lookup)
        } else {
            self.resolve_relative(head, rest, nesting, lookup)?
        };
        match resolved {
            Some(full) => {
                trace!("resolved `{}` to {}", path, full);
                Ok(full)
            }
            None => Err(CompileError::undefined_constant(path)),
        }
    }

    /// Resolve a path that must name a namespace.
    pub fn resolve_namespace(
        &self,
        path: &NamespacePath,
        nesting: &[String],
        lookup: &dyn ConstantLookup,
    ) -> Result<(String, NamespaceKind), CompileError> {
        let full = self.resolve(path, nesting, lookup)?;
        match lookup.namespace_kind(&full) {
            Some(kind) => Ok((full, kind)),
            None => Err(CompileError::NotANamespace(path.to_string())),
        }
    }

    /// An import binding `head` decides the whole path. Otherwise every
    /// enclosing namespace is tried innermost-first with the full path.
    fn resolve_relative(
        &self,
        head: &str,
        rest: &[String],
        nesting: &[String],
        lookup: &dyn ConstantLookup,
    ) -> Result<Option<String>, CompileError> {
        if let Some(target) = self.resolve_import(head, lookup)? {
            return Ok(descend(target, rest, lookup));
        }

        for namespace in nesting.iter().rev() {
            if let Some(full) = descend(member_name(namespace, head), rest, lookup) {
                return Ok(Some(full));
            }
        }
        if nesting.is_empty() {
            if let Some(full) = descend(member_name(ROOT, head), rest, lookup) {
                return Ok(Some(full));
            }
        }

        Ok(descend(member_name(STD, head), rest, lookup))
    }

    fn resolve_import(
        &self,
        head: &str,
        lookup: &dyn ConstantLookup,
    ) -> Result<Option<String>, CompileError> {
        for frame in self.frames.iter().rev() {
            let mut wildcard_hits: Vec<String> = Vec::new();
            for import in frame.imports.iter().rev() {
                match import {
                    Import::Named { name, target } if name == head => {
                        return Ok(Some(target.clone()));
                    }
                    Import::Named { .. } => {}
                    Import::Wildcard { namespace } => {
                        let candidate = member_name(namespace, head);
                        if lookup.constant(&candidate).is_some()
                            && !wildcard_hits.contains(&candidate)
                        {
                            wildcard_hits.push(candidate);
                        }
                    }
                }
            }
            match wildcard_hits.len() {
                0 => {}
                1 => return Ok(wildcard_hits.pop()),
                _ => {
                    return Err(CompileError::AmbiguousConstant {
                        name: head.to_string(),
                        first: wildcard_hits[1].clone(),
                        second: wildcard_hits[0].clone(),
                    })
                }
            }
        }
        Ok(None)
    }
}

/// Follow `rest` down from `start`; every step must exist.
fn descend(start: String, rest: &[String], lookup: &dyn ConstantLookup) -> Option<String> {
    lookup.constant(&start)?;
    let mut full = start;
    for segment in rest {
        full = member_name(&full, segment);
        lookup.constant(&full)?;
    }
    Some(full)
}

/// Where a namespace declaration's path places it: `(parent, full name)`.
/// The prefix of a declaration path is resolved lexically, never through
/// `using` imports.
pub fn declaration_target(
    path: &NamespacePath,
    nesting: &[String],
    lookup: &dyn ConstantLookup,
) -> Result<(String, String), CompileError> {
    let Some((last, prefix)) = path.segments.split_last() else {
        return Err(CompileError::undefined_constant(path));
    };
    let parent = if prefix.is_empty() {
        if path.absolute {
            ROOT.to_string()
        } else {
            nesting.last().cloned().unwrap_or_else(|| ROOT.to_string())
        }
    } else {
        let prefix_path = NamespacePath {
            segments: prefix.to_vec(),
            absolute: path.absolute,
        };
        let (parent, _) = Resolver::new().resolve_namespace(&prefix_path, nesting, lookup)?;
        parent
    };
    let full = member_name(&parent, last);
    Ok((parent, full))
}
