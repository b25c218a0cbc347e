//! Name resolution.
//!
//! A name reference is either qualified by a namespace path (`gfx::Point`),
//! which is followed from the global scope, or bare, which is looked up
//! from the current scope outward. At each scope on the way out the scope's
//! own table is consulted first, then the namespaces it imported with
//! `use`.

use kestrel_core::{Atom, TextSpan};
use tracing::{debug, trace};

use crate::context::ResolutionContext;
use crate::error::ResolveError;
use crate::scope::{ScopeId, StorageRef};
use crate::symbol::{SymbolId, SymbolKind};

/// A name reference as the parser hands it over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedName {
    /// Namespace path, outermost first. Empty for a bare name.
    pub namespace: Vec<Atom>,
    pub name: Atom,
    pub span: TextSpan,
}

impl QualifiedName {
    pub fn is_qualified(&self) -> bool {
        !self.namespace.is_empty()
    }
}

impl ResolutionContext {
    /// Parse `a::b::name` into a [`QualifiedName`].
    pub fn name(&self, text: &str, span: TextSpan) -> QualifiedName {
        let mut parts: Vec<Atom> = text.split("::").map(|part| self.atoms.intern(part)).collect();
        let name = parts.pop().unwrap_or_else(|| self.atoms.intern(text));
        QualifiedName {
            namespace: parts,
            name,
            span,
        }
    }

    /// The name as written, namespace path included.
    pub fn display_name(&self, name: &QualifiedName) -> String {
        let mut out = String::new();
        for part in &name.namespace {
            out.push_str(self.atoms.resolve(*part));
            out.push_str("::");
        }
        out.push_str(self.atoms.resolve(name.name));
        out
    }

    /// Namespace reached by following `path` from the global scope.
    pub fn namespace_by_path(&self, path: &[Atom]) -> Option<ScopeId> {
        let mut scope = self.global_scope;
        for part in path {
            let symbol = self.scopes.get(scope)?.symbols.get(*part)?;
            let symbol = self.symbols.get(symbol)?;
            if symbol.kind != SymbolKind::Namespace {
                return None;
            }
            scope = symbol.scope()?;
        }
        Some(scope)
    }

    pub fn global_symbol(&self, name: &str) -> Option<SymbolId> {
        let atom = self.atoms.get(name)?;
        self.scopes[self.global_scope].symbols.get(atom)
    }

    /// Import namespace `path` into the current scope.
    pub fn use_namespace(&mut self, path: &str, span: TextSpan) -> Result<ScopeId, ResolveError> {
        let name = self.name(path, span);
        let mut full = name.namespace.clone();
        full.push(name.name);
        let namespace = self
            .namespace_by_path(&full)
            .ok_or_else(|| ResolveError::UndefinedSymbol {
                name: path.to_string(),
                span,
            })?;
        let scope = self.current_mut();
        if !scope.used_namespaces.contains(&namespace) {
            scope.used_namespaces.push(namespace);
        }
        debug!(namespace = path, "using namespace");
        Ok(namespace)
    }

    /// Symbol a name refers to, together with the scope it was found in.
    pub(crate) fn lookup_in(&self, name: &QualifiedName) -> Option<(ScopeId, SymbolId)> {
        if name.is_qualified() {
            let scope = self.namespace_by_path(&name.namespace)?;
            let symbol = self.scopes.get(scope)?.symbols.get(name.name)?;
            return Some((scope, symbol));
        }

        let mut cursor = Some(self.current_scope);
        let mut depth = 0;
        while let Some(id) = cursor {
            let scope = self.scopes.get(id)?;
            if let Some(symbol) = scope.symbols.get(name.name) {
                return Some((id, symbol));
            }
            for &used in &scope.used_namespaces {
                if let Some(symbol) = self.scopes.get(used).and_then(|ns| ns.symbols.get(name.name)) {
                    return Some((used, symbol));
                }
            }
            depth += 1;
            if depth > self.options.max_scope_depth {
                return None;
            }
            cursor = scope.parent;
        }
        None
    }

    pub fn lookup(&self, name: &QualifiedName) -> Option<SymbolId> {
        self.lookup_in(name).map(|(_, symbol)| symbol)
    }

    pub fn resolve(&self, name: &QualifiedName) -> Result<SymbolId, ResolveError> {
        self.lookup(name).ok_or_else(|| ResolveError::UndefinedSymbol {
            name: self.display_name(name),
            span: name.span,
        })
    }

    /// Where the value a name refers to lives, from the point of view of the
    /// current scope.
    ///
    /// A local of an enclosing function is captured: every function scope
    /// between the current one and the owner gets a capture slot, and the
    /// returned reference is the current scope's slot.
    pub fn resolve_storage(&mut self, name: &QualifiedName) -> Result<StorageRef, ResolveError> {
        let (found_in, symbol) = self.lookup_in(name).ok_or_else(|| ResolveError::UndefinedSymbol {
            name: self.display_name(name),
            span: name.span,
        })?;
        let (kind, index) = {
            let symbol = self.symbols.resolve(symbol)?;
            (symbol.kind, symbol.index)
        };
        let Some(index) = index else {
            return Err(self.not_a_value(name));
        };

        match kind {
            SymbolKind::ClassMember => Ok(StorageRef::Member(index)),
            kind if kind.is_global_storage() => Ok(StorageRef::Global(index)),
            SymbolKind::LocalVar | SymbolKind::Temporary if found_in == self.current_scope => {
                Ok(StorageRef::Local(index))
            }
            SymbolKind::ClosedVar if found_in == self.current_scope => Ok(StorageRef::Closed(index)),
            SymbolKind::LocalVar | SymbolKind::Temporary => {
                self.capture_outer(found_in, symbol, StorageRef::Local(index), name.span)
            }
            SymbolKind::ClosedVar => self.capture_outer(found_in, symbol, StorageRef::Closed(index), name.span),
            _ => Err(self.not_a_value(name)),
        }
    }

    fn not_a_value(&self, name: &QualifiedName) -> ResolveError {
        ResolveError::NotAValue {
            name: self.display_name(name),
            span: name.span,
        }
    }

    /// Capture `symbol`, owned by `owner`, into every function scope from
    /// `owner` down to the current scope.
    pub fn capture_outer(
        &mut self,
        owner: ScopeId,
        symbol: SymbolId,
        source: StorageRef,
        span: TextSpan,
    ) -> Result<StorageRef, ResolveError> {
        let name = self.symbols.resolve(symbol)?.name;

        let mut chain = Vec::new();
        let mut cursor = self.current_scope;
        while cursor != owner {
            let scope = self.scopes.resolve(cursor)?;
            if scope.function().is_none() || chain.len() > self.options.max_scope_depth {
                return Err(ResolveError::CannotCapture {
                    name: self.atoms.resolve(name).to_string(),
                    span,
                });
            }
            chain.push(cursor);
            cursor = match scope.parent {
                Some(parent) => parent,
                None => {
                    return Err(ResolveError::CannotCapture {
                        name: self.atoms.resolve(name).to_string(),
                        span,
                    })
                }
            };
        }

        self.symbols.resolve_mut(symbol)?.closed = true;
        let mut storage = source;
        for &scope in chain.iter().rev() {
            let existing = self.scopes[scope]
                .symbols
                .get(name)
                .and_then(|s| self.symbols.get(s))
                .filter(|s| s.kind == SymbolKind::ClosedVar)
                .and_then(|s| s.index);
            let index = match existing {
                Some(index) => index,
                None => self.register_closed_symbol_in(scope, name, span, storage),
            };
            storage = StorageRef::Closed(index);
        }
        trace!(name = %self.atoms.display(name), depth = chain.len(), "captured outer variable");
        Ok(storage)
    }

    /// Attribute declaration a name refers to. Bare names are looked up
    /// from the current scope outward.
    pub fn find_attr(&self, name: &QualifiedName) -> Option<SymbolId> {
        if name.is_qualified() {
            let scope = self.namespace_by_path(&name.namespace)?;
            return self.scopes.get(scope)?.attrs.get(name.name);
        }
        let mut cursor = Some(self.current_scope);
        let mut depth = 0;
        while let Some(id) = cursor {
            let scope = self.scopes.get(id)?;
            if let Some(attr) = scope.attrs.get(name.name) {
                return Some(attr);
            }
            depth += 1;
            if depth > self.options.max_scope_depth {
                return None;
            }
            cursor = scope.parent;
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_qualified_name() {
        let ctx = ResolutionContext::new();
        let name = ctx.name("gfx::shapes::Circle", TextSpan::new(4, 19));
        assert_eq!(name.namespace.len(), 2);
        assert_eq!(ctx.text(name.name), "Circle");
        assert_eq!(ctx.display_name(&name), "gfx::shapes::Circle");
        assert!(!ctx.name("x", TextSpan::synthetic()).is_qualified());
    }

    #[test]
    fn test_undefined_symbol_reports_full_name() {
        let ctx = ResolutionContext::new();
        let name = ctx.name("ns::missing", TextSpan::new(1, 11));
        let err = ctx.resolve(&name).unwrap_err();
        assert_eq!(
            err,
            ResolveError::UndefinedSymbol {
                name: "ns::missing".into(),
                span: TextSpan::new(1, 11)
            }
        );
    }

    #[test]
    fn test_find_attr_walks_outward() {
        let mut ctx = ResolutionContext::new();
        let index = ctx.register_attr("deprecated", TextSpan::synthetic());
        ctx.register_func("f", TextSpan::synthetic(), 0);
        let name = ctx.name("deprecated", TextSpan::synthetic());
        let attr = ctx.find_attr(&name).unwrap();
        assert_eq!(ctx.symbol(attr).unwrap().index, Some(index));
        // Attributes live in their own table.
        assert_eq!(ctx.lookup(&name), None);
    }
}
