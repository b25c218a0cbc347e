//! Queries used by the debugger to map source positions back to scopes,
//! statements and frame slots.

use kestrel_core::{Atom, ExpiredHandle, TextPos, TextSpan};

use crate::context::ResolutionContext;
use crate::scope::{ScopeId, StorageRef};
use crate::symbol::SymbolKind;

/// A name the debugger can show for a paused frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleLocal {
    pub name: Atom,
    pub index: u32,
    pub kind: SymbolKind,
    pub is_argument: bool,
    pub storage: StorageRef,
}

/// A statement of the parsed program, as far as the debugger is concerned.
pub trait StatementNode {
    fn span(&self) -> TextSpan;

    /// Statements nested in this one, such as a loop body.
    fn nested(&self) -> &[Self]
    where
        Self: Sized;
}

/// Innermost statement whose span contains `pos`.
pub fn find_statement<S: StatementNode>(statements: &[S], pos: TextPos) -> Option<&S> {
    let statement = statements.iter().find(|s| s.span().contains(pos))?;
    find_statement(statement.nested(), pos).or(Some(statement))
}

impl ResolutionContext {
    /// Source extent of `scope`: from the start of its declaration to the
    /// recorded end.
    pub fn scope_extent(&self, scope: ScopeId) -> Result<TextSpan, ExpiredHandle> {
        let s = self.scopes.resolve(scope)?;
        if s.is_global() {
            return Ok(TextSpan::from_bounds(0, s.end));
        }
        let start = self.symbols.resolve(s.symbol)?.span.start;
        Ok(TextSpan::from_bounds(start, s.end.max(start)))
    }

    /// Innermost scope whose extent contains `pos`. Falls back to the global
    /// scope.
    pub fn scope_at(&self, pos: TextPos) -> ScopeId {
        let mut scope = self.global_scope;
        'descend: loop {
            let Some(current) = self.scopes.get(scope) else {
                return self.global_scope;
            };
            for &child in &current.children {
                if matches!(self.scope_extent(child), Ok(extent) if extent.contains(pos)) {
                    scope = child;
                    continue 'descend;
                }
            }
            return scope;
        }
    }

    /// Arguments, locals and captured variables of a function scope, in
    /// declaration order. Scratch temporaries are left out.
    pub fn visible_locals(&self, scope: ScopeId) -> Result<Vec<VisibleLocal>, ExpiredHandle> {
        let s = self.scopes.resolve(scope)?;
        let args_count = s.function().map_or(0, |f| f.args_count);
        let mut locals = Vec::new();
        for (name, symbol) in s.symbols.iter() {
            let symbol = self.symbols.resolve(symbol)?;
            let Some(index) = symbol.index else { continue };
            let (storage, is_argument) = match symbol.kind {
                SymbolKind::LocalVar => (StorageRef::Local(index), index < args_count),
                SymbolKind::ClosedVar => (StorageRef::Closed(index), false),
                _ => continue,
            };
            locals.push(VisibleLocal {
                name,
                index,
                kind: symbol.kind,
                is_argument,
                storage,
            });
        }
        Ok(locals)
    }

    /// Number of scopes between `scope` and the global scope.
    pub fn scope_depth(&self, scope: ScopeId) -> Result<usize, ExpiredHandle> {
        let mut depth = 0;
        let mut cursor = self.scopes.resolve(scope)?.parent;
        while let Some(parent) = cursor {
            depth += 1;
            if depth > self.options.max_scope_depth {
                break;
            }
            cursor = self.scopes.resolve(parent)?.parent;
        }
        Ok(depth)
    }
}
