//! Symbols and symbol tables.

use kestrel_core::{Atom, Handle, OrderedMap, TextSpan};
use serde::{Deserialize, Serialize};

use crate::class::AttrTable;
use crate::scope::ScopeId;
use crate::types::TypeDescriptor;

pub type SymbolId = Handle<Symbol>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    GlobalScope,
    Constant,
    GlobalVar,
    LocalVar,
    ClosedVar,
    Temporary,
    Function,
    Class,
    ClassMember,
    Method,
    Namespace,
    Property,
    Attribute,
}

impl SymbolKind {
    /// Kinds whose index addresses the global value table.
    pub fn is_global_storage(self) -> bool {
        matches!(
            self,
            SymbolKind::Constant
                | SymbolKind::GlobalVar
                | SymbolKind::Function
                | SymbolKind::Class
                | SymbolKind::Method
                | SymbolKind::Attribute
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            SymbolKind::GlobalScope => "global scope",
            SymbolKind::Constant => "constant",
            SymbolKind::GlobalVar => "global variable",
            SymbolKind::LocalVar => "local variable",
            SymbolKind::ClosedVar => "closed variable",
            SymbolKind::Temporary => "temporary",
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::ClassMember => "class member",
            SymbolKind::Method => "method",
            SymbolKind::Namespace => "namespace",
            SymbolKind::Property => "property",
            SymbolKind::Attribute => "attribute",
        }
    }
}

/// Per-instance field of a class.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberInfo {
    /// Class that declared the member; inherited copies keep it.
    pub owning_class: ScopeId,
    pub attrs: AttrTable,
}

/// Accessor pair of a class property. Indices are global slots of the
/// getter and setter methods.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PropertyInfo {
    pub get_index: Option<u32>,
    pub get_method: Option<ScopeId>,
    pub set_index: Option<u32>,
    pub set_method: Option<ScopeId>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum SymbolData {
    #[default]
    None,
    /// The scope this symbol names (functions, methods, classes, namespaces).
    Scope(ScopeId),
    Member(MemberInfo),
    Property(PropertyInfo),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Symbol {
    pub name: Atom,
    pub span: TextSpan,
    pub kind: SymbolKind,
    /// Global slot, frame slot or capture slot depending on `kind`.
    pub index: Option<u32>,
    /// Captured by at least one closure.
    pub closed: bool,
    /// The outer binding this symbol shadows.
    pub replaced: Option<SymbolId>,
    pub ty: TypeDescriptor,
    pub data: SymbolData,
}

impl Symbol {
    pub fn new(name: Atom, span: TextSpan, kind: SymbolKind) -> Self {
        Self {
            name,
            span,
            kind,
            index: None,
            closed: false,
            replaced: None,
            ty: TypeDescriptor::Unknown,
            data: SymbolData::None,
        }
    }

    pub fn scope(&self) -> Option<ScopeId> {
        match self.data {
            SymbolData::Scope(scope) => Some(scope),
            _ => None,
        }
    }

    pub fn member(&self) -> Option<&MemberInfo> {
        match &self.data {
            SymbolData::Member(member) => Some(member),
            _ => None,
        }
    }

    pub fn member_mut(&mut self) -> Option<&mut MemberInfo> {
        match &mut self.data {
            SymbolData::Member(member) => Some(member),
            _ => None,
        }
    }

    pub fn property(&self) -> Option<&PropertyInfo> {
        match &self.data {
            SymbolData::Property(property) => Some(property),
            _ => None,
        }
    }

    pub fn property_mut(&mut self) -> Option<&mut PropertyInfo> {
        match &mut self.data {
            SymbolData::Property(property) => Some(property),
            _ => None,
        }
    }
}

/// Name to symbol map of one scope.
///
/// Entries are never removed. Restoring a shadowed name that had no outer
/// binding vacates the entry instead, so the entry count, which sizes the
/// local frame, does not shrink.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SymbolTable {
    entries: OrderedMap<Atom, Option<SymbolId>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: Atom) -> Option<SymbolId> {
        self.entries.get(&name).copied().flatten()
    }

    /// Bind `name`, returning the symbol it was bound to before.
    pub fn insert(&mut self, name: Atom, symbol: SymbolId) -> Option<SymbolId> {
        self.entries.insert(name, Some(symbol)).flatten()
    }

    pub(crate) fn bind(&mut self, name: Atom, symbol: Option<SymbolId>) {
        self.entries.insert(name, symbol);
    }

    pub fn contains(&self, name: Atom) -> bool {
        self.get(name).is_some()
    }

    /// Number of entries, vacated ones included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bound entries in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (Atom, SymbolId)> + '_ {
        self.entries
            .iter()
            .filter_map(|(name, symbol)| symbol.map(|symbol| (*name, symbol)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::{Arena, AtomTable};

    #[test]
    fn test_table_vacated_entries_keep_count() {
        let atoms = AtomTable::new();
        let mut arena = Arena::new();
        let x = atoms.intern("x");
        let sym = arena.insert(Symbol::new(x, TextSpan::synthetic(), SymbolKind::LocalVar));
        let mut table = SymbolTable::new();
        assert_eq!(table.insert(x, sym), None);
        table.bind(x, None);
        assert_eq!(table.get(x), None);
        assert_eq!(table.len(), 1);
        assert_eq!(table.iter().count(), 0);
        assert_eq!(table.insert(x, sym), None);
        assert!(table.contains(x));
    }

    #[test]
    fn test_global_storage_kinds() {
        assert!(SymbolKind::Method.is_global_storage());
        assert!(SymbolKind::Attribute.is_global_storage());
        assert!(!SymbolKind::LocalVar.is_global_storage());
        assert!(!SymbolKind::Namespace.is_global_storage());
    }
}
