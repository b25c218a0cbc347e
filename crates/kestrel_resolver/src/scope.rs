//! Scopes.
//!
//! Every function, method, class, namespace and closure literal owns a
//! [`Scope`] in the context's scope arena. The symbol naming the scope
//! points at it through [`SymbolData::Scope`](crate::symbol::SymbolData),
//! and the scope points back through [`Scope::symbol`].

use std::collections::BTreeMap;

use kestrel_core::{Atom, Handle, OrderedMap, TextPos};
use serde::{Deserialize, Serialize};

use crate::block::BlockTree;
use crate::class::ClassInfo;
use crate::symbol::{SymbolId, SymbolKind, SymbolTable};
use crate::types::TypeDescriptor;

pub type ScopeId = Handle<Scope>;

/// Where a value lives at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StorageRef {
    Global(u32),
    Local(u32),
    /// Slot in the enclosing closure's capture array.
    Closed(u32),
    /// Slot in the receiver's member array.
    Member(u32),
}

/// A function value copied into a closure's frame: global slot of the
/// function, local slot that receives it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClosedFunc {
    pub source: u32,
    pub destination: u32,
}

/// Host callback id, resolved by the embedding interpreter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NativeBinding(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Implementation {
    /// Compiled body; `entry` is filled in by the code generator.
    Script { entry: Option<u32> },
    Native(NativeBinding),
}

impl Implementation {
    pub fn is_native(&self) -> bool {
        matches!(self, Implementation::Native(_))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionInfo {
    pub args_count: u32,
    /// Frame size excluding arguments. Recomputed when the scope is left.
    pub locals_count: u32,
    pub return_type: TypeDescriptor,
    pub implementation: Implementation,
    pub named_args: bool,
}

impl FunctionInfo {
    pub fn script(args_count: u32) -> Self {
        Self {
            args_count,
            locals_count: 0,
            return_type: TypeDescriptor::Unknown,
            implementation: Implementation::Script { entry: None },
            named_args: false,
        }
    }

    pub fn native(binding: NativeBinding) -> Self {
        Self {
            implementation: Implementation::Native(binding),
            ..Self::script(0)
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodInfo {
    pub owning_class: ScopeId,
    /// Slot in the owning class's dispatch table.
    pub local_index: u32,
    /// Slot holding the implementation this method overrides.
    pub over_index: Option<u32>,
    pub special: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LiteralInfo {
    /// Placeholder argument names used inside the literal body.
    pub markers: Vec<Atom>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ScopeExt {
    Global,
    Namespace,
    Function(FunctionInfo),
    Literal(FunctionInfo, LiteralInfo),
    Method(FunctionInfo, MethodInfo),
    Class(Box<ClassInfo>),
}

/// Scratch slot pool of one scope.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Temporaries {
    free: Vec<(u32, SymbolId)>,
    acquired: BTreeMap<u32, SymbolId>,
}

impl Temporaries {
    pub(crate) fn pop_free(&mut self) -> Option<(u32, SymbolId)> {
        self.free.pop()
    }

    pub(crate) fn mark_acquired(&mut self, index: u32, symbol: SymbolId) {
        self.acquired.insert(index, symbol);
    }

    /// # Panics
    ///
    /// Panics if `index` is not currently acquired.
    pub(crate) fn release(&mut self, index: u32) {
        match self.acquired.remove(&index) {
            Some(symbol) => self.free.push((index, symbol)),
            None => panic!("released temporary slot {} that was not acquired", index),
        }
    }

    pub fn is_acquired(&self, index: u32) -> bool {
        self.acquired.contains_key(&index)
    }

    pub fn acquired_count(&self) -> usize {
        self.acquired.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub(crate) fn symbols(&self) -> impl Iterator<Item = SymbolId> + '_ {
        self.free
            .iter()
            .map(|&(_, symbol)| symbol)
            .chain(self.acquired.values().copied())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scope {
    pub symbol: SymbolId,
    pub parent: Option<ScopeId>,
    /// Lexically nested scopes, in creation order.
    pub children: Vec<ScopeId>,
    pub symbols: SymbolTable,
    /// Locally declared symbols in declaration order; arguments first.
    pub locals: Vec<SymbolId>,
    pub attrs: SymbolTable,
    /// End of the scope's source extent.
    pub end: TextPos,
    pub blocks: BlockTree,
    /// Capture sources, by capture slot.
    pub closed_vars: Vec<StorageRef>,
    pub closed_funcs: Vec<ClosedFunc>,
    pub temporaries: Temporaries,
    /// Shadowing symbols taken out of the table, kept until the scope ends.
    pub temp_symbols: Vec<SymbolId>,
    pub used_namespaces: Vec<ScopeId>,
    pub tries_entered: u32,
    pub self_closed: bool,
    /// Closure literals declared here. Weak.
    pub literals: OrderedMap<Atom, Vec<ScopeId>>,
    pub ext: ScopeExt,
}

impl Scope {
    pub fn new(symbol: SymbolId, parent: Option<ScopeId>, end: TextPos, ext: ScopeExt) -> Self {
        Self {
            symbol,
            parent,
            children: Vec::new(),
            symbols: SymbolTable::new(),
            locals: Vec::new(),
            attrs: SymbolTable::new(),
            end,
            blocks: BlockTree::new(),
            closed_vars: Vec::new(),
            closed_funcs: Vec::new(),
            temporaries: Temporaries::default(),
            temp_symbols: Vec::new(),
            used_namespaces: Vec::new(),
            tries_entered: 0,
            self_closed: false,
            literals: OrderedMap::new(),
            ext,
        }
    }

    pub fn kind(&self) -> SymbolKind {
        match self.ext {
            ScopeExt::Global => SymbolKind::GlobalScope,
            ScopeExt::Namespace => SymbolKind::Namespace,
            ScopeExt::Function(_) | ScopeExt::Literal(..) => SymbolKind::Function,
            ScopeExt::Method(..) => SymbolKind::Method,
            ScopeExt::Class(_) => SymbolKind::Class,
        }
    }

    pub fn is_global(&self) -> bool {
        matches!(self.ext, ScopeExt::Global)
    }

    pub fn is_namespace(&self) -> bool {
        matches!(self.ext, ScopeExt::Namespace)
    }

    /// Global and namespace scopes store their variables in the global table.
    pub fn holds_globals(&self) -> bool {
        self.is_global() || self.is_namespace()
    }

    pub fn is_class(&self) -> bool {
        matches!(self.ext, ScopeExt::Class(_))
    }

    pub fn function(&self) -> Option<&FunctionInfo> {
        match &self.ext {
            ScopeExt::Function(f) | ScopeExt::Literal(f, _) | ScopeExt::Method(f, _) => Some(f),
            _ => None,
        }
    }

    pub fn function_mut(&mut self) -> Option<&mut FunctionInfo> {
        match &mut self.ext {
            ScopeExt::Function(f) | ScopeExt::Literal(f, _) | ScopeExt::Method(f, _) => Some(f),
            _ => None,
        }
    }

    pub fn method(&self) -> Option<&MethodInfo> {
        match &self.ext {
            ScopeExt::Method(_, m) => Some(m),
            _ => None,
        }
    }

    pub fn method_mut(&mut self) -> Option<&mut MethodInfo> {
        match &mut self.ext {
            ScopeExt::Method(_, m) => Some(m),
            _ => None,
        }
    }

    pub fn literal(&self) -> Option<&LiteralInfo> {
        match &self.ext {
            ScopeExt::Literal(_, l) => Some(l),
            _ => None,
        }
    }

    pub fn class(&self) -> Option<&ClassInfo> {
        match &self.ext {
            ScopeExt::Class(c) => Some(c),
            _ => None,
        }
    }

    pub fn class_mut(&mut self) -> Option<&mut ClassInfo> {
        match &mut self.ext {
            ScopeExt::Class(c) => Some(c),
            _ => None,
        }
    }

    /// A function scope is a closure if it captures anything or refers to
    /// itself.
    pub fn is_closure(&self) -> bool {
        !self.closed_vars.is_empty() || self.self_closed
    }

    /// Local slot already holding the function stored at `global_index`.
    pub fn closed_func_storage(&self, global_index: u32) -> Option<u32> {
        self.closed_funcs
            .iter()
            .find(|cf| cf.source == global_index)
            .map(|cf| cf.destination)
    }

    pub(crate) fn enter_try(&mut self) {
        self.tries_entered += 1;
        self.blocks.enter_try();
    }

    pub(crate) fn leave_try(&mut self) {
        assert!(self.tries_entered > 0, "left a try region that was never entered");
        self.tries_entered -= 1;
        self.blocks.leave_try();
    }
}
