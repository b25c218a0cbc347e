//! The flat global value table.
//!
//! Every constant, global variable, function, method, class and attribute
//! owns one slot. Indices are handed out once and stay valid for the whole
//! compilation unit; growth appends in fixed increments and never moves an
//! index. Freed slots go on a free list and are reused before the table
//! grows.

use kestrel_core::Atom;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::scope::ScopeId;
use crate::symbol::SymbolId;

/// Compile-time value stored in a global slot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GlobalValue {
    Nil,
    Bool(bool),
    Int(i64),
    Double(f64),
    Str(Atom),
    Class(ScopeId),
    Function(ScopeId),
    NativeFunction(ScopeId),
    Method(ScopeId),
    NativeMethod(ScopeId),
    /// Empty container literals; the interpreter allocates the storage.
    Array,
    Map,
    Set,
    RegExp,
    Range,
}

impl GlobalValue {
    /// The scope a callable or class value refers to.
    pub fn scope(&self) -> Option<ScopeId> {
        match *self {
            GlobalValue::Class(s)
            | GlobalValue::Function(s)
            | GlobalValue::NativeFunction(s)
            | GlobalValue::Method(s)
            | GlobalValue::NativeMethod(s) => Some(s),
            _ => None,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            GlobalValue::Nil => "nil",
            GlobalValue::Bool(_) => "bool",
            GlobalValue::Int(_) => "int",
            GlobalValue::Double(_) => "double",
            GlobalValue::Str(_) => "string",
            GlobalValue::Class(_) => "class",
            GlobalValue::Function(_) => "func",
            GlobalValue::NativeFunction(_) => "native func",
            GlobalValue::Method(_) => "method",
            GlobalValue::NativeMethod(_) => "native method",
            GlobalValue::Array => "array",
            GlobalValue::Map => "map",
            GlobalValue::Set => "set",
            GlobalValue::RegExp => "regexp",
            GlobalValue::Range => "range",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GlobalSlot {
    pub value: GlobalValue,
    pub constant: bool,
}

impl GlobalSlot {
    const EMPTY: GlobalSlot = GlobalSlot {
        value: GlobalValue::Nil,
        constant: false,
    };
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GlobalTable {
    slots: Vec<GlobalSlot>,
    /// Symbol owning each slot; `None` once freed.
    info: Vec<Option<SymbolId>>,
    free: Vec<u32>,
    capacity: u32,
    growth: u32,
}

impl GlobalTable {
    pub fn new(initial_capacity: u32, growth: u32) -> Self {
        Self {
            slots: Vec::with_capacity(initial_capacity as usize),
            info: Vec::with_capacity(initial_capacity as usize),
            free: Vec::new(),
            capacity: initial_capacity,
            growth: growth.max(1),
        }
    }

    /// Reserve a slot, reusing a freed one first.
    pub fn allocate(&mut self) -> u32 {
        if let Some(index) = self.free.pop() {
            return index;
        }
        if self.slots.len() as u32 == self.capacity {
            self.capacity += self.growth;
            self.slots.reserve(self.growth as usize);
            self.info.reserve(self.growth as usize);
            trace!(capacity = self.capacity, "grew global table");
        }
        let index = self.slots.len() as u32;
        self.slots.push(GlobalSlot::EMPTY);
        self.info.push(None);
        index
    }

    pub fn bind(&mut self, index: u32, symbol: SymbolId) {
        if let Some(entry) = self.info.get_mut(index as usize) {
            *entry = Some(symbol);
        }
    }

    pub fn set(&mut self, index: u32, value: GlobalValue, constant: bool) {
        if let Some(slot) = self.slots.get_mut(index as usize) {
            *slot = GlobalSlot { value, constant };
        }
    }

    /// Return a slot to the free list, handing back the symbol that owned it.
    /// Releasing a slot that is already free does nothing.
    pub fn release(&mut self, index: u32) -> Option<SymbolId> {
        if self.free.contains(&index) {
            return None;
        }
        let slot = self.slots.get_mut(index as usize)?;
        *slot = GlobalSlot::EMPTY;
        self.free.push(index);
        self.info[index as usize].take()
    }

    pub fn slot(&self, index: u32) -> Option<&GlobalSlot> {
        self.slots.get(index as usize)
    }

    pub fn value(&self, index: u32) -> Option<&GlobalValue> {
        self.slot(index).map(|slot| &slot.value)
    }

    pub fn symbol(&self, index: u32) -> Option<SymbolId> {
        self.info.get(index as usize).copied().flatten()
    }

    pub fn is_free(&self, index: u32) -> bool {
        self.free.contains(&index)
    }

    /// Number of slots ever handed out, freed ones included.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Bound slots with their owning symbol.
    pub fn iter(&self) -> impl Iterator<Item = (u32, &GlobalSlot, SymbolId)> {
        self.slots
            .iter()
            .zip(&self.info)
            .enumerate()
            .filter_map(|(i, (slot, info))| info.map(|symbol| (i as u32, slot, symbol)))
    }

    pub(crate) fn is_well_formed(&self) -> bool {
        self.slots.len() == self.info.len()
            && self.free.iter().all(|&i| (i as usize) < self.slots.len())
            && self.slots.len() as u32 <= self.capacity
    }
}
