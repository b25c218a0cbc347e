//! Class descriptors: dispatch tables, special operators, attribute tables.

use kestrel_core::Atom;
use serde::{Deserialize, Serialize};

use crate::scope::ScopeId;
use crate::symbol::SymbolId;

/// Operator hooks a class can implement. The discriminant is the slot in
/// [`SpecialMethods`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SpecialMethod {
    Unknown,
    Constructor,
    Destructor,
    GetIndex,
    SetIndex,
    GetKey,
    SetKey,
    GetProp,
    SetProp,
    Add,
    RAdd,
    SAdd,
    Sub,
    SSub,
    Div,
    SDiv,
    Mul,
    SMul,
    Call,
    Copy,
    Format,
    BoolCheck,
    Less,
}

pub const SPECIAL_METHOD_COUNT: usize = SpecialMethod::Less as usize + 1;

impl SpecialMethod {
    /// Every real operator, in slot order.
    pub const ALL: [SpecialMethod; SPECIAL_METHOD_COUNT - 1] = [
        SpecialMethod::Constructor,
        SpecialMethod::Destructor,
        SpecialMethod::GetIndex,
        SpecialMethod::SetIndex,
        SpecialMethod::GetKey,
        SpecialMethod::SetKey,
        SpecialMethod::GetProp,
        SpecialMethod::SetProp,
        SpecialMethod::Add,
        SpecialMethod::RAdd,
        SpecialMethod::SAdd,
        SpecialMethod::Sub,
        SpecialMethod::SSub,
        SpecialMethod::Div,
        SpecialMethod::SDiv,
        SpecialMethod::Mul,
        SpecialMethod::SMul,
        SpecialMethod::Call,
        SpecialMethod::Copy,
        SpecialMethod::Format,
        SpecialMethod::BoolCheck,
        SpecialMethod::Less,
    ];

    /// Map a declared method name onto an operator; `Unknown` for ordinary
    /// methods.
    pub fn from_name(name: &str) -> SpecialMethod {
        match name {
            "create" => SpecialMethod::Constructor,
            "destroy" => SpecialMethod::Destructor,
            "getIndex" => SpecialMethod::GetIndex,
            "setIndex" => SpecialMethod::SetIndex,
            "getKey" => SpecialMethod::GetKey,
            "setKey" => SpecialMethod::SetKey,
            "getProp" => SpecialMethod::GetProp,
            "setProp" => SpecialMethod::SetProp,
            "add" => SpecialMethod::Add,
            "radd" => SpecialMethod::RAdd,
            "sadd" => SpecialMethod::SAdd,
            "sub" => SpecialMethod::Sub,
            "ssub" => SpecialMethod::SSub,
            "div" => SpecialMethod::Div,
            "sdiv" => SpecialMethod::SDiv,
            "mul" => SpecialMethod::Mul,
            "smul" => SpecialMethod::SMul,
            "call" => SpecialMethod::Call,
            "copy" => SpecialMethod::Copy,
            "format" => SpecialMethod::Format,
            "boolCheck" => SpecialMethod::BoolCheck,
            "less" => SpecialMethod::Less,
            _ => SpecialMethod::Unknown,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SpecialMethod::Unknown => "",
            SpecialMethod::Constructor => "create",
            SpecialMethod::Destructor => "destroy",
            SpecialMethod::GetIndex => "getIndex",
            SpecialMethod::SetIndex => "setIndex",
            SpecialMethod::GetKey => "getKey",
            SpecialMethod::SetKey => "setKey",
            SpecialMethod::GetProp => "getProp",
            SpecialMethod::SetProp => "setProp",
            SpecialMethod::Add => "add",
            SpecialMethod::RAdd => "radd",
            SpecialMethod::SAdd => "sadd",
            SpecialMethod::Sub => "sub",
            SpecialMethod::SSub => "ssub",
            SpecialMethod::Div => "div",
            SpecialMethod::SDiv => "sdiv",
            SpecialMethod::Mul => "mul",
            SpecialMethod::SMul => "smul",
            SpecialMethod::Call => "call",
            SpecialMethod::Copy => "copy",
            SpecialMethod::Format => "format",
            SpecialMethod::BoolCheck => "boolCheck",
            SpecialMethod::Less => "less",
        }
    }

    #[inline]
    pub fn slot(self) -> usize {
        self as usize
    }
}

/// Per-class operator slots, each holding a global index or 0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpecialMethods([u32; SPECIAL_METHOD_COUNT]);

impl SpecialMethods {
    pub fn new() -> Self {
        Self([0; SPECIAL_METHOD_COUNT])
    }

    #[inline]
    pub fn get(&self, method: SpecialMethod) -> Option<u32> {
        match self.0[method.slot()] {
            0 => None,
            index => Some(index),
        }
    }

    #[inline]
    pub fn set(&mut self, method: SpecialMethod, global_index: u32) {
        self.0[method.slot()] = global_index;
    }

    #[inline]
    pub fn clear(&mut self, method: SpecialMethod) {
        self.0[method.slot()] = 0;
    }

    /// Copy for a subclass: constructor and destructor are never inherited.
    pub fn inherited(&self) -> Self {
        let mut copy = *self;
        copy.clear(SpecialMethod::Constructor);
        copy.clear(SpecialMethod::Destructor);
        copy
    }

    /// Operators with a registered implementation.
    pub fn iter(&self) -> impl Iterator<Item = (SpecialMethod, u32)> + '_ {
        SpecialMethod::ALL
            .into_iter()
            .filter_map(move |m| self.get(m).map(|index| (m, index)))
    }
}

impl Default for SpecialMethods {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrMapping {
    /// Index of the attribute declaration.
    pub original: u32,
    /// Storage the attribute resolves to for this member or class.
    pub mapped: u32,
    pub overridable: bool,
}

/// Attribute mappings sorted by original index.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrTable {
    entries: Vec<AttrMapping>,
}

impl AttrTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `original` to `mapped`.
    ///
    /// A new entry is inserted non-overridable. An existing entry is replaced
    /// only if it was inherited and not yet overridden; the replacement is
    /// final. Returns `false` when the entry cannot be replaced.
    pub fn add(&mut self, original: u32, mapped: u32) -> bool {
        match self.entries.binary_search_by_key(&original, |e| e.original) {
            Ok(pos) => {
                let entry = &mut self.entries[pos];
                if !entry.overridable {
                    return false;
                }
                entry.mapped = mapped;
                entry.overridable = false;
                true
            }
            Err(pos) => {
                self.entries.insert(
                    pos,
                    AttrMapping {
                        original,
                        mapped,
                        overridable: false,
                    },
                );
                true
            }
        }
    }

    pub fn get(&self, original: u32) -> Option<u32> {
        self.entries
            .binary_search_by_key(&original, |e| e.original)
            .ok()
            .map(|pos| self.entries[pos].mapped)
    }

    pub fn mapping(&self, original: u32) -> Option<&AttrMapping> {
        self.entries
            .binary_search_by_key(&original, |e| e.original)
            .ok()
            .map(|pos| &self.entries[pos])
    }

    /// The copy a subclass receives: every entry overridable once more.
    pub fn inherited(&self) -> Self {
        Self {
            entries: self
                .entries
                .iter()
                .map(|e| AttrMapping {
                    overridable: true,
                    ..*e
                })
                .collect(),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &AttrMapping> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A constructor argument stored straight into a member slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HiddenCtorArg {
    pub name: Atom,
    pub arg_index: u32,
    pub member_index: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClassInfo {
    /// Weak: expires if the parent class is freed.
    pub parent_class: Option<ScopeId>,
    /// Set once the parent is resolved. Classes may only derive from defined
    /// classes.
    pub defined: bool,
    pub children: Vec<ScopeId>,
    pub special_methods: SpecialMethods,
    pub members_count: u32,
    /// Method scopes by dispatch slot.
    pub methods_table: Vec<ScopeId>,
    /// Member symbols by member slot.
    pub members: Vec<Option<SymbolId>>,
    pub attrs: AttrTable,
    pub native: bool,
    pub hidden_args: Vec<HiddenCtorArg>,
}

impl ClassInfo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn member_at(&self, slot: u32) -> Option<SymbolId> {
        self.members.get(slot as usize).copied().flatten()
    }

    pub(crate) fn set_member(&mut self, slot: u32, member: SymbolId) {
        let slot = slot as usize;
        if slot >= self.members.len() {
            self.members.resize(slot + 1, None);
        }
        self.members[slot] = Some(member);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_special_method_names_round_trip() {
        for method in SpecialMethod::ALL {
            assert_eq!(SpecialMethod::from_name(method.name()), method);
        }
        assert_eq!(SpecialMethod::from_name("speak"), SpecialMethod::Unknown);
        assert_eq!(SPECIAL_METHOD_COUNT, 23);
    }

    #[test]
    fn test_special_methods_inherited_drops_ctor_dtor() {
        let mut table = SpecialMethods::new();
        table.set(SpecialMethod::Constructor, 10);
        table.set(SpecialMethod::Destructor, 11);
        table.set(SpecialMethod::Add, 12);
        let child = table.inherited();
        assert_eq!(child.get(SpecialMethod::Constructor), None);
        assert_eq!(child.get(SpecialMethod::Destructor), None);
        assert_eq!(child.get(SpecialMethod::Add), Some(12));
        assert_eq!(child.iter().collect::<Vec<_>>(), vec![(SpecialMethod::Add, 12)]);
    }

    #[test]
    fn test_attr_table_sorted() {
        let mut attrs = AttrTable::new();
        assert!(attrs.add(9, 90));
        assert!(attrs.add(3, 30));
        assert!(attrs.add(5, 50));
        let order: Vec<u32> = attrs.iter().map(|e| e.original).collect();
        assert_eq!(order, vec![3, 5, 9]);
        assert_eq!(attrs.get(5), Some(50));
        assert_eq!(attrs.get(4), None);
    }

    #[test]
    fn test_attr_own_entry_is_final() {
        let mut attrs = AttrTable::new();
        assert!(attrs.add(1, 10));
        assert!(!attrs.add(1, 11));
        assert_eq!(attrs.get(1), Some(10));
    }

    #[test]
    fn test_attr_override_once() {
        let mut parent = AttrTable::new();
        parent.add(1, 10);
        let mut child = parent.inherited();
        assert!(child.mapping(1).unwrap().overridable);
        assert!(child.add(1, 20));
        assert!(!child.mapping(1).unwrap().overridable);
        assert!(!child.add(1, 30));
        assert_eq!(child.get(1), Some(20));
        assert_eq!(parent.get(1), Some(10));

        let mut grandchild = child.inherited();
        assert!(grandchild.add(1, 40));
        assert_eq!(child.get(1), Some(20));
    }

    #[test]
    fn test_member_slots_grow() {
        let mut info = ClassInfo::new();
        assert_eq!(info.member_at(2), None);
        let mut arena = kestrel_core::Arena::new();
        let table = kestrel_core::AtomTable::new();
        let sym = arena.insert(crate::symbol::Symbol::new(
            table.intern("x"),
            kestrel_core::TextSpan::synthetic(),
            crate::symbol::SymbolKind::ClassMember,
        ));
        info.set_member(2, sym);
        assert_eq!(info.members.len(), 3);
        assert_eq!(info.member_at(2), Some(sym));
        assert_eq!(info.member_at(0), None);
    }
}
