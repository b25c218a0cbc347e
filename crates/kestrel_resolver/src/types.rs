//! Advisory type inference.
//!
//! A [`TypeDescriptor`] records what a symbol or expression is known to hold:
//! nothing yet, one concrete type, or a set of alternatives. Descriptors only
//! ever widen through [`TypeDescriptor::merge`]; nothing here is sound, the
//! code generator uses it to pick fast paths and the debugger to describe
//! values.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::scope::ScopeId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Nil,
    Bool,
    Int,
    Double,
    Str,
    Array,
    Set,
    Map,
    Range,
    RegExp,
    Object,
    Class,
    Func,
    NativeFunc,
    Method,
    NativeMethod,
}

impl ValueKind {
    /// Containers carry element types that are unioned on merge.
    pub fn is_container(self) -> bool {
        matches!(self, ValueKind::Array | ValueKind::Set | ValueKind::Map)
    }

    /// Kinds whose identity is the class or function they refer to.
    pub fn is_keyed(self) -> bool {
        matches!(self, ValueKind::Object | ValueKind::Class | ValueKind::Func)
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ValueKind::Nil => "nil",
            ValueKind::Bool => "bool",
            ValueKind::Int => "int",
            ValueKind::Double => "double",
            ValueKind::Str => "string",
            ValueKind::Array => "array",
            ValueKind::Set => "set",
            ValueKind::Map => "map",
            ValueKind::Range => "range",
            ValueKind::RegExp => "regexp",
            ValueKind::Object => "object",
            ValueKind::Class => "class",
            ValueKind::Func => "func",
            ValueKind::NativeFunc => "native func",
            ValueKind::Method => "method",
            ValueKind::NativeMethod => "native method",
        };
        f.write_str(text)
    }
}

/// One concrete type.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcreteType {
    pub kind: ValueKind,
    /// Class of an object, the class itself, or the function. Weak.
    pub target: Option<ScopeId>,
    /// Element types of a container.
    pub elements: Vec<ConcreteType>,
}

impl ConcreteType {
    pub fn new(kind: ValueKind) -> Self {
        Self {
            kind,
            target: None,
            elements: Vec::new(),
        }
    }

    pub fn keyed(kind: ValueKind, target: ScopeId) -> Self {
        Self {
            kind,
            target: Some(target),
            elements: Vec::new(),
        }
    }

    /// Keyed kinds compare by target identity, everything else by kind.
    /// Element types never take part.
    pub fn same(&self, other: &ConcreteType) -> bool {
        if self.kind != other.kind {
            return false;
        }
        if self.kind.is_keyed() {
            return self.target == other.target;
        }
        true
    }

    fn add_element(&mut self, element: &ConcreteType) {
        if !self.elements.iter().any(|e| e.same(element)) {
            self.elements.push(element.clone());
        }
    }
}

impl PartialEq for ConcreteType {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub enum TypeDescriptor {
    #[default]
    Unknown,
    Defined(ConcreteType),
    /// Distinct alternatives, deduplicated by [`ConcreteType::same`].
    OneOf(Vec<ConcreteType>),
}

impl TypeDescriptor {
    pub fn of(kind: ValueKind) -> Self {
        TypeDescriptor::Defined(ConcreteType::new(kind))
    }

    pub fn class(class: ScopeId) -> Self {
        TypeDescriptor::Defined(ConcreteType::keyed(ValueKind::Class, class))
    }

    pub fn object(class: ScopeId) -> Self {
        TypeDescriptor::Defined(ConcreteType::keyed(ValueKind::Object, class))
    }

    pub fn function(func: ScopeId) -> Self {
        TypeDescriptor::Defined(ConcreteType::keyed(ValueKind::Func, func))
    }

    pub fn container(kind: ValueKind, elements: Vec<ConcreteType>) -> Self {
        debug_assert!(kind.is_container());
        let mut ty = ConcreteType::new(kind);
        for element in &elements {
            ty.add_element(element);
        }
        TypeDescriptor::Defined(ty)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, TypeDescriptor::Unknown)
    }

    /// Widen `self` with `other`.
    pub fn merge(&mut self, other: &TypeDescriptor) {
        match other {
            TypeDescriptor::Unknown => {}
            TypeDescriptor::Defined(incoming) => self.merge_concrete(incoming),
            TypeDescriptor::OneOf(alternatives) => {
                for alternative in alternatives {
                    self.merge_concrete(alternative);
                }
            }
        }
    }

    fn merge_concrete(&mut self, incoming: &ConcreteType) {
        match self {
            TypeDescriptor::Unknown => *self = TypeDescriptor::Defined(incoming.clone()),
            TypeDescriptor::Defined(own) if own.same(incoming) => {
                if own.kind.is_container() {
                    for element in &incoming.elements {
                        own.add_element(element);
                    }
                }
            }
            TypeDescriptor::Defined(own) => {
                let own = own.clone();
                *self = TypeDescriptor::OneOf(vec![own, incoming.clone()]);
            }
            TypeDescriptor::OneOf(alternatives) => {
                if !alternatives.iter().any(|a| a.same(incoming)) {
                    alternatives.push(incoming.clone());
                }
            }
        }
    }

    /// Whether `ty` is one of the alternatives.
    pub fn contains(&self, ty: &ConcreteType) -> bool {
        self.iter().any(|own| own.same(ty))
    }

    /// Alternatives as a slice: empty when unknown, one entry when defined.
    pub fn as_slice(&self) -> &[ConcreteType] {
        match self {
            TypeDescriptor::Unknown => &[],
            TypeDescriptor::Defined(ty) => std::slice::from_ref(ty),
            TypeDescriptor::OneOf(alternatives) => alternatives,
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConcreteType> {
        self.as_slice().iter()
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.is_unknown()
    }
}

impl PartialEq for TypeDescriptor {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (TypeDescriptor::Unknown, TypeDescriptor::Unknown) => true,
            (TypeDescriptor::Defined(a), TypeDescriptor::Defined(b)) => a.same(b),
            (TypeDescriptor::OneOf(a), TypeDescriptor::OneOf(b)) => {
                a.len() == b.len() && a.iter().all(|ty| b.iter().any(|o| o.same(ty)))
            }
            _ => false,
        }
    }
}

impl<'a> IntoIterator for &'a TypeDescriptor {
    type Item = &'a ConcreteType;
    type IntoIter = std::slice::Iter<'a, ConcreteType>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ResolutionContext;
    use kestrel_core::TextSpan;

    fn merged(a: &TypeDescriptor, b: &TypeDescriptor) -> TypeDescriptor {
        let mut out = a.clone();
        out.merge(b);
        out
    }

    #[test]
    fn test_unknown_is_identity() {
        let int = TypeDescriptor::of(ValueKind::Int);
        assert_eq!(merged(&TypeDescriptor::Unknown, &int), int);
        assert_eq!(merged(&int, &TypeDescriptor::Unknown), int);
        assert!(merged(&TypeDescriptor::Unknown, &TypeDescriptor::Unknown).is_unknown());
    }

    #[test]
    fn test_merge_idempotent() {
        let int = TypeDescriptor::of(ValueKind::Int);
        assert_eq!(merged(&int, &int), int);
        let both = merged(&int, &TypeDescriptor::of(ValueKind::Str));
        assert_eq!(merged(&both, &both), both);
        assert_eq!(both.len(), 2);
    }

    #[test]
    fn test_merge_commutative_as_set() {
        let int = TypeDescriptor::of(ValueKind::Int);
        let text = TypeDescriptor::of(ValueKind::Str);
        let double = TypeDescriptor::of(ValueKind::Double);
        let left = merged(&merged(&int, &text), &double);
        let right = merged(&double, &merged(&text, &int));
        assert_eq!(left, right);
        assert_eq!(left.len(), 3);
    }

    #[test]
    fn test_container_elements_union() {
        let ints = TypeDescriptor::container(ValueKind::Array, vec![ConcreteType::new(ValueKind::Int)]);
        let strs = TypeDescriptor::container(ValueKind::Array, vec![ConcreteType::new(ValueKind::Str)]);
        let out = merged(&ints, &strs);
        let TypeDescriptor::Defined(array) = &out else {
            panic!("expected a single array type, got {:?}", out);
        };
        assert_eq!(array.kind, ValueKind::Array);
        assert_eq!(array.elements.len(), 2);
        assert_eq!(merged(&out, &ints), out);
    }

    #[test]
    fn test_iteration_cardinality() {
        assert_eq!(TypeDescriptor::Unknown.iter().count(), 0);
        assert_eq!(TypeDescriptor::of(ValueKind::Nil).iter().count(), 1);
        let three = merged(
            &merged(&TypeDescriptor::of(ValueKind::Nil), &TypeDescriptor::of(ValueKind::Bool)),
            &TypeDescriptor::of(ValueKind::Int),
        );
        let kinds: Vec<ValueKind> = (&three).into_iter().map(|t| t.kind).collect();
        assert_eq!(kinds, vec![ValueKind::Nil, ValueKind::Bool, ValueKind::Int]);
    }

    #[test]
    fn test_objects_compare_by_class_identity() {
        let mut ctx = ResolutionContext::new();
        let a = ctx.register_class("A", TextSpan::synthetic());
        ctx.leave_scope();
        let b = ctx.register_class("B", TextSpan::synthetic());
        ctx.leave_scope();

        let obj_a = TypeDescriptor::object(a);
        assert_eq!(obj_a, TypeDescriptor::object(a));
        assert_ne!(obj_a, TypeDescriptor::object(b));
        assert_ne!(obj_a, TypeDescriptor::class(a));

        let either = merged(&obj_a, &TypeDescriptor::object(b));
        assert_eq!(either.len(), 2);
        assert!(either.contains(&ConcreteType::keyed(ValueKind::Object, b)));
    }
}
