//! Literal constants.
//!
//! Numeric and string literals are deduplicated by their source text: the
//! first occurrence takes a global slot, later ones get the same index back.
//! Container, regexp and range literals always take a fresh slot.

use kestrel_core::{Atom, OrderedMap, TextSpan};
use tracing::trace;

use crate::context::ResolutionContext;
use crate::error::ResolveError;
use crate::globals::GlobalValue;
use crate::symbol::{Symbol, SymbolKind};
use crate::types::{TypeDescriptor, ValueKind};

fn parse_int(text: &str) -> Option<i64> {
    let cleaned: String = text.chars().filter(|&c| c != '_').collect();
    let (digits, radix) = if let Some(hex) = cleaned.strip_prefix("0x").or_else(|| cleaned.strip_prefix("0X")) {
        (hex, 16)
    } else if let Some(bin) = cleaned.strip_prefix("0b").or_else(|| cleaned.strip_prefix("0B")) {
        (bin, 2)
    } else {
        (cleaned.as_str(), 10)
    };
    if digits.is_empty() {
        return None;
    }
    // Hex and binary literals spell out the bit pattern.
    if radix == 10 {
        digits.parse().ok()
    } else {
        u64::from_str_radix(digits, radix).ok().map(|v| v as i64)
    }
}

#[derive(Clone, Copy)]
enum Pool {
    Ints,
    Doubles,
    Strings,
}

impl ResolutionContext {
    fn pool_mut(&mut self, pool: Pool) -> &mut OrderedMap<Atom, u32> {
        match pool {
            Pool::Ints => &mut self.pools.ints,
            Pool::Doubles => &mut self.pools.doubles,
            Pool::Strings => &mut self.pools.strings,
        }
    }

    /// Take a global slot without binding a symbol to it. Freed slots are
    /// reused first.
    pub fn new_global(&mut self) -> u32 {
        self.globals.allocate()
    }

    fn pooled_constant(
        &mut self,
        text: Atom,
        value: GlobalValue,
        kind: ValueKind,
        pool: Pool,
    ) -> u32 {
        if let Some(&index) = self.pool_mut(pool).get(&text) {
            return index;
        }
        let symbol = self.symbols.insert(Symbol::new(
            text,
            TextSpan::synthetic(),
            SymbolKind::Constant,
        ));
        self.symbols[symbol].ty = TypeDescriptor::of(kind);
        let index = self.globals.allocate();
        self.symbols[symbol].index = Some(index);
        self.globals.bind(index, symbol);
        self.globals.set(index, value, true);
        self.pool_mut(pool).insert(text, index);
        trace!(constant = %self.atoms.display(text), index, "pooled constant");
        index
    }

    /// Global slot of an integer literal. Accepts decimal, `0x` and `0b`
    /// forms with `_` separators.
    pub fn int_const(&mut self, text: &str, span: TextSpan) -> Result<u32, ResolveError> {
        let value = parse_int(text).ok_or_else(|| ResolveError::InvalidLiteral {
            text: text.to_string(),
            span,
        })?;
        let atom = self.atoms.intern(text);
        Ok(self.pooled_constant(atom, GlobalValue::Int(value), ValueKind::Int, Pool::Ints))
    }

    /// Global slot of a floating point literal. Literals that overflow to
    /// infinity are rejected.
    pub fn double_const(&mut self, text: &str, span: TextSpan) -> Result<u32, ResolveError> {
        let value: f64 = text
            .replace('_', "")
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ResolveError::InvalidLiteral {
                text: text.to_string(),
                span,
            })?;
        let atom = self.atoms.intern(text);
        Ok(self.pooled_constant(atom, GlobalValue::Double(value), ValueKind::Double, Pool::Doubles))
    }

    pub fn string_const(&mut self, text: &str) -> u32 {
        let atom = self.atoms.intern(text);
        self.pooled_constant(atom, GlobalValue::Str(atom), ValueKind::Str, Pool::Strings)
    }

    /// Intern `text` as a string constant and return the interned name.
    pub fn string_const_value(&mut self, text: &str) -> Atom {
        let index = self.string_const(text);
        match self.globals.value(index) {
            Some(GlobalValue::Str(atom)) => *atom,
            _ => self.atoms.intern(text),
        }
    }

    pub fn register_array(&mut self) -> u32 {
        self.register_value_constant("array", GlobalValue::Array, ValueKind::Array)
    }

    pub fn register_map(&mut self) -> u32 {
        self.register_value_constant("map", GlobalValue::Map, ValueKind::Map)
    }

    pub fn register_set(&mut self) -> u32 {
        self.register_value_constant("set", GlobalValue::Set, ValueKind::Set)
    }

    pub fn register_regexp(&mut self) -> u32 {
        self.register_value_constant("regexp", GlobalValue::RegExp, ValueKind::RegExp)
    }

    pub fn register_range(&mut self) -> u32 {
        self.register_value_constant("range", GlobalValue::Range, ValueKind::Range)
    }

    /// A fresh constant slot named `<prefix>-<index>` in the global scope.
    fn register_value_constant(&mut self, prefix: &str, value: GlobalValue, kind: ValueKind) -> u32 {
        let index = self.globals.allocate();
        let name = self.atoms.intern(&format!("{}-{}", prefix, index));
        let mut symbol = Symbol::new(name, TextSpan::synthetic(), SymbolKind::Constant);
        symbol.index = Some(index);
        symbol.ty = TypeDescriptor::of(kind);
        let symbol = self.symbols.insert(symbol);
        self.globals.bind(index, symbol);
        self.globals.set(index, value, true);
        self.scopes[self.global_scope].symbols.insert(name, symbol);
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_int_forms() {
        assert_eq!(parse_int("42"), Some(42));
        assert_eq!(parse_int("1_000"), Some(1000));
        assert_eq!(parse_int("0xff"), Some(255));
        assert_eq!(parse_int("0b101"), Some(5));
        assert_eq!(parse_int("0x"), None);
        assert_eq!(parse_int("12ab"), None);
    }

    #[test]
    fn test_int_constants_deduplicated() {
        let mut ctx = ResolutionContext::new();
        let a = ctx.int_const("7", TextSpan::synthetic()).unwrap();
        let b = ctx.int_const("7", TextSpan::synthetic()).unwrap();
        let c = ctx.int_const("8", TextSpan::synthetic()).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(ctx.globals().value(a), Some(&GlobalValue::Int(7)));
        assert!(ctx.globals().slot(a).unwrap().constant);
    }

    #[test]
    fn test_invalid_literal() {
        let mut ctx = ResolutionContext::new();
        let span = TextSpan::new(3, 4);
        let err = ctx.int_const("0xzz", span).unwrap_err();
        assert_eq!(err, ResolveError::InvalidLiteral { text: "0xzz".into(), span });
        assert!(ctx.double_const("1.2.3", span).is_err());
    }

    #[test]
    fn test_string_constant_value() {
        let mut ctx = ResolutionContext::new();
        let index = ctx.string_const("hello");
        let atom = ctx.string_const_value("hello");
        assert_eq!(ctx.text(atom), "hello");
        assert_eq!(ctx.string_const("hello"), index);
        assert_eq!(ctx.pools().strings.len(), 1);
    }

    #[test]
    fn test_container_constants_are_distinct() {
        let mut ctx = ResolutionContext::new();
        let a = ctx.register_array();
        let b = ctx.register_array();
        assert_ne!(a, b);
        let name = ctx.intern(&format!("array-{}", b));
        let symbol = ctx.scope(ctx.global_scope()).unwrap().symbols.get(name).unwrap();
        assert_eq!(ctx.symbol(symbol).unwrap().index, Some(b));
        let range = ctx.register_range();
        assert_eq!(ctx.globals().value(range), Some(&GlobalValue::Range));
    }

    #[test]
    fn test_freed_constant_leaves_pool() {
        let mut ctx = ResolutionContext::new();
        let seven = ctx.int_const("7", TextSpan::synthetic()).unwrap();
        ctx.free_global(seven);
        assert!(ctx.pools().ints.get(&ctx.intern("7")).is_none());

        let reused = ctx.string_const("unrelated");
        assert_eq!(reused, seven);
        let again = ctx.int_const("7", TextSpan::synthetic()).unwrap();
        assert_ne!(again, seven);
        assert_eq!(ctx.globals().value(again), Some(&GlobalValue::Int(7)));
    }
}
