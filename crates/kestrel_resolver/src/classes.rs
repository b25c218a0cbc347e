//! Classes, members, methods and properties.
//!
//! A class owns a copy of everything it inherits: the symbol table, the
//! member slots and the method dispatch table are copied from the parent
//! when the class is derived, so registration in the subclass never touches
//! the parent. Methods are shared between the tables; members are copied
//! one by one since each class keeps its own attribute mappings for them.

use kestrel_core::TextSpan;
use tracing::{debug, span, Level};

use crate::class::{ClassInfo, HiddenCtorArg, SpecialMethod};
use crate::context::ResolutionContext;
use crate::error::{ResolveError, ScopeOperation};
use crate::globals::GlobalValue;
use crate::lookup::QualifiedName;
use crate::scope::{FunctionInfo, MethodInfo, NativeBinding, ScopeExt, ScopeId};
use crate::symbol::{MemberInfo, PropertyInfo, Symbol, SymbolData, SymbolId, SymbolKind};
use crate::types::TypeDescriptor;

impl ResolutionContext {
    /// Declare a class and make it the current scope and class.
    pub fn register_class(&mut self, name: &str, span: TextSpan) -> ScopeId {
        self.declare_class(name, span, ClassInfo::new())
    }

    fn declare_class(&mut self, name: &str, span: TextSpan, info: ClassInfo) -> ScopeId {
        let atom = self.atoms.intern(name);
        let (symbol, scope) = self.create_scope(atom, span, SymbolKind::Class, ScopeExt::Class(Box::new(info)));
        self.symbols[symbol].ty = TypeDescriptor::class(scope);
        let index = self.register_global_symbol(atom, symbol);
        self.globals.set(index, GlobalValue::Class(scope), true);
        self.current_scope = scope;
        self.current_class = Some(scope);
        scope
    }

    /// Re-enter a class declared in the current scope.
    pub fn enter_class(&mut self, name: &str, span: TextSpan) -> Result<ScopeId, ResolveError> {
        let scope = self.child_scope(name, span)?;
        if !self.scopes.resolve(scope)?.is_class() {
            return Err(ResolveError::CannotEnter {
                name: name.to_string(),
                span,
            });
        }
        self.current_scope = scope;
        self.current_class = Some(scope);
        Ok(scope)
    }

    /// Inherit from `parent`, or from the root class when no parent is
    /// named. Must be called right after [`register_class`](Self::register_class).
    pub fn derive_members(&mut self, parent: Option<&QualifiedName>) -> Result<(), ResolveError> {
        let Some(class) = self.current_class else {
            let name = parent.map(|p| self.display_name(p)).unwrap_or_default();
            return Err(ResolveError::InvalidScope {
                operation: ScopeOperation::Inheritance,
                name,
                span: parent.map(|p| p.span).unwrap_or_default(),
            });
        };
        let _span = span!(Level::DEBUG, "derive_members", class = %self.scope_name(class)).entered();

        let parent_class = match parent {
            Some(name) => self.parent_class(name)?,
            None => match self.root_class {
                Some(root) if root != class => root,
                _ => {
                    self.class_info_mut(class)?.defined = true;
                    return Ok(());
                }
            },
        };

        let (specials, mut table, members_count, methods_table, attrs) = {
            let parent_info = self.class_info(parent_class)?;
            (
                parent_info.special_methods.inherited(),
                self.scopes[parent_class].symbols.clone(),
                parent_info.members_count,
                parent_info.methods_table.clone(),
                parent_info.attrs.inherited(),
            )
        };

        // Members declared by an ancestor get a private copy so this class can
        // remap their attributes.
        let mut members = Vec::new();
        let inherited: Vec<_> = table.iter().collect();
        for (name, symbol) in inherited {
            let Some(original) = self.symbols.get(symbol) else {
                continue;
            };
            let Some(member) = original.member() else {
                continue;
            };
            if member.owning_class == class {
                continue;
            }
            let mut copy = original.clone();
            copy.data = SymbolData::Member(MemberInfo {
                owning_class: member.owning_class,
                attrs: member.attrs.inherited(),
            });
            let slot = copy.index;
            let copy = self.symbols.insert(copy);
            table.insert(name, copy);
            if let Some(slot) = slot {
                members.push((slot, copy));
            }
        }

        let own: Vec<_> = self.scopes[class].symbols.iter().collect();
        for (name, symbol) in own {
            table.insert(name, symbol);
        }

        self.scopes[class].symbols = table;
        let info = self.class_info_mut(class)?;
        info.parent_class = Some(parent_class);
        info.defined = true;
        info.special_methods = specials;
        info.members_count = members_count;
        info.methods_table = methods_table;
        info.attrs = attrs;
        for (slot, member) in members {
            info.set_member(slot, member);
        }
        self.class_info_mut(parent_class)?.children.push(class);
        debug!(
            parent = %self.scope_name(parent_class),
            members = members_count,
            "derived class members"
        );
        Ok(())
    }

    fn parent_class(&self, name: &QualifiedName) -> Result<ScopeId, ResolveError> {
        let symbol = self.resolve(name)?;
        let symbol = self.symbols.resolve(symbol)?;
        let scope = match (symbol.kind, symbol.scope()) {
            (SymbolKind::Class, Some(scope)) => scope,
            _ => {
                return Err(ResolveError::NotAClass {
                    name: self.display_name(name),
                    span: name.span,
                })
            }
        };
        if !self.class_info(scope)?.defined {
            return Err(ResolveError::ClassNotDefined {
                name: self.display_name(name),
                span: name.span,
            });
        }
        Ok(scope)
    }

    /// Class data of `scope`.
    ///
    /// # Panics
    ///
    /// Panics if `scope` is live but not a class.
    pub(crate) fn class_info(&self, scope: ScopeId) -> Result<&ClassInfo, ResolveError> {
        match self.scopes.resolve(scope)?.class() {
            Some(info) => Ok(info),
            None => panic!("scope {:?} is not a class", scope),
        }
    }

    pub(crate) fn class_info_mut(&mut self, scope: ScopeId) -> Result<&mut ClassInfo, ResolveError> {
        match self.scopes.resolve_mut(scope)?.class_mut() {
            Some(info) => Ok(info),
            None => panic!("scope {:?} is not a class", scope),
        }
    }

    /// Declare a method of the current class and enter its scope.
    ///
    /// A method named like an inherited one overrides it: the new method
    /// takes the old dispatch slot and the old method is appended to the
    /// table, reachable through the new method's `over_index`.
    pub fn register_method(&mut self, name: &str, span: TextSpan, args_count: u32) -> Result<ScopeId, ResolveError> {
        let Some(class) = self.current_class else {
            return Err(ResolveError::InvalidScope {
                operation: ScopeOperation::Method,
                name: name.to_string(),
                span,
            });
        };
        let atom = self.atoms.intern(name);

        let overridden = match self.scopes[class].symbols.get(atom) {
            None => None,
            Some(existing) => {
                let existing = self.symbols.resolve(existing)?;
                match (existing.kind, existing.scope()) {
                    (SymbolKind::Method, Some(method)) => Some(method),
                    _ => {
                        return Err(ResolveError::OverrideNonMethod {
                            name: name.to_string(),
                            class: self.scope_name(class).to_string(),
                            span,
                        })
                    }
                }
            }
        };
        let old_slot = match overridden {
            Some(method) => self.scopes.get(method).and_then(|m| m.method()).map(|m| m.local_index),
            None => None,
        };

        let table_len = self.class_info(class)?.methods_table.len() as u32;
        let special = SpecialMethod::from_name(name);
        let info = MethodInfo {
            owning_class: class,
            local_index: old_slot.unwrap_or(table_len),
            over_index: old_slot.map(|_| table_len),
            special: special != SpecialMethod::Unknown,
        };

        let current = self.current_scope;
        let full = self.full_name(current, name);
        let full = self.atoms.intern(&full);
        let (symbol, scope) = self.create_scope(
            atom,
            span,
            SymbolKind::Method,
            ScopeExt::Method(FunctionInfo::script(args_count), info),
        );
        self.symbols[symbol].ty = TypeDescriptor::function(scope);

        let table = &mut self.class_info_mut(class)?.methods_table;
        match (old_slot, overridden) {
            (Some(slot), Some(old)) => {
                table[slot as usize] = scope;
                table.push(old);
                debug!(method = name, slot, over_index = table_len, "overrode method");
            }
            _ => table.push(scope),
        }

        let index = self.register_global_symbol(full, symbol);
        self.globals.set(index, GlobalValue::Method(scope), false);
        if special != SpecialMethod::Unknown {
            self.class_info_mut(class)?.special_methods.set(special, index);
        }
        self.scopes[current].symbols.insert(atom, symbol);
        self.current_scope = scope;
        Ok(scope)
    }

    /// Re-enter a method declared in the current scope.
    pub fn enter_method(&mut self, name: &str, span: TextSpan) -> Result<ScopeId, ResolveError> {
        let scope = self.child_scope(name, span)?;
        if self.scopes.resolve(scope)?.method().is_none() {
            return Err(ResolveError::CannotEnter {
                name: name.to_string(),
                span,
            });
        }
        self.current_scope = scope;
        Ok(scope)
    }

    /// Register a host class. It is defined immediately, derives from the
    /// root class, and becomes the current scope and class. A constructor
    /// and destructor become its `create` and `destroy` special methods.
    pub fn register_native_class(
        &mut self,
        name: &str,
        ctor: Option<NativeBinding>,
        dtor: Option<NativeBinding>,
    ) -> ScopeId {
        let info = ClassInfo {
            parent_class: self.root_class,
            defined: true,
            native: true,
            ..ClassInfo::new()
        };
        let class = self.declare_class(name, TextSpan::synthetic(), info);
        if let Some(root) = self.root_class {
            if let Some(root_info) = self.scopes.get_mut(root).and_then(|s| s.class_mut()) {
                root_info.children.push(class);
            }
        }
        if let Some(ctor) = ctor {
            self.add_native_special_method(class, SpecialMethod::Constructor, ctor);
        }
        if let Some(dtor) = dtor {
            self.add_native_special_method(class, SpecialMethod::Destructor, dtor);
        }
        class
    }

    /// Register a host method on the current class. Its scope is not
    /// entered.
    pub fn register_native_method(&mut self, name: &str, binding: NativeBinding) -> Result<ScopeId, ResolveError> {
        let class = match self.current_class {
            Some(class) if class == self.current_scope => class,
            _ => {
                return Err(ResolveError::InvalidScope {
                    operation: ScopeOperation::NativeMethod,
                    name: name.to_string(),
                    span: TextSpan::synthetic(),
                })
            }
        };
        let atom = self.atoms.intern(name);
        Ok(self.add_native_method(class, atom, binding, None))
    }

    /// Register a host implementation of a special operator on the current
    /// class, named `on <operator>`.
    pub fn register_native_special_method(
        &mut self,
        method: SpecialMethod,
        binding: NativeBinding,
    ) -> Result<ScopeId, ResolveError> {
        let Some(class) = self.current_class else {
            return Err(ResolveError::InvalidScope {
                operation: ScopeOperation::NativeMethod,
                name: format!("on {}", method.name()),
                span: TextSpan::synthetic(),
            });
        };
        Ok(self.add_native_special_method(class, method, binding))
    }

    fn add_native_special_method(&mut self, class: ScopeId, method: SpecialMethod, binding: NativeBinding) -> ScopeId {
        let name = self.string_const_value(&format!("on {}", method.name()));
        self.add_native_method(class, name, binding, Some(method))
    }

    fn add_native_method(
        &mut self,
        class: ScopeId,
        name: kestrel_core::Atom,
        binding: NativeBinding,
        special: Option<SpecialMethod>,
    ) -> ScopeId {
        let Some(local_index) = self
            .scopes
            .get(class)
            .and_then(|s| s.class())
            .map(|info| info.methods_table.len() as u32)
        else {
            panic!("native method registered on destroyed class {:?}", class);
        };
        let full = self.full_name(class, self.atoms.resolve(name));
        let full = self.atoms.intern(&full);
        let info = MethodInfo {
            owning_class: class,
            local_index,
            over_index: None,
            special: special.is_some(),
        };
        let (symbol, scope) = self.create_scope(
            name,
            TextSpan::synthetic(),
            SymbolKind::Method,
            ScopeExt::Method(FunctionInfo::native(binding), info),
        );
        self.symbols[symbol].ty = TypeDescriptor::function(scope);
        let index = self.register_global_symbol(full, symbol);
        self.globals.set(index, GlobalValue::NativeMethod(scope), false);

        let class_scope = &mut self.scopes[class];
        class_scope.symbols.insert(name, symbol);
        if let Some(info) = class_scope.class_mut() {
            info.methods_table.push(scope);
            if let Some(special) = special {
                info.special_methods.set(special, index);
            }
        }
        debug!(method = %self.atoms.display(name), index, "registered native method");
        scope
    }

    // ========================================================================
    // Members and properties
    // ========================================================================

    /// Declare a member of the current class, or return the existing member
    /// of that name.
    pub fn register_member(&mut self, name: &str, span: TextSpan) -> Result<SymbolId, ResolveError> {
        let class = self.current_scope;
        if !self.current().is_class() {
            return Err(ResolveError::InvalidScope {
                operation: ScopeOperation::Member,
                name: name.to_string(),
                span,
            });
        }
        let atom = self.atoms.intern(name);
        if let Some(existing) = self.scopes[class].symbols.get(atom) {
            return match self.symbols.resolve(existing)?.kind {
                SymbolKind::ClassMember => Ok(existing),
                _ => Err(ResolveError::NameConflict {
                    name: name.to_string(),
                    span,
                }),
            };
        }

        let info = self.class_info_mut(class)?;
        let slot = info.members_count;
        info.members_count += 1;
        let mut symbol = Symbol::new(atom, span, SymbolKind::ClassMember);
        symbol.index = Some(slot);
        symbol.data = SymbolData::Member(MemberInfo {
            owning_class: class,
            attrs: Default::default(),
        });
        let symbol = self.symbols.insert(symbol);
        self.scopes[class].symbols.insert(atom, symbol);
        self.class_info_mut(class)?.set_member(slot, symbol);
        debug!(member = name, slot, "registered member");
        Ok(symbol)
    }

    /// Member `name` of the current class.
    pub fn member(&self, name: &str) -> Option<SymbolId> {
        let class = self.current_class?;
        let atom = self.atoms.get(name)?;
        let symbol = self.scopes.get(class)?.symbols.get(atom)?;
        match self.symbols.get(symbol)?.kind {
            SymbolKind::ClassMember => Some(symbol),
            _ => None,
        }
    }

    /// Declare a property of the current class. Accessors are bound with
    /// [`bind_getter`](Self::bind_getter) and [`bind_setter`](Self::bind_setter).
    pub fn register_property(&mut self, name: &str, span: TextSpan) -> Result<SymbolId, ResolveError> {
        if self.current_class.is_none() {
            return Err(ResolveError::InvalidScope {
                operation: ScopeOperation::Property,
                name: name.to_string(),
                span,
            });
        }
        let atom = self.atoms.intern(name);
        let mut symbol = Symbol::new(atom, span, SymbolKind::Property);
        symbol.data = SymbolData::Property(PropertyInfo::default());
        let symbol = self.symbols.insert(symbol);
        self.current_mut().symbols.insert(atom, symbol);
        Ok(symbol)
    }

    pub fn property_mut(&mut self, property: SymbolId) -> Option<&mut PropertyInfo> {
        self.symbols.get_mut(property)?.property_mut()
    }

    pub fn bind_getter(&mut self, property: SymbolId, method: ScopeId) -> Result<(), ResolveError> {
        let index = self.method_index(method)?;
        if let Some(info) = self.symbols.resolve_mut(property)?.property_mut() {
            info.get_index = index;
            info.get_method = Some(method);
        }
        Ok(())
    }

    pub fn bind_setter(&mut self, property: SymbolId, method: ScopeId) -> Result<(), ResolveError> {
        let index = self.method_index(method)?;
        if let Some(info) = self.symbols.resolve_mut(property)?.property_mut() {
            info.set_index = index;
            info.set_method = Some(method);
        }
        Ok(())
    }

    fn method_index(&self, method: ScopeId) -> Result<Option<u32>, ResolveError> {
        let symbol = self.scopes.resolve(method)?.symbol;
        Ok(self.symbols.resolve(symbol)?.index)
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    /// Map attribute `attr` to `mapped` on `member`. An inherited mapping may
    /// be overridden once.
    pub fn set_member_attr(&mut self, member: SymbolId, attr: u32, mapped: u32, span: TextSpan) -> Result<(), ResolveError> {
        let added = match self.symbols.resolve_mut(member)?.member_mut() {
            Some(info) => info.attrs.add(attr, mapped),
            None => {
                return Err(ResolveError::NotAValue {
                    name: self.text(self.symbols[member].name).to_string(),
                    span,
                })
            }
        };
        if added {
            Ok(())
        } else {
            Err(self.attribute_override(attr, span))
        }
    }

    /// Map attribute `attr` to `mapped` on the current class.
    pub fn set_class_attr(&mut self, attr: u32, mapped: u32, span: TextSpan) -> Result<(), ResolveError> {
        let Some(class) = self.current_class else {
            return Err(ResolveError::InvalidScope {
                operation: ScopeOperation::Member,
                name: self.attr_name(attr),
                span,
            });
        };
        if self.class_info_mut(class)?.attrs.add(attr, mapped) {
            Ok(())
        } else {
            Err(self.attribute_override(attr, span))
        }
    }

    /// Value attribute `attr` maps to on `member`, falling back to the
    /// member's class and its ancestors.
    pub fn member_attr(&self, member: SymbolId, attr: u32) -> Option<u32> {
        let info = self.symbols.get(member)?.member()?;
        if let Some(mapped) = info.attrs.get(attr) {
            return Some(mapped);
        }
        let mut cursor = Some(info.owning_class);
        let mut depth = 0;
        while let Some(class) = cursor {
            let class_info = self.scopes.get(class)?.class()?;
            if let Some(mapped) = class_info.attrs.get(attr) {
                return Some(mapped);
            }
            depth += 1;
            if depth > self.options.max_scope_depth {
                return None;
            }
            cursor = class_info.parent_class;
        }
        None
    }

    fn attr_name(&self, attr: u32) -> String {
        self.globals
            .symbol(attr)
            .and_then(|symbol| self.symbols.get(symbol))
            .map_or_else(|| format!("#{}", attr), |symbol| self.text(symbol.name).to_string())
    }

    fn attribute_override(&self, attr: u32, span: TextSpan) -> ResolveError {
        ResolveError::AttributeOverride {
            name: self.attr_name(attr),
            span,
        }
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// Whether `ancestor` is `class` or one of its parents.
    pub fn is_in_parents(&self, class: ScopeId, ancestor: ScopeId) -> bool {
        let mut cursor = Some(class);
        let mut depth = 0;
        while let Some(current) = cursor {
            if current == ancestor {
                return true;
            }
            depth += 1;
            if depth > self.options.max_scope_depth {
                return false;
            }
            cursor = self
                .scopes
                .get(current)
                .and_then(|s| s.class())
                .and_then(|info| info.parent_class);
        }
        false
    }

    /// Record that constructor argument `arg_index` initializes member
    /// `member_index` of the current class directly.
    pub fn add_hidden_arg(&mut self, name: &str, arg_index: u32, member_index: u32) -> Result<(), ResolveError> {
        let Some(class) = self.current_class else {
            return Err(ResolveError::InvalidScope {
                operation: ScopeOperation::Member,
                name: name.to_string(),
                span: TextSpan::synthetic(),
            });
        };
        let name = self.atoms.intern(name);
        self.class_info_mut(class)?.hidden_args.push(HiddenCtorArg {
            name,
            arg_index,
            member_index,
        });
        Ok(())
    }

    /// Global index of the method implementing `method` for `class`.
    pub fn special_method(&self, class: ScopeId, method: SpecialMethod) -> Option<u32> {
        self.scopes.get(class)?.class()?.special_methods.get(method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> TextSpan {
        TextSpan::synthetic()
    }

    #[test]
    fn test_native_class_gets_special_methods() {
        let mut ctx = ResolutionContext::new();
        let class = ctx.register_native_class("File", Some(NativeBinding(1)), Some(NativeBinding(2)));
        ctx.leave_scope();
        let ctor = ctx.special_method(class, SpecialMethod::Constructor).unwrap();
        let dtor = ctx.special_method(class, SpecialMethod::Destructor).unwrap();
        assert_ne!(ctor, dtor);
        assert!(matches!(ctx.globals().value(ctor), Some(GlobalValue::NativeMethod(_))));
        assert!(ctx.global_symbol("File.on create").is_some());
        let info = ctx.scope(class).unwrap().class().unwrap();
        assert!(info.defined && info.native);
        assert_eq!(info.parent_class, ctx.root_class());
        assert_eq!(info.methods_table.len(), 2);
    }

    #[test]
    fn test_member_reregistration_returns_existing() {
        let mut ctx = ResolutionContext::new();
        ctx.register_class("Point", span());
        ctx.derive_members(None).unwrap();
        let x = ctx.register_member("x", span()).unwrap();
        let y = ctx.register_member("y", span()).unwrap();
        assert_eq!(ctx.register_member("x", span()).unwrap(), x);
        assert_eq!(ctx.symbol(y).unwrap().index, Some(1));
        assert_eq!(ctx.member("y"), Some(y));
    }

    #[test]
    fn test_member_outside_class_is_rejected() {
        let mut ctx = ResolutionContext::new();
        let err = ctx.register_member("x", span()).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidScope { operation: ScopeOperation::Member, .. }));
    }

    #[test]
    fn test_property_accessors() {
        let mut ctx = ResolutionContext::new();
        ctx.register_class("Box", span());
        ctx.derive_members(None).unwrap();
        let prop = ctx.register_property("size", span()).unwrap();
        let getter = ctx.register_method("getSize", span(), 0).unwrap();
        ctx.leave_scope();
        ctx.bind_getter(prop, getter).unwrap();
        let symbol = ctx.scope(getter).unwrap().symbol;
        let index = ctx.symbol(symbol).unwrap().index;
        let info = ctx.property_mut(prop).unwrap();
        assert_eq!(info.get_index, index);
        assert_eq!(info.get_method, Some(getter));
        assert_eq!(info.set_method, None);
    }

    #[test]
    fn test_special_named_method_sets_slot() {
        let mut ctx = ResolutionContext::new();
        let class = ctx.register_class("Vec2", span());
        ctx.derive_members(None).unwrap();
        let add = ctx.register_method("add", span(), 1).unwrap();
        ctx.leave_scope();
        assert!(ctx.scope(add).unwrap().method().unwrap().special);
        let symbol = ctx.scope(add).unwrap().symbol;
        assert_eq!(ctx.special_method(class, SpecialMethod::Add), ctx.symbol(symbol).unwrap().index);
    }
}
