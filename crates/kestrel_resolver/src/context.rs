//! The resolution context.
//!
//! A [`ResolutionContext`] is driven by the syntax tree walker through
//! "enter scope / register symbol / resolve name / leave scope" calls. It
//! owns every symbol and scope of the compilation unit, the global value
//! table, and the cursor naming the scope and class currently being
//! declared.
//!
//! Registration that depends on where it happens (namespace members, class
//! members, methods) always acts on the cursor, the same way the tree walker
//! sees the program.

use kestrel_core::{Arena, Atom, AtomTable, ExpiredHandle, OrderedMap, TextPos, TextSpan};
use kestrel_options::ResolverOptions;
use tracing::{debug, trace};

use crate::block::{BlockId, ControlBlock};
use crate::error::{ResolveError, ScopeOperation};
use crate::globals::{GlobalTable, GlobalValue};
use crate::scope::{
    ClosedFunc, FunctionInfo, LiteralInfo, NativeBinding, Scope, ScopeExt, ScopeId, StorageRef,
};
use crate::symbol::{Symbol, SymbolData, SymbolId, SymbolKind};
use crate::types::{TypeDescriptor, ValueKind};

/// Literal constants deduplicated by source text. Values are global slots.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct ConstantPools {
    pub strings: OrderedMap<Atom, u32>,
    pub ints: OrderedMap<Atom, u32>,
    pub doubles: OrderedMap<Atom, u32>,
}

impl ConstantPools {
    /// Drop any pooled literal that lives in global slot `index`.
    pub(crate) fn forget(&mut self, index: u32) {
        for pool in [&mut self.strings, &mut self.ints, &mut self.doubles] {
            pool.retain(|_, &slot| slot != index);
        }
    }
}

pub struct ResolutionContext {
    pub(crate) atoms: AtomTable,
    pub(crate) options: ResolverOptions,
    pub(crate) symbols: Arena<Symbol>,
    pub(crate) scopes: Arena<Scope>,
    pub(crate) globals: GlobalTable,
    pub(crate) pools: ConstantPools,
    pub(crate) global_scope: ScopeId,
    pub(crate) current_scope: ScopeId,
    pub(crate) current_class: Option<ScopeId>,
    /// Implicit base of every class declared without a parent.
    pub(crate) root_class: Option<ScopeId>,
    /// First global slot not taken by the standard globals.
    pub(crate) std_end: u32,
    pub(crate) nil_index: u32,
    pub(crate) true_index: u32,
    pub(crate) false_index: u32,
}

impl ResolutionContext {
    pub fn new() -> Self {
        Self::with_options(ResolverOptions::default())
    }

    pub fn with_options(options: ResolverOptions) -> Self {
        let atoms = AtomTable::new();
        let mut symbols = Arena::new();
        let mut scopes = Arena::new();

        let global_name = atoms.intern_static("global");
        let global_symbol = symbols.insert(Symbol::new(
            global_name,
            TextSpan::synthetic(),
            SymbolKind::GlobalScope,
        ));
        let global_scope = scopes.insert(Scope::new(global_symbol, None, TextPos::MAX, ScopeExt::Global));
        symbols[global_symbol].data = SymbolData::Scope(global_scope);

        let globals = GlobalTable::new(options.globals_initial_capacity, options.globals_growth);
        let mut ctx = Self {
            atoms,
            options,
            symbols,
            scopes,
            globals,
            pools: ConstantPools::default(),
            global_scope,
            current_scope: global_scope,
            current_class: None,
            root_class: None,
            std_end: 0,
            nil_index: 0,
            true_index: 0,
            false_index: 0,
        };

        ctx.nil_index = ctx.register_standard_constant("nil", GlobalValue::Nil, ValueKind::Nil);
        ctx.true_index = ctx.register_standard_constant("true", GlobalValue::Bool(true), ValueKind::Bool);
        ctx.false_index = ctx.register_standard_constant("false", GlobalValue::Bool(false), ValueKind::Bool);

        let root_name = ctx.options.root_class_name.clone();
        let root = ctx.register_native_class(&root_name, None, None);
        ctx.leave_scope();
        ctx.root_class = Some(root);
        ctx.std_end = ctx.globals.len() as u32;
        debug!(std_end = ctx.std_end, "registered standard globals");
        ctx
    }

    fn register_standard_constant(&mut self, name: &str, value: GlobalValue, kind: ValueKind) -> u32 {
        let symbol = self.new_symbol(name, TextSpan::synthetic(), SymbolKind::Constant);
        self.symbols[symbol].ty = TypeDescriptor::of(kind);
        let atom = self.symbols[symbol].name;
        let index = self.register_global_symbol(atom, symbol);
        self.globals.set(index, value, true);
        index
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn atoms(&self) -> &AtomTable {
        &self.atoms
    }

    pub fn options(&self) -> &ResolverOptions {
        &self.options
    }

    pub fn intern(&self, text: &str) -> Atom {
        self.atoms.intern(text)
    }

    pub fn text(&self, atom: Atom) -> &str {
        self.atoms.resolve(atom)
    }

    pub fn symbol(&self, id: SymbolId) -> Result<&Symbol, ExpiredHandle> {
        self.symbols.resolve(id)
    }

    pub fn symbol_mut(&mut self, id: SymbolId) -> Result<&mut Symbol, ExpiredHandle> {
        self.symbols.resolve_mut(id)
    }

    pub fn scope(&self, id: ScopeId) -> Result<&Scope, ExpiredHandle> {
        self.scopes.resolve(id)
    }

    pub fn scope_mut(&mut self, id: ScopeId) -> Result<&mut Scope, ExpiredHandle> {
        self.scopes.resolve_mut(id)
    }

    pub fn symbols(&self) -> &Arena<Symbol> {
        &self.symbols
    }

    pub fn scopes(&self) -> &Arena<Scope> {
        &self.scopes
    }

    pub fn globals(&self) -> &GlobalTable {
        &self.globals
    }

    pub fn pools(&self) -> &ConstantPools {
        &self.pools
    }

    pub fn global_scope(&self) -> ScopeId {
        self.global_scope
    }

    pub fn current_scope(&self) -> ScopeId {
        self.current_scope
    }

    pub fn current_class(&self) -> Option<ScopeId> {
        self.current_class
    }

    pub fn root_class(&self) -> Option<ScopeId> {
        self.root_class
    }

    pub fn std_end(&self) -> u32 {
        self.std_end
    }

    pub fn nil_index(&self) -> u32 {
        self.nil_index
    }

    pub fn true_index(&self) -> u32 {
        self.true_index
    }

    pub fn false_index(&self) -> u32 {
        self.false_index
    }

    /// Name of the symbol that owns `scope`, or an empty string if the
    /// scope is gone.
    pub fn scope_name(&self, scope: ScopeId) -> &str {
        self.scopes
            .get(scope)
            .and_then(|s| self.symbols.get(s.symbol))
            .map_or("", |symbol| self.atoms.resolve(symbol.name))
    }

    pub(crate) fn current(&self) -> &Scope {
        &self.scopes[self.current_scope]
    }

    pub(crate) fn current_mut(&mut self) -> &mut Scope {
        &mut self.scopes[self.current_scope]
    }

    // ========================================================================
    // Names
    // ========================================================================

    /// Path of `scope` from the global scope: `::` after a namespace, `.`
    /// after anything else. The global scope contributes nothing.
    pub fn scope_path(&self, scope: ScopeId) -> String {
        let mut segments: Vec<(Atom, bool)> = Vec::new();
        let mut cursor = Some(scope);
        while let Some(id) = cursor {
            if segments.len() > self.options.max_scope_depth {
                break;
            }
            let Some(s) = self.scopes.get(id) else { break };
            if s.is_global() {
                break;
            }
            let Some(symbol) = self.symbols.get(s.symbol) else { break };
            segments.push((symbol.name, s.is_namespace()));
            cursor = s.parent;
        }

        let mut out = String::new();
        let mut after_namespace = false;
        for (i, (name, is_namespace)) in segments.iter().rev().enumerate() {
            if i > 0 {
                out.push_str(if after_namespace { "::" } else { "." });
            }
            out.push_str(self.atoms.resolve(*name));
            after_namespace = *is_namespace;
        }
        out
    }

    /// Qualified name of `name` declared directly in `scope`.
    pub fn full_name(&self, scope: ScopeId, name: &str) -> String {
        let prefix = self.scope_path(scope);
        if prefix.is_empty() {
            return name.to_string();
        }
        let separator = match self.scopes.get(scope) {
            Some(s) if s.is_namespace() => "::",
            _ => ".",
        };
        format!("{}{}{}", prefix, separator, name)
    }

    // ========================================================================
    // Symbol registration
    // ========================================================================

    /// Create a symbol owned by the context without binding it anywhere.
    pub fn new_symbol(&mut self, name: &str, span: TextSpan, kind: SymbolKind) -> SymbolId {
        let atom = self.atoms.intern(name);
        self.symbols.insert(Symbol::new(atom, span, kind))
    }

    pub(crate) fn create_scope(
        &mut self,
        name: Atom,
        span: TextSpan,
        kind: SymbolKind,
        ext: ScopeExt,
    ) -> (SymbolId, ScopeId) {
        let parent = self.current_scope;
        let symbol = self.symbols.insert(Symbol::new(name, span, kind));
        let scope = self.scopes.insert(Scope::new(symbol, Some(parent), span.end(), ext));
        self.symbols[symbol].data = SymbolData::Scope(scope);
        self.scopes[parent].children.push(scope);
        (symbol, scope)
    }

    /// Give `symbol` a global slot and bind it.
    ///
    /// Inside a namespace the symbol is bound under `name` in the namespace
    /// and under its qualified name in the global scope; everywhere else it
    /// is bound under `name` in the global scope.
    pub fn register_global_symbol(&mut self, name: Atom, symbol: SymbolId) -> u32 {
        let index = self.globals.allocate();
        self.symbols[symbol].index = Some(index);
        self.globals.bind(index, symbol);

        let current = self.current_scope;
        if self.scopes[current].is_namespace() {
            self.scopes[current].symbols.insert(name, symbol);
            let full = self.full_name(current, self.atoms.resolve(name));
            let full = self.atoms.intern(&full);
            self.scopes[self.global_scope].symbols.insert(full, symbol);
        } else {
            self.scopes[self.global_scope].symbols.insert(name, symbol);
        }
        debug!(name = %self.atoms.display(name), index, "registered global");
        index
    }

    /// Bind `symbol` in the current scope at the next frame slot.
    pub fn register_local_symbol(&mut self, symbol: SymbolId) -> u32 {
        let name = self.symbols[symbol].name;
        let scope = &mut self.scopes[self.current_scope];
        let index = scope.symbols.len() as u32;
        scope.locals.push(symbol);
        scope.symbols.insert(name, symbol);
        self.symbols[symbol].index = Some(index);
        trace!(name = %self.atoms.display(name), index, "registered local");
        index
    }

    /// A global slot visible only through the current scope's table.
    pub fn register_scoped_global(&mut self, name: &str, span: TextSpan) -> u32 {
        let symbol = self.new_symbol(name, span, SymbolKind::GlobalVar);
        let index = self.globals.allocate();
        self.symbols[symbol].index = Some(index);
        self.globals.bind(index, symbol);
        let atom = self.symbols[symbol].name;
        self.current_mut().symbols.insert(atom, symbol);
        index
    }

    /// Bind `symbol` over whatever its name resolves to in the current
    /// scope, remembering the shadowed binding on the symbol.
    pub fn replace_local_symbol(&mut self, symbol: SymbolId) {
        let name = self.symbols[symbol].name;
        let scope = &mut self.scopes[self.current_scope];
        let previous = scope.symbols.get(name);
        scope.symbols.insert(name, symbol);
        self.symbols[symbol].replaced = previous;
    }

    /// Undo [`replace_local_symbol`](Self::replace_local_symbol). The
    /// shadowing symbol stays alive in the scope until it ends.
    pub fn restore_local_symbol(&mut self, symbol: SymbolId) {
        let (name, replaced) = {
            let s = &self.symbols[symbol];
            (s.name, s.replaced)
        };
        let scope = &mut self.scopes[self.current_scope];
        scope.temp_symbols.push(symbol);
        scope.symbols.bind(name, replaced);
    }

    /// Declare a variable: global in global and namespace scopes, local
    /// everywhere else.
    pub fn register_var(&mut self, name: &str, span: TextSpan) -> StorageRef {
        if self.current().holds_globals() {
            let symbol = self.new_symbol(name, span, SymbolKind::GlobalVar);
            let atom = self.symbols[symbol].name;
            StorageRef::Global(self.register_global_symbol(atom, symbol))
        } else {
            let symbol = self.new_symbol(name, span, SymbolKind::LocalVar);
            StorageRef::Local(self.register_local_symbol(symbol))
        }
    }

    /// Declare a local and update the frame size right away.
    pub fn register_local_var(&mut self, name: &str, span: TextSpan) -> u32 {
        let symbol = self.new_symbol(name, span, SymbolKind::LocalVar);
        let index = self.register_local_symbol(symbol);
        let scope = self.current_mut();
        let count = scope.symbols.len() as u32;
        if let Some(func) = scope.function_mut() {
            func.locals_count = count.saturating_sub(func.args_count);
        }
        index
    }

    pub fn register_arg(&mut self, name: &str, span: TextSpan) -> u32 {
        let symbol = self.new_symbol(name, span, SymbolKind::LocalVar);
        self.register_local_symbol(symbol)
    }

    /// Make an existing symbol visible under its name in the current scope.
    pub fn add_alias(&mut self, symbol: SymbolId) {
        let name = self.symbols[symbol].name;
        self.current_mut().symbols.insert(name, symbol);
    }

    /// Release a global slot. A scope held by the slot is destroyed, which
    /// expires every handle to it and to its nested scopes.
    pub fn free_global(&mut self, index: u32) {
        let Some(symbol) = self.globals.release(index) else {
            return;
        };
        debug!(index, "freed global");
        self.pools.forget(index);
        if let Some(scope) = self.symbols.get(symbol).and_then(Symbol::scope) {
            self.destroy_scope(scope);
        }
    }

    pub(crate) fn destroy_scope(&mut self, scope: ScopeId) {
        let Ok(removed) = self.scopes.remove(scope) else {
            return;
        };
        for child in removed.children {
            self.destroy_scope(child);
        }
        if let Some(parent) = removed.parent.and_then(|p| self.scopes.get_mut(p)) {
            parent.children.retain(|&c| c != scope);
        }
        if !self.scopes.contains(self.current_scope) {
            self.current_scope = self.global_scope;
            self.current_class = None;
        }
        trace!(scope = ?scope, "destroyed scope");
    }

    // ========================================================================
    // Functions and scopes
    // ========================================================================

    /// Declare a script function and enter its scope.
    ///
    /// Outside global and namespace scope the function is registered
    /// globally under its qualified name and bound under its short name in
    /// the enclosing scope.
    pub fn register_func(&mut self, name: &str, span: TextSpan, args_count: u32) -> ScopeId {
        self.register_function_scope(name, span, ScopeExt::Function(FunctionInfo::script(args_count)))
    }

    /// Declare a closure literal and enter its scope. The literal is also
    /// recorded, weakly, in the enclosing scope's literal registry.
    pub fn register_literal(
        &mut self,
        name: &str,
        span: TextSpan,
        args_count: u32,
        markers: &[&str],
    ) -> ScopeId {
        let markers = markers.iter().map(|m| self.atoms.intern(m)).collect();
        let parent = self.current_scope;
        let scope = self.register_function_scope(
            name,
            span,
            ScopeExt::Literal(FunctionInfo::script(args_count), LiteralInfo { markers }),
        );
        let atom = self.atoms.intern(name);
        let registry = &mut self.scopes[parent].literals;
        match registry.get_mut(&atom) {
            Some(list) => list.push(scope),
            None => {
                registry.insert(atom, vec![scope]);
            }
        }
        scope
    }

    fn register_function_scope(&mut self, name: &str, span: TextSpan, ext: ScopeExt) -> ScopeId {
        let atom = self.atoms.intern(name);
        let current = self.current_scope;
        let (symbol, scope) = self.create_scope(atom, span, SymbolKind::Function, ext);
        self.symbols[symbol].ty = TypeDescriptor::function(scope);

        let index = if self.scopes[current].holds_globals() {
            self.register_global_symbol(atom, symbol)
        } else {
            let full = self.full_name(current, name);
            let full = self.atoms.intern(&full);
            let index = self.register_global_symbol(full, symbol);
            self.scopes[current].symbols.insert(atom, symbol);
            index
        };
        self.globals.set(index, GlobalValue::Function(scope), false);
        self.current_scope = scope;
        scope
    }

    /// Register a host function. Its scope is not entered.
    pub fn register_native_func(&mut self, name: &str, binding: NativeBinding) -> u32 {
        let atom = self.atoms.intern(name);
        let (symbol, scope) = self.create_scope(
            atom,
            TextSpan::synthetic(),
            SymbolKind::Function,
            ScopeExt::Function(FunctionInfo::native(binding)),
        );
        self.symbols[symbol].ty = TypeDescriptor::function(scope);
        let index = self.register_global_symbol(atom, symbol);
        self.globals.set(index, GlobalValue::NativeFunction(scope), false);
        index
    }

    /// Re-enter a function declared in the current scope.
    pub fn enter_func(&mut self, name: &str, span: TextSpan) -> Result<ScopeId, ResolveError> {
        let scope = self.child_scope(name, span)?;
        if self.scopes.resolve(scope)?.function().is_none() {
            return Err(ResolveError::CannotEnter {
                name: name.to_string(),
                span,
            });
        }
        self.current_scope = scope;
        Ok(scope)
    }

    /// Scope named `name` in the current scope's table.
    pub(crate) fn child_scope(&self, name: &str, span: TextSpan) -> Result<ScopeId, ResolveError> {
        self.atoms
            .get(name)
            .and_then(|atom| self.current().symbols.get(atom))
            .and_then(|symbol| self.symbols.get(symbol))
            .and_then(Symbol::scope)
            .ok_or_else(|| ResolveError::CannotEnter {
                name: name.to_string(),
                span,
            })
    }

    /// Leave the current scope.
    ///
    /// Function and method scopes get their frame size finalized. Leaving
    /// the current class moves the class cursor to the nearest enclosing
    /// class.
    pub fn leave_scope(&mut self) {
        let current = self.current_scope;
        let scope = &mut self.scopes[current];
        let count = scope.symbols.len() as u32;
        if let Some(func) = scope.function_mut() {
            func.locals_count = count.saturating_sub(func.args_count);
        }
        let parent = scope.parent;

        if self.current_class == Some(current) {
            self.current_class = self.enclosing_class(parent);
        }
        self.current_scope = parent.unwrap_or(self.global_scope);
    }

    /// Leave the current scope, recording where its source extent ends.
    pub fn leave_scope_at(&mut self, end: TextPos) {
        self.current_mut().end = end;
        self.leave_scope();
    }

    fn enclosing_class(&self, from: Option<ScopeId>) -> Option<ScopeId> {
        let mut cursor = from;
        let mut depth = 0;
        while let Some(id) = cursor {
            let scope = self.scopes.get(id)?;
            if scope.is_class() {
                return Some(id);
            }
            depth += 1;
            if depth > self.options.max_scope_depth {
                return None;
            }
            cursor = scope.parent;
        }
        None
    }

    /// Enter namespace `name`, creating it on first use.
    ///
    /// Returns `Ok(false)` if the name is already taken by something other
    /// than a namespace.
    pub fn enter_namespace(&mut self, name: &str, span: TextSpan) -> Result<bool, ResolveError> {
        if !self.current().holds_globals() {
            return Err(ResolveError::InvalidScope {
                operation: ScopeOperation::Namespace,
                name: name.to_string(),
                span,
            });
        }
        let atom = self.atoms.intern(name);
        if let Some(existing) = self.current().symbols.get(atom) {
            let symbol = &self.symbols[existing];
            let scope = match (symbol.kind, symbol.scope()) {
                (SymbolKind::Namespace, Some(scope)) => scope,
                _ => return Ok(false),
            };
            self.scopes.resolve(scope)?;
            self.current_scope = scope;
            return Ok(true);
        }
        let current = self.current_scope;
        let (symbol, scope) = self.create_scope(atom, span, SymbolKind::Namespace, ScopeExt::Namespace);
        self.scopes[current].symbols.insert(atom, symbol);
        self.current_scope = scope;
        debug!(namespace = name, "entered new namespace");
        Ok(true)
    }

    // ========================================================================
    // Temporaries
    // ========================================================================

    /// Take a scratch slot in the current scope, reusing the most recently
    /// released one.
    pub fn acquire_temp(&mut self) -> u32 {
        let scope = &mut self.scopes[self.current_scope];
        let (index, symbol) = match scope.temporaries.pop_free() {
            Some(entry) => entry,
            None => {
                let index = if scope.is_global() {
                    scope.temporaries.acquired_count()
                } else {
                    scope.symbols.len()
                } as u32;
                let name = self
                    .atoms
                    .intern(&format!("{}{}", self.options.temp_prefix, index));
                let mut temp = Symbol::new(name, TextSpan::synthetic(), SymbolKind::Temporary);
                temp.index = Some(index);
                let symbol = self.symbols.insert(temp);
                scope.symbols.insert(name, symbol);
                (index, symbol)
            }
        };
        scope.temporaries.mark_acquired(index, symbol);
        trace!(index, "acquired temporary");
        index
    }

    /// Return a scratch slot to the current scope's pool.
    ///
    /// # Panics
    ///
    /// Panics if `index` is not currently acquired in this scope.
    pub fn release_temp(&mut self, index: u32) {
        self.current_mut().temporaries.release(index);
        trace!(index, "released temporary");
    }

    /// Free scratch slots of the global scope.
    pub fn global_temporaries(&self) -> usize {
        self.scopes[self.global_scope].temporaries.free_count()
    }

    // ========================================================================
    // Closures
    // ========================================================================

    /// Bind `name` in the current scope to the next capture slot, copied
    /// from `source` when the closure is created.
    pub fn register_closed_symbol(&mut self, name: &str, span: TextSpan, source: StorageRef) -> u32 {
        let atom = self.atoms.intern(name);
        self.register_closed_symbol_in(self.current_scope, atom, span, source)
    }

    pub(crate) fn register_closed_symbol_in(
        &mut self,
        scope: ScopeId,
        name: Atom,
        span: TextSpan,
        source: StorageRef,
    ) -> u32 {
        let target = &mut self.scopes[scope];
        let index = target.closed_vars.len() as u32;
        target.closed_vars.push(source);
        let mut symbol = Symbol::new(name, span, SymbolKind::ClosedVar);
        symbol.index = Some(index);
        let symbol = self.symbols.insert(symbol);
        self.scopes[scope].symbols.insert(name, symbol);
        debug!(name = %self.atoms.display(name), index, source = ?source, "captured variable");
        index
    }

    /// Record that the function at `global_index` is held in local slot
    /// `local_index` of the current scope. Repeated calls for the same
    /// function keep the first mapping.
    pub fn map_closed_func(&mut self, global_index: u32, local_index: u32) {
        let scope = self.current_mut();
        if scope.closed_func_storage(global_index).is_none() {
            scope.closed_funcs.push(ClosedFunc {
                source: global_index,
                destination: local_index,
            });
        }
    }

    pub fn closed_func_storage(&self, global_index: u32) -> Option<u32> {
        self.current().closed_func_storage(global_index)
    }

    /// Mark the current function as referring to itself.
    pub fn mark_self_closed(&mut self) {
        self.current_mut().self_closed = true;
    }

    pub fn is_closure(&self, scope: ScopeId) -> Result<bool, ExpiredHandle> {
        Ok(self.scopes.resolve(scope)?.is_closure())
    }

    /// Most recent live closure literal named `name`, searching outward from
    /// the current scope. Destroyed literals are skipped.
    pub fn literal(&self, name: &str) -> Option<ScopeId> {
        let atom = self.atoms.get(name)?;
        let mut cursor = Some(self.current_scope);
        while let Some(id) = cursor {
            let scope = self.scopes.get(id)?;
            if let Some(list) = scope.literals.get(&atom) {
                if let Some(&live) = list.iter().rev().find(|&&l| self.scopes.contains(l)) {
                    return Some(live);
                }
            }
            cursor = scope.parent;
        }
        None
    }

    // ========================================================================
    // Control blocks
    // ========================================================================

    pub fn enter_block(&mut self, label: Option<&str>) -> BlockId {
        let label = label.map(|l| self.atoms.intern(l));
        self.current_mut().blocks.enter(label)
    }

    /// # Panics
    ///
    /// Panics if no block is open, or if the block is left inside a try
    /// region.
    pub fn leave_block(&mut self) -> BlockId {
        self.current_mut().blocks.leave()
    }

    /// Innermost open block labeled `label`, or the current block.
    pub fn find_block(&self, label: Option<&str>) -> Option<BlockId> {
        let blocks = &self.current().blocks;
        match label {
            None => blocks.current(),
            Some(text) => blocks.find(Some(self.atoms.get(text)?)),
        }
    }

    /// Like [`find_block`](Self::find_block), reporting a missing label.
    pub fn require_block(&self, label: &str, span: TextSpan) -> Result<BlockId, ResolveError> {
        self.find_block(Some(label))
            .ok_or_else(|| ResolveError::UndefinedLabel {
                name: label.to_string(),
                span,
            })
    }

    pub fn block(&self, id: BlockId) -> Option<&ControlBlock> {
        self.current().blocks.get(id)
    }

    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut ControlBlock> {
        self.current_mut().blocks.get_mut(id)
    }

    pub fn enter_try(&mut self) {
        self.current_mut().enter_try();
    }

    /// # Panics
    ///
    /// Panics if no try region is open in the current scope.
    pub fn leave_try(&mut self) {
        self.current_mut().leave_try();
    }

    // ========================================================================
    // Attributes
    // ========================================================================

    /// Declare an attribute in the current scope. Attributes take a global
    /// slot but are looked up in the scope's attribute table only.
    pub fn register_attr(&mut self, name: &str, span: TextSpan) -> u32 {
        let symbol = self.new_symbol(name, span, SymbolKind::Attribute);
        let index = self.globals.allocate();
        self.symbols[symbol].index = Some(index);
        self.globals.bind(index, symbol);
        let atom = self.symbols[symbol].name;
        self.current_mut().attrs.insert(atom, symbol);
        debug!(attribute = name, index, "registered attribute");
        index
    }
}

impl Default for ResolutionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResolutionContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionContext")
            .field("symbols", &self.symbols.len())
            .field("scopes", &self.scopes.len())
            .field("globals", &self.globals.len())
            .field("current_scope", &self.current_scope)
            .field("current_class", &self.current_class)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span() -> TextSpan {
        TextSpan::synthetic()
    }

    #[test]
    fn test_standard_globals() {
        let ctx = ResolutionContext::new();
        assert_eq!((ctx.nil_index(), ctx.true_index(), ctx.false_index()), (0, 1, 2));
        assert_eq!(ctx.globals().value(1), Some(&GlobalValue::Bool(true)));
        assert!(ctx.globals().slot(2).unwrap().constant);
        assert_eq!(ctx.std_end(), 4);
        let root = ctx.root_class().unwrap();
        assert_eq!(ctx.scope_name(root), "Object");
        assert_eq!(ctx.current_scope(), ctx.global_scope());
        assert_eq!(ctx.current_class(), None);
    }

    #[test]
    fn test_full_names() {
        let mut ctx = ResolutionContext::new();
        ctx.enter_namespace("gfx", span()).unwrap();
        ctx.enter_namespace("shapes", span()).unwrap();
        let class = ctx.register_class("Circle", span());
        assert_eq!(ctx.scope_path(class), "gfx::shapes::Circle");
        assert_eq!(ctx.full_name(class, "area"), "gfx::shapes::Circle.area");
        assert_eq!(ctx.full_name(ctx.global_scope(), "x"), "x");
    }

    #[test]
    fn test_namespace_member_bound_twice() {
        let mut ctx = ResolutionContext::new();
        ctx.enter_namespace("ns", span()).unwrap();
        let ns = ctx.current_scope();
        let index = match ctx.register_var("value", span()) {
            StorageRef::Global(index) => index,
            other => panic!("expected a global, got {:?}", other),
        };
        ctx.leave_scope();
        let short = ctx.intern("value");
        let full = ctx.intern("ns::value");
        let in_ns = ctx.scope(ns).unwrap().symbols.get(short).unwrap();
        let in_global = ctx.scope(ctx.global_scope()).unwrap().symbols.get(full).unwrap();
        assert_eq!(in_ns, in_global);
        assert_eq!(ctx.symbol(in_ns).unwrap().index, Some(index));
        assert!(ctx.scope(ctx.global_scope()).unwrap().symbols.get(short).is_none());
    }

    #[test]
    fn test_namespace_rejected_inside_function() {
        let mut ctx = ResolutionContext::new();
        ctx.register_func("f", span(), 0);
        let err = ctx.enter_namespace("ns", span()).unwrap_err();
        assert!(matches!(err, ResolveError::InvalidScope { operation: ScopeOperation::Namespace, .. }));
    }

    #[test]
    fn test_enter_namespace_name_taken() {
        let mut ctx = ResolutionContext::new();
        ctx.register_var("taken", span());
        assert_eq!(ctx.enter_namespace("taken", span()), Ok(false));
        assert_eq!(ctx.current_scope(), ctx.global_scope());
    }

    #[test]
    fn test_shadowing_replace_and_restore() {
        let mut ctx = ResolutionContext::new();
        ctx.register_func("f", span(), 0);
        ctx.register_local_var("x", span());
        let x = ctx.intern("x");
        let outer = ctx.current().symbols.get(x).unwrap();

        let inner = ctx.new_symbol("x", span(), SymbolKind::LocalVar);
        ctx.replace_local_symbol(inner);
        assert_eq!(ctx.current().symbols.get(x), Some(inner));
        assert_eq!(ctx.symbol(inner).unwrap().replaced, Some(outer));

        ctx.restore_local_symbol(inner);
        assert_eq!(ctx.current().symbols.get(x), Some(outer));
        assert_eq!(ctx.current().temp_symbols, vec![inner]);
    }

    #[test]
    fn test_restore_without_outer_binding_vacates() {
        let mut ctx = ResolutionContext::new();
        ctx.register_func("f", span(), 0);
        let y = ctx.new_symbol("y", span(), SymbolKind::LocalVar);
        ctx.replace_local_symbol(y);
        ctx.restore_local_symbol(y);
        let atom = ctx.intern("y");
        assert_eq!(ctx.current().symbols.get(atom), None);
        assert_eq!(ctx.current().symbols.len(), 1);
    }
}
