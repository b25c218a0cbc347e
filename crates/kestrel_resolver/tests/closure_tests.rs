//! Closures, temporaries and control block tests.

use kestrel_core::TextSpan;
use kestrel_resolver::{PatchKind, PatchSite, ResolutionContext, ResolveError, StorageRef, SymbolKind};

fn synthetic() -> TextSpan {
    TextSpan::synthetic()
}

fn resolve(ctx: &mut ResolutionContext, name: &str) -> Result<StorageRef, ResolveError> {
    let name = ctx.name(name, synthetic());
    ctx.resolve_storage(&name)
}

// ============================================================================
// Temporaries
// ============================================================================

#[test]
fn test_temporary_reuse() {
    let mut ctx = ResolutionContext::new();
    ctx.register_func("f", synthetic(), 1);
    ctx.register_arg("a", synthetic());
    let t = ctx.acquire_temp();
    assert_eq!(t, 1);
    ctx.release_temp(t);
    assert_eq!(ctx.acquire_temp(), t);
    let u = ctx.acquire_temp();
    assert_eq!(u, 2);
}

#[test]
fn test_temporaries_count_toward_frame() {
    let mut ctx = ResolutionContext::new();
    let f = ctx.register_func("f", synthetic(), 0);
    let t0 = ctx.acquire_temp();
    let t1 = ctx.acquire_temp();
    ctx.release_temp(t0);
    ctx.release_temp(t1);
    ctx.leave_scope();
    assert_eq!(ctx.scope(f).unwrap().function().unwrap().locals_count, 2);

    let name = ctx.intern("temp-1");
    let symbol = ctx.scope(f).unwrap().symbols.get(name).unwrap();
    assert_eq!(ctx.symbol(symbol).unwrap().kind, SymbolKind::Temporary);
}

#[test]
fn test_global_temporaries_numbered_by_acquired_count() {
    let mut ctx = ResolutionContext::new();
    let a = ctx.acquire_temp();
    let b = ctx.acquire_temp();
    assert_eq!((a, b), (0, 1));
    ctx.release_temp(a);
    assert_eq!(ctx.global_temporaries(), 1);
    assert_eq!(ctx.acquire_temp(), a);
    assert_eq!(ctx.global_temporaries(), 0);
}

#[test]
#[should_panic(expected = "not acquired")]
fn test_double_release_panics() {
    let mut ctx = ResolutionContext::new();
    ctx.register_func("f", synthetic(), 0);
    let t = ctx.acquire_temp();
    ctx.release_temp(t);
    ctx.release_temp(t);
}

// ============================================================================
// Captures
// ============================================================================

#[test]
fn test_capture_through_intermediate_function() {
    let mut ctx = ResolutionContext::new();
    let outer = ctx.register_func("outer", synthetic(), 0);
    ctx.register_local_var("count", synthetic());
    let middle = ctx.register_literal("middle", synthetic(), 0, &[]);
    let inner = ctx.register_literal("inner", synthetic(), 0, &[]);

    assert_eq!(resolve(&mut ctx, "count"), Ok(StorageRef::Closed(0)));
    assert_eq!(ctx.scope(middle).unwrap().closed_vars, vec![StorageRef::Local(0)]);
    assert_eq!(ctx.scope(inner).unwrap().closed_vars, vec![StorageRef::Closed(0)]);
    assert!(ctx.is_closure(middle).unwrap());
    assert!(ctx.is_closure(inner).unwrap());
    assert!(!ctx.is_closure(outer).unwrap());

    let count = ctx.intern("count");
    let original = ctx.scope(outer).unwrap().symbols.get(count).unwrap();
    assert!(ctx.symbol(original).unwrap().closed);

    // A second reference reuses the capture slot.
    assert_eq!(resolve(&mut ctx, "count"), Ok(StorageRef::Closed(0)));
    assert_eq!(ctx.scope(inner).unwrap().closed_vars.len(), 1);
}

#[test]
fn test_capture_sibling_reuses_intermediate_slot() {
    let mut ctx = ResolutionContext::new();
    ctx.register_func("outer", synthetic(), 1);
    ctx.register_arg("x", synthetic());
    let middle = ctx.register_literal("middle", synthetic(), 0, &[]);
    ctx.register_literal("first", synthetic(), 0, &[]);
    resolve(&mut ctx, "x").unwrap();
    ctx.leave_scope();
    ctx.register_literal("second", synthetic(), 0, &[]);
    resolve(&mut ctx, "x").unwrap();
    ctx.leave_scope();
    assert_eq!(ctx.scope(middle).unwrap().closed_vars.len(), 1);
}

#[test]
fn test_cannot_capture_through_class() {
    let mut ctx = ResolutionContext::new();
    ctx.register_func("factory", synthetic(), 0);
    ctx.register_local_var("secret", synthetic());
    ctx.register_class("Local", synthetic());
    ctx.derive_members(None).unwrap();
    ctx.register_method("reveal", synthetic(), 0).unwrap();
    let err = resolve(&mut ctx, "secret").unwrap_err();
    assert!(matches!(err, ResolveError::CannotCapture { .. }));
    assert_eq!(err.to_diagnostic().code, 2005);
}

#[test]
fn test_explicit_closed_symbols_and_funcs() {
    let mut ctx = ResolutionContext::new();
    let helper = ctx.register_func("helper", synthetic(), 0);
    ctx.leave_scope();
    let helper_index = {
        let symbol = ctx.scope(helper).unwrap().symbol;
        ctx.symbol(symbol).unwrap().index.unwrap()
    };

    let f = ctx.register_func("f", synthetic(), 0);
    assert_eq!(ctx.register_closed_symbol("env", synthetic(), StorageRef::Global(7)), 0);
    assert_eq!(ctx.register_closed_symbol("env2", synthetic(), StorageRef::Global(8)), 1);
    ctx.map_closed_func(helper_index, 3);
    ctx.map_closed_func(helper_index, 5);
    assert_eq!(ctx.closed_func_storage(helper_index), Some(3));
    assert_eq!(ctx.closed_func_storage(helper_index + 100), None);
    assert_eq!(resolve(&mut ctx, "env2"), Ok(StorageRef::Closed(1)));
    ctx.leave_scope();
    assert!(ctx.is_closure(f).unwrap());
}

#[test]
fn test_self_closed_function() {
    let mut ctx = ResolutionContext::new();
    let f = ctx.register_func("fact", synthetic(), 1);
    assert!(!ctx.is_closure(f).unwrap());
    ctx.mark_self_closed();
    ctx.leave_scope();
    assert!(ctx.is_closure(f).unwrap());
}

#[test]
fn test_literal_registry() {
    let mut ctx = ResolutionContext::new();
    ctx.register_func("host", synthetic(), 0);
    let first = ctx.register_literal("cb", synthetic(), 1, &["async"]);
    ctx.leave_scope();
    let second = ctx.register_literal("cb", synthetic(), 1, &[]);
    ctx.leave_scope();
    assert_eq!(ctx.literal("cb"), Some(second));
    let markers = &ctx.scope(first).unwrap().literal().unwrap().markers;
    assert_eq!(ctx.text(markers[0]), "async");

    let index = {
        let symbol = ctx.scope(second).unwrap().symbol;
        ctx.symbol(symbol).unwrap().index.unwrap()
    };
    ctx.free_global(index);
    assert_eq!(ctx.literal("cb"), Some(first));
    assert_eq!(ctx.literal("missing"), None);
}

// ============================================================================
// Control blocks
// ============================================================================

#[test]
fn test_labeled_blocks() {
    let mut ctx = ResolutionContext::new();
    ctx.register_func("loop", synthetic(), 0);
    let outer = ctx.enter_block(Some("outer"));
    let inner = ctx.enter_block(None);
    assert_eq!(ctx.find_block(None), Some(inner));
    assert_eq!(ctx.find_block(Some("outer")), Some(outer));
    assert_eq!(ctx.require_block("outer", synthetic()), Ok(outer));
    assert!(matches!(
        ctx.require_block("nowhere", synthetic()),
        Err(ResolveError::UndefinedLabel { .. })
    ));

    ctx.block_mut(outer).unwrap().add_patch(PatchKind::Break, PatchSite(14));
    assert_eq!(ctx.leave_block(), inner);
    assert_eq!(ctx.leave_block(), outer);
    assert_eq!(ctx.block(outer).unwrap().patches(PatchKind::Break), &[PatchSite(14)]);
    assert_eq!(ctx.block(outer).unwrap().nested, vec![inner]);
    assert_eq!(ctx.find_block(None), None);
}

#[test]
fn test_try_regions_balance() {
    let mut ctx = ResolutionContext::new();
    let f = ctx.register_func("f", synthetic(), 0);
    ctx.enter_block(None);
    ctx.enter_try();
    assert_eq!(ctx.scope(f).unwrap().tries_entered, 1);
    ctx.leave_try();
    ctx.leave_block();
    assert_eq!(ctx.scope(f).unwrap().tries_entered, 0);
}

#[test]
#[should_panic(expected = "try region")]
fn test_leave_block_inside_try_panics() {
    let mut ctx = ResolutionContext::new();
    ctx.register_func("f", synthetic(), 0);
    ctx.enter_block(None);
    ctx.enter_try();
    ctx.leave_block();
}

#[test]
#[should_panic(expected = "never entered")]
fn test_unbalanced_leave_try_panics() {
    let mut ctx = ResolutionContext::new();
    ctx.register_func("f", synthetic(), 0);
    ctx.enter_block(None);
    ctx.leave_try();
}
