//! Program image export/import tests.

use kestrel_core::TextSpan;
use kestrel_options::ResolverOptions;
use kestrel_resolver::{
    GlobalValue, ImageError, NativeBinding, ResolutionContext, ResolveError, SpecialMethod, StorageRef,
};

fn synthetic() -> TextSpan {
    TextSpan::synthetic()
}

/// Helper: a context exercising most of the resolver.
fn sample_program() -> ResolutionContext {
    let mut ctx = ResolutionContext::new();
    ctx.register_native_func("print", NativeBinding(1));
    ctx.register_native_class("File", Some(NativeBinding(2)), None);
    ctx.register_native_method("read", NativeBinding(3)).unwrap();
    ctx.leave_scope();

    ctx.enter_namespace("zoo", synthetic()).unwrap();
    ctx.register_class("Animal", TextSpan::new(0, 6));
    ctx.derive_members(None).unwrap();
    ctx.register_member("name", synthetic()).unwrap();
    ctx.register_method("speak", TextSpan::new(20, 5), 0).unwrap();
    ctx.leave_scope_at(60);
    ctx.leave_scope_at(80);

    ctx.register_class("Dog", TextSpan::new(90, 3));
    let parent = ctx.name("Animal", synthetic());
    ctx.derive_members(Some(&parent)).unwrap();
    ctx.register_method("speak", TextSpan::new(110, 5), 1).unwrap();
    ctx.register_arg("loud", synthetic());
    ctx.leave_scope_at(150);
    ctx.register_method("add", synthetic(), 1).unwrap();
    ctx.leave_scope();
    ctx.leave_scope_at(170);
    ctx.leave_scope();

    ctx.register_func("main", TextSpan::new(200, 4), 0);
    ctx.register_local_var("counter", synthetic());
    ctx.int_const("42", synthetic()).unwrap();
    ctx.double_const("2.5", synthetic()).unwrap();
    ctx.string_const("woof");
    ctx.register_array();
    ctx.enter_block(Some("outer"));
    ctx.acquire_temp();
    ctx.register_literal("tick", TextSpan::new(220, 4), 0, &["inline"]);
    let counter = ctx.name("counter", synthetic());
    ctx.resolve_storage(&counter).unwrap();
    ctx.leave_scope_at(260);
    ctx.leave_block();
    ctx.leave_scope_at(300);
    ctx.register_attr("deprecated", synthetic());
    ctx
}

// ============================================================================
// Round trip
// ============================================================================

#[test]
fn test_round_trip_is_stable() {
    let ctx = sample_program();
    let bytes = ctx.export().unwrap();
    let imported = ResolutionContext::import(&bytes).unwrap();
    assert_eq!(imported.export().unwrap(), bytes);
}

#[test]
fn test_round_trip_preserves_globals() {
    let ctx = sample_program();
    let imported = ResolutionContext::import(&ctx.export().unwrap()).unwrap();
    assert_eq!(imported.globals().len(), ctx.globals().len());
    for (index, slot, _) in ctx.globals().iter() {
        assert_eq!(imported.globals().slot(index), Some(slot), "global {}", index);
    }
    assert_eq!(imported.std_end(), ctx.std_end());
    assert_eq!(imported.root_class(), ctx.root_class());
}

#[test]
fn test_imported_names_resolve() {
    let ctx = sample_program();
    let mut imported = ResolutionContext::import(&ctx.export().unwrap()).unwrap();

    let dog = imported.global_symbol("zoo::Dog").unwrap();
    let dog_scope = imported.symbol(dog).unwrap().scope().unwrap();
    let info = imported.scope(dog_scope).unwrap().class().unwrap();
    assert_eq!(info.methods_table.len(), 3);
    assert!(info.special_methods.get(SpecialMethod::Add).is_some());
    assert_eq!(imported.scope_name(info.methods_table[1]), "speak");

    let speak = imported.global_symbol("zoo::Dog.speak").unwrap();
    let speak_scope = imported.symbol(speak).unwrap().scope().unwrap();
    assert_eq!(imported.scope(speak_scope).unwrap().method().unwrap().over_index, Some(1));

    // The imported context accepts further registrations.
    assert_eq!(imported.current_scope(), imported.global_scope());
    let next = imported.register_var("later", synthetic());
    assert_eq!(next, StorageRef::Global(ctx.globals().len() as u32));
    let name = imported.name("zoo::Animal", synthetic());
    assert!(imported.resolve(&name).is_ok());
}

#[test]
fn test_closure_layout_survives() {
    let ctx = sample_program();
    let imported = ResolutionContext::import(&ctx.export().unwrap()).unwrap();
    let tick = imported.global_symbol("main.tick").unwrap();
    let tick = imported.symbol(tick).unwrap().scope().unwrap();
    let scope = imported.scope(tick).unwrap();
    assert_eq!(scope.closed_vars, vec![StorageRef::Local(0)]);
    assert_eq!(imported.text(scope.literal().unwrap().markers[0]), "inline");
    assert!(imported.is_closure(tick).unwrap());
}

#[test]
fn test_expired_handles_stay_expired() {
    let mut ctx = sample_program();
    let main = ctx.global_symbol("main").unwrap();
    let main_scope = ctx.symbol(main).unwrap().scope().unwrap();
    let index = ctx.symbol(main).unwrap().index.unwrap();
    ctx.free_global(index);

    let imported = ResolutionContext::import(&ctx.export().unwrap()).unwrap();
    assert!(imported.scope(main_scope).is_err());
    assert!(imported.globals().is_free(index));
}

#[test]
fn test_options_travel_with_image() {
    let options = ResolverOptions {
        root_class_name: "Base".to_string(),
        temp_prefix: "t$".to_string(),
        ..ResolverOptions::default()
    };
    let ctx = ResolutionContext::with_options(options.clone());
    let imported = ResolutionContext::import(&ctx.export().unwrap()).unwrap();
    assert_eq!(imported.options(), &options);
    assert!(imported.global_symbol("Base").is_some());
}

#[test]
fn test_export_to_writer_matches_export() {
    let ctx = sample_program();
    let mut buffer = Vec::new();
    ctx.export_to(&mut buffer).unwrap();
    assert_eq!(buffer, ctx.export().unwrap());
    let imported = ResolutionContext::import_from(buffer.as_slice()).unwrap();
    assert!(matches!(
        imported.globals().value(imported.true_index()),
        Some(GlobalValue::Bool(true))
    ));
}

#[test]
fn test_double_constants_survive_round_trip() {
    let mut ctx = ResolutionContext::new();
    let half = ctx.double_const("0.5", synthetic()).unwrap();
    let huge = ctx.double_const("1e300", synthetic()).unwrap();
    let imported = ResolutionContext::import(&ctx.export().unwrap()).unwrap();
    assert_eq!(imported.globals().value(half), Some(&GlobalValue::Double(0.5)));
    assert_eq!(imported.globals().value(huge), Some(&GlobalValue::Double(1e300)));
}

#[test]
fn test_overflowing_double_never_reaches_image() {
    let mut ctx = ResolutionContext::new();
    let err = ctx.double_const("1e400", synthetic()).unwrap_err();
    assert!(matches!(err, ResolveError::InvalidLiteral { .. }));
    assert!(ctx.double_const("-1e400", synthetic()).is_err());
    assert!(ctx.pools().doubles.is_empty());
    assert!(ResolutionContext::import(&ctx.export().unwrap()).is_ok());
}

// ============================================================================
// Malformed input
// ============================================================================

#[test]
fn test_garbage_rejected() {
    assert!(matches!(ResolutionContext::import(b"not json"), Err(ImageError::Json(_))));
}

#[test]
fn test_dangling_global_owner_rejected() {
    let ctx = sample_program();
    let mut value: serde_json::Value = serde_json::from_slice(&ctx.export().unwrap()).unwrap();
    let slots = value["symbols"]["slots"].as_array().unwrap().len();
    // Point the owner of a user global past the end of the symbol arena.
    let owner = ctx.std_end() as usize;
    value["globals"]["info"][owner] = serde_json::json!([slots + 5, 0]);
    let bytes = serde_json::to_vec(&value).unwrap();
    assert!(matches!(ResolutionContext::import(&bytes), Err(ImageError::Dangling(_))));
}
