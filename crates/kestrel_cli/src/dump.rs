//! Human-readable rendering of a program image.

use std::fmt::{self, Write};

use kestrel_resolver::{GlobalValue, Implementation, ResolutionContext, Scope, StorageRef};

/// Which parts of the image to print.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sections {
    pub globals: bool,
    pub classes: bool,
    pub functions: bool,
}

impl Sections {
    pub const ALL: Sections = Sections {
        globals: true,
        classes: true,
        functions: true,
    };
}

pub fn render(ctx: &ResolutionContext, sections: Sections, out: &mut impl Write) -> fmt::Result {
    writeln!(
        out,
        "image: {} globals ({} free), {} scopes, {} symbols",
        ctx.globals().len(),
        ctx.globals().free_count(),
        ctx.scopes().len(),
        ctx.symbols().len()
    )?;
    if sections.globals {
        render_globals(ctx, out)?;
    }
    if sections.classes {
        render_classes(ctx, out)?;
    }
    if sections.functions {
        render_functions(ctx, out)?;
    }
    Ok(())
}

fn render_globals(ctx: &ResolutionContext, out: &mut impl Write) -> fmt::Result {
    writeln!(out, "\nglobals:")?;
    for (index, slot, symbol) in ctx.globals().iter() {
        let name = ctx.symbol(symbol).map_or("<expired>", |s| ctx.text(s.name));
        let constant = if slot.constant { " const" } else { "" };
        writeln!(
            out,
            "  {:>5}  {:<14} {}{}",
            index,
            slot.value.kind_name(),
            describe_value(ctx, &slot.value, name),
            constant
        )?;
    }
    Ok(())
}

fn describe_value(ctx: &ResolutionContext, value: &GlobalValue, name: &str) -> String {
    match value {
        GlobalValue::Bool(b) => b.to_string(),
        GlobalValue::Int(i) => i.to_string(),
        GlobalValue::Double(d) => d.to_string(),
        GlobalValue::Str(atom) => format!("{:?}", ctx.text(*atom)),
        other => match other.scope() {
            Some(scope) if ctx.scope(scope).is_ok() => ctx.scope_path(scope),
            Some(_) => format!("{} <freed>", name),
            None => name.to_string(),
        },
    }
}

fn render_classes(ctx: &ResolutionContext, out: &mut impl Write) -> fmt::Result {
    writeln!(out, "\nclasses:")?;
    for (id, scope) in ctx.scopes().iter() {
        let Some(class) = scope.class() else { continue };
        let parent = class
            .parent_class
            .filter(|&p| ctx.scope(p).is_ok())
            .map(|p| ctx.scope_path(p));
        write!(out, "  {}", ctx.scope_path(id))?;
        if let Some(parent) = parent {
            write!(out, " : {}", parent)?;
        }
        if class.native {
            write!(out, " [native]")?;
        }
        writeln!(out, " ({} members)", class.members_count)?;

        for (slot, &method) in class.methods_table.iter().enumerate() {
            let owner = ctx
                .scope(method)
                .ok()
                .and_then(Scope::method)
                .map(|m| m.owning_class);
            match owner {
                Some(owner) if owner != id => writeln!(
                    out,
                    "    [{}] {} (from {})",
                    slot,
                    ctx.scope_name(method),
                    ctx.scope_path(owner)
                )?,
                Some(_) => writeln!(out, "    [{}] {}", slot, ctx.scope_name(method))?,
                None => writeln!(out, "    [{}] <freed>", slot)?,
            }
        }
        for (special, global) in class.special_methods.iter() {
            writeln!(out, "    on {} -> global {}", special.name(), global)?;
        }
    }
    Ok(())
}

fn render_functions(ctx: &ResolutionContext, out: &mut impl Write) -> fmt::Result {
    writeln!(out, "\nfunctions:")?;
    for (id, scope) in ctx.scopes().iter() {
        let Some(func) = scope.function() else { continue };
        let origin = match func.implementation {
            Implementation::Native(binding) => format!("native #{}", binding.0),
            Implementation::Script { .. } => "script".to_string(),
        };
        writeln!(
            out,
            "  {} ({}): {} args, {} locals",
            ctx.scope_path(id),
            origin,
            func.args_count,
            func.locals_count
        )?;
        if !scope.closed_vars.is_empty() {
            let captures: Vec<String> = scope.closed_vars.iter().map(describe_storage).collect();
            writeln!(out, "    captures {}", captures.join(", "))?;
        }
        if let Some(method) = scope.method() {
            if let Some(over) = method.over_index {
                writeln!(out, "    overrides slot {}", over)?;
            }
        }
    }
    Ok(())
}

fn describe_storage(storage: &StorageRef) -> String {
    match storage {
        StorageRef::Global(i) => format!("global {}", i),
        StorageRef::Local(i) => format!("local {}", i),
        StorageRef::Closed(i) => format!("closed {}", i),
        StorageRef::Member(i) => format!("member {}", i),
    }
}
