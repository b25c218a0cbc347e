//! Program image export and import.
//!
//! An image is the complete state of a finished resolution: names, symbols,
//! scopes, the global table and the literal pools, written as JSON. Handles
//! are written as (slot, generation) pairs and arenas keep their vacant
//! slots, so every handle in the image means the same thing after import.
//!
//! Import validates the result before handing it out. Strong references
//! (a scope's parent and children, symbol table entries, global slot owners)
//! must resolve. Weak references (a class's parent, literal registries,
//! method tables after a slot was freed) may be expired.

use std::io::{Read, Write};

use kestrel_core::{Arena, Atom, AtomTable};
use kestrel_options::ResolverOptions;
use serde::{Deserialize, Serialize};
use tracing::{debug, span, Level};

use crate::context::{ConstantPools, ResolutionContext};
use crate::error::ImageError;
use crate::globals::{GlobalTable, GlobalValue};
use crate::scope::{Scope, ScopeId};
use crate::symbol::Symbol;

pub const IMAGE_VERSION: u32 = 1;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageRef<'a> {
    version: u32,
    atoms: Vec<String>,
    options: &'a ResolverOptions,
    symbols: &'a Arena<Symbol>,
    scopes: &'a Arena<Scope>,
    globals: &'a GlobalTable,
    pools: &'a ConstantPools,
    global_scope: ScopeId,
    root_class: Option<ScopeId>,
    std_end: u32,
    nil_index: u32,
    true_index: u32,
    false_index: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProgramImage {
    version: u32,
    atoms: Vec<String>,
    options: ResolverOptions,
    symbols: Arena<Symbol>,
    scopes: Arena<Scope>,
    globals: GlobalTable,
    pools: ConstantPools,
    global_scope: ScopeId,
    root_class: Option<ScopeId>,
    std_end: u32,
    nil_index: u32,
    true_index: u32,
    false_index: u32,
}

impl ResolutionContext {
    fn image(&self) -> ImageRef<'_> {
        ImageRef {
            version: IMAGE_VERSION,
            atoms: self.atoms.strings(),
            options: &self.options,
            symbols: &self.symbols,
            scopes: &self.scopes,
            globals: &self.globals,
            pools: &self.pools,
            global_scope: self.global_scope,
            root_class: self.root_class,
            std_end: self.std_end,
            nil_index: self.nil_index,
            true_index: self.true_index,
            false_index: self.false_index,
        }
    }

    pub fn export(&self) -> Result<Vec<u8>, ImageError> {
        let _span = span!(Level::DEBUG, "export").entered();
        let bytes = serde_json::to_vec(&self.image())?;
        debug!(bytes = bytes.len(), scopes = self.scopes.len(), "exported program image");
        Ok(bytes)
    }

    pub fn export_to<W: Write>(&self, writer: W) -> Result<(), ImageError> {
        serde_json::to_writer(writer, &self.image())?;
        Ok(())
    }

    pub fn import(bytes: &[u8]) -> Result<Self, ImageError> {
        let _span = span!(Level::DEBUG, "import").entered();
        let image: ProgramImage = serde_json::from_slice(bytes)?;
        Self::from_image(image)
    }

    pub fn import_from<R: Read>(reader: R) -> Result<Self, ImageError> {
        let image: ProgramImage = serde_json::from_reader(reader)?;
        Self::from_image(image)
    }

    fn from_image(image: ProgramImage) -> Result<Self, ImageError> {
        if image.version != IMAGE_VERSION {
            return Err(ImageError::Version {
                found: image.version,
                expected: IMAGE_VERSION,
            });
        }
        let atoms = AtomTable::from_strings(&image.atoms).ok_or(ImageError::Atoms)?;
        let ctx = Self {
            atoms,
            options: image.options,
            symbols: image.symbols,
            scopes: image.scopes,
            globals: image.globals,
            pools: image.pools,
            global_scope: image.global_scope,
            current_scope: image.global_scope,
            current_class: None,
            root_class: image.root_class,
            std_end: image.std_end,
            nil_index: image.nil_index,
            true_index: image.true_index,
            false_index: image.false_index,
        };
        ctx.validate()?;
        debug!(scopes = ctx.scopes.len(), symbols = ctx.symbols.len(), "imported program image");
        Ok(ctx)
    }

    fn validate(&self) -> Result<(), ImageError> {
        let dangling = |what: String| Err(ImageError::Dangling(what));
        if !self.symbols.is_consistent() || !self.scopes.is_consistent() {
            return dangling("arena bookkeeping".to_string());
        }
        if !self.globals.is_well_formed() {
            return dangling("global table".to_string());
        }
        match self.scopes.get(self.global_scope) {
            Some(scope) if scope.is_global() => {}
            _ => return dangling("global scope".to_string()),
        }
        if let Some(root) = self.root_class {
            if self.scopes.get(root).and_then(Scope::class).is_none() {
                return dangling("root class".to_string());
            }
        }
        let globals_len = self.globals.len() as u32;
        if [self.std_end, self.nil_index + 1, self.true_index + 1, self.false_index + 1]
            .iter()
            .any(|&i| i > globals_len)
        {
            return dangling("standard global index".to_string());
        }

        for (id, symbol) in self.symbols.iter() {
            self.check_atom(symbol.name, || format!("name of symbol {:?}", id))?;
        }

        for (id, scope) in self.scopes.iter() {
            let here = |what: &str| format!("{} of scope {:?}", what, id);
            match self.symbols.get(scope.symbol) {
                Some(symbol) if symbol.scope() == Some(id) => {}
                _ => return dangling(here("owning symbol")),
            }
            if let Some(parent) = scope.parent {
                if !self.scopes.contains(parent) {
                    return dangling(here("parent"));
                }
            }
            if !scope.children.iter().all(|&c| self.scopes.contains(c)) {
                return dangling(here("child"));
            }
            for (name, symbol) in scope.symbols.iter().chain(scope.attrs.iter()) {
                self.check_atom(name, || here("table key"))?;
                if !self.symbols.contains(symbol) {
                    return dangling(here("table entry"));
                }
            }
            let owned = scope
                .locals
                .iter()
                .chain(&scope.temp_symbols)
                .copied()
                .chain(scope.temporaries.symbols());
            for symbol in owned {
                if !self.symbols.contains(symbol) {
                    return dangling(here("local"));
                }
            }
            if !scope.blocks.is_well_formed() {
                return dangling(here("block tree"));
            }
            for (_, block) in scope.blocks.iter() {
                if let Some(label) = block.label {
                    self.check_atom(label, || here("block label"))?;
                }
            }
            if let Some(literal) = scope.literal() {
                for &marker in &literal.markers {
                    self.check_atom(marker, || here("literal marker"))?;
                }
            }
            if let Some(method) = scope.method() {
                let table_len = self
                    .scopes
                    .get(method.owning_class)
                    .and_then(Scope::class)
                    .map(|class| class.methods_table.len() as u32);
                if let (Some(over), Some(len)) = (method.over_index, table_len) {
                    if over >= len {
                        return dangling(here("override index"));
                    }
                }
            }
        }

        for (index, slot, symbol) in self.globals.iter() {
            if !self.symbols.contains(symbol) {
                return dangling(format!("owner of global {}", index));
            }
            if let GlobalValue::Str(atom) = slot.value {
                self.check_atom(atom, || format!("string global {}", index))?;
            }
        }
        let pools = [&self.pools.strings, &self.pools.ints, &self.pools.doubles];
        for pool in pools {
            for (&text, &index) in pool.iter() {
                self.check_atom(text, || format!("pooled constant {}", index))?;
                if index >= globals_len {
                    return dangling(format!("pooled constant {}", index));
                }
            }
        }
        Ok(())
    }

    fn check_atom(&self, atom: Atom, what: impl FnOnce() -> String) -> Result<(), ImageError> {
        if self.atoms.owns(atom) {
            Ok(())
        } else {
            Err(ImageError::Dangling(what()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_mismatch_rejected() {
        let ctx = ResolutionContext::new();
        let mut value: serde_json::Value = serde_json::from_slice(&ctx.export().unwrap()).unwrap();
        value["version"] = serde_json::json!(99);
        let bytes = serde_json::to_vec(&value).unwrap();
        match ResolutionContext::import(&bytes) {
            Err(ImageError::Version { found: 99, expected }) => assert_eq!(expected, IMAGE_VERSION),
            other => panic!("expected a version error, got {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_duplicate_atoms_rejected() {
        let ctx = ResolutionContext::new();
        let mut value: serde_json::Value = serde_json::from_slice(&ctx.export().unwrap()).unwrap();
        value["atoms"] = serde_json::json!(["nil", "nil"]);
        let bytes = serde_json::to_vec(&value).unwrap();
        assert!(matches!(ResolutionContext::import(&bytes), Err(ImageError::Atoms)));
    }

    #[test]
    fn test_dangling_parent_rejected() {
        let mut ctx = ResolutionContext::new();
        ctx.register_func("f", kestrel_core::TextSpan::synthetic(), 0);
        ctx.leave_scope();
        let mut value: serde_json::Value = serde_json::from_slice(&ctx.export().unwrap()).unwrap();
        // Bump the generation of the global scope slot so every parent link
        // to it is stale.
        value["globalScope"][1] = serde_json::json!(7);
        let bytes = serde_json::to_vec(&value).unwrap();
        assert!(matches!(ResolutionContext::import(&bytes), Err(ImageError::Dangling(_))));
    }
}
