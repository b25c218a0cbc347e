//! Name interning.
//!
//! Symbol names, namespace path segments and literal constant texts are
//! interned once so symbol tables can key on a 32-bit [`Atom`] and compare
//! names with an integer comparison.

use lasso::{Key, Spur, ThreadedRodeo};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::sync::Arc;

/// An interned name. Resolve it back to text through the [`AtomTable`] that
/// produced it.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct Atom(Spur);

impl Atom {
    /// Position of the atom in its table's interning order.
    #[inline]
    pub fn key(self) -> u32 {
        self.0.into_usize() as u32
    }
}

impl fmt::Debug for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Atom({})", self.key())
    }
}

// Atoms serialize as their key. A table rebuilt with
// [`AtomTable::from_strings`] from [`AtomTable::strings`] hands out the same
// keys, so serialized atoms resolve against it.
impl Serialize for Atom {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.key().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Atom {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let key = u32::deserialize(deserializer)?;
        Spur::try_from_usize(key as usize)
            .map(Atom)
            .ok_or_else(|| serde::de::Error::custom(format!("invalid atom key {}", key)))
    }
}

/// Shared interner for every name the resolver sees.
///
/// Cloning is cheap and clones share storage, so the resolution context and
/// anything that renders its output (diagnostics, image export) can hold the
/// same table.
#[derive(Clone)]
pub struct AtomTable {
    rodeo: Arc<ThreadedRodeo>,
}

impl AtomTable {
    pub fn new() -> Self {
        Self {
            rodeo: Arc::new(ThreadedRodeo::new()),
        }
    }

    /// Intern `text`, returning the existing atom when it was seen before.
    #[inline]
    pub fn intern(&self, text: &str) -> Atom {
        Atom(self.rodeo.get_or_intern(text))
    }

    /// Intern a string literal without copying it.
    #[inline]
    pub fn intern_static(&self, text: &'static str) -> Atom {
        Atom(self.rodeo.get_or_intern_static(text))
    }

    /// Look up an atom without interning.
    #[inline]
    pub fn get(&self, text: &str) -> Option<Atom> {
        self.rodeo.get(text).map(Atom)
    }

    #[inline]
    pub fn resolve(&self, atom: Atom) -> &str {
        self.rodeo.resolve(&atom.0)
    }

    /// Whether `atom` was produced by this table.
    pub fn owns(&self, atom: Atom) -> bool {
        self.rodeo.try_resolve(&atom.0).is_some()
    }

    /// Every interned string, ordered by key.
    pub fn strings(&self) -> Vec<String> {
        let mut entries: Vec<(usize, &str)> =
            self.rodeo.iter().map(|(key, text)| (key.into_usize(), text)).collect();
        entries.sort_unstable_by_key(|&(key, _)| key);
        entries.into_iter().map(|(_, text)| text.to_string()).collect()
    }

    /// Rebuild a table from [`AtomTable::strings`] output. Returns `None` if
    /// the list contains duplicates, since keys would then shift.
    pub fn from_strings<I, S>(strings: I) -> Option<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let table = Self::new();
        for (expected, text) in strings.into_iter().enumerate() {
            if table.intern(text.as_ref()).key() as usize != expected {
                return None;
            }
        }
        Some(table)
    }

    /// Pair an atom with this table so it can be formatted.
    pub fn display(&self, atom: Atom) -> DisplayAtom<'_> {
        DisplayAtom { atom, table: self }
    }

    pub fn len(&self) -> usize {
        self.rodeo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rodeo.is_empty()
    }
}

impl Default for AtomTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for AtomTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AtomTable").field("len", &self.len()).finish()
    }
}

/// `Display` adapter returned by [`AtomTable::display`].
pub struct DisplayAtom<'a> {
    atom: Atom,
    table: &'a AtomTable,
}

impl fmt::Display for DisplayAtom<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table.resolve(self.atom))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_intern_dedupes() {
        let table = AtomTable::new();
        let a = table.intern("speak");
        let b = table.intern("speak");
        let c = table.intern("Dog");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(table.resolve(c), "Dog");
    }

    #[test]
    fn test_get_does_not_intern() {
        let table = AtomTable::new();
        assert!(table.get("x").is_none());
        let x = table.intern_static("x");
        assert_eq!(table.get("x"), Some(x));
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_rebuild_from_strings_keeps_keys() {
        let table = AtomTable::new();
        let names: Vec<Atom> = ["nil", "true", "false", "Object"].iter().map(|s| table.intern(s)).collect();
        let rebuilt = AtomTable::from_strings(table.strings()).unwrap();
        for atom in names {
            assert_eq!(rebuilt.resolve(atom), table.resolve(atom));
        }
        assert!(AtomTable::from_strings(["a", "a"]).is_none());
    }

    #[test]
    fn test_clones_share_storage() {
        let table = AtomTable::new();
        let shared = table.clone();
        let atom = table.intern("ns::value");
        assert_eq!(shared.resolve(atom), "ns::value");
        assert_eq!(format!("{}", shared.display(atom)), "ns::value");
    }
}
