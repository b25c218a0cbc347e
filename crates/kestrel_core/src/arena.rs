//! Generational arena.
//!
//! Every compile-time symbol lives in one arena owned by the resolution
//! context. Entries are addressed by [`Handle`]s that pair a slot index with
//! the slot's generation. Removing an entry bumps the generation, so every
//! outstanding handle to it turns into an [`ExpiredHandle`] error on the next
//! dereference instead of silently aliasing whatever reuses the slot.

use std::fmt;
use std::marker::PhantomData;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// A generation-checked reference into an [`Arena`].
///
/// Handles are `Copy` and never keep their target alive; they are the weak
/// references of the compiler.
pub struct Handle<T> {
    index: u32,
    generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Handle<T> {
    #[inline]
    fn new(index: u32, generation: u32) -> Self {
        Self {
            index,
            generation,
            _marker: PhantomData,
        }
    }

    /// The slot this handle points at.
    #[inline]
    pub fn slot(self) -> u32 {
        self.index
    }

    /// The generation the slot had when this handle was created.
    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl<T> Clone for Handle<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Handle<T> {}

impl<T> PartialEq for Handle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index && self.generation == other.generation
    }
}

impl<T> Eq for Handle<T> {}

impl<T> std::hash::Hash for Handle<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.index.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for Handle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}v{}", self.index, self.generation)
    }
}

// Serialized as an `(index, generation)` pair. Only meaningful together with
// the serialized arena it points into.
impl<T> Serialize for Handle<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        (self.index, self.generation).serialize(serializer)
    }
}

impl<'de, T> Deserialize<'de> for Handle<T> {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (index, generation) = <(u32, u32)>::deserialize(deserializer)?;
        Ok(Handle::new(index, generation))
    }
}

/// Dereferencing a handle whose entry has been removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("handle #{slot}v{generation} refers to a destroyed entry")]
pub struct ExpiredHandle {
    pub slot: u32,
    pub generation: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct Slot<T> {
    generation: u32,
    value: Option<T>,
}

/// Slot storage with generation checks and slot reuse.
///
/// Serializing an arena keeps slot positions, generations and the vacant
/// list, so handles serialized alongside it stay valid after a round trip.
#[derive(Debug, Serialize, Deserialize)]
pub struct Arena<T> {
    slots: Vec<Slot<T>>,
    vacant: Vec<u32>,
    live: usize,
}

impl<T> Arena<T> {
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            vacant: Vec::new(),
            live: 0,
        }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: Vec::with_capacity(capacity),
            vacant: Vec::new(),
            live: 0,
        }
    }

    /// Store a value and return a handle to it.
    pub fn insert(&mut self, value: T) -> Handle<T> {
        self.live += 1;
        if let Some(index) = self.vacant.pop() {
            let slot = &mut self.slots[index as usize];
            slot.value = Some(value);
            return Handle::new(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            value: Some(value),
        });
        Handle::new(index, 0)
    }

    /// Remove the entry behind `handle`, expiring every copy of the handle.
    pub fn remove(&mut self, handle: Handle<T>) -> Result<T, ExpiredHandle> {
        let slot = self
            .slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation && slot.value.is_some())
            .ok_or(ExpiredHandle {
                slot: handle.index,
                generation: handle.generation,
            })?;
        slot.generation = slot.generation.wrapping_add(1);
        let value = slot.value.take();
        self.vacant.push(handle.index);
        self.live -= 1;
        value.ok_or(ExpiredHandle {
            slot: handle.index,
            generation: handle.generation,
        })
    }

    /// Resolve a handle, reporting expiry as an error.
    #[inline]
    pub fn resolve(&self, handle: Handle<T>) -> Result<&T, ExpiredHandle> {
        self.get(handle).ok_or(ExpiredHandle {
            slot: handle.index,
            generation: handle.generation,
        })
    }

    #[inline]
    pub fn resolve_mut(&mut self, handle: Handle<T>) -> Result<&mut T, ExpiredHandle> {
        self.get_mut(handle).ok_or(ExpiredHandle {
            slot: handle.index,
            generation: handle.generation,
        })
    }

    #[inline]
    pub fn get(&self, handle: Handle<T>) -> Option<&T> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_ref())
    }

    #[inline]
    pub fn get_mut(&mut self, handle: Handle<T>) -> Option<&mut T> {
        self.slots
            .get_mut(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.value.as_mut())
    }

    #[inline]
    pub fn contains(&self, handle: Handle<T>) -> bool {
        self.get(handle).is_some()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Iterate live entries in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Handle<T>, &T)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.value
                .as_ref()
                .map(|value| (Handle::new(index as u32, slot.generation), value))
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Handle<T>, &mut T)> {
        self.slots.iter_mut().enumerate().filter_map(|(index, slot)| {
            let generation = slot.generation;
            slot.value
                .as_mut()
                .map(|value| (Handle::new(index as u32, generation), value))
        })
    }

    /// Check the bookkeeping of a deserialized arena: the vacant list must
    /// name exactly the empty slots and the live count must match.
    pub fn is_consistent(&self) -> bool {
        let empty = self.slots.iter().filter(|slot| slot.value.is_none()).count();
        let vacant_ok = self
            .vacant
            .iter()
            .all(|&i| self.slots.get(i as usize).is_some_and(|slot| slot.value.is_none()));
        vacant_ok && empty == self.vacant.len() && self.live == self.slots.len() - empty
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> std::ops::Index<Handle<T>> for Arena<T> {
    type Output = T;

    /// Panics on an expired handle. Only used for handles the owner knows to
    /// be live, such as parent links of a scope that is itself live.
    fn index(&self, handle: Handle<T>) -> &T {
        match self.get(handle) {
            Some(value) => value,
            None => panic!("dereferenced expired arena handle {:?}", handle),
        }
    }
}

impl<T> std::ops::IndexMut<Handle<T>> for Arena<T> {
    fn index_mut(&mut self, handle: Handle<T>) -> &mut T {
        match self.get_mut(handle) {
            Some(value) => value,
            None => panic!("dereferenced expired arena handle {:?}", handle),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut arena = Arena::new();
        let a = arena.insert("a");
        let b = arena.insert("b");
        assert_eq!(arena.get(a), Some(&"a"));
        assert_eq!(arena[b], "b");
        assert_eq!(arena.len(), 2);
    }

    #[test]
    fn test_removed_handle_expires() {
        let mut arena = Arena::new();
        let a = arena.insert(1);
        assert_eq!(arena.remove(a), Ok(1));
        assert!(arena.get(a).is_none());
        let err = arena.resolve(a).unwrap_err();
        assert_eq!(err.slot, a.slot());
    }

    #[test]
    fn test_slot_reuse_bumps_generation() {
        let mut arena = Arena::new();
        let old = arena.insert(1);
        arena.remove(old).unwrap();
        let new = arena.insert(2);
        assert_eq!(old.slot(), new.slot());
        assert_ne!(old, new);
        assert!(arena.get(old).is_none());
        assert_eq!(arena.get(new), Some(&2));
    }

    #[test]
    fn test_serde_keeps_handles_valid() {
        let mut arena = Arena::new();
        let a = arena.insert("a".to_string());
        let b = arena.insert("b".to_string());
        arena.remove(a).unwrap();
        let json = serde_json::to_string(&(&arena, b)).unwrap();
        let (restored, handle): (Arena<String>, Handle<String>) = serde_json::from_str(&json).unwrap();
        assert!(restored.is_consistent());
        assert_eq!(restored.get(handle).map(String::as_str), Some("b"));
        assert!(restored.get(a).is_none());
    }

    #[test]
    fn test_double_remove_fails() {
        let mut arena = Arena::new();
        let a = arena.insert(());
        arena.remove(a).unwrap();
        assert!(arena.remove(a).is_err());
        assert!(arena.is_empty());
    }
}
