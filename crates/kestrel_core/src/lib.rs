//! kestrel_core: Core utilities for the Kestrel compiler.
//!
//! Provides name interning, source spans, the generational arena that owns
//! compile-time symbols, and small collections shared by the other crates.

pub mod arena;
pub mod collections;
pub mod intern;
pub mod text;

// Re-export commonly used types
pub use arena::{Arena, ExpiredHandle, Handle};
pub use collections::OrderedMap;
pub use intern::{Atom, AtomTable};
pub use text::{LineMap, SourceLocation, TextPos, TextSpan};
