//! kestrel_resolver: Semantic analysis for Kestrel programs.
//!
//! The resolver is driven by the syntax tree walker. As the walker enters
//! and leaves declarations it registers symbols, and as it meets name
//! references it asks where their values live. What comes out is the layout
//! the code generator and interpreter work from: the global value table,
//! per-function frame and capture layouts, per-class member and method
//! dispatch tables, and the queries the debugger needs.
//!
//! Everything is owned by a [`ResolutionContext`]. Symbols and scopes live
//! in generational arenas and refer to each other through handles, so a
//! reference to a scope that was freed reports [`ExpiredHandle`] instead of
//! pointing at reused storage.

mod block;
mod class;
mod classes;
mod constants;
mod context;
mod debug_info;
mod error;
mod globals;
mod image;
mod lookup;
mod scope;
mod symbol;
mod types;

pub use block::{BlockId, BlockTree, ControlBlock, PatchKind, PatchSite};
pub use class::{AttrMapping, AttrTable, ClassInfo, HiddenCtorArg, SpecialMethod, SpecialMethods, SPECIAL_METHOD_COUNT};
pub use context::{ConstantPools, ResolutionContext};
pub use debug_info::{find_statement, StatementNode, VisibleLocal};
pub use error::{ImageError, ResolveError, ScopeOperation};
pub use globals::{GlobalSlot, GlobalTable, GlobalValue};
pub use image::IMAGE_VERSION;
pub use kestrel_core::ExpiredHandle;
pub use lookup::QualifiedName;
pub use scope::{
    ClosedFunc, FunctionInfo, Implementation, LiteralInfo, MethodInfo, NativeBinding, Scope, ScopeExt, ScopeId,
    StorageRef, Temporaries,
};
pub use symbol::{MemberInfo, PropertyInfo, Symbol, SymbolData, SymbolId, SymbolKind, SymbolTable};
pub use types::{ConcreteType, TypeDescriptor, ValueKind};
