//! `JSON.parse` / `JSON.stringify`, standalone from the evaluator that
//! hosts them (spec.md §4.6).
//!
//! Grounded on `otter-vm-core::intrinsics_impl::json`'s split between a
//! strict recursive-descent parser and a depth-first stringifier with a
//! path-based circular-reference tracker, trimmed of its `NativeContext`
//! coupling: both entry points here take a `call` hook — the same
//! `(callee, this, args) -> VmResult<Value>` shape `kestrel-interpreter`'s
//! `coercion` module uses for `ToPrimitive` — so this crate depends only
//! on `kestrel-core` and the evaluator supplies the ability to invoke a
//! `reviver`, a `replacer` function, or an object's `toJSON` method.

mod parse;
mod stringify;

pub use parse::{parse, JsonParseError, JsonParseOptions, MAX_NESTING_DEPTH};
pub use stringify::{stringify, Replacer};

use kestrel_core::{Value, VmResult};

/// The callback shape every entry point uses to invoke a user-supplied
/// function (`reviver`, `replacer`, or a discovered `toJSON` method)
/// without this crate depending on `kestrel-interpreter`.
pub type CallHook<'a> = dyn FnMut(&Value, &Value, &[Value]) -> VmResult<Value> + 'a;
