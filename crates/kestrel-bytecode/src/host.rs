//! The seam between the bytecode VM and the tree-walking interpreter
//! that embeds it.
//!
//! `kestrel-bytecode` cannot depend on `kestrel-interpreter` (the
//! dependency runs the other way: the interpreter consults this crate to
//! accelerate hot function bodies), so anything that needs real
//! ECMAScript semantics — variable resolution through a closure chain,
//! invoking a callee, or an operator's full coercion rules — is a method
//! the embedder implements. This mirrors spec.md §6's "host API
//! registry" shape at a smaller scale: the VM is the core, the
//! interpreter is its one host.

use crate::instruction::BinOp;
use kestrel_core::{Value, VmResult};

pub trait Host {
    fn get_variable(&self, name: &str) -> VmResult<Value>;
    fn set_variable(&self, name: &str, value: Value) -> VmResult<()>;
    fn call(&self, callee: &Value, this: &Value, args: &[Value]) -> VmResult<Value>;
    /// Evaluate one binary operator with full interpreter semantics
    /// (coercion, string concatenation, loose/strict equality, etc.).
    fn binary(&self, op: BinOp, lhs: &Value, rhs: &Value) -> VmResult<Value>;
    /// Unary `-`: needs `ToNumber`, which may invoke `valueOf` on an
    /// object, hence routed through the host rather than done inline.
    fn unary_neg(&self, value: &Value) -> VmResult<Value>;
}
