//! The explicit completion value that replaces Rust-exception-based
//! control flow in the tree walker (spec.md §9 Design Notes: "replace
//! exception-based `return` in the tree walker with an explicit
//! completion value `{kind, value?, label?}`").
//!
//! `throw` is not one of this enum's kinds: it propagates as
//! `Err(VmError::Exception(..))` through the ordinary `VmResult` a
//! statement/expression already returns, which is itself an explicit,
//! non-panic-based channel — so it gets the same "no hidden Rust-level
//! unwinding" property this redesign asks for without a `Completion`
//! variant that `?` would just unwrap immediately anyway.

use kestrel_core::Value;

#[derive(Debug, Clone)]
pub enum Completion {
    Normal(Value),
    Return(Value),
    Break(Option<String>),
    Continue(Option<String>),
}

impl Completion {
    pub fn normal(value: Value) -> Self {
        Completion::Normal(value)
    }

    pub fn is_abrupt(&self) -> bool {
        !matches!(self, Completion::Normal(_))
    }

    /// The value carried by `Normal`/`Return`; `Undefined` for
    /// `Break`/`Continue`, which carry no value.
    pub fn value(&self) -> Value {
        match self {
            Completion::Normal(v) | Completion::Return(v) => v.clone(),
            Completion::Break(_) | Completion::Continue(_) => Value::Undefined,
        }
    }
}
