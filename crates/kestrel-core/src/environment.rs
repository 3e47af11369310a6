//! Lexical environments: a chain of binding records walked by identifier
//! resolution, with `let`/`const`'s temporal-dead-zone semantics (spec.md
//! §3).
//!
//! Grounded on `otter-vm-core::context`'s frame/scope layering, adapted to
//! a GC-traced chain of [`Environment`] records rather than a flat
//! register file, since the tree-walking evaluator (spec.md §4.3) closes
//! over environments directly instead of compiling to registers.

use crate::value::Value;
use kestrel_gc::{GcHeader, GcRef, GcTraceable};
use rustc_hash::FxHashMap;
use std::cell::RefCell;

/// A single variable binding. `let`/`const`/class bindings start
/// `Uninitialized` (the temporal dead zone) and become `Initialized` the
/// moment their declaration runs; `var` and function parameters are
/// `Initialized` from creation with `undefined`.
#[derive(Clone, Debug)]
enum Slot {
    Uninitialized,
    Initialized(Value),
}

struct Binding {
    slot: Slot,
    mutable: bool,
}

pub struct Environment {
    bindings: RefCell<FxHashMap<String, Binding>>,
    pub parent: Option<GcRef<Environment>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingError {
    NotDefined,
    TemporalDeadZone,
    AssignToConst,
    AlreadyDeclared,
}

impl Environment {
    pub fn new(parent: Option<GcRef<Environment>>) -> Self {
        Self { bindings: RefCell::new(FxHashMap::default()), parent }
    }

    pub fn root() -> Self {
        Self::new(None)
    }

    pub fn child(parent: &GcRef<Environment>) -> Self {
        Self::new(Some(parent.clone()))
    }

    /// Declare a `var`: hoisted, initialized to `undefined`, re-declarable.
    pub fn declare_var(&self, name: &str) {
        let mut bindings = self.bindings.borrow_mut();
        bindings.entry(name.to_string()).or_insert(Binding { slot: Slot::Initialized(Value::Undefined), mutable: true });
    }

    /// Declare a `let`/class binding: starts in the temporal dead zone.
    pub fn declare_let(&self, name: &str) -> Result<(), BindingError> {
        self.declare_uninitialized(name, true)
    }

    /// Declare a `const` binding: starts in the temporal dead zone, and
    /// once initialized can never be reassigned.
    pub fn declare_const(&self, name: &str) -> Result<(), BindingError> {
        self.declare_uninitialized(name, false)
    }

    fn declare_uninitialized(&self, name: &str, mutable: bool) -> Result<(), BindingError> {
        let mut bindings = self.bindings.borrow_mut();
        if bindings.contains_key(name) {
            return Err(BindingError::AlreadyDeclared);
        }
        bindings.insert(name.to_string(), Binding { slot: Slot::Uninitialized, mutable });
        Ok(())
    }

    /// Declare and immediately bind a function parameter or a named
    /// function-expression's own name: always initialized, always mutable.
    pub fn declare_initialized(&self, name: &str, value: Value) {
        let mut bindings = self.bindings.borrow_mut();
        bindings.insert(name.to_string(), Binding { slot: Slot::Initialized(value), mutable: true });
    }

    /// Move a TDZ binding to `Initialized`, run once when a `let`/`const`
    /// declaration (or the class it names) actually executes.
    pub fn initialize(&self, name: &str, value: Value) -> Result<(), BindingError> {
        let mut bindings = self.bindings.borrow_mut();
        let binding = bindings.get_mut(name).ok_or(BindingError::NotDefined)?;
        binding.slot = Slot::Initialized(value);
        Ok(())
    }

    /// Look up `name` in this environment only (no parent walk).
    fn get_local(&self, name: &str) -> Option<Result<Value, BindingError>> {
        let bindings = self.bindings.borrow();
        bindings.get(name).map(|b| match &b.slot {
            Slot::Initialized(v) => Ok(v.clone()),
            Slot::Uninitialized => Err(BindingError::TemporalDeadZone),
        })
    }

    /// Resolve `name` by walking outward through parent scopes.
    pub fn get(&self, name: &str) -> Result<Value, BindingError> {
        if let Some(result) = self.get_local(name) {
            return result;
        }
        match &self.parent {
            Some(p) => p.get(name),
            None => Err(BindingError::NotDefined),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        if self.bindings.borrow().contains_key(name) {
            return true;
        }
        match &self.parent {
            Some(p) => p.has(name),
            None => false,
        }
    }

    /// Assign to an existing binding, walking outward through parents;
    /// errors if the name was never declared, is still in the TDZ, or is a
    /// `const` (spec.md §3).
    pub fn set(&self, name: &str, value: Value) -> Result<(), BindingError> {
        {
            let mut bindings = self.bindings.borrow_mut();
            if let Some(binding) = bindings.get_mut(name) {
                if matches!(binding.slot, Slot::Uninitialized) {
                    return Err(BindingError::TemporalDeadZone);
                }
                if !binding.mutable {
                    return Err(BindingError::AssignToConst);
                }
                binding.slot = Slot::Initialized(value);
                return Ok(());
            }
        }
        match &self.parent {
            Some(p) => p.set(name, value),
            None => Err(BindingError::NotDefined),
        }
    }
}

impl GcTraceable for Environment {
    const NEEDS_TRACE: bool = true;

    fn trace(&self, tracer: &mut dyn FnMut(&GcHeader)) {
        for binding in self.bindings.borrow().values() {
            if let Slot::Initialized(v) = &binding.slot {
                trace_value(v, tracer);
            }
        }
        if let Some(p) = &self.parent {
            tracer(p.header());
        }
    }

    fn break_cycle(&self) {
        self.bindings.borrow_mut().clear();
    }
}

fn trace_value(v: &Value, tracer: &mut dyn FnMut(&GcHeader)) {
    match v {
        Value::String(s) => tracer(s.header()),
        Value::Symbol(s) => tracer(s.header()),
        Value::BigInt(b) => tracer(b.header()),
        Value::Object(o) => tracer(o.header()),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn let_binding_is_in_tdz_until_initialized() {
        let env = Environment::root();
        env.declare_let("x").unwrap();
        assert_eq!(env.get("x"), Err(BindingError::TemporalDeadZone));
        env.initialize("x", Value::Number(1.0)).unwrap();
        assert_eq!(env.get("x"), Ok(Value::Number(1.0)));
    }

    #[test]
    fn const_rejects_reassignment() {
        let env = Environment::root();
        env.declare_const("x").unwrap();
        env.initialize("x", Value::Number(1.0)).unwrap();
        assert_eq!(env.set("x", Value::Number(2.0)), Err(BindingError::AssignToConst));
    }

    #[test]
    fn child_scope_resolves_through_parent() {
        let parent = GcRef::new(Environment::root());
        parent.declare_var("x");
        parent.initialize("x", Value::Number(5.0)).ok();
        parent.set("x", Value::Number(5.0)).unwrap();
        let child = GcRef::new(Environment::child(&parent));
        assert_eq!(child.get("x"), Ok(Value::Number(5.0)));
    }
}
