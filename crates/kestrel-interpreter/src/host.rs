//! The host API registry: the one door through which an embedder plugs
//! platform services (timers, I/O, OS shims) into the global object
//! without this crate depending on any of them.
//!
//! Grounded on `otter-vm-core::context::VmContext`'s native-function
//! table, simplified to the shape this tree-walker's `Callable::Native`
//! already uses: a host function is `Fn(&[Value]) -> VmResult<Value>`,
//! any embedder state it needs closed over rather than threaded through
//! as a `Context` parameter (the evaluator's native call convention never
//! passes one).

use kestrel_core::{JsObject, PropertyKey, Value, VmResult};
use kestrel_gc::GcRef;

pub type HostFn = std::sync::Arc<dyn Fn(&[Value]) -> VmResult<Value> + Send + Sync>;

/// A name -> function table built up with [`HostRegistry::register`] before
/// a [`crate::Context`] exists, then installed onto its global object and
/// environment in one pass.
#[derive(Default)]
pub struct HostRegistry {
    entries: Vec<(String, HostFn)>,
}

impl HostRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a host function under `name`; calls to `name(...)` from
    /// script surface through the global object once installed.
    pub fn register(&mut self, name: impl Into<String>, f: impl Fn(&[Value]) -> VmResult<Value> + Send + Sync + 'static) {
        self.entries.push((name.into(), std::sync::Arc::new(f)));
    }

    /// Install every registered function as a global binding, both on the
    /// lexical global environment (for bare identifier lookup) and on the
    /// global object itself (for `globalThis.name` access).
    pub fn install(&self, global_env: &GcRef<kestrel_core::Environment>, global: &GcRef<JsObject>) {
        for (name, f) in &self.entries {
            let f = f.clone();
            let value = Value::Object(GcRef::new(JsObject::new_native_function(move |_this, args| f(args))));
            global_env.declare_initialized(name, value.clone());
            global.set(PropertyKey::string(name), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_core::Environment;

    #[test]
    fn registered_function_is_callable_by_name() {
        let mut registry = HostRegistry::new();
        registry.register("double", |args| {
            let n = args.first().and_then(Value::as_number).unwrap_or(0.0);
            Ok(Value::Number(n * 2.0))
        });
        let global_env = GcRef::new(Environment::root());
        let global = GcRef::new(JsObject::new());
        registry.install(&global_env, &global);
        let value = global.get(&PropertyKey::string("double"));
        let Value::Object(obj) = value else { panic!("expected function") };
        let result = obj.with_callable(|c| match c {
            Some(kestrel_core::Callable::Native(f)) => f(&Value::Undefined, &[Value::Number(21.0)]),
            _ => panic!("expected native callable"),
        });
        assert_eq!(result.unwrap().as_number(), Some(42.0));
    }
}
