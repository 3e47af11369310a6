//! `JsObject`: property store, prototype chain, and (for arrays) dense
//! element storage, keyed by a [`Shape`].
//!
//! Grounded on `otter-vm-core::object` (shape + slot vector + prototype),
//! adapted to spec.md §3/§4.4's explicit invariant `slots.len() ==
//! shape.property_count()` and the array-storage separation in §4.4.

use crate::property::{Attributes, PropertyDescriptor, PropertyKey, SlotKind};
use crate::shape::{cache, Shape};
use crate::value::Value;
use kestrel_gc::{GcHeader, GcTraceable};
use parking_lot::RwLock;
use std::sync::Arc;

/// What a callable object does when invoked. Stored alongside the
/// property store so `typeof` and `instanceof` can ask `is_callable`/
/// `is_constructor` without a second heap allocation.
#[derive(Clone)]
pub enum Callable {
    /// A host-registered or builtin function: `(this, args) -> result`.
    /// The concrete `Context` that owns the call stack/environment lives
    /// in `kestrel-interpreter`; here it is type-erased to avoid a
    /// dependency cycle, matching the "host API registry" contract in
    /// spec.md §6.
    Native(Arc<dyn Fn(&Value, &[Value]) -> crate::error::VmResult<Value> + Send + Sync>),
    /// A builtin that itself needs to invoke a callback argument (e.g.
    /// `Array.prototype.map`, a JSON `reviver`). Takes a call-hook
    /// `(callee, this, args) -> result` supplied by whichever evaluator
    /// ends up invoking this callable, since only the evaluator can run
    /// an `Interpreted` closure.
    NativeWithCall(
        Arc<
            dyn Fn(&mut dyn FnMut(&Value, &Value, &[Value]) -> crate::error::VmResult<Value>, &Value, &[Value]) -> crate::error::VmResult<Value>
                + Send
                + Sync,
        >,
    ),
    /// A user-defined function: evaluated by walking its captured AST and
    /// closure environment. The AST/environment handles are opaque here
    /// for the same layering reason as `Native`.
    Interpreted(crate::function::FunctionData),
}

impl std::fmt::Debug for Callable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Callable::Native(_) => write!(f, "Callable::Native"),
            Callable::NativeWithCall(_) => write!(f, "Callable::NativeWithCall"),
            Callable::Interpreted(_) => write!(f, "Callable::Interpreted"),
        }
    }
}

struct Inner {
    shape: Arc<Shape>,
    slots: Vec<PropertyDescriptor>,
    prototype: Option<kestrel_gc::GcRef<JsObject>>,
    extensible: bool,
    elements: Vec<Value>,
    is_array: bool,
    callable: Option<Callable>,
    /// Set on objects created by `new F()`: `F.prototype` at construction
    /// time, so `instanceof` and `constructor` introspection work even if
    /// the prototype property is reassigned later.
    construct_prototype: Option<kestrel_gc::GcRef<JsObject>>,
}

pub struct JsObject {
    inner: RwLock<Inner>,
}

impl GcTraceable for JsObject {
    const NEEDS_TRACE: bool = true;

    fn trace(&self, tracer: &mut dyn FnMut(&GcHeader)) {
        let inner = self.inner.read();
        for slot in &inner.slots {
            trace_descriptor(slot, tracer);
        }
        for v in &inner.elements {
            trace_value(v, tracer);
        }
        if let Some(p) = &inner.prototype {
            tracer(p.header());
        }
    }

    fn break_cycle(&self) {
        let mut inner = self.inner.write();
        inner.slots.clear();
        inner.elements.clear();
        inner.prototype = None;
        inner.callable = None;
        inner.construct_prototype = None;
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

fn trace_descriptor(d: &PropertyDescriptor, tracer: &mut dyn FnMut(&GcHeader)) {
    match d {
        PropertyDescriptor::Data { value } => trace_value(value, tracer),
        PropertyDescriptor::Accessor { get, set } => {
            if let Some(g) = get {
                trace_value(g, tracer);
            }
            if let Some(s) = set {
                trace_value(s, tracer);
            }
        }
    }
}

impl JsObject {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                shape: cache().root(),
                slots: Vec::new(),
                prototype: None,
                extensible: true,
                elements: Vec::new(),
                is_array: false,
                callable: None,
                construct_prototype: None,
            }),
        }
    }

    pub fn new_array() -> Self {
        let mut o = Self::new();
        o.inner.get_mut().is_array = true;
        o
    }

    pub fn new_native_function(
        f: impl Fn(&Value, &[Value]) -> crate::error::VmResult<Value> + Send + Sync + 'static,
    ) -> Self {
        let mut o = Self::new();
        o.inner.get_mut().callable = Some(Callable::Native(Arc::new(f)));
        o
    }

    pub fn new_native_with_call(
        f: impl Fn(&mut dyn FnMut(&Value, &Value, &[Value]) -> crate::error::VmResult<Value>, &Value, &[Value]) -> crate::error::VmResult<Value>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        let mut o = Self::new();
        o.inner.get_mut().callable = Some(Callable::NativeWithCall(Arc::new(f)));
        o
    }

    pub fn new_interpreted_function(data: crate::function::FunctionData) -> Self {
        let mut o = Self::new();
        o.inner.get_mut().callable = Some(Callable::Interpreted(data));
        o
    }

    pub fn shape_id(&self) -> u64 {
        self.inner.read().shape.id()
    }

    pub fn is_array(&self) -> bool {
        self.inner.read().is_array
    }

    pub fn is_callable(&self) -> bool {
        self.inner.read().callable.is_some()
    }

    pub fn is_extensible(&self) -> bool {
        self.inner.read().extensible
    }

    pub fn prevent_extensions(&self) {
        self.inner.write().extensible = false;
    }

    pub fn prototype(&self) -> Option<kestrel_gc::GcRef<JsObject>> {
        self.inner.read().prototype.clone()
    }

    pub fn set_prototype(&self, proto: Option<kestrel_gc::GcRef<JsObject>>) {
        self.inner.write().prototype = proto;
    }

    pub fn construct_prototype(&self) -> Option<kestrel_gc::GcRef<JsObject>> {
        self.inner.read().construct_prototype.clone()
    }

    pub fn set_construct_prototype(&self, proto: Option<kestrel_gc::GcRef<JsObject>>) {
        self.inner.write().construct_prototype = proto;
    }

    pub fn with_callable<R>(&self, f: impl FnOnce(Option<&Callable>) -> R) -> R {
        let inner = self.inner.read();
        f(inner.callable.as_ref())
    }

    /// A cheap clone of the callable (an `Arc`/`Rc` bump), dropping the
    /// read lock before the caller invokes it. Invoking a callable while
    /// still holding `inner`'s read lock would deadlock the moment the
    /// call recurses into a write on this same object (e.g. a method that
    /// assigns to one of its own properties).
    pub fn callable_handle(&self) -> Option<Callable> {
        self.inner.read().callable.clone()
    }

    /// Array `length`: one past the highest populated index.
    pub fn array_length(&self) -> u32 {
        self.inner.read().elements.len() as u32
    }

    pub fn array_get(&self, index: u32) -> Option<Value> {
        self.inner.read().elements.get(index as usize).cloned()
    }

    /// Set an array element, growing the dense store with `undefined`
    /// holes as needed (spec.md §8 scenario 6: `a[3]=1` yields `length===4`
    /// and `a[0]` is `undefined`).
    pub fn array_set(&self, index: u32, value: Value) {
        let mut inner = self.inner.write();
        let idx = index as usize;
        if idx >= inner.elements.len() {
            inner.elements.resize(idx + 1, Value::Undefined);
        }
        inner.elements[idx] = value;
    }

    /// `length = n`: truncates elements beyond `n` (spec.md §4.4).
    pub fn set_array_length(&self, n: u32) {
        let mut inner = self.inner.write();
        inner.elements.truncate(n as usize);
        inner.elements.resize(n as usize, Value::Undefined);
    }

    pub fn array_push(&self, value: Value) -> u32 {
        let mut inner = self.inner.write();
        inner.elements.push(value);
        inner.elements.len() as u32
    }

    pub fn array_iter(&self) -> Vec<Value> {
        self.inner.read().elements.clone()
    }

    /// Own property lookup on this object alone (no prototype walk).
    pub fn get_own(&self, name: &PropertyKey) -> Option<Value> {
        if let Some(index) = name.as_array_index() {
            if self.inner.read().is_array {
                return self.array_get(index);
            }
        }
        let inner = self.inner.read();
        let slot = inner.shape.slot_of(name)?;
        inner.slots.get(slot).and_then(|d| d.value().cloned())
    }

    pub fn get_own_descriptor(&self, name: &PropertyKey) -> Option<PropertyDescriptor> {
        let inner = self.inner.read();
        let slot = inner.shape.slot_of(name)?;
        inner.slots.get(slot).cloned()
    }

    /// `get` including the prototype-chain walk (spec.md §4.4).
    pub fn get(&self, name: &PropertyKey) -> Value {
        if let Some(v) = self.get_own(name) {
            return v;
        }
        let mut proto = self.prototype();
        while let Some(p) = proto {
            if let Some(v) = p.get_own(name) {
                return v;
            }
            proto = p.prototype();
        }
        Value::Undefined
    }

    /// Plain `set(name, value)` on an existing or new slot, transitioning
    /// the shape via the global `ShapeCache` exactly as spec.md §4.4
    /// describes. Array-index keys on array objects bypass the shape
    /// entirely and go through the dense element store.
    pub fn set(&self, name: PropertyKey, value: Value) {
        if let Some(index) = name.as_array_index() {
            if self.inner.read().is_array {
                self.array_set(index, value);
                return;
            }
        }
        let mut inner = self.inner.write();
        if let Some(slot) = inner.shape.slot_of(&name) {
            if let Some(existing) = inner.slots.get_mut(slot) {
                *existing = PropertyDescriptor::Data { value };
            }
            return;
        }
        let new_shape = inner.shape.transition(name, SlotKind::Data, Attributes::data());
        inner.shape = new_shape;
        inner.slots.push(PropertyDescriptor::Data { value });
        debug_assert_eq!(inner.slots.len(), inner.shape.property_count());
    }

    pub fn define_property(
        &self,
        name: PropertyKey,
        descriptor: PropertyDescriptor,
        kind: SlotKind,
        attributes: Attributes,
    ) {
        let mut inner = self.inner.write();
        if let Some(slot) = inner.shape.slot_of(&name) {
            inner.slots[slot] = descriptor;
            return;
        }
        let new_shape = inner.shape.transition(name, kind, attributes);
        inner.shape = new_shape;
        inner.slots.push(descriptor);
    }

    /// Delete an own property, deprecating the shape (spec.md §9 state
    /// machine: `stable -> deprecated`) since the remaining objects on the
    /// old transition tree no longer match this instance's layout.
    pub fn delete(&self, name: &PropertyKey) -> bool {
        let mut inner = self.inner.write();
        let Some(slot) = inner.shape.slot_of(name) else { return true };
        let remaining: Vec<(PropertyKey, PropertyDescriptor)> = inner
            .shape
            .own_keys()
            .cloned()
            .zip(inner.slots.iter().cloned())
            .enumerate()
            .filter(|(i, _)| *i != slot)
            .map(|(_, pair)| pair)
            .collect();
        inner.shape.mark_deprecated();
        drop(inner);
        // Rebuild from scratch on the cache's root: deleting does not need
        // to preserve transition-sharing, only correctness.
        let mut this = self.inner.write();
        this.shape = cache().root();
        this.slots.clear();
        for (k, d) in remaining {
            let s = this.shape.transition(k, SlotKind::Data, Attributes::data());
            this.shape = s;
            this.slots.push(d);
        }
        true
    }

    pub fn has(&self, name: &PropertyKey) -> bool {
        if self.get_own(name).is_some() {
            return true;
        }
        if let Some(p) = self.prototype() {
            return p.has(name);
        }
        false
    }

    /// Enumerable own string keys, for `for-in` / `Object.keys`, in shape
    /// insertion order, array indices first (ECMAScript integer-index
    /// ordering).
    pub fn own_enumerable_keys(&self) -> Vec<PropertyKey> {
        let inner = self.inner.read();
        let mut keys: Vec<PropertyKey> = (0..inner.elements.len() as u32).map(PropertyKey::Index).collect();
        keys.extend(inner.shape.own_keys().cloned());
        keys
    }

    pub fn shape(&self) -> Arc<Shape> {
        self.inner.read().shape.clone()
    }
}

impl Default for JsObject {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for JsObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JsObject").field("shape_id", &self.shape_id()).field("is_array", &self.is_array()).finish()
    }
}
