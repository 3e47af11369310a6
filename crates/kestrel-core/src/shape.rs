//! Hidden classes ("shapes"): the property-layout contract shared by every
//! object with the same property names, in the same insertion order, with
//! the same attributes.
//!
//! Grounded on `otter-vm-core::shape` (transition tree via `Weak`
//! child-pointers so a shape's children don't keep it artificially alive),
//! extended per spec.md §3/§4.4 with the process-wide `ShapeCache` that
//! deduplicates shapes across unrelated transition trees keyed by
//! `(parent, name, attrs)`, and with per-slot `PropertyDescriptor`
//! metadata (kind + attributes), not just an offset.

use crate::property::{Attributes, PropertyKey, SlotKind};
use rustc_hash::FxHashMap;
use std::cell::RefCell;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock, Weak};

static NEXT_SHAPE_ID: AtomicU64 = AtomicU64::new(1);

/// One property entry recorded on a [`Shape`], in insertion order.
#[derive(Clone)]
pub struct ShapeProperty {
    pub name: PropertyKey,
    pub slot: usize,
    pub kind: SlotKind,
    pub attributes: Attributes,
}

/// Whether a shape is still accepting new transitions.
///
/// Deleting a property or reconfiguring its attributes deprecates the
/// object's shape (spec.md §9 state machine): the object falls back to a
/// dictionary-mode shape of its own rather than continuing to share a
/// transition tree that no longer reflects reality. Deprecated shapes stay
/// alive as long as any object references them; they are simply excluded
/// from the transition cache so no other object is handed one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ShapeState {
    Stable,
    Deprecated,
}

/// Key used by the global cache to deduplicate shapes independent of which
/// transition tree discovered them first.
#[derive(Clone, PartialEq, Eq, Hash)]
struct TransitionKey {
    parent_id: u64,
    name: PropertyKeyHashable,
    kind: SlotKind,
    writable: bool,
    enumerable: bool,
    configurable: bool,
}

/// `PropertyKey` already implements `Hash`/`Eq`; this newtype exists only
/// so `TransitionKey` can derive them without requiring `PropertyKey` to
/// also implement `Copy`.
#[derive(Clone, PartialEq, Eq, Hash)]
struct PropertyKeyHashable(PropertyKey);

pub struct Shape {
    id: u64,
    pub parent: Option<Arc<Shape>>,
    properties: Vec<ShapeProperty>,
    by_name: FxHashMap<PropertyKeyHashable, usize>,
    transitions: RefCell<FxHashMap<TransitionKey, Weak<Shape>>>,
    state: std::cell::Cell<ShapeState>,
}

// SAFETY: Shape is confined to a single VM thread per Context; RefCell/Cell
// make it !Sync by default but the cache is only ever touched from that
// thread, matching otter-vm-core's Shape.
unsafe impl Send for Shape {}
unsafe impl Sync for Shape {}

impl Shape {
    fn new(parent: Option<Arc<Shape>>, properties: Vec<ShapeProperty>) -> Arc<Self> {
        let by_name = properties
            .iter()
            .enumerate()
            .map(|(i, p)| (PropertyKeyHashable(p.name.clone()), i))
            .collect();
        Arc::new(Self {
            id: NEXT_SHAPE_ID.fetch_add(1, Ordering::Relaxed),
            parent,
            properties,
            by_name,
            transitions: RefCell::new(FxHashMap::default()),
            state: std::cell::Cell::new(ShapeState::Stable),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn state(&self) -> ShapeState {
        self.state.get()
    }

    pub fn mark_deprecated(&self) {
        self.state.set(ShapeState::Deprecated);
    }

    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    pub fn slot_of(&self, name: &PropertyKey) -> Option<usize> {
        self.by_name.get(&PropertyKeyHashable(name.clone())).map(|&i| self.properties[i].slot)
    }

    pub fn property_at(&self, index: usize) -> Option<&ShapeProperty> {
        self.properties.get(index)
    }

    pub fn property_named(&self, name: &PropertyKey) -> Option<&ShapeProperty> {
        self.by_name.get(&PropertyKeyHashable(name.clone())).map(|&i| &self.properties[i])
    }

    /// Own property names in insertion order (for `Object.keys`,
    /// `JSON.stringify`, `for-in` on own properties).
    pub fn own_keys(&self) -> impl Iterator<Item = &PropertyKey> {
        self.properties.iter().map(|p| &p.name)
    }

    /// Follow (or create, via the global [`ShapeCache`]) the transition
    /// for adding `name` with `kind`/`attributes` to this shape.
    pub fn transition(
        self: &Arc<Self>,
        name: PropertyKey,
        kind: SlotKind,
        attributes: Attributes,
    ) -> Arc<Shape> {
        let key = TransitionKey {
            parent_id: self.id,
            name: PropertyKeyHashable(name.clone()),
            kind,
            writable: attributes.writable,
            enumerable: attributes.enumerable,
            configurable: attributes.configurable,
        };
        if let Some(existing) = self.transitions.borrow().get(&key).and_then(Weak::upgrade) {
            return existing;
        }
        let child = cache().intern_transition(self, name, kind, attributes);
        self.transitions.borrow_mut().insert(key, Arc::downgrade(&child));
        child
    }
}

impl std::fmt::Debug for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shape")
            .field("id", &self.id)
            .field("property_count", &self.properties.len())
            .field("state", &self.state.get())
            .finish()
    }
}

/// Process-wide cache that guarantees two unrelated transition trees
/// arriving at "same parent, same name, same attributes" converge on one
/// `Shape` instance — this is what makes `{x:1,y:2}` object literals built
/// from scratch in different call sites compare `===` by shape (spec.md
/// §8 scenario 1).
pub struct ShapeCache {
    root: Arc<Shape>,
    by_key: RefCell<FxHashMap<TransitionKey, Weak<Shape>>>,
}

// SAFETY: see Shape; thread-confined per Context/process convention.
unsafe impl Send for ShapeCache {}
unsafe impl Sync for ShapeCache {}

impl ShapeCache {
    fn new() -> Self {
        Self { root: Shape::new(None, Vec::new()), by_key: RefCell::new(FxHashMap::default()) }
    }

    /// The shared empty/root shape every fresh object starts from.
    pub fn root(&self) -> Arc<Shape> {
        self.root.clone()
    }

    fn intern_transition(
        &self,
        parent: &Arc<Shape>,
        name: PropertyKey,
        kind: SlotKind,
        attributes: Attributes,
    ) -> Arc<Shape> {
        let key = TransitionKey {
            parent_id: parent.id,
            name: PropertyKeyHashable(name.clone()),
            kind,
            writable: attributes.writable,
            enumerable: attributes.enumerable,
            configurable: attributes.configurable,
        };
        if let Some(existing) = self.by_key.borrow().get(&key).and_then(Weak::upgrade) {
            return existing;
        }
        let slot = parent.property_count();
        let mut properties = parent.properties.clone();
        properties.push(ShapeProperty { name, slot, kind, attributes });
        let child = Shape::new(Some(parent.clone()), properties);
        self.by_key.borrow_mut().insert(key, Arc::downgrade(&child));
        child
    }
}

/// The single process-wide cache. Append-only for its lifetime per
/// spec.md §5: entries are never mutated once visible, only looked up or
/// (via `Weak`) allowed to expire when no shape/object references them.
pub fn cache() -> &'static ShapeCache {
    static CACHE: OnceLock<ShapeCache> = OnceLock::new();
    CACHE.get_or_init(ShapeCache::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_property_sequences_share_a_shape() {
        let root = cache().root();
        let a = root.transition(PropertyKey::string("x"), SlotKind::Data, Attributes::data());
        let a = a.transition(PropertyKey::string("y"), SlotKind::Data, Attributes::data());

        let root2 = cache().root();
        let b = root2.transition(PropertyKey::string("x"), SlotKind::Data, Attributes::data());
        let b = b.transition(PropertyKey::string("y"), SlotKind::Data, Attributes::data());

        assert_eq!(a.id(), b.id());
    }

    #[test]
    fn transition_slot_equals_parent_property_count() {
        let root = cache().root();
        let child = root.transition(PropertyKey::string("z"), SlotKind::Data, Attributes::data());
        assert_eq!(child.slot_of(&PropertyKey::string("z")), Some(root.property_count()));
    }
}
