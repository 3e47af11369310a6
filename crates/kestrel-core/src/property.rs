//! Property keys, attributes, and live per-slot descriptors.

use crate::string::JsString;
use crate::symbol::Symbol;
use kestrel_gc::GcRef;

/// A property key: a string, a symbol, or (for dense array storage) a
/// numeric index. Arrays keep index keys out of the named-property store
/// entirely — see `crate::object::JsObject`'s element vector — but
/// `PropertyKey::Index` still exists so code paths that go through the
/// generic `get`/`set` (e.g. `for-in`, `Reflect.ownKeys`) can name either.
#[derive(Clone, Debug)]
pub enum PropertyKey {
    String(GcRef<JsString>),
    Symbol(GcRef<Symbol>),
    Index(u32),
}

impl PropertyKey {
    pub fn string(s: &str) -> Self {
        Self::String(JsString::intern(s))
    }

    pub fn index(i: u32) -> Self {
        Self::Index(i)
    }

    /// A string property key whose content is itself a base-10 array
    /// index (e.g. `"3"`), or `None` otherwise. Used to decide whether a
    /// `set`/`get` on a string key should route through array storage.
    pub fn as_array_index(&self) -> Option<u32> {
        match self {
            Self::Index(i) => Some(*i),
            Self::String(s) => {
                let text = s.as_str();
                if text == "0" {
                    return Some(0);
                }
                if text.starts_with('0') || text.is_empty() {
                    return None;
                }
                text.parse::<u32>().ok()
            }
            Self::Symbol(_) => None,
        }
    }
}

impl PartialEq for PropertyKey {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::String(a), Self::String(b)) => a.ptr_eq(b) || **a == **b,
            (Self::Symbol(a), Self::Symbol(b)) => a.id() == b.id(),
            (Self::Index(a), Self::Index(b)) => a == b,
            _ => false,
        }
    }
}
impl Eq for PropertyKey {}

impl std::hash::Hash for PropertyKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        match self {
            Self::String(s) => {
                state.write_u8(0);
                state.write_u64(s.hash());
            }
            Self::Symbol(s) => {
                state.write_u8(1);
                state.write_u64(s.id());
            }
            Self::Index(i) => {
                state.write_u8(2);
                state.write_u32(*i);
            }
        }
    }
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        Self::string(s)
    }
}

/// Writable/enumerable/configurable attribute triple shared by data and
/// accessor descriptors.
#[derive(Clone, Copy, Debug)]
pub struct Attributes {
    pub writable: bool,
    pub enumerable: bool,
    pub configurable: bool,
}

impl Attributes {
    pub const fn data() -> Self {
        Self { writable: true, enumerable: true, configurable: true }
    }

    pub const fn frozen() -> Self {
        Self { writable: false, enumerable: false, configurable: false }
    }

    pub const fn non_enumerable() -> Self {
        Self { writable: true, enumerable: false, configurable: true }
    }
}

impl Default for Attributes {
    fn default() -> Self {
        Self::data()
    }
}

/// The per-slot property type recorded on a [`crate::shape::Shape`].
///
/// `Method` and `Constant` are ECMAScript class-body refinements of
/// `Data`: a method's `[[Writable]]` is true but it is never reassigned by
/// ordinary property-transition code, and a constant (e.g. a frozen class
/// field) is installed with `writable: false` from the start. Both are
/// represented as `Data` slots at the value-storage level; the distinction
/// only affects how the parser/evaluator populate the descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlotKind {
    Data,
    Accessor,
    Method,
    Constant,
}

/// The live (per-object, per-slot) value half of a property.
///
/// The key, slot index, and attributes are recorded once on the object's
/// [`crate::shape::Shape`]; this only holds what can differ per-instance.
#[derive(Clone, Debug)]
pub enum PropertyDescriptor {
    Data { value: crate::value::Value },
    Accessor { get: Option<crate::value::Value>, set: Option<crate::value::Value> },
}

impl PropertyDescriptor {
    pub fn data(value: crate::value::Value) -> Self {
        Self::Data { value }
    }

    pub fn value(&self) -> Option<&crate::value::Value> {
        match self {
            Self::Data { value } => Some(value),
            Self::Accessor { .. } => None,
        }
    }

    pub fn value_mut(&mut self) -> Option<&mut crate::value::Value> {
        match self {
            Self::Data { value } => Some(value),
            Self::Accessor { .. } => None,
        }
    }
}
