//! JavaScript `Symbol` values.

use kestrel_gc::GcTraceable;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SYMBOL_ID: AtomicU64 = AtomicU64::new(1);

/// A globally unique identity, optionally carrying a description.
///
/// Equality and hashing are by `id` alone — two symbols with the same
/// description are still distinct, per spec.md §3.
#[derive(Debug)]
pub struct Symbol {
    /// The string passed to `Symbol(description)`, if any.
    pub description: Option<String>,
    id: u64,
}

impl Symbol {
    /// Allocate a fresh, never-before-seen symbol.
    pub fn new(description: Option<String>) -> Self {
        Self {
            description,
            id: NEXT_SYMBOL_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Stable identity, used for equality/hash and debug output.
    pub fn id(&self) -> u64 {
        self.id
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
impl Eq for Symbol {}

impl std::hash::Hash for Symbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u64(self.id);
    }
}

impl GcTraceable for Symbol {
    const NEEDS_TRACE: bool = false;
}

/// Registry backing `Symbol.for` / `Symbol.keyFor` — separate from the
/// per-call `Symbol(desc)` constructor, which always mints a fresh id.
pub struct SymbolRegistry {
    by_key: parking_lot::Mutex<rustc_hash::FxHashMap<String, kestrel_gc::GcRef<Symbol>>>,
}

impl SymbolRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self {
            by_key: parking_lot::Mutex::new(rustc_hash::FxHashMap::default()),
        }
    }

    /// `Symbol.for(key)`: returns the shared symbol for `key`, minting one
    /// on first use.
    pub fn for_key(&self, key: &str) -> kestrel_gc::GcRef<Symbol> {
        let mut table = self.by_key.lock();
        table
            .entry(key.to_string())
            .or_insert_with(|| kestrel_gc::GcRef::new(Symbol::new(Some(key.to_string()))))
            .clone()
    }
}

impl Default for SymbolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Well-known symbols the engine itself consults (spec.md §4.3 `for-of`
/// consumes `Symbol.iterator`). Process-wide and append-only like the
/// shape/string interners (spec.md §5), minted once on first access.
pub mod well_known {
    use super::Symbol;
    use kestrel_gc::GcRef;
    use std::sync::OnceLock;

    pub fn iterator() -> GcRef<Symbol> {
        static SYM: OnceLock<GcRef<Symbol>> = OnceLock::new();
        SYM.get_or_init(|| GcRef::new(Symbol::new(Some("Symbol.iterator".to_string())))).clone()
    }

    pub fn to_primitive() -> GcRef<Symbol> {
        static SYM: OnceLock<GcRef<Symbol>> = OnceLock::new();
        SYM.get_or_init(|| GcRef::new(Symbol::new(Some("Symbol.toPrimitive".to_string())))).clone()
    }
}
