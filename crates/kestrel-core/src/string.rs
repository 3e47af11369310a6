//! Interned JavaScript strings.
//!
//! Equal contents always share one allocation: the process-wide interner
//! is a `DashMap` keyed by content, so `intern(s) == intern(s)` holds by
//! pointer identity and the FNV-ish hash carried on `JsString` is computed
//! once and memoised.

use dashmap::DashMap;
use kestrel_gc::{GcHeader, GcRef, GcTraceable};
use std::sync::OnceLock;

/// An interned, immutable string.
///
/// Indexing and length follow ECMAScript: the string is stored as UTF-8
/// but `len_utf16` / `char_at_utf16` expose the UTF-16 code-unit view
/// scripts observe through `.length` and bracket indexing.
pub struct JsString {
    data: String,
    utf16: Vec<u16>,
    hash: u64,
}

impl GcTraceable for JsString {
    const NEEDS_TRACE: bool = false;
}

impl JsString {
    fn new(s: &str) -> Self {
        let utf16: Vec<u16> = s.encode_utf16().collect();
        let hash = fnv1a(s.as_bytes());
        Self {
            data: s.to_string(),
            utf16,
            hash,
        }
    }

    /// Borrow the UTF-8 content.
    pub fn as_str(&self) -> &str {
        &self.data
    }

    /// ECMAScript `.length`: number of UTF-16 code units.
    pub fn len_utf16(&self) -> usize {
        self.utf16.len()
    }

    /// `true` if the string contains no code units.
    pub fn is_empty(&self) -> bool {
        self.utf16.is_empty()
    }

    /// UTF-16 code unit at `index`, or `None` if out of range.
    pub fn code_unit_at(&self, index: usize) -> Option<u16> {
        self.utf16.get(index).copied()
    }

    /// Memoised content hash.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    /// Concatenate two strings, producing a new interned string.
    pub fn concat(a: &JsString, b: &JsString) -> GcRef<JsString> {
        let mut s = String::with_capacity(a.data.len() + b.data.len());
        s.push_str(&a.data);
        s.push_str(&b.data);
        JsString::intern(&s)
    }

    /// Look up or create the interned instance for `s`.
    pub fn intern(s: &str) -> GcRef<JsString> {
        table().entry(s.to_string()).or_insert_with(|| JsString::new(s).into_gc()).clone()
    }
}

/// Hack: `JsString::new` followed by wrapping in `GcRef` needs the
/// allocation to happen exactly once per unique content. We can't put a
/// `GcRef` behind `DashMap::or_insert_with` directly without first
/// constructing it, so this helper exists purely to keep `intern` legible.
impl JsString {
    fn into_gc(self) -> GcRef<JsString> {
        GcRef::new(self)
    }
}

fn table() -> &'static DashMap<String, GcRef<JsString>> {
    static TABLE: OnceLock<DashMap<String, GcRef<JsString>>> = OnceLock::new();
    TABLE.get_or_init(DashMap::new)
}

/// Drop every interned string. Exposed for tests that want a clean slate;
/// never called by the runtime itself (strings live for the process).
pub fn clear_global_string_table() {
    table().clear();
}

/// Number of distinct interned strings, for diagnostics/tests.
pub fn global_string_table_size() -> usize {
    table().len()
}

impl PartialEq for JsString {
    fn eq(&self, other: &Self) -> bool {
        self.hash == other.hash && self.data == other.data
    }
}
impl Eq for JsString {}

impl std::hash::Hash for JsString {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        state.write_u64(self.hash);
    }
}

impl std::fmt::Debug for JsString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self.data)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    const OFFSET: u64 = 0xcbf29ce484222325;
    const PRIME: u64 = 0x100000001b3;
    let mut hash = OFFSET;
    for &b in bytes {
        hash ^= b as u64;
        hash = hash.wrapping_mul(PRIME);
    }
    hash
}

// SAFETY: JsString holds no interior mutability; sharing across threads is
// confined by convention to one VM thread, matching `Value`/`GcRef`.
unsafe impl Send for JsString {}
unsafe impl Sync for JsString {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_shares_one_instance() {
        let a = JsString::intern("hello");
        let b = JsString::intern("hello");
        assert!(a.ptr_eq(&b));
        assert_eq!(a.hash(), b.hash());
    }

    #[test]
    fn utf16_length_counts_surrogate_pairs_as_two() {
        let s = JsString::intern("a\u{1F600}b"); // emoji is a surrogate pair
        assert_eq!(s.len_utf16(), 4);
    }
}
