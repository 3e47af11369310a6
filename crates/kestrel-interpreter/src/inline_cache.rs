//! Per-property-access-site inline cache (spec.md §3): `{shape_id,
//! slot_index, name, hit_count, valid}`, primary plus one secondary
//! entry (a tiny 2-way set-associative cache), so megamorphic sites
//! still get some reuse instead of thrashing a single slot.

use kestrel_core::PropertyKey;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub shape_id: u64,
    pub slot_index: usize,
    pub hit_count: u64,
    pub valid: bool,
}

#[derive(Debug, Clone, Default)]
pub struct InlineCache {
    primary: Option<CacheEntry>,
    secondary: Option<CacheEntry>,
}

impl InlineCache {
    /// `O(1)` lookup when `shape_id` matches a populated entry; bypasses
    /// the shape's name map entirely, per spec.md's contract.
    pub fn lookup(&mut self, shape_id: u64) -> Option<usize> {
        if let Some(entry) = &mut self.primary {
            if entry.valid && entry.shape_id == shape_id {
                entry.hit_count += 1;
                return Some(entry.slot_index);
            }
        }
        if let Some(entry) = &mut self.secondary {
            if entry.valid && entry.shape_id == shape_id {
                entry.hit_count += 1;
                // Promote a secondary hit to primary: the more common
                // shape at a polymorphic site should win the O(1) slot.
                let entry = entry.clone();
                self.secondary = self.primary.take();
                self.primary = Some(entry);
                return self.primary.as_ref().map(|e| e.slot_index);
            }
        }
        None
    }

    pub fn populate(&mut self, shape_id: u64, slot_index: usize) {
        if self.primary.as_ref().is_some_and(|e| e.shape_id == shape_id) {
            return;
        }
        let new_entry = CacheEntry { shape_id, slot_index, hit_count: 0, valid: true };
        self.secondary = self.primary.take();
        self.primary = Some(new_entry);
    }

    pub fn invalidate(&mut self) {
        if let Some(e) = &mut self.primary {
            e.valid = false;
        }
        if let Some(e) = &mut self.secondary {
            e.valid = false;
        }
    }
}

/// Per-site inline caches keyed by the property name, since a single
/// member-access AST node only ever reads one name but may see many
/// shapes across calls.
#[derive(Debug, Clone, Default)]
pub struct SiteCache {
    pub by_name: rustc_hash::FxHashMap<PropertyKeyOwned, InlineCache>,
}

/// `PropertyKey` borrows interned handles; this owned, hashable variant
/// lets an inline-cache site key on a name without re-interning on every
/// lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKeyOwned {
    String(String),
    Symbol(u64),
    Index(u32),
}

impl From<&PropertyKey> for PropertyKeyOwned {
    fn from(key: &PropertyKey) -> Self {
        match key {
            PropertyKey::String(s) => PropertyKeyOwned::String(s.as_str().to_string()),
            PropertyKey::Symbol(s) => PropertyKeyOwned::Symbol(s.id()),
            PropertyKey::Index(i) => PropertyKeyOwned::Index(*i),
        }
    }
}

impl SiteCache {
    pub fn for_key(&mut self, key: &PropertyKey) -> &mut InlineCache {
        self.by_name.entry(PropertyKeyOwned::from(key)).or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn populate_then_lookup_hits() {
        let mut ic = InlineCache::default();
        ic.populate(7, 2);
        assert_eq!(ic.lookup(7), Some(2));
    }

    #[test]
    fn mismatched_shape_misses() {
        let mut ic = InlineCache::default();
        ic.populate(7, 2);
        assert_eq!(ic.lookup(9), None);
    }

    #[test]
    fn secondary_slot_survives_a_second_shape() {
        let mut ic = InlineCache::default();
        ic.populate(1, 0);
        ic.populate(2, 1);
        assert_eq!(ic.lookup(1), Some(0));
        assert_eq!(ic.lookup(2), Some(1));
    }
}
