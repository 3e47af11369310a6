//! Mark-and-cycle-break collection pass.

use crate::header::GcHeader;
use crate::registry::with_registry;
use rustc_hash::FxHashMap;

/// Summary of one [`Collector::collect`] pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct GcStats {
    /// Allocations registered at the start of the pass.
    pub live_before: usize,
    /// Allocations reached from the supplied roots.
    pub reachable: usize,
    /// Allocations that were unreachable and had their internal
    /// references cleared to break a reference cycle.
    pub cycles_broken: usize,
}

/// Drives mark-and-sweep passes over the thread-local allocation registry.
///
/// Reclamation itself is ordinary `Rc` drop: once a cycle's internal
/// references are cleared by [`crate::GcTraceable::break_cycle`], the
/// normal strong-count bookkeeping frees the allocations on the next
/// `GcRef` drop. This collector's job is only to find cycles that
/// `Rc` alone cannot see.
pub struct Collector;

impl Collector {
    /// Run one collection pass.
    ///
    /// `mark_roots` is called once with a callback the caller invokes for
    /// every GC root header (global object, active environment chain,
    /// call-stack captures, outstanding host handles). Typically this is
    /// `Context`/`MemoryManager` code in `kestrel-core`, which is the only
    /// place that knows what the roots are.
    pub fn collect(mark_roots: impl FnOnce(&mut dyn FnMut(&GcHeader))) -> GcStats {
        with_registry(|nodes| {
            for n in nodes {
                n.with_header(&mut |h| h.clear_mark());
            }

            let mut by_key: FxHashMap<usize, usize> = FxHashMap::default();
            for (i, n) in nodes.iter().enumerate() {
                n.with_header(&mut |h| {
                    by_key.insert(h as *const GcHeader as usize, i);
                });
            }

            let mut worklist: Vec<usize> = Vec::new();
            mark_roots(&mut |h| {
                if h.mark() {
                    worklist.push(h as *const GcHeader as usize);
                }
            });

            while let Some(key) = worklist.pop() {
                let Some(&idx) = by_key.get(&key) else {
                    continue;
                };
                if !nodes[idx].needs_trace() {
                    continue;
                }
                nodes[idx].trace_children(&mut |child| {
                    if child.mark() {
                        worklist.push(child as *const GcHeader as usize);
                    }
                });
            }

            let mut reachable = 0;
            let mut cycles_broken = 0;
            for n in nodes.iter() {
                let mut marked = false;
                n.with_header(&mut |h| marked = h.is_marked());
                if marked {
                    reachable += 1;
                } else if n.needs_trace() {
                    n.break_cycle();
                    cycles_broken += 1;
                }
            }

            GcStats {
                live_before: nodes.len(),
                reachable,
                cycles_broken,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gcref::GcRef;
    use crate::traceable::GcTraceable;
    use std::cell::RefCell;

    struct Node {
        next: RefCell<Option<GcRef<Node>>>,
        tag: u32,
    }

    impl GcTraceable for Node {
        const NEEDS_TRACE: bool = true;
        fn trace(&self, tracer: &mut dyn FnMut(&GcHeader)) {
            if let Some(n) = self.next.borrow().as_ref() {
                tracer(n.header());
            }
        }
        fn break_cycle(&self) {
            *self.next.borrow_mut() = None;
        }
    }

    #[test]
    fn unreachable_self_cycle_is_broken() {
        let a = GcRef::new(Node {
            next: RefCell::new(None),
            tag: 1,
        });
        let b = GcRef::new(Node {
            next: RefCell::new(Some(a.clone())),
            tag: 2,
        });
        *a.next.borrow_mut() = Some(b.clone());
        drop(a);
        drop(b);

        let stats = Collector::collect(|_mark| {});
        assert_eq!(stats.reachable, 0);
        assert!(stats.cycles_broken >= 1);
    }

    #[test]
    fn rooted_chain_survives() {
        let a = GcRef::new(Node {
            next: RefCell::new(None),
            tag: 10,
        });
        let b = GcRef::new(Node {
            next: RefCell::new(Some(a.clone())),
            tag: 20,
        });
        let root = b.clone();

        let stats = Collector::collect(|mark| mark(root.header()));
        assert_eq!(stats.cycles_broken, 0);
        assert!(stats.reachable >= 2);
    }
}
