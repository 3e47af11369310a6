//! Per-site execution counters driving the tiered accelerator (spec.md
//! §3 `TypeFeedback`, §4.5).

use rustc_hash::FxHashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Symbol,
    BigInt,
    Object,
    Function,
}

impl PrimitiveKind {
    pub fn of(value: &kestrel_core::Value) -> Self {
        use kestrel_core::Value as V;
        match value {
            V::Undefined => Self::Undefined,
            V::Null => Self::Null,
            V::Boolean(_) => Self::Boolean,
            V::Number(_) => Self::Number,
            V::String(_) => Self::String,
            V::Symbol(_) => Self::Symbol,
            V::BigInt(_) => Self::BigInt,
            V::Object(o) if o.is_callable() => Self::Function,
            V::Object(_) => Self::Object,
        }
    }
}

/// Sample counts for one AST node, keyed by the primitive kind observed
/// on each evaluation. Minimum 10 samples and >95% agreement is
/// considered monomorphic (spec.md §3).
#[derive(Default, Debug, Clone)]
pub struct TypeFeedback {
    counts: FxHashMap<PrimitiveKind, u64>,
}

impl TypeFeedback {
    pub fn record(&mut self, kind: PrimitiveKind) {
        *self.counts.entry(kind).or_insert(0) += 1;
    }

    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// The dominant kind, if sampling supports calling this site
    /// monomorphic.
    pub fn monomorphic_kind(&self) -> Option<PrimitiveKind> {
        let total = self.total();
        if total < 10 {
            return None;
        }
        self.counts.iter().max_by_key(|(_, c)| **c).and_then(|(kind, count)| {
            if (*count as f64) / (total as f64) > 0.95 {
                Some(*kind)
            } else {
                None
            }
        })
    }
}

/// Execution-count feedback for a call expression site: how many times
/// it fired and against which callee identity, used to decide tier-up
/// (spec.md §4.5).
#[derive(Debug, Clone, Default)]
pub struct CallSiteFeedback {
    pub call_count: u64,
    pub last_callee_shape_id: Option<u64>,
    pub polymorphic: bool,
}

impl CallSiteFeedback {
    pub fn record(&mut self, callee_shape_id: Option<u64>) {
        self.call_count += 1;
        match (self.last_callee_shape_id, callee_shape_id) {
            (Some(prev), Some(next)) if prev != next => self.polymorphic = true,
            _ => {}
        }
        if callee_shape_id.is_some() {
            self.last_callee_shape_id = callee_shape_id;
        }
    }
}

/// Tier-up thresholds (spec.md §4.5 defaults: 100 / 1000 / 10000).
#[derive(Debug, Clone, Copy)]
pub struct JitThresholds {
    pub bytecode: u64,
    pub optimized: u64,
    pub machine_code: u64,
}

impl Default for JitThresholds {
    fn default() -> Self {
        Self { bytecode: 100, optimized: 1_000, machine_code: 10_000 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Interpreter,
    Bytecode,
    Optimized,
    MachineCode,
}

/// All the feedback and tier state the accelerator keeps per AST node,
/// keyed externally (by the node's stable pointer identity) in
/// `Context::jit_state`.
#[derive(Debug, Clone)]
pub struct NodeAccelState {
    pub executions: u64,
    pub tier: Tier,
    pub feedback: TypeFeedback,
    pub call_feedback: CallSiteFeedback,
    /// Number of guard failures at `Optimized`; once this crosses a small
    /// threshold, re-promotion is permanently blocked (spec.md §4.5).
    pub deopt_count: u32,
    pub blocked: bool,
}

impl Default for NodeAccelState {
    fn default() -> Self {
        Self {
            executions: 0,
            tier: Tier::Interpreter,
            feedback: TypeFeedback::default(),
            call_feedback: CallSiteFeedback::default(),
            deopt_count: 0,
            blocked: false,
        }
    }
}

impl NodeAccelState {
    /// Record one more execution and move up a tier if its threshold is
    /// crossed and promotion isn't blocked by repeated deopts.
    pub fn record_execution(&mut self, thresholds: &JitThresholds) {
        self.executions += 1;
        if self.blocked {
            return;
        }
        self.tier = match self.tier {
            Tier::Interpreter if self.executions >= thresholds.bytecode => Tier::Bytecode,
            Tier::Bytecode if self.executions >= thresholds.optimized => Tier::Optimized,
            Tier::Optimized if self.executions >= thresholds.machine_code => Tier::MachineCode,
            t => t,
        };
    }

    /// A guard at the `Optimized` tier failed: fall back to `Bytecode`
    /// and, after repeated failures, block future promotion of this site
    /// (spec.md §4.5).
    pub fn deoptimize(&mut self) {
        self.tier = Tier::Bytecode;
        self.deopt_count += 1;
        if self.deopt_count >= 3 {
            self.blocked = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monomorphic_requires_ten_samples_and_ninety_five_percent() {
        let mut fb = TypeFeedback::default();
        for _ in 0..9 {
            fb.record(PrimitiveKind::Number);
        }
        assert_eq!(fb.monomorphic_kind(), None);
        fb.record(PrimitiveKind::Number);
        assert_eq!(fb.monomorphic_kind(), Some(PrimitiveKind::Number));
    }

    #[test]
    fn tier_up_respects_thresholds() {
        let thresholds = JitThresholds { bytecode: 2, optimized: 4, machine_code: 6 };
        let mut state = NodeAccelState::default();
        state.record_execution(&thresholds);
        assert_eq!(state.tier, Tier::Interpreter);
        state.record_execution(&thresholds);
        assert_eq!(state.tier, Tier::Bytecode);
    }

    #[test]
    fn repeated_deopt_blocks_repromotion() {
        let mut state = NodeAccelState::default();
        state.deoptimize();
        state.deoptimize();
        state.deoptimize();
        assert!(state.blocked);
    }
}
