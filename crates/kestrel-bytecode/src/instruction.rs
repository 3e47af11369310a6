//! The bytecode instruction set (spec.md §4.5): "load constant, load/
//! store variable, arithmetic on numbers and integers, comparison,
//! branch, call, return".
//!
//! Grounded on `otter-vm-bytecode::instruction::Instruction`'s decoded
//! enum-with-operands shape, trimmed to exactly the opcodes spec.md
//! names plus the mechanical `Move`/`Nop`/`Pop` the compiler needs to
//! wire registers together. Binary/unary semantic opcodes carry no
//! type-specialization of their own at this tier (that is the
//! `Optimized` tier's job, in `kestrel-jit`) — they are dispatched
//! through [`crate::host::Host::binary`] / [`crate::host::Host::unary_neg`]
//! so the bytecode tier reuses the interpreter's exact operator
//! semantics instead of re-deriving ECMAScript coercion rules a second
//! time (spec.md §8: "observable result ... identical at every tier").

use crate::operand::{ConstantIndex, JumpOffset, Register};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    LoadUndefined { dst: Register },
    LoadNull { dst: Register },
    LoadTrue { dst: Register },
    LoadFalse { dst: Register },
    LoadConst { dst: Register, idx: ConstantIndex },

    /// Reads a named variable through the enclosing call's environment
    /// chain (spec.md §4.3: locals, closure captures, and globals are all
    /// just environment-chain lookups, so the bytecode tier does not
    /// distinguish them at compile time).
    GetVar { dst: Register, name: ConstantIndex },
    SetVar { name: ConstantIndex, src: Register },

    Binary { op: BinOp, dst: Register, lhs: Register, rhs: Register },
    Neg { dst: Register, src: Register },
    Not { dst: Register, src: Register },

    Move { dst: Register, src: Register },

    Jump { offset: JumpOffset },
    JumpIfFalse { cond: Register, offset: JumpOffset },
    JumpIfTrue { cond: Register, offset: JumpOffset },

    /// `dst = callee(args...)`; `args` names a contiguous register range
    /// `[first, first+count)`. Delegates to
    /// [`crate::host::Host::call`] — the callee's own body still runs
    /// through whichever tier it is individually at, per spec.md §4.5's
    /// per-AST-node tiering granularity.
    Call { dst: Register, callee: Register, first_arg: Register, arg_count: u16 },

    Return { src: Register },
    ReturnUndefined,
    Nop,
}
