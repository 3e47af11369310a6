//! Bytecode operand types (spec.md §4.5: "a small register-based
//! instruction set").
//!
//! Grounded on `otter-vm-bytecode::operand`, trimmed to newtypes actually
//! produced by [`crate::compiler`] — no module/upvalue indices, since
//! this tier compiles one self-contained function body at a time (see
//! `compiler.rs` module doc for the scoping rationale).

/// A virtual register holding one [`kestrel_core::Value`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct Register(pub u16);

impl Register {
    #[inline]
    pub const fn new(index: u16) -> Self {
        Self(index)
    }

    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Index into a function's [`crate::constant::ConstantPool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct ConstantIndex(pub u32);

impl ConstantIndex {
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Signed jump offset in instruction units, relative to the jump's own
/// program counter — matches the teacher's `JumpOffset` semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(transparent)]
pub struct JumpOffset(pub i32);

impl JumpOffset {
    #[inline]
    pub const fn offset(self) -> i32 {
        self.0
    }
}
