//! Bytecode-tier errors: compile-time rejection of an unsupported AST
//! shape, and the runtime outcome of trying to run a compiled function.

use thiserror::Error;

/// Why [`crate::compiler::compile_function`] declined to compile a
/// function body. Not a language-visible error (spec.md §4.5: "JIT
/// failures: degrade silently; never change observable behaviour") — the
/// caller just keeps tree-walking at the `Interpreter` tier.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CompileError {
    #[error("unsupported syntax in bytecode tier: {0}")]
    Unsupported(&'static str),
    #[error("too many locals for a single bytecode function")]
    TooManyLocals,
}

#[derive(Debug, Error)]
pub enum JumpError {
    #[error("invalid jump target from pc {pc} with offset {offset} (len={instruction_count})")]
    InvalidJumpTarget { pc: usize, offset: i32, instruction_count: usize },
}
