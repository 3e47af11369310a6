//! Register bytecode ISA, AST compiler, and dispatch-loop VM for the
//! `Bytecode` accelerator tier (spec.md §4.5).

pub mod compiler;
pub mod constant;
pub mod error;
pub mod function;
pub mod host;
pub mod instruction;
pub mod operand;
pub mod vm;

pub use compiler::compile_function;
pub use constant::{Constant, ConstantPool};
pub use error::{CompileError, JumpError};
pub use function::CompiledFunction;
pub use host::Host;
pub use instruction::{BinOp, Instruction};
pub use operand::{ConstantIndex, JumpOffset, Register};
pub use vm::run;
