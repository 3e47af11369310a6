//! A compiled function: the register file size, its constant pool, and
//! its instruction stream (spec.md §4.5).
//!
//! Grounded on `otter-vm-bytecode::function::Function`/`FunctionBuilder`,
//! trimmed to the fields this tier's scoped compiler (`compiler.rs`)
//! actually populates — no upvalue-capture table, flags, or source map,
//! since a bytecode-compiled function here is always a flat, self-
//! contained body (closures/generators/async stay at the `Interpreter`
//! tier).

use crate::constant::ConstantPool;
use crate::instruction::Instruction;

#[derive(Debug, Clone)]
pub struct CompiledFunction {
    pub name: String,
    pub param_names: Vec<String>,
    pub register_count: u16,
    pub constants: ConstantPool,
    pub instructions: Vec<Instruction>,
}

impl CompiledFunction {
    pub fn display_name(&self) -> &str {
        if self.name.is_empty() { "<anonymous>" } else { &self.name }
    }
}
