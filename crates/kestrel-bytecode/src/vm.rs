//! Register-machine dispatch loop (spec.md §4.5).
//!
//! Grounded on `otter-vm-jit::translator`'s per-pc instruction walk, but
//! interpreted rather than JIT-compiled: every [`Instruction`] is executed
//! directly against a `Vec<Value>` register file, with operator and
//! variable semantics delegated to the embedding [`Host`] so results are
//! identical to the tree-walking tier (spec.md §8: "observable result
//! ... identical at every tier").

use crate::constant::Constant;
use crate::error::JumpError;
use crate::function::CompiledFunction;
use crate::host::Host;
use crate::instruction::Instruction;
use kestrel_core::{Value, VmError, VmResult};

pub fn run(function: &CompiledFunction, args: &[Value], host: &dyn Host) -> VmResult<Value> {
    let mut registers: Vec<Value> = vec![Value::Undefined; function.register_count as usize];
    for (i, name) in function.param_names.iter().enumerate() {
        let _ = name;
        if let Some(v) = args.get(i) {
            registers[i] = v.clone();
        }
    }

    let instructions = &function.instructions;
    let mut pc: usize = 0;
    loop {
        let Some(instr) = instructions.get(pc) else {
            return Ok(Value::Undefined);
        };
        match instr {
            Instruction::LoadUndefined { dst } => registers[dst.index()] = Value::Undefined,
            Instruction::LoadNull { dst } => registers[dst.index()] = Value::Null,
            Instruction::LoadTrue { dst } => registers[dst.index()] = Value::Boolean(true),
            Instruction::LoadFalse { dst } => registers[dst.index()] = Value::Boolean(false),
            Instruction::LoadConst { dst, idx } => {
                let c = function
                    .constants
                    .get(*idx)
                    .ok_or_else(|| VmError::internal("bytecode constant index out of range"))?;
                registers[dst.index()] = match c {
                    Constant::Number(n) => Value::Number(*n),
                    Constant::String(s) => Value::string(s.as_str()),
                };
            }
            Instruction::GetVar { dst, name } => {
                let name = constant_str(function, *name)?;
                registers[dst.index()] = host.get_variable(name)?;
            }
            Instruction::SetVar { name, src } => {
                let name = constant_str(function, *name)?;
                host.set_variable(name, registers[src.index()].clone())?;
            }
            Instruction::Binary { op, dst, lhs, rhs } => {
                let result = host.binary(*op, &registers[lhs.index()], &registers[rhs.index()])?;
                registers[dst.index()] = result;
            }
            Instruction::Neg { dst, src } => {
                registers[dst.index()] = host.unary_neg(&registers[src.index()])?;
            }
            Instruction::Not { dst, src } => {
                registers[dst.index()] = Value::Boolean(!registers[src.index()].to_boolean());
            }
            Instruction::Move { dst, src } => registers[dst.index()] = registers[src.index()].clone(),
            Instruction::Jump { offset } => {
                pc = jump_target(pc, offset.offset(), instructions.len())?;
                continue;
            }
            Instruction::JumpIfFalse { cond, offset } => {
                if !registers[cond.index()].to_boolean() {
                    pc = jump_target(pc, offset.offset(), instructions.len())?;
                    continue;
                }
            }
            Instruction::JumpIfTrue { cond, offset } => {
                if registers[cond.index()].to_boolean() {
                    pc = jump_target(pc, offset.offset(), instructions.len())?;
                    continue;
                }
            }
            Instruction::Call { dst, callee, first_arg, arg_count } => {
                let callee_value = registers[callee.index()].clone();
                let start = first_arg.index();
                let call_args = registers[start..start + *arg_count as usize].to_vec();
                let result = host.call(&callee_value, &Value::Undefined, &call_args)?;
                registers[dst.index()] = result;
            }
            Instruction::Return { src } => return Ok(registers[src.index()].clone()),
            Instruction::ReturnUndefined => return Ok(Value::Undefined),
            Instruction::Nop => {}
        }
        pc += 1;
    }
}

fn constant_str(function: &CompiledFunction, idx: crate::operand::ConstantIndex) -> VmResult<&str> {
    match function.constants.get(idx) {
        Some(Constant::String(s)) => Ok(s.as_str()),
        _ => Err(VmError::internal("bytecode expected string constant")),
    }
}

fn jump_target(pc: usize, offset: i32, instruction_count: usize) -> VmResult<usize> {
    let target = pc as i64 + offset as i64;
    if target < 0 || target as usize > instruction_count {
        return Err(VmError::internal(
            JumpError::InvalidJumpTarget { pc, offset, instruction_count }.to_string(),
        ));
    }
    Ok(target as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::compile_function;
    use kestrel_core::VmError;
    use kestrel_parser::Parser;
    use kestrel_parser::Statement;
    use std::cell::RefCell;

    struct NullHost;
    impl Host for NullHost {
        fn get_variable(&self, name: &str) -> VmResult<Value> {
            Err(VmError::reference_error(format!("{name} is not defined")))
        }
        fn set_variable(&self, _name: &str, _value: Value) -> VmResult<()> {
            Ok(())
        }
        fn call(&self, _callee: &Value, _this: &Value, _args: &[Value]) -> VmResult<Value> {
            Err(VmError::internal("no calls in this test"))
        }
        fn binary(&self, op: crate::instruction::BinOp, lhs: &Value, rhs: &Value) -> VmResult<Value> {
            use crate::instruction::BinOp;
            let (Value::Number(a), Value::Number(b)) = (lhs, rhs) else {
                return Err(VmError::internal("test host only supports numbers"));
            };
            Ok(match op {
                BinOp::Add => Value::Number(a + b),
                BinOp::Sub => Value::Number(a - b),
                BinOp::Mul => Value::Number(a * b),
                BinOp::Div => Value::Number(a / b),
                BinOp::Mod => Value::Number(a % b),
                BinOp::Lt => Value::Boolean(a < b),
                BinOp::Le => Value::Boolean(a <= b),
                BinOp::Gt => Value::Boolean(a > b),
                BinOp::Ge => Value::Boolean(a >= b),
                BinOp::Eq | BinOp::StrictEq => Value::Boolean(a == b),
                BinOp::Ne | BinOp::StrictNe => Value::Boolean(a != b),
            })
        }
        fn unary_neg(&self, value: &Value) -> VmResult<Value> {
            match value {
                Value::Number(n) => Ok(Value::Number(-n)),
                _ => Err(VmError::internal("test host only supports numbers")),
            }
        }
    }

    fn compile(src: &str) -> CompiledFunction {
        let (program, errors) = Parser::parse_program(src, 0);
        assert!(errors.is_empty(), "{errors:?}");
        let Statement::FunctionDecl(f) = &program.body[0] else { panic!("expected function") };
        compile_function(f).expect("compile")
    }

    #[test]
    fn runs_square_function() {
        let f = compile("function f(x) { return x * x; }");
        let host = NullHost;
        let result = run(&f, &[Value::Number(7.0)], &host).unwrap();
        assert_eq!(result.as_number(), Some(49.0));
    }

    #[test]
    fn runs_counted_sum_loop() {
        let f = compile("function f() { let s = 0; for (let i = 0; i < 10; i = i + 1) { s = s + i; } return s; }");
        let host = NullHost;
        let result = run(&f, &[], &host).unwrap();
        assert_eq!(result.as_number(), Some(45.0));
    }

    #[test]
    fn free_variable_reads_go_through_host() {
        struct RecordingHost(RefCell<Vec<String>>);
        impl Host for RecordingHost {
            fn get_variable(&self, name: &str) -> VmResult<Value> {
                self.0.borrow_mut().push(name.to_string());
                Ok(Value::Number(10.0))
            }
            fn set_variable(&self, _name: &str, _value: Value) -> VmResult<()> {
                Ok(())
            }
            fn call(&self, _c: &Value, _t: &Value, _a: &[Value]) -> VmResult<Value> {
                unreachable!()
            }
            fn binary(&self, op: crate::instruction::BinOp, lhs: &Value, rhs: &Value) -> VmResult<Value> {
                NullHost.binary(op, lhs, rhs)
            }
            fn unary_neg(&self, v: &Value) -> VmResult<Value> {
                NullHost.unary_neg(v)
            }
        }
        let f = compile("function f() { return outer + 1; }");
        let host = RecordingHost(RefCell::new(Vec::new()));
        let result = run(&f, &[], &host).unwrap();
        assert_eq!(result.as_number(), Some(11.0));
        assert_eq!(host.0.into_inner(), vec!["outer".to_string()]);
    }
}
