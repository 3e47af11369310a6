//! Closed-form native kernels for the two patterns in `pattern.rs`.
//!
//! Grounded on `otter-vm-jit::compiler::JitCompiler`'s `cranelift-jit`
//! wrapper (builder/module/context ownership, `declare_function` +
//! `define_function` + `finalize_definitions` sequence), but emitting a
//! fixed, hand-written kernel body per pattern kind instead of
//! translating an arbitrary bytecode stream — spec.md §4.5 describes
//! these two patterns as "emitted as closed-form code when safe", so
//! each kernel computes its result directly (Gauss's sum formula; a
//! trip-count subtraction) rather than looping in native code.
//!
//! Both kernels are compiled once per `NativeCompiler` and reused by
//! every call site that matches their pattern — the per-site state in
//! `crate::accelerator` only remembers *which* kernel a site's pattern
//! resolved to, plus that site's own bailout counter.

use cranelift_codegen::ir::condcodes::FloatCC;
use cranelift_codegen::ir::{types, AbiParam, InstBuilder, UserFuncName};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{default_libcall_names, Linkage, Module, ModuleError};

use crate::bailout::{sum_bailout, MAX_NATIVE_TRIP_COUNT, PUSH_BAILOUT};

#[derive(Debug, thiserror::Error)]
pub enum NativeError {
    #[error("cranelift module error: {0}")]
    Module(#[from] ModuleError),
    #[error("failed to initialize native code backend: {0}")]
    Builder(String),
}

/// `fn(start: f64, exclusive_bound: f64, acc_init: f64) -> f64`, computing
/// `acc_init + sum(i for i in start..exclusive_bound)` in closed form.
/// Returns the sentinel from [`crate::bailout::sum_bailout`] when the
/// trip count is negative, non-finite, or exceeds
/// [`crate::bailout::MAX_NATIVE_TRIP_COUNT`].
pub type SumKernelFn = extern "C" fn(f64, f64, f64) -> f64;

/// `fn(start: f64, exclusive_bound: f64) -> i64`, the trip count of
/// `start..exclusive_bound`, or [`crate::bailout::PUSH_BAILOUT`].
pub type PushTripKernelFn = extern "C" fn(f64, f64) -> i64;

pub struct NativeCompiler {
    module: JITModule,
    builder_ctx: FunctionBuilderContext,
    next_id: u64,
}

impl NativeCompiler {
    pub fn new() -> Result<Self, NativeError> {
        let builder = JITBuilder::new(default_libcall_names()).map_err(|e| NativeError::Builder(e.to_string()))?;
        let module = JITModule::new(builder);
        Ok(Self { module, builder_ctx: FunctionBuilderContext::new(), next_id: 0 })
    }

    fn fresh_name(&mut self, kind: &str) -> String {
        let id = self.next_id;
        self.next_id += 1;
        format!("kestrel_jit_{kind}_{id}")
    }

    pub fn compile_sum_kernel(&mut self) -> Result<SumKernelFn, NativeError> {
        let mut sig = self.module.make_signature();
        sig.params.push(AbiParam::new(types::F64));
        sig.params.push(AbiParam::new(types::F64));
        sig.params.push(AbiParam::new(types::F64));
        sig.returns.push(AbiParam::new(types::F64));

        let name = self.fresh_name("sum");
        let func_id = self.module.declare_function(&name, Linkage::Local, &sig)?;

        let mut ctx = self.module.make_context();
        ctx.func = cranelift_codegen::ir::Function::with_name_signature(UserFuncName::user(0, func_id.as_u32()), sig);

        {
            let mut builder = FunctionBuilder::new(&mut ctx.func, &mut self.builder_ctx);
            let entry = builder.create_block();
            let in_range = builder.create_block();
            let bailout = builder.create_block();

            builder.append_block_params_for_function_params(entry);
            builder.switch_to_block(entry);
            let start = builder.block_params(entry)[0];
            let bound = builder.block_params(entry)[1];
            let acc_init = builder.block_params(entry)[2];

            let n = builder.ins().fsub(bound, start);
            let zero = builder.ins().f64const(0.0);
            let max = builder.ins().f64const(MAX_NATIVE_TRIP_COUNT as f64);
            let ge_zero = builder.ins().fcmp(FloatCC::GreaterThanOrEqual, n, zero);
            let le_max = builder.ins().fcmp(FloatCC::LessThanOrEqual, n, max);
            let ok = builder.ins().band(ge_zero, le_max);
            builder.ins().brif(ok, in_range, &[], bailout, &[]);

            builder.switch_to_block(bailout);
            let sentinel = builder.ins().f64const(sum_bailout());
            builder.ins().return_(&[sentinel]);

            builder.switch_to_block(in_range);
            let one = builder.ins().f64const(1.0);
            let last = builder.ins().fsub(bound, one);
            let first_plus_last = builder.ins().fadd(start, last);
            let pair_sum = builder.ins().fmul(first_plus_last, n);
            let two = builder.ins().f64const(2.0);
            let range_sum = builder.ins().fdiv(pair_sum, two);
            let result = builder.ins().fadd(acc_init, range_sum);
            builder.ins().return_(&[result]);

            builder.seal_all_blocks();
            builder.finalize();
        }

        self.module.define_function(func_id, &mut ctx)?;
        self.module.clear_context(&mut ctx);
        self.module.finalize_definitions()?;

        let code_ptr = self.module.get_finalized_function(func_id);
        Ok(unsafe { std::mem::transmute::<*const u8, SumKernelFn>(code_ptr) })
    }

    pub fn compile_push_trip_kernel(&mut self) -> Result<PushTripKernelFn, NativeError> {
        let mut sig = self.module.make_signature();
        sig.params.push(AbiParam::new(types::F64));
        sig.params.push(AbiParam::new(types::F64));
        sig.returns.push(AbiParam::new(types::I64));

        let name = self.fresh_name("push_trip");
        let func_id = self.module.declare_function(&name, Linkage::Local, &sig)?;

        let mut ctx = self.module.make_context();
        ctx.func = cranelift_codegen::ir::Function::with_name_signature(UserFuncName::user(0, func_id.as_u32()), sig);

        {
            let mut builder = FunctionBuilder::new(&mut ctx.func, &mut self.builder_ctx);
            let entry = builder.create_block();
            let in_range = builder.create_block();
            let bailout = builder.create_block();

            builder.append_block_params_for_function_params(entry);
            builder.switch_to_block(entry);
            let start = builder.block_params(entry)[0];
            let bound = builder.block_params(entry)[1];

            let n = builder.ins().fsub(bound, start);
            let zero = builder.ins().f64const(0.0);
            let max = builder.ins().f64const(MAX_NATIVE_TRIP_COUNT as f64);
            let ge_zero = builder.ins().fcmp(FloatCC::GreaterThanOrEqual, n, zero);
            let le_max = builder.ins().fcmp(FloatCC::LessThanOrEqual, n, max);
            let ok = builder.ins().band(ge_zero, le_max);
            builder.ins().brif(ok, in_range, &[], bailout, &[]);

            builder.switch_to_block(bailout);
            let sentinel = builder.ins().iconst(types::I64, PUSH_BAILOUT);
            builder.ins().return_(&[sentinel]);

            builder.switch_to_block(in_range);
            let count = builder.ins().fcvt_to_sint_sat(types::I64, n);
            builder.ins().return_(&[count]);

            builder.seal_all_blocks();
            builder.finalize();
        }

        self.module.define_function(func_id, &mut ctx)?;
        self.module.clear_context(&mut ctx);
        self.module.finalize_definitions()?;

        let code_ptr = self.module.get_finalized_function(func_id);
        Ok(unsafe { std::mem::transmute::<*const u8, PushTripKernelFn>(code_ptr) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bailout::is_sum_bailout;

    #[test]
    fn sum_kernel_matches_gauss_formula() {
        let mut compiler = NativeCompiler::new().expect("native backend available");
        let kernel = compiler.compile_sum_kernel().expect("compile");
        // sum(0..1000) + 0 == 999*1000/2 == 499500
        assert_eq!(kernel(0.0, 1000.0, 0.0), 499_500.0);
        assert_eq!(kernel(1.0, 21.0, 0.0), 210.0);
    }

    #[test]
    fn sum_kernel_bails_out_on_negative_trip_count() {
        let mut compiler = NativeCompiler::new().expect("native backend available");
        let kernel = compiler.compile_sum_kernel().expect("compile");
        assert!(is_sum_bailout(kernel(10.0, 0.0, 0.0)));
    }

    #[test]
    fn push_trip_kernel_counts_iterations() {
        let mut compiler = NativeCompiler::new().expect("native backend available");
        let kernel = compiler.compile_push_trip_kernel().expect("compile");
        assert_eq!(kernel(0.0, 5.0), 5);
        assert_eq!(kernel(3.0, 3.0), 0);
        assert_eq!(kernel(5.0, 0.0), PUSH_BAILOUT);
    }
}
