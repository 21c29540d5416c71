//! The standard pass pipeline (component C3, spec.md §4.3).
//!
//! Passes run in the fixed order given in spec.md: SimplifyCFG, SCCP,
//! Mem2Reg, EarlyCSE, MemorySSA+DSE, Inliner (itself built on a CallGraph
//! SCC analysis), CheckOpt, Peephole, DCE. Each pass is a `Module ->
//! Module` transform that preserves verifier invariants; passes are
//! best-effort (a pass that can't transform leaves the IR unchanged) and
//! the verifier is re-run after every pass when
//! `PipelineConfig::verify_each_pass` is set (the default in debug builds).

mod call_graph;
mod check_opt;
mod dce;
mod early_cse;
mod inliner;
mod mem2reg;
mod memory_ssa_dse;
mod peephole;
mod sccp;
mod simplify_cfg;
mod util;

pub use call_graph::CallGraph;
pub use inliner::InlinerConfig;

use tracing::{debug, instrument};
use viper_il::Module;

/// A single pass: a (possibly no-op) transform over a module.
pub trait Pass {
    fn name(&self) -> &'static str;
    fn run(&self, module: &mut Module);
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Re-run the verifier after each pass and panic with the diagnostic on
    /// failure. Catches pass regressions close to their source; expensive,
    /// so it defaults to debug builds only.
    pub verify_each_pass: bool,
    pub inliner: InlinerConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        PipelineConfig {
            verify_each_pass: cfg!(debug_assertions),
            inliner: InlinerConfig::default(),
        }
    }
}

pub struct PassPipeline {
    passes: Vec<Box<dyn Pass>>,
    config: PipelineConfig,
}

impl PassPipeline {
    /// The identity pipeline: running it is a no-op on any module
    /// (spec.md §8 "Identity pass" testable property).
    pub fn empty() -> Self {
        PassPipeline {
            passes: Vec::new(),
            config: PipelineConfig::default(),
        }
    }

    /// The fixed, standard pipeline in the order mandated by spec.md §4.3.
    pub fn standard(config: PipelineConfig) -> Self {
        let inliner_config = config.inliner.clone();
        PassPipeline {
            passes: vec![
                Box::new(simplify_cfg::SimplifyCfg),
                Box::new(sccp::Sccp),
                Box::new(mem2reg::Mem2Reg),
                Box::new(early_cse::EarlyCse),
                Box::new(memory_ssa_dse::MemorySsaDse),
                Box::new(inliner::Inliner::new(inliner_config)),
                Box::new(check_opt::CheckOpt),
                Box::new(peephole::Peephole),
                Box::new(dce::Dce),
            ],
            config,
        }
    }

    #[instrument(skip(self, module))]
    pub fn run(&self, module: &mut Module) {
        for pass in &self.passes {
            debug!(pass = pass.name(), "running pass");
            pass.run(module);
            if self.config.verify_each_pass {
                if let Err(diags) = viper_verifier::verify(module) {
                    panic!(
                        "pass `{}` produced a module that fails verification: {:?}",
                        pass.name(),
                        diags
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_il::{ModuleBuilder, Opcode, Signature, Type, Value};

    fn sample_module() -> Module {
        let mut m = ModuleBuilder::new();
        let mut fb = m.new_function(
            "main",
            Signature {
                param_types: vec![],
                return_type: Type::I64,
            },
        );
        let entry = fb.create_block("entry").unwrap();
        fb.switch_to_block(entry);
        let a = fb.const_i64(Type::I64, 2).unwrap();
        let b = fb.const_i64(Type::I64, 3).unwrap();
        let c = fb.binary(Opcode::Add, Type::I64, a, b).unwrap();
        fb.ret(Some(c)).unwrap();
        fb.finish().unwrap();
        m.finish()
    }

    #[test]
    fn identity_pipeline_is_identity() {
        let module = sample_module();
        let mut copy = module.clone();
        PassPipeline::empty().run(&mut copy);
        assert_eq!(module, copy);
    }

    #[test]
    fn standard_pipeline_preserves_verification() {
        let mut module = sample_module();
        PassPipeline::standard(PipelineConfig::default()).run(&mut module);
        assert_eq!(viper_verifier::verify(&module), Ok(()));
    }

    /// A loop summing 0..n via an alloca-based accumulator and induction
    /// variable, the shape Mem2Reg is meant to turn into block-param SSA
    /// before the rest of the pipeline touches it.
    fn loop_sum_module() -> Module {
        let mut m = ModuleBuilder::new();
        let mut fb = m.new_function(
            "sum_to",
            Signature {
                param_types: vec![Type::I64],
                return_type: Type::I64,
            },
        );
        let entry = fb.create_block("entry").unwrap();
        let header = fb.create_block("header").unwrap();
        let body = fb.create_block("body").unwrap();
        let exit = fb.create_block("exit").unwrap();

        fb.switch_to_block(entry);
        let one = fb.const_i64(Type::I64, 1).unwrap();
        let acc_slot = fb.alloca(one).unwrap();
        let i_slot = fb.alloca(one).unwrap();
        let zero = fb.const_i64(Type::I64, 0).unwrap();
        fb.store(Type::I64, acc_slot, zero).unwrap();
        fb.store(Type::I64, i_slot, zero).unwrap();
        fb.br(header, vec![]).unwrap();

        fb.switch_to_block(header);
        let n = Value::Temp(viper_il::Temp(0));
        let i_val = fb.load(Type::I64, i_slot).unwrap();
        let cond = fb
            .cmp(Opcode::ICmp(viper_il::CmpPred::Slt), Type::I64, i_val, n)
            .unwrap();
        fb.cbr(cond, body, vec![], exit, vec![]).unwrap();

        fb.switch_to_block(body);
        let acc_val = fb.load(Type::I64, acc_slot).unwrap();
        let i_val2 = fb.load(Type::I64, i_slot).unwrap();
        let new_acc = fb.binary(Opcode::Add, Type::I64, acc_val, i_val2).unwrap();
        fb.store(Type::I64, acc_slot, new_acc).unwrap();
        let step = fb.const_i64(Type::I64, 1).unwrap();
        let new_i = fb.binary(Opcode::Add, Type::I64, i_val2, step).unwrap();
        fb.store(Type::I64, i_slot, new_i).unwrap();
        fb.br(header, vec![]).unwrap();

        fb.switch_to_block(exit);
        let result = fb.load(Type::I64, acc_slot).unwrap();
        fb.ret(Some(result)).unwrap();
        fb.finish().unwrap();
        m.finish()
    }

    #[test]
    fn standard_pipeline_promotes_and_verifies_loop_sum() {
        let mut module = loop_sum_module();
        PassPipeline::standard(PipelineConfig::default()).run(&mut module);
        assert_eq!(viper_verifier::verify(&module), Ok(()));
        // Mem2Reg should have promoted both allocas away entirely.
        let func = &module.functions[0];
        assert!(!func
            .blocks
            .iter()
            .flat_map(|b| b.instrs.iter())
            .any(|i| i.opcode == Opcode::Alloca));
    }

    /// A tiny leaf callee called from `main`, a shape the inliner should
    /// fold away entirely, leaving a verifiable, call-free `main`.
    fn caller_callee_module() -> Module {
        let mut m = ModuleBuilder::new();
        let mut double_fb = m.new_function(
            "double",
            Signature {
                param_types: vec![Type::I64],
                return_type: Type::I64,
            },
        );
        let db_entry = double_fb.create_block("entry").unwrap();
        double_fb.switch_to_block(db_entry);
        let x = Value::Temp(viper_il::Temp(0));
        let sum = double_fb.binary(Opcode::Add, Type::I64, x, x).unwrap();
        double_fb.ret(Some(sum)).unwrap();
        let double_id = double_fb.finish().unwrap();

        let mut main_fb = m.new_function(
            "main",
            Signature {
                param_types: vec![],
                return_type: Type::I64,
            },
        );
        let main_entry = main_fb.create_block("entry").unwrap();
        main_fb.switch_to_block(main_entry);
        let five = main_fb.const_i64(Type::I64, 5).unwrap();
        let doubled = main_fb.call(double_id, Type::I64, vec![five]).unwrap();
        main_fb.ret(Some(doubled)).unwrap();
        main_fb.finish().unwrap();
        m.finish()
    }

    #[test]
    fn standard_pipeline_inlines_caller_callee() {
        let mut module = caller_callee_module();
        let pipeline = PassPipeline::standard(PipelineConfig::default());
        // Inlining happens after SCCP in a single pass, so the freshly
        // spliced-in arithmetic isn't folded until SCCP runs again; running
        // the fixed pipeline twice drives it to the fully-folded fixed point,
        // the same way a real compiler iterates its pass pipeline.
        pipeline.run(&mut module);
        pipeline.run(&mut module);
        assert_eq!(viper_verifier::verify(&module), Ok(()));
        let main = module.functions.iter().find(|f| f.name == "main").unwrap();
        assert!(!main
            .blocks
            .iter()
            .flat_map(|b| b.instrs.iter())
            .any(|i| i.opcode == Opcode::Call));
        let ret = main.blocks.iter().find_map(|b| b.terminator.clone()).unwrap();
        assert_eq!(ret.operands.first(), Some(&Value::ConstI64(10)));
    }

    #[test]
    fn running_standard_pipeline_twice_is_idempotent_on_output() {
        let mut once = loop_sum_module();
        PassPipeline::standard(PipelineConfig::default()).run(&mut once);
        let mut twice = once.clone();
        PassPipeline::standard(PipelineConfig::default()).run(&mut twice);
        assert_eq!(once, twice);
    }
}
