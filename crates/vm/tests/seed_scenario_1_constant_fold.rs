//! Seed scenario 1 (spec.md §8): a pure constant-folding function, run both
//! as built and after the standard pass pipeline. SCCP/DCE must not change
//! the function's observable result.

mod support;

use viper_il::Value;
use viper_vm::{VmConfig, VM};

#[test]
fn as_built_returns_five() {
    let (module, main) = support::constant_fold_module();
    let mut vm = VM::new(VmConfig::default());
    vm.load_module(module).unwrap();
    assert_eq!(vm.run(main, vec![]).unwrap(), Value::ConstI64(5));
}

#[test]
fn after_standard_pipeline_still_returns_five() {
    let (mut module, main) = support::constant_fold_module();
    viper_passes::PassPipeline::standard(viper_passes::PipelineConfig::default()).run(&mut module);
    let mut vm = VM::new(VmConfig::default());
    vm.load_module(module).unwrap();
    assert_eq!(vm.run(main, vec![]).unwrap(), Value::ConstI64(5));
}
