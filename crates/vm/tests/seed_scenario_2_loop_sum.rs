//! Seed scenario 2 (spec.md §8): `Σ i for i = 1..=10` via a two-block loop
//! carrying the induction variable and accumulator as block parameters
//! (spec.md's block-parameter-bundle modeling of phi nodes).

use viper_il::{CmpPred, ModuleBuilder, Opcode, Signature, Type, Value};
use viper_vm::{VmConfig, VM};

fn loop_sum_module() -> (viper_il::Module, viper_il::FuncId) {
    let mut mb = ModuleBuilder::new();
    let mut fb = mb.new_function(
        "main",
        Signature {
            param_types: vec![],
            return_type: Type::I64,
        },
    );

    let entry = fb.create_block("entry").unwrap();
    let loop_head = fb.create_block("loop").unwrap();
    let exit = fb.create_block("exit").unwrap();

    let i_param = fb.add_block_param(loop_head, Type::I64).unwrap();
    let acc_param = fb.add_block_param(loop_head, Type::I64).unwrap();
    let acc_exit = fb.add_block_param(exit, Type::I64).unwrap();

    fb.switch_to_block(entry);
    let zero = fb.const_i64(Type::I64, 0).unwrap();
    let one = fb.const_i64(Type::I64, 1).unwrap();
    fb.br(loop_head, vec![one, zero]).unwrap();

    fb.switch_to_block(loop_head);
    let i = Value::Temp(i_param);
    let acc = Value::Temp(acc_param);
    let limit = fb.const_i64(Type::I64, 10).unwrap();
    let done = fb.cmp(Opcode::ICmp(CmpPred::Sgt), Type::I64, i, limit).unwrap();
    let next_acc = fb.binary(Opcode::Add, Type::I64, acc, i).unwrap();
    let next_i = fb.binary(Opcode::Add, Type::I64, i, one).unwrap();
    fb.cbr(done, exit, vec![acc], loop_head, vec![next_i, next_acc]).unwrap();

    fb.switch_to_block(exit);
    fb.ret(Some(Value::Temp(acc_exit))).unwrap();

    let id = fb.finish().unwrap();
    (mb.finish(), id)
}

#[test]
fn as_built_sums_one_through_ten() {
    let (module, main) = loop_sum_module();
    let mut vm = VM::new(VmConfig::default());
    vm.load_module(module).unwrap();
    assert_eq!(vm.run(main, vec![]).unwrap(), Value::ConstI64(55));
}

#[test]
fn after_standard_pipeline_still_sums_one_through_ten() {
    let (mut module, main) = loop_sum_module();
    viper_passes::PassPipeline::standard(viper_passes::PipelineConfig::default()).run(&mut module);
    let mut vm = VM::new(VmConfig::default());
    vm.load_module(module).unwrap();
    assert_eq!(vm.run(main, vec![]).unwrap(), Value::ConstI64(55));
}
