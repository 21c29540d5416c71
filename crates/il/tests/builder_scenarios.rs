//! Builds the seed scenarios from spec.md §8 directly with the builder API
//! and checks the resulting IR shape. Execution of these modules is covered
//! in `viper-vm`'s integration tests; this crate only checks construction.

use viper_il::{BuilderError, ModuleBuilder, Opcode, Signature, Type, Value};

#[test]
fn scenario_1_constant_fold_shape() -> Result<(), BuilderError> {
    let mut m = ModuleBuilder::new();
    let mut fb = m.new_function(
        "main",
        Signature {
            param_types: vec![],
            return_type: Type::I64,
        },
    );
    let entry = fb.create_block("entry")?;
    fb.switch_to_block(entry);
    let a = fb.const_i64(Type::I64, 2)?;
    let b = fb.const_i64(Type::I64, 3)?;
    let c = fb.binary(Opcode::Add, Type::I64, a, b)?;
    fb.ret(Some(c))?;
    let id = fb.finish()?;

    let module = m.finish();
    let func = module.function(id).unwrap();
    assert_eq!(func.blocks.len(), 1);
    assert_eq!(func.blocks[0].instrs.len(), 3);
    assert!(func.blocks[0].terminator.is_some());
    assert_eq!(func.blocks[0].terminator.as_ref().unwrap().opcode, Opcode::Ret);
    Ok(())
}

#[test]
fn duplicate_block_label_rejected() -> Result<(), BuilderError> {
    let mut m = ModuleBuilder::new();
    let mut fb = m.new_function(
        "f",
        Signature {
            param_types: vec![],
            return_type: Type::Void,
        },
    );
    fb.create_block("entry")?;
    let err = fb.create_block("entry").unwrap_err();
    assert_eq!(err, BuilderError::DuplicateBlockLabel("entry".into(), "f".into()));
    Ok(())
}

#[test]
fn append_after_terminator_rejected() -> Result<(), BuilderError> {
    let mut m = ModuleBuilder::new();
    let mut fb = m.new_function(
        "f",
        Signature {
            param_types: vec![],
            return_type: Type::I64,
        },
    );
    let entry = fb.create_block("entry")?;
    fb.switch_to_block(entry);
    let a = fb.const_i64(Type::I64, 1)?;
    fb.ret(Some(a))?;
    let err = fb.const_i64(Type::I64, 2).unwrap_err();
    assert_eq!(err, BuilderError::AppendAfterTerminator("entry".into()));
    Ok(())
}

#[test]
fn loop_with_block_params_shape() -> Result<(), BuilderError> {
    // Sigma i for i = 1..=10, via induction + accumulator block params
    // (spec.md §8 scenario 2).
    let mut m = ModuleBuilder::new();
    let mut fb = m.new_function(
        "sum_loop",
        Signature {
            param_types: vec![],
            return_type: Type::I64,
        },
    );
    let entry = fb.create_block("entry")?;
    let loop_head = fb.create_block("loop")?;
    let done = fb.create_block("done")?;

    let i_param = fb.add_block_param(loop_head, Type::I64)?;
    let acc_param = fb.add_block_param(loop_head, Type::I64)?;
    let acc_done = fb.add_block_param(done, Type::I64)?;

    fb.switch_to_block(entry);
    let zero = fb.const_i64(Type::I64, 0)?;
    let one = fb.const_i64(Type::I64, 1)?;
    fb.br(loop_head, vec![one, zero])?;

    fb.switch_to_block(loop_head);
    let i = Value::Temp(i_param);
    let acc = Value::Temp(acc_param);
    let new_acc = fb.binary(Opcode::Add, Type::I64, acc, i)?;
    let ten = fb.const_i64(Type::I64, 10)?;
    let cond = fb.binary(Opcode::ICmp(viper_il::CmpPred::Sle), Type::I1, i, ten)?;
    let one_again = fb.const_i64(Type::I64, 1)?;
    let next_i = fb.binary(Opcode::Add, Type::I64, i, one_again)?;
    fb.cbr(cond, loop_head, vec![next_i, new_acc], done, vec![new_acc])?;

    fb.switch_to_block(done);
    fb.ret(Some(Value::Temp(acc_done)))?;

    let id = fb.finish()?;
    let module = m.finish();
    let func = module.function(id).unwrap();
    assert_eq!(func.blocks.len(), 3);
    assert_eq!(func.blocks[1].params.len(), 2);
    Ok(())
}
