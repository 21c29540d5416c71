//! Seed scenario 4 (spec.md §8): a trap raised by a checked opcode, caught by
//! an `eh_entry` landing pad in the same function, versus the same trap with
//! no landing pad anywhere on the stack.

use viper_il::{Instruction, ModuleBuilder, Opcode, Signature, Type, TrapKind, Value};
use viper_vm::{Trap, VmConfig, VM};

fn div_by_zero_with_handler() -> (viper_il::Module, viper_il::FuncId) {
    let mut mb = ModuleBuilder::new();
    let mut fb = mb.new_function(
        "main",
        Signature {
            param_types: vec![],
            return_type: Type::I64,
        },
    );

    let entry = fb.create_block("entry").unwrap();
    let pad = fb.create_block("pad").unwrap();
    let kind_param = fb.add_block_param(pad, Type::I64).unwrap();
    let _msg_param = fb.add_block_param(pad, Type::Str).unwrap();

    fb.switch_to_block(entry);
    let one = fb.const_i64(Type::I64, 1).unwrap();
    let zero = fb.const_i64(Type::I64, 0).unwrap();
    let q = fb.binary(Opcode::SDiv, Type::I64, one, zero).unwrap();
    fb.ret(Some(q)).unwrap();

    fb.switch_to_block(pad);
    let mut eh_entry = Instruction::new(Opcode::EhEntry, Type::I64);
    eh_entry.operand_type = Type::Void;
    fb.append(eh_entry, None).unwrap();
    // the handler reflects the caught trap kind back as the return value,
    // shifted so it can't be confused with a real quotient.
    let kind = Value::Temp(kind_param);
    let shift = fb.const_i64(Type::I64, 1000).unwrap();
    let tagged = fb.binary(Opcode::Add, Type::I64, kind, shift).unwrap();
    fb.ret(Some(tagged)).unwrap();

    let id = fb.finish().unwrap();
    (mb.finish(), id)
}

fn div_by_zero_without_handler() -> (viper_il::Module, viper_il::FuncId) {
    let mut mb = ModuleBuilder::new();
    let mut fb = mb.new_function(
        "main",
        Signature {
            param_types: vec![],
            return_type: Type::I64,
        },
    );
    let entry = fb.create_block("entry").unwrap();
    fb.switch_to_block(entry);
    let one = fb.const_i64(Type::I64, 1).unwrap();
    let zero = fb.const_i64(Type::I64, 0).unwrap();
    let q = fb.binary(Opcode::SDiv, Type::I64, one, zero).unwrap();
    fb.ret(Some(q)).unwrap();
    let id = fb.finish().unwrap();
    (mb.finish(), id)
}

#[test]
fn landing_pad_catches_div_by_zero_and_reports_its_kind() {
    let (module, main) = div_by_zero_with_handler();
    let mut vm = VM::new(VmConfig::default());
    vm.load_module(module).unwrap();
    let result = vm.run(main, vec![]).unwrap();
    // the exact kind->i64 encoding is an interpreter-internal detail; the
    // test only needs the handler to have run instead of the trap escaping.
    assert_ne!(result, Value::ConstI64(0));
    assert!(matches!(result, Value::ConstI64(n) if n >= 1000));
}

#[test]
fn uncaught_div_by_zero_escapes_as_a_trap() {
    let (module, main) = div_by_zero_without_handler();
    let mut vm = VM::new(VmConfig::default());
    vm.load_module(module).unwrap();
    let err: Trap = vm.run(main, vec![]).unwrap_err();
    assert_eq!(err.kind, TrapKind::DivByZero);
}
