//! Shared module-building helpers for the integration tests below.

use viper_il::{ModuleBuilder, Opcode, Signature, Type};

/// Scenario 1 (spec.md §8): `fn @main() -> i64 { %a = 2; %b = 3; %c = %a + %b; ret %c }`.
pub fn constant_fold_module() -> (viper_il::Module, viper_il::FuncId) {
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
    let a = fb.const_i64(Type::I64, 2).unwrap();
    let b = fb.const_i64(Type::I64, 3).unwrap();
    let c = fb.binary(Opcode::Add, Type::I64, a, b).unwrap();
    fb.ret(Some(c)).unwrap();
    let id = fb.finish().unwrap();
    (mb.finish(), id)
}
