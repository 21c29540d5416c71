//! Peephole (spec.md §4.3): table-driven local algebraic simplifications
//! on pure binary arithmetic. Each rule only fires when it's an identity
//! regardless of the unknown operand's runtime value, so it's safe to
//! apply even without SCCP having resolved anything — these are cheap
//! wins SCCP's lattice doesn't cover (e.g. `x - x` where `x` isn't a
//! literal constant).

use crate::util::apply_substitution;
use crate::Pass;
use std::collections::HashMap;
use viper_il::{Function, Instruction, Module, Opcode, Temp, Value};

pub struct Peephole;

impl Pass for Peephole {
    fn name(&self) -> &'static str {
        "peephole"
    }

    fn run(&self, module: &mut Module) {
        for func in &mut module.functions {
            run_on_function(func);
        }
    }
}

const ZERO: Value = Value::ConstI64(0);
const ONE: Value = Value::ConstI64(1);

fn simplify(inst: &Instruction) -> Option<Value> {
    if inst.operands.len() != 2 {
        return None;
    }
    let a = inst.operands[0];
    let b = inst.operands[1];
    use Opcode::*;
    match inst.opcode {
        Add => {
            if a == ZERO {
                return Some(b);
            }
            if b == ZERO {
                return Some(a);
            }
        }
        Sub => {
            if b == ZERO {
                return Some(a);
            }
            if a == b {
                return Some(ZERO);
            }
        }
        Mul => {
            if a == ONE {
                return Some(b);
            }
            if b == ONE {
                return Some(a);
            }
            if a == ZERO || b == ZERO {
                return Some(ZERO);
            }
        }
        And => {
            if a == b {
                return Some(a);
            }
            if a == ZERO || b == ZERO {
                return Some(ZERO);
            }
        }
        Or => {
            if a == b {
                return Some(a);
            }
            if a == ZERO {
                return Some(b);
            }
            if b == ZERO {
                return Some(a);
            }
        }
        Xor => {
            if a == b {
                return Some(ZERO);
            }
            if a == ZERO {
                return Some(b);
            }
            if b == ZERO {
                return Some(a);
            }
        }
        Shl | LShr | AShr => {
            if b == ZERO {
                return Some(a);
            }
        }
        _ => {}
    }
    None
}

fn run_on_function(func: &mut Function) {
    let mut substitution: HashMap<Temp, Value> = HashMap::new();

    for block in &func.blocks {
        for inst in &block.instrs {
            let Some(t) = inst.result_temp else { continue };
            if let Some(replacement) = simplify(inst) {
                substitution.insert(t, replacement);
            }
        }
    }

    apply_substitution(func, &substitution);

    for block in &mut func.blocks {
        block
            .instrs
            .retain(|inst| inst.result_temp.map_or(true, |t| !substitution.contains_key(&t)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_il::{ModuleBuilder, Opcode as Op, Signature, Type};

    #[test]
    fn folds_add_zero_with_unknown_operand() {
        let mut m = ModuleBuilder::new();
        let mut fb = m.new_function(
            "f",
            Signature {
                param_types: vec![Type::I64],
                return_type: Type::I64,
            },
        );
        let entry = fb.create_block("entry").unwrap();
        fb.switch_to_block(entry);
        let p = Value::Temp(viper_il::Temp(0));
        let zero = fb.const_i64(Type::I64, 0).unwrap();
        let sum = fb.binary(Op::Add, Type::I64, p, zero).unwrap();
        fb.ret(Some(sum)).unwrap();
        fb.finish().unwrap();
        let mut module = m.finish();

        Peephole.run(&mut module);
        let ret = module.functions[0].blocks[0].terminator.as_ref().unwrap();
        assert_eq!(ret.operands[0], p);
        assert!(!module.functions[0].blocks[0]
            .instrs
            .iter()
            .any(|i| i.opcode == Op::Add));
    }

    #[test]
    fn folds_self_subtraction_to_zero() {
        let mut m = ModuleBuilder::new();
        let mut fb = m.new_function(
            "f",
            Signature {
                param_types: vec![Type::I64],
                return_type: Type::I64,
            },
        );
        let entry = fb.create_block("entry").unwrap();
        fb.switch_to_block(entry);
        let p = Value::Temp(viper_il::Temp(0));
        let diff = fb.binary(Op::Sub, Type::I64, p, p).unwrap();
        fb.ret(Some(diff)).unwrap();
        fb.finish().unwrap();
        let mut module = m.finish();

        Peephole.run(&mut module);
        let ret = module.functions[0].blocks[0].terminator.as_ref().unwrap();
        assert_eq!(ret.operands[0], Value::ConstI64(0));
    }

    #[test]
    fn leaves_non_identity_arithmetic_untouched() {
        let mut m = ModuleBuilder::new();
        let mut fb = m.new_function(
            "f",
            Signature {
                param_types: vec![Type::I64],
                return_type: Type::I64,
            },
        );
        let entry = fb.create_block("entry").unwrap();
        fb.switch_to_block(entry);
        let p = Value::Temp(viper_il::Temp(0));
        let two = fb.const_i64(Type::I64, 2).unwrap();
        let prod = fb.binary(Op::Mul, Type::I64, p, two).unwrap();
        fb.ret(Some(prod)).unwrap();
        fb.finish().unwrap();
        let mut module = m.finish();

        Peephole.run(&mut module);
        assert!(module.functions[0].blocks[0]
            .instrs
            .iter()
            .any(|i| i.opcode == Op::Mul));
    }
}
