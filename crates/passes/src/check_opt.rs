//! CheckOpt (spec.md §4.3): runs after SCCP has had a chance to resolve
//! operands to literal constants, and folds away the three checked
//! opcodes (`SDivChk0`, `IdxChk`, `CastSiNarrowChk`) wherever their
//! operands are constant enough to prove the check can never fire. A
//! check that can't be proven safe is left alone — the trap it guards is
//! still live runtime behavior.

use crate::util::apply_substitution;
use crate::Pass;
use std::collections::HashMap;
use viper_il::{Function, Module, Opcode, Temp, Type, Value};

pub struct CheckOpt;

impl Pass for CheckOpt {
    fn name(&self) -> &'static str {
        "check-opt"
    }

    fn run(&self, module: &mut Module) {
        for func in &mut module.functions {
            run_on_function(func);
        }
    }
}

fn truncate(v: i64, ty: Type) -> i64 {
    match ty.int_bits() {
        Some(64) | None => v,
        Some(bits) => {
            let mask = (1i64 << bits) - 1;
            let t = v & mask;
            let sign_bit = 1i64 << (bits - 1);
            if t & sign_bit != 0 {
                t - (mask + 1)
            } else {
                t
            }
        }
    }
}

fn run_on_function(func: &mut Function) {
    let mut substitution: HashMap<Temp, Value> = HashMap::new();

    for block in &mut func.blocks {
        for inst in block.instrs.iter_mut() {
            match inst.opcode {
                Opcode::SDivChk0 => {
                    if let (Value::ConstI64(_), Value::ConstI64(d)) =
                        (inst.operands[0], inst.operands[1])
                    {
                        if d != 0 {
                            inst.opcode = Opcode::SDiv;
                        }
                    }
                }
                Opcode::IdxChk => {
                    if let (Value::ConstI64(index), Value::ConstI64(lo), Value::ConstI64(hi)) =
                        (inst.operands[0], inst.operands[1], inst.operands[2])
                    {
                        if index >= lo && index < hi {
                            if let Some(t) = inst.result_temp {
                                substitution.insert(t, inst.operands[0]);
                            }
                        }
                    }
                }
                Opcode::CastSiNarrowChk => {
                    if let Value::ConstI64(v) = inst.operands[0] {
                        if truncate(v, inst.result_type) == v {
                            if let Some(t) = inst.result_temp {
                                substitution.insert(t, Value::ConstI64(v));
                            }
                        }
                    }
                }
                _ => {}
            }
        }
    }

    apply_substitution(func, &substitution);

    for block in &mut func.blocks {
        block.instrs.retain(|inst| {
            !matches!(inst.opcode, Opcode::IdxChk | Opcode::CastSiNarrowChk)
                || inst.result_temp.map_or(true, |t| !substitution.contains_key(&t))
        });
    }
}
