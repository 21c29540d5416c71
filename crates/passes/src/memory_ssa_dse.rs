//! MemorySSA + dead store elimination (spec.md §4.3).
//!
//! A full interprocedural MemorySSA with alias analysis is out of scope for
//! a first cut; this builds the intraprocedural, block-scoped def-use
//! relation the name implies: within a single block, a `Store` to a given
//! pointer value is dead if it is followed by another `Store` to the exact
//! same pointer value with no intervening `Load` of that pointer, `Call`,
//! or `CallIndirect` (either of which could read through memory this
//! analysis can't see into). Stores are tracked per block only — nothing
//! is assumed to survive a branch, which is conservative but always safe.

use crate::Pass;
use viper_il::{Module, Opcode, Value};

pub struct MemorySsaDse;

impl Pass for MemorySsaDse {
    fn name(&self) -> &'static str {
        "memoryssa-dse"
    }

    fn run(&self, module: &mut Module) {
        for func in &mut module.functions {
            for block in &mut func.blocks {
                eliminate_dead_stores(&mut block.instrs);
            }
        }
    }
}

fn eliminate_dead_stores(instrs: &mut Vec<viper_il::Instruction>) {
    let mut last_store: Vec<(Value, usize)> = Vec::new();
    let mut dead = vec![false; instrs.len()];

    for (idx, inst) in instrs.iter().enumerate() {
        match inst.opcode {
            Opcode::Store => {
                let ptr = inst.operands[0];
                if let Some(entry) = last_store.iter_mut().find(|(p, _)| *p == ptr) {
                    dead[entry.1] = true;
                    entry.1 = idx;
                } else {
                    last_store.push((ptr, idx));
                }
            }
            Opcode::Load => {
                let ptr = inst.operands[0];
                last_store.retain(|(p, _)| *p != ptr);
            }
            Opcode::Call | Opcode::CallIndirect => {
                last_store.clear();
            }
            _ => {}
        }
    }

    let mut i = 0;
    instrs.retain(|_| {
        let keep = !dead[i];
        i += 1;
        keep
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_il::{ModuleBuilder, Opcode as Op, Signature, Type};

    #[test]
    fn removes_overwritten_store_with_no_intervening_load() {
        let mut m = ModuleBuilder::new();
        let mut fb = m.new_function(
            "f",
            Signature {
                param_types: vec![],
                return_type: Type::Void,
            },
        );
        let entry = fb.create_block("entry").unwrap();
        fb.switch_to_block(entry);
        let one = fb.const_i64(Type::I64, 1).unwrap();
        let slot = fb.alloca(one).unwrap();
        let a = fb.const_i64(Type::I64, 1).unwrap();
        let b = fb.const_i64(Type::I64, 2).unwrap();
        fb.store(Type::I64, slot, a).unwrap();
        fb.store(Type::I64, slot, b).unwrap();
        fb.ret(None).unwrap();
        fb.finish().unwrap();
        let mut module = m.finish();

        MemorySsaDse.run(&mut module);
        let stores = module.functions[0].blocks[0]
            .instrs
            .iter()
            .filter(|i| i.opcode == Op::Store)
            .count();
        assert_eq!(stores, 1);
    }

    #[test]
    fn keeps_store_observed_by_intervening_load() {
        let mut m = ModuleBuilder::new();
        let mut fb = m.new_function(
            "f",
            Signature {
                param_types: vec![],
                return_type: Type::I64,
            },
        );
        let entry = fb.create_block("entry").unwrap();
        fb.switch_to_block(entry);
        let one = fb.const_i64(Type::I64, 1).unwrap();
        let slot = fb.alloca(one).unwrap();
        let a = fb.const_i64(Type::I64, 1).unwrap();
        fb.store(Type::I64, slot, a).unwrap();
        let loaded = fb.load(Type::I64, slot).unwrap();
        let b = fb.const_i64(Type::I64, 2).unwrap();
        fb.store(Type::I64, slot, b).unwrap();
        fb.ret(Some(loaded)).unwrap();
        fb.finish().unwrap();
        let mut module = m.finish();

        MemorySsaDse.run(&mut module);
        let stores = module.functions[0].blocks[0]
            .instrs
            .iter()
            .filter(|i| i.opcode == Op::Store)
            .count();
        assert_eq!(stores, 2);
    }
}
