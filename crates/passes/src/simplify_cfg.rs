//! SimplifyCFG (spec.md §4.3, first pass in the pipeline): deletes blocks
//! unreachable from the entry, folds `CBr` on a literal-constant condition
//! to an unconditional `Br`, and merges a block into its unique predecessor
//! when that predecessor has no other successor.

use crate::Pass;
use std::collections::HashSet;
use viper_il::{BlockId, Module, Opcode, Value};

pub struct SimplifyCfg;

impl Pass for SimplifyCfg {
    fn name(&self) -> &'static str {
        "simplify-cfg"
    }

    fn run(&self, module: &mut Module) {
        for func in &mut module.functions {
            fold_constant_branches(func);
            remove_unreachable_blocks(func);
            merge_straight_line_blocks(func);
        }
    }
}

fn fold_constant_branches(func: &mut viper_il::Function) {
    for block in &mut func.blocks {
        let Some(term) = &block.terminator else { continue };
        if term.opcode != Opcode::CBr {
            continue;
        }
        let Some(cond) = term.operands.first() else { continue };
        let taken = match cond {
            Value::ConstI64(0) => Some(false),
            Value::ConstI64(_) => Some(true),
            _ => None,
        };
        let Some(taken) = taken else { continue };
        let idx = if taken { 0 } else { 1 };
        let target = term.targets[idx].clone();
        let mut new_term = viper_il::Instruction::new(Opcode::Br, viper_il::Type::Void);
        new_term.targets.push(target);
        new_term.source_loc = term.source_loc.clone();
        block.terminator = Some(new_term);
    }
}

fn remove_unreachable_blocks(func: &mut viper_il::Function) {
    if func.blocks.is_empty() {
        return;
    }
    let entry = func.blocks[0].id;
    let mut reachable = HashSet::new();
    let mut stack = vec![entry];
    while let Some(b) = stack.pop() {
        if !reachable.insert(b) {
            continue;
        }
        if let Some(block) = func.block(b) {
            if let Some(term) = &block.terminator {
                for t in &term.targets {
                    stack.push(t.block);
                }
            }
        }
    }
    func.blocks.retain(|b| reachable.contains(&b.id));
}

/// Merges `pred` into `succ` when `pred`'s only successor is `succ` and
/// `succ`'s only predecessor is `pred`, and `succ` takes no block
/// parameters (so there's nothing to substitute). Iterates to a fixed
/// point since merging can expose further merge opportunities.
fn merge_straight_line_blocks(func: &mut viper_il::Function) {
    loop {
        let mut pred_count: std::collections::HashMap<BlockId, usize> =
            std::collections::HashMap::new();
        for b in &func.blocks {
            if let Some(term) = &b.terminator {
                for t in &term.targets {
                    *pred_count.entry(t.block).or_insert(0) += 1;
                }
            }
        }

        let mut merge_pair = None;
        for b in &func.blocks {
            let Some(term) = &b.terminator else { continue };
            if term.opcode != Opcode::Br {
                continue;
            }
            let target = term.targets[0].block;
            if target == func.blocks[0].id {
                // never fold the entry block away into a predecessor.
                continue;
            }
            if !term.targets[0].args.is_empty() {
                continue;
            }
            if pred_count.get(&target).copied().unwrap_or(0) != 1 {
                continue;
            }
            let Some(target_block) = func.block(target) else { continue };
            if !target_block.params.is_empty() {
                continue;
            }
            if target == b.id {
                continue; // self-loop, not a straight-line merge
            }
            merge_pair = Some((b.id, target));
            break;
        }

        let Some((pred, succ)) = merge_pair else { break };
        let succ_idx = func.block_index(succ).unwrap();
        let succ_block = func.blocks.remove(succ_idx);
        let pred_block = func.block_mut(pred).unwrap();
        pred_block.instrs.extend(succ_block.instrs);
        pred_block.terminator = succ_block.terminator;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_il::{ModuleBuilder, Signature, Type};

    #[test]
    fn removes_unreachable_block() {
        let mut m = ModuleBuilder::new();
        let mut fb = m.new_function(
            "f",
            Signature {
                param_types: vec![],
                return_type: Type::I64,
            },
        );
        let entry = fb.create_block("entry").unwrap();
        let dead = fb.create_block("dead").unwrap();
        fb.switch_to_block(entry);
        let v = fb.const_i64(Type::I64, 1).unwrap();
        fb.ret(Some(v)).unwrap();
        fb.switch_to_block(dead);
        fb.ret(None).unwrap();
        fb.finish().unwrap();
        let mut module = m.finish();

        SimplifyCfg.run(&mut module);
        assert_eq!(module.functions[0].blocks.len(), 1);
    }

    #[test]
    fn merges_straight_line_chain() {
        let mut m = ModuleBuilder::new();
        let mut fb = m.new_function(
            "f",
            Signature {
                param_types: vec![],
                return_type: Type::I64,
            },
        );
        let entry = fb.create_block("entry").unwrap();
        let mid = fb.create_block("mid").unwrap();
        fb.switch_to_block(entry);
        fb.br(mid, vec![]).unwrap();
        fb.switch_to_block(mid);
        let v = fb.const_i64(Type::I64, 7).unwrap();
        fb.ret(Some(v)).unwrap();
        fb.finish().unwrap();
        let mut module = m.finish();

        SimplifyCfg.run(&mut module);
        assert_eq!(module.functions[0].blocks.len(), 1);
        assert_eq!(viper_verifier::verify(&module), Ok(()));
    }

    #[test]
    fn folds_constant_cbr() {
        let mut m = ModuleBuilder::new();
        let mut fb = m.new_function(
            "f",
            Signature {
                param_types: vec![],
                return_type: Type::I64,
            },
        );
        let entry = fb.create_block("entry").unwrap();
        let left = fb.create_block("left").unwrap();
        let right = fb.create_block("right").unwrap();
        fb.switch_to_block(entry);
        let cond = fb.const_i64(Type::I1, 1).unwrap();
        fb.cbr(cond, left, vec![], right, vec![]).unwrap();
        fb.switch_to_block(left);
        let one = fb.const_i64(Type::I64, 1).unwrap();
        fb.ret(Some(one)).unwrap();
        fb.switch_to_block(right);
        let two = fb.const_i64(Type::I64, 2).unwrap();
        fb.ret(Some(two)).unwrap();
        fb.finish().unwrap();
        let mut module = m.finish();

        SimplifyCfg.run(&mut module);
        // right becomes unreachable once the cbr folds to an unconditional
        // branch to left, and left then merges straight into entry.
        assert_eq!(module.functions[0].blocks.len(), 1);
    }
}
