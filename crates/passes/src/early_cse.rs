//! EarlyCSE (spec.md §4.3): dominator-tree-scoped common subexpression
//! elimination. Walks the dominator tree in preorder keeping a scoped list
//! of "available" pure expressions; an instruction structurally identical
//! to one already available in a dominating scope gets its result replaced
//! by the earlier one rather than recomputed. Leaves the now-redundant
//! instruction in place for DCE to clean up — this pass only rewrites uses.

use crate::util::{apply_substitution, children_map};
use crate::Pass;
use std::collections::HashMap;
use viper_il::{FuncId, Function, Imm, Instruction, Module, Opcode, Temp, Type, Value};
use viper_verifier::dominator::DominatorTree;

pub struct EarlyCse;

impl Pass for EarlyCse {
    fn name(&self) -> &'static str {
        "early-cse"
    }

    fn run(&self, module: &mut Module) {
        for func in &mut module.functions {
            run_on_function(func);
        }
    }
}

#[derive(Clone, PartialEq)]
struct ExprKey {
    opcode: Opcode,
    operand_type: Type,
    result_type: Type,
    imm: Option<Imm>,
    callee: Option<FuncId>,
    operands: Vec<Value>,
}

fn key_of(inst: &Instruction) -> Option<ExprKey> {
    if !inst.opcode.is_pure() || !inst.opcode.produces_result() {
        return None;
    }
    // `Call` is excluded by `is_pure`, but guard explicitly: a call result
    // is never structurally CSE-able without interprocedural purity info.
    Some(ExprKey {
        opcode: inst.opcode,
        operand_type: inst.operand_type,
        result_type: inst.result_type,
        imm: inst.imm.clone(),
        callee: inst.callee,
        operands: inst.operands.clone(),
    })
}

enum Frame {
    Enter(viper_il::BlockId),
    Exit(usize),
}

fn run_on_function(func: &mut Function) {
    if func.blocks.is_empty() {
        return;
    }
    let dt = DominatorTree::compute(func);
    let children = children_map(func, &dt);
    let entry = func.blocks[0].id;
    let empty = Vec::new();

    let mut available: Vec<(ExprKey, Value)> = Vec::new();
    let mut substitution: HashMap<Temp, Value> = HashMap::new();
    let mut stack = vec![Frame::Enter(entry)];

    while let Some(frame) = stack.pop() {
        match frame {
            Frame::Enter(b) => {
                stack.push(Frame::Exit(available.len()));
                let block = func.block_mut(b).unwrap();
                for inst in block.instrs.iter_mut() {
                    let Some(t) = inst.result_temp else { continue };
                    let Some(key) = key_of(inst) else { continue };
                    if let Some((_, existing)) = available.iter().find(|(k, _)| *k == key) {
                        substitution.insert(t, *existing);
                    } else {
                        available.push((key, Value::Temp(t)));
                    }
                }
                for &child in children.get(&b).unwrap_or(&empty) {
                    stack.push(Frame::Enter(child));
                }
            }
            Frame::Exit(len) => available.truncate(len),
        }
    }

    apply_substitution(func, &substitution);
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_il::{ModuleBuilder, Opcode as Op, Signature, Type};

    #[test]
    fn reuses_identical_add_in_dominated_block() {
        let mut m = ModuleBuilder::new();
        let mut fb = m.new_function(
            "f",
            Signature {
                param_types: vec![Type::I64],
                return_type: Type::I64,
            },
        );
        let entry = fb.create_block("entry").unwrap();
        let next = fb.create_block("next").unwrap();
        fb.switch_to_block(entry);
        let p = Value::Temp(viper_il::Temp(0));
        let one = fb.const_i64(Type::I64, 1).unwrap();
        let first = fb.binary(Op::Add, Type::I64, p, one).unwrap();
        fb.br(next, vec![]).unwrap();

        fb.switch_to_block(next);
        let one_again = fb.const_i64(Type::I64, 1).unwrap();
        let second = fb.binary(Op::Add, Type::I64, p, one_again).unwrap();
        fb.ret(Some(second)).unwrap();
        fb.finish().unwrap();
        let mut module = m.finish();

        EarlyCse.run(&mut module);
        let next_block = module.functions[0]
            .blocks
            .iter()
            .find(|b| b.label == "next")
            .unwrap();
        assert_eq!(next_block.terminator.as_ref().unwrap().operands[0], first);
    }

    #[test]
    fn does_not_merge_across_sibling_branches() {
        let mut m = ModuleBuilder::new();
        let mut fb = m.new_function(
            "f",
            Signature {
                param_types: vec![Type::I1],
                return_type: Type::I64,
            },
        );
        let entry = fb.create_block("entry").unwrap();
        let left = fb.create_block("left").unwrap();
        let right = fb.create_block("right").unwrap();
        fb.switch_to_block(entry);
        let cond = Value::Temp(viper_il::Temp(0));
        fb.cbr(cond, left, vec![], right, vec![]).unwrap();

        fb.switch_to_block(left);
        let a = fb.const_i64(Type::I64, 5).unwrap();
        fb.ret(Some(a)).unwrap();

        fb.switch_to_block(right);
        let b = fb.const_i64(Type::I64, 5).unwrap();
        fb.ret(Some(b)).unwrap();

        fb.finish().unwrap();
        let mut module = m.finish();

        EarlyCse.run(&mut module);
        // left and right are siblings, not dominator-ancestor/descendant;
        // each keeps its own constant, nothing should have been merged.
        let left_ret = module.functions[0]
            .blocks
            .iter()
            .find(|b| b.label == "left")
            .unwrap()
            .terminator
            .as_ref()
            .unwrap();
        let right_ret = module.functions[0]
            .blocks
            .iter()
            .find(|b| b.label == "right")
            .unwrap()
            .terminator
            .as_ref()
            .unwrap();
        assert_eq!(left_ret.operands[0], Value::ConstI64(5));
        assert_eq!(right_ret.operands[0], Value::ConstI64(5));
        assert_eq!(viper_verifier::verify(&module), Ok(()));
    }
}
