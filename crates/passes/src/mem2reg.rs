//! Mem2Reg (spec.md §4.3): promotes non-escaping, single-slot `Alloca`s to
//! SSA values via dominance-frontier-based construction (Cytron, Ferrante,
//! Rosen, Wegman & Zadeck, 1991).
//!
//! A candidate alloca is one whose only uses are a direct `Load`/`Store` on
//! the exact pointer it produced (never passed through `Gep`, a call, a
//! branch argument, or `Ret`) and whose element count is the literal `1`.
//! Front ends that need this promotion to fire reliably should emit such
//! allocas in the entry block, though nothing here requires it — the
//! dominance-frontier construction is correct for an alloca anywhere in the
//! function, it just has fewer candidates to work with the deeper it sits.

use crate::util::{apply_substitution, children_map};
use crate::Pass;
use std::collections::{HashMap, HashSet};
use viper_il::{BlockId, Function, Module, Opcode, Temp, Type, Value};
use viper_verifier::dominator::DominatorTree;

pub struct Mem2Reg;

impl Pass for Mem2Reg {
    fn name(&self) -> &'static str {
        "mem2reg"
    }

    fn run(&self, module: &mut Module) {
        for func in &mut module.functions {
            let candidates = find_promotable_allocas(func);
            for cand in candidates {
                promote_one(func, cand);
            }
        }
    }
}

struct AllocaCandidate {
    temp: Temp,
    elem_ty: Type,
}

fn find_promotable_allocas(func: &Function) -> Vec<AllocaCandidate> {
    let mut candidates = Vec::new();
    for block in &func.blocks {
        for inst in &block.instrs {
            if inst.opcode != Opcode::Alloca {
                continue;
            }
            let Some(t) = inst.result_temp else { continue };
            if inst.operands.first() != Some(&Value::ConstI64(1)) {
                continue;
            }
            if !is_non_escaping(func, t) {
                continue;
            }
            let Some(elem_ty) = infer_elem_type(func, t) else {
                continue; // no load or store at all: nothing to promote, DCE's problem
            };
            candidates.push(AllocaCandidate { temp: t, elem_ty });
        }
    }
    candidates
}

fn is_non_escaping(func: &Function, alloca: Temp) -> bool {
    for block in &func.blocks {
        for inst in block.all_instrs() {
            if inst.opcode == Opcode::Alloca && inst.result_temp == Some(alloca) {
                continue;
            }
            let direct_ptr_use = matches!(inst.opcode, Opcode::Load | Opcode::Store)
                && inst.operands.first() == Some(&Value::Temp(alloca));
            let appears_elsewhere = inst
                .operands
                .iter()
                .enumerate()
                .any(|(i, op)| *op == Value::Temp(alloca) && !(direct_ptr_use && i == 0))
                || inst.targets.iter().any(|t| t.args.contains(&Value::Temp(alloca)));
            if appears_elsewhere {
                return false;
            }
        }
    }
    true
}

fn infer_elem_type(func: &Function, alloca: Temp) -> Option<Type> {
    for block in &func.blocks {
        for inst in block.all_instrs() {
            if inst.opcode == Opcode::Load && inst.operands.first() == Some(&Value::Temp(alloca)) {
                return Some(inst.result_type);
            }
            if inst.opcode == Opcode::Store && inst.operands.first() == Some(&Value::Temp(alloca)) {
                return Some(inst.operand_type);
            }
        }
    }
    None
}

fn zero_value(ty: Type) -> Value {
    match ty {
        Type::F64 => Value::ConstF64(0.0f64.to_bits()),
        Type::Ptr | Type::Obj | Type::Str => Value::NullPtr,
        _ => Value::ConstI64(0),
    }
}

/// Standard predecessor/dominance-frontier computation: `runner` walks up
/// the dominator tree from each predecessor of a join block until it hits
/// that block's immediate dominator, adding the join to every block it
/// passes through.
fn dominance_frontiers(func: &Function, dt: &DominatorTree) -> HashMap<BlockId, HashSet<BlockId>> {
    let mut df: HashMap<BlockId, HashSet<BlockId>> = HashMap::new();
    for b in &func.blocks {
        if !dt.is_reachable(b.id) {
            continue;
        }
        let preds = dt.predecessors(b.id);
        if preds.len() < 2 {
            continue;
        }
        let idom_b = dt.immediate_dominator(b.id);
        for &p in preds {
            if !dt.is_reachable(p) {
                continue;
            }
            let mut runner = p;
            loop {
                if Some(runner) == idom_b {
                    break;
                }
                df.entry(runner).or_default().insert(b.id);
                match dt.immediate_dominator(runner) {
                    Some(next) if next != runner => runner = next,
                    _ => break,
                }
            }
        }
    }
    df
}

fn promote_one(func: &mut Function, cand: AllocaCandidate) {
    let dt = DominatorTree::compute(func);

    let def_blocks: Vec<BlockId> = func
        .blocks
        .iter()
        .filter(|b| dt.is_reachable(b.id))
        .filter(|b| {
            b.instrs.iter().any(|i| {
                i.opcode == Opcode::Store && i.operands.first() == Some(&Value::Temp(cand.temp))
            })
        })
        .map(|b| b.id)
        .collect();

    let df = dominance_frontiers(func, &dt);

    let mut phi_blocks: HashSet<BlockId> = HashSet::new();
    let mut worklist = def_blocks;
    while let Some(b) = worklist.pop() {
        if let Some(frontier) = df.get(&b) {
            for &f in frontier {
                if phi_blocks.insert(f) {
                    worklist.push(f);
                }
            }
        }
    }

    let mut phi_temp: HashMap<BlockId, Temp> = HashMap::new();
    for &b in &phi_blocks {
        let t = func.fresh_temp();
        func.block_mut(b).unwrap().params.push((t, cand.elem_ty));
        phi_temp.insert(b, t);
    }

    let entry = func.blocks[0].id;
    let children = children_map(func, &dt);

    let mut substitution: HashMap<Temp, Value> = HashMap::new();
    let empty: Vec<BlockId> = Vec::new();
    let mut stack: Vec<(BlockId, Value)> = vec![(entry, zero_value(cand.elem_ty))];
    while let Some((b, mut current)) = stack.pop() {
        if let Some(&t) = phi_temp.get(&b) {
            current = Value::Temp(t);
        }
        {
            let block = func.block_mut(b).unwrap();
            for inst in block.instrs.iter_mut() {
                match inst.opcode {
                    Opcode::Store if inst.operands.first() == Some(&Value::Temp(cand.temp)) => {
                        current = inst.operands[1];
                    }
                    Opcode::Load if inst.operands.first() == Some(&Value::Temp(cand.temp)) => {
                        if let Some(t) = inst.result_temp {
                            substitution.insert(t, current);
                        }
                    }
                    _ => {}
                }
            }
            if let Some(term) = &mut block.terminator {
                for target in term.targets.iter_mut() {
                    if phi_temp.contains_key(&target.block) {
                        target.args.push(current);
                    }
                }
            }
        }
        for &child in children.get(&b).unwrap_or(&empty) {
            stack.push((child, current));
        }
    }

    apply_substitution(func, &substitution);

    for block in &mut func.blocks {
        block.instrs.retain(|inst| {
            let kills_alloca = inst.opcode == Opcode::Alloca && inst.result_temp == Some(cand.temp);
            let kills_store = inst.opcode == Opcode::Store
                && inst.operands.first() == Some(&Value::Temp(cand.temp));
            let kills_load = inst.opcode == Opcode::Load
                && inst.operands.first() == Some(&Value::Temp(cand.temp));
            !(kills_alloca || kills_store || kills_load)
        });
    }
}
