//! Small helpers shared by the dominator-tree-walking passes (Mem2Reg,
//! EarlyCSE, MemorySSA+DSE): building the dominator tree's children map for
//! a preorder walk, and resolving/substituting temp-typed operands.

use std::collections::HashMap;
use viper_il::{BlockId, Function, Temp, Value};
use viper_verifier::dominator::DominatorTree;

/// Maps each reachable non-entry block to its dominator-tree children, so
/// callers can do a preorder DFS without re-deriving it from `idom` lookups
/// at every step.
pub(crate) fn children_map(func: &Function, dt: &DominatorTree) -> HashMap<BlockId, Vec<BlockId>> {
    let entry = func.blocks[0].id;
    let mut children: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
    for b in &func.blocks {
        if b.id == entry || !dt.is_reachable(b.id) {
            continue;
        }
        if let Some(p) = dt.immediate_dominator(b.id) {
            children.entry(p).or_default().push(b.id);
        }
    }
    children
}

/// Follows a chain of temp -> value substitutions to its end. Bounded
/// because a well-formed SSA def chain can't cycle, but a buggy pass
/// feeding this a cycle shouldn't hang the compiler.
pub(crate) fn resolve(v: Value, subst: &HashMap<Temp, Value>) -> Value {
    let mut cur = v;
    for _ in 0..64 {
        if let Value::Temp(t) = cur {
            if let Some(&next) = subst.get(&t) {
                cur = next;
                continue;
            }
        }
        break;
    }
    cur
}

/// Rewrites every operand and branch-argument use in `func` through
/// `resolve`.
pub(crate) fn apply_substitution(func: &mut Function, subst: &HashMap<Temp, Value>) {
    for block in &mut func.blocks {
        for inst in block.instrs.iter_mut().chain(block.terminator.iter_mut()) {
            for op in inst.operands.iter_mut() {
                *op = resolve(*op, subst);
            }
            for t in inst.targets.iter_mut() {
                for a in t.args.iter_mut() {
                    *a = resolve(*a, subst);
                }
            }
        }
    }
}
