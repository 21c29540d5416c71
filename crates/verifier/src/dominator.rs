//! Cooper-Harvey-Kennedy iterative dominator tree construction.
//!
//! Reference: Cooper, Harvey, Kennedy, "A Simple, Fast Dominance Algorithm"
//! (2001). Operates on the reverse-postorder numbering of the blocks
//! reachable from the entry block; blocks unreachable from entry (legal IR,
//! just dead) get no dominator and trivially dominate only themselves.

use std::collections::HashMap;
use viper_il::{BasicBlock, BlockId, Function};

pub struct DominatorTree {
    /// Reverse-postorder position of each reachable block, used both to
    /// drive the fixed-point iteration and to answer intersect() queries in
    /// O(depth).
    rpo_index: HashMap<BlockId, usize>,
    rpo: Vec<BlockId>,
    /// Immediate dominator, indexed by rpo position. `idom[0] == 0` (the
    /// entry is its own idom, the conventional sentinel).
    idom: Vec<usize>,
    preds: HashMap<BlockId, Vec<BlockId>>,
}

fn successors(inst_targets: &[viper_il::BranchTarget]) -> impl Iterator<Item = BlockId> + '_ {
    inst_targets.iter().map(|t| t.block)
}

fn block_successors(b: &BasicBlock) -> Vec<BlockId> {
    match &b.terminator {
        Some(term) => successors(&term.targets).collect(),
        None => Vec::new(),
    }
}

impl DominatorTree {
    pub fn compute(func: &Function) -> Self {
        let entry = func.blocks[0].id;

        // DFS for reverse postorder.
        let mut visited = std::collections::HashSet::new();
        let mut postorder = Vec::new();
        let mut stack = vec![(entry, false)];
        while let Some((b, processed)) = stack.pop() {
            if processed {
                postorder.push(b);
                continue;
            }
            if !visited.insert(b) {
                continue;
            }
            stack.push((b, true));
            if let Some(block) = func.block(b) {
                for succ in block_successors(block) {
                    if !visited.contains(&succ) {
                        stack.push((succ, false));
                    }
                }
            }
        }
        let mut rpo = postorder;
        rpo.reverse();
        let rpo_index: HashMap<BlockId, usize> =
            rpo.iter().enumerate().map(|(i, b)| (*b, i)).collect();

        let mut preds: HashMap<BlockId, Vec<BlockId>> = HashMap::new();
        for block in &func.blocks {
            for succ in block_successors(block) {
                preds.entry(succ).or_default().push(block.id);
            }
        }

        let n = rpo.len();
        let mut idom = vec![usize::MAX; n];
        idom[0] = 0;
        let mut changed = true;
        while changed {
            changed = false;
            for i in 1..n {
                let b = rpo[i];
                let block_preds = preds.get(&b).cloned().unwrap_or_default();
                let mut new_idom: Option<usize> = None;
                for p in &block_preds {
                    let Some(&pi) = rpo_index.get(p) else { continue };
                    if idom[pi] == usize::MAX && pi != 0 {
                        continue;
                    }
                    new_idom = Some(match new_idom {
                        None => pi,
                        Some(cur) => intersect(&idom, cur, pi),
                    });
                }
                if let Some(ni) = new_idom {
                    if idom[i] != ni {
                        idom[i] = ni;
                        changed = true;
                    }
                }
            }
        }

        DominatorTree {
            rpo_index,
            rpo,
            idom,
            preds,
        }
    }

    pub fn is_reachable(&self, b: BlockId) -> bool {
        self.rpo_index.contains_key(&b)
    }

    pub fn predecessors(&self, b: BlockId) -> &[BlockId] {
        self.preds.get(&b).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Does `a` dominate `b`? A block always dominates itself.
    pub fn dominates(&self, a: BlockId, b: BlockId) -> bool {
        let (Some(&ai), Some(&bi)) = (self.rpo_index.get(&a), self.rpo_index.get(&b)) else {
            return false;
        };
        if ai == bi {
            return true;
        }
        let mut cur = bi;
        while cur != 0 {
            cur = self.idom[cur];
            if cur == ai {
                return true;
            }
        }
        false
    }

    pub fn immediate_dominator(&self, b: BlockId) -> Option<BlockId> {
        let &bi = self.rpo_index.get(&b)?;
        if bi == 0 {
            return None;
        }
        Some(self.rpo[self.idom[bi]])
    }
}

fn intersect(idom: &[usize], mut a: usize, mut b: usize) -> usize {
    while a != b {
        while a > b {
            a = idom[a];
        }
        while b > a {
            b = idom[b];
        }
    }
    a
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_il::{ModuleBuilder, Opcode, Signature, Type};

    #[test]
    fn diamond_cfg_dominance() {
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
        let join = fb.create_block("join").unwrap();
        let acc = fb.add_block_param(join, Type::I64).unwrap();

        fb.switch_to_block(entry);
        let cond = viper_il::Value::Temp(viper_il::Temp(0));
        let one = fb.const_i64(Type::I64, 1).unwrap();
        let two = fb.const_i64(Type::I64, 2).unwrap();
        fb.cbr(cond, left, vec![], right, vec![]).unwrap();

        fb.switch_to_block(left);
        fb.br(join, vec![one]).unwrap();

        fb.switch_to_block(right);
        fb.br(join, vec![two]).unwrap();

        fb.switch_to_block(join);
        fb.ret(Some(viper_il::Value::Temp(acc))).unwrap();

        let id = fb.finish().unwrap();
        let module = m.finish();
        let func = module.function(id).unwrap();
        let dt = DominatorTree::compute(func);

        assert!(dt.dominates(entry, left));
        assert!(dt.dominates(entry, right));
        assert!(dt.dominates(entry, join));
        assert!(!dt.dominates(left, right));
        assert!(!dt.dominates(right, left));
        assert!(!dt.dominates(left, join));
        assert_eq!(dt.immediate_dominator(join), Some(entry));
    }
}
