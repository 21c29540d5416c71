//! DCE (spec.md §4.3): worklist-based dead code elimination. Every
//! instruction whose opcode isn't pure (stores, calls, traps, terminators,
//! allocas, the checked arithmetic family, EH instructions) is live
//! unconditionally; liveness then propagates backward through operands —
//! an instruction is live if a live instruction uses its result. Anything
//! left unmarked is unreachable from any externally-observable effect and
//! is dropped.
//!
//! Block parameters are left untouched: pruning an unused block parameter
//! would require rewriting the argument list of every predecessor's branch,
//! which this pass doesn't attempt. Values flowing into block params are
//! therefore treated as live because they are always reached via a
//! terminator, which is itself always live.

use crate::Pass;
use std::collections::{HashMap, HashSet};
use viper_il::{BlockId, Function, Module};

pub struct Dce;

impl Pass for Dce {
    fn name(&self) -> &'static str {
        "dce"
    }

    fn run(&self, module: &mut Module) {
        for func in &mut module.functions {
            run_on_function(func);
        }
    }
}

fn run_on_function(func: &mut Function) {
    let mut def_of: HashMap<viper_il::Temp, (BlockId, usize)> = HashMap::new();
    for block in &func.blocks {
        for (idx, inst) in block.instrs.iter().enumerate() {
            if let Some(t) = inst.result_temp {
                def_of.insert(t, (block.id, idx));
            }
        }
    }

    let mut live: HashSet<(BlockId, usize)> = HashSet::new();
    let mut worklist: Vec<viper_il::Temp> = Vec::new();

    for block in &func.blocks {
        for (idx, inst) in block.instrs.iter().enumerate() {
            if !inst.opcode.is_pure() {
                live.insert((block.id, idx));
                for op in &inst.operands {
                    if let Some(t) = op.as_temp() {
                        worklist.push(t);
                    }
                }
            }
        }
        if let Some(term) = &block.terminator {
            for op in &term.operands {
                if let Some(t) = op.as_temp() {
                    worklist.push(t);
                }
            }
            for target in &term.targets {
                for arg in &target.args {
                    if let Some(t) = arg.as_temp() {
                        worklist.push(t);
                    }
                }
            }
        }
    }

    while let Some(t) = worklist.pop() {
        let Some(&(b, idx)) = def_of.get(&t) else {
            continue;
        };
        if live.insert((b, idx)) {
            let inst = &func.block(b).unwrap().instrs[idx];
            for op in &inst.operands {
                if let Some(ot) = op.as_temp() {
                    worklist.push(ot);
                }
            }
        }
    }

    for block in &mut func.blocks {
        let id = block.id;
        let mut i = 0;
        block.instrs.retain(|_| {
            let keep = live.contains(&(id, i));
            i += 1;
            keep
        });
    }
}
