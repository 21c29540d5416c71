//! Cost-driven inlining (spec.md §4.3), built on the `CallGraph` SCC
//! analysis: a callee is never inlined into a site that participates in
//! its own recursion cycle, however cheap it looks, since that would
//! either loop forever or require unbounded unrolling.
//!
//! Inlining splices the callee's cloned blocks into the caller: the call
//! site's block is split at the call, the callee's entry becomes the
//! branch target of the split point, and every `Ret` in the cloned callee
//! becomes a `Br` into a new continuation block that takes the returned
//! value as a block parameter (or none, for a `Void` callee). This keeps
//! the caller's temps and block ids disjoint from the callee's by
//! allocating everything the clone needs fresh.

use crate::call_graph::CallGraph;
use crate::util::apply_substitution;
use crate::Pass;
use std::collections::HashMap;
use std::collections::HashSet;
use viper_il::{BasicBlock, BlockId, BranchTarget, FuncId, Function, Instruction, Module, Opcode, Temp, Type, Value};

#[derive(Debug, Clone)]
pub struct InlinerConfig {
    /// Max (cost-adjusted) instruction count of a callee to consider.
    pub instr_threshold: i32,
    /// Max number of blocks a callee may have to be considered at all.
    pub block_budget: usize,
    /// Number of whole-module fixed-point rounds to run; bounds how many
    /// inlining chains can stack (inlining A into B, then B into C, ...).
    pub depth: usize,
    pub const_arg_bonus: i32,
    pub single_use_bonus: i32,
    pub tiny_callee_bonus: i32,
    pub tiny_callee_instrs: i32,
}

impl Default for InlinerConfig {
    fn default() -> Self {
        InlinerConfig {
            instr_threshold: 80,
            block_budget: 8,
            depth: 3,
            const_arg_bonus: 4,
            single_use_bonus: 10,
            tiny_callee_bonus: 16,
            tiny_callee_instrs: 8,
        }
    }
}

pub struct Inliner {
    config: InlinerConfig,
}

impl Inliner {
    pub fn new(config: InlinerConfig) -> Self {
        Inliner { config }
    }
}

impl Pass for Inliner {
    fn name(&self) -> &'static str {
        "inliner"
    }

    fn run(&self, module: &mut Module) {
        let cg = CallGraph::build(module);
        let recursive: HashSet<FuncId> = cg
            .tarjan_scc()
            .into_iter()
            .filter(|scc| cg.is_recursive(scc))
            .flat_map(|scc| scc.into_iter())
            .collect();

        for _round in 0..self.config.depth {
            let use_count = count_call_sites(module);
            let mut any = false;
            for i in 0..module.functions.len() {
                let caller_id = FuncId(i as u32);
                loop {
                    let Some((block_id, idx, callee_id)) =
                        find_next_inlinable_call(module, caller_id, &recursive, &use_count, &self.config)
                    else {
                        break;
                    };
                    let callee = module.functions[callee_id.index()].clone();
                    let caller = &mut module.functions[i];
                    inline_call_at(caller, &callee, block_id, idx);
                    any = true;
                }
            }
            if !any {
                break;
            }
        }
    }
}

fn count_call_sites(module: &Module) -> HashMap<FuncId, usize> {
    let mut counts = HashMap::new();
    for func in &module.functions {
        for block in &func.blocks {
            for inst in block.all_instrs() {
                if inst.opcode == Opcode::Call {
                    if let Some(callee) = inst.callee {
                        *counts.entry(callee).or_insert(0) += 1;
                    }
                }
            }
        }
    }
    counts
}

fn contains_eh(func: &Function) -> bool {
    func.blocks.iter().any(|b| {
        b.all_instrs()
            .any(|i| matches!(i.opcode, Opcode::EhEntry | Opcode::EhThrow))
    })
}

fn callee_cost(callee: &Function, call_inst: &Instruction, uses: usize, config: &InlinerConfig) -> i32 {
    let instr_count: i32 = callee
        .blocks
        .iter()
        .map(|b| b.instrs.len() as i32 + b.terminator.is_some() as i32)
        .sum();
    let mut bonus = 0;
    if call_inst.operands.iter().any(|v| v.is_constant()) {
        bonus += config.const_arg_bonus;
    }
    if uses <= 1 {
        bonus += config.single_use_bonus;
    }
    if instr_count <= config.tiny_callee_instrs {
        bonus += config.tiny_callee_bonus;
    }
    instr_count - bonus
}

fn find_next_inlinable_call(
    module: &Module,
    caller_id: FuncId,
    recursive: &HashSet<FuncId>,
    use_count: &HashMap<FuncId, usize>,
    config: &InlinerConfig,
) -> Option<(BlockId, usize, FuncId)> {
    let caller = module.function(caller_id)?;
    for block in &caller.blocks {
        for (idx, inst) in block.instrs.iter().enumerate() {
            if inst.opcode != Opcode::Call {
                continue;
            }
            let Some(callee_id) = inst.callee else { continue };
            if recursive.contains(&callee_id) {
                continue;
            }
            let Some(callee) = module.function(callee_id) else { continue };
            if callee.blocks.len() > config.block_budget {
                continue;
            }
            if contains_eh(callee) {
                continue;
            }
            let uses = use_count.get(&callee_id).copied().unwrap_or(0);
            if callee_cost(callee, inst, uses, config) > config.instr_threshold {
                continue;
            }
            return Some((block.id, idx, callee_id));
        }
    }
    None
}

fn remap_instruction(inst: &Instruction, temp_map: &HashMap<Temp, Value>, block_map: &HashMap<BlockId, BlockId>) -> Instruction {
    let remap_value = |v: Value| -> Value {
        match v {
            Value::Temp(t) => temp_map.get(&t).copied().unwrap_or(Value::Temp(t)),
            other => other,
        }
    };
    let mut new_inst = inst.clone();
    new_inst.operands = inst.operands.iter().map(|v| remap_value(*v)).collect();
    if let Some(t) = inst.result_temp {
        new_inst.result_temp = temp_map.get(&t).and_then(|v| v.as_temp());
    }
    new_inst.targets = inst
        .targets
        .iter()
        .map(|bt| {
            BranchTarget::new(
                block_map.get(&bt.block).copied().unwrap_or(bt.block),
                bt.args.iter().map(|a| remap_value(*a)).collect(),
            )
        })
        .collect();
    new_inst
}

fn inline_call_at(caller: &mut Function, callee: &Function, block_id: BlockId, idx: usize) {
    let block_idx = caller.block_index(block_id).unwrap();
    let call_inst = caller.blocks[block_idx].instrs[idx].clone();

    let mut temp_map: HashMap<Temp, Value> = HashMap::new();
    for ((t, _ty), arg) in callee.params.iter().zip(call_inst.operands.iter()) {
        temp_map.insert(*t, *arg);
    }
    for b in &callee.blocks {
        for (t, _) in &b.params {
            temp_map.entry(*t).or_insert_with(|| Value::Temp(caller.fresh_temp()));
        }
        for inst in b.all_instrs() {
            if let Some(t) = inst.result_temp {
                temp_map.entry(t).or_insert_with(|| Value::Temp(caller.fresh_temp()));
            }
        }
    }

    let mut next_block_num = caller.blocks.iter().map(|b| b.id.0).max().unwrap_or(0) + 1;
    let mut block_map: HashMap<BlockId, BlockId> = HashMap::new();
    for b in &callee.blocks {
        block_map.insert(b.id, BlockId(next_block_num));
        next_block_num += 1;
    }
    let continuation_id = BlockId(next_block_num);

    let result_ty = call_inst.result_type;
    let continuation_param = if call_inst.result_temp.is_some() && result_ty != Type::Void {
        Some(caller.fresh_temp())
    } else {
        None
    };

    if let (Some(orig_t), Some(new_t)) = (call_inst.result_temp, continuation_param) {
        let mut subst = HashMap::new();
        subst.insert(orig_t, Value::Temp(new_t));
        apply_substitution(caller, &subst);
    }

    let orig_label = caller.blocks[block_idx].label.clone();
    let before: Vec<Instruction> = caller.blocks[block_idx].instrs[..idx].to_vec();
    let after: Vec<Instruction> = caller.blocks[block_idx].instrs[idx + 1..].to_vec();
    let orig_terminator = caller.blocks[block_idx].terminator.clone();

    let mut new_blocks = Vec::new();
    let callee_entry_id = callee.blocks[0].id;
    for b in &callee.blocks {
        let new_id = block_map[&b.id];
        let params = if b.id == callee_entry_id {
            Vec::new()
        } else {
            b.params
                .iter()
                .map(|(t, ty)| (temp_map[t].as_temp().unwrap(), *ty))
                .collect()
        };
        let mut new_block = BasicBlock::new(new_id, format!("{}.inl{}", b.label, new_id.0));
        new_block.params = params;
        for inst in &b.instrs {
            new_block.instrs.push(remap_instruction(inst, &temp_map, &block_map));
        }
        if let Some(term) = &b.terminator {
            if term.opcode == Opcode::Ret {
                let mut br = Instruction::new(Opcode::Br, Type::Void);
                let args = match (continuation_param, term.operands.first()) {
                    (Some(_), Some(v)) => {
                        let remapped = match v {
                            Value::Temp(t) => temp_map.get(t).copied().unwrap_or(Value::Temp(*t)),
                            other => *other,
                        };
                        vec![remapped]
                    }
                    _ => vec![],
                };
                br.targets.push(BranchTarget::new(continuation_id, args));
                br.source_loc = term.source_loc.clone();
                new_block.terminator = Some(br);
            } else {
                new_block.terminator = Some(remap_instruction(term, &temp_map, &block_map));
            }
        }
        new_blocks.push(new_block);
    }

    let mut continuation = BasicBlock::new(continuation_id, format!("{}.cont{}", orig_label, continuation_id.0));
    if let Some(t) = continuation_param {
        continuation.params.push((t, result_ty));
    }
    continuation.instrs = after;
    continuation.terminator = orig_terminator;

    caller.blocks[block_idx].instrs = before;
    let mut jump = Instruction::new(Opcode::Br, Type::Void);
    jump.targets.push(BranchTarget::new(block_map[&callee_entry_id], vec![]));
    caller.blocks[block_idx].terminator = Some(jump);

    new_blocks.push(continuation);
    let insert_at = block_idx + 1;
    for (offset, b) in new_blocks.into_iter().enumerate() {
        caller.blocks.insert(insert_at + offset, b);
    }
}
