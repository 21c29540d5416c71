//! Sparse Conditional Constant Propagation (Wegman & Zadeck), spec.md §4.3.
//!
//! Tracks a per-temp lattice value (`Top` = not yet known, `ConstI64`/
//! `ConstF64` = proven constant, `Bottom` = proven variable) together with
//! block reachability, so a branch on a folded constant condition also
//! prunes the dead side from the lattice computation rather than merging
//! its block-parameter arguments in. Converges to a fixed point by
//! repeated sweeps rather than a true sparse worklist — the module sizes
//! this operates on don't make the difference observable, and the
//! repeated-sweep form is far easier to get right without a compiler to
//! check it against.

use crate::Pass;
use std::collections::{HashMap, HashSet};
use viper_il::{BlockId, Function, Instruction, Module, Opcode, Temp, Type, Value};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Lattice {
    Top,
    ConstI64(i64),
    ConstF64(u64),
    Bottom,
}

fn meet(a: Lattice, b: Lattice) -> Lattice {
    match (a, b) {
        (Lattice::Top, x) | (x, Lattice::Top) => x,
        (Lattice::Bottom, _) | (_, Lattice::Bottom) => Lattice::Bottom,
        (Lattice::ConstI64(x), Lattice::ConstI64(y)) if x == y => Lattice::ConstI64(x),
        (Lattice::ConstF64(x), Lattice::ConstF64(y)) if x == y => Lattice::ConstF64(x),
        _ => Lattice::Bottom,
    }
}

fn eval_value(v: Value, temp_value: &HashMap<Temp, Lattice>) -> Lattice {
    match v {
        Value::Temp(t) => temp_value.get(&t).copied().unwrap_or(Lattice::Top),
        Value::ConstI64(i) => Lattice::ConstI64(i),
        Value::ConstF64(bits) => Lattice::ConstF64(bits),
        Value::ConstStr(_) | Value::GlobalAddr(_) | Value::NullPtr => Lattice::Bottom,
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

fn eval_inst(inst: &Instruction, temp_value: &HashMap<Temp, Lattice>) -> Option<Lattice> {
    use Opcode::*;
    let ops: Vec<Lattice> = inst
        .operands
        .iter()
        .map(|v| eval_value(*v, temp_value))
        .collect();
    if ops.iter().any(|l| *l == Lattice::Bottom) {
        return Some(Lattice::Bottom);
    }
    if ops.iter().any(|l| *l == Lattice::Top) {
        return Some(Lattice::Top);
    }

    let int_pair = |i: usize, j: usize| -> Option<(i64, i64)> {
        match (ops.get(i)?, ops.get(j)?) {
            (Lattice::ConstI64(a), Lattice::ConstI64(b)) => Some((*a, *b)),
            _ => None,
        }
    };
    let float_pair = |i: usize, j: usize| -> Option<(f64, f64)> {
        match (ops.get(i)?, ops.get(j)?) {
            (Lattice::ConstF64(a), Lattice::ConstF64(b)) => {
                Some((f64::from_bits(*a), f64::from_bits(*b)))
            }
            _ => None,
        }
    };

    match inst.opcode {
        Add => int_pair(0, 1).map(|(a, b)| Lattice::ConstI64(truncate(a.wrapping_add(b), inst.result_type))),
        Sub => int_pair(0, 1).map(|(a, b)| Lattice::ConstI64(truncate(a.wrapping_sub(b), inst.result_type))),
        Mul => int_pair(0, 1).map(|(a, b)| Lattice::ConstI64(truncate(a.wrapping_mul(b), inst.result_type))),
        SDiv => int_pair(0, 1).and_then(|(a, b)| {
            (b != 0).then(|| Lattice::ConstI64(truncate(a.wrapping_div(b), inst.result_type)))
        }),
        UDiv => int_pair(0, 1).and_then(|(a, b)| {
            (b != 0).then(|| Lattice::ConstI64(truncate((a as u64 / b as u64) as i64, inst.result_type)))
        }),
        SRem => int_pair(0, 1).and_then(|(a, b)| {
            (b != 0).then(|| Lattice::ConstI64(truncate(a.wrapping_rem(b), inst.result_type)))
        }),
        URem => int_pair(0, 1).and_then(|(a, b)| {
            (b != 0).then(|| Lattice::ConstI64(truncate((a as u64 % b as u64) as i64, inst.result_type)))
        }),
        And => int_pair(0, 1).map(|(a, b)| Lattice::ConstI64(truncate(a & b, inst.result_type))),
        Or => int_pair(0, 1).map(|(a, b)| Lattice::ConstI64(truncate(a | b, inst.result_type))),
        Xor => int_pair(0, 1).map(|(a, b)| Lattice::ConstI64(truncate(a ^ b, inst.result_type))),
        Shl => int_pair(0, 1).map(|(a, b)| Lattice::ConstI64(truncate(a.wrapping_shl(b as u32), inst.result_type))),
        LShr => int_pair(0, 1)
            .map(|(a, b)| Lattice::ConstI64(truncate(((a as u64) >> (b as u32)) as i64, inst.result_type))),
        AShr => int_pair(0, 1).map(|(a, b)| Lattice::ConstI64(truncate(a.wrapping_shr(b as u32), inst.result_type))),
        FAdd => float_pair(0, 1).map(|(a, b)| Lattice::ConstF64((a + b).to_bits())),
        FSub => float_pair(0, 1).map(|(a, b)| Lattice::ConstF64((a - b).to_bits())),
        FMul => float_pair(0, 1).map(|(a, b)| Lattice::ConstF64((a * b).to_bits())),
        FDiv => float_pair(0, 1).map(|(a, b)| Lattice::ConstF64((a / b).to_bits())),
        ICmp(pred) => int_pair(0, 1).map(|(a, b)| {
            use viper_il::CmpPred::*;
            let r = match pred {
                Eq => a == b,
                Ne => a != b,
                Slt => a < b,
                Sle => a <= b,
                Sgt => a > b,
                Sge => a >= b,
                Ult => (a as u64) < (b as u64),
                Ule => (a as u64) <= (b as u64),
                Ugt => (a as u64) > (b as u64),
                Uge => (a as u64) >= (b as u64),
            };
            Lattice::ConstI64(r as i64)
        }),
        FCmpOrd(pred) => float_pair(0, 1).map(|(a, b)| {
            use viper_il::FCmpPred::*;
            let r = !a.is_nan()
                && !b.is_nan()
                && match pred {
                    Eq => a == b,
                    Ne => a != b,
                    Lt => a < b,
                    Le => a <= b,
                    Gt => a > b,
                    Ge => a >= b,
                };
            Lattice::ConstI64(r as i64)
        }),
        FCmpUno(pred) => float_pair(0, 1).map(|(a, b)| {
            use viper_il::FCmpPred::*;
            let r = a.is_nan()
                || b.is_nan()
                || match pred {
                    Eq => a == b,
                    Ne => a != b,
                    Lt => a < b,
                    Le => a <= b,
                    Gt => a > b,
                    Ge => a >= b,
                };
            Lattice::ConstI64(r as i64)
        }),
        SiToFp => match ops.first() {
            Some(Lattice::ConstI64(a)) => Some(Lattice::ConstF64((*a as f64).to_bits())),
            _ => None,
        },
        FpToSi => match ops.first() {
            Some(Lattice::ConstF64(bits)) => {
                Some(Lattice::ConstI64(truncate(f64::from_bits(*bits) as i64, inst.result_type)))
            }
            _ => None,
        },
        ZExt => match ops.first() {
            Some(Lattice::ConstI64(a)) => {
                let bits = inst.operand_type.int_bits().unwrap_or(64);
                let mask = if bits == 64 { u64::MAX } else { (1u64 << bits) - 1 };
                Some(Lattice::ConstI64(((*a as u64) & mask) as i64))
            }
            _ => None,
        },
        SExt | Trunc | Bitcast => match ops.first() {
            Some(Lattice::ConstI64(a)) => Some(Lattice::ConstI64(truncate(*a, inst.result_type))),
            _ => None,
        },
        _ => None,
    }
}

pub struct Sccp;

impl Pass for Sccp {
    fn name(&self) -> &'static str {
        "sccp"
    }

    fn run(&self, module: &mut Module) {
        for func in &mut module.functions {
            run_on_function(func);
        }
    }
}

fn run_on_function(func: &mut Function) {
    if func.blocks.is_empty() {
        return;
    }
    let entry = func.blocks[0].id;
    let mut temp_value: HashMap<Temp, Lattice> = HashMap::new();
    let mut executable: HashSet<BlockId> = HashSet::new();

    loop {
        let mut changed = false;
        let mut new_executable = HashSet::new();
        let mut incoming: HashMap<BlockId, Vec<Vec<Value>>> = HashMap::new();
        let mut stack = vec![entry];

        while let Some(b) = stack.pop() {
            if !new_executable.insert(b) {
                continue;
            }
            let Some(block) = func.block(b) else { continue };
            let Some(term) = &block.terminator else { continue };
            let mut push_edge = |target: &viper_il::BranchTarget, stack: &mut Vec<BlockId>| {
                incoming
                    .entry(target.block)
                    .or_default()
                    .push(target.args.clone());
                stack.push(target.block);
            };
            match term.opcode {
                Opcode::CBr => match eval_value(term.operands[0], &temp_value) {
                    Lattice::ConstI64(0) => push_edge(&term.targets[1], &mut stack),
                    Lattice::ConstI64(_) => push_edge(&term.targets[0], &mut stack),
                    _ => {
                        push_edge(&term.targets[0], &mut stack);
                        push_edge(&term.targets[1], &mut stack);
                    }
                },
                Opcode::Switch => match eval_value(term.operands[0], &temp_value) {
                    Lattice::ConstI64(v) => {
                        let idx = term
                            .switch_cases
                            .iter()
                            .position(|c| *c == v)
                            .unwrap_or(term.targets.len() - 1);
                        push_edge(&term.targets[idx], &mut stack);
                    }
                    _ => {
                        for t in &term.targets {
                            push_edge(t, &mut stack);
                        }
                    }
                },
                _ => {
                    for t in &term.targets {
                        push_edge(t, &mut stack);
                    }
                }
            }
        }
        if new_executable != executable {
            changed = true;
        }
        executable = new_executable;

        for block in &func.blocks {
            if !executable.contains(&block.id) {
                continue;
            }
            if let Some(edge_args) = incoming.get(&block.id) {
                for (pos, (t, _ty)) in block.params.iter().enumerate() {
                    let mut merged = Lattice::Top;
                    for args in edge_args {
                        let v = args.get(pos).copied().unwrap_or(Value::NullPtr);
                        merged = meet(merged, eval_value(v, &temp_value));
                    }
                    let old = temp_value.get(t).copied().unwrap_or(Lattice::Top);
                    let new = meet(old, merged);
                    if new != old {
                        temp_value.insert(*t, new);
                        changed = true;
                    }
                }
            }
            for inst in block.all_instrs() {
                let Some(t) = inst.result_temp else { continue };
                let Some(computed) = eval_inst(inst, &temp_value) else { continue };
                let old = temp_value.get(&t).copied().unwrap_or(Lattice::Top);
                let new = meet(old, computed);
                if new != old {
                    temp_value.insert(t, new);
                    changed = true;
                }
            }
        }

        if !changed {
            break;
        }
    }

    rewrite_constant_operands(func, &temp_value);
    fold_resolved_branches(func);
}

fn rewrite_constant_operands(func: &mut Function, temp_value: &HashMap<Temp, Lattice>) {
    let literal = |t: &Temp| match temp_value.get(t) {
        Some(Lattice::ConstI64(i)) => Some(Value::ConstI64(*i)),
        Some(Lattice::ConstF64(b)) => Some(Value::ConstF64(*b)),
        _ => None,
    };
    for block in &mut func.blocks {
        for inst in block.instrs.iter_mut().chain(block.terminator.iter_mut()) {
            for op in inst.operands.iter_mut() {
                if let Value::Temp(t) = op {
                    if let Some(v) = literal(t) {
                        *op = v;
                    }
                }
            }
            for target in inst.targets.iter_mut() {
                for arg in target.args.iter_mut() {
                    if let Value::Temp(t) = arg {
                        if let Some(v) = literal(t) {
                            *arg = v;
                        }
                    }
                }
            }
        }
    }
}

fn fold_resolved_branches(func: &mut Function) {
    for block in &mut func.blocks {
        let Some(term) = &block.terminator else { continue };
        if term.opcode != Opcode::CBr {
            continue;
        }
        let Some(Value::ConstI64(c)) = term.operands.first().copied() else { continue };
        let idx = if c == 0 { 1 } else { 0 };
        let target = term.targets[idx].clone();
        let mut new_term = Instruction::new(Opcode::Br, Type::Void);
        new_term.targets.push(target);
        new_term.source_loc = term.source_loc.clone();
        block.terminator = Some(new_term);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_il::{ModuleBuilder, Opcode as Op, Signature, Type};

    #[test]
    fn folds_arithmetic_through_a_temp_chain() {
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
        let a = fb.const_i64(Type::I64, 2).unwrap();
        let b = fb.const_i64(Type::I64, 3).unwrap();
        let sum = fb.binary(Op::Add, Type::I64, a, b).unwrap();
        let two = fb.const_i64(Type::I64, 2).unwrap();
        let doubled = fb.binary(Op::Mul, Type::I64, sum, two).unwrap();
        fb.ret(Some(doubled)).unwrap();
        fb.finish().unwrap();
        let mut module = m.finish();

        Sccp.run(&mut module);
        let ret = module.functions[0].blocks[0].terminator.as_ref().unwrap();
        assert_eq!(ret.operands[0], Value::ConstI64(10));
    }

    #[test]
    fn prunes_dead_side_of_constant_branch() {
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
        let join = fb.create_block("join").unwrap();
        let acc = fb.add_block_param(join, Type::I64).unwrap();

        fb.switch_to_block(entry);
        let cond = fb.const_i64(Type::I1, 1).unwrap();
        fb.cbr(cond, left, vec![], right, vec![]).unwrap();

        fb.switch_to_block(left);
        let one = fb.const_i64(Type::I64, 1).unwrap();
        fb.br(join, vec![one]).unwrap();

        fb.switch_to_block(right);
        // `right` is unreachable; its nonsense value must not pollute
        // the lattice for `acc`.
        let nonsense = fb.const_i64(Type::I64, 999).unwrap();
        fb.br(join, vec![nonsense]).unwrap();

        fb.switch_to_block(join);
        fb.ret(Some(Value::Temp(acc))).unwrap();

        fb.finish().unwrap();
        let mut module = m.finish();

        Sccp.run(&mut module);
        let entry_term = module.functions[0].blocks[0].terminator.as_ref().unwrap();
        assert_eq!(entry_term.opcode, Op::Br);
        let ret = module.functions[0]
            .blocks
            .iter()
            .find(|b| b.label == "join")
            .unwrap()
            .terminator
            .as_ref()
            .unwrap();
        assert_eq!(ret.operands[0], Value::ConstI64(1));
    }
}
