//! `FunctionExecCache` (spec.md §4.7): per-function operand classification,
//! built eagerly for every function when the module loads and kept for the
//! rest of the `VM`'s life — modules are immutable once loaded, so there's
//! nothing to invalidate it.

use std::collections::HashMap;
use viper_il::{Function, GlobalId, Temp, Type, Value};

/// How an instruction's operand is resolved at run time.
#[derive(Debug, Clone, Copy)]
pub enum OperandClass {
    /// A local, read by direct index into the frame's `locals` array.
    Reg(Temp),
    ImmI64(i64),
    ImmF64(u64),
    Cold(ColdOperand),
}

/// Operands that need a table lookup rather than a hot-path read: globals
/// and interned string literals are materialized, not stored inline.
#[derive(Debug, Clone, Copy)]
pub enum ColdOperand {
    GlobalAddr(GlobalId),
    ConstStr(GlobalId),
    NullPtr,
}

pub fn classify(v: Value) -> OperandClass {
    match v {
        Value::Temp(t) => OperandClass::Reg(t),
        Value::ConstI64(k) => OperandClass::ImmI64(k),
        Value::ConstF64(bits) => OperandClass::ImmF64(bits),
        Value::GlobalAddr(g) => OperandClass::Cold(ColdOperand::GlobalAddr(g)),
        Value::ConstStr(g) => OperandClass::Cold(ColdOperand::ConstStr(g)),
        Value::NullPtr => OperandClass::Cold(ColdOperand::NullPtr),
    }
}

pub struct FunctionExecCache {
    pub temp_types: HashMap<Temp, Type>,
    pub temp_count: usize,
    pub param_count: usize,
    /// `[block_index][instr_index][operand_index]`, `instr_index` running
    /// over `all_instrs()` (non-terminators then the terminator).
    pub operand_classes: Vec<Vec<Vec<OperandClass>>>,
}

impl FunctionExecCache {
    pub fn build(func: &Function) -> Self {
        let temp_types = func.temp_types();
        let temp_count = temp_types
            .keys()
            .map(|t| t.index() + 1)
            .max()
            .unwrap_or(0)
            .max(func.params.len());
        let param_count = func.params.len();
        let operand_classes = func
            .blocks
            .iter()
            .map(|b| {
                b.all_instrs()
                    .map(|i| i.operands.iter().map(|&v| classify(v)).collect())
                    .collect()
            })
            .collect();
        FunctionExecCache {
            temp_types,
            temp_count,
            param_count,
            operand_classes,
        }
    }
}
