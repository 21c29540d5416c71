//! Per-opcode operand/result type checking (spec.md §4.2 step (d)).

use crate::Diagnostic;
use std::collections::HashMap;
use viper_il::{Function, Instruction, Module, Opcode, Temp, Type, Value};

fn value_type(val: Value, temp_types: &HashMap<Temp, Type>) -> Option<Type> {
    match val {
        Value::Temp(t) => temp_types.get(&t).copied(),
        // Constants have no fixed type; they're compatible with whatever
        // the consuming instruction expects, so we return `None` to mean
        // "don't constrain" rather than a specific `Type`.
        Value::ConstI64(_) | Value::ConstF64(_) | Value::ConstStr(_) | Value::GlobalAddr(_) | Value::NullPtr => {
            None
        }
    }
}

fn operand_kind_ok(expected: Type, val: Value) -> bool {
    match val {
        Value::ConstI64(_) => expected.is_integer(),
        Value::ConstF64(_) => expected == Type::F64,
        Value::ConstStr(_) => expected == Type::Str,
        Value::GlobalAddr(_) => expected == Type::Ptr,
        Value::NullPtr => expected == Type::Ptr || expected == Type::Obj,
        Value::Temp(_) => true, // checked separately against temp_types
    }
}

fn check_operand(
    expected: Type,
    val: Value,
    temp_types: &HashMap<Temp, Type>,
    func: &str,
    inst: &Instruction,
) -> Result<(), Diagnostic> {
    if !operand_kind_ok(expected, val) {
        return Err(Diagnostic::TypeMismatch {
            func: func.to_string(),
            inst: inst.to_string(),
            expected,
            found: val.to_string(),
        });
    }
    if let Some(found) = value_type(val, temp_types) {
        if found != expected {
            return Err(Diagnostic::TypeMismatch {
                func: func.to_string(),
                inst: inst.to_string(),
                expected,
                found: found.to_string(),
            });
        }
    }
    Ok(())
}

pub fn typecheck_instruction(
    func: &Function,
    inst: &Instruction,
    temp_types: &HashMap<Temp, Type>,
    module: &Module,
) -> Result<(), Diagnostic> {
    use Opcode::*;
    match inst.opcode {
        Add | Sub | Mul | SDiv | UDiv | SRem | URem | And | Or | Xor | Shl | LShr | AShr => {
            if !inst.result_type.is_integer() {
                return Err(Diagnostic::TypeMismatch {
                    func: func.name.clone(),
                    inst: inst.to_string(),
                    expected: Type::I64,
                    found: inst.result_type.to_string(),
                });
            }
            for op in &inst.operands {
                check_operand(inst.result_type, *op, temp_types, &func.name, inst)?;
            }
        }
        FAdd | FSub | FMul | FDiv => {
            if inst.result_type != Type::F64 {
                return Err(Diagnostic::TypeMismatch {
                    func: func.name.clone(),
                    inst: inst.to_string(),
                    expected: Type::F64,
                    found: inst.result_type.to_string(),
                });
            }
            for op in &inst.operands {
                check_operand(Type::F64, *op, temp_types, &func.name, inst)?;
            }
        }
        ICmp(_) => {
            if inst.result_type != Type::I1 {
                return Err(Diagnostic::TypeMismatch {
                    func: func.name.clone(),
                    inst: inst.to_string(),
                    expected: Type::I1,
                    found: inst.result_type.to_string(),
                });
            }
            for op in &inst.operands {
                check_operand(inst.operand_type, *op, temp_types, &func.name, inst)?;
            }
        }
        FCmpOrd(_) | FCmpUno(_) => {
            if inst.result_type != Type::I1 {
                return Err(Diagnostic::TypeMismatch {
                    func: func.name.clone(),
                    inst: inst.to_string(),
                    expected: Type::I1,
                    found: inst.result_type.to_string(),
                });
            }
            for op in &inst.operands {
                check_operand(Type::F64, *op, temp_types, &func.name, inst)?;
            }
        }
        SiToFp | FpToSi | ZExt | SExt | Trunc | Bitcast => {
            if let Some(op) = inst.operands.first() {
                check_operand(inst.operand_type, *op, temp_types, &func.name, inst)?;
            }
        }
        Alloca => {
            if let Some(op) = inst.operands.first() {
                check_operand(Type::I64, *op, temp_types, &func.name, inst)?;
            }
            if inst.result_type != Type::Ptr {
                return Err(Diagnostic::TypeMismatch {
                    func: func.name.clone(),
                    inst: inst.to_string(),
                    expected: Type::Ptr,
                    found: inst.result_type.to_string(),
                });
            }
        }
        Load => {
            if let Some(op) = inst.operands.first() {
                check_operand(Type::Ptr, *op, temp_types, &func.name, inst)?;
            }
        }
        Store => {
            if inst.operands.len() != 2 {
                return Err(Diagnostic::Malformed {
                    func: func.name.clone(),
                    inst: inst.to_string(),
                    reason: "store requires (ptr, value) operands".to_string(),
                });
            }
            check_operand(Type::Ptr, inst.operands[0], temp_types, &func.name, inst)?;
            check_operand(inst.operand_type, inst.operands[1], temp_types, &func.name, inst)?;
        }
        Gep => {
            if inst.operands.len() != 2 {
                return Err(Diagnostic::Malformed {
                    func: func.name.clone(),
                    inst: inst.to_string(),
                    reason: "gep requires (base, offset) operands".to_string(),
                });
            }
            check_operand(Type::Ptr, inst.operands[0], temp_types, &func.name, inst)?;
            check_operand(Type::I64, inst.operands[1], temp_types, &func.name, inst)?;
        }
        CBr => {
            if let Some(cond) = inst.operands.first() {
                check_operand(Type::I1, *cond, temp_types, &func.name, inst)?;
            }
        }
        Call => {
            let sig = inst
                .callee
                .and_then(|id| module.function(id))
                .map(|f| f.signature.clone());
            if let Some(sig) = sig {
                if inst.operands.len() != sig.param_types.len() {
                    return Err(Diagnostic::CallArityMismatch {
                        func: func.name.clone(),
                        inst: inst.to_string(),
                        expected: sig.param_types.len(),
                        found: inst.operands.len(),
                    });
                }
                for (op, expected) in inst.operands.iter().zip(sig.param_types.iter()) {
                    check_operand(*expected, *op, temp_types, &func.name, inst)?;
                }
            }
        }
        ConstI64 | ConstF64 | ConstStr | GlobalAddr | NullPtr | Br | Switch | Ret | Trap
        | CallIndirect | SDivChk0 | IdxChk | CastSiNarrowChk | EhEntry | EhThrow => {
            // Covered by structural checks (arity, targets) elsewhere; no
            // further per-operand type table entry needed.
        }
    }
    Ok(())
}
