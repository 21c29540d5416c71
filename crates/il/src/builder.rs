//! IL Builder API (spec.md §4.1): the only supported way to grow a `Module`.
//!
//! Guarantees: temp ids increase monotonically per function, block labels
//! are unique within a function, and small source-language integer
//! literals are promoted to their declared IL type at the point they're
//! materialized (the IL itself never implicitly widens — front ends still
//! own emitting `ZExt`/`SExt`/`Trunc`/`SiToFp` for value-to-value
//! conversions; this builder convenience only covers literal construction).

use crate::block::BasicBlock;
use crate::function::{Function, Signature};
use crate::ids::{BlockId, FuncId, GlobalId, Temp};
use crate::inst::{BranchTarget, Imm, Instruction, SourceLoc};
use crate::module::{ExternDecl, Global, GlobalInit, Module};
use crate::opcode::Opcode;
use crate::trap::TrapKind;
use crate::types::Type;
use crate::value::Value;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BuilderError {
    #[error("duplicate block label `{0}` in function `{1}`")]
    DuplicateBlockLabel(String, String),
    #[error("appended instruction after terminator in block `{0}`")]
    AppendAfterTerminator(String),
    #[error("block `{0}` has no terminator")]
    MissingTerminator(String),
    #[error("unknown extern `{0}`")]
    UnknownExtern(String),
    #[error("unknown function `{0}`")]
    UnknownFunction(String),
    #[error("no current block selected")]
    NoCurrentBlock,
    #[error("literal integer `{0}` does not fit in `{1}`")]
    LiteralOutOfRange(i64, Type),
}

/// Builds a single function body. Obtained from `ModuleBuilder::new_function`.
pub struct FunctionBuilder<'m> {
    module: &'m mut ModuleBuilder,
    func: Function,
    current: Option<BlockId>,
    next_block: u32,
    labels: HashMap<String, BlockId>,
}

impl<'m> FunctionBuilder<'m> {
    pub fn create_block(&mut self, label: impl Into<String>) -> Result<BlockId, BuilderError> {
        let label = label.into();
        if self.labels.contains_key(&label) {
            return Err(BuilderError::DuplicateBlockLabel(label, self.func.name.clone()));
        }
        let id = BlockId(self.next_block);
        self.next_block += 1;
        self.labels.insert(label.clone(), id);
        self.func.blocks.push(BasicBlock::new(id, label));
        Ok(id)
    }

    pub fn add_block_param(&mut self, block: BlockId, ty: Type) -> Result<Temp, BuilderError> {
        let t = self.func.fresh_temp();
        let b = self
            .func
            .block_mut(block)
            .ok_or(BuilderError::NoCurrentBlock)?;
        b.params.push((t, ty));
        Ok(t)
    }

    pub fn switch_to_block(&mut self, block: BlockId) {
        self.current = Some(block);
    }

    fn current_block_mut(&mut self) -> Result<&mut BasicBlock, BuilderError> {
        let id = self.current.ok_or(BuilderError::NoCurrentBlock)?;
        self.func.block_mut(id).ok_or(BuilderError::NoCurrentBlock)
    }

    /// Appends a non-terminator instruction, setting its result temp if the
    /// opcode produces one. Returns the fresh `Value::Temp` so callers can
    /// chain it straight into the next instruction's operands.
    pub fn append(&mut self, mut inst: Instruction, loc: Option<SourceLoc>) -> Result<Value, BuilderError> {
        if inst.opcode.is_terminator() {
            return self.append_terminator(inst, loc).map(|_| Value::NullPtr);
        }
        let produces = inst.opcode.produces_result();
        let temp = if produces { Some(self.func.fresh_temp()) } else { None };
        inst.result_temp = temp;
        inst.source_loc = loc;
        let block_label = self.current_label()?;
        let block = self.current_block_mut()?;
        if block.terminator.is_some() {
            return Err(BuilderError::AppendAfterTerminator(block_label));
        }
        block.instrs.push(inst);
        Ok(temp.map(Value::Temp).unwrap_or(Value::NullPtr))
    }

    pub fn append_terminator(
        &mut self,
        mut inst: Instruction,
        loc: Option<SourceLoc>,
    ) -> Result<(), BuilderError> {
        debug_assert!(inst.opcode.is_terminator());
        inst.source_loc = loc;
        let block_label = self.current_label()?;
        let block = self.current_block_mut()?;
        if block.terminator.is_some() {
            return Err(BuilderError::AppendAfterTerminator(block_label));
        }
        block.terminator = Some(inst);
        Ok(())
    }

    fn current_label(&mut self) -> Result<String, BuilderError> {
        let id = self.current.ok_or(BuilderError::NoCurrentBlock)?;
        Ok(self.func.block(id).map(|b| b.label.clone()).unwrap_or_default())
    }

    // -- convenience constructors for common instructions --

    pub fn const_i64(&mut self, ty: Type, v: i64) -> Result<Value, BuilderError> {
        if let Some(bits) = ty.int_bits() {
            if bits < 64 {
                let max = (1i64 << (bits - 1)) - 1;
                let min = -(1i64 << (bits - 1));
                if ty != Type::I1 && (v > max || v < min) {
                    return Err(BuilderError::LiteralOutOfRange(v, ty));
                }
            }
        }
        let mut inst = Instruction::new(Opcode::ConstI64, ty);
        inst.imm = Some(Imm::I64(v));
        self.append(inst, None)
    }

    pub fn const_f64(&mut self, v: f64) -> Result<Value, BuilderError> {
        let mut inst = Instruction::new(Opcode::ConstF64, Type::F64);
        inst.imm = Some(Imm::F64Bits(v.to_bits()));
        self.append(inst, None)
    }

    pub fn binary(&mut self, opcode: Opcode, ty: Type, lhs: Value, rhs: Value) -> Result<Value, BuilderError> {
        let mut inst = Instruction::new(opcode, ty);
        inst.operands = vec![lhs, rhs];
        self.append(inst, None)
    }

    /// `ICmp`/`FCmpOrd`/`FCmpUno`: operands share `operand_ty`, result is
    /// always `I1`.
    pub fn cmp(&mut self, opcode: Opcode, operand_ty: Type, lhs: Value, rhs: Value) -> Result<Value, BuilderError> {
        let mut inst = Instruction::new(opcode, Type::I1);
        inst.operand_type = operand_ty;
        inst.operands = vec![lhs, rhs];
        self.append(inst, None)
    }

    /// Casts (`SiToFp`, `FpToSi`, `ZExt`, `SExt`, `Trunc`, `Bitcast`):
    /// `operand_ty` is the source type, `result_ty` the destination type.
    pub fn cast(&mut self, opcode: Opcode, operand_ty: Type, result_ty: Type, val: Value) -> Result<Value, BuilderError> {
        let mut inst = Instruction::new(opcode, result_ty);
        inst.operand_type = operand_ty;
        inst.operands = vec![val];
        self.append(inst, None)
    }

    pub fn alloca(&mut self, count: Value) -> Result<Value, BuilderError> {
        let mut inst = Instruction::new(Opcode::Alloca, Type::Ptr);
        inst.operand_type = Type::I64;
        inst.operands = vec![count];
        self.append(inst, None)
    }

    pub fn load(&mut self, ty: Type, ptr: Value) -> Result<Value, BuilderError> {
        let mut inst = Instruction::new(Opcode::Load, ty);
        inst.operand_type = Type::Ptr;
        inst.operands = vec![ptr];
        self.append(inst, None)
    }

    pub fn store(&mut self, value_ty: Type, ptr: Value, val: Value) -> Result<(), BuilderError> {
        let mut inst = Instruction::new(Opcode::Store, Type::Void);
        inst.operand_type = value_ty;
        inst.operands = vec![ptr, val];
        self.append(inst, None)?;
        Ok(())
    }

    pub fn gep(&mut self, base: Value, offset: Value) -> Result<Value, BuilderError> {
        let mut inst = Instruction::new(Opcode::Gep, Type::Ptr);
        inst.operand_type = Type::I64;
        inst.operands = vec![base, offset];
        self.append(inst, None)
    }

    /// `idx_chk index, lo, hi`: traps `IndexOutOfBounds` unless
    /// `lo <= index < hi`, otherwise yields `index` unchanged.
    pub fn idx_chk(&mut self, index: Value, lo: Value, hi: Value) -> Result<Value, BuilderError> {
        let mut inst = Instruction::new(Opcode::IdxChk, Type::I64);
        inst.operand_type = Type::I64;
        inst.operands = vec![index, lo, hi];
        self.append(inst, None)
    }

    pub fn ret(&mut self, val: Option<Value>) -> Result<(), BuilderError> {
        let mut inst = Instruction::new(Opcode::Ret, Type::Void);
        if let Some(v) = val {
            inst.operands.push(v);
        }
        self.append_terminator(inst, None)
    }

    pub fn br(&mut self, target: BlockId, args: Vec<Value>) -> Result<(), BuilderError> {
        let mut inst = Instruction::new(Opcode::Br, Type::Void);
        inst.targets.push(BranchTarget::new(target, args));
        self.append_terminator(inst, None)
    }

    pub fn cbr(
        &mut self,
        cond: Value,
        then_target: BlockId,
        then_args: Vec<Value>,
        else_target: BlockId,
        else_args: Vec<Value>,
    ) -> Result<(), BuilderError> {
        let mut inst = Instruction::new(Opcode::CBr, Type::Void);
        inst.operands.push(cond);
        inst.targets.push(BranchTarget::new(then_target, then_args));
        inst.targets.push(BranchTarget::new(else_target, else_args));
        self.append_terminator(inst, None)
    }

    pub fn trap(&mut self, kind: TrapKind, msg: impl Into<String>) -> Result<(), BuilderError> {
        let mut inst = Instruction::new(Opcode::Trap, Type::Void);
        inst.imm = Some(Imm::Trap(kind, msg.into()));
        self.append_terminator(inst, None)
    }

    pub fn call(
        &mut self,
        callee: FuncId,
        ty: Type,
        args: Vec<Value>,
    ) -> Result<Value, BuilderError> {
        let mut inst = Instruction::new(Opcode::Call, ty);
        inst.callee = Some(callee);
        inst.operands = args;
        self.append(inst, None)
    }

    /// Finishes this function, verifying every block has a terminator, and
    /// hands it back to the module builder.
    pub fn finish(mut self) -> Result<FuncId, BuilderError> {
        for b in &self.func.blocks {
            if b.terminator.is_none() {
                return Err(BuilderError::MissingTerminator(b.label.clone()));
            }
        }
        let id = FuncId(self.module.module.functions.len() as u32);
        self.module.module.functions.push(self.func);
        Ok(id)
    }
}

#[derive(Default)]
pub struct ModuleBuilder {
    module: Module,
    interned_strings: HashMap<Vec<u8>, GlobalId>,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        ModuleBuilder::default()
    }

    pub fn new_function(&mut self, name: impl Into<String>, signature: Signature) -> FunctionBuilder<'_> {
        let name = name.into();
        let mut func = Function::new(name, signature.clone());
        let mut params = Vec::new();
        for ty in &signature.param_types {
            // params are allocated before any block so temp numbering in
            // the entry block's body continues from them, matching the
            // "entry has no parameters other than the function parameters"
            // invariant.
            let t = func.fresh_temp();
            params.push((t, *ty));
        }
        func.params = params;
        FunctionBuilder {
            module: self,
            func,
            current: None,
            next_block: 0,
            labels: HashMap::new(),
        }
    }

    pub fn declare_extern(&mut self, name: impl Into<String>, signature: Signature) {
        self.module.externs.push(ExternDecl {
            name: name.into(),
            signature,
        });
    }

    /// Interns a string literal as a `Str`-typed global, canonicalizing
    /// repeated literal bytes to the same `GlobalId` (mirrors the runtime's
    /// FNV-1a string intern table at the IL-construction level).
    pub fn intern_string(&mut self, bytes: &[u8]) -> GlobalId {
        if let Some(id) = self.interned_strings.get(bytes) {
            return *id;
        }
        let id = GlobalId(self.module.globals.len() as u32);
        self.module.globals.push(Global {
            id,
            name: format!("str.{}", id.0),
            ty: Type::Str,
            initializer: Some(GlobalInit::Bytes(bytes.to_vec())),
            is_const: true,
        });
        self.interned_strings.insert(bytes.to_vec(), id);
        id
    }

    pub fn add_global(&mut self, name: impl Into<String>, ty: Type, initializer: Option<GlobalInit>, is_const: bool) -> GlobalId {
        let id = GlobalId(self.module.globals.len() as u32);
        self.module.globals.push(Global {
            id,
            name: name.into(),
            ty,
            initializer,
            is_const,
        });
        id
    }

    pub fn finish(self) -> Module {
        self.module
    }
}
