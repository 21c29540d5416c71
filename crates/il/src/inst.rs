//! `Instruction`: `{ opcode, result_type, result_temp?, operands, source_loc?,
//! block_param_bundles? }` (spec.md §3).

use crate::ids::{BlockId, FuncId, GlobalId, Temp};
use crate::opcode::Opcode;
use crate::trap::TrapKind;
use crate::types::Type;
use crate::value::Value;
use std::fmt;
use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq)]
pub struct SourceLoc {
    pub file: PathBuf,
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for SourceLoc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file.display(), self.line, self.column)
    }
}

/// An edge's argument bundle: the block it targets plus the values bound to
/// that block's parameter list. This is the explicit, sized-operand-group
/// modeling of phi-equivalent block parameters called for in spec.md §9
/// ("Block-parameter bundles as implicit phi-nodes").
#[derive(Debug, Clone, PartialEq)]
pub struct BranchTarget {
    pub block: BlockId,
    pub args: Vec<Value>,
}

impl BranchTarget {
    pub fn new(block: BlockId, args: Vec<Value>) -> Self {
        BranchTarget { block, args }
    }
}

/// Payload for `ConstI64`/`ConstF64`/`GlobalAddr`/`ConstStr`/`Trap`/`EhThrow`
/// that doesn't fit the `operands: Vec<Value>` shape (a plain immediate, or
/// the global/trap-kind a producing instruction materializes).
#[derive(Debug, Clone, PartialEq)]
pub enum Imm {
    I64(i64),
    F64Bits(u64),
    Global(GlobalId),
    Trap(TrapKind, String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub opcode: Opcode,
    pub result_type: Type,
    /// The type operands are checked against when it differs from
    /// `result_type` (comparisons, casts, `Store`'s value operand). Left as
    /// `result_type` for opcodes where operand and result type coincide
    /// (arithmetic, bitwise).
    pub operand_type: Type,
    pub result_temp: Option<Temp>,
    pub operands: Vec<Value>,
    /// Non-operand-list payload (constants, trap kind/message).
    pub imm: Option<Imm>,
    /// Callee for `Call`; unused for other opcodes.
    pub callee: Option<FuncId>,
    /// Edges out of this instruction: exactly one for `Br`, two for `CBr`
    /// (then, else), N+1 for `Switch` (cases..., default).
    pub targets: Vec<BranchTarget>,
    /// Case values for `Switch`, parallel to `targets[..targets.len()-1]`.
    pub switch_cases: Vec<i64>,
    pub source_loc: Option<SourceLoc>,
}

impl Instruction {
    pub fn new(opcode: Opcode, result_type: Type) -> Self {
        Instruction {
            opcode,
            result_type,
            operand_type: result_type,
            result_temp: None,
            operands: Vec::new(),
            imm: None,
            callee: None,
            targets: Vec::new(),
            switch_cases: Vec::new(),
            source_loc: None,
        }
    }

    pub fn is_terminator(&self) -> bool {
        self.opcode.is_terminator()
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(t) = self.result_temp {
            write!(f, "{t} = ")?;
        }
        write!(f, "{}", self.opcode)?;
        if let Some(imm) = &self.imm {
            match imm {
                Imm::I64(i) => write!(f, " {i}")?,
                Imm::F64Bits(bits) => write!(f, " {}", f64::from_bits(*bits))?,
                Imm::Global(g) => write!(f, " {g}")?,
                Imm::Trap(k, msg) => write!(f, " {k} \"{msg}\"")?,
            }
        }
        if let Some(callee) = self.callee {
            write!(f, " {callee}")?;
        }
        for (i, op) in self.operands.iter().enumerate() {
            write!(f, "{}{}", if i == 0 { " " } else { ", " }, op)?;
        }
        for (i, target) in self.targets.iter().enumerate() {
            if i > 0 || !self.operands.is_empty() {
                write!(f, ", ")?;
            } else {
                write!(f, " ")?;
            }
            write!(f, "{}(", target.block)?;
            for (j, a) in target.args.iter().enumerate() {
                if j > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{a}")?;
            }
            write!(f, ")")?;
        }
        if let Some(loc) = &self.source_loc {
            write!(f, " ; {loc}")?;
        }
        Ok(())
    }
}
