//! `BasicBlock`: `{ label, params, instrs, terminator }` (spec.md §3).

use crate::ids::{BlockId, Temp};
use crate::inst::Instruction;
use crate::types::Type;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub id: BlockId,
    pub label: String,
    pub params: Vec<(Temp, Type)>,
    /// Non-terminator instructions, in order.
    pub instrs: Vec<Instruction>,
    /// Exactly one terminator, always the block's last instruction.
    pub terminator: Option<Instruction>,
}

impl BasicBlock {
    pub fn new(id: BlockId, label: impl Into<String>) -> Self {
        BasicBlock {
            id,
            label: label.into(),
            params: Vec::new(),
            instrs: Vec::new(),
            terminator: None,
        }
    }

    /// All instructions including the terminator, in execution order.
    pub fn all_instrs(&self) -> impl Iterator<Item = &Instruction> {
        self.instrs.iter().chain(self.terminator.iter())
    }

    pub fn is_entry_block(&self) -> bool {
        self.id.0 == 0
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label)?;
        if !self.params.is_empty() {
            write!(f, "(")?;
            for (i, (t, ty)) in self.params.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{t}: {ty}")?;
            }
            write!(f, ")")?;
        }
        writeln!(f, ":")?;
        for inst in &self.instrs {
            writeln!(f, "    {inst}")?;
        }
        if let Some(term) = &self.terminator {
            writeln!(f, "    {term}")?;
        }
        Ok(())
    }
}
