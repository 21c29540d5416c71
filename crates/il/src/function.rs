//! `Function`: `{ name, signature, params, blocks, attrs }` (spec.md §3).

use crate::block::BasicBlock;
use crate::ids::{BlockId, Temp};
use crate::inst::SourceLoc;
use crate::types::Type;
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Signature {
    pub param_types: Vec<Type>,
    pub return_type: Type,
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, t) in self.param_types.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{t}")?;
        }
        write!(f, ") -> {}", self.return_type)
    }
}

/// Per-function attributes. Extensible without breaking the data model:
/// front ends set what they know, passes (notably the inliner) read them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FunctionAttrs {
    pub inline_hint: bool,
    pub no_inline: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: String,
    pub signature: Signature,
    /// The entry block's parameters, which are bound to the function's
    /// actual arguments at call time. Block 0 (the entry) has no
    /// parameters of its own beyond these.
    pub params: Vec<(Temp, Type)>,
    pub blocks: Vec<BasicBlock>,
    pub attrs: FunctionAttrs,
    pub source_loc: Option<SourceLoc>,
    next_temp: u32,
}

impl Function {
    pub fn new(name: impl Into<String>, signature: Signature) -> Self {
        Function {
            name: name.into(),
            signature,
            params: Vec::new(),
            blocks: Vec::new(),
            attrs: FunctionAttrs::default(),
            source_loc: None,
            next_temp: 0,
        }
    }

    pub fn entry_block(&self) -> &BasicBlock {
        &self.blocks[0]
    }

    pub fn entry_block_mut(&mut self) -> &mut BasicBlock {
        &mut self.blocks[0]
    }

    pub fn block(&self, id: BlockId) -> Option<&BasicBlock> {
        self.blocks.iter().find(|b| b.id == id)
    }

    pub fn block_mut(&mut self, id: BlockId) -> Option<&mut BasicBlock> {
        self.blocks.iter_mut().find(|b| b.id == id)
    }

    pub fn block_index(&self, id: BlockId) -> Option<usize> {
        self.blocks.iter().position(|b| b.id == id)
    }

    /// Allocates the next monotonically-increasing temp id for this
    /// function. Used by the builder; exposed so passes that introduce new
    /// temps (Mem2Reg, the inliner) can keep the invariant alive.
    pub fn fresh_temp(&mut self) -> Temp {
        let t = Temp(self.next_temp);
        self.next_temp += 1;
        t
    }

    /// Builds a map from every temp defined in this function to its result
    /// type, scanning function params, block params, and instruction
    /// results. Used by the verifier and by passes that need type lookups
    /// without re-deriving them.
    pub fn temp_types(&self) -> HashMap<Temp, Type> {
        let mut map = HashMap::new();
        for (t, ty) in &self.params {
            map.insert(*t, *ty);
        }
        for block in &self.blocks {
            for (t, ty) in &block.params {
                map.insert(*t, *ty);
            }
            for inst in block.all_instrs() {
                if let Some(t) = inst.result_temp {
                    map.insert(t, inst.result_type);
                }
            }
        }
        map
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fn {}{} {{\n", self.name, self.signature)?;
        for block in &self.blocks {
            write!(f, "{block}")?;
        }
        write!(f, "}}")
    }
}
