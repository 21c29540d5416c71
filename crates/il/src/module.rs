//! `Module`: `{ il_version, functions, globals, externs }` (spec.md §3).

use crate::function::{Function, Signature};
use crate::ids::{FuncId, GlobalId};
use crate::types::Type;
use std::fmt;

/// IL version carried in the textual header, e.g. `il 0.1.2` (spec.md §6).
pub const IL_VERSION: &str = "0.1.2";

#[derive(Debug, Clone, PartialEq)]
pub struct Global {
    pub id: GlobalId,
    pub name: String,
    pub ty: Type,
    pub initializer: Option<GlobalInit>,
    pub is_const: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum GlobalInit {
    Bytes(Vec<u8>),
    I64(i64),
    F64Bits(u64),
    Zeroed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternDecl {
    pub name: String,
    pub signature: Signature,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Module {
    pub il_version: String,
    pub functions: Vec<Function>,
    pub globals: Vec<Global>,
    pub externs: Vec<ExternDecl>,
}

impl Default for Module {
    fn default() -> Self {
        Module {
            il_version: IL_VERSION.to_string(),
            functions: Vec::new(),
            globals: Vec::new(),
            externs: Vec::new(),
        }
    }
}

impl Module {
    pub fn new() -> Self {
        Module::default()
    }

    pub fn function(&self, id: FuncId) -> Option<&Function> {
        self.functions.get(id.index())
    }

    pub fn function_mut(&mut self, id: FuncId) -> Option<&mut Function> {
        self.functions.get_mut(id.index())
    }

    pub fn find_function_id(&self, name: &str) -> Option<FuncId> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|i| FuncId(i as u32))
    }

    pub fn global(&self, id: GlobalId) -> Option<&Global> {
        self.globals.get(id.index())
    }

    pub fn extern_decl(&self, name: &str) -> Option<&ExternDecl> {
        self.externs.iter().find(|e| e.name == name)
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "il {}", self.il_version)?;
        for g in &self.globals {
            let init = match &g.initializer {
                Some(GlobalInit::Bytes(b)) => {
                    format!(" = {:?}", String::from_utf8_lossy(b))
                }
                Some(GlobalInit::I64(i)) => format!(" = {i}"),
                Some(GlobalInit::F64Bits(bits)) => format!(" = {}", f64::from_bits(*bits)),
                Some(GlobalInit::Zeroed) | None => String::new(),
            };
            writeln!(
                f,
                "global {} {} {}{init}",
                g.id,
                g.ty,
                if g.is_const { "const" } else { "mut" }
            )?;
        }
        for e in &self.externs {
            writeln!(f, "extern {}{}", e.name, e.signature)?;
        }
        writeln!(f)?;
        for (i, func) in self.functions.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            writeln!(f, "{func}")?;
        }
        Ok(())
    }
}
