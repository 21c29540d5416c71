//! The fixed opcode set, partitioned per spec.md §3.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpPred {
    Eq,
    Ne,
    Slt,
    Sle,
    Sgt,
    Sge,
    Ult,
    Ule,
    Ugt,
    Uge,
}

impl fmt::Display for CmpPred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CmpPred::Eq => "eq",
            CmpPred::Ne => "ne",
            CmpPred::Slt => "slt",
            CmpPred::Sle => "sle",
            CmpPred::Sgt => "sgt",
            CmpPred::Sge => "sge",
            CmpPred::Ult => "ult",
            CmpPred::Ule => "ule",
            CmpPred::Ugt => "ugt",
            CmpPred::Uge => "uge",
        };
        f.write_str(s)
    }
}

/// Ordered/unordered float predicate, shared by `FCmpOrd`/`FCmpUno`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FCmpPred {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl fmt::Display for FCmpPred {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FCmpPred::Eq => "eq",
            FCmpPred::Ne => "ne",
            FCmpPred::Lt => "lt",
            FCmpPred::Le => "le",
            FCmpPred::Gt => "gt",
            FCmpPred::Ge => "ge",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    // -- opaque constant producers --
    ConstI64,
    ConstF64,
    ConstStr,
    GlobalAddr,
    NullPtr,

    // -- integer arithmetic --
    Add,
    Sub,
    Mul,
    SDiv,
    UDiv,
    SRem,
    URem,

    // -- float arithmetic --
    FAdd,
    FSub,
    FMul,
    FDiv,

    // -- bitwise / shifts --
    And,
    Or,
    Xor,
    Shl,
    LShr,
    AShr,

    // -- comparisons --
    ICmp(CmpPred),
    FCmpOrd(FCmpPred),
    FCmpUno(FCmpPred),

    // -- casts --
    SiToFp,
    FpToSi,
    ZExt,
    SExt,
    Trunc,
    Bitcast,

    // -- memory --
    Alloca,
    Load,
    Store,
    Gep,

    // -- control (terminators) --
    Br,
    CBr,
    Switch,
    Ret,
    Trap,

    // -- calls --
    Call,
    CallIndirect,

    // -- checked arithmetic / index --
    SDivChk0,
    IdxChk,
    CastSiNarrowChk,

    // -- exception handling --
    EhEntry,
    EhThrow,
}

impl Opcode {
    /// Terminators are exactly: `Br`, `CBr`, `Switch`, `Ret`, `Trap`, `EhThrow`.
    pub fn is_terminator(self) -> bool {
        matches!(
            self,
            Opcode::Br | Opcode::CBr | Opcode::Switch | Opcode::Ret | Opcode::Trap | Opcode::EhThrow
        )
    }

    pub fn is_pure(self) -> bool {
        !matches!(
            self,
            Opcode::Store
                | Opcode::Call
                | Opcode::CallIndirect
                | Opcode::Br
                | Opcode::CBr
                | Opcode::Switch
                | Opcode::Ret
                | Opcode::Trap
                | Opcode::EhThrow
                | Opcode::EhEntry
                | Opcode::Alloca
                | Opcode::SDivChk0
                | Opcode::IdxChk
                | Opcode::CastSiNarrowChk
        )
    }

    pub fn produces_result(self) -> bool {
        !matches!(
            self,
            Opcode::Store
                | Opcode::Br
                | Opcode::CBr
                | Opcode::Switch
                | Opcode::Ret
                | Opcode::Trap
                | Opcode::EhThrow
                | Opcode::EhEntry
        )
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Opcode::ConstI64 => write!(f, "const_i64"),
            Opcode::ConstF64 => write!(f, "const_f64"),
            Opcode::ConstStr => write!(f, "const_str"),
            Opcode::GlobalAddr => write!(f, "global_addr"),
            Opcode::NullPtr => write!(f, "null_ptr"),
            Opcode::Add => write!(f, "add"),
            Opcode::Sub => write!(f, "sub"),
            Opcode::Mul => write!(f, "mul"),
            Opcode::SDiv => write!(f, "sdiv"),
            Opcode::UDiv => write!(f, "udiv"),
            Opcode::SRem => write!(f, "srem"),
            Opcode::URem => write!(f, "urem"),
            Opcode::FAdd => write!(f, "fadd"),
            Opcode::FSub => write!(f, "fsub"),
            Opcode::FMul => write!(f, "fmul"),
            Opcode::FDiv => write!(f, "fdiv"),
            Opcode::And => write!(f, "and"),
            Opcode::Or => write!(f, "or"),
            Opcode::Xor => write!(f, "xor"),
            Opcode::Shl => write!(f, "shl"),
            Opcode::LShr => write!(f, "lshr"),
            Opcode::AShr => write!(f, "ashr"),
            Opcode::ICmp(p) => write!(f, "icmp.{p}"),
            Opcode::FCmpOrd(p) => write!(f, "fcmp_ord.{p}"),
            Opcode::FCmpUno(p) => write!(f, "fcmp_uno.{p}"),
            Opcode::SiToFp => write!(f, "si_to_fp"),
            Opcode::FpToSi => write!(f, "fp_to_si"),
            Opcode::ZExt => write!(f, "zext"),
            Opcode::SExt => write!(f, "sext"),
            Opcode::Trunc => write!(f, "trunc"),
            Opcode::Bitcast => write!(f, "bitcast"),
            Opcode::Alloca => write!(f, "alloca"),
            Opcode::Load => write!(f, "load"),
            Opcode::Store => write!(f, "store"),
            Opcode::Gep => write!(f, "gep"),
            Opcode::Br => write!(f, "br"),
            Opcode::CBr => write!(f, "cbr"),
            Opcode::Switch => write!(f, "switch"),
            Opcode::Ret => write!(f, "ret"),
            Opcode::Trap => write!(f, "trap"),
            Opcode::Call => write!(f, "call"),
            Opcode::CallIndirect => write!(f, "call_indirect"),
            Opcode::SDivChk0 => write!(f, "sdiv_chk0"),
            Opcode::IdxChk => write!(f, "idx_chk"),
            Opcode::CastSiNarrowChk => write!(f, "cast_si_narrow_chk"),
            Opcode::EhEntry => write!(f, "eh_entry"),
            Opcode::EhThrow => write!(f, "eh_throw"),
        }
    }
}
