//! The `Value` operand kind: what an instruction can consume.

use crate::ids::{GlobalId, Temp};
use std::fmt;

/// A tagged union of everything an instruction operand can be. Temps are
/// produced by exactly one instruction; constants and globals are
/// materialized inline wherever they're used.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// SSA-like virtual register, unique within its function.
    Temp(Temp),
    ConstI64(i64),
    /// Bit pattern of an `f64`, carried as bits so `Value` stays `Eq`-able
    /// modulo NaN payload bits (two NaNs with the same bit pattern compare
    /// equal; this is intentional — the IL treats float constants as opaque
    /// bit patterns, not IEEE-754 values, until evaluated).
    ConstF64(u64),
    ConstStr(GlobalId),
    GlobalAddr(GlobalId),
    NullPtr,
}

impl Value {
    pub fn as_temp(self) -> Option<Temp> {
        match self {
            Value::Temp(t) => Some(t),
            _ => None,
        }
    }

    pub fn is_constant(self) -> bool {
        !matches!(self, Value::Temp(_))
    }

    pub fn const_f64(v: f64) -> Value {
        Value::ConstF64(v.to_bits())
    }

    pub fn as_f64(self) -> Option<f64> {
        match self {
            Value::ConstF64(bits) => Some(f64::from_bits(bits)),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Temp(t) => write!(f, "{t}"),
            Value::ConstI64(i) => write!(f, "{i}"),
            Value::ConstF64(bits) => write!(f, "{}", f64::from_bits(*bits)),
            Value::ConstStr(g) => write!(f, "const_str {g}"),
            Value::GlobalAddr(g) => write!(f, "global_addr {g}"),
            Value::NullPtr => write!(f, "null"),
        }
    }
}
