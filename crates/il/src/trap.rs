//! The closed set of runtime trap kinds (spec.md §4.5, §6).
//!
//! Defined in `viper-il` (rather than `viper-rt`) because `Trap`/`EhThrow`
//! instructions carry a `TrapKind` operand and the verifier needs to
//! typecheck it without depending on the runtime crate.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrapKind {
    Overflow,
    DivByZero,
    IndexOutOfBounds,
    NullPointer,
    StackOverflow,
    InvalidCast,
    UserTrap,
}

impl fmt::Display for TrapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TrapKind::Overflow => "overflow",
            TrapKind::DivByZero => "div_by_zero",
            TrapKind::IndexOutOfBounds => "index_out_of_bounds",
            TrapKind::NullPointer => "null_pointer",
            TrapKind::StackOverflow => "stack_overflow",
            TrapKind::InvalidCast => "invalid_cast",
            TrapKind::UserTrap => "user_trap",
        };
        f.write_str(s)
    }
}
