//! Small newtype identifiers used throughout the IL.
//!
//! Kept as distinct types (rather than bare `u32`) so the verifier and
//! passes can't accidentally compare a temp id against a block id.

use std::fmt;

macro_rules! index_id {
    ($name:ident, $prefix:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", $prefix, self.0)
            }
        }
    };
}

index_id!(Temp, "%t");
index_id!(BlockId, "bb");
index_id!(FuncId, "@f");
index_id!(GlobalId, "@g");
