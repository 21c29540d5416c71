//! Runtime support for the Viper VM: the reference-counted heap and
//! interned strings (C6), and the process-global extern registry (C4).
//!
//! `viper-rt` has no dependency on `viper-vm`; the VM depends on it. This
//! keeps the heap/registry free of any interpreter-loop concerns so they can
//! be exercised and reasoned about independently, matching the teacher's
//! split of a narrow `seq-core` crate beneath its larger `seq-runtime`.

pub mod abi;
pub mod heap;
pub mod registry;
pub mod strings;

pub use abi::NativeValue;
pub use heap::{heap_alloc, release, retain, Finalizer, Header, IMMORTAL, RT_MAGIC};
pub use registry::{lookup, register, unregister, ExternDesc, ExternHandler};
pub use strings::{alloc_string, intern};
