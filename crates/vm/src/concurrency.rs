//! Program-wide state shared by VMs that cooperate as threads of the same
//! logical program (spec.md §4.8, §9 "Concurrency").
//!
//! Grounded on the teacher's `scheduler.rs` `ACTIVE_STRANDS` bookkeeping: a
//! small piece of counted, lock-guarded global state that every worker
//! thread's runtime touches. Here the counted state is the set of mutable
//! globals a program's functions can read and write; unlike the teacher's
//! green threads, Viper VMs map onto real OS threads, so the sharing is a
//! plain `RwLock`, not a cooperative scheduler handoff.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use viper_il::GlobalId;

use crate::frame::RtValue;

/// Context a program's extern handlers might consult; currently just an
/// identifier distinguishing independently-loaded programs in logs.
#[derive(Debug, Default)]
pub struct RtContext {
    pub program_id: u64,
}

/// State shared by every `VM` running the same loaded program as a thread,
/// as opposed to two independent VMs that happen to share no state
/// (spec.md §9's two threading patterns).
pub struct ProgramState {
    pub globals: RwLock<HashMap<GlobalId, RtValue>>,
    pub runtime_ctx: RtContext,
}

static NEXT_PROGRAM_ID: AtomicU64 = AtomicU64::new(1);

impl ProgramState {
    pub fn new() -> Arc<Self> {
        let program_id = NEXT_PROGRAM_ID.fetch_add(1, Ordering::Relaxed);
        Arc::new(ProgramState {
            globals: RwLock::new(HashMap::new()),
            runtime_ctx: RtContext { program_id },
        })
    }

    pub fn read_global(&self, id: GlobalId) -> Option<RtValue> {
        self.globals.read().expect("program globals lock poisoned").get(&id).copied()
    }

    pub fn write_global(&self, id: GlobalId, value: RtValue) {
        self.globals
            .write()
            .expect("program globals lock poisoned")
            .insert(id, value);
    }

    /// Seeds a global's initial value the first time any VM sharing this
    /// program state loads the module; a VM that joins later sees whatever
    /// the first one already wrote instead of resetting it.
    pub fn write_global_if_absent(&self, id: GlobalId, value: RtValue) {
        self.globals
            .write()
            .expect("program globals lock poisoned")
            .entry(id)
            .or_insert(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn globals_written_by_one_handle_are_visible_through_another() {
        let state = ProgramState::new();
        let other = Arc::clone(&state);
        other.write_global(GlobalId(0), RtValue::I64(42));
        assert_eq!(state.read_global(GlobalId(0)).unwrap().as_i64(), 42);
    }

    #[test]
    fn distinct_program_states_get_distinct_program_ids() {
        let a = ProgramState::new();
        let b = ProgramState::new();
        assert_ne!(a.runtime_ctx.program_id, b.runtime_ctx.program_id);
    }
}
