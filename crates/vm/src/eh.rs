//! EH scope table and unwind search (spec.md §4.7 "Trap unwinding").
//!
//! A function's landing pad is the first `EhEntry`-marked block found in its
//! block list, if any. This models a single try-region per function; nested
//! or multiple guarded regions within one function are a documented
//! simplification — the core doesn't filter which trap kinds a landing pad
//! accepts either (spec.md §9 leaves kind matching to front-end-generated
//! code inside the pad, which can inspect the bound kind and re-`eh_throw`
//! if it doesn't match). The unwinder's only job is finding the nearest
//! enclosing pad and discarding the frames above it.

use viper_il::{BlockId, Function, Opcode};

#[derive(Debug, Clone, Copy, Default)]
pub struct EhScopeTable {
    pub handler: Option<BlockId>,
}

pub fn build(func: &Function) -> EhScopeTable {
    let handler = func.blocks.iter().find_map(|b| {
        b.instrs
            .first()
            .and_then(|i| (i.opcode == Opcode::EhEntry).then_some(b.id))
    });
    EhScopeTable { handler }
}

/// Searches `frames` (innermost last, matching a call stack) for the
/// nearest frame whose function has a landing pad. Returns the frame's
/// index and the landing pad block to resume at.
pub fn find_handler<F>(frames: &[F], scope_of: impl Fn(&F) -> EhScopeTable) -> Option<(usize, BlockId)> {
    frames
        .iter()
        .enumerate()
        .rev()
        .find_map(|(idx, frame)| scope_of(frame).handler.map(|block| (idx, block)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_il::{Instruction, ModuleBuilder, Signature, Type};

    #[test]
    fn function_with_eh_entry_block_is_found_as_handler() {
        let mut mb = ModuleBuilder::new();
        let mut fb = mb.new_function("f", Signature::default());
        let entry = fb.create_block("entry").unwrap();
        fb.switch_to_block(entry);
        fb.ret(None).unwrap();

        let pad = fb.create_block("pad").unwrap();
        fb.switch_to_block(pad);
        let mut eh_entry = Instruction::new(Opcode::EhEntry, Type::I64);
        eh_entry.operand_type = Type::Void;
        fb.append(eh_entry, None).unwrap();
        fb.ret(None).unwrap();

        let func_id = fb.finish().unwrap();
        let module = mb.finish();
        let func = module.function(func_id).unwrap();

        let table = build(func);
        assert_eq!(table.handler, Some(pad));
    }

    #[test]
    fn function_without_eh_entry_has_no_handler() {
        let mut mb = ModuleBuilder::new();
        let mut fb = mb.new_function("f", Signature::default());
        let entry = fb.create_block("entry").unwrap();
        fb.switch_to_block(entry);
        fb.ret(None).unwrap();
        let func_id = fb.finish().unwrap();
        let module = mb.finish();
        let func = module.function(func_id).unwrap();

        assert_eq!(build(func).handler, None);
    }
}
