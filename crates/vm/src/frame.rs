//! Per-call interpreter frame (spec.md §4.7 "Frame").

use std::ptr::NonNull;
use std::rc::Rc;
use viper_il::{BlockId, FuncId, Temp};

use crate::exec_cache::FunctionExecCache;

/// Fixed size of a frame's `Alloca` bump arena. Exceeding it traps
/// `StackOverflow` rather than growing — growing would reallocate the
/// backing buffer and invalidate every pointer `Alloca` has already handed
/// out to this frame.
const ALLOCA_ARENA_SIZE: usize = 64 * 1024;

/// The interpreter's runtime value representation. Distinct from
/// `viper_il::Value`, the IL's compile-time operand representation: a
/// `Str`/`Obj` temp holds an actual heap pointer at runtime, and `Value` has
/// no variant for that — only for constants (`ConstStr`) and globals
/// (`GlobalAddr`) that still need to be materialized.
#[derive(Debug, Clone, Copy)]
pub enum RtValue {
    I1(bool),
    I16(i16),
    I32(i32),
    I64(i64),
    F64(f64),
    Ptr(usize),
    Str(NonNull<u8>),
    Obj(NonNull<u8>),
    Void,
}

impl RtValue {
    pub fn as_i64(&self) -> i64 {
        match *self {
            RtValue::I1(b) => b as i64,
            RtValue::I16(v) => v as i64,
            RtValue::I32(v) => v as i64,
            RtValue::I64(v) => v,
            other => panic!("as_i64 on non-integer runtime value: {other:?}"),
        }
    }

    pub fn as_f64(&self) -> f64 {
        match *self {
            RtValue::F64(v) => v,
            other => panic!("as_f64 on non-float runtime value: {other:?}"),
        }
    }

    pub fn as_bool(&self) -> bool {
        match *self {
            RtValue::I1(b) => b,
            other => panic!("as_bool on non-i1 runtime value: {other:?}"),
        }
    }

    pub fn heap_ptr(&self) -> Option<NonNull<u8>> {
        match *self {
            RtValue::Str(p) | RtValue::Obj(p) => Some(p),
            _ => None,
        }
    }
}

/// One activation of a function. `locals` is indexed directly by `Temp::index()`
/// rather than hashed, mirroring spec.md's "hot operands classified as
/// `Reg(temp_id)`, read without map lookups".
pub struct Frame {
    pub func_id: FuncId,
    pub block_id: BlockId,
    /// Index of the next instruction to execute within the current block,
    /// counting the terminator as the last entry.
    pub ip: usize,
    locals: Vec<Option<RtValue>>,
    /// Temps borrowed from the caller (function parameters): not released
    /// when the frame is torn down, per spec.md §4.6 "parameters are
    /// borrowed, the callee does not release them on exit".
    borrowed: Vec<bool>,
    pub operand_stack: Vec<RtValue>,
    alloca_buffer: Vec<u8>,
    alloca_cursor: usize,
    pub exec_cache: Rc<FunctionExecCache>,
    /// Where the caller's `Call` instruction wants this frame's return value
    /// written, if any. Set by the interpreter right after pushing the
    /// frame; `None` for the outermost (entry) frame.
    pub caller_result_temp: Option<Temp>,
}

impl Frame {
    pub fn new(func_id: FuncId, entry_block: BlockId, exec_cache: Rc<FunctionExecCache>) -> Self {
        let temp_count = exec_cache.temp_count;
        let mut borrowed = vec![false; temp_count];
        for slot in borrowed.iter_mut().take(exec_cache.param_count) {
            *slot = true;
        }
        Frame {
            func_id,
            block_id: entry_block,
            ip: 0,
            locals: vec![None; temp_count],
            borrowed,
            operand_stack: Vec::new(),
            alloca_buffer: vec![0u8; ALLOCA_ARENA_SIZE],
            alloca_cursor: 0,
            exec_cache,
            caller_result_temp: None,
        }
    }

    /// Bump-allocates `bytes` (8-byte aligned) out of this frame's arena and
    /// returns the allocation's address as a raw host pointer value.
    pub fn alloca(&mut self, bytes: usize) -> Result<usize, ()> {
        let aligned = (bytes + 7) & !7;
        if self.alloca_cursor + aligned > self.alloca_buffer.len() {
            return Err(());
        }
        let addr = self.alloca_buffer.as_ptr() as usize + self.alloca_cursor;
        self.alloca_cursor += aligned;
        Ok(addr)
    }

    pub fn get(&self, t: Temp) -> RtValue {
        self.locals[t.index()].unwrap_or_else(|| panic!("use of {t} before definition"))
    }

    pub fn set(&mut self, t: Temp, v: RtValue) {
        self.locals[t.index()] = Some(v);
    }

    /// Releases every still-live, owned (non-borrowed) refcounted local.
    /// Called when the frame is discarded, either by a normal `Ret` (with
    /// `except` set to the value being returned, which transfers ownership
    /// to the caller instead of being released here) or by trap unwinding
    /// (with `except` `None`).
    pub fn release_owned_locals(&self, except: Option<RtValue>) {
        let except_ptr = except.and_then(|v| v.heap_ptr());
        for (i, slot) in self.locals.iter().enumerate() {
            if self.borrowed[i] {
                continue;
            }
            if let Some(ptr) = slot.and_then(|v| v.heap_ptr()) {
                if Some(ptr) != except_ptr {
                    unsafe { viper_rt::heap::release(ptr) };
                }
            }
        }
    }
}
