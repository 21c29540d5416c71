//! The runtime bridge (spec.md §4.5): marshals `Call`/`CallIndirect` operands
//! across the native ABI boundary and routes traps raised inside an extern
//! handler back into the interpreter that invoked it.
//!
//! Native handlers have no way to return a `Result` across an `extern "C"`
//! boundary, so a trap raised mid-handler is recorded in thread-local state
//! (`trap`/`take_pending_trap`) instead; the interpreter checks for it
//! immediately after every extern call returns.

use std::cell::{Cell, RefCell};
use viper_il::{Type, Value};
use viper_rt::NativeValue;
use viper_il::TrapKind;

use crate::frame::RtValue;

thread_local! {
    static ACTIVE_VM: Cell<usize> = const { Cell::new(0) };
    static PENDING_TRAP: RefCell<Option<(TrapKind, String)>> = const { RefCell::new(None) };
}

/// RAII guard installing a VM as the thread's active VM for the life of a
/// `VM::run` call. Re-entrant activation of the *same* VM (a handler calling
/// back into the VM that invoked it) is fine; activating a different VM
/// while one is already active on this thread is a usage error, caught in
/// debug builds.
pub struct ActiveVmGuard {
    previous: usize,
}

impl ActiveVmGuard {
    pub fn enter(vm_ptr: usize) -> Self {
        let previous = ACTIVE_VM.with(|c| c.get());
        debug_assert!(
            previous == 0 || previous == vm_ptr,
            "attempted to activate a different VM while one is already active on this thread"
        );
        ACTIVE_VM.with(|c| c.set(vm_ptr));
        ActiveVmGuard { previous }
    }
}

impl Drop for ActiveVmGuard {
    fn drop(&mut self) {
        ACTIVE_VM.with(|c| c.set(self.previous));
    }
}

pub fn active_vm() -> Option<usize> {
    let v = ACTIVE_VM.with(|c| c.get());
    (v != 0).then_some(v)
}

/// Called by native handlers (through `viper-rt`'s handler-facing helpers)
/// on a precondition violation. With no active VM there's nothing to unwind
/// into, so the process aborts rather than leaving corrupted state running.
pub fn raise_trap(kind: TrapKind, message: impl Into<String>) {
    if active_vm().is_some() {
        PENDING_TRAP.with(|p| *p.borrow_mut() = Some((kind, message.into())));
    } else {
        tracing::error!(%kind, "trap raised with no active VM on this thread, aborting");
        std::process::abort();
    }
}

pub(crate) fn take_pending_trap() -> Option<(TrapKind, String)> {
    PENDING_TRAP.with(|p| p.borrow_mut().take())
}

fn rt_to_native(v: RtValue) -> NativeValue {
    match v {
        RtValue::I1(b) => NativeValue::I64(b as i64),
        RtValue::I16(x) => NativeValue::I64(x as i64),
        RtValue::I32(x) => NativeValue::I64(x as i64),
        RtValue::I64(x) => NativeValue::I64(x),
        RtValue::F64(x) => NativeValue::F64(x),
        RtValue::Ptr(p) => NativeValue::Ptr(p as *mut u8),
        RtValue::Str(p) | RtValue::Obj(p) => NativeValue::Ptr(p.as_ptr()),
        RtValue::Void => NativeValue::Void,
    }
}

fn native_to_rt(n: NativeValue, ty: Type) -> RtValue {
    match (n, ty) {
        (NativeValue::I64(v), Type::I1) => RtValue::I1(v != 0),
        (NativeValue::I64(v), Type::I16) => RtValue::I16(v as i16),
        (NativeValue::I64(v), Type::I32) => RtValue::I32(v as i32),
        (NativeValue::I64(v), Type::I64) => RtValue::I64(v),
        (NativeValue::F64(v), Type::F64) => RtValue::F64(v),
        (NativeValue::Ptr(p), Type::Ptr) => RtValue::Ptr(p as usize),
        (NativeValue::Ptr(p), Type::Str) => {
            RtValue::Str(std::ptr::NonNull::new(p).expect("extern returned null str"))
        }
        (NativeValue::Ptr(p), Type::Obj) => {
            RtValue::Obj(std::ptr::NonNull::new(p).expect("extern returned null obj"))
        }
        (NativeValue::Void, Type::Void) => RtValue::Void,
        (native, ty) => panic!("extern ABI/IL type mismatch: {native:?} against {ty}"),
    }
}

/// Invokes a registered extern handler, marshaling `args`/the return value
/// and draining any trap the handler raised.
///
/// # Safety
/// `handler` must be a valid `ExternHandler` matching the native calling
/// convention of spec.md §6.
pub unsafe fn invoke_extern(
    handler: viper_rt::ExternHandler,
    args: &[RtValue],
    return_type: Type,
) -> Result<RtValue, (TrapKind, String)> {
    let native_args: Vec<NativeValue> = args.iter().map(|&v| rt_to_native(v)).collect();
    let mut result = NativeValue::Void;
    handler(native_args.as_ptr(), native_args.len(), &mut result as *mut NativeValue);
    if let Some(trap) = take_pending_trap() {
        return Err(trap);
    }
    Ok(native_to_rt(result, return_type))
}

/// Materializes a `Value::ConstStr`/`Value::NullPtr`/`Value::ConstI64`/
/// `Value::ConstF64` IL operand into a runtime value. `Value::GlobalAddr` is
/// resolved by the interpreter (it needs the module's global table), not
/// here.
pub fn const_to_rt(v: Value, ty: Type, str_ptr: impl FnOnce() -> std::ptr::NonNull<u8>) -> RtValue {
    match (v, ty) {
        (Value::ConstI64(k), Type::I1) => RtValue::I1(k != 0),
        (Value::ConstI64(k), Type::I16) => RtValue::I16(k as i16),
        (Value::ConstI64(k), Type::I32) => RtValue::I32(k as i32),
        (Value::ConstI64(k), Type::I64) => RtValue::I64(k),
        (Value::ConstF64(bits), Type::F64) => RtValue::F64(f64::from_bits(bits)),
        (Value::ConstStr(_), Type::Str) => RtValue::Str(str_ptr()),
        (Value::NullPtr, Type::Ptr) => RtValue::Ptr(0),
        (value, ty) => panic!("unexpected constant {value} for type {ty}"),
    }
}
