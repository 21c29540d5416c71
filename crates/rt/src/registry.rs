//! Process-global extern registry (spec.md §4.4).
//!
//! Maps extern names to native handler descriptors. Shared by every `VM`
//! instance in the process: runtime library handlers are statically linked,
//! so a per-VM table would buy no isolation. Grounded on the teacher's
//! `channel.rs` `CHANNEL_REGISTRY` (`Mutex<Option<HashMap<...>>>` behind a
//! `Once`-guarded lazy init), generalized to an `RwLock` here because lookup
//! sits on the VM's call hot path while registration is comparatively rare
//! (spec.md §4.4 threading note: "lookup takes a read lock... registration
//! holds the registry... write lock").

use std::collections::HashMap;
use std::sync::{Arc, Once, RwLock};
use viper_il::Signature;

use crate::abi::NativeValue;

/// A native handler implementing the C-ABI calling convention of spec.md
/// §4.5/§6: read `argc` values from `args`, perform side effects, write the
/// result slot. Values cross this boundary as `NativeValue`, not
/// `viper_il::Value` — the IL's operand type has no variant for an actual
/// runtime heap pointer, only for compile-time constants.
pub type ExternHandler =
    unsafe extern "C" fn(args: *const NativeValue, argc: usize, result: *mut NativeValue);

#[derive(Clone)]
pub struct ExternDesc {
    pub name: Arc<str>,
    pub signature: Arc<Signature>,
    pub handler: ExternHandler,
}

static REGISTRY: RwLock<Option<HashMap<String, ExternDesc>>> = RwLock::new(None);
static REGISTRY_INIT: Once = Once::new();

fn ensure_init() {
    REGISTRY_INIT.call_once(|| {
        *REGISTRY
            .write()
            .expect("extern registry lock poisoned during init") = Some(HashMap::new());
    });
}

/// Registers a native handler under `name`, replacing any prior registration.
/// Mutations are serialized behind the registry's write lock.
pub fn register(name: &str, signature: Signature, handler: ExternHandler) {
    ensure_init();
    let desc = ExternDesc {
        name: Arc::from(name),
        signature: Arc::new(signature),
        handler,
    };
    let mut guard = REGISTRY.write().expect("extern registry lock poisoned");
    guard.as_mut().expect("registry initialized").insert(name.to_string(), desc);
    tracing::debug!(extern_name = name, "registered extern handler");
}

/// Looks up a handler by name. Takes only a read lock, so concurrent
/// lookups from multiple VM threads never contend with each other (spec.md
/// §8 concurrency property).
pub fn lookup(name: &str) -> Option<ExternDesc> {
    ensure_init();
    REGISTRY
        .read()
        .expect("extern registry lock poisoned")
        .as_ref()
        .expect("registry initialized")
        .get(name)
        .cloned()
}

/// Removes a registration. A no-op if `name` isn't registered.
pub fn unregister(name: &str) {
    ensure_init();
    let mut guard = REGISTRY.write().expect("extern registry lock poisoned");
    guard.as_mut().expect("registry initialized").remove(name);
    tracing::debug!(extern_name = name, "unregistered extern handler");
}

/// Test-only reset: process-global state forces serialized tests (hence the
/// `serial_test` dev-dependency, following the teacher's own reason for
/// depending on it), but a left-over registration from a prior test would
/// still bleed into the next one without this hook.
#[cfg(test)]
pub fn reset_for_test() {
    ensure_init();
    *REGISTRY.write().expect("extern registry lock poisoned") = Some(HashMap::new());
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use viper_il::Type;

    unsafe extern "C" fn noop_handler(
        _args: *const NativeValue,
        _argc: usize,
        result: *mut NativeValue,
    ) {
        if !result.is_null() {
            *result = NativeValue::I64(0);
        }
    }

    fn sig() -> Signature {
        Signature {
            param_types: vec![Type::I64],
            return_type: Type::Void,
        }
    }

    #[test]
    #[serial]
    fn register_then_lookup_round_trips() {
        reset_for_test();
        register("rt_test_fn", sig(), noop_handler);
        let desc = lookup("rt_test_fn").expect("registered");
        assert_eq!(&*desc.name, "rt_test_fn");
    }

    #[test]
    #[serial]
    fn unregister_removes_entry() {
        reset_for_test();
        register("rt_test_fn2", sig(), noop_handler);
        unregister("rt_test_fn2");
        assert!(lookup("rt_test_fn2").is_none());
    }

    #[test]
    #[serial]
    fn lookup_of_unknown_name_is_none() {
        reset_for_test();
        assert!(lookup("rt_does_not_exist").is_none());
    }
}
