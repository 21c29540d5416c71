//! Seed scenario 3 (spec.md §8): a module calling an extern, with the
//! registry bound to a handler that writes to an embedder-supplied sink.
//! Declarations are modeled the way LLVM IR models them: a function with no
//! blocks, resolved against the extern registry at load time instead of
//! being run.

use std::sync::Mutex;
use viper_il::{ModuleBuilder, Signature, Type, Value};
use viper_rt::abi::NativeValue;
use viper_rt::strings::as_str;
use viper_vm::{extern_registry, VmConfig, VM};

static SINK: Mutex<Vec<String>> = Mutex::new(Vec::new());

unsafe extern "C" fn rt_print_str(args: *const NativeValue, argc: usize, result: *mut NativeValue) {
    assert_eq!(argc, 1);
    let NativeValue::Ptr(p) = *args else {
        panic!("rt_print_str expected a pointer argument");
    };
    let payload = std::ptr::NonNull::new(p).expect("rt_print_str given a null string");
    let s = as_str(payload);
    SINK.lock().unwrap().push(s.to_string());
    *result = NativeValue::Void;
}

#[test]
fn extern_call_reaches_the_sink_and_entry_returns_zero() {
    extern_registry::register(
        "rt_print_str_scenario3",
        Signature {
            param_types: vec![Type::Str],
            return_type: Type::Void,
        },
        rt_print_str,
    );

    let mut mb = ModuleBuilder::new();
    let hello = mb.intern_string(b"hello\n");

    let extern_fb = mb.new_function(
        "rt_print_str_scenario3",
        Signature {
            param_types: vec![Type::Str],
            return_type: Type::Void,
        },
    );
    let extern_id = extern_fb.finish().unwrap();

    let mut fb = mb.new_function(
        "main",
        Signature {
            param_types: vec![],
            return_type: Type::I64,
        },
    );
    let entry = fb.create_block("entry").unwrap();
    fb.switch_to_block(entry);
    fb.call(extern_id, Type::Void, vec![Value::ConstStr(hello)]).unwrap();
    let zero = fb.const_i64(Type::I64, 0).unwrap();
    fb.ret(Some(zero)).unwrap();
    let main_id = fb.finish().unwrap();

    let module = mb.finish();
    let mut vm = VM::new(VmConfig::default());
    vm.load_module(module).unwrap();
    let result = vm.run(main_id, vec![]).unwrap();

    assert_eq!(result, Value::ConstI64(0));
    assert_eq!(SINK.lock().unwrap().last().map(String::as_str), Some("hello\n"));
}
