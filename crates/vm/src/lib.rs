//! The Viper VM (component C7, spec.md §4.7): loads a verified IL module and
//! interprets it.
//!
//! `VM::new` takes only configuration; `VM::load_module` then verifies and
//! loads a module into it. Loading resolves every extern declaration against
//! the process-wide registry up front (`viper-rt`'s C4) and builds the
//! per-function caches the interpreter's hot loop depends on, so a `VM` that
//! loaded successfully never fails later for a missing symbol or an
//! un-cached function.

mod bridge;
mod concurrency;
mod eh;
mod exec_cache;
mod frame;
mod interp;

use std::sync::Arc;
use thiserror::Error;

pub use concurrency::{ProgramState, RtContext};
pub use frame::RtValue;
pub use viper_il::{Module, TrapKind, Value};

/// How the interpreter dispatches from one instruction to the next. All
/// three variants currently share one dispatch core (`Interpreter::step`);
/// this is the embedder-visible knob spec.md's VM configuration surface
/// calls for, ahead of per-opcode function-pointer tables actually backing
/// `FunctionTable`/`Threaded`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DispatchMode {
    #[default]
    Switch,
    FunctionTable,
    /// Selects the interpreter's computed-goto-style loop once one exists;
    /// gated behind `threaded-dispatch` per spec.md's config surface even
    /// though it runs through the same core as the other variants for now.
    Threaded,
}

/// Embedder-facing VM configuration.
#[derive(Clone, Default)]
pub struct VmConfig {
    pub dispatch: DispatchMode,
    /// Shared state for VMs running as cooperating threads of the same
    /// logical program (spec.md §9). `None` runs this VM fully isolated.
    pub program_state: Option<Arc<ProgramState>>,
}

/// Failure resolving or verifying a module at load time. Fatal: there is no
/// partially-loaded `VM` to recover from one of these.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("module failed verification: {0:?}")]
    Verify(Vec<viper_verifier::Diagnostic>),
    #[error("extern `{0}` is not registered")]
    UnresolvedExtern(String),
    #[error("extern `{0}` is registered with a signature that does not match its declaration")]
    ExternSignatureMismatch(String),
}

/// A trapped fault, raised by a checked opcode or a native handler and
/// propagated out of `VM::run` when no enclosing `EhEntry` landing pad
/// catches it (spec.md §4.7 "Trap unwinding").
#[derive(Debug, Clone)]
pub struct Trap {
    pub kind: TrapKind,
    pub message: String,
    pub source_loc: Option<viper_il::SourceLoc>,
}

impl std::fmt::Display for Trap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Trap {}

/// Thin wrapper around `viper_rt::registry`: registering a handler here puts
/// it in the same process-global table every `VM` resolves externs against,
/// whether or not this particular `VM` instance ever sees this call.
pub mod extern_registry {
    pub use viper_rt::registry::{unregister, ExternDesc, ExternHandler};
    pub use viper_il::Signature;

    pub fn register(name: &str, signature: Signature, handler: ExternHandler) {
        viper_rt::registry::register(name, signature, handler);
    }

    pub fn lookup(name: &str) -> Option<ExternDesc> {
        viper_rt::registry::lookup(name)
    }
}

/// An embeddable VM instance. `new` takes only configuration; `load_module`
/// verifies and loads a module into it, resolving every extern it needs and
/// building the per-function caches the interpreter's hot loop depends on, so
/// a `VM` that loaded successfully never fails later for a missing symbol or
/// an un-cached function. Separating construction from loading lets an
/// embedder hold onto a `VM` across repeated loads of different modules
/// (e.g. a REPL reloading an edited program) without re-threading `config`.
pub struct VM {
    config: VmConfig,
    interp: Option<interp::Interpreter>,
}

impl VM {
    pub fn new(config: VmConfig) -> Self {
        VM { config, interp: None }
    }

    /// Verifies and loads `module`, replacing whatever this `VM` had loaded
    /// before.
    pub fn load_module(&mut self, module: Module) -> Result<(), LoadError> {
        let interp = interp::Interpreter::load(
            module,
            self.config.dispatch,
            self.config.program_state.clone(),
        )?;
        self.interp = Some(interp);
        Ok(())
    }

    /// Runs `entry` to completion with `args` bound as its parameters.
    /// Returns the entry function's return value, or the trap that escaped
    /// every landing pad.
    ///
    /// # Panics
    /// Panics if no module has been loaded yet.
    pub fn run(&mut self, entry: viper_il::FuncId, args: Vec<Value>) -> Result<Value, Trap> {
        self.interp
            .as_mut()
            .expect("VM::run called before a module was loaded")
            .run(entry, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_il::{ModuleBuilder, Signature, Type};

    #[test]
    fn loading_a_module_with_an_unresolved_extern_fails() {
        // A function with no blocks is a declaration (the same convention
        // LLVM IR uses): the interpreter resolves its name against the
        // extern registry at load time instead of trying to run a body.
        let mut mb = ModuleBuilder::new();
        let fb = mb.new_function(
            "rt_definitely_not_registered_anywhere",
            Signature {
                param_types: vec![Type::I64],
                return_type: Type::Void,
            },
        );
        fb.finish().unwrap();
        let module = mb.finish();
        let mut vm = VM::new(VmConfig::default());
        let err = vm.load_module(module).unwrap_err();
        assert!(matches!(err, LoadError::UnresolvedExtern(_)));
    }

    #[test]
    fn running_a_constant_function_returns_its_value() {
        let mut mb = ModuleBuilder::new();
        let mut fb = mb.new_function(
            "answer",
            Signature {
                param_types: vec![],
                return_type: Type::I64,
            },
        );
        let entry = fb.create_block("entry").unwrap();
        fb.switch_to_block(entry);
        let v = fb.const_i64(Type::I64, 42).unwrap();
        fb.ret(Some(v)).unwrap();
        let func_id = fb.finish().unwrap();
        let module = mb.finish();

        let mut vm = VM::new(VmConfig::default());
        vm.load_module(module).unwrap();
        let result = vm.run(func_id, vec![]).unwrap();
        assert_eq!(result, Value::ConstI64(42));
    }
}
