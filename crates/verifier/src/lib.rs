//! The IL verifier (component C2, spec.md §4.2).
//!
//! `verify(module) -> Result<(), Vec<Diagnostic>>` runs as a pre-pass gate
//! and as a post-pass invariant check. Any failure is fatal for the current
//! compilation; the verifier reports the first error *per function* and
//! continues to the next function so a single bad function doesn't hide
//! problems elsewhere in the module (spec.md §4.2 "Failure semantics").

pub mod dominator;
mod typecheck;

use dominator::DominatorTree;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use viper_il::{BlockId, Function, Module, Opcode, SourceLoc, Temp, Type};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum Diagnostic {
    #[error("function `{func}`: duplicate block label `{label}`")]
    DuplicateBlockLabel { func: String, label: String },
    #[error("function `{func}`: block `{block}` has no terminator")]
    MissingTerminator { func: String, block: String },
    #[error("function `{func}`: block `{block}` has more than one terminator")]
    MultipleTerminators { func: String, block: String },
    #[error("function `{func}`: instruction `{inst}` references unknown block `{target}`")]
    UnknownBranchTarget {
        func: String,
        inst: String,
        target: String,
    },
    #[error(
        "function `{func}`: branch to `{target}` passes {found} argument(s), block expects {expected}"
    )]
    ArgArityMismatch {
        func: String,
        target: String,
        expected: usize,
        found: usize,
    },
    #[error(
        "function `{func}`: branch argument {index} to `{target}` has type {found}, expected {expected}"
    )]
    ArgTypeMismatch {
        func: String,
        target: String,
        index: usize,
        expected: Type,
        found: Type,
    },
    #[error("function `{func}`: temp used in `{inst}` is not dominated by its definition")]
    UseNotDominated { func: String, inst: String },
    #[error("function `{func}`: temp `{temp}` is defined more than once")]
    MultipleDefinitions { func: String, temp: Temp },
    #[error("function `{func}`: `{inst}` expected operand type {expected}, found {found}")]
    TypeMismatch {
        func: String,
        inst: String,
        expected: Type,
        found: String,
    },
    #[error("function `{func}`: `{inst}` is malformed: {reason}")]
    Malformed {
        func: String,
        inst: String,
        reason: String,
    },
    #[error("function `{func}`: call `{inst}` passes {found} argument(s), callee expects {expected}")]
    CallArityMismatch {
        func: String,
        inst: String,
        expected: usize,
        found: usize,
    },
    #[error("function `{func}`: `{inst}` calls unresolved callee")]
    UnresolvedCallee { func: String, inst: String },
    #[error("function `{func}`: `eh_entry` must be the first non-parameter instruction of its block")]
    EhEntryNotFirst { func: String, block: String },
}

impl Diagnostic {
    pub fn source_loc(&self) -> Option<&SourceLoc> {
        None
    }
}

/// Verifies every function in `module` independently, collecting the first
/// diagnostic per function that fails.
pub fn verify(module: &Module) -> Result<(), Vec<Diagnostic>> {
    let mut diags = Vec::new();
    for func in &module.functions {
        if let Err(d) = verify_function(module, func) {
            diags.push(d);
        }
    }
    if diags.is_empty() {
        Ok(())
    } else {
        Err(diags)
    }
}

fn verify_function(module: &Module, func: &Function) -> Result<(), Diagnostic> {
    // A function with no blocks is a declaration, not a definition (the
    // convention LLVM IR uses for `declare`): nothing below applies to it,
    // since the VM resolves it against the extern registry at load time
    // rather than verifying a body it doesn't have.
    if func.blocks.is_empty() {
        return Ok(());
    }

    // (a) block label uniqueness
    let mut labels = HashSet::new();
    for b in &func.blocks {
        if !labels.insert(b.label.clone()) {
            return Err(Diagnostic::DuplicateBlockLabel {
                func: func.name.clone(),
                label: b.label.clone(),
            });
        }
    }

    // (f) exactly one terminator, as the last instruction
    for b in &func.blocks {
        if b.terminator.is_none() {
            return Err(Diagnostic::MissingTerminator {
                func: func.name.clone(),
                block: b.label.clone(),
            });
        }
        if b.instrs.iter().any(|i| i.opcode.is_terminator()) {
            return Err(Diagnostic::MultipleTerminators {
                func: func.name.clone(),
                block: b.label.clone(),
            });
        }
    }

    // branch targets exist, with matching arity/types; eh_entry placement
    let block_params: HashMap<BlockId, Vec<Type>> = func
        .blocks
        .iter()
        .map(|b| (b.id, b.params.iter().map(|(_, t)| *t).collect()))
        .collect();
    let temp_types = func.temp_types();

    for b in &func.blocks {
        for (pos, inst) in b.instrs.iter().enumerate() {
            if inst.opcode == Opcode::EhEntry && pos != 0 {
                return Err(Diagnostic::EhEntryNotFirst {
                    func: func.name.clone(),
                    block: b.label.clone(),
                });
            }
        }
        if let Some(term) = &b.terminator {
            for target in &term.targets {
                let Some(params) = block_params.get(&target.block) else {
                    return Err(Diagnostic::UnknownBranchTarget {
                        func: func.name.clone(),
                        inst: term.to_string(),
                        target: target.block.to_string(),
                    });
                };
                if params.len() != target.args.len() {
                    return Err(Diagnostic::ArgArityMismatch {
                        func: func.name.clone(),
                        target: target.block.to_string(),
                        expected: params.len(),
                        found: target.args.len(),
                    });
                }
                for (i, (arg, expected)) in target.args.iter().zip(params.iter()).enumerate() {
                    if let Some(t) = arg.as_temp() {
                        if let Some(found) = temp_types.get(&t) {
                            if found != expected {
                                return Err(Diagnostic::ArgTypeMismatch {
                                    func: func.name.clone(),
                                    target: target.block.to_string(),
                                    index: i,
                                    expected: *expected,
                                    found: *found,
                                });
                            }
                        }
                    }
                }
            }
        }
    }

    // (b) dominator tree
    let dt = DominatorTree::compute(func);

    // (c) def-dominates-use, walked in program order per reachable block
    // (reverse postorder would also work; program order suffices because
    // within a block we additionally check position, and across blocks we
    // rely purely on the dominator relation, which doesn't depend on visit
    // order).
    let mut defined_at: HashMap<Temp, (BlockId, usize)> = HashMap::new();
    for (t, _) in &func.params {
        defined_at.insert(*t, (func.blocks[0].id, 0));
    }
    for b in &func.blocks {
        for (t, _) in &b.params {
            if defined_at.insert(*t, (b.id, 0)).is_some() {
                return Err(Diagnostic::MultipleDefinitions {
                    func: func.name.clone(),
                    temp: *t,
                });
            }
        }
    }
    for b in &func.blocks {
        for (pos, inst) in b.all_instrs().enumerate() {
            if let Some(t) = inst.result_temp {
                let key = (b.id, pos + 1);
                if defined_at.insert(t, key).is_some() {
                    return Err(Diagnostic::MultipleDefinitions {
                        func: func.name.clone(),
                        temp: t,
                    });
                }
            }
        }
    }

    for b in &func.blocks {
        if !dt.is_reachable(b.id) {
            continue;
        }
        for (pos, inst) in b.all_instrs().enumerate() {
            for op in inst.operands.iter().chain(
                inst.targets
                    .iter()
                    .flat_map(|t| t.args.iter()),
            ) {
                let Some(t) = op.as_temp() else { continue };
                let Some(&(def_block, def_pos)) = defined_at.get(&t) else {
                    return Err(Diagnostic::UseNotDominated {
                        func: func.name.clone(),
                        inst: inst.to_string(),
                    });
                };
                let dominates_use = if def_block == b.id {
                    def_pos <= pos
                } else {
                    dt.dominates(def_block, b.id)
                };
                if !dominates_use {
                    return Err(Diagnostic::UseNotDominated {
                        func: func.name.clone(),
                        inst: inst.to_string(),
                    });
                }
            }

            // (d) opcode type checking
            typecheck::typecheck_instruction(func, inst, &temp_types, module)?;

            // (e) call signature check against extern declarations too
            if inst.opcode == Opcode::Call && inst.callee.is_none() {
                return Err(Diagnostic::UnresolvedCallee {
                    func: func.name.clone(),
                    inst: inst.to_string(),
                });
            }
        }
    }

    Ok(())
}
