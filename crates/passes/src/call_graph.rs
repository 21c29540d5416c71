//! Call graph construction and Tarjan SCC detection (spec.md §4.3 "CallGraph
//! SCC" row): feeds the inliner so it never inlines into a function that
//! participates in its own recursion cycle.

use std::collections::HashMap;
use viper_il::{FuncId, Module, Opcode};

pub struct CallGraph {
    /// Direct-call edges, caller -> callees (duplicates collapsed).
    edges: HashMap<FuncId, Vec<FuncId>>,
}

impl CallGraph {
    pub fn build(module: &Module) -> Self {
        let mut edges: HashMap<FuncId, Vec<FuncId>> = HashMap::new();
        for (i, func) in module.functions.iter().enumerate() {
            let caller = FuncId(i as u32);
            let mut callees = Vec::new();
            for block in &func.blocks {
                for inst in block.all_instrs() {
                    if inst.opcode == Opcode::Call {
                        if let Some(callee) = inst.callee {
                            if !callees.contains(&callee) {
                                callees.push(callee);
                            }
                        }
                    }
                }
            }
            edges.insert(caller, callees);
        }
        CallGraph { edges }
    }

    pub fn callees(&self, f: FuncId) -> &[FuncId] {
        self.edges.get(&f).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// Strongly connected components via Tarjan's algorithm, in reverse
    /// topological order (callees before callers, the order an inliner wants
    /// to process them in). A component of size 1 whose function doesn't
    /// call itself is a non-recursive leaf, not a "cycle" in the sense the
    /// inliner cares about; use `is_recursive` to tell the two apart.
    pub fn tarjan_scc(&self) -> Vec<Vec<FuncId>> {
        struct State {
            index: HashMap<FuncId, usize>,
            lowlink: HashMap<FuncId, usize>,
            on_stack: HashMap<FuncId, bool>,
            stack: Vec<FuncId>,
            next_index: usize,
            sccs: Vec<Vec<FuncId>>,
        }

        fn strongconnect(node: FuncId, graph: &CallGraph, s: &mut State) {
            s.index.insert(node, s.next_index);
            s.lowlink.insert(node, s.next_index);
            s.next_index += 1;
            s.stack.push(node);
            s.on_stack.insert(node, true);

            for &succ in graph.callees(node) {
                if !s.index.contains_key(&succ) {
                    strongconnect(succ, graph, s);
                    let succ_low = s.lowlink[&succ];
                    let node_low = s.lowlink[&node];
                    s.lowlink.insert(node, node_low.min(succ_low));
                } else if *s.on_stack.get(&succ).unwrap_or(&false) {
                    let succ_idx = s.index[&succ];
                    let node_low = s.lowlink[&node];
                    s.lowlink.insert(node, node_low.min(succ_idx));
                }
            }

            if s.lowlink[&node] == s.index[&node] {
                let mut component = Vec::new();
                loop {
                    let w = s.stack.pop().unwrap();
                    s.on_stack.insert(w, false);
                    component.push(w);
                    if w == node {
                        break;
                    }
                }
                s.sccs.push(component);
            }
        }

        let mut s = State {
            index: HashMap::new(),
            lowlink: HashMap::new(),
            on_stack: HashMap::new(),
            stack: Vec::new(),
            next_index: 0,
            sccs: Vec::new(),
        };
        let mut funcs: Vec<FuncId> = self.edges.keys().copied().collect();
        funcs.sort_by_key(|f| f.0);
        for f in funcs {
            if !s.index.contains_key(&f) {
                strongconnect(f, self, &mut s);
            }
        }
        s.sccs
    }

    /// True if `f`'s component has more than one member, or `f` calls
    /// itself directly (a self-loop is its own single-node SCC but is still
    /// recursive).
    pub fn is_recursive(&self, scc: &[FuncId]) -> bool {
        if scc.len() > 1 {
            return true;
        }
        let Some(&only) = scc.first() else {
            return false;
        };
        self.callees(only).contains(&only)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use viper_il::{ModuleBuilder, Signature, Type};

    #[test]
    fn detects_mutual_recursion() {
        let mut m = ModuleBuilder::new();

        let mut fb_a = m.new_function(
            "a",
            Signature {
                param_types: vec![],
                return_type: Type::I64,
            },
        );
        let entry_a = fb_a.create_block("entry").unwrap();
        fb_a.switch_to_block(entry_a);
        let v = fb_a.const_i64(Type::I64, 0).unwrap();
        fb_a.ret(Some(v)).unwrap();
        let id_a = fb_a.finish().unwrap();

        let mut fb_b = m.new_function(
            "b",
            Signature {
                param_types: vec![],
                return_type: Type::I64,
            },
        );
        let entry_b = fb_b.create_block("entry").unwrap();
        fb_b.switch_to_block(entry_b);
        let call = fb_b.call(id_a, Type::I64, vec![]).unwrap();
        fb_b.ret(Some(call)).unwrap();
        fb_b.finish().unwrap();

        let module = m.finish();
        let cg = CallGraph::build(&module);
        let sccs = cg.tarjan_scc();
        assert_eq!(sccs.len(), 2);
        assert!(sccs.iter().all(|s| s.len() == 1));
        assert!(!cg.is_recursive(&[id_a]));
    }

    #[test]
    fn detects_self_recursion() {
        let mut m = ModuleBuilder::new();
        let mut fb = m.new_function(
            "fact",
            Signature {
                param_types: vec![Type::I64],
                return_type: Type::I64,
            },
        );
        let entry = fb.create_block("entry").unwrap();
        fb.switch_to_block(entry);
        let zero = fb.const_i64(Type::I64, 0).unwrap();
        let _ = zero;
        let self_id = viper_il::FuncId(0);
        let call = fb.call(self_id, Type::I64, vec![]).unwrap();
        fb.ret(Some(call)).unwrap();
        fb.finish().unwrap();
        let module = m.finish();
        let cg = CallGraph::build(&module);
        assert!(cg.is_recursive(&[self_id]));
    }
}
