//! Trivial dead code elimination (§4.6): a global fixpoint pass removing
//! definitions never used anywhere in the function, followed by a local
//! per-block pass removing a definition immediately shadowed by a later
//! one with no intervening use.
//!
//! Only `const`, value `op`, `get`, and `undef` instructions are ever
//! removed — anything with an intrinsic effect (`print`, `call`, `store`,
//! branches, `set`) is kept regardless of whether its result is read,
//! exactly as §4.6 requires.

use crate::cfg::build_cfg;
use crate::error::Result;
use crate::ir::{Function, Instr, InstrKind, Program};
use std::collections::{HashMap, HashSet};

fn is_eliminable(instr: &Instr) -> bool {
    matches!(
        instr.kind,
        InstrKind::Const { .. } | InstrKind::Value { .. } | InstrKind::Get { .. } | InstrKind::Undef { .. }
    )
}

/// Runs over `blocks[reachable_idx]` only — unreachable code is preserved
/// verbatim and excluded from the analysis (§7).
fn global_pass(blocks: &mut [Vec<Instr>], reachable: &HashSet<usize>) -> usize {
    let mut removed = 0;
    loop {
        let mut used: HashSet<String> = HashSet::new();
        for (i, block) in blocks.iter().enumerate() {
            if !reachable.contains(&i) {
                continue;
            }
            for instr in block {
                for u in instr.uses() {
                    used.insert(u.to_string());
                }
            }
        }

        let mut changed = false;
        for (i, block) in blocks.iter_mut().enumerate() {
            if !reachable.contains(&i) {
                continue;
            }
            let before = block.len();
            block.retain(|instr| {
                !is_eliminable(instr) || instr.dest().map(|d| used.contains(d)).unwrap_or(true)
            });
            if block.len() != before {
                removed += before - block.len();
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    removed
}

/// `x = id x` never does anything; drop it outright (§4.6 local pass).
fn is_trivial_self_copy(instr: &Instr) -> bool {
    matches!(
        &instr.kind,
        InstrKind::Value { op: crate::ir::ValueOp::Id, dest, args, .. }
            if args.len() == 1 && &args[0] == dest
    )
}

fn local_pass(instrs: &mut Vec<Instr>) -> usize {
    let mut last_def: HashMap<String, usize> = HashMap::new();
    let mut to_remove: HashSet<usize> = HashSet::new();

    for (i, instr) in instrs.iter().enumerate() {
        if is_trivial_self_copy(instr) {
            to_remove.insert(i);
            continue;
        }
        for used in instr.uses() {
            last_def.remove(used);
        }
        if let Some(dest) = instr.dest() {
            if is_eliminable(instr) {
                if let Some(prev) = last_def.insert(dest.to_string(), i) {
                    to_remove.insert(prev);
                }
            } else {
                last_def.remove(dest);
            }
        }
    }

    let removed = to_remove.len();
    let mut idx = 0;
    instrs.retain(|_| {
        let keep = !to_remove.contains(&idx);
        idx += 1;
        keep
    });
    removed
}

pub fn tdce_function(func: &Function) -> Result<Function> {
    let mut cfg = build_cfg(func)?;
    let nodes: Vec<_> = cfg.graph.node_indices().collect();
    let reachable_nodes = crate::cfg::reachability::find_reachable(&cfg);
    let reachable: HashSet<usize> = nodes
        .iter()
        .enumerate()
        .filter(|(_, &n)| reachable_nodes.contains(&n))
        .map(|(i, _)| i)
        .collect();

    let mut blocks: Vec<Vec<Instr>> = nodes.iter().map(|&n| cfg.block(n).instrs.clone()).collect();
    let global_removed = global_pass(&mut blocks, &reachable);
    let mut local_removed = 0;
    for (i, block) in blocks.iter_mut().enumerate() {
        if reachable.contains(&i) {
            local_removed += local_pass(block);
        }
    }

    for (node, block) in nodes.into_iter().zip(blocks) {
        cfg.block_mut(node).instrs = block;
    }
    cfg.recompute_edges();

    tracing::debug!(
        function = %func.name,
        global_removed,
        local_removed,
        "ran trivial dead code elimination"
    );

    Ok(Function { instrs: crate::cfg::linearize::linearize(&cfg), ..func.clone() })
}

pub fn tdce_program(program: &Program) -> Result<Program> {
    let functions = program.functions.iter().map(tdce_function).collect::<Result<Vec<_>>>()?;
    Ok(Program { functions })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{EffectOp, Literal, Type};

    #[test]
    fn global_pass_removes_unused_definition() {
        let f = Function {
            name: "f".into(),
            args: vec![],
            ret_type: None,
            instrs: vec![
                Instr::const_("a", Type::Int, Literal::Int(1)),
                Instr::const_("unused", Type::Int, Literal::Int(2)),
                Instr::effect(EffectOp::Print, vec!["a".into()], vec![]),
                Instr::effect(EffectOp::Ret, vec![], vec![]),
            ],
        };
        let out = tdce_function(&f).unwrap();
        assert!(!out.instrs.iter().any(|i| i.dest() == Some("unused")));
    }

    #[test]
    fn local_pass_removes_shadowed_definition() {
        let f = Function {
            name: "f".into(),
            args: vec![],
            ret_type: None,
            instrs: vec![
                Instr::const_("x", Type::Int, Literal::Int(1)),
                Instr::const_("x", Type::Int, Literal::Int(2)),
                Instr::effect(EffectOp::Print, vec!["x".into()], vec![]),
                Instr::effect(EffectOp::Ret, vec![], vec![]),
            ],
        };
        let out = tdce_function(&f).unwrap();
        let consts: Vec<_> = out
            .instrs
            .iter()
            .filter(|i| matches!(i.kind, InstrKind::Const { ref dest, .. } if dest == "x"))
            .collect();
        assert_eq!(consts.len(), 1);
        assert!(matches!(consts[0].kind, InstrKind::Const { value: Literal::Int(2), .. }));
    }

    #[test]
    fn side_effecting_call_survives_even_if_unused() {
        let f = Function {
            name: "f".into(),
            args: vec![],
            ret_type: None,
            instrs: vec![
                Instr {
                    kind: InstrKind::Effect {
                        op: EffectOp::Call,
                        dest: Some("r".into()),
                        typ: Some(Type::Int),
                        args: vec![],
                        labels: vec![],
                        funcs: vec!["helper".into()],
                        extra: Default::default(),
                    },
                    def_id: None,
                },
                Instr::effect(EffectOp::Ret, vec![], vec![]),
            ],
        };
        let out = tdce_function(&f).unwrap();
        assert!(out.instrs.iter().any(|i| i.dest() == Some("r")));
    }
}
