//! CFG linearization (§4.2): reconstitute a flat instruction list from a
//! `Cfg` via chain placement, preserving the textual fallthrough semantics
//! of any block without an explicit terminator.
//!
//! A block whose terminator is missing *must* be immediately followed by
//! its fallthrough target — that's not a style choice, it's what makes the
//! block's implicit fallthrough correct. Everywhere else, we prefer to
//! place a branch's `true` arm (or a `jmp` target) directly after its
//! source block, queuing the other arm to start its own chain later; this
//! is the same "keep the common path straight-line" placement
//! `linearize_cfg` uses.

use crate::cfg::edge::EdgeKind;
use crate::cfg::reachability::find_reachable;
use crate::cfg::Cfg;
use crate::ir::Instr;
use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use std::collections::{HashSet, VecDeque};

/// Determine a deterministic block order via chain placement.
pub fn linearize_order(cfg: &Cfg) -> Vec<NodeIndex> {
    let mut placed: HashSet<NodeIndex> = HashSet::new();
    let mut order = Vec::new();
    let mut chain_starts: VecDeque<NodeIndex> = VecDeque::new();

    if let Some(entry) = cfg.entry() {
        chain_starts.push_back(entry);
    }

    while let Some(start) = chain_starts.pop_front() {
        let mut cur = Some(start);
        while let Some(node) = cur {
            if placed.contains(&node) {
                break;
            }
            placed.insert(node);
            order.push(node);

            let succs: Vec<(EdgeKind, NodeIndex)> =
                cfg.graph.edges(node).map(|e| (*e.weight(), e.target())).collect();

            if let Some(&(_, ft)) = succs.iter().find(|(k, _)| *k == EdgeKind::Fallthrough) {
                cur = Some(ft);
                continue;
            }

            let mut next = None;
            for (kind, target) in succs {
                if placed.contains(&target) {
                    continue;
                }
                match kind {
                    EdgeKind::True | EdgeKind::Jump if next.is_none() => next = Some(target),
                    EdgeKind::True | EdgeKind::Jump | EdgeKind::False => {
                        if !chain_starts.contains(&target) {
                            chain_starts.push_back(target);
                        }
                    }
                    EdgeKind::Fallthrough => {}
                }
            }
            cur = next;
        }
    }

    // Anything left (unreachable blocks) is appended in original textual
    // order, so output stays deterministic without affecting reachable
    // semantics.
    for &node in &cfg.order {
        if placed.insert(node) {
            order.push(node);
        }
    }

    order
}

/// Flatten a CFG to an instruction list using `linearize_order`, emitting a
/// label for any block that has one or is the target of some edge. A
/// terminator-less block whose fallthrough target ends up somewhere other
/// than the very next emitted block gets an explicit `jmp` patched in
/// (§4.2) — unreachable blocks are exempt, since they never had a real
/// fallthrough to begin with.
pub fn linearize(cfg: &Cfg) -> Vec<Instr> {
    let order = linearize_order(cfg);
    let reachable = find_reachable(cfg);
    let mut out = Vec::new();
    for (pos, &node) in order.iter().enumerate() {
        let block = cfg.block(node);
        let needs_label = block.has_source_label || cfg.predecessors(node).next().is_some();
        if needs_label {
            out.push(Instr::label(block.name.clone()));
        }
        out.extend(block.instrs.iter().cloned());

        if block.terminator().is_none() && reachable.contains(&node) {
            if let Some(target) = fallthrough_target(cfg, node) {
                let lands_naturally = order.get(pos + 1) == Some(&target);
                if !lands_naturally {
                    out.push(Instr::jmp(cfg.block(target).name.clone()));
                }
            }
        }
    }
    out
}

fn fallthrough_target(cfg: &Cfg, node: NodeIndex) -> Option<NodeIndex> {
    cfg.graph.edges(node).find(|e| *e.weight() == EdgeKind::Fallthrough).map(|e| e.target())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build_cfg;
    use crate::ir::{EffectOp, Function, Instr, Literal, Type};

    #[test]
    fn preserves_fallthrough_adjacency() {
        // Block with no terminator must stay immediately before its
        // successor.
        let f = Function {
            name: "f".into(),
            args: vec![],
            ret_type: None,
            instrs: vec![
                Instr::const_("x", Type::Int, Literal::Int(1)),
                Instr::label("next"),
                Instr::effect(EffectOp::Ret, vec![], vec![]),
            ],
        };
        let cfg = build_cfg(&f).unwrap();
        let order = linearize_order(&cfg);
        let names: Vec<_> = order.iter().map(|&n| cfg.block(n).name.clone()).collect();
        assert_eq!(names, vec!["b0".to_string(), "next".to_string()]);
    }

    #[test]
    fn branch_arms_both_present() {
        let f = Function {
            name: "f".into(),
            args: vec![],
            ret_type: None,
            instrs: vec![
                Instr::const_("c", Type::Bool, Literal::Bool(true)),
                Instr::effect(EffectOp::Br, vec!["c".into()], vec!["t".into(), "e".into()]),
                Instr::label("t"),
                Instr::jmp("j"),
                Instr::label("e"),
                Instr::jmp("j"),
                Instr::label("j"),
                Instr::effect(EffectOp::Ret, vec![], vec![]),
            ],
        };
        let cfg = build_cfg(&f).unwrap();
        let instrs = linearize(&cfg);
        let labels: Vec<_> = instrs.iter().filter_map(|i| i.label_name()).collect();
        assert!(labels.contains(&"t"));
        assert!(labels.contains(&"e"));
        assert!(labels.contains(&"j"));
    }

    #[test]
    fn asymmetric_diamond_gets_a_patched_jmp_for_the_displaced_arm() {
        // br c .then .else
        // .then: x = 1; jmp .join
        // .else: y = 2           (no terminator — falls through to .join)
        // .join: ret
        //
        // Chain placement follows the `then` arm into `.join` first, so
        // `.else` is emitted last with no terminator of its own. Its
        // fallthrough edge to `.join` must come out as an explicit `jmp`.
        let f = Function {
            name: "f".into(),
            args: vec![],
            ret_type: None,
            instrs: vec![
                Instr::const_("c", Type::Bool, Literal::Bool(true)),
                Instr::effect(EffectOp::Br, vec!["c".into()], vec!["then".into(), "els".into()]),
                Instr::label("then"),
                Instr::const_("x", Type::Int, Literal::Int(1)),
                Instr::jmp("join"),
                Instr::label("els"),
                Instr::const_("y", Type::Int, Literal::Int(2)),
                Instr::label("join"),
                Instr::effect(EffectOp::Ret, vec![], vec![]),
            ],
        };
        let cfg = build_cfg(&f).unwrap();
        let order = linearize_order(&cfg);
        let names: Vec<_> = order.iter().map(|&n| cfg.block(n).name.clone()).collect();
        assert_eq!(names.last(), Some(&"els".to_string()), "`.else` must land at the tail for this bug to manifest");

        let instrs = linearize(&cfg);
        let els_pos = instrs.iter().position(|i| i.label_name() == Some("els")).unwrap();
        let tail = &instrs[els_pos..];
        assert!(
            tail.iter().any(|i| matches!(&i.kind, crate::ir::InstrKind::Effect { op: EffectOp::Jmp, labels, .. } if labels.first().map(String::as_str) == Some("join"))),
            "displaced fallthrough block must get an explicit `jmp .join` patch, got {tail:?}"
        );
    }
}
