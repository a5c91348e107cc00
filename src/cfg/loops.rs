//! Natural loop detection (§4.8 step 1), grounded on dominance.

use crate::cfg::analysis::find_entry;
use crate::cfg::dominators::DominatorTree;
use crate::cfg::Cfg;
use petgraph::graph::NodeIndex;
use std::collections::{HashSet, VecDeque};

/// A natural loop: a header dominating a back-edge tail, plus every block
/// that can reach the tail without passing back through the header.
#[derive(Debug, Clone)]
pub struct NaturalLoop {
    pub header: NodeIndex,
    pub back_edge: (NodeIndex, NodeIndex),
    pub body: HashSet<NodeIndex>,
}

impl NaturalLoop {
    pub fn contains(&self, node: NodeIndex) -> bool {
        self.body.contains(&node)
    }

    pub fn size(&self) -> usize {
        self.body.len()
    }

    /// Blocks in the body with a successor outside the body — the targets
    /// LICM and SSA preheader insertion need to know about.
    pub fn exit_edges(&self, cfg: &Cfg) -> Vec<(NodeIndex, NodeIndex)> {
        let mut exits = Vec::new();
        for &node in &self.body {
            for succ in cfg.successors(node) {
                if !self.body.contains(&succ) {
                    exits.push((node, succ));
                }
            }
        }
        exits
    }

    /// Predecessors of the header that are outside the loop body — these
    /// are the edges a preheader insertion retargets.
    pub fn outside_predecessors(&self, cfg: &Cfg) -> Vec<NodeIndex> {
        cfg.predecessors(self.header).filter(|p| !self.body.contains(p)).collect()
    }
}

/// Detect every natural loop: a back-edge `(tail -> header)` where `header`
/// dominates `tail`.
pub fn detect_natural_loops(cfg: &Cfg, dom_tree: &DominatorTree) -> Vec<NaturalLoop> {
    if find_entry(cfg).is_none() {
        return Vec::new();
    }

    let mut loops = Vec::new();
    for node in cfg.graph.node_indices() {
        for header in cfg.successors(node) {
            if dom_tree.dominates(header, node) {
                let body = compute_loop_body(cfg, header, node);
                loops.push(NaturalLoop { header, back_edge: (node, header), body });
            }
        }
    }
    loops
}

fn compute_loop_body(cfg: &Cfg, header: NodeIndex, tail: NodeIndex) -> HashSet<NodeIndex> {
    let mut body = HashSet::new();
    let mut worklist = VecDeque::new();
    worklist.push_back(tail);

    while let Some(node) = worklist.pop_front() {
        if node == header || body.contains(&node) {
            continue;
        }
        body.insert(node);
        for pred in cfg.predecessors(node) {
            if pred != header && !body.contains(&pred) {
                worklist.push_back(pred);
            }
        }
    }
    body.insert(header);
    body
}

pub fn find_loop_headers(cfg: &Cfg, dom_tree: &DominatorTree) -> HashSet<NodeIndex> {
    detect_natural_loops(cfg, dom_tree).into_iter().map(|l| l.header).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cfg::build_cfg;
    use crate::ir::{EffectOp, Function, Instr, Literal, Type};

    fn loopy() -> Function {
        Function {
            name: "f".into(),
            args: vec![],
            ret_type: None,
            instrs: vec![
                Instr::label("head"),
                Instr::const_("c", Type::Bool, Literal::Bool(true)),
                Instr::effect(EffectOp::Br, vec!["c".into()], vec!["body".into(), "done".into()]),
                Instr::label("body"),
                Instr::jmp("head"),
                Instr::label("done"),
                Instr::effect(EffectOp::Ret, vec![], vec![]),
            ],
        }
    }

    #[test]
    fn detects_back_edge() {
        let cfg = build_cfg(&loopy()).unwrap();
        let dom_tree = DominatorTree::new(&cfg).unwrap().unwrap();
        let loops = detect_natural_loops(&cfg, &dom_tree);
        assert_eq!(loops.len(), 1);
        assert_eq!(cfg.block(loops[0].header).name, "head");
        assert!(loops[0].contains(cfg.node_by_name("body").unwrap()));
    }

    #[test]
    fn acyclic_cfg_has_no_loops() {
        let f = Function {
            name: "f".into(),
            args: vec![],
            ret_type: None,
            instrs: vec![Instr::effect(EffectOp::Ret, vec![], vec![])],
        };
        let cfg = build_cfg(&f).unwrap();
        let dom_tree = DominatorTree::new(&cfg).unwrap().unwrap();
        assert!(detect_natural_loops(&cfg, &dom_tree).is_empty());
    }
}
